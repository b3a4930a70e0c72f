// TodoFlow - local task list with filtering, search and manual ordering

pub mod config;
pub mod models;
pub mod query;
pub mod reorder;
pub mod storage;
pub mod store;

// Re-export main types for convenience
pub use config::Config;
pub use models::{Priority, Task, TaskPatch, Theme, demo_tasks, now_ms};
pub use query::{FilterMode, Query};
pub use reorder::{Bounds, DragState, Placement, Reorder, move_relative};
pub use storage::{Backend, FileStorage, SqliteStorage, Storage, open_storage};
pub use store::TaskStore;
