// Drag-and-drop reordering of the visible list

use eyre::{Result, eyre};
use tracing::debug;

/// Where the dragged task lands relative to the hovered one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Before,
    After,
}

impl Placement {
    /// Top half of the hovered task means before, bottom half means after
    pub fn from_pointer(pointer_y: f64, bounds: Bounds) -> Self {
        if pointer_y - bounds.top < bounds.height / 2.0 {
            Placement::Before
        } else {
            Placement::After
        }
    }
}

/// Vertical extent of a rendered task
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub top: f64,
    pub height: f64,
}

/// Drag lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Dragging { dragged: String, tentative_index: usize },
    Dropped,
}

/// Tracks one drag gesture over the visible list
///
/// Nothing here touches `sort` values; the order returned by [`Reorder::drop`]
/// is committed with `TaskStore::apply_order`.
#[derive(Debug, Clone, Default)]
pub struct Reorder {
    state: DragState,
    original: Vec<String>,
    order: Vec<String>,
}

impl Reorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    /// Current tentative order of the visible ids
    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging { .. })
    }

    /// Start dragging `dragged` within the visible ids
    pub fn begin(&mut self, visible: Vec<String>, dragged: &str) -> Result<()> {
        if let DragState::Dragging { dragged: active, .. } = &self.state {
            return Err(eyre!("A drag is already in progress for {}", active));
        }

        let index = visible
            .iter()
            .position(|id| id == dragged)
            .ok_or_else(|| eyre!("Cannot drag {}: not in the visible list", dragged))?;

        debug!(dragged, index, "Drag started");
        self.original = visible.clone();
        self.order = visible;
        self.state = DragState::Dragging {
            dragged: dragged.to_string(),
            tentative_index: index,
        };
        Ok(())
    }

    /// Move the dragged id next to `target` according to the pointer position
    ///
    /// Returns the new tentative index, or `None` when no drag is active.
    /// Hovering the dragged task itself or an unknown id leaves the order as is.
    pub fn hover(&mut self, target: &str, pointer_y: f64, bounds: Bounds) -> Option<usize> {
        let DragState::Dragging {
            dragged,
            tentative_index,
        } = &mut self.state
        else {
            return None;
        };

        if target == dragged.as_str() || !self.order.iter().any(|id| id == target) {
            return Some(*tentative_index);
        }

        let placement = Placement::from_pointer(pointer_y, bounds);
        self.order = move_relative(&self.order, dragged, target, placement);
        *tentative_index = self
            .order
            .iter()
            .position(|id| id.as_str() == dragged.as_str())
            .unwrap_or(*tentative_index);

        Some(*tentative_index)
    }

    /// Finish the drag and hand back the final visible order
    pub fn drop(&mut self) -> Result<Vec<String>> {
        match std::mem::take(&mut self.state) {
            DragState::Dragging { dragged, tentative_index } => {
                debug!(dragged = %dragged, tentative_index, "Drag dropped");
                self.state = DragState::Dropped;
                self.original.clear();
                Ok(self.order.clone())
            }
            other => {
                self.state = other;
                Err(eyre!("No drag in progress"))
            }
        }
    }

    /// Abandon the drag, restoring the order it started from
    pub fn cancel(&mut self) {
        if self.is_dragging() {
            debug!("Drag cancelled");
            self.order = std::mem::take(&mut self.original);
            self.state = DragState::Idle;
        }
    }
}

/// Order after moving `dragged` before or after `target`
///
/// Returns `order` unchanged when either id is missing or they are the same.
pub fn move_relative(order: &[String], dragged: &str, target: &str, placement: Placement) -> Vec<String> {
    if dragged == target || !order.iter().any(|id| id == dragged) {
        return order.to_vec();
    }

    let mut rest: Vec<String> = order.iter().filter(|id| id.as_str() != dragged).cloned().collect();
    let Some(target_index) = rest.iter().position(|id| id == target) else {
        return order.to_vec();
    };

    let insert_at = match placement {
        Placement::Before => target_index,
        Placement::After => target_index + 1,
    };
    rest.insert(insert_at, dragged.to_string());
    rest
}
