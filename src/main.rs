use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use colored::Colorize;
use eyre::{Result, eyre};
use std::path::PathBuf;
use std::process;
use todoflow::models::parse_date;
use todoflow::query::{self, items_left_label};
use todoflow::{
    Backend, Config, FilterMode, Placement, Priority, Query, Storage, Task, TaskPatch, TaskStore, Theme,
    move_relative, open_storage,
};

#[derive(Parser)]
#[command(name = "todoflow")]
#[command(about = "TodoFlow - local task list with filters, search and manual ordering")]
#[command(version = env!("GIT_DESCRIBE"))]
struct Cli {
    /// Path to the store directory (overrides the config file)
    #[arg(short, long)]
    store_path: Option<PathBuf>,

    /// Config file (default: <config dir>/todoflow/config.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Storage backend: sqlite or file (overrides the config file)
    #[arg(short, long)]
    backend: Option<String>,

    /// Log debug output to stderr
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show tasks in display order
    List {
        /// all, active, completed, today, overdue or high
        #[arg(short, long)]
        filter: Option<String>,

        /// Case-insensitive title search
        #[arg(short = 'q', long)]
        search: Option<String>,

        /// Evaluate date filters as of this day (YYYY-MM-DD)
        #[arg(long)]
        today: Option<String>,
    },

    /// Add a task at the end of the list
    Add {
        /// Task title
        #[arg(required = true)]
        title: Vec<String>,

        /// Due date (YYYY-MM-DD)
        #[arg(short, long)]
        due: Option<String>,

        /// high, medium or low
        #[arg(short, long, default_value = "medium")]
        priority: String,
    },

    /// Change fields of a task
    Edit {
        /// Task id or trailing fragment of it
        id: String,

        #[arg(short, long)]
        title: Option<String>,

        /// Due date (YYYY-MM-DD)
        #[arg(short, long, conflicts_with = "no_due")]
        due: Option<String>,

        /// Clear the due date
        #[arg(long)]
        no_due: bool,

        /// high, medium or low
        #[arg(short, long)]
        priority: Option<String>,
    },

    /// Mark a task done, or not done again
    Toggle {
        /// Task id or trailing fragment of it
        id: String,
    },

    /// Delete a task
    Remove {
        /// Task id or trailing fragment of it
        id: String,
    },

    /// Copy a task to the end of the list
    Duplicate {
        /// Task id or trailing fragment of it
        id: String,
    },

    /// Delete every completed task
    ClearCompleted,

    /// Move a task before or after another within the visible list
    Move {
        /// Task to move
        id: String,

        /// Place it directly above this task
        #[arg(long, conflicts_with = "after", required_unless_present = "after")]
        before: Option<String>,

        /// Place it directly below this task
        #[arg(long)]
        after: Option<String>,

        /// Filter defining the visible list
        #[arg(short, long)]
        filter: Option<String>,

        /// Search defining the visible list
        #[arg(short = 'q', long)]
        search: Option<String>,
    },

    /// Set the order of the given tasks to exactly this sequence
    Order {
        /// Task ids (or trailing fragments) from top to bottom
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Show or change the theme: light, dark or toggle
    Theme { value: Option<String> },
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // Setup tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        })
        .init();

    let config = Config::load(cli.config.as_deref())?;
    let store_path = cli.store_path.clone().unwrap_or_else(|| config.store_path.clone());
    let backend = match &cli.backend {
        Some(b) => b.parse::<Backend>()?,
        None => config.backend,
    };

    let storage = open_storage(backend, &store_path)?;
    let mut store = if config.demo_seed {
        TaskStore::load(storage)
    } else {
        TaskStore::load_with_fallback(storage, Vec::new)
    };

    // Persist the fallback list so ids printed now still resolve next run
    if store.from_fallback() {
        store.save()?;
    }

    match cli.command {
        Commands::List { filter, search, today } => {
            let filter = match filter {
                Some(f) => f.parse()?,
                None => config.default_filter,
            };
            let today = match today {
                Some(d) => parse_date(&d)?,
                None => query::today(),
            };
            let query = Query::new(filter).with_search(search.unwrap_or_default());
            print_list(&store, &query, today);
        }
        Commands::Add { title, due, priority } => {
            let title = title.join(" ");
            let due = due.as_deref().map(parse_date).transpose()?;
            let priority: Priority = priority.parse()?;

            match store.add(&title, due, priority)? {
                Some(id) => {
                    if let Some(task) = store.get(&id) {
                        println!("{} {}", "Added".green(), render_task(task, query::today()));
                    }
                }
                None => println!("{}", "Nothing added: title is empty".yellow()),
            }
        }
        Commands::Edit {
            id,
            title,
            due,
            no_due,
            priority,
        } => {
            let id = resolve(&store, &id)?;

            let mut patch = TaskPatch::new();
            if let Some(title) = title {
                patch = patch.title(title);
            }
            if let Some(due) = due {
                patch = patch.due(Some(parse_date(&due)?));
            }
            if no_due {
                patch = patch.due(None);
            }
            if let Some(priority) = priority {
                patch = patch.priority(priority.parse()?);
            }
            if patch.is_empty() {
                return Err(eyre!("Nothing to change: pass --title, --due, --no-due or --priority"));
            }

            store.update(&id, &patch)?;
            if let Some(task) = store.get(&id) {
                println!("{} {}", "Updated".green(), render_task(task, query::today()));
            }
        }
        Commands::Toggle { id } => {
            let id = resolve(&store, &id)?;
            if let Some(completed) = store.toggle(&id)? {
                let state = if completed { "done" } else { "not done" };
                println!("Marked {} as {}", id.dimmed(), state);
            }
        }
        Commands::Remove { id } => {
            let id = resolve(&store, &id)?;
            if store.remove(&id)? {
                println!("Removed {}", id.dimmed());
            }
        }
        Commands::Duplicate { id } => {
            let id = resolve(&store, &id)?;
            let copy = store.duplicate(&id)?;
            if let Some(task) = copy.and_then(|new_id| store.get(&new_id)) {
                println!("{} {}", "Added".green(), render_task(task, query::today()));
            }
        }
        Commands::ClearCompleted => {
            let removed = store.clear_completed()?;
            println!("Cleared {} completed task{}", removed, if removed == 1 { "" } else { "s" });
        }
        Commands::Move {
            id,
            before,
            after,
            filter,
            search,
        } => {
            let dragged = resolve(&store, &id)?;
            let (target, placement) = match (before, after) {
                (Some(t), _) => (t, Placement::Before),
                (None, Some(t)) => (t, Placement::After),
                (None, None) => return Err(eyre!("Pass --before or --after")),
            };
            let target = resolve(&store, &target)?;

            let filter = match filter {
                Some(f) => f.parse()?,
                None => config.default_filter,
            };
            let today = query::today();
            let query = Query::new(filter).with_search(search.unwrap_or_default());

            let visible = store.visible_ids(&query, today);
            for needed in [&dragged, &target] {
                if !visible.contains(needed) {
                    return Err(eyre!("Task {} is not in the visible list", needed));
                }
            }

            let order = move_relative(&visible, &dragged, &target, placement);
            store.apply_order(&order)?;
            print_list(&store, &query, today);
        }
        Commands::Order { ids } => {
            let ids = ids
                .iter()
                .map(|fragment| resolve(&store, fragment))
                .collect::<Result<Vec<_>>>()?;
            let count = store.apply_order(&ids)?;
            println!("Reordered {} task{}", count, if count == 1 { "" } else { "s" });
        }
        Commands::Theme { value } => {
            let current = store.theme().unwrap_or(config.default_theme);
            let next = match value.as_deref() {
                None => None,
                Some("toggle") => Some(current.toggled()),
                Some(other) => Some(other.parse::<Theme>()?),
            };

            match next {
                Some(theme) => {
                    store.set_theme(theme)?;
                    println!("Theme set to {}", theme.to_string().bold());
                }
                None => println!("{}", current),
            }
        }
    }

    Ok(())
}

/// Full id for a user-supplied id or trailing fragment
fn resolve<S: Storage>(store: &TaskStore<S>, fragment: &str) -> Result<String> {
    store
        .find(fragment)?
        .map(|t| t.id.clone())
        .ok_or_else(|| eyre!("No task matches '{}'", fragment))
}

fn print_list<S: Storage>(store: &TaskStore<S>, query: &Query, today: NaiveDate) {
    let visible = store.visible(query, today);

    if visible.is_empty() {
        println!("{}", "No tasks".dimmed());
    }
    for task in &visible {
        println!("{}", render_task(task, today));
    }

    println!();
    let mut footer = items_left_label(store.active_count());
    if query.filter != FilterMode::All {
        footer.push_str(&format!(" · filter: {}", query.filter));
    }
    println!("{}", footer.dimmed());
}

fn render_task(task: &Task, today: NaiveDate) -> String {
    let check = if task.completed { "[x]" } else { "[ ]" };

    let title = if task.completed {
        task.title.dimmed().strikethrough().to_string()
    } else {
        task.title.bold().to_string()
    };

    let priority = match task.priority {
        Priority::High => task.priority.label().red(),
        Priority::Medium => task.priority.label().yellow(),
        Priority::Low => task.priority.label().blue(),
    };

    let due = match task.due {
        Some(date) => {
            let text = format!("Due {}", date.format("%b %-d, %Y"));
            if !task.completed && date < today {
                text.red().to_string()
            } else {
                text
            }
        }
        None => "No due date".dimmed().to_string(),
    };

    format!("{} {}  {}  {}  {}", task.short_id().dimmed(), check, title, priority, due)
}
