// Task list store: owns the collection and writes it through after every mutation

use crate::models::{Priority, Task, TaskPatch, Theme, demo_tasks};
use crate::query::{self, Query};
use crate::storage::{Storage, TASKS_KEY, THEME_KEY};
use chrono::NaiveDate;
use eyre::{Context, Result, eyre};
use tracing::{debug, info, warn};

/// Single source of truth for the task list
///
/// Every mutating method serializes the whole list to storage before it
/// returns. No-op calls (blank title, unknown id) do not write.
pub struct TaskStore<S: Storage> {
    storage: S,
    tasks: Vec<Task>,
    from_fallback: bool,
}

impl<S: Storage> TaskStore<S> {
    /// Load the task list, falling back to the demo tasks when storage holds
    /// nothing usable
    pub fn load(storage: S) -> Self {
        Self::load_with_fallback(storage, || demo_tasks(query::today()))
    }

    /// Load the task list, using `fallback` when the stored value is missing
    /// or cannot be parsed
    pub fn load_with_fallback<F>(storage: S, fallback: F) -> Self
    where
        F: FnOnce() -> Vec<Task>,
    {
        let stored = match storage.get(TASKS_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<Task>>(&raw) {
                Ok(tasks) => Some(tasks),
                Err(e) => {
                    warn!(key = TASKS_KEY, error = ?e, "Stored tasks are malformed, using fallback");
                    None
                }
            },
            Ok(None) => {
                debug!(key = TASKS_KEY, "No stored tasks, using fallback");
                None
            }
            Err(e) => {
                warn!(key = TASKS_KEY, error = ?e, "Failed to read stored tasks, using fallback");
                None
            }
        };

        let from_fallback = stored.is_none();
        let tasks = stored.unwrap_or_else(fallback);
        info!(count = tasks.len(), from_fallback, "Loaded tasks");

        Self {
            storage,
            tasks,
            from_fallback,
        }
    }

    /// Whether the current list came from the fallback rather than storage
    ///
    /// Cleared by the first successful write.
    pub fn from_fallback(&self) -> bool {
        self.from_fallback
    }

    /// Serialize the whole list and write it to storage
    pub fn save(&mut self) -> Result<()> {
        let json = serde_json::to_string(&self.tasks).context("Failed to serialize tasks")?;
        self.storage
            .set(TASKS_KEY, &json)
            .context("Failed to persist tasks")?;
        self.from_fallback = false;
        debug!(count = self.tasks.len(), "Saved tasks");
        Ok(())
    }

    // ========================================================================
    // Read API
    // ========================================================================

    /// All tasks in stored order (not display order)
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Find a task by full id or by a trailing fragment of it
    ///
    /// Errors when the fragment matches more than one task.
    pub fn find(&self, id_or_suffix: &str) -> Result<Option<&Task>> {
        let needle = id_or_suffix.trim();
        if needle.is_empty() {
            return Ok(None);
        }
        if let Some(task) = self.get(needle) {
            return Ok(Some(task));
        }

        let mut matches = self.tasks.iter().filter(|t| t.id.ends_with(needle));
        match (matches.next(), matches.next()) {
            (Some(task), None) => Ok(Some(task)),
            (None, _) => Ok(None),
            (Some(_), Some(_)) => Err(eyre!("Id fragment '{}' matches more than one task", needle)),
        }
    }

    /// Highest `sort` value, `-1` for an empty list
    pub fn max_sort(&self) -> i64 {
        self.tasks.iter().map(|t| t.sort).max().unwrap_or(-1)
    }

    /// `sort` for a task appended at the end; saturates at `i64::MAX`
    fn next_sort(&self) -> i64 {
        self.max_sort().saturating_add(1)
    }

    /// Incomplete tasks across the whole list
    pub fn active_count(&self) -> usize {
        query::active_count(&self.tasks)
    }

    /// Tasks to display for `query` on `today`
    pub fn visible(&self, query: &Query, today: NaiveDate) -> Vec<&Task> {
        query::visible(&self.tasks, query, today)
    }

    /// Ids of the visible tasks, in display order
    pub fn visible_ids(&self, query: &Query, today: NaiveDate) -> Vec<String> {
        self.visible(query, today).into_iter().map(|t| t.id.clone()).collect()
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Append a new task at the end of the order
    ///
    /// Returns `None` without writing when the trimmed title is empty.
    pub fn add(&mut self, title: &str, due: Option<NaiveDate>, priority: Priority) -> Result<Option<String>> {
        if title.trim().is_empty() {
            debug!("Ignoring add with blank title");
            return Ok(None);
        }

        let task = Task::new(title, due, priority, self.next_sort());
        let id = task.id.clone();
        debug!(id = %id, sort = task.sort, "Adding task");

        self.tasks.push(task);
        self.save()?;
        Ok(Some(id))
    }

    /// Merge `patch` into the task with `id`; returns whether it exists
    pub fn update(&mut self, id: &str, patch: &TaskPatch) -> Result<bool> {
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) else {
            debug!(id, "Ignoring update for unknown task");
            return Ok(false);
        };

        task.apply(patch);
        self.save()?;
        Ok(true)
    }

    /// Flip the completed flag; returns the new value, `None` for an unknown id
    pub fn toggle(&mut self, id: &str) -> Result<Option<bool>> {
        let Some(completed) = self.get(id).map(|t| !t.completed) else {
            return Ok(None);
        };
        self.update(id, &TaskPatch::new().completed(completed))?;
        Ok(Some(completed))
    }

    /// Delete the task with `id`; returns whether one was removed
    pub fn remove(&mut self, id: &str) -> Result<bool> {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != id);

        if self.tasks.len() == before {
            debug!(id, "Ignoring remove for unknown task");
            return Ok(false);
        }

        self.save()?;
        Ok(true)
    }

    /// Copy a task to the end of the order with `" (copy)"` appended to its title
    pub fn duplicate(&mut self, id: &str) -> Result<Option<String>> {
        let Some(source) = self.get(id) else {
            debug!(id, "Ignoring duplicate for unknown task");
            return Ok(None);
        };

        let mut copy = source.clone();
        copy.id = crate::models::new_id();
        copy.title = format!("{} (copy)", source.title);
        copy.sort = self.next_sort();
        let new_id = copy.id.clone();

        self.tasks.push(copy);
        self.save()?;
        Ok(Some(new_id))
    }

    /// Remove every completed task; returns how many went
    pub fn clear_completed(&mut self) -> Result<usize> {
        let before = self.tasks.len();
        self.tasks.retain(|t| !t.completed);
        let removed = before - self.tasks.len();

        if removed > 0 {
            info!(removed, "Cleared completed tasks");
            self.save()?;
        }
        Ok(removed)
    }

    /// Commit a dropped order: `sort = index` for each id, starting at 0
    ///
    /// Only the given ids are renumbered. Tasks outside that list keep their
    /// `sort` and may end up interleaved with the renumbered ones. Unknown ids
    /// are skipped but still use up their index.
    pub fn apply_order<I: AsRef<str>>(&mut self, ids: &[I]) -> Result<usize> {
        let mut renumbered = 0;
        for (index, id) in ids.iter().enumerate() {
            if let Some(task) = self.tasks.iter_mut().find(|t| t.id == id.as_ref()) {
                task.sort = index as i64;
                renumbered += 1;
            }
        }

        if renumbered > 0 {
            debug!(renumbered, "Applied new order");
            self.save()?;
        }
        Ok(renumbered)
    }

    // ========================================================================
    // Theme preference
    // ========================================================================

    /// Stored theme, `None` when unset or unreadable
    pub fn theme(&self) -> Option<Theme> {
        match self.storage.get(THEME_KEY) {
            Ok(Some(raw)) => match raw.parse() {
                Ok(theme) => Some(theme),
                Err(e) => {
                    warn!(key = THEME_KEY, error = %e, "Ignoring stored theme");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key = THEME_KEY, error = ?e, "Failed to read theme");
                None
            }
        }
    }

    pub fn set_theme(&mut self, theme: Theme) -> Result<()> {
        self.storage
            .set(THEME_KEY, theme.as_str())
            .context("Failed to persist theme")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::FilterMode;
    use crate::storage::SqliteStorage;
    use std::collections::HashSet;

    fn empty_store() -> TaskStore<SqliteStorage> {
        TaskStore::load_with_fallback(SqliteStorage::open_in_memory().unwrap(), Vec::new)
    }

    fn stored_tasks(store: &TaskStore<SqliteStorage>) -> Vec<Task> {
        let raw = store.storage.get(TASKS_KEY).unwrap().unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    #[test]
    fn test_load_missing_uses_demo_seed() {
        let store = TaskStore::load(SqliteStorage::open_in_memory().unwrap());
        assert!(store.from_fallback());
        assert_eq!(store.tasks().len(), 3);
        assert_eq!(store.tasks()[0].title, "Finish the project proposal");
    }

    #[test]
    fn test_load_malformed_uses_demo_seed() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        storage.set(TASKS_KEY, "{not json").unwrap();

        let store = TaskStore::load(storage);
        assert!(store.from_fallback());
        assert_eq!(store.tasks().len(), 3);
    }

    #[test]
    fn test_load_ignores_older_key_versions() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        storage
            .set("todoflow.v1.tasks", r#"[{"id":"old","title":"Old"}]"#)
            .unwrap();

        let store = TaskStore::load_with_fallback(storage, Vec::new);
        assert!(store.tasks().is_empty());
    }

    #[test]
    fn test_add_appends_and_persists() {
        let mut store = empty_store();

        let first = store.add("  First  ", None, Priority::Medium).unwrap().unwrap();
        let second = store.add("Second", Some(day()), Priority::High).unwrap().unwrap();

        assert_eq!(store.get(&first).unwrap().sort, 0);
        assert_eq!(store.get(&first).unwrap().title, "First");
        assert_eq!(store.get(&second).unwrap().sort, 1);
        assert!(!store.from_fallback());
        assert_eq!(stored_tasks(&store), store.tasks().to_vec());
    }

    #[test]
    fn test_add_uses_max_sort_not_len() {
        let mut store = empty_store();
        let id = store.add("a", None, Priority::Medium).unwrap().unwrap();
        store.update(&id, &TaskPatch::new().sort(41)).unwrap();

        let next = store.add("b", None, Priority::Medium).unwrap().unwrap();
        assert_eq!(store.get(&next).unwrap().sort, 42);
    }

    #[test]
    fn test_blank_add_is_noop() {
        let mut store = empty_store();
        assert_eq!(store.add("   \t ", None, Priority::High).unwrap(), None);
        assert_eq!(store.add("", None, Priority::High).unwrap(), None);
        assert!(store.tasks().is_empty());
        assert_eq!(store.storage.get(TASKS_KEY).unwrap(), None);
    }

    #[test]
    fn test_update_merges_fields() {
        let mut store = empty_store();
        let id = store.add("Call mom", Some(day()), Priority::Low).unwrap().unwrap();

        let found = store
            .update(&id, &TaskPatch::new().title(" Call mum ").completed(true))
            .unwrap();
        assert!(found);

        let task = store.get(&id).unwrap();
        assert_eq!(task.title, "Call mum");
        assert!(task.completed);
        assert_eq!(task.due, Some(day()));
        assert_eq!(task.priority, Priority::Low);
        assert_eq!(stored_tasks(&store)[0].title, "Call mum");
    }

    #[test]
    fn test_unknown_ids_are_ignored() {
        let mut store = empty_store();
        store.add("Only", None, Priority::Medium).unwrap();

        assert!(!store.update("nope", &TaskPatch::new().completed(true)).unwrap());
        assert!(!store.remove("nope").unwrap());
        assert_eq!(store.duplicate("nope").unwrap(), None);
        assert_eq!(store.toggle("nope").unwrap(), None);
        assert_eq!(store.tasks().len(), 1);
    }

    #[test]
    fn test_remove() {
        let mut store = empty_store();
        let a = store.add("a", None, Priority::Medium).unwrap().unwrap();
        let b = store.add("b", None, Priority::Medium).unwrap().unwrap();

        assert!(store.remove(&a).unwrap());
        assert!(store.get(&a).is_none());
        assert!(store.get(&b).is_some());
        assert_eq!(stored_tasks(&store).len(), 1);
    }

    #[test]
    fn test_duplicate_copies_fields() {
        let mut store = empty_store();
        let id = store.add("Pay rent", Some(day()), Priority::High).unwrap().unwrap();
        store.toggle(&id).unwrap();
        store.add("Other", None, Priority::Low).unwrap();

        let copy_id = store.duplicate(&id).unwrap().unwrap();
        assert_ne!(copy_id, id);

        let original = store.get(&id).unwrap();
        let copy = store.get(&copy_id).unwrap();
        assert_eq!(original.title, "Pay rent");
        assert_eq!(copy.title, "Pay rent (copy)");
        assert!(copy.completed);
        assert_eq!(copy.due, Some(day()));
        assert_eq!(copy.priority, Priority::High);
        assert_eq!(copy.sort, 2);

        let stored = stored_tasks(&store);
        assert_eq!(stored.len(), 3);
        assert!(stored.iter().any(|t| t.id == copy_id && t.title == "Pay rent (copy)"));
    }

    #[test]
    fn test_append_after_max_sort_saturates() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        storage
            .set(TASKS_KEY, &format!(r#"[{{"id":"top","title":"Top","sort":{}}}]"#, i64::MAX))
            .unwrap();
        let mut store = TaskStore::load(storage);
        assert!(!store.from_fallback());

        let added = store.add("after", None, Priority::Medium).unwrap().unwrap();
        assert_eq!(store.get(&added).unwrap().sort, i64::MAX);

        let copy = store.duplicate("top").unwrap().unwrap();
        assert_eq!(store.get(&copy).unwrap().sort, i64::MAX);
        assert_eq!(stored_tasks(&store).len(), 3);
    }

    #[test]
    fn test_ids_stay_unique() {
        let mut store = empty_store();
        let first = store.add("seed", None, Priority::Medium).unwrap().unwrap();
        for i in 0..20 {
            if i % 2 == 0 {
                store.add(&format!("task {}", i), None, Priority::Low).unwrap();
            } else {
                store.duplicate(&first).unwrap();
            }
        }

        let ids: HashSet<&str> = store.tasks().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids.len(), store.tasks().len());
        assert_eq!(ids.len(), 21);
    }

    #[test]
    fn test_clear_completed_is_idempotent() {
        let mut store = empty_store();
        let a = store.add("a", None, Priority::Medium).unwrap().unwrap();
        store.add("b", None, Priority::Medium).unwrap();
        let c = store.add("c", None, Priority::Medium).unwrap().unwrap();
        store.toggle(&a).unwrap();
        store.toggle(&c).unwrap();

        assert_eq!(store.clear_completed().unwrap(), 2);
        let once = store.tasks().to_vec();

        assert_eq!(store.clear_completed().unwrap(), 0);
        assert_eq!(store.tasks(), once.as_slice());
        assert_eq!(store.tasks()[0].title, "b");
        assert_eq!(stored_tasks(&store), once);
    }

    #[test]
    fn test_toggle() {
        let mut store = empty_store();
        let id = store.add("flip", None, Priority::Medium).unwrap().unwrap();
        assert_eq!(store.toggle(&id).unwrap(), Some(true));
        assert_eq!(store.active_count(), 0);
        assert!(stored_tasks(&store)[0].completed);

        assert_eq!(store.toggle(&id).unwrap(), Some(false));
        assert_eq!(store.active_count(), 1);
        assert!(!stored_tasks(&store)[0].completed);
    }

    #[test]
    fn test_apply_order_renumbers_contiguously() {
        let mut store = empty_store();
        let a = store.add("A", None, Priority::Medium).unwrap().unwrap();
        let b = store.add("B", None, Priority::Medium).unwrap().unwrap();
        let c = store.add("C", None, Priority::Medium).unwrap().unwrap();

        let count = store.apply_order(&[b.as_str(), c.as_str(), a.as_str()]).unwrap();
        assert_eq!(count, 3);
        assert_eq!(store.get(&b).unwrap().sort, 0);
        assert_eq!(store.get(&c).unwrap().sort, 1);
        assert_eq!(store.get(&a).unwrap().sort, 2);

        let titles: Vec<&str> = store
            .visible(&Query::default(), day())
            .iter()
            .map(|t| t.title.as_str())
            .collect();
        assert_eq!(titles, vec!["B", "C", "A"]);
    }

    #[test]
    fn test_apply_order_leaves_hidden_tasks() {
        let mut store = empty_store();
        let a = store.add("A", None, Priority::Medium).unwrap().unwrap();
        let b = store.add("B", None, Priority::Medium).unwrap().unwrap();
        let hidden = store.add("Done", None, Priority::Medium).unwrap().unwrap();
        store.toggle(&hidden).unwrap();

        let visible = store.visible_ids(&Query::new(FilterMode::Active), day());
        assert_eq!(visible, vec![a.clone(), b.clone()]);

        store.apply_order(&[b.clone(), a.clone()]).unwrap();
        assert_eq!(store.get(&b).unwrap().sort, 0);
        assert_eq!(store.get(&a).unwrap().sort, 1);
        assert_eq!(store.get(&hidden).unwrap().sort, 2);
    }

    #[test]
    fn test_apply_order_skips_unknown_ids() {
        let mut store = empty_store();
        let a = store.add("A", None, Priority::Medium).unwrap().unwrap();

        assert_eq!(store.apply_order(&["ghost", a.as_str()]).unwrap(), 1);
        assert_eq!(store.get(&a).unwrap().sort, 1);
    }

    #[test]
    fn test_find_by_suffix() {
        let mut store = empty_store();
        let id = store.add("findme", None, Priority::Medium).unwrap().unwrap();
        let suffix = &id[id.len() - 8..];

        assert_eq!(store.find(&id).unwrap().unwrap().title, "findme");
        assert_eq!(store.find(suffix).unwrap().unwrap().title, "findme");
        assert!(store.find("zzzzzzzz").unwrap().is_none());
        assert!(store.find("").unwrap().is_none());
    }

    #[test]
    fn test_find_ambiguous_suffix() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        storage
            .set(
                TASKS_KEY,
                r#"[{"id":"one-abc","title":"One"},{"id":"two-abc","title":"Two"}]"#,
            )
            .unwrap();
        let store = TaskStore::load(storage);

        assert!(store.find("abc").is_err());
        assert_eq!(store.find("two-abc").unwrap().unwrap().title, "Two");
    }

    #[test]
    fn test_theme_preference() {
        let mut store = empty_store();
        assert_eq!(store.theme(), None);

        store.set_theme(Theme::Light).unwrap();
        assert_eq!(store.theme(), Some(Theme::Light));

        let mut storage = SqliteStorage::open_in_memory().unwrap();
        storage.set(THEME_KEY, "sepia").unwrap();
        let store = TaskStore::load_with_fallback(storage, Vec::new);
        assert_eq!(store.theme(), None);
    }
}
