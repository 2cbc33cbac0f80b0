use chrono::{SubsecRound, Utc};
use tracing::{debug, info};

use crate::id::IdGenerator;
use crate::storage::TaskRepository;
use crate::task::{AppState, Filter, Task, TaskPatch};

/// Receives a read-only snapshot after every commit or re-render.
pub trait StoreObserver {
    fn on_render(&mut self, state: &AppState);
}

impl<F> StoreObserver for F
where
    F: FnMut(&AppState),
{
    fn on_render(&mut self, state: &AppState) {
        self(state)
    }
}

/// Owns the task list and the active filter. Every mutation goes through
/// [`TaskStore::commit`]: persist, then notify observers.
pub struct TaskStore {
    state: AppState,
    repo: TaskRepository,
    ids: IdGenerator,
    observers: Vec<Box<dyn StoreObserver>>,
}

impl std::fmt::Debug for TaskStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskStore")
            .field("state", &self.state)
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

impl TaskStore {
    #[tracing::instrument(skip(repo))]
    pub fn open(repo: TaskRepository) -> Self {
        Self::with_ids(repo, IdGenerator::new())
    }

    pub fn with_ids(repo: TaskRepository, ids: IdGenerator) -> Self {
        let tasks = repo.load();
        info!(count = tasks.len(), "opened task store");
        Self {
            state: AppState::with_tasks(tasks),
            repo,
            ids,
            observers: Vec::new(),
        }
    }

    pub fn in_memory() -> Self {
        Self::open(TaskRepository::in_memory())
    }

    pub fn subscribe(&mut self, observer: impl StoreObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.state.get(id)
    }

    /// `text` must already be trimmed and non-empty.
    #[tracing::instrument(skip(self, text))]
    pub fn add_task(&mut self, text: impl Into<String>) -> String {
        let text = text.into();
        debug_assert!(!text.trim().is_empty(), "add_task requires non-empty text");

        let id = self.ids.new_id();
        // Persisted timestamps carry milliseconds only.
        let task = Task::new(id.clone(), text, Utc::now().trunc_subsecs(3));
        self.state.tasks.insert(0, task);
        debug!(id = %id, count = self.state.tasks.len(), "task added");

        self.commit();
        id
    }

    #[tracing::instrument(skip(self))]
    pub fn remove_task(&mut self, id: &str) {
        let before = self.state.tasks.len();
        self.state.tasks.retain(|task| task.id != id);
        self.state.removing.remove(id);
        if self.state.tasks.len() == before {
            debug!("remove of absent task ignored");
        }
        self.commit();
    }

    #[tracing::instrument(skip(self))]
    pub fn update_task(&mut self, id: &str, patch: TaskPatch) {
        match self.state.tasks.iter_mut().find(|task| task.id == id) {
            Some(task) => patch.apply(task),
            None => debug!("update of absent task ignored"),
        }
        self.commit();
    }

    #[tracing::instrument(skip(self))]
    pub fn set_filter(&mut self, filter: Filter) {
        self.state.filter = filter;
        self.render();
    }

    #[tracing::instrument(skip(self))]
    pub fn clear_completed(&mut self) {
        let before = self.state.tasks.len();
        self.state.tasks.retain(|task| !task.completed);
        let tasks = &self.state.tasks;
        self.state
            .removing
            .retain(|id| tasks.iter().any(|task| &task.id == id));
        debug!(
            removed = before - self.state.tasks.len(),
            "cleared completed tasks"
        );
        self.commit();
    }

    /// Flags a row as about to be removed. Transient: nothing is persisted.
    #[tracing::instrument(skip(self))]
    pub fn mark_removing(&mut self, id: &str) {
        if self.state.get(id).is_some() && self.state.removing.insert(id.to_string()) {
            self.render();
        }
    }

    #[tracing::instrument(skip(self))]
    pub fn unmark_removing(&mut self, id: &str) {
        if self.state.removing.remove(id) {
            self.render();
        }
    }

    pub fn commit(&mut self) {
        self.repo.save(&self.state.tasks);
        self.render();
    }

    pub fn render(&mut self) {
        for observer in &mut self.observers {
            observer.on_render(&self.state);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::TaskStore;
    use crate::id::IdGenerator;
    use crate::storage::{BlobStore, MemoryBlobStore, TaskRepository};
    use crate::task::{AppState, Filter, TaskPatch};

    fn recording(store: &mut TaskStore) -> Rc<RefCell<Vec<AppState>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        store.subscribe(move |state: &AppState| sink.borrow_mut().push(state.clone()));
        seen
    }

    #[test]
    fn add_prepends_incomplete_task_with_fresh_id() {
        let mut store = TaskStore::in_memory();
        let a = store.add_task("A");
        let b = store.add_task("B");

        let tasks = &store.state().tasks;
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].text, "B");
        assert_eq!(tasks[1].text, "A");
        assert_ne!(a, b);
        assert!(tasks.iter().all(|t| !t.completed));
    }

    #[test]
    fn every_mutation_persists_and_renders() {
        let mut store = TaskStore::in_memory();
        let renders = recording(&mut store);

        let id = store.add_task("one");
        store.update_task(&id, TaskPatch::completed(true));
        store.clear_completed();
        store.remove_task("missing");

        assert_eq!(renders.borrow().len(), 4);
        assert!(renders.borrow()[3].tasks.is_empty());
    }

    #[test]
    fn missing_ids_are_tolerated() {
        let mut store = TaskStore::in_memory();
        store.add_task("keep");
        let before = store.state().tasks.clone();

        store.remove_task("nope");
        store.update_task("nope", TaskPatch::text("changed"));

        assert_eq!(store.state().tasks, before);
    }

    #[test]
    fn update_merges_fields_but_keeps_identity() {
        let mut store = TaskStore::in_memory();
        let id = store.add_task("draft");
        let created = store.get(&id).unwrap().created_at;

        store.update_task(&id, TaskPatch::text("final"));
        store.update_task(&id, TaskPatch::completed(true));

        let task = store.get(&id).unwrap();
        assert_eq!(task.text, "final");
        assert!(task.completed);
        assert_eq!(task.id, id);
        assert_eq!(task.created_at, created);
    }

    #[test]
    fn set_filter_renders_without_touching_tasks() {
        let mut store = TaskStore::in_memory();
        store.add_task("x");
        let renders = recording(&mut store);

        store.set_filter(Filter::Completed);

        assert_eq!(store.state().filter, Filter::Completed);
        assert_eq!(renders.borrow().len(), 1);
        assert_eq!(renders.borrow()[0].filter, Filter::Completed);
    }

    #[test]
    fn state_survives_reopen_but_filter_does_not() {
        let blobs = Rc::new(RefCell::new(MemoryBlobStore::new()));
        let repo = TaskRepository::new(Box::new(SharedBlobs(Rc::clone(&blobs))));
        let mut store = TaskStore::open(repo);
        store.add_task("persisted");
        store.set_filter(Filter::Active);

        let reopened = TaskStore::open(TaskRepository::new(Box::new(SharedBlobs(blobs))));
        assert_eq!(reopened.state().tasks, store.state().tasks);
        assert_eq!(reopened.state().filter, Filter::All);
    }

    #[test]
    fn removal_marks_render_without_persisting() {
        let blobs = Rc::new(RefCell::new(MemoryBlobStore::new()));
        let repo = TaskRepository::new(Box::new(SharedBlobs(Rc::clone(&blobs))));
        let mut store = TaskStore::open(repo);
        let id = store.add_task("going");
        let stored = blobs.borrow().get(crate::storage::STORAGE_KEY).unwrap();
        let renders = recording(&mut store);

        store.mark_removing(&id);
        store.mark_removing(&id);
        store.mark_removing("missing");
        assert_eq!(renders.borrow().len(), 1);
        assert!(renders.borrow()[0].is_removing(&id));
        assert_eq!(blobs.borrow().get(crate::storage::STORAGE_KEY).unwrap(), stored);

        store.remove_task(&id);
        assert!(store.state().removing.is_empty());
        store.unmark_removing(&id);
        assert_eq!(renders.borrow().len(), 2);
    }

    #[test]
    fn failed_writes_keep_memory_state() {
        let repo = TaskRepository::new(Box::new(MemoryBlobStore::with_quota(4)));
        let mut store = TaskStore::with_ids(repo, IdGenerator::fallback(1));
        store.add_task("does not fit");
        assert_eq!(store.state().tasks.len(), 1);
    }

    struct SharedBlobs(Rc<RefCell<MemoryBlobStore>>);

    impl BlobStore for SharedBlobs {
        fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
            self.0.borrow().get(key)
        }

        fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
            self.0.borrow_mut().set(key, value)
        }
    }
}
