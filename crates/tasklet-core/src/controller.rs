use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::locale::EMPTY_TASK_MESSAGE;
use crate::store::{StoreObserver, TaskStore};
use crate::task::{Filter, MAX_TEXT_LEN, TaskPatch};
use crate::timer::{DeferredQueue, TimerHandle};

pub const DEFAULT_DELETE_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EditState {
    #[default]
    Viewing,
    Editing {
        id: String,
        buffer: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditExit {
    /// Confirm key.
    Enter,
    /// Focus moved away.
    Blur,
    /// Cancel key.
    Escape,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    Updated,
    Discarded,
    /// No session was open.
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Added(String),
    Rejected,
}

/// Turns interface events into store operations. Holds the transient
/// interface state the store does not persist: form input, validation
/// message, the inline edit session and rows waiting to be removed.
#[derive(Debug)]
pub struct Controller {
    store: TaskStore,
    edit: EditState,
    form_input: String,
    validation: Option<&'static str>,
    removing: BTreeMap<String, TimerHandle>,
    deferred: DeferredQueue<String>,
    delete_delay: Duration,
}

impl Controller {
    pub fn new(store: TaskStore) -> Self {
        Self::with_delete_delay(store, DEFAULT_DELETE_DELAY)
    }

    pub fn with_delete_delay(store: TaskStore, delete_delay: Duration) -> Self {
        Self {
            store,
            edit: EditState::Viewing,
            form_input: String::new(),
            validation: None,
            removing: BTreeMap::new(),
            deferred: DeferredQueue::new(),
            delete_delay,
        }
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn subscribe(&mut self, observer: impl StoreObserver + 'static) {
        self.store.subscribe(observer);
    }

    pub fn edit_state(&self) -> &EditState {
        &self.edit
    }

    pub fn validation_message(&self) -> Option<&'static str> {
        self.validation
    }

    pub fn form_input(&self) -> &str {
        &self.form_input
    }

    pub fn is_removing(&self, id: &str) -> bool {
        self.removing.contains_key(id)
    }

    pub fn pending_removal(&self, id: &str) -> Option<TimerHandle> {
        self.removing.get(id).copied()
    }

    pub fn delete_delay(&self) -> Duration {
        self.delete_delay
    }

    /// Typing into the form clears a shown validation message.
    pub fn input_changed(&mut self, value: impl Into<String>) {
        self.form_input = value.into();
        if self.validation.take().is_some() {
            debug!("validation message cleared by input");
        }
    }

    #[tracing::instrument(skip(self, input))]
    pub fn submit(&mut self, input: impl Into<String>) -> SubmitOutcome {
        self.blur_edit();
        self.form_input = input.into();

        let value = self.form_input.trim();
        if value.is_empty() {
            info!("rejected empty task text");
            self.validation = Some(EMPTY_TASK_MESSAGE);
            return SubmitOutcome::Rejected;
        }

        self.validation = None;
        let id = self.store.add_task(value.to_string());
        self.form_input.clear();
        SubmitOutcome::Added(id)
    }

    #[tracing::instrument(skip(self))]
    pub fn toggle(&mut self, id: &str, checked: bool) {
        self.blur_edit();
        self.store.update_task(id, TaskPatch::completed(checked));
    }

    #[tracing::instrument(skip(self))]
    pub fn select_filter(&mut self, filter: Filter) {
        self.blur_edit();
        self.store.set_filter(filter);
    }

    #[tracing::instrument(skip(self))]
    pub fn clear_completed(&mut self) {
        self.blur_edit();
        self.store.clear_completed();
    }

    /// Marks the row and schedules its removal after the delete delay.
    /// Returns `None` when no such task exists.
    #[tracing::instrument(skip(self, now))]
    pub fn delete(&mut self, id: &str, now: Instant) -> Option<TimerHandle> {
        self.blur_edit();
        if let Some(handle) = self.removing.get(id) {
            return Some(*handle);
        }
        self.store.get(id)?;

        let handle = self.deferred.schedule(now, self.delete_delay, id.to_string());
        self.removing.insert(id.to_string(), handle);
        self.store.mark_removing(id);
        debug!(?handle, "removal scheduled");
        Some(handle)
    }

    pub fn cancel_delete(&mut self, handle: TimerHandle) -> bool {
        match self.deferred.cancel(handle) {
            Some(id) => {
                self.removing.remove(&id);
                debug!(id = %id, "removal cancelled");
                self.store.unmark_removing(&id);
                true
            }
            None => false,
        }
    }

    /// Runs every deferred removal due at `now`. Returns how many fired.
    pub fn advance(&mut self, now: Instant) -> usize {
        let due = self.deferred.take_due(now);
        let fired = due.len();
        for (_, id) in due {
            self.removing.remove(&id);
            self.store.remove_task(&id);
        }
        fired
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.deferred.next_deadline()
    }

    pub fn has_pending_removals(&self) -> bool {
        !self.deferred.is_empty()
    }

    /// Edit action or double activation on a row.
    #[tracing::instrument(skip(self))]
    pub fn begin_edit(&mut self, id: &str) -> bool {
        if let EditState::Editing { id: current, .. } = &self.edit {
            if current == id {
                return true;
            }
            self.blur_edit();
        }

        let Some(task) = self.store.get(id) else {
            debug!("edit requested for absent task");
            return false;
        };
        self.edit = EditState::Editing {
            id: id.to_string(),
            buffer: task.text.clone(),
        };
        true
    }

    pub fn edit_input(&mut self, value: &str) {
        if let EditState::Editing { buffer, .. } = &mut self.edit {
            *buffer = value.chars().take(MAX_TEXT_LEN).collect();
        }
    }

    pub fn commit_edit(&mut self) -> EditOutcome {
        self.finish_edit(EditExit::Enter)
    }

    pub fn blur_edit(&mut self) -> EditOutcome {
        self.finish_edit(EditExit::Blur)
    }

    pub fn cancel_edit(&mut self) -> EditOutcome {
        self.finish_edit(EditExit::Escape)
    }

    /// Leaves the edit session. Only the first exit of a session has any
    /// effect.
    #[tracing::instrument(skip(self))]
    pub fn finish_edit(&mut self, exit: EditExit) -> EditOutcome {
        let EditState::Editing { id, buffer } = std::mem::take(&mut self.edit) else {
            return EditOutcome::Ignored;
        };

        let next = buffer.trim();
        if exit != EditExit::Escape && !next.is_empty() {
            self.store.update_task(&id, TaskPatch::text(next));
            EditOutcome::Updated
        } else {
            debug!(id = %id, "edit discarded");
            self.store.render();
            EditOutcome::Discarded
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use std::time::{Duration, Instant};

    use super::{Controller, EditOutcome, EditState, SubmitOutcome};
    use crate::locale::EMPTY_TASK_MESSAGE;
    use crate::store::TaskStore;
    use crate::task::{AppState, Filter, MAX_TEXT_LEN};
    use crate::view::{ViewModel, filtered_tasks};

    fn controller() -> Controller {
        Controller::new(TaskStore::in_memory())
    }

    fn added(outcome: SubmitOutcome) -> String {
        match outcome {
            SubmitOutcome::Added(id) => id,
            SubmitOutcome::Rejected => panic!("submit was rejected"),
        }
    }

    #[test]
    fn blank_submit_shows_message_without_mutation() {
        let mut c = controller();
        for input in ["", "   ", "\t\n"] {
            assert_eq!(c.submit(input), SubmitOutcome::Rejected);
            assert!(c.store().state().tasks.is_empty());
            assert_eq!(c.validation_message(), Some(EMPTY_TASK_MESSAGE));
        }

        c.input_changed("B");
        assert_eq!(c.validation_message(), None);
    }

    #[test]
    fn submit_trims_adds_and_clears_form() {
        let mut c = controller();
        c.submit("");
        let id = added(c.submit("  Buy milk  "));

        let tasks = &c.store().state().tasks;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, id);
        assert_eq!(tasks[0].text, "Buy milk");
        assert_eq!(c.validation_message(), None);
        assert_eq!(c.form_input(), "");
    }

    #[test]
    fn escape_discards_and_enter_commits() {
        let mut c = controller();
        let id = added(c.submit("original"));
        let created = c.store().get(&id).unwrap().created_at;

        assert!(c.begin_edit(&id));
        c.edit_input("changed");
        assert_eq!(c.cancel_edit(), EditOutcome::Discarded);
        assert_eq!(c.store().get(&id).unwrap().text, "original");
        assert_eq!(c.edit_state(), &EditState::Viewing);

        assert!(c.begin_edit(&id));
        c.edit_input("  changed  ");
        assert_eq!(c.commit_edit(), EditOutcome::Updated);

        let task = c.store().get(&id).unwrap();
        assert_eq!(task.text, "changed");
        assert_eq!(task.id, id);
        assert_eq!(task.created_at, created);
    }

    #[test]
    fn blank_commit_or_blur_discards() {
        let mut c = controller();
        let id = added(c.submit("keep me"));

        c.begin_edit(&id);
        c.edit_input("   ");
        assert_eq!(c.commit_edit(), EditOutcome::Discarded);

        c.begin_edit(&id);
        c.edit_input("");
        assert_eq!(c.blur_edit(), EditOutcome::Discarded);

        assert_eq!(c.store().get(&id).unwrap().text, "keep me");
    }

    #[test]
    fn only_first_exit_of_a_session_counts() {
        let mut c = controller();
        let id = added(c.submit("a"));
        let renders = Rc::new(Cell::new(0));
        let counter = Rc::clone(&renders);
        c.subscribe(move |_: &AppState| counter.set(counter.get() + 1));

        c.begin_edit(&id);
        c.edit_input("b");
        assert_eq!(c.commit_edit(), EditOutcome::Updated);
        assert_eq!(c.blur_edit(), EditOutcome::Ignored);
        assert_eq!(c.cancel_edit(), EditOutcome::Ignored);
        assert_eq!(renders.get(), 1);
    }

    #[test]
    fn edit_buffer_is_bounded() {
        let mut c = controller();
        let id = added(c.submit("short"));
        c.begin_edit(&id);
        c.edit_input(&"я".repeat(MAX_TEXT_LEN + 30));
        c.commit_edit();

        assert_eq!(c.store().get(&id).unwrap().text.chars().count(), MAX_TEXT_LEN);
    }

    #[test]
    fn switching_rows_blurs_the_open_session() {
        let mut c = controller();
        let first = added(c.submit("first"));
        let second = added(c.submit("second"));

        c.begin_edit(&first);
        c.edit_input("first, edited");
        c.begin_edit(&second);

        assert_eq!(c.store().get(&first).unwrap().text, "first, edited");
        assert!(matches!(c.edit_state(), EditState::Editing { id, buffer } if *id == second && buffer == "second"));
        assert!(!c.begin_edit("missing"));
    }

    #[test]
    fn delete_waits_for_the_delay() {
        let mut c = controller();
        let id = added(c.submit("doomed"));
        let start = Instant::now();

        assert!(c.delete(&id, start).is_some());
        assert!(c.is_removing(&id));
        assert!(c.store().state().is_removing(&id));
        assert_eq!(c.advance(start + Duration::from_millis(199)), 0);
        assert!(c.store().get(&id).is_some());

        assert_eq!(c.advance(start + Duration::from_millis(200)), 1);
        assert!(c.store().get(&id).is_none());
        assert!(!c.is_removing(&id));
    }

    #[test]
    fn deferred_removal_of_vanished_task_is_a_no_op() {
        let mut c = controller();
        let doomed = added(c.submit("doomed"));
        let other = added(c.submit("other"));
        let start = Instant::now();

        c.toggle(&doomed, true);
        c.delete(&doomed, start);
        assert_eq!(c.delete(&doomed, start), c.delete(&doomed, start));
        c.clear_completed();

        assert_eq!(c.advance(start + Duration::from_secs(1)), 1);
        let tasks = &c.store().state().tasks;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, other);
    }

    #[test]
    fn cancelled_delete_keeps_task() {
        let mut c = controller();
        let id = added(c.submit("saved"));
        let start = Instant::now();

        let handle = c.delete(&id, start).unwrap();
        assert!(c.cancel_delete(handle));
        assert!(!c.is_removing(&id));
        assert!(!c.store().state().is_removing(&id));
        assert_eq!(c.advance(start + Duration::from_secs(1)), 0);
        assert!(c.store().get(&id).is_some());
        assert!(c.delete("missing", start).is_none());
    }

    #[test]
    fn delete_and_keep_each_render_the_mark() {
        let mut c = controller();
        let id = added(c.submit("doomed"));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        c.subscribe(move |state: &AppState| {
            sink.borrow_mut().push(ViewModel::project(state).rows[0].removing)
        });
        let start = Instant::now();

        let handle = c.delete(&id, start).unwrap();
        c.delete(&id, start);
        c.cancel_delete(handle);

        assert_eq!(*seen.borrow(), vec![true, false]);
    }

    #[test]
    fn toggle_then_filter() {
        let mut c = controller();
        let id = added(c.submit("walk"));
        c.submit("read");

        c.toggle(&id, true);
        c.select_filter(Filter::Active);
        assert!(filtered_tasks(c.store().state()).iter().all(|t| t.id != id));

        c.select_filter(Filter::Completed);
        let visible = filtered_tasks(c.store().state());
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, id);
    }
}
