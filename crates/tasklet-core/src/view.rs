use crate::locale::{ITEMS_LEFT_SUFFIX, TASK_FORMS};
use crate::task::{AppState, Filter, Task};

pub fn filtered_tasks(state: &AppState) -> Vec<&Task> {
    state
        .tasks
        .iter()
        .filter(|task| state.filter.matches(task))
        .collect()
}

/// Counted over the full list; the active filter never changes it.
pub fn remaining_count(state: &AppState) -> usize {
    state.tasks.iter().filter(|task| !task.completed).count()
}

pub fn pluralize_label(count: usize) -> &'static str {
    TASK_FORMS.select(count as u64)
}

pub fn items_left_text(count: usize) -> String {
    format!("{count} {} {ITEMS_LEFT_SUFFIX}", pluralize_label(count))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub id: String,
    pub text: String,
    pub completed: bool,
    /// Deleted but not yet removed.
    pub removing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterIndicator {
    pub filter: Filter,
    pub active: bool,
}

/// Everything a renderer needs, derived from one state snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewModel {
    pub rows: Vec<Row>,
    pub remaining: usize,
    pub items_left: String,
    pub completed_count: usize,
    pub filters: [FilterIndicator; 3],
}

impl ViewModel {
    pub fn project(state: &AppState) -> Self {
        let rows = filtered_tasks(state)
            .into_iter()
            .map(|task| Row {
                id: task.id.clone(),
                text: task.text.clone(),
                completed: task.completed,
                removing: state.is_removing(&task.id),
            })
            .collect();
        let remaining = remaining_count(state);

        Self {
            rows,
            remaining,
            items_left: items_left_text(remaining),
            completed_count: state.tasks.len() - remaining,
            filters: Filter::ALL.map(|filter| FilterIndicator {
                filter,
                active: filter == state.filter,
            }),
        }
    }

    pub fn active_filter(&self) -> Filter {
        self.filters
            .iter()
            .find(|indicator| indicator.active)
            .map(|indicator| indicator.filter)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{ViewModel, filtered_tasks, items_left_text, remaining_count};
    use crate::task::{AppState, Filter, Task};

    fn state(done: &[bool]) -> AppState {
        let now = Utc.timestamp_millis_opt(0).unwrap();
        let tasks = done
            .iter()
            .enumerate()
            .map(|(idx, completed)| {
                let mut task = Task::new(idx.to_string(), format!("t{idx}"), now);
                task.completed = *completed;
                task
            })
            .collect();
        AppState::with_tasks(tasks)
    }

    fn ids(tasks: Vec<&Task>) -> Vec<String> {
        tasks.into_iter().map(|t| t.id.clone()).collect()
    }

    #[test]
    fn filters_preserve_order() {
        let mut s = state(&[false, true, false, true]);
        assert_eq!(ids(filtered_tasks(&s)), ["0", "1", "2", "3"]);

        s.filter = Filter::Active;
        assert_eq!(ids(filtered_tasks(&s)), ["0", "2"]);

        s.filter = Filter::Completed;
        assert_eq!(ids(filtered_tasks(&s)), ["1", "3"]);
    }

    #[test]
    fn remaining_ignores_filter() {
        let mut s = state(&[false, true, false]);
        for filter in Filter::ALL {
            s.filter = filter;
            assert_eq!(remaining_count(&s), 2);
        }
    }

    #[test]
    fn counter_text_uses_plural_form() {
        assert_eq!(items_left_text(1), "1 задача осталось");
        assert_eq!(items_left_text(3), "3 задачи осталось");
        assert_eq!(items_left_text(11), "11 задач осталось");
    }

    #[test]
    fn view_model_marks_exactly_one_filter() {
        let mut s = state(&[true, false]);
        s.filter = Filter::Completed;
        let view = ViewModel::project(&s);

        assert_eq!(view.rows.len(), 1);
        assert_eq!(view.rows[0].id, "0");
        assert_eq!(view.remaining, 1);
        assert_eq!(view.completed_count, 1);
        assert_eq!(view.filters.iter().filter(|f| f.active).count(), 1);
        assert_eq!(view.active_filter(), Filter::Completed);
        assert!(!view.rows[0].removing);
    }

    #[test]
    fn rows_carry_the_removal_mark() {
        let mut s = state(&[false, false]);
        s.removing.insert("1".to_string());
        let marks: Vec<bool> = ViewModel::project(&s).rows.iter().map(|r| r.removing).collect();
        assert_eq!(marks, [false, true]);
    }
}
