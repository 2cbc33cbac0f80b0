//! User-facing strings. The interface speaks Russian, so counts take one of
//! three grammatical forms.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluralCategory {
    One,
    Few,
    Many,
}

#[derive(Debug, Clone, Copy)]
pub struct PluralForms {
    pub one: &'static str,
    pub few: &'static str,
    pub many: &'static str,
}

impl PluralForms {
    pub fn select(&self, count: u64) -> &'static str {
        match plural_category(count) {
            PluralCategory::One => self.one,
            PluralCategory::Few => self.few,
            PluralCategory::Many => self.many,
        }
    }
}

pub const TASK_FORMS: PluralForms = PluralForms {
    one: "задача",
    few: "задачи",
    many: "задач",
};

pub const ITEMS_LEFT_SUFFIX: &str = "осталось";

pub const EMPTY_TASK_MESSAGE: &str = "Введите текст задачи.";

/// Appended to a row that is about to disappear.
pub const REMOVING_NOTE: &str = "(удаляется)";

pub fn plural_category(count: u64) -> PluralCategory {
    let mod10 = count % 10;
    let mod100 = count % 100;

    if mod10 == 1 && mod100 != 11 {
        PluralCategory::One
    } else if (2..=4).contains(&mod10) && !(10..20).contains(&mod100) {
        PluralCategory::Few
    } else {
        PluralCategory::Many
    }
}
