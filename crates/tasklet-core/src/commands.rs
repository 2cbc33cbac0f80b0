use std::io::{BufRead, Write};
use std::time::Instant;

use anyhow::{Context, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::cli::Command;
use crate::controller::{Controller, EditOutcome, EditState, SubmitOutcome};
use crate::locale::EMPTY_TASK_MESSAGE;
use crate::task::{AppState, Filter};
use crate::view::filtered_tasks;

#[instrument(skip(controller, command))]
pub fn dispatch(controller: &mut Controller, command: Command) -> anyhow::Result<()> {
    debug!(?command, "dispatching command");

    match command {
        Command::Add { text } => cmd_add(controller, &text.join(" ")),
        Command::List { filter } => {
            controller.select_filter(filter);
            Ok(())
        }
        Command::Done { selector } => cmd_toggle(controller, &selector, true),
        Command::Undone { selector } => cmd_toggle(controller, &selector, false),
        Command::Edit { selector, text } => cmd_edit(controller, &selector, &text.join(" ")),
        Command::Delete { selector } => cmd_delete(controller, &selector),
        Command::ClearCompleted => {
            controller.clear_completed();
            Ok(())
        }
        Command::Shell => {
            let stdin = std::io::stdin();
            let stdout = std::io::stdout();
            Shell::new(controller, stdout.lock()).run(stdin.lock())
        }
    }
}

fn cmd_add(controller: &mut Controller, text: &str) -> anyhow::Result<()> {
    info!("command add");
    match controller.submit(text) {
        SubmitOutcome::Added(id) => {
            debug!(id = %id, "task created");
            Ok(())
        }
        SubmitOutcome::Rejected => Err(anyhow!(EMPTY_TASK_MESSAGE)),
    }
}

fn cmd_toggle(controller: &mut Controller, selector: &str, checked: bool) -> anyhow::Result<()> {
    info!(checked, "command toggle");
    let id = resolve_selector(controller.store().state(), selector)?;
    controller.toggle(&id, checked);
    Ok(())
}

fn cmd_edit(controller: &mut Controller, selector: &str, text: &str) -> anyhow::Result<()> {
    info!("command edit");
    let id = resolve_selector(controller.store().state(), selector)?;
    controller.begin_edit(&id);
    controller.edit_input(text);
    if controller.commit_edit() == EditOutcome::Discarded {
        warn!(id = %id, "empty text; edit discarded");
    }
    Ok(())
}

fn cmd_delete(controller: &mut Controller, selector: &str) -> anyhow::Result<()> {
    info!("command delete");
    let id = resolve_selector(controller.store().state(), selector)?;
    controller.delete(&id, Instant::now());
    drain_removals(controller);
    Ok(())
}

/// Sleeps until every scheduled removal has fired.
pub fn drain_removals(controller: &mut Controller) {
    while let Some(deadline) = controller.next_deadline() {
        let now = Instant::now();
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
        controller.advance(Instant::now());
    }
}

/// A 1-based row number in the current view, or a unique id prefix.
pub fn resolve_selector(state: &AppState, selector: &str) -> anyhow::Result<String> {
    let selector = selector.trim();
    if selector.is_empty() {
        return Err(anyhow!("task selector cannot be empty"));
    }

    if let Ok(row) = selector.parse::<usize>() {
        let visible = filtered_tasks(state);
        return row
            .checked_sub(1)
            .and_then(|idx| visible.get(idx))
            .map(|task| task.id.clone())
            .ok_or_else(|| anyhow!("no task in row {row}"));
    }

    let mut matches = state.tasks.iter().filter(|task| task.id.starts_with(selector));
    let first = matches
        .next()
        .ok_or_else(|| anyhow!("no task matches {selector}"))?;
    if matches.next().is_some() {
        return Err(anyhow!("ambiguous task id prefix: {selector}"));
    }
    Ok(first.id.clone())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Line-oriented interactive loop over a [`Controller`].
pub struct Shell<'c, W: Write> {
    controller: &'c mut Controller,
    out: W,
    /// Set when a removal fired since the user last saw the list, so row
    /// numbers typed on this line may point at a different task.
    renumbered: bool,
}

impl<'c, W: Write> Shell<'c, W> {
    pub fn new(controller: &'c mut Controller, out: W) -> Self {
        Self {
            controller,
            out,
            renumbered: false,
        }
    }

    pub fn run<R: BufRead>(mut self, input: R) -> anyhow::Result<()> {
        self.prompt()?;
        for line in input.lines() {
            let line = line.context("failed reading input")?;
            let flow = self.handle_line(&line, Instant::now())?;
            if flow == Flow::Quit {
                break;
            }
            self.prompt()?;
        }

        self.controller.blur_edit();
        drain_removals(self.controller);
        Ok(())
    }

    #[instrument(skip(self, now))]
    pub fn handle_line(&mut self, line: &str, now: Instant) -> anyhow::Result<Flow> {
        let fired = self.controller.advance(now);
        self.renumbered = fired > 0;
        if self.renumbered {
            debug!(fired, "removals fired before input was handled");
        }

        if matches!(self.controller.edit_state(), EditState::Editing { .. }) {
            if line.trim() == ":cancel" {
                self.controller.cancel_edit();
            } else {
                self.controller.edit_input(line);
                self.controller.commit_edit();
            }
            return Ok(Flow::Continue);
        }
        self.controller.input_changed(line);

        let (word, rest) = line
            .trim()
            .split_once(char::is_whitespace)
            .map(|(word, rest)| (word, rest.trim()))
            .unwrap_or((line.trim(), ""));

        let result = match word {
            "" => Ok(()),
            "quit" | "exit" => return Ok(Flow::Quit),
            "help" => self.help(),
            // A rejected add leaves the message for the next prompt.
            "add" => {
                self.controller.submit(rest);
                Ok(())
            }
            "done" | "undone" => self.with_selected(rest, |c, id| c.toggle(id, word == "done")),
            "edit" => self.start_edit(rest),
            "delete" => self.with_selected(rest, |c, id| {
                c.delete(id, now);
            }),
            "keep" => self.keep(rest),
            "filter" | "list" => {
                let filter = if rest.is_empty() {
                    Ok(self.controller.store().state().filter)
                } else {
                    rest.parse::<Filter>()
                };
                filter.map(|filter| self.controller.select_filter(filter))
            }
            "clear" => {
                self.controller.clear_completed();
                Ok(())
            }
            other => Err(anyhow!("unknown command: {other} (try help)")),
        };

        if let Err(err) = result {
            writeln!(self.out, "{err:#}")?;
        }
        Ok(Flow::Continue)
    }

    fn select(&self, selector: &str) -> anyhow::Result<String> {
        let selector = selector.trim();
        let is_row = !selector.is_empty() && selector.chars().all(|ch| ch.is_ascii_digit());
        if self.renumbered && is_row {
            return Err(anyhow!(
                "rows changed after a removal; check the list and retry"
            ));
        }
        resolve_selector(self.controller.store().state(), selector)
    }

    fn with_selected<F>(&mut self, selector: &str, action: F) -> anyhow::Result<()>
    where
        F: FnOnce(&mut Controller, &str),
    {
        let id = self.select(selector)?;
        action(self.controller, &id);
        Ok(())
    }

    fn start_edit(&mut self, selector: &str) -> anyhow::Result<()> {
        let id = self.select(selector)?;
        self.controller.begin_edit(&id);
        if let EditState::Editing { buffer, .. } = self.controller.edit_state() {
            writeln!(self.out, "editing: {buffer}")?;
            writeln!(self.out, "new text (:cancel to keep):")?;
        }
        Ok(())
    }

    /// Cancels a pending delete of the selected row.
    fn keep(&mut self, selector: &str) -> anyhow::Result<()> {
        let id = self.select(selector)?;
        let handle = self
            .controller
            .pending_removal(&id)
            .ok_or_else(|| anyhow!("task is not being deleted"))?;
        self.controller.cancel_delete(handle);
        Ok(())
    }

    fn prompt(&mut self) -> anyhow::Result<()> {
        if let Some(message) = self.controller.validation_message() {
            writeln!(self.out, "{message}")?;
        }
        let marker = match self.controller.edit_state() {
            EditState::Editing { .. } => "edit> ",
            EditState::Viewing => "> ",
        };
        write!(self.out, "{marker}")?;
        self.out.flush()?;
        Ok(())
    }

    fn help(&mut self) -> anyhow::Result<()> {
        writeln!(
            self.out,
            "add TEXT | done N | undone N | edit N | delete N | keep N | \
             filter all|active|completed | clear | quit"
        )?;
        Ok(())
    }
}
