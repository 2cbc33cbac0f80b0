use std::io::{self, IsTerminal, Write};

use tracing::warn;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::locale::REMOVING_NOTE;
use crate::store::StoreObserver;
use crate::task::AppState;
use crate::view::ViewModel;

/// Prints the projected view as a table after every store commit.
#[derive(Debug)]
pub struct Renderer<W: Write = io::Stdout> {
    out: W,
    color: bool,
}

impl Renderer<io::Stdout> {
    pub fn new(cfg: &Config) -> Self {
        Self {
            out: io::stdout(),
            color: cfg.color && io::stdout().is_terminal(),
        }
    }
}

impl<W: Write> Renderer<W> {
    pub fn with_writer(out: W, color: bool) -> Self {
        Self { out, color }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    #[tracing::instrument(skip(self, view), fields(rows = view.rows.len()))]
    pub fn print_view(&mut self, view: &ViewModel) -> anyhow::Result<()> {
        let headers = vec!["#".to_string(), "Done".to_string(), "Task".to_string()];

        let rows = view
            .rows
            .iter()
            .enumerate()
            .map(|(idx, row)| {
                let number = self.paint(&(idx + 1).to_string(), "33");
                let mark = if row.completed { "[x]" } else { "[ ]" }.to_string();
                let text = if row.removing {
                    format!("{} {REMOVING_NOTE}", self.paint(&row.text, "9"))
                } else if row.completed {
                    self.paint(&row.text, "2")
                } else {
                    row.text.clone()
                };
                vec![number, mark, text]
            })
            .collect();

        write_table(&mut self.out, headers, rows)?;

        let filters = view
            .filters
            .iter()
            .map(|indicator| {
                if indicator.active {
                    self.paint(&format!("[{}]", indicator.filter), "1")
                } else {
                    indicator.filter.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(self.out, "{}  {filters}", view.items_left)?;
        self.out.flush()?;
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

impl<W: Write> StoreObserver for Renderer<W> {
    fn on_render(&mut self, state: &AppState) {
        let view = ViewModel::project(state);
        if let Err(err) = self.print_view(&view) {
            warn!(error = %format!("{err:#}"), "failed to render view");
        }
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
