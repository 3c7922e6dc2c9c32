//! Terminal presentation sink: answers inline, tool cards as indented status lines.

use lib::stream::{CardState, PresentationSink, RenderAction, StreamOutcome};
use std::io::{self, Write};

/// Longest tool argument/result text printed before truncating.
const MAX_CARD_TEXT: usize = 240;

pub struct TerminalSink<W: Write> {
    out: W,
    mid_line: bool,
}

impl TerminalSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TerminalSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            mid_line: false,
        }
    }

    fn line_break(&mut self) -> io::Result<()> {
        if self.mid_line {
            writeln!(self.out)?;
            self.mid_line = false;
        }
        Ok(())
    }

    fn write_action(&mut self, action: RenderAction) -> io::Result<()> {
        match action {
            RenderAction::ShowPending => {
                write!(self.out, "… thinking")?;
                self.mid_line = true;
            }
            RenderAction::DismissPending => {
                // erase the indicator in place
                write!(self.out, "\r\x1b[2K")?;
                self.mid_line = false;
            }
            RenderAction::OpenAnswer { .. } => {
                self.line_break()?;
                write!(self.out, "< ")?;
                self.mid_line = true;
            }
            RenderAction::AppendText { text, .. } => {
                write!(self.out, "{}", text)?;
                self.mid_line = !text.ends_with('\n');
            }
            RenderAction::AppendError { text, .. } => {
                write!(self.out, " [error] {}", text)?;
                self.mid_line = true;
            }
            RenderAction::SealAnswer { .. } => self.line_break()?,
            RenderAction::OpenToolCard { key, name, arguments } => {
                self.line_break()?;
                writeln!(
                    self.out,
                    "  ⚙ {} ({}) {}",
                    name,
                    key,
                    truncate(&arguments, MAX_CARD_TEXT)
                )?;
            }
            RenderAction::UpdateToolCard { key, state, text } => {
                self.line_break()?;
                let label = match state {
                    CardState::Announced => "announced",
                    CardState::Running => "running",
                    CardState::Completed => "done",
                };
                match text {
                    Some(t) => writeln!(self.out, "  ⚙ {} {}: {}", key, label, truncate(&t, MAX_CARD_TEXT))?,
                    None => writeln!(self.out, "  ⚙ {} {}", key, label)?,
                }
            }
            RenderAction::StreamEnded { outcome } => {
                self.line_break()?;
                if let StreamOutcome::Failed(message) = outcome {
                    writeln!(self.out, "[stream failed] {}", message)?;
                }
            }
        }
        self.out.flush()
    }
}

impl<W: Write> PresentationSink for TerminalSink<W> {
    fn render(&mut self, action: RenderAction) {
        if let Err(e) = self.write_action(action) {
            log::debug!("terminal write failed: {}", e);
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    let one_line = s.replace('\n', " ");
    match one_line.char_indices().nth(max) {
        Some((cut, _)) => format!("{}…", &one_line[..cut]),
        None => one_line,
    }
}
