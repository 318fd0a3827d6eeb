//! Line-oriented terminal renderer
//!
//! A terminal cannot redraw earlier output, so each segment remembers how much
//! of its text was already printed and only the new tail is written.

use crate::protocol::{InterventionPrompt, Notification};
use crate::runtime::RenderTarget;
use crate::state_machine::SessionState;
use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Default)]
struct Screen {
    /// Bytes of each placeholder's text already on screen
    printed: Vec<usize>,
    /// Cursor is not at the start of a line
    mid_line: bool,
}

impl Screen {
    fn break_line(&mut self, out: &mut impl Write) -> io::Result<()> {
        if self.mid_line {
            writeln!(out)?;
            self.mid_line = false;
        }
        Ok(())
    }

    fn line(&mut self, out: &mut impl Write, text: &str) -> io::Result<()> {
        self.break_line(out)?;
        writeln!(out, "{text}")
    }
}

#[derive(Debug, Default)]
pub struct TerminalRenderer {
    screen: Mutex<Screen>,
}

impl TerminalRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    fn draw(&self, f: impl FnOnce(&mut Screen, &mut io::StdoutLock<'_>) -> io::Result<()>) {
        let mut screen = self.screen.lock().unwrap_or_else(PoisonError::into_inner);
        let mut out = io::stdout().lock();
        if let Err(e) = f(&mut screen, &mut out).and_then(|()| out.flush()) {
            tracing::debug!(error = %e, "Terminal write failed");
        }
    }
}

impl RenderTarget for TerminalRenderer {
    type Handle = usize;

    fn create_response_placeholder(&self) -> usize {
        let mut screen = self.screen.lock().unwrap_or_else(PoisonError::into_inner);
        screen.printed.push(0);
        screen.printed.len() - 1
    }

    fn render_segment(&self, handle: &usize, text: &str) {
        self.draw(|screen, out| {
            let Some(printed) = screen.printed.get(*handle).copied() else {
                return Ok(());
            };
            let tail = match text.get(printed..) {
                Some(tail) => tail,
                // Not an extension of what is on screen; start over on a new line
                None => {
                    screen.break_line(out)?;
                    text
                }
            };
            if tail.is_empty() {
                return Ok(());
            }
            if printed == 0 {
                screen.break_line(out)?;
                write!(out, "agent> ")?;
            }
            write!(out, "{tail}")?;
            screen.mid_line = !tail.ends_with('\n');
            screen.printed[*handle] = text.len();
            Ok(())
        });
    }

    fn append_notification(&self, _handle: &usize, notification: &Notification) {
        self.draw(|screen, out| {
            screen.line(out, &format!("  [{}] {}", notification.kind(), notification.data()))
        });
    }

    fn render_error(&self, _handle: &usize, message: &str) {
        self.draw(|screen, out| screen.line(out, &format!("  ! {message}")));
    }

    fn append_user_entry(&self, text: &str) {
        self.draw(|screen, out| screen.line(out, &format!("you> {text}")));
    }

    fn append_failure(&self, message: &str) {
        self.draw(|screen, out| screen.line(out, &format!("! {message}")));
    }

    fn show_intervention(&self, prompt: &InterventionPrompt) {
        self.draw(|screen, out| {
            screen.line(out, &format!("? {}", prompt.question))?;
            if let Some(fields) = &prompt.fields {
                for (key, value) in fields.query_params() {
                    screen.line(out, &format!("    {key}: {value}"))?;
                }
                screen.line(out, "  reply 'y' to confirm, or name=...; birthday=... to correct")
            } else {
                screen.line(out, "  type your answer")
            }
        });
    }

    fn clear_intervention(&self) {}

    fn set_status(&self, state: &SessionState) {
        if *state == SessionState::Idle {
            self.draw(|screen, out| screen.break_line(out));
        }
    }
}
