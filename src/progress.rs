//! Terminal progress: a spinner around pending work and assistant notes
//!
//! Purely observational. Wrapping a future never changes its output, and
//! when disabled the future is simply awaited.

use std::future::Future;
use std::io::{self, Write};
use std::time::Duration;

use crossterm::{
    cursor::{Hide, MoveToColumn, Show},
    execute,
    style::{Print, Stylize},
    terminal::{Clear, ClearType},
};

/// Spinner animation frames - braille pattern spinner
const FRAMES: [char; 10] = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];

const FRAME_DURATION: Duration = Duration::from_millis(80);

/// Progress reporter for the fix loop
#[derive(Debug, Clone, Copy)]
pub struct Progress {
    spinner: bool,
    notes: bool,
}

impl Progress {
    /// Spinner on stderr and notes on stdout
    pub fn terminal() -> Self {
        Self {
            spinner: true,
            notes: true,
        }
    }

    /// Notes only, no animation (non-interactive output)
    pub fn plain() -> Self {
        Self {
            spinner: false,
            notes: true,
        }
    }

    /// Nothing at all
    pub fn silent() -> Self {
        Self {
            spinner: false,
            notes: false,
        }
    }

    /// Await `fut` while showing `label` next to a spinner
    pub async fn spin<F: Future>(&self, label: &str, fut: F) -> F::Output {
        if !self.spinner {
            return fut.await;
        }

        let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel::<()>();
        let label = label.to_string();
        let ticker = tokio::spawn(async move {
            let mut interval = tokio::time::interval(FRAME_DURATION);
            let mut stderr = io::stderr();
            let _ = execute!(stderr, Hide);
            let mut frame = 0usize;
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = interval.tick() => {
                        let glyph = FRAMES[frame % FRAMES.len()];
                        let _ = execute!(
                            stderr,
                            MoveToColumn(0),
                            Clear(ClearType::CurrentLine),
                            Print(format!("{} {}", glyph.to_string().cyan(), label))
                        );
                        frame += 1;
                    }
                }
            }
            let _ = execute!(stderr, MoveToColumn(0), Clear(ClearType::CurrentLine), Show);
            let _ = stderr.flush();
        });

        let output = fut.await;
        let _ = stop_tx.send(());
        let _ = ticker.await;
        output
    }

    /// Surface the assistant's free text for one fix attempt
    pub fn assistant_note(&self, iteration: u32, text: &str) {
        if !self.notes {
            return;
        }
        println!("{}", format_note(iteration, text));
    }
}

fn format_note(iteration: u32, text: &str) -> String {
    format!(
        "{}{}",
        format!("Iteration {}", iteration).yellow(),
        format!(": 🤖 {}", text).cyan()
    )
}
