use std::fmt::Display;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

#[derive(Debug, Clone, Copy)]
pub enum Message {
    LoadTheme,
    Converting,
    ConvertOK(usize),
}

impl Message {
    pub fn print(self) {
        if ENABLE_DUMMY.load(Ordering::Relaxed) {
            return;
        }

        eprintln!("{self}")
    }
}

impl Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use Message::*;

        let mut write_step = |msg: &str, step: Range<usize>| {
            let step = format!("[{}/{}]", step.start, step.end);

            write!(f, "{} {:40}", style(step).bold().dim(), msg)
        };

        match self {
            LoadTheme => write_step("🎨 Loading theme...", 1..2),
            Converting => write_step("📝 Converting...", 2..2),
            ConvertOK(count) => write!(
                f,
                "\n Converted {} {}",
                style(count).bold(),
                style(match count {
                    1 => "document.",
                    _ => "documents.",
                })
                .bold()
                .bright()
                .green()
            ),
        }
    }
}

static ENABLE_DUMMY: AtomicBool = AtomicBool::new(false);

const TICK_DURATION: Duration = Duration::from_millis(100);

/// A stage spinner on stderr. Prints `[OK]` when finished, `[FAIL]` when dropped unfinished.
#[must_use]
pub enum Progressor {
    Real { bar: ProgressBar, msg: String, ok: bool },
    Dummy,
}

impl Progressor {
    /// Silences all stage output, e.g. when the document itself goes to the terminal.
    pub fn set_dummy(value: bool) {
        ENABLE_DUMMY.store(value, Ordering::SeqCst)
    }

    pub fn new(msg: Message) -> Self {
        if ENABLE_DUMMY.load(Ordering::Relaxed) {
            return Self::Dummy;
        }

        let bar = ProgressBar::new_spinner().with_style(spinner_style());
        let msg = format!("{msg}");

        bar.set_message(msg.clone());
        bar.enable_steady_tick(TICK_DURATION);

        Self::Real { bar, msg, ok: false }
    }

    pub fn finish(mut self) {
        let Self::Real { bar, msg, ok } = &mut self else {
            return;
        };

        bar.finish_and_clear();

        eprintln!("{} {}", msg, style("[OK]").green().bright().bold());

        *ok = true;
    }
}

impl Drop for Progressor {
    fn drop(&mut self) {
        let Self::Real { bar, msg, ok } = self else {
            return;
        };

        if *ok {
            return;
        }

        bar.finish_and_clear();

        eprintln!("{} {}", msg, style("[FAIL]").red().bright().bold())
    }
}

/// A counting bar for batch conversion, hidden when output is silenced.
pub fn batch_bar(len: usize) -> ProgressBar {
    if ENABLE_DUMMY.load(Ordering::Relaxed) {
        return ProgressBar::hidden();
    }

    ProgressBar::new(len as u64).with_style(bar_style())
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg} {spinner:.green} [{elapsed_precise}]")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{wide_bar:.green/dim} {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}
