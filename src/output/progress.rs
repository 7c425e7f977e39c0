use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::styling::{bright, bright_green, bright_yellow};

const PHASES: [(&str, &str); 3] = [
    ("Fetching failed jobs", "Fetched failed jobs"),
    ("Updating job history", "Updated job history"),
    ("Sending alerts", "Alerts handled"),
];

/// Spinner on stderr walking through the `check-failures` phases.
pub struct PhaseProgress {
    pb: ProgressBar,
    phase: usize,
}

impl PhaseProgress {
    pub fn start() -> Self {
        eprintln!("{}  {}", bright("⚙️"), bright("Phases").underlined());
        Self {
            pb: create_spinner(&running_message(0)),
            phase: 0,
        }
    }

    /// Marks the current phase done and starts the next one.
    pub fn advance(self) -> Self {
        self.finish_current();
        let phase = self.phase + 1;
        Self {
            pb: create_spinner(&running_message(phase)),
            phase,
        }
    }

    pub fn finish(self) {
        self.finish_current();
        eprintln!();
    }

    fn finish_current(&self) {
        let done = PHASES.get(self.phase).map_or("Done", |(_, done)| done);
        self.pb.finish_with_message(
            bright_green(format!(
                "Phase {}/{}: {done} ✓",
                self.phase + 1,
                PHASES.len()
            ))
            .to_string(),
        );
    }
}

fn running_message(phase: usize) -> String {
    let running = PHASES.get(phase).map_or("Working", |(running, _)| running);
    bright_yellow(format!("Phase {}/{}: {running}", phase + 1, PHASES.len())).to_string()
}

fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_draw_target(ProgressDrawTarget::stderr());
    if let Ok(style) = ProgressStyle::default_spinner().template("  {msg} {spinner}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
