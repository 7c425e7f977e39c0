mod progress;
mod styling;
mod summary;
mod tables;

pub use progress::PhaseProgress;
pub use styling::{bright_yellow, cyan, dim, magenta_bold, verdict};
pub use summary::{print_check_summary, print_history, CheckOverview};

/// Prints the `pipewatch` banner to stderr.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("🚦 pipewatch"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("CI failure history and release gates")
    );
}
