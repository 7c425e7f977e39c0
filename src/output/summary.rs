use std::fmt::Write;

use comfy_table::Cell;
use indexmap::IndexSet;
use serde::Serialize;

use crate::history::{AlertKind, AlertSet, HistoryStore, TrackerSettings};

use super::styling::{bright, bright_green, bright_red, bright_yellow, cyan, dim};
use super::tables::{color_coded_count_cell, create_table, cyan_header, window_cell};

/// What a `check-failures` run saw and decided.
#[derive(Serialize)]
pub struct CheckOverview<'a> {
    pub project: &'a str,
    pub pipeline_id: u64,
    pub failed_jobs: usize,
    pub store: &'a HistoryStore,
    pub alerts: &'a AlertSet,
    pub settings: &'a TrackerSettings,
}

/// Prints the outcome of a `check-failures` run to stdout.
pub fn print_check_summary(overview: &CheckOverview<'_>) {
    println!("{}", render_check_summary(overview));
}

/// Prints every tracked job with its window and counters.
pub fn print_history(store: &HistoryStore, settings: &TrackerSettings) {
    println!("{}", render_history(store, settings));
}

fn add_section_header(output: &mut String, emoji: &str, title: &str) {
    let _ = writeln!(output, "{} {}", bright(emoji), bright(title).underlined());
}

fn render_check_summary(overview: &CheckOverview<'_>) -> String {
    let mut output = String::new();

    add_section_header(&mut output, "📊", "Overview");
    let _ = writeln!(output, "  {} {}", dim("Project:"), cyan(overview.project));
    let _ = writeln!(
        output,
        "  {} {}",
        dim("Pipeline:"),
        bright_yellow(overview.pipeline_id)
    );
    let _ = writeln!(
        output,
        "  {} {}",
        dim("Failed jobs:"),
        bright_yellow(overview.failed_jobs)
    );
    let _ = writeln!(
        output,
        "  {} {}",
        dim("Jobs tracked:"),
        bright_yellow(overview.store.jobs.len())
    );
    output.push('\n');

    add_section_header(&mut output, "🚨", "Alerts");
    if overview.alerts.is_empty() {
        let _ = writeln!(output, "  {}", bright_green("No job reached an alert threshold ✓"));
        return output;
    }

    let mut table = create_table();
    table.set_header(cyan_header(&["Job", "Alert", "Consecutive", "Cumulative"]));

    let alerted: IndexSet<&str> = overview
        .alerts
        .consecutive
        .job_names()
        .chain(overview.alerts.cumulative.job_names())
        .collect();

    for job in alerted {
        let Some(history) = overview.store.jobs.get(job) else {
            continue;
        };
        let kinds: Vec<&str> = [AlertKind::Consecutive, AlertKind::Cumulative]
            .into_iter()
            .filter(|kind| overview.alerts.get(*kind).contains(job))
            .map(|kind| match kind {
                AlertKind::Consecutive => "consecutive",
                AlertKind::Cumulative => "cumulative",
            })
            .collect();

        table.add_row(vec![
            Cell::new(job),
            Cell::new(bright_red(kinds.join(", "))),
            color_coded_count_cell(
                history.consecutive_failures,
                overview.settings.consecutive_threshold,
            ),
            color_coded_count_cell(
                history.cumulative_failures(),
                overview.settings.cumulative_threshold,
            ),
        ]);
    }

    let _ = writeln!(output, "{table}");
    output
}

fn render_history(store: &HistoryStore, settings: &TrackerSettings) -> String {
    let mut output = String::new();

    add_section_header(&mut output, "🗂️", "Job history");
    let _ = writeln!(
        output,
        "  {} {}",
        dim("Last pipeline:"),
        bright_yellow(store.pipeline_id)
    );
    if let Some(updated_at) = store.updated_at {
        let _ = writeln!(
            output,
            "  {} {}",
            dim("Updated:"),
            dim(updated_at.format("%Y-%m-%d %H:%M UTC"))
        );
    }
    output.push('\n');

    if store.is_empty() {
        let _ = writeln!(output, "{}", bright_yellow("No job history recorded."));
        return output;
    }

    let mut table = create_table();
    table.set_header(cyan_header(&[
        "Job",
        "Consecutive",
        "Cumulative",
        &format!("Last {} runs", settings.window_size),
    ]));

    let mut jobs: Vec<_> = store.jobs.iter().collect();
    jobs.sort_by(|(a_name, a), (b_name, b)| {
        b.consecutive_failures
            .cmp(&a.consecutive_failures)
            .then_with(|| b.cumulative_failures().cmp(&a.cumulative_failures()))
            .then_with(|| a_name.cmp(b_name))
    });

    for (name, history) in jobs {
        table.add_row(vec![
            Cell::new(name),
            color_coded_count_cell(history.consecutive_failures, settings.consecutive_threshold),
            color_coded_count_cell(history.cumulative_failures(), settings.cumulative_threshold),
            window_cell(history),
        ]);
    }

    let _ = writeln!(output, "{table}");
    output
}
