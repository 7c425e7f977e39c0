use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color as TableColor, ContentArrangement, Table};

use crate::history::JobHistory;

/// Table and cell creation helpers
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn cyan_header(labels: &[&str]) -> Vec<Cell> {
    labels
        .iter()
        .map(|label| Cell::new(*label).fg(TableColor::Cyan))
        .collect()
}

/// Red at or above the threshold, yellow while failing below it, green otherwise.
pub fn color_coded_count_cell(count: usize, threshold: usize) -> Cell {
    let cell = Cell::new(count);
    if count >= threshold {
        cell.fg(TableColor::Red)
    } else if count > 0 {
        cell.fg(TableColor::Yellow)
    } else {
        cell.fg(TableColor::Green)
    }
}

/// Oldest-first strip of the window, one mark per run.
pub fn window_cell(history: &JobHistory) -> Cell {
    let strip: String = history
        .jobs_info
        .iter()
        .map(|execution| if execution.failing { '✗' } else { '✓' })
        .collect();

    if history.last_failing() {
        Cell::new(strip).fg(TableColor::Red)
    } else {
        Cell::new(strip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::JobExecution;

    #[test]
    fn test_window_cell_strip() {
        let mut history = JobHistory::default();
        history.record(JobExecution::passed(), 10);
        history.record(JobExecution::failed(3), 10);

        let cell = window_cell(&history);
        assert_eq!(cell.content(), "✓✗");
    }

    #[test]
    fn test_count_cell_content() {
        assert_eq!(color_coded_count_cell(4, 3).content(), "4");
    }
}
