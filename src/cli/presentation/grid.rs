//! Grid summary presentation.

use crate::api::GridSummary;

pub fn format_grid_text(summary: &GridSummary) -> String {
    let mut output = format!("Generated quadrants: {}\n", summary.generated);
    match summary.bounds {
        Some(bounds) => output.push_str(&format!(
            "Bounds: {} ({} x {})\n",
            bounds,
            bounds.width(),
            bounds.height()
        )),
        None => output.push_str("Bounds: (empty grid)\n"),
    }
    output.push_str(&format!("Queued quadrants: {}\n", summary.reserved));
    output
}

pub fn format_grid_json(summary: &GridSummary) -> String {
    serde_json::to_string_pretty(summary).unwrap_or_else(|_| "{}".to_string())
}
