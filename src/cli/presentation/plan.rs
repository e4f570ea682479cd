//! Plan presentation: summary header plus a batch table.

use crate::planner::Plan;
use comfy_table::Table;

pub fn format_plan_text(plan: &Plan) -> String {
    let summary = plan.summary();
    let mut output = format!(
        "Plan: {} over {} ({} batches, {} quadrants)\n",
        plan.kind, plan.area, summary.batches, summary.quadrants
    );
    if plan.is_empty() {
        output.push_str("Nothing to generate: every quadrant in the area is generated or queued.\n");
        return output;
    }
    let shapes: Vec<String> = summary
        .by_shape
        .iter()
        .map(|(shape, count)| format!("{} x{}", shape, count))
        .collect();
    output.push_str(&format!("Shapes: {}\n\n", shapes.join(", ")));

    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["#", "Shape", "Quadrants"]);
    for (index, batch) in plan.batches.iter().enumerate() {
        table.add_row(vec![
            index.to_string(),
            batch.shape().to_string(),
            batch.to_string(),
        ]);
    }
    output.push_str(&table.to_string());
    output
}

pub fn format_plan_json(plan: &Plan) -> String {
    let out = serde_json::json!({
        "plan": plan,
        "summary": plan.summary(),
    });
    serde_json::to_string_pretty(&out).unwrap_or_else(|_| "{}".to_string())
}
