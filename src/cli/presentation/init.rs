//! Init command presentation.

use crate::init::InitResult;

pub fn format_init_summary(result: &InitResult, force: bool) -> String {
    let mut output = String::from("Initializing mosaic workspace...\n\n");
    for path in &result.created {
        if force {
            output.push_str(&format!("  ✓ {} (written)\n", path));
        } else {
            output.push_str(&format!("  ✓ {}\n", path));
        }
    }
    for path in &result.skipped {
        output.push_str(&format!("  ⊘ {} (already exists, skipped)\n", path));
    }
    if !result.created.is_empty() {
        output.push_str("\nEdit config/config.toml to point [endpoints] at your model server.\n");
    }
    output
}
