//! Diff preview rendering for planned edits

/// Render a unified-style preview for replacing `old_lines` with `new_lines`
/// at 1-based line `start` of `file`.
pub fn render_preview(file: &str, start: u32, old_lines: &[&str], new_lines: &[&str]) -> String {
    let mut out = String::new();
    out.push_str(&format!("--- a/{}\n", file));
    out.push_str(&format!("+++ b/{}\n", file));
    out.push_str(&format!(
        "@@ -{},{} +{},{} @@\n",
        start,
        old_lines.len(),
        start,
        new_lines.len()
    ));

    for line in old_lines {
        out.push_str(&format!("-{}\n", line));
    }
    for line in new_lines {
        out.push_str(&format!("+{}\n", line));
    }

    out
}
