//! Post-edit verification
//!
//! Syntactic validity checks keyed on file suffix. Failure triggers a
//! checkpoint rollback in the engine. Suffixes without a known check pass.

use std::path::Path;
use std::time::Duration;

use tracing::debug;

/// Outcome of verifying one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Check ran and passed
    Passed,
    /// Check ran and failed
    Failed(String),
    /// No check available for this suffix (treated as passing)
    Skipped,
}

impl VerifyOutcome {
    /// Whether the edit may stand
    pub fn is_ok(&self) -> bool {
        !matches!(self, VerifyOutcome::Failed(_))
    }
}

/// Verify a file after an edit, choosing the check by suffix
pub async fn verify_file(path: &Path) -> VerifyOutcome {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();

    let outcome = match ext.as_str() {
        "json" => verify_json(path),
        "yaml" | "yml" => verify_yaml(path),
        "py" => verify_with_command(path, "python3", &["-m", "py_compile"]).await,
        "sh" => verify_with_command(path, "bash", &["-n"]).await,
        "rs" => verify_delimiters(path),
        _ => VerifyOutcome::Skipped,
    };

    debug!(path = %path.display(), ?outcome, "Verified file");
    outcome
}

fn verify_json(path: &Path) -> VerifyOutcome {
    match std::fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<serde_json::Value>(&content) {
            Ok(_) => VerifyOutcome::Passed,
            Err(e) => VerifyOutcome::Failed(e.to_string()),
        },
        Err(e) => VerifyOutcome::Failed(e.to_string()),
    }
}

fn verify_yaml(path: &Path) -> VerifyOutcome {
    match std::fs::read_to_string(path) {
        Ok(content) => match serde_yaml::from_str::<serde_yaml::Value>(&content) {
            Ok(_) => VerifyOutcome::Passed,
            Err(e) => VerifyOutcome::Failed(e.to_string()),
        },
        Err(e) => VerifyOutcome::Failed(e.to_string()),
    }
}

/// Run an external syntax checker; if the checker binary is missing the
/// check is skipped rather than failed
async fn verify_with_command(path: &Path, program: &str, args: &[&str]) -> VerifyOutcome {
    let mut cmd = tokio::process::Command::new(program);
    cmd.args(args).arg(path);

    let result = tokio::time::timeout(Duration::from_secs(30), cmd.output()).await;

    match result {
        Ok(Ok(output)) if output.status.success() => VerifyOutcome::Passed,
        Ok(Ok(output)) => VerifyOutcome::Failed(String::from_utf8_lossy(&output.stderr).trim().to_string()),
        Ok(Err(_)) => VerifyOutcome::Skipped,
        Err(_) => VerifyOutcome::Failed(format!("{} timed out", program)),
    }
}

/// Cheap structural check for Rust sources: brackets must balance outside
/// of string/char literals and comments
fn verify_delimiters(path: &Path) -> VerifyOutcome {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => return VerifyOutcome::Failed(e.to_string()),
    };

    let mut depth_paren: i64 = 0;
    let mut depth_brace: i64 = 0;
    let mut depth_bracket: i64 = 0;

    let mut chars = content.chars().peekable();
    let mut in_string = false;
    let mut in_char = false;
    let mut in_line_comment = false;
    let mut block_comment: u32 = 0;

    while let Some(c) = chars.next() {
        if in_line_comment {
            if c == '\n' {
                in_line_comment = false;
            }
            continue;
        }
        if block_comment > 0 {
            if c == '*' && chars.peek() == Some(&'/') {
                chars.next();
                block_comment -= 1;
            } else if c == '/' && chars.peek() == Some(&'*') {
                chars.next();
                block_comment += 1;
            }
            continue;
        }
        if in_string {
            if c == '\\' {
                chars.next();
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        if in_char {
            if c == '\\' {
                chars.next();
            } else if c == '\'' {
                in_char = false;
            }
            continue;
        }

        match c {
            '/' if chars.peek() == Some(&'/') => in_line_comment = true,
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                block_comment = 1;
            }
            '"' => in_string = true,
            // Only treat a quote as a char literal when it closes nearby;
            // lifetimes ('a) never do
            '\'' => {
                let rest: String = chars.clone().take(3).collect();
                if rest.starts_with('\\') || rest.chars().nth(1) == Some('\'') {
                    in_char = true;
                }
            }
            '(' => depth_paren += 1,
            ')' => depth_paren -= 1,
            '{' => depth_brace += 1,
            '}' => depth_brace -= 1,
            '[' => depth_bracket += 1,
            ']' => depth_bracket -= 1,
            _ => {}
        }

        if depth_paren < 0 || depth_brace < 0 || depth_bracket < 0 {
            return VerifyOutcome::Failed(format!("unexpected closing delimiter `{}`", c));
        }
    }

    if depth_paren != 0 || depth_brace != 0 || depth_bracket != 0 {
        return VerifyOutcome::Failed("unbalanced delimiters at end of file".to_string());
    }

    VerifyOutcome::Passed
}
