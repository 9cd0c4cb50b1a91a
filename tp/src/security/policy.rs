//! Command-pattern policy filter
//!
//! Not a syscall interposer: a best-effort scan of command lines for
//! dangerous patterns. A matched pattern is allowed only when an allowlist
//! entry also matches; every block appends to a persistent newline-delimited
//! JSON log whose entries carry the running blocked counter.

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

/// Dangerous command patterns by category
const DANGEROUS_PATTERNS: &[(&str, &[&str])] = &[
    ("privilege", &["sudo", "doas", "pkexec"]),
    ("package", &["apt install", "apt-get install", "pip install", "npm install"]),
    ("network", &["wget", "curl", "nc ", "ncat", "telnet"]),
    ("system", &["iptables", "ufw ", "mount", "umount"]),
    ("process", &["killall", "pkill", "kill -9", "kill -sigkill"]),
];

/// Decision for one checked command
#[derive(Debug, Clone)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub reasons: Vec<String>,
}

impl PolicyDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reasons: Vec::new(),
        }
    }
}

/// One persisted block event
#[derive(Debug, Serialize, Deserialize)]
struct BlockEvent {
    ts: String,
    command: String,
    reasons: Vec<String>,
    total_blocked: u64,
}

struct PolicyLog {
    path: PathBuf,
    total_blocked: u64,
}

impl PolicyLog {
    fn open(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create policy log directory")?;
        }

        // Counter is the running total carried by the last event line
        let total_blocked = std::fs::File::open(&path)
            .ok()
            .and_then(|file| {
                BufReader::new(file)
                    .lines()
                    .map_while(|l| l.ok())
                    .filter_map(|line| serde_json::from_str::<BlockEvent>(&line).ok())
                    .last()
            })
            .map(|event| event.total_blocked)
            .unwrap_or(0);

        Ok(Self { path, total_blocked })
    }

    fn record(&mut self, command: &str, reasons: &[String]) {
        self.total_blocked += 1;

        let event = BlockEvent {
            ts: chrono::Utc::now().to_rfc3339(),
            command: command.to_string(),
            reasons: reasons.to_vec(),
            total_blocked: self.total_blocked,
        };

        let appended = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| {
                let line = serde_json::to_string(&event).unwrap_or_default();
                writeln!(file, "{}", line)
            });

        if let Err(e) = appended {
            warn!(error = %e, "Failed to append policy log");
        }
    }
}

/// The policy filter service
pub struct CommandPolicy {
    allowlist: HashSet<String>,
    denylist: HashSet<String>,
    log: Mutex<PolicyLog>,
}

impl CommandPolicy {
    /// Open with the given allow/deny lists, logging blocks to `log_path`
    pub fn open(
        log_path: impl Into<PathBuf>,
        allowlist: HashSet<String>,
        denylist: HashSet<String>,
    ) -> Result<Self> {
        Ok(Self {
            allowlist,
            denylist,
            log: Mutex::new(PolicyLog::open(log_path.into())?),
        })
    }

    /// Decide whether a command may run.
    ///
    /// Any dangerous pattern found is blocked unless an allowlist entry also
    /// matches the command: denylisted patterns always block, a non-empty
    /// allowlist blocks unmatched commands, and an empty allowlist blocks as
    /// a suspicious pattern.
    pub async fn check(&self, command: &str) -> PolicyDecision {
        let lower = command.to_lowercase();
        let mut reasons = Vec::new();

        for (category, patterns) in DANGEROUS_PATTERNS {
            for pattern in *patterns {
                if !lower.contains(pattern) {
                    continue;
                }

                if self.denylist.contains(*pattern) {
                    reasons.push(format!("Explicitly denied ({}): {}", category, pattern.trim()));
                } else if !self.allowlist.is_empty() {
                    let allowed = self.allowlist.iter().any(|entry| lower.contains(&entry.to_lowercase()));
                    if !allowed {
                        reasons.push(format!("Not in allowlist ({}): {}", category, pattern.trim()));
                    }
                } else {
                    reasons.push(format!("Suspicious pattern ({}): {}", category, pattern.trim()));
                }
            }
        }

        if reasons.is_empty() {
            return PolicyDecision::allow();
        }

        warn!(command, ?reasons, "Blocked command");
        self.log.lock().await.record(command, &reasons);

        PolicyDecision {
            allowed: false,
            reasons,
        }
    }

    /// Total commands blocked across runs
    pub async fn blocked_count(&self) -> u64 {
        self.log.lock().await.total_blocked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn policy(dir: &std::path::Path, allow: &[&str], deny: &[&str]) -> CommandPolicy {
        CommandPolicy::open(
            dir.join("syscall_log.json"),
            allow.iter().map(|s| s.to_string()).collect(),
            deny.iter().map(|s| s.to_string()).collect(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_benign_command_allowed() {
        let temp = tempdir().unwrap();
        let p = policy(temp.path(), &[], &[]);

        let decision = p.check("echo hello world").await;
        assert!(decision.allowed);
        assert_eq!(p.blocked_count().await, 0);
    }

    #[tokio::test]
    async fn test_suspicious_pattern_blocked_with_empty_allowlist() {
        let temp = tempdir().unwrap();
        let p = policy(temp.path(), &[], &[]);

        let decision = p.check("sudo rm -rf /").await;
        assert!(!decision.allowed);
        assert!(decision.reasons[0].contains("Suspicious pattern"));
        assert_eq!(p.blocked_count().await, 1);
    }

    #[tokio::test]
    async fn test_denylist_blocks_even_with_allowlist() {
        let temp = tempdir().unwrap();
        let p = policy(temp.path(), &["wget"], &["wget"]);

        let decision = p.check("wget http://example.com").await;
        assert!(!decision.allowed);
        assert!(decision.reasons[0].contains("Explicitly denied"));
    }

    #[tokio::test]
    async fn test_allowlist_match_permits_pattern() {
        let temp = tempdir().unwrap();
        let p = policy(temp.path(), &["pip install"], &[]);

        let decision = p.check("pip install requests").await;
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn test_allowlist_miss_blocks() {
        let temp = tempdir().unwrap();
        let p = policy(temp.path(), &["pip install"], &[]);

        let decision = p.check("npm install left-pad").await;
        assert!(!decision.allowed);
        assert!(decision.reasons[0].contains("Not in allowlist"));
    }

    #[tokio::test]
    async fn test_counter_persists_across_reopen() {
        let temp = tempdir().unwrap();

        {
            let p = policy(temp.path(), &[], &[]);
            p.check("sudo whoami").await;
            p.check("pkill -f server").await;
            assert_eq!(p.blocked_count().await, 2);
        }

        let p = policy(temp.path(), &[], &[]);
        assert_eq!(p.blocked_count().await, 2);

        // Log is newline-delimited JSON
        let content = std::fs::read_to_string(temp.path().join("syscall_log.json")).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let last: BlockEvent = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(last.total_blocked, 2);
    }
}
