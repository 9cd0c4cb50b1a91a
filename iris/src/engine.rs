//! AgentLoop - deterministic READ->PLAN->WRITE execution with enforcement
//!
//! The loop reads and checksums candidate sources, asks the planner for
//! structured edits, and applies them under the read-before-write gate with
//! checkpoint rollback when verification fails. The phase reached is
//! persisted into the context after every successful transition.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};
use walkdir::WalkDir;

use crate::context::{Context, ContextManager, CurrentTask, FileRead, IntendedEdit, Phase, TaskState, sha256_hex, write_atomic};
use crate::diff::render_preview;
use crate::error::IrisError;
use crate::journal::JournalEntry;
use crate::planner::{Planner, content_prompt, parse_plan, planning_prompt};
use crate::verify::{VerifyOutcome, verify_file};

/// Directories never considered during the READ phase
const EXCLUDED_DIRS: &[&str] = &["target", "node_modules", "__pycache__", "dist", "build", "venv", ".venv", "vendor"];

/// Source suffixes eligible for dominant-extension detection
const SOURCE_EXTS: &[&str] = &["rs", "py", "js", "ts", "go", "java", "c", "cpp", "rb", "sh"];

/// Confirmation gate for the WRITE phase
pub trait Confirm: Send + Sync {
    /// Approve or reject one previewed edit
    fn approve(&self, file: &str, preview: &str) -> bool;
}

/// Approves every edit (trusted workspaces and tests)
pub struct AutoApprove;

impl Confirm for AutoApprove {
    fn approve(&self, _file: &str, _preview: &str) -> bool {
        true
    }
}

/// Prompts on stdin before each edit
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn approve(&self, file: &str, preview: &str) -> bool {
        println!("{}", preview);
        print!("Apply edit to {}? [y/N] ", file);
        let _ = std::io::stdout().flush();

        let mut answer = String::new();
        if std::io::stdin().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
    }
}

/// Loop tuning knobs
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Source suffix to read; autodetected from the tree when unset
    pub source_ext: Option<String>,

    /// Cap on files read per task
    pub max_read_files: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            source_ext: None,
            max_read_files: 10,
        }
    }
}

/// Result of a completed loop run
#[derive(Debug, Clone)]
pub struct LoopReport {
    pub last_phase: Phase,
    pub files_read: usize,
    pub edits_planned: usize,
    pub edits_applied: usize,
}

/// The IRIS agent loop
pub struct AgentLoop {
    ctx: ContextManager,
    planner: Arc<dyn Planner>,
    confirm: Arc<dyn Confirm>,
    config: LoopConfig,
    root: PathBuf,
}

impl AgentLoop {
    /// Create a loop over the project at `root`
    pub fn new(root: impl AsRef<Path>, planner: Arc<dyn Planner>, confirm: Arc<dyn Confirm>) -> Result<Self, IrisError> {
        Self::with_config(root, planner, confirm, LoopConfig::default())
    }

    /// Create a loop with explicit tuning
    pub fn with_config(
        root: impl AsRef<Path>,
        planner: Arc<dyn Planner>,
        confirm: Arc<dyn Confirm>,
        config: LoopConfig,
    ) -> Result<Self, IrisError> {
        let root = root.as_ref().to_path_buf();
        Ok(Self {
            ctx: ContextManager::new(&root)?,
            planner,
            confirm,
            config,
            root,
        })
    }

    /// Access the underlying context manager
    pub fn context_manager(&self) -> &ContextManager {
        &self.ctx
    }

    /// Execute one task through the full READ->PLAN->WRITE->VERIFY cycle.
    ///
    /// On any failure the context task is marked errored with the failure
    /// summary before the error propagates; applied-but-unverified edits
    /// have already been rolled back at that point.
    pub async fn execute(&self, task_id: &str, goal: &str) -> Result<LoopReport, IrisError> {
        if !self.ctx.is_initialized() {
            let name = self.root.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_else(|| "project".to_string());
            self.ctx.initialize(&name)?;
        }

        self.ctx.set_current_task(CurrentTask::new(task_id, goal))?;
        self.journal(task_id, Phase::Init, format!("Task started: {}", goal), None)?;

        match self.run_phases(task_id, goal).await {
            Ok(report) => {
                self.ctx.update_context(|ctx| {
                    if let Some(task) = ctx.current_task.as_mut() {
                        task.status = TaskState::Done;
                        task.last_phase = Phase::Verify;
                    }
                })?;
                info!(task_id, edits = report.edits_applied, "IRIS task complete");
                Ok(report)
            }
            Err(e) => {
                let summary = e.to_string();
                self.ctx.update_context(|ctx| {
                    if let Some(task) = ctx.current_task.as_mut() {
                        task.status = TaskState::Error;
                        task.summary = summary.chars().take(800).collect();
                    }
                })?;
                warn!(task_id, error = %e, "IRIS task failed");
                Err(e)
            }
        }
    }

    async fn run_phases(&self, task_id: &str, goal: &str) -> Result<LoopReport, IrisError> {
        let files = self.read_phase(task_id).await?;
        let edits = self.plan_phase(task_id, goal, &files).await?;
        let applied = self.write_phase(task_id, goal, &edits).await?;

        self.advance_phase(Phase::Verify)?;
        self.journal(
            task_id,
            Phase::Verify,
            format!("Verified {} edits", applied),
            Some(serde_json::json!({ "edits_verified": applied })),
        )?;

        Ok(LoopReport {
            last_phase: Phase::Verify,
            files_read: files.len(),
            edits_planned: edits.len(),
            edits_applied: applied,
        })
    }

    /// READ: enumerate, read, and checksum candidate source files
    async fn read_phase(&self, task_id: &str) -> Result<Vec<(String, u32)>, IrisError> {
        let candidates = self.enumerate_sources();

        let mut read: Vec<(String, FileRead)> = Vec::new();
        for path in candidates {
            let bytes = match std::fs::read(&path) {
                Ok(b) => b,
                Err(_) => continue,
            };

            let line_count = bytes.split(|b| *b == b'\n').count() as u32;
            let rel = self.relative(&path);

            read.push((
                rel,
                FileRead {
                    lines: (1, line_count),
                    hash: sha256_hex(&bytes),
                },
            ));
        }

        let listing: Vec<(String, u32)> = read.iter().map(|(p, fr)| (p.clone(), fr.lines.1)).collect();

        self.ctx.update_context(|ctx| {
            if let Some(task) = ctx.current_task.as_mut() {
                for (path, file_read) in read {
                    task.read_state.files_read.insert(path, file_read);
                }
                task.last_phase = Phase::Read;
            }
        })?;

        self.journal(
            task_id,
            Phase::Read,
            format!("Read {} files", listing.len()),
            Some(serde_json::json!({ "files_read": listing.len() })),
        )?;

        Ok(listing)
    }

    /// PLAN: ask the planner for structured edits and persist them
    async fn plan_phase(&self, task_id: &str, goal: &str, files: &[(String, u32)]) -> Result<Vec<IntendedEdit>, IrisError> {
        let prompt = planning_prompt(goal, files);
        let response = self.planner.plan(&prompt).await?;
        let edits = parse_plan(&response);

        self.ctx.update_context(|ctx| {
            if let Some(task) = ctx.current_task.as_mut() {
                task.plan.intended_edits = edits.clone();
                task.plan.reasoning = response.clone();
                task.last_phase = Phase::Plan;
            }
        })?;

        self.journal(
            task_id,
            Phase::Plan,
            format!("Planned {} edits", edits.len()),
            Some(serde_json::json!({ "edits_planned": edits.len() })),
        )?;

        Ok(edits)
    }

    /// WRITE: apply each edit under enforcement, with checkpoint + verify
    async fn write_phase(&self, task_id: &str, goal: &str, edits: &[IntendedEdit]) -> Result<usize, IrisError> {
        let context = self.ctx.load_context()?;
        let mut applied = 0usize;

        for edit in edits {
            self.check_enforcement(task_id, &context, edit)?;

            let target = self.root.join(&edit.file);
            let checkpoint = self.ctx.create_checkpoint(task_id, &target)?;

            let new_content = self.resolve_content(goal, edit).await?;
            let current = if target.exists() { std::fs::read_to_string(&target)? } else { String::new() };

            let (start, end) = edit.line_range;
            let lines: Vec<&str> = current.split('\n').collect();
            let start0 = (start.saturating_sub(1) as usize).min(lines.len());
            let end0 = (end as usize).clamp(start0, lines.len());

            let new_lines: Vec<&str> = new_content.split('\n').collect();
            let preview = render_preview(&edit.file, start, &lines[start0..end0], &new_lines);

            if !context.policy.trusted_workspace && !self.confirm.approve(&edit.file, &preview) {
                return Err(IrisError::EditRejected { file: edit.file.clone() });
            }

            let mut result: Vec<&str> = Vec::with_capacity(lines.len() + new_lines.len());
            result.extend_from_slice(&lines[..start0]);
            result.extend_from_slice(&new_lines);
            result.extend_from_slice(&lines[end0..]);
            write_atomic(&target, result.join("\n").as_bytes())?;

            match verify_file(&target).await {
                VerifyOutcome::Failed(reason) => {
                    self.ctx.rollback(&checkpoint, &target)?;
                    self.journal(
                        task_id,
                        Phase::Verify,
                        format!("Rolled back {}: {}", edit.file, reason),
                        Some(serde_json::json!({ "rollback": true })),
                    )?;
                    return Err(IrisError::VerifyFailed {
                        file: edit.file.clone(),
                        reason,
                    });
                }
                VerifyOutcome::Passed | VerifyOutcome::Skipped => {}
            }

            applied += 1;
            info!(file = %edit.file, lines = ?edit.line_range, "Applied edit");
        }

        self.advance_phase(Phase::Write)?;
        self.journal(
            task_id,
            Phase::Write,
            format!("Applied {} edits", applied),
            Some(serde_json::json!({ "edits_applied": applied })),
        )?;

        Ok(applied)
    }

    /// The read-before-write gate
    fn check_enforcement(&self, task_id: &str, context: &Context, edit: &IntendedEdit) -> Result<(), IrisError> {
        let read = context
            .current_task
            .as_ref()
            .map(|t| t.read_state.contains(&edit.file))
            .unwrap_or(false);

        if context.policy.read_before_write && !read {
            self.journal(
                task_id,
                Phase::Write,
                format!("Blocked edit to unread file {}", edit.file),
                Some(serde_json::json!({ "violation": "MUST_READ_FIRST" })),
            )?;
            return Err(IrisError::EnforcementViolation { file: edit.file.clone() });
        }
        Ok(())
    }

    /// Content for an edit: the planned `new_content`, or one focused
    /// follow-up planner call when the plan omitted it
    async fn resolve_content(&self, goal: &str, edit: &IntendedEdit) -> Result<String, IrisError> {
        if let Some(content) = &edit.new_content {
            return Ok(content.clone());
        }

        let response = self.planner.plan(&content_prompt(goal, edit)).await?;
        let trimmed = strip_fences(&response);
        if trimmed.is_empty() {
            return Err(IrisError::Planner(format!("no content produced for {}", edit.file)));
        }
        Ok(trimmed)
    }

    fn advance_phase(&self, phase: Phase) -> Result<(), IrisError> {
        self.ctx.update_context(|ctx| {
            if let Some(task) = ctx.current_task.as_mut() {
                task.last_phase = phase;
            }
        })?;
        Ok(())
    }

    fn journal(&self, task_id: &str, phase: Phase, desc: String, meta: Option<serde_json::Value>) -> Result<(), IrisError> {
        let mut entry = JournalEntry::new(task_id, phase, desc);
        if let Some(meta) = meta {
            entry = entry.with_meta(meta);
        }
        self.ctx.append_journal(entry)
    }

    /// Candidate files for the READ phase: the top `max_read_files` files of
    /// the dominant (or configured) source suffix, hidden dirs and build
    /// caches excluded, in stable path order
    fn enumerate_sources(&self) -> Vec<PathBuf> {
        let mut by_ext: std::collections::HashMap<String, Vec<PathBuf>> = std::collections::HashMap::new();

        let walker = WalkDir::new(&self.root).into_iter().filter_entry(|e| {
            if e.depth() == 0 {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            !name.starts_with('.') && !EXCLUDED_DIRS.contains(&name.as_ref())
        });

        for entry in walker.flatten() {
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(ext) = entry.path().extension().and_then(|e| e.to_str()) else {
                continue;
            };
            by_ext.entry(ext.to_string()).or_default().push(entry.into_path());
        }

        let ext = match &self.config.source_ext {
            Some(ext) => ext.clone(),
            None => {
                let dominant = by_ext
                    .iter()
                    .filter(|(ext, _)| SOURCE_EXTS.contains(&ext.as_str()))
                    .max_by_key(|(ext, files)| (files.len(), std::cmp::Reverse(ext.as_str())));
                match dominant {
                    Some((ext, _)) => ext.clone(),
                    None => return Vec::new(),
                }
            }
        };

        let mut files = by_ext.remove(&ext).unwrap_or_default();
        files.sort();
        files.truncate(self.config.max_read_files);
        files
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root).unwrap_or(path).to_string_lossy().to_string()
    }
}

/// Strip surrounding code fences from a planner response
fn strip_fences(response: &str) -> String {
    let trimmed = response.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
        if let Some(body) = rest.strip_suffix("```") {
            return body.trim_end().to_string();
        }
    }
    trimmed.to_string()
}
