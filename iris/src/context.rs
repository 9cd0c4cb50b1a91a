//! Context store - project state, read gating, and planned edits
//!
//! The context lives at `.context/context.json` next to a journal and a
//! checkpoint tree. Every load/store brackets the context lock and every
//! write is atomic (temp file then rename).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::IrisError;
use crate::journal::{Journal, JournalEntry};
use crate::lock::ContextLock;

/// Loop phases, in enforcement order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Phase {
    #[default]
    Init,
    Read,
    Plan,
    Write,
    Verify,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Init => write!(f, "INIT"),
            Self::Read => write!(f, "READ"),
            Self::Plan => write!(f, "PLAN"),
            Self::Write => write!(f, "WRITE"),
            Self::Verify => write!(f, "VERIFY"),
        }
    }
}

/// Task state within the context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    #[default]
    Pending,
    Running,
    Done,
    Error,
}

/// Project metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub created_at: String,
    pub last_updated: String,
}

/// Record of one fully-read file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRead {
    /// 1-based inclusive line span that was read (always the whole file)
    pub lines: (u32, u32),

    /// SHA-256 of the raw bytes at read time
    pub hash: String,
}

/// Files that have been read this task
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadState {
    pub files_read: BTreeMap<String, FileRead>,
}

impl ReadState {
    /// Whether a file has been read (gate for WRITE)
    pub fn contains(&self, file: &str) -> bool {
        self.files_read.contains_key(file)
    }
}

/// A planned file modification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntendedEdit {
    pub file: String,

    /// 1-based inclusive line range to replace
    pub line_range: (u32, u32),

    pub reason: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_content: Option<String>,
}

/// The execution plan for the current task
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EditPlan {
    pub intended_edits: Vec<IntendedEdit>,
    pub reasoning: String,
}

/// Currently executing task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentTask {
    pub task_id: String,
    pub goal: String,
    pub status: TaskState,
    pub last_phase: Phase,
    pub summary: String,
    pub read_state: ReadState,
    pub plan: EditPlan,
}

impl CurrentTask {
    /// Create a fresh task record in the INIT phase
    pub fn new(task_id: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            goal: goal.into(),
            status: TaskState::Running,
            last_phase: Phase::Init,
            summary: String::new(),
            read_state: ReadState::default(),
            plan: EditPlan::default(),
        }
    }
}

/// Enforcement policy flags
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyFlags {
    pub read_before_write: bool,
    pub unrestricted: bool,
    pub trusted_workspace: bool,
}

impl Default for PolicyFlags {
    fn default() -> Self {
        Self {
            read_before_write: true,
            unrestricted: true,
            trusted_workspace: false,
        }
    }
}

/// Journal sizing knobs
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Meta {
    pub journal_max: usize,
    pub compact_after: usize,
}

impl Default for Meta {
    fn default() -> Self {
        Self {
            journal_max: 200,
            compact_after: 50,
        }
    }
}

/// Complete project context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    pub project: Project,
    #[serde(default)]
    pub current_task: Option<CurrentTask>,
    #[serde(default)]
    pub policy: PolicyFlags,
    #[serde(default)]
    pub meta: Meta,
}

/// SHA-256 of a byte slice, hex-encoded
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Write bytes atomically: sibling temp file then rename, temp unlinked on error
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), IrisError> {
    let temp = path.with_extension("tmp");

    if let Err(e) = fs::write(&temp, bytes) {
        let _ = fs::remove_file(&temp);
        return Err(e.into());
    }
    if let Err(e) = fs::rename(&temp, path) {
        let _ = fs::remove_file(&temp);
        return Err(e.into());
    }
    Ok(())
}

/// Manages the `.context` directory: context, journal, checkpoints, lock
pub struct ContextManager {
    root: PathBuf,
    context_path: PathBuf,
    journal_path: PathBuf,
    checkpoints_dir: PathBuf,
    lock_path: PathBuf,
}

impl ContextManager {
    /// Open (creating directories as needed) the context store under `root`
    pub fn new(root: impl AsRef<Path>) -> Result<Self, IrisError> {
        let root = root.as_ref().to_path_buf();
        let context_dir = root.join(".context");
        let checkpoints_dir = context_dir.join("checkpoints");

        fs::create_dir_all(&checkpoints_dir)?;

        Ok(Self {
            context_path: context_dir.join("context.json"),
            journal_path: context_dir.join("journal.json"),
            lock_path: context_dir.join(".lock"),
            checkpoints_dir,
            root,
        })
    }

    /// Project root this store belongs to
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether a context has been initialized here
    pub fn is_initialized(&self) -> bool {
        self.context_path.exists()
    }

    /// Create the initial context. Returns false if one already exists.
    pub fn initialize(&self, project_name: &str) -> Result<bool, IrisError> {
        let _lock = ContextLock::acquire(&self.lock_path)?;

        if self.context_path.exists() {
            return Ok(false);
        }

        let now = chrono::Utc::now().to_rfc3339();
        let context = Context {
            project: Project {
                id: uuid::Uuid::now_v7().to_string(),
                name: project_name.to_string(),
                created_at: now.clone(),
                last_updated: now,
            },
            current_task: None,
            policy: PolicyFlags::default(),
            meta: Meta::default(),
        };

        self.write_context_locked(&context)?;
        self.write_journal_locked(&Journal::default())?;

        info!(project = project_name, "Initialized context");
        Ok(true)
    }

    /// Load the context under the lock
    pub fn load_context(&self) -> Result<Context, IrisError> {
        let _lock = ContextLock::acquire(&self.lock_path)?;
        self.load_context_locked()
    }

    /// Write the context under the lock, bumping `last_updated`
    pub fn write_context(&self, context: &mut Context) -> Result<(), IrisError> {
        let _lock = ContextLock::acquire(&self.lock_path)?;
        context.project.last_updated = chrono::Utc::now().to_rfc3339();
        self.write_context_locked(context)
    }

    /// Load, mutate, and write back the context in one lock acquisition
    pub fn update_context<F>(&self, mutate: F) -> Result<Context, IrisError>
    where
        F: FnOnce(&mut Context),
    {
        let _lock = ContextLock::acquire(&self.lock_path)?;
        let mut context = self.load_context_locked()?;
        mutate(&mut context);
        context.project.last_updated = chrono::Utc::now().to_rfc3339();
        self.write_context_locked(&context)?;
        Ok(context)
    }

    /// Replace the current task record
    pub fn set_current_task(&self, task: CurrentTask) -> Result<(), IrisError> {
        self.update_context(|ctx| ctx.current_task = Some(task))?;
        Ok(())
    }

    /// Fold new information into the current task summary (capped at 800 chars)
    pub fn merge_summary(&self, new_info: &str) -> Result<(), IrisError> {
        self.update_context(|ctx| {
            if let Some(task) = ctx.current_task.as_mut() {
                let merged = format!("{} {}", task.summary, new_info);
                task.summary = merged.trim().chars().take(800).collect();
            }
        })?;
        Ok(())
    }

    /// Load the journal (empty if none exists yet)
    pub fn load_journal(&self) -> Result<Journal, IrisError> {
        let _lock = ContextLock::acquire(&self.lock_path)?;
        self.load_journal_locked()
    }

    /// Append an entry, compacting before the write if the journal has grown
    /// past `meta.compact_after`
    pub fn append_journal(&self, entry: JournalEntry) -> Result<(), IrisError> {
        let _lock = ContextLock::acquire(&self.lock_path)?;

        let meta = self.load_context_locked().map(|c| c.meta).unwrap_or_default();
        let mut journal = self.load_journal_locked()?;
        journal.push(entry);

        if let Some(dropped) = journal.compact(meta.journal_max, meta.compact_after) {
            debug!(dropped, "Compacted journal");
        }

        self.write_journal_locked(&journal)
    }

    /// Create a pre-edit checkpoint for a file, returning the checkpoint path
    pub fn create_checkpoint(&self, task_id: &str, file: &Path) -> Result<PathBuf, IrisError> {
        let dir = self.checkpoints_dir.join(task_id);
        fs::create_dir_all(&dir)?;

        let name = file.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_else(|| "file".to_string());
        let millis = chrono::Utc::now().timestamp_millis();
        let checkpoint = dir.join(format!("{}.orig.{}", name, millis));

        if file.exists() {
            fs::copy(file, &checkpoint)?;
        }

        debug!(file = %file.display(), checkpoint = %checkpoint.display(), "Created checkpoint");
        Ok(checkpoint)
    }

    /// Restore a file byte-for-byte from its checkpoint
    pub fn rollback(&self, checkpoint: &Path, target: &Path) -> Result<(), IrisError> {
        if checkpoint.exists() {
            fs::copy(checkpoint, target)?;
            info!(target = %target.display(), "Rolled back from checkpoint");
        }
        Ok(())
    }

    fn load_context_locked(&self) -> Result<Context, IrisError> {
        if !self.context_path.exists() {
            return Err(IrisError::NotInitialized(self.root.clone()));
        }
        let content = fs::read_to_string(&self.context_path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn write_context_locked(&self, context: &Context) -> Result<(), IrisError> {
        let bytes = serde_json::to_vec_pretty(context)?;
        write_atomic(&self.context_path, &bytes)
    }

    fn load_journal_locked(&self) -> Result<Journal, IrisError> {
        if !self.journal_path.exists() {
            return Ok(Journal::default());
        }
        let content = fs::read_to_string(&self.journal_path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn write_journal_locked(&self, journal: &Journal) -> Result<(), IrisError> {
        let bytes = serde_json::to_vec_pretty(journal)?;
        write_atomic(&self.journal_path, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::JournalEntry;
    use tempfile::tempdir;

    #[test]
    fn test_initialize_once() {
        let temp = tempdir().unwrap();
        let mgr = ContextManager::new(temp.path()).unwrap();

        assert!(!mgr.is_initialized());
        assert!(mgr.initialize("demo").unwrap());
        assert!(mgr.is_initialized());
        assert!(!mgr.initialize("demo").unwrap());

        let ctx = mgr.load_context().unwrap();
        assert_eq!(ctx.project.name, "demo");
        assert!(ctx.current_task.is_none());
        assert!(ctx.policy.read_before_write);
        assert_eq!(ctx.meta.journal_max, 200);
    }

    #[test]
    fn test_load_uninitialized_errors() {
        let temp = tempdir().unwrap();
        let mgr = ContextManager::new(temp.path()).unwrap();

        assert!(matches!(mgr.load_context(), Err(IrisError::NotInitialized(_))));
    }

    #[test]
    fn test_current_task_roundtrip() {
        let temp = tempdir().unwrap();
        let mgr = ContextManager::new(temp.path()).unwrap();
        mgr.initialize("demo").unwrap();

        let mut task = CurrentTask::new("42", "add logging");
        task.read_state.files_read.insert(
            "src/lib.rs".to_string(),
            FileRead {
                lines: (1, 10),
                hash: sha256_hex(b"content"),
            },
        );
        mgr.set_current_task(task).unwrap();

        let ctx = mgr.load_context().unwrap();
        let task = ctx.current_task.unwrap();
        assert_eq!(task.task_id, "42");
        assert!(task.read_state.contains("src/lib.rs"));
        assert!(!task.read_state.contains("src/other.rs"));
    }

    #[test]
    fn test_merge_summary_caps_length() {
        let temp = tempdir().unwrap();
        let mgr = ContextManager::new(temp.path()).unwrap();
        mgr.initialize("demo").unwrap();
        mgr.set_current_task(CurrentTask::new("1", "goal")).unwrap();

        mgr.merge_summary(&"x".repeat(1000)).unwrap();

        let ctx = mgr.load_context().unwrap();
        assert_eq!(ctx.current_task.unwrap().summary.len(), 800);
    }

    #[test]
    fn test_journal_append_and_compaction() {
        let temp = tempdir().unwrap();
        let mgr = ContextManager::new(temp.path()).unwrap();
        mgr.initialize("demo").unwrap();

        // Shrink the journal knobs so compaction actually triggers
        mgr.update_context(|ctx| {
            ctx.meta = Meta {
                journal_max: 10,
                compact_after: 5,
            };
        })
        .unwrap();

        for n in 0..25 {
            mgr.append_journal(JournalEntry::new("1", Phase::Read, format!("read {}", n))).unwrap();
        }

        let journal = mgr.load_journal().unwrap();
        assert!(journal.len() <= 10);
        assert!(journal.entries[0].desc.starts_with("Compacted"));
    }

    #[test]
    fn test_checkpoint_and_rollback_byte_exact() {
        let temp = tempdir().unwrap();
        let mgr = ContextManager::new(temp.path()).unwrap();
        mgr.initialize("demo").unwrap();

        let target = temp.path().join("data.txt");
        fs::write(&target, b"original bytes\n").unwrap();

        let checkpoint = mgr.create_checkpoint("7", &target).unwrap();
        fs::write(&target, b"mangled").unwrap();

        mgr.rollback(&checkpoint, &target).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"original bytes\n");
        assert!(checkpoint.exists());
    }

    #[test]
    fn test_sha256_hex_stable() {
        assert_eq!(sha256_hex(b"hello"), "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824");
    }
}
