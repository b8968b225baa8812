//! Journal - append-only, per-operation side-effect log with undo.
//!
//! Each operation lives in its own JSONL file, `{dir}/{op_id}.jsonl`.
//! Entries are appended and never rewritten; undo reads the whole file and
//! reverses every `move.done` entry newest first.

mod entry;

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::{Value, json};

pub use entry::{EventKind, JournalEntry};

use crate::domain::Payload;
use crate::error::{PilotError, Result};
use crate::id::{generate_op_id, is_valid_op_id};

/// Result of one journaled move
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveRecord {
    pub src: PathBuf,
    pub dst: PathBuf,
    /// False when the move was only planned (dry run)
    pub moved: bool,
}

/// JSONL-backed operation journal
#[derive(Debug, Clone)]
pub struct Journal {
    dir: PathBuf,
}

impl Journal {
    /// Open (and create if needed) a journal directory
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn op_path(&self, op_id: &str) -> Result<PathBuf> {
        if !is_valid_op_id(op_id) {
            return Err(PilotError::Journal(format!("invalid op_id: {:?}", op_id)));
        }
        Ok(self.dir.join(format!("{}.jsonl", op_id)))
    }

    pub fn exists(&self, op_id: &str) -> bool {
        self.op_path(op_id).map(|p| p.exists()).unwrap_or(false)
    }

    /// Allocate a fresh operation and record its `begin` entry
    pub fn begin(&self, operation: &str, meta: Payload) -> Result<String> {
        let mut op_id = generate_op_id();
        while self.exists(&op_id) {
            op_id = generate_op_id();
        }

        let mut payload = Payload::new();
        payload.insert("operation".into(), Value::String(operation.to_string()));
        payload.insert("meta".into(), Value::Object(meta));
        self.append(&op_id, EventKind::Begin, payload)?;

        log::info!("Journal operation {} started ({})", op_id, operation);
        Ok(op_id)
    }

    /// Append one entry; prior entries are never touched
    pub fn append(&self, op_id: &str, event: EventKind, payload: Payload) -> Result<JournalEntry> {
        let path = self.op_path(op_id)?;
        let entry = JournalEntry::new(op_id, event, payload);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "{}", serde_json::to_string(&entry)?)?;
        log::debug!("Journal {} <- {}", op_id, entry.event);
        Ok(entry)
    }

    /// All entries for an operation, in append order
    pub fn read(&self, op_id: &str) -> Result<Vec<JournalEntry>> {
        let path = self.op_path(op_id)?;
        if !path.exists() {
            return Err(PilotError::Journal(format!("unknown operation: {}", op_id)));
        }

        let reader = BufReader::new(File::open(&path)?);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if !line.trim().is_empty() {
                entries.push(serde_json::from_str(&line)?);
            }
        }
        Ok(entries)
    }

    /// Record and (unless dry run) perform a file move
    pub fn journaled_move(&self, op_id: &str, src: &Path, dst: &Path, dry_run: bool) -> Result<MoveRecord> {
        let src = std::path::absolute(src)?;
        let dst = std::path::absolute(dst)?;
        let paths = move_payload(&src, &dst);

        self.append(op_id, EventKind::MovePlanned, paths.clone())?;

        if dry_run {
            let mut payload = paths;
            payload.insert("reason".into(), json!("dry_run"));
            self.append(op_id, EventKind::MoveSkipped, payload)?;
            return Ok(MoveRecord { src, dst, moved: false });
        }

        move_path(&src, &dst)?;
        self.append(op_id, EventKind::MoveDone, paths)?;
        Ok(MoveRecord { src, dst, moved: true })
    }

    /// Reverse every completed move of an operation, newest first.
    ///
    /// Missing destinations are skipped, not errors, so a second undo after a
    /// complete one reports only skips.
    pub fn undo(&self, op_id: &str, dry_run: bool) -> Result<Vec<String>> {
        let moves: Vec<(PathBuf, PathBuf)> = self
            .read(op_id)?
            .into_iter()
            .filter(|e| e.event == EventKind::MoveDone)
            .filter_map(|e| match (e.field("src"), e.field("dst")) {
                (Some(src), Some(dst)) => Some((PathBuf::from(src), PathBuf::from(dst))),
                _ => {
                    log::warn!("Journal {}: move.done entry without src/dst", op_id);
                    None
                }
            })
            .collect();

        let mut simulated = SimulatedMoves::default();
        let mut actions = Vec::with_capacity(moves.len());
        for (original, current) in moves.iter().rev() {
            let present = if dry_run { simulated.exists(current) } else { current.exists() };
            if !present {
                actions.push(format!("skip missing {}", current.display()));
                continue;
            }
            if dry_run {
                simulated.record(current, original);
            } else if let Err(e) = move_path(current, original) {
                log::warn!("Undo {}: {} -> {} failed: {}", op_id, current.display(), original.display(), e);
                actions.push(format!("failed {} -> {}: {}", current.display(), original.display(), e));
                continue;
            }
            actions.push(format!("revert {} -> {}", current.display(), original.display()));
        }

        let mut payload = Payload::new();
        payload.insert("count".into(), json!(moves.len()));
        payload.insert("dry_run".into(), json!(dry_run));
        self.append(op_id, EventKind::UndoDone, payload)?;

        log::info!("Undo {} processed {} move(s) (dry_run={})", op_id, moves.len(), dry_run);
        Ok(actions)
    }
}

/// Filesystem view of a dry-run undo: the reverts it would already have done
#[derive(Debug, Default)]
struct SimulatedMoves {
    vacated: HashSet<PathBuf>,
    filled: HashSet<PathBuf>,
}

impl SimulatedMoves {
    fn exists(&self, path: &Path) -> bool {
        self.filled.contains(path) || (!self.vacated.contains(path) && path.exists())
    }

    fn record(&mut self, from: &Path, to: &Path) {
        self.filled.remove(from);
        self.vacated.insert(from.to_path_buf());
        self.vacated.remove(to);
        self.filled.insert(to.to_path_buf());
    }
}

fn move_payload(src: &Path, dst: &Path) -> Payload {
    let mut payload = Payload::new();
    payload.insert("src".into(), json!(src.to_string_lossy()));
    payload.insert("dst".into(), json!(dst.to_string_lossy()));
    payload
}

// Rename, falling back to copy+remove for plain files across filesystems
fn move_path(src: &Path, dst: &Path) -> std::io::Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) if src.is_file() && e.kind() == std::io::ErrorKind::CrossesDevices => {
            fs::copy(src, dst)?;
            fs::remove_file(src)
        }
        Err(e) => Err(e),
    }
}

/// Lazily opened journal operation shared by one task's capability calls
#[derive(Debug)]
pub struct JournalScope {
    journal: Arc<Journal>,
    operation: String,
    meta: Payload,
    op_id: Mutex<Option<String>>,
}

impl JournalScope {
    pub fn new(journal: Arc<Journal>, operation: impl Into<String>, meta: Payload) -> Self {
        Self {
            journal,
            operation: operation.into(),
            meta,
            op_id: Mutex::new(None),
        }
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// The operation id, if one has been opened
    pub fn op_id(&self) -> Option<String> {
        self.op_id.lock().ok().and_then(|guard| guard.clone())
    }

    /// Open the operation on first use and return its id
    pub fn ensure(&self) -> Result<String> {
        let mut guard = self
            .op_id
            .lock()
            .map_err(|e| PilotError::Journal(format!("scope lock poisoned: {}", e)))?;
        if let Some(op_id) = guard.as_ref() {
            return Ok(op_id.clone());
        }
        let op_id = self.journal.begin(&self.operation, self.meta.clone())?;
        *guard = Some(op_id.clone());
        Ok(op_id)
    }

    /// Journaled move within this scope's operation
    pub fn journaled_move(&self, src: &Path, dst: &Path, dry_run: bool) -> Result<MoveRecord> {
        let op_id = self.ensure()?;
        self.journal.journaled_move(&op_id, src, dst, dry_run)
    }

    /// Append to this scope's operation, opening it if needed
    pub fn append(&self, event: EventKind, payload: Payload) -> Result<JournalEntry> {
        let op_id = self.ensure()?;
        self.journal.append(&op_id, event, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{TempDir, tempdir};

    fn journal() -> (TempDir, Journal) {
        let dir = tempdir().unwrap();
        let journal = Journal::new(dir.path().join("journal")).unwrap();
        (dir, journal)
    }

    #[test]
    fn test_begin_writes_entry() {
        let (_dir, journal) = journal();
        let mut meta = Payload::new();
        meta.insert("root".into(), json!("/tmp/x"));
        let op_id = journal.begin("files.organize", meta).unwrap();

        let entries = journal.read(&op_id).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event, EventKind::Begin);
        assert_eq!(entries[0].field("operation"), Some("files.organize"));
        assert_eq!(entries[0].payload["meta"]["root"], "/tmp/x");
        assert!(journal.dir().join(format!("{}.jsonl", op_id)).exists());
    }

    #[test]
    fn test_append_keeps_order() {
        let (_dir, journal) = journal();
        let op_id = journal.begin("t", Payload::new()).unwrap();
        journal.append(&op_id, EventKind::from("custom.a"), Payload::new()).unwrap();
        journal.append(&op_id, EventKind::StepDone, Payload::new()).unwrap();

        let events: Vec<String> = journal.read(&op_id).unwrap().into_iter().map(|e| e.event.into()).collect();
        assert_eq!(events, vec!["begin", "custom.a", "step.done"]);
    }

    #[test]
    fn test_invalid_op_id_rejected() {
        let (_dir, journal) = journal();
        assert!(matches!(journal.read("../escape"), Err(PilotError::Journal(_))));
        assert!(journal.append("a/b", EventKind::Begin, Payload::new()).is_err());
    }

    #[test]
    fn test_read_unknown_operation() {
        let (_dir, journal) = journal();
        assert!(matches!(journal.read("123-deadbeef"), Err(PilotError::Journal(_))));
    }

    #[test]
    fn test_dry_run_move_is_skipped() {
        let (dir, journal) = journal();
        let src = dir.path().join("a.txt");
        let dst = dir.path().join("sub/b.txt");
        fs::write(&src, "x").unwrap();

        let op_id = journal.begin("t", Payload::new()).unwrap();
        let record = journal.journaled_move(&op_id, &src, &dst, true).unwrap();
        assert!(!record.moved);
        assert!(src.exists());
        assert!(!dst.exists());

        let events: Vec<EventKind> = journal.read(&op_id).unwrap().into_iter().map(|e| e.event).collect();
        assert_eq!(events, vec![EventKind::Begin, EventKind::MovePlanned, EventKind::MoveSkipped]);
    }

    #[test]
    fn test_move_then_undo_in_reverse_order() {
        let (dir, journal) = journal();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        let c = dir.path().join("nested/c.txt");
        fs::write(&a, "payload").unwrap();

        let op_id = journal.begin("t", Payload::new()).unwrap();
        journal.journaled_move(&op_id, &a, &b, false).unwrap();
        journal.journaled_move(&op_id, &b, &c, false).unwrap();
        assert!(c.exists() && !a.exists());

        let actions = journal.undo(&op_id, false).unwrap();
        assert_eq!(actions.len(), 2);
        assert!(actions[0].starts_with("revert") && actions[0].contains("c.txt"));
        assert!(actions[1].starts_with("revert") && actions[1].ends_with("a.txt"));
        assert_eq!(fs::read_to_string(&a).unwrap(), "payload");
        assert!(!b.exists() && !c.exists());

        let last = journal.read(&op_id).unwrap().pop().unwrap();
        assert_eq!(last.event, EventKind::UndoDone);
        assert_eq!(last.payload["count"], 2);
        assert_eq!(last.payload["dry_run"], false);
    }

    #[test]
    fn test_second_undo_only_skips() {
        let (dir, journal) = journal();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        fs::write(&a, "x").unwrap();

        let op_id = journal.begin("t", Payload::new()).unwrap();
        journal.journaled_move(&op_id, &a, &b, false).unwrap();
        journal.undo(&op_id, false).unwrap();

        let again = journal.undo(&op_id, false).unwrap();
        assert_eq!(again.len(), 1);
        assert!(again[0].starts_with("skip missing"));
        assert!(a.exists());
    }

    #[test]
    fn test_undo_dry_run_changes_nothing() {
        let (dir, journal) = journal();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        fs::write(&a, "x").unwrap();

        let op_id = journal.begin("t", Payload::new()).unwrap();
        journal.journaled_move(&op_id, &a, &b, false).unwrap();
        let actions = journal.undo(&op_id, true).unwrap();
        assert!(actions[0].starts_with("revert"));
        assert!(b.exists() && !a.exists());
    }

    #[test]
    fn test_undo_dry_run_follows_move_chain() {
        let (dir, journal) = journal();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        let c = dir.path().join("c.txt");
        fs::write(&a, "x").unwrap();

        let op_id = journal.begin("t", Payload::new()).unwrap();
        journal.journaled_move(&op_id, &a, &b, false).unwrap();
        journal.journaled_move(&op_id, &b, &c, false).unwrap();

        let planned = journal.undo(&op_id, true).unwrap();
        assert_eq!(planned.len(), 2);
        assert!(planned.iter().all(|action| action.starts_with("revert")), "{:?}", planned);
        assert!(c.exists() && !a.exists() && !b.exists());

        let done = journal.undo(&op_id, false).unwrap();
        assert_eq!(planned, done);
    }

    #[test]
    fn test_undo_dry_run_still_skips_missing() {
        let (dir, journal) = journal();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        fs::write(&a, "x").unwrap();

        let op_id = journal.begin("t", Payload::new()).unwrap();
        journal.journaled_move(&op_id, &a, &b, false).unwrap();
        fs::remove_file(&b).unwrap();

        let planned = journal.undo(&op_id, true).unwrap();
        assert_eq!(planned.len(), 1);
        assert!(planned[0].starts_with("skip missing"));
    }

    #[test]
    fn test_scope_opens_once() {
        let (dir, journal) = journal();
        let scope = JournalScope::new(Arc::new(journal), "task", Payload::new());
        assert!(scope.op_id().is_none());

        let first = scope.ensure().unwrap();
        let second = scope.ensure().unwrap();
        assert_eq!(first, second);
        assert_eq!(scope.op_id(), Some(first.clone()));

        let src = dir.path().join("s.txt");
        fs::write(&src, "x").unwrap();
        scope.journaled_move(&src, &dir.path().join("d.txt"), false).unwrap();
        let events = scope.journal().read(&first).unwrap();
        assert_eq!(events.len(), 3);
    }
}
