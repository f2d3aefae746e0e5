//! Append-only turn store.
//!
//! Each conversation gets a `<id>.jsonl` file under the conversations
//! directory; every committed turn is one JSON line. Turns are committed
//! only after the orchestrator delivers the turn's terminal event, so
//! re-entry never observes half-turns.
//!
//! Invariant: `load_turns` returns sequences ascending with no gaps, and
//! `append_turns` refuses writes that would break that.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use rg_domain::error::{Error, Result};
use rg_domain::turn::Turn;

pub struct TurnStore {
    base_dir: PathBuf,
    /// Per-conversation append locks; appends to one conversation are
    /// serialized, appends to different conversations are not.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TurnStore {
    pub fn new(state_path: &Path) -> Result<Self> {
        let base_dir = state_path.join("conversations");
        std::fs::create_dir_all(&base_dir).map_err(Error::Io)?;
        tracing::info!(path = %base_dir.display(), "turn store ready");
        Ok(Self {
            base_dir,
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// Load every committed turn, ascending by sequence.
    ///
    /// Read failures and invariant breaches are fatal to the caller's turn
    /// (the orchestrator cannot safely compose a prompt from a broken
    /// history).
    pub fn load_turns(&self, conversation_id: &str) -> Result<Vec<Turn>> {
        let path = self.file_path(conversation_id);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let raw = std::fs::read_to_string(&path)
            .map_err(|e| Error::Persistence(format!("reading {}: {e}", path.display())))?;

        let mut turns = Vec::new();
        for (line_no, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let turn: Turn = serde_json::from_str(line).map_err(|e| {
                Error::Persistence(format!(
                    "conversation {conversation_id} line {}: {e}",
                    line_no + 1
                ))
            })?;
            turns.push(turn);
        }

        verify_contiguous(conversation_id, &turns)?;
        Ok(turns)
    }

    /// Sequence the next appended turn must carry.
    pub fn next_sequence(&self, conversation_id: &str) -> Result<u64> {
        Ok(self
            .load_turns(conversation_id)?
            .last()
            .map(|t| t.sequence + 1)
            .unwrap_or(0))
    }

    /// Atomically append a batch of turns.
    ///
    /// The batch must continue the stored sequence exactly; all lines are
    /// written in one `write_all` so a crash cannot leave a partial batch
    /// parseable as complete.
    pub fn append_turns(&self, conversation_id: &str, turns: &[Turn]) -> Result<()> {
        if turns.is_empty() {
            return Ok(());
        }

        let lock = self.lock_for(conversation_id);
        let _guard = lock.lock();

        let expected = self.next_sequence(conversation_id)?;
        for (offset, turn) in turns.iter().enumerate() {
            let want = expected + offset as u64;
            if turn.sequence != want {
                return Err(Error::Invariant(format!(
                    "conversation {conversation_id}: appending sequence {} where {want} is expected",
                    turn.sequence
                )));
            }
        }

        let mut buf = String::new();
        for turn in turns {
            buf.push_str(
                &serde_json::to_string(turn)
                    .map_err(|e| Error::Persistence(format!("serializing turn: {e}")))?,
            );
            buf.push('\n');
        }

        use std::io::Write;
        let path = self.file_path(conversation_id);
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::Persistence(format!("opening {}: {e}", path.display())))?;
        file.write_all(buf.as_bytes())
            .map_err(|e| Error::Persistence(format!("appending to {}: {e}", path.display())))?;

        Ok(())
    }

    fn lock_for(&self, conversation_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .entry(conversation_id.to_owned())
            .or_default()
            .clone()
    }

    fn file_path(&self, conversation_id: &str) -> PathBuf {
        self.base_dir.join(format!("{}.jsonl", sanitize(conversation_id)))
    }
}

/// Conversation ids are opaque client-supplied strings; keep the file name
/// to a safe character set.
fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn verify_contiguous(conversation_id: &str, turns: &[Turn]) -> Result<()> {
    for (i, turn) in turns.iter().enumerate() {
        if turn.sequence != i as u64 {
            debug_assert!(false, "gap in turn sequence for {conversation_id}");
            return Err(Error::Invariant(format!(
                "conversation {conversation_id}: sequence {} at position {i}",
                turn.sequence
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rg_domain::turn::{Role, ToolCall};

    fn store() -> (tempfile::TempDir, TurnStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = TurnStore::new(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn empty_conversation_loads_empty() {
        let (_dir, store) = store();
        assert!(store.load_turns("c1").unwrap().is_empty());
        assert_eq!(store.next_sequence("c1").unwrap(), 0);
    }

    #[test]
    fn append_and_load_round_trip() {
        let (_dir, store) = store();
        store
            .append_turns("c1", &[Turn::user(0, "what does 25.1309 require?")])
            .unwrap();
        store
            .append_turns("c1", &[Turn::assistant(1, "It requires...", &[])])
            .unwrap();

        let turns = store.load_turns("c1").unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[1].sequence, 1);
    }

    #[test]
    fn sequences_are_gap_free_and_ascending() {
        let (_dir, store) = store();
        for i in 0..6u64 {
            store.append_turns("c1", &[Turn::user(i, format!("m{i}"))]).unwrap();
        }
        let turns = store.load_turns("c1").unwrap();
        for (i, t) in turns.iter().enumerate() {
            assert_eq!(t.sequence, i as u64);
        }
    }

    #[test]
    fn append_with_gap_is_rejected() {
        let (_dir, store) = store();
        store.append_turns("c1", &[Turn::user(0, "hi")]).unwrap();
        let err = store.append_turns("c1", &[Turn::user(5, "skip")]).unwrap_err();
        assert_eq!(err.classification(), "internal");
        // The rejected write left nothing behind.
        assert_eq!(store.load_turns("c1").unwrap().len(), 1);
    }

    #[test]
    fn batch_append_is_all_or_nothing_on_gap() {
        let (_dir, store) = store();
        let batch = vec![Turn::user(0, "a"), Turn::user(2, "c")];
        assert!(store.append_turns("c1", &batch).is_err());
        assert!(store.load_turns("c1").unwrap().is_empty());
    }

    #[test]
    fn conversations_are_isolated() {
        let (_dir, store) = store();
        store.append_turns("c1", &[Turn::user(0, "one")]).unwrap();
        store.append_turns("c2", &[Turn::user(0, "two")]).unwrap();
        assert_eq!(store.load_turns("c1").unwrap()[0].text(), "one");
        assert_eq!(store.load_turns("c2").unwrap()[0].text(), "two");
    }

    #[test]
    fn assistant_tool_blocks_survive_round_trip() {
        let (_dir, store) = store();
        let calls = vec![ToolCall {
            call_id: "tc_1".into(),
            tool_name: "fetch_cfr_section".into(),
            arguments: serde_json::json!({"title": 14}),
        }];
        store
            .append_turns(
                "c1",
                &[
                    Turn::user(0, "q"),
                    Turn::assistant(1, "", &calls),
                    Turn::tool_results(2, vec![("tc_1".into(), "body".into(), false)]),
                ],
            )
            .unwrap();
        let turns = store.load_turns("c1").unwrap();
        assert_eq!(turns[1].tool_calls()[0].call_id, "tc_1");
    }

    #[test]
    fn hostile_ids_stay_inside_the_store_dir() {
        let (dir, store) = store();
        store
            .append_turns("../../etc/passwd", &[Turn::user(0, "x")])
            .unwrap();
        // Nothing escaped the conversations dir.
        let escaped = dir.path().join("../etc");
        assert!(!escaped.exists());
    }
}
