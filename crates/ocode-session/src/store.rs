// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use ocode_model::Message;
use tracing::warn;
use uuid::Uuid;

/// Append-only JSONL message store, one file per session id.
///
/// `open` tolerates corrupt lines (a crash mid-write leaves a partial final
/// line); invariant repair on the loaded messages is the orchestrator's job,
/// not the store's.
#[derive(Debug)]
pub struct SessionStore {
    pub session_id: String,
    pub path: PathBuf,
    pub messages: Vec<Message>,
}

fn sessions_dir(root: &Path) -> anyhow::Result<PathBuf> {
    let d = root.join("sessions");
    std::fs::create_dir_all(&d).with_context(|| format!("creating {}", d.display()))?;
    Ok(d)
}

impl SessionStore {
    /// Open (or create) a session under `data_root`. A fresh id is minted
    /// when none is given.
    pub fn open(data_root: &Path, session_id: Option<&str>) -> anyhow::Result<Self> {
        let sid = match session_id {
            Some(s) if !s.trim().is_empty() => s.trim().to_string(),
            _ => Uuid::new_v4().simple().to_string()[..12].to_string(),
        };
        let path = sessions_dir(data_root)?.join(format!("{sid}.jsonl"));
        let mut messages = Vec::new();
        if path.exists() {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            for line in text.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Message>(line) {
                    Ok(m) => messages.push(m),
                    Err(e) => {
                        // Partial trailing line from a crash mid-write.
                        warn!(session = %sid, error = %e, "skipping corrupt session line");
                    }
                }
            }
        }
        Ok(Self {
            session_id: sid,
            path,
            messages,
        })
    }

    /// Append one message: write a line, flush, fsync (best-effort).
    pub fn append(&mut self, msg: Message) -> anyhow::Result<()> {
        let line = serde_json::to_string(&msg).context("serializing message")?;
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening {}", self.path.display()))?;
        writeln!(f, "{line}").with_context(|| format!("writing {}", self.path.display()))?;
        f.flush().ok();
        if let Err(e) = f.sync_all() {
            // Some filesystems do not support fsync; resume still works off
            // the flushed data in the common case.
            warn!(error = %e, "session fsync failed");
        }
        self.messages.push(msg);
        Ok(())
    }

    pub fn extend(&mut self, msgs: impl IntoIterator<Item = Message>) -> anyhow::Result<()> {
        for m in msgs {
            self.append(m)?;
        }
        Ok(())
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Atomically replace the on-disk log with `messages`.
    ///
    /// Used by the orchestrator after invariant repair so the file never
    /// keeps orphan tool messages that were dropped from memory.
    pub fn rewrite(&mut self, messages: Vec<Message>) -> anyhow::Result<()> {
        let tmp = self.path.with_extension("jsonl.tmp");
        {
            let mut f = std::fs::File::create(&tmp)
                .with_context(|| format!("creating {}", tmp.display()))?;
            for m in &messages {
                let line = serde_json::to_string(m).context("serializing message")?;
                writeln!(f, "{line}").with_context(|| format!("writing {}", tmp.display()))?;
            }
            f.flush().ok();
            if let Err(e) = f.sync_all() {
                warn!(error = %e, "session fsync failed during rewrite");
            }
        }
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        self.messages = messages;
        Ok(())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use ocode_model::{Role, ToolCallRequest};
    use serde_json::json;

    #[test]
    fn fresh_session_gets_a_generated_id() {
        let dir = tempfile::tempdir().unwrap();
        let a = SessionStore::open(dir.path(), None).unwrap();
        let b = SessionStore::open(dir.path(), None).unwrap();
        assert_ne!(a.session_id, b.session_id);
        assert!(a.messages.is_empty());
    }

    #[test]
    fn append_then_reopen_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = SessionStore::open(dir.path(), Some("s1")).unwrap();
        s.append(Message::system("sys")).unwrap();
        s.append(Message::user("hello")).unwrap();
        s.append(Message::assistant_tool_calls(vec![ToolCallRequest {
            id: "t1".into(),
            name: "read".into(),
            arguments: json!({"path": "a.txt"}),
        }]))
        .unwrap();

        let reopened = SessionStore::open(dir.path(), Some("s1")).unwrap();
        assert_eq!(reopened.messages.len(), 3);
        assert_eq!(reopened.messages[2].role, Role::Assistant);
        assert!(reopened.messages[2].content.is_none());
        let calls = reopened.messages[2].tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].id, "t1");
    }

    #[test]
    fn reopen_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = SessionStore::open(dir.path(), Some("s2")).unwrap();
        s.append(Message::user("a")).unwrap();
        s.append(Message::assistant("b")).unwrap();
        let once = SessionStore::open(dir.path(), Some("s2")).unwrap();
        let twice = SessionStore::open(dir.path(), Some("s2")).unwrap();
        let dump = |st: &SessionStore| {
            st.messages
                .iter()
                .map(|m| serde_json::to_string(m).unwrap())
                .collect::<Vec<_>>()
        };
        assert_eq!(dump(&once), dump(&twice));
    }

    #[test]
    fn corrupt_trailing_line_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = SessionStore::open(dir.path(), Some("s3")).unwrap();
        s.append(Message::user("intact")).unwrap();
        // Simulate a crash mid-write.
        let mut f = OpenOptions::new().append(true).open(&s.path).unwrap();
        write!(f, "{{\"role\":\"assistant\",\"cont").unwrap();
        drop(f);

        let reopened = SessionStore::open(dir.path(), Some("s3")).unwrap();
        assert_eq!(reopened.messages.len(), 1);
        assert_eq!(reopened.messages[0].content.as_deref(), Some("intact"));
    }

    #[test]
    fn blank_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = SessionStore::open(dir.path(), Some("s4")).unwrap();
        s.append(Message::user("x")).unwrap();
        let mut f = OpenOptions::new().append(true).open(&s.path).unwrap();
        writeln!(f).unwrap();
        drop(f);
        let reopened = SessionStore::open(dir.path(), Some("s4")).unwrap();
        assert_eq!(reopened.messages.len(), 1);
    }
}
