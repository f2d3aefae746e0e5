//! Per-conversation memo of reassembled personal-document text.
//!
//! `fetch_personal_document` populates the memo so a follow-up
//! `search_personal_document` in the same conversation skips the chunk
//! reassembly. Memos never cross conversations and are evicted when the
//! conversation's channel closes.

use std::collections::HashMap;

use parking_lot::RwLock;

pub struct MemoStore {
    /// conversation id -> (memo key -> full text)
    memos: RwLock<HashMap<String, HashMap<String, String>>>,
}

impl Default for MemoStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoStore {
    pub fn new() -> Self {
        Self {
            memos: RwLock::new(HashMap::new()),
        }
    }

    /// Memo key for a personal document.
    pub fn key(document_id: &str) -> String {
        format!("personal_doc_{document_id}")
    }

    pub fn get(&self, conversation_id: &str, key: &str) -> Option<String> {
        self.memos
            .read()
            .get(conversation_id)
            .and_then(|m| m.get(key).cloned())
    }

    pub fn put(&self, conversation_id: &str, key: String, text: String) {
        self.memos
            .write()
            .entry(conversation_id.to_owned())
            .or_default()
            .insert(key, text);
    }

    /// Evict everything a conversation memoized.
    pub fn drop_conversation(&self, conversation_id: &str) {
        self.memos.write().remove(conversation_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memo_round_trip() {
        let memos = MemoStore::new();
        let key = MemoStore::key("doc-1");
        assert_eq!(key, "personal_doc_doc-1");

        memos.put("c1", key.clone(), "full text".into());
        assert_eq!(memos.get("c1", &key).unwrap(), "full text");
    }

    #[test]
    fn memos_do_not_cross_conversations() {
        let memos = MemoStore::new();
        memos.put("c1", MemoStore::key("d"), "text".into());
        assert!(memos.get("c2", &MemoStore::key("d")).is_none());
    }

    #[test]
    fn drop_conversation_evicts() {
        let memos = MemoStore::new();
        memos.put("c1", MemoStore::key("d"), "text".into());
        memos.drop_conversation("c1");
        assert!(memos.get("c1", &MemoStore::key("d")).is_none());
    }
}
