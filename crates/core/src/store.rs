use crate::error::EngineError;
use crate::models::{VectorId, VectorRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::path::Path;
use tracing::warn;

pub const FIRST_VECTOR_ID: VectorId = 1;

/// Durable id -> record mapping plus the id allocator. Ids are handed out by
/// reading then incrementing `next_id` and are never reused, so deletions
/// leave permanent gaps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VectorStore {
    pub next_id: VectorId,
    pub vectors: BTreeMap<VectorId, VectorRecord>,
}

impl Default for VectorStore {
    fn default() -> Self {
        Self {
            next_id: FIRST_VECTOR_ID,
            vectors: BTreeMap::new(),
        }
    }
}

impl VectorStore {
    /// Reads the persisted store. An absent or unparseable file yields a
    /// fresh empty store; a file whose allocator lags behind a live id is
    /// repaired so ids are still never reused.
    pub fn load(path: &Path) -> Self {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(error) => {
                if error.kind() != io::ErrorKind::NotFound {
                    warn!(path = %path.display(), %error, "store file unreadable, starting empty");
                }
                return Self::default();
            }
        };

        match serde_json::from_slice::<Self>(&bytes) {
            Ok(mut store) => {
                if let Some(max_id) = store.vectors.keys().next_back().copied() {
                    if store.next_id <= max_id {
                        warn!(
                            next_id = store.next_id,
                            max_id, "store id allocator behind live ids, repairing"
                        );
                        store.next_id = max_id + 1;
                    }
                }
                store
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "store file malformed, starting empty");
                Self::default()
            }
        }
    }

    /// Whole-file rewrite through a temporary sibling, so readers only ever
    /// observe a complete store file.
    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        let bytes = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &bytes)?;
        Ok(())
    }

    /// Returns the next id and advances the allocator. The id becomes durable
    /// only once the store is saved.
    pub fn allocate_id(&mut self) -> VectorId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn insert(&mut self, id: VectorId, record: VectorRecord) {
        self.vectors.insert(id, record);
    }

    pub fn get(&self, id: VectorId) -> Option<&VectorRecord> {
        self.vectors.get(&id)
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn ids_for_document(&self, document_id: &str) -> Vec<VectorId> {
        self.vectors
            .iter()
            .filter(|(_, record)| record.metadata.document_id() == Some(document_id))
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn remove_ids(&mut self, ids: &[VectorId]) {
        for id in ids {
            self.vectors.remove(id);
        }
    }

    pub fn document_count(&self) -> usize {
        self.vectors
            .values()
            .filter_map(|record| record.metadata.document_id())
            .collect::<HashSet<_>>()
            .len()
    }
}

pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordMetadata;
    use tempfile::tempdir;

    fn record(document_id: &str, text: &str, chunk_index: usize) -> VectorRecord {
        VectorRecord {
            text: text.to_string(),
            metadata: RecordMetadata::document(document_id, "report.pdf", "pdf_text", chunk_index),
        }
    }

    #[test]
    fn absent_file_loads_as_fresh_store() {
        let dir = tempdir().unwrap();
        let store = VectorStore::load(&dir.path().join("missing.json"));
        assert_eq!(store.next_id, FIRST_VECTOR_ID);
        assert!(store.is_empty());
    }

    #[test]
    fn malformed_file_loads_as_fresh_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vector_store.json");
        fs::write(&path, b"{ not json").unwrap();

        let store = VectorStore::load(&path);
        assert_eq!(store.next_id, FIRST_VECTOR_ID);
        assert!(store.is_empty());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vector_store.json");

        let mut store = VectorStore::default();
        let id = store.allocate_id();
        store.insert(id, record("doc-1", "alpha beta", 0));
        store.save(&path).unwrap();

        let loaded = VectorStore::load(&path);
        assert_eq!(loaded, store);
        assert_eq!(loaded.get(id).map(|r| r.text.as_str()), Some("alpha beta"));
    }

    #[test]
    fn allocated_ids_are_strictly_increasing() {
        let mut store = VectorStore::default();
        let first = store.allocate_id();
        let second = store.allocate_id();
        store.remove_ids(&[first, second]);
        let third = store.allocate_id();

        assert!(first < second && second < third);
    }

    #[test]
    fn lagging_allocator_is_repaired_on_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vector_store.json");

        let mut store = VectorStore::default();
        store.insert(7, record("doc-1", "gamma", 0));
        store.next_id = 3;
        store.save(&path).unwrap();

        let loaded = VectorStore::load(&path);
        assert_eq!(loaded.next_id, 8);
    }

    #[test]
    fn document_scan_only_matches_that_document() {
        let mut store = VectorStore::default();
        for (document, text) in [("a", "one"), ("b", "two"), ("a", "three")] {
            let id = store.allocate_id();
            store.insert(id, record(document, text, 0));
        }
        let knowledge_id = store.allocate_id();
        store.insert(
            knowledge_id,
            VectorRecord {
                text: "reference text".to_string(),
                metadata: RecordMetadata::knowledge("manual"),
            },
        );

        assert_eq!(store.ids_for_document("a"), vec![1, 3]);
        assert_eq!(store.ids_for_document("missing"), Vec::<VectorId>::new());
        assert_eq!(store.document_count(), 2);
    }

    #[test]
    fn persisted_ids_are_string_keys() {
        let mut store = VectorStore::default();
        let id = store.allocate_id();
        store.insert(id, record("doc-1", "alpha", 0));

        let json = serde_json::to_value(&store).unwrap();
        assert!(json["vectors"]["1"]["text"].is_string());
    }
}
