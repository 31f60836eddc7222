use crate::chunking::{chunk_text, ChunkingConfig};
use crate::embeddings::Embedder;
use crate::error::EngineError;
use crate::index::FlatIndex;
use crate::models::{EngineStats, RecordMetadata, VectorId, VectorRecord};
use crate::store::VectorStore;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const INDEX_FILE_NAME: &str = "vectors.index";
pub const STORE_FILE_NAME: &str = "vector_store.json";

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub data_dir: PathBuf,
    pub chunking: ChunkingConfig,
}

impl RetrievalConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            chunking: ChunkingConfig::default(),
        }
    }
}

/// Ties chunker, embedder, store, and index together: ingest/replace, scoped
/// retrieval, scoped delete, and the unscoped knowledge feed.
///
/// Mutating operations take `&mut self`, so overlapping request handlers must
/// serialize access (a mutex or a single-writer queue). Embedding and search
/// are CPU-bound; hosts on cooperative runtimes should call through their
/// blocking-task facility.
pub struct RetrievalCoordinator<E> {
    config: RetrievalConfig,
    embedder: E,
    index: FlatIndex,
    store: VectorStore,
    index_path: PathBuf,
    store_path: PathBuf,
}

impl<E> RetrievalCoordinator<E>
where
    E: Embedder + Send + Sync,
{
    /// Creates the data directory, loads both persisted files, and keeps them
    /// cached for the life of the value. An existing index whose dimension
    /// does not match the embedder fails here rather than mid-request.
    pub fn open(config: RetrievalConfig, embedder: E) -> Result<Self, EngineError> {
        fs::create_dir_all(&config.data_dir)?;
        let index_path = config.data_dir.join(INDEX_FILE_NAME);
        let store_path = config.data_dir.join(STORE_FILE_NAME);

        let store = VectorStore::load(&store_path);
        let index = FlatIndex::load_or_create(&index_path, embedder.dimensions())?;

        Ok(Self {
            config,
            embedder,
            index,
            store,
            index_path,
            store_path,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Chunks extracted text with the engine's config and upserts the result.
    /// Empty text yields zero chunks and zero vectors, not an error.
    pub async fn ingest_text(
        &mut self,
        document_id: &str,
        filename: &str,
        text: &str,
        method: &str,
    ) -> Result<usize, EngineError> {
        let chunks = chunk_text(text, self.config.chunking);
        self.upsert_document(document_id, filename, &chunks, method)
            .await
    }

    /// Replaces all vectors for `document_id` with embeddings of `chunks`.
    /// Old vectors are removed first, so re-ingesting never accumulates;
    /// returns the number of chunks ingested.
    pub async fn upsert_document(
        &mut self,
        document_id: &str,
        filename: &str,
        chunks: &[String],
        method: &str,
    ) -> Result<usize, EngineError> {
        if chunks.is_empty() {
            return Ok(0);
        }
        if document_id.trim().is_empty() {
            return Err(EngineError::InvalidInput(
                "document id must not be empty".to_string(),
            ));
        }

        let stale = self.store.ids_for_document(document_id);
        if !stale.is_empty() {
            let dropped = self.index.remove(&stale);
            self.store.remove_ids(&stale);
            debug!(document_id, stale = stale.len(), dropped, "replacing existing vectors");
        }

        let embeddings = self.embedder.embed(chunks).await?;

        let mut ids: Vec<VectorId> = Vec::with_capacity(chunks.len());
        for (chunk_index, chunk) in chunks.iter().enumerate() {
            let id = self.store.allocate_id();
            self.store.insert(
                id,
                VectorRecord {
                    text: chunk.clone(),
                    metadata: RecordMetadata::document(document_id, filename, method, chunk_index),
                },
            );
            ids.push(id);
        }

        self.index.add(&ids, &embeddings)?;
        self.persist()?;

        debug!(document_id, count = chunks.len(), "ingested document chunks");
        Ok(chunks.len())
    }

    /// Returns up to `k` chunk texts for `document_id`, most similar first.
    /// An empty result means insufficient grounding, not failure.
    pub async fn retrieve(
        &mut self,
        document_id: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<String>, EngineError> {
        if self.index.is_empty() {
            return Ok(Vec::new());
        }

        let query_texts = vec![query.to_string()];
        let mut rows = self.embedder.embed(&query_texts).await?;
        let query_vector = match rows.pop() {
            Some(row) => row,
            None => return Ok(Vec::new()),
        };

        // the index has no per-document filter, so over-fetch and scope here
        let top_n = k.saturating_mul(10).max(25);
        let hits = self.index.search(&query_vector, top_n)?;

        let mut texts = Vec::new();
        for (id, _score) in hits {
            if texts.len() >= k {
                break;
            }
            // ids the store has never heard of are stale index entries
            let record = match self.store.get(id) {
                Some(record) => record,
                None => continue,
            };
            if record.metadata.document_id() != Some(document_id) {
                continue;
            }
            if record.text.trim().is_empty() {
                continue;
            }
            texts.push(record.text.clone());
        }

        debug!(document_id, requested = k, returned = texts.len(), "scoped retrieval");
        Ok(texts)
    }

    /// Removes every vector belonging to `document_id` from index and store.
    /// Returns how many were removed; zero is not an error.
    pub fn delete_document(&mut self, document_id: &str) -> Result<usize, EngineError> {
        let ids = self.store.ids_for_document(document_id);
        if ids.is_empty() {
            return Ok(0);
        }

        self.index.remove(&ids);
        self.store.remove_ids(&ids);
        self.persist()?;

        debug!(document_id, count = ids.len(), "deleted document vectors");
        Ok(ids.len())
    }

    /// Stores unscoped reference knowledge under the shared allocator and
    /// index. Knowledge records are invisible to document-scoped retrieval.
    pub async fn feed_knowledge(&mut self, source: &str, text: &str) -> Result<usize, EngineError> {
        let chunks = chunk_text(text, self.config.chunking);
        if chunks.is_empty() {
            return Ok(0);
        }

        let embeddings = self.embedder.embed(&chunks).await?;

        let mut ids: Vec<VectorId> = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let id = self.store.allocate_id();
            self.store.insert(
                id,
                VectorRecord {
                    text: chunk.clone(),
                    metadata: RecordMetadata::knowledge(source),
                },
            );
            ids.push(id);
        }

        self.index.add(&ids, &embeddings)?;
        self.persist()?;

        debug!(source, count = chunks.len(), "stored knowledge chunks");
        Ok(chunks.len())
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            vectors: self.store.len(),
            documents: self.store.document_count(),
            next_id: self.store.next_id,
        }
    }

    fn persist(&self) -> Result<(), EngineError> {
        // index first: a crash between the writes leaves index ids the store
        // lookup filters out, never store rows invisible to search
        self.index.save(&self.index_path)?;
        self.store.save(&self.store_path)
    }
}

/// Joins retrieved snippets into one grounding context, truncated to the
/// caller's character budget.
pub fn assemble_context(snippets: &[String], max_chars: usize) -> String {
    let joined = snippets.join("\n\n");
    if joined.chars().count() <= max_chars {
        return joined;
    }
    joined.chars().take(max_chars).collect()
}
