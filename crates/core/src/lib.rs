pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod index;
pub mod models;
pub mod orchestrator;
pub mod store;

pub use chunking::{chunk_text, ChunkingConfig};
pub use embeddings::{
    l2_normalize, Embedder, HashingEmbedder, HttpEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{EmbedError, EngineError};
pub use index::FlatIndex;
pub use models::{
    DocumentMetadata, EngineStats, KnowledgeMetadata, RecordMetadata, VectorId, VectorRecord,
};
pub use orchestrator::{
    assemble_context, RetrievalConfig, RetrievalCoordinator, INDEX_FILE_NAME, STORE_FILE_NAME,
};
pub use store::VectorStore;
