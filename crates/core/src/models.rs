use serde::{Deserialize, Serialize};

pub type VectorId = u64;

pub const UPLOAD_SOURCE: &str = "upload";
pub const KNOWLEDGE_KIND: &str = "knowledge";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentMetadata {
    pub document_id: String,
    pub filename: String,
    pub source: String,
    pub method: String,
    pub chunk_index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KnowledgeMetadata {
    pub source: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// The two record shapes the engine ever writes. Serialized untagged so the
/// persisted JSON carries the plain field layout of each variant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum RecordMetadata {
    Document(DocumentMetadata),
    Knowledge(KnowledgeMetadata),
}

impl RecordMetadata {
    pub fn document(
        document_id: impl Into<String>,
        filename: impl Into<String>,
        method: impl Into<String>,
        chunk_index: usize,
    ) -> Self {
        Self::Document(DocumentMetadata {
            document_id: document_id.into(),
            filename: filename.into(),
            source: UPLOAD_SOURCE.to_string(),
            method: method.into(),
            chunk_index,
        })
    }

    pub fn knowledge(source: impl Into<String>) -> Self {
        Self::Knowledge(KnowledgeMetadata {
            source: source.into(),
            kind: KNOWLEDGE_KIND.to_string(),
        })
    }

    pub fn document_id(&self) -> Option<&str> {
        match self {
            Self::Document(meta) => Some(&meta.document_id),
            Self::Knowledge(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VectorRecord {
    pub text: String,
    pub metadata: RecordMetadata,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineStats {
    pub vectors: usize,
    pub documents: usize,
    pub next_id: VectorId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_metadata_round_trips_as_plain_object() {
        let metadata = RecordMetadata::document("doc-1", "report.pdf", "pdf_text", 3);
        let json = serde_json::to_value(&metadata).unwrap();

        assert_eq!(json["document_id"], "doc-1");
        assert_eq!(json["source"], "upload");
        assert_eq!(json["chunk_index"], 3);
        assert!(json.get("Document").is_none());

        let back: RecordMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(back, metadata);
    }

    #[test]
    fn knowledge_metadata_uses_type_field() {
        let metadata = RecordMetadata::knowledge("manual");
        let json = serde_json::to_value(&metadata).unwrap();

        assert_eq!(json["source"], "manual");
        assert_eq!(json["type"], "knowledge");

        let back: RecordMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(back.document_id(), None);
    }
}
