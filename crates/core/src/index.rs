use crate::error::EngineError;
use crate::models::VectorId;
use crate::store::write_atomic;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;
use tracing::warn;

/// Exact inner-product index addressable by arbitrary vector ids.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    ids: Vec<VectorId>,
    vectors: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ids: Vec::new(),
            vectors: Vec::new(),
        }
    }

    /// Deserializes a persisted index, or builds an empty one when the file
    /// is absent or unreadable. A readable index whose dimension differs from
    /// the active embedder is a configuration error, not a recoverable one.
    pub fn load_or_create(path: &Path, dimension: usize) -> Result<Self, EngineError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Ok(Self::new(dimension));
            }
            Err(error) => return Err(error.into()),
        };

        match bincode::deserialize::<Self>(&bytes) {
            Ok(index) => {
                if index.dimension != dimension {
                    return Err(EngineError::DimensionMismatch {
                        expected: index.dimension,
                        found: dimension,
                    });
                }
                if index.ids.len() * index.dimension != index.vectors.len() {
                    warn!(path = %path.display(), "index row data inconsistent, starting empty");
                    return Ok(Self::new(dimension));
                }
                Ok(index)
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "index file unreadable, starting empty");
                Ok(Self::new(dimension))
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        let bytes = bincode::serialize(self)?;
        write_atomic(path, &bytes)?;
        Ok(())
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Adds rows under the given ids, positionally. The caller must remove an
    /// id before re-adding it; this layer does not deduplicate.
    pub fn add(&mut self, ids: &[VectorId], rows: &[Vec<f32>]) -> Result<(), EngineError> {
        if ids.len() != rows.len() {
            return Err(EngineError::InvalidInput(format!(
                "{} ids for {} vectors",
                ids.len(),
                rows.len()
            )));
        }

        for row in rows {
            if row.len() != self.dimension {
                return Err(EngineError::DimensionMismatch {
                    expected: self.dimension,
                    found: row.len(),
                });
            }
        }

        self.ids.extend_from_slice(ids);
        for row in rows {
            self.vectors.extend_from_slice(row);
        }
        Ok(())
    }

    /// Drops the given ids; ids not present are skipped silently.
    pub fn remove(&mut self, ids: &[VectorId]) -> usize {
        if ids.is_empty() || self.ids.is_empty() {
            return 0;
        }

        let doomed: HashSet<VectorId> = ids.iter().copied().collect();
        let mut kept_ids = Vec::with_capacity(self.ids.len());
        let mut kept_rows = Vec::with_capacity(self.vectors.len());
        let mut removed = 0;

        for (row, id) in self.ids.iter().enumerate() {
            if doomed.contains(id) {
                removed += 1;
                continue;
            }
            kept_ids.push(*id);
            let offset = row * self.dimension;
            kept_rows.extend_from_slice(&self.vectors[offset..offset + self.dimension]);
        }

        self.ids = kept_ids;
        self.vectors = kept_rows;
        removed
    }

    /// Exact scan ranked by descending inner product, ties broken by id so
    /// results are stable across runs.
    pub fn search(
        &self,
        query: &[f32],
        top_n: usize,
    ) -> Result<Vec<(VectorId, f32)>, EngineError> {
        if self.ids.is_empty() || top_n == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(EngineError::DimensionMismatch {
                expected: self.dimension,
                found: query.len(),
            });
        }

        let mut scored: Vec<(VectorId, f32)> = self
            .ids
            .iter()
            .enumerate()
            .map(|(row, &id)| {
                let offset = row * self.dimension;
                let score = query
                    .iter()
                    .zip(&self.vectors[offset..offset + self.dimension])
                    .map(|(q, v)| q * v)
                    .sum::<f32>();
                (id, score)
            })
            .collect();

        scored.sort_by(|left, right| right.1.total_cmp(&left.1).then_with(|| left.0.cmp(&right.0)));
        scored.truncate(top_n);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn unit(dimension: usize, axis: usize) -> Vec<f32> {
        let mut row = vec![0f32; dimension];
        row[axis] = 1.0;
        row
    }

    #[test]
    fn search_ranks_by_inner_product() {
        let mut index = FlatIndex::new(4);
        index
            .add(&[10, 20, 30], &[unit(4, 0), unit(4, 1), unit(4, 2)])
            .unwrap();

        let hits = index.search(&[0.9, 0.1, 0.0, 0.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, 10);
        assert_eq!(hits[1].0, 20);
        assert!(hits[0].1 > hits[1].1);
    }

    #[test]
    fn empty_index_returns_no_hits() {
        let index = FlatIndex::new(4);
        assert!(index.search(&unit(4, 0), 5).unwrap().is_empty());
    }

    #[test]
    fn removing_missing_ids_is_a_noop() {
        let mut index = FlatIndex::new(4);
        index.add(&[1], &[unit(4, 0)]).unwrap();

        assert_eq!(index.remove(&[99, 100]), 0);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn removed_ids_disappear_from_search() {
        let mut index = FlatIndex::new(4);
        index
            .add(&[1, 2, 3], &[unit(4, 0), unit(4, 1), unit(4, 2)])
            .unwrap();

        assert_eq!(index.remove(&[2]), 1);
        let hits = index.search(&unit(4, 1), 10).unwrap();
        assert!(hits.iter().all(|(id, _)| *id != 2));
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn id_can_be_readded_after_removal() {
        let mut index = FlatIndex::new(2);
        index.add(&[5], &[unit(2, 0)]).unwrap();
        index.remove(&[5]);
        index.add(&[5], &[unit(2, 1)]).unwrap();

        let hits = index.search(&unit(2, 1), 1).unwrap();
        assert_eq!(hits[0].0, 5);
    }

    #[test]
    fn id_and_row_count_mismatch_is_rejected() {
        let mut index = FlatIndex::new(2);
        let result = index.add(&[1, 2], &[unit(2, 0)]);
        assert!(matches!(result, Err(EngineError::InvalidInput(_))));
    }

    #[test]
    fn wrong_row_dimension_is_rejected() {
        let mut index = FlatIndex::new(2);
        let result = index.add(&[1], &[unit(3, 0)]);
        assert!(matches!(
            result,
            Err(EngineError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vectors.index");

        let mut index = FlatIndex::new(3);
        index.add(&[4, 9], &[unit(3, 0), unit(3, 2)]).unwrap();
        index.save(&path).unwrap();

        let loaded = FlatIndex::load_or_create(&path, 3).unwrap();
        assert_eq!(loaded, index);
    }

    #[test]
    fn dimension_mismatch_on_load_is_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vectors.index");
        FlatIndex::new(8).save(&path).unwrap();

        let result = FlatIndex::load_or_create(&path, 16);
        assert!(matches!(
            result,
            Err(EngineError::DimensionMismatch {
                expected: 8,
                found: 16
            })
        ));
    }

    #[test]
    fn unreadable_index_file_starts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vectors.index");
        fs::write(&path, b"\x00\x01garbage").unwrap();

        let index = FlatIndex::load_or_create(&path, 4).unwrap();
        assert!(index.is_empty());
        assert_eq!(index.dimension(), 4);
    }
}
