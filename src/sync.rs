use crate::{
    chunking::Chunk,
    error::{Error, Result},
    index::{IndexRecord, RecordMetadata, VectorIndex},
};

pub const DEFAULT_BATCH_SIZE: usize = 100;

/// How record ids are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdScheme {
    /// `batch{offset}-chunk{j}`: stable for a fixed chunk order and batch
    /// size, but unrelated chunks collide when the corpus changes.
    #[default]
    Positional,
    /// `chunk-{index}-{hash}`: derived from the chunk text and its position.
    ContentHash,
}

impl IdScheme {
    /// Id for the `offset`-th chunk of the batch starting at `batch_start`.
    ///
    /// # Examples
    ///
    /// ```
    /// use docrag::chunking::{Chunk, ChunkLocation};
    /// use docrag::sync::IdScheme;
    ///
    /// let chunk = Chunk {
    ///     text: "hello".into(),
    ///     source_ref: "Page: 1".into(),
    ///     index: 101,
    ///     location: ChunkLocation { page: 1, start: 0, end: 5 },
    /// };
    /// let positional = IdScheme::Positional.record_id(100, 1, &chunk);
    /// assert_eq!(positional, "batch100-chunk1");
    ///
    /// let hashed = IdScheme::ContentHash.record_id(100, 1, &chunk);
    /// assert!(hashed.starts_with("chunk-101-"));
    /// ```
    pub fn record_id(
        self,
        batch_start: usize,
        offset: usize,
        chunk: &Chunk,
    ) -> String {
        match self {
            Self::Positional => format!("batch{batch_start}-chunk{offset}"),
            Self::ContentHash => {
                let hash = blake3::hash(chunk.text.as_bytes()).to_hex();
                format!("chunk-{}-{}", chunk.index, &hash[..16])
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub records: usize,
    pub batches: usize,
}

/// Pair one batch of chunks with their vectors.
pub fn build_records(
    chunks: &[Chunk],
    embeddings: &[Vec<f32>],
    batch_start: usize,
    scheme: IdScheme,
) -> Result<Vec<IndexRecord>> {
    chunks
        .iter()
        .zip(embeddings)
        .enumerate()
        .map(|(offset, (chunk, values))| {
            Ok(IndexRecord {
                id: scheme.record_id(batch_start, offset, chunk),
                values: values.clone(),
                metadata: RecordMetadata {
                    source: chunk.source_ref.clone(),
                    loc: serde_json::to_string(&chunk.location)?,
                    text: chunk.text.clone(),
                },
            })
        })
        .collect()
}

/// Upsert every chunk with its embedding, `batch_size` records at a time.
///
/// Batches go out one after another in chunk order. The first failing batch
/// stops the run; batches before it stay in the index and the error reports
/// how many were committed.
pub async fn sync<V: VectorIndex>(
    index: &V,
    index_name: &str,
    chunks: &[Chunk],
    embeddings: &[Vec<f32>],
    batch_size: usize,
    scheme: IdScheme,
) -> Result<SyncReport> {
    if chunks.len() != embeddings.len() {
        return Err(Error::CountMismatch {
            chunks: chunks.len(),
            embeddings: embeddings.len(),
        });
    }
    if batch_size == 0 {
        return Err(Error::Config("batch size must be at least 1".into()));
    }

    let total = chunks.len().div_ceil(batch_size);
    let batches = chunks.chunks(batch_size).zip(embeddings.chunks(batch_size));

    for (n, (chunk_batch, vector_batch)) in batches.enumerate() {
        let batch_start = n * batch_size;
        let records =
            build_records(chunk_batch, vector_batch, batch_start, scheme)?;

        tracing::info!(
            index = %index_name,
            records = records.len(),
            "Upserting batch {} of {total}",
            n + 1
        );
        if let Err(e) = index.upsert(index_name, &records).await {
            tracing::error!(batch = n + 1, total, error = %e, "upsert failed");
            return Err(Error::Sync {
                batch: n + 1,
                total,
                committed: n,
                source: Box::new(e),
            });
        }
    }

    tracing::info!(
        index = %index_name,
        records = chunks.len(),
        batches = total,
        "index synchronized"
    );
    Ok(SyncReport {
        records: chunks.len(),
        batches: total,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{
        chunking::ChunkLocation,
        index::{
            IndexDescription,
            IndexSpec,
            MemoryIndex,
            Metric,
            QueryMatch,
            QueryRequest,
        },
    };

    fn chunks(n: usize) -> Vec<Chunk> {
        (0..n)
            .map(|i| Chunk {
                text: format!("passage {i}"),
                source_ref: format!("Page: {}", i / 2 + 1),
                index: i,
                location: ChunkLocation {
                    page: i / 2 + 1,
                    start: 0,
                    end: 9,
                },
            })
            .collect()
    }

    fn vectors(n: usize) -> Vec<Vec<f32>> {
        (0..n).map(|i| vec![i as f32, 1.0]).collect()
    }

    async fn memory_index() -> MemoryIndex {
        let index = MemoryIndex::new();
        index
            .create_index(&IndexSpec {
                name: "docs".into(),
                dimension: 2,
                metric: Metric::Cosine,
            })
            .await
            .unwrap();
        index
    }

    /// Passes calls through to a [`MemoryIndex`] but fails the n-th upsert.
    struct FailingUpsert {
        inner: MemoryIndex,
        fail_on: usize,
        calls: AtomicUsize,
    }

    impl VectorIndex for FailingUpsert {
        async fn list_indexes(&self) -> Result<Vec<String>> {
            self.inner.list_indexes().await
        }

        async fn describe_index(
            &self,
            name: &str,
        ) -> Result<Option<IndexDescription>> {
            self.inner.describe_index(name).await
        }

        async fn create_index(&self, spec: &IndexSpec) -> Result<()> {
            self.inner.create_index(spec).await
        }

        async fn delete_index(&self, name: &str) -> Result<()> {
            self.inner.delete_index(name).await
        }

        async fn upsert(
            &self,
            index: &str,
            records: &[IndexRecord],
        ) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call == self.fail_on {
                return Err(Error::Index("rate limited".into()));
            }
            self.inner.upsert(index, records).await
        }

        async fn query(
            &self,
            index: &str,
            request: &QueryRequest,
        ) -> Result<Vec<QueryMatch>> {
            self.inner.query(index, request).await
        }
    }

    #[tokio::test]
    async fn single_batch_uses_positional_ids() {
        let index = memory_index().await;
        let report = sync(
            &index,
            "docs",
            &chunks(5),
            &vectors(5),
            100,
            IdScheme::Positional,
        )
        .await
        .unwrap();

        assert_eq!(
            report,
            SyncReport {
                records: 5,
                batches: 1
            }
        );
        assert_eq!(
            index.record_ids("docs"),
            vec![
                "batch0-chunk0",
                "batch0-chunk1",
                "batch0-chunk2",
                "batch0-chunk3",
                "batch0-chunk4",
            ]
        );
    }

    #[tokio::test]
    async fn ids_restart_per_batch() {
        let index = memory_index().await;
        let report = sync(
            &index,
            "docs",
            &chunks(5),
            &vectors(5),
            2,
            IdScheme::Positional,
        )
        .await
        .unwrap();

        assert_eq!(report.batches, 3);
        assert_eq!(
            index.record_ids("docs"),
            vec![
                "batch0-chunk0",
                "batch0-chunk1",
                "batch2-chunk0",
                "batch2-chunk1",
                "batch4-chunk0",
            ]
        );
    }

    #[tokio::test]
    async fn resync_does_not_grow_index() {
        let index = memory_index().await;
        for scheme in [IdScheme::Positional, IdScheme::ContentHash] {
            let index_name = "docs";
            sync(&index, index_name, &chunks(4), &vectors(4), 3, scheme)
                .await
                .unwrap();
            let first = index.record_ids(index_name);
            sync(&index, index_name, &chunks(4), &vectors(4), 3, scheme)
                .await
                .unwrap();
            assert_eq!(index.record_ids(index_name), first);
        }
        assert_eq!(index.record_count("docs"), Some(8));
    }

    #[tokio::test]
    async fn metadata_carries_source_location_and_text() {
        let index = memory_index().await;
        sync(
            &index,
            "docs",
            &chunks(1),
            &vectors(1),
            10,
            IdScheme::Positional,
        )
        .await
        .unwrap();

        let hits = index
            .query(
                "docs",
                &QueryRequest {
                    vector: vec![0.0, 1.0],
                    top_k: 1,
                    include_values: true,
                    include_metadata: true,
                },
            )
            .await
            .unwrap();
        let metadata = hits[0].metadata.as_ref().unwrap();
        assert_eq!(metadata.source, "Page: 1");
        assert_eq!(metadata.text, "passage 0");
        let loc: ChunkLocation = serde_json::from_str(&metadata.loc).unwrap();
        assert_eq!(loc.page, 1);
        assert_eq!(loc.end, 9);
    }

    #[tokio::test]
    async fn count_mismatch_is_rejected_before_any_upsert() {
        let index = memory_index().await;
        let err = sync(
            &index,
            "docs",
            &chunks(3),
            &vectors(2),
            100,
            IdScheme::Positional,
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            Error::CountMismatch {
                chunks: 3,
                embeddings: 2
            }
        ));
        assert_eq!(index.record_count("docs"), Some(0));
    }

    #[tokio::test]
    async fn zero_batch_size_is_rejected() {
        let index = memory_index().await;
        let result = sync(
            &index,
            "docs",
            &chunks(1),
            &vectors(1),
            0,
            IdScheme::Positional,
        )
        .await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn failed_batch_stops_the_run_and_keeps_earlier_batches() {
        let index = FailingUpsert {
            inner: memory_index().await,
            fail_on: 2,
            calls: AtomicUsize::new(0),
        };

        let err = sync(
            &index,
            "docs",
            &chunks(6),
            &vectors(6),
            2,
            IdScheme::Positional,
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            Error::Sync {
                batch: 2,
                total: 3,
                committed: 1,
                ..
            }
        ));
        assert_eq!(index.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            index.inner.record_ids("docs"),
            vec!["batch0-chunk0", "batch0-chunk1"]
        );
    }

    #[test]
    fn content_hash_ids_follow_text() {
        let mut a = chunks(1).remove(0);
        let id = IdScheme::ContentHash.record_id(0, 0, &a);
        assert_eq!(id.len(), "chunk-0-".len() + 16);

        a.text.push('!');
        assert_ne!(IdScheme::ContentHash.record_id(0, 0, &a), id);
    }
}
