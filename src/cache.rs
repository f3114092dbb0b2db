use std::path::{Path, PathBuf};

use redb::{
    Database,
    ReadableDatabase,
    ReadableTableMetadata,
    TableDefinition,
};

use crate::{
    chunking::Chunk,
    embedder::EmbeddingProvider,
    error::{Error, Result},
};

const EMBEDDINGS: TableDefinition<u64, &[u8]> =
    TableDefinition::new("embeddings");
const META: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");

const COUNT_KEY: &str = "count";
const FINGERPRINT_KEY: &str = "fingerprint";

/// Header size: 4 bytes vector dimension.
const HEADER_SIZE: usize = 4;

/// How much a cache file has to prove before it is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheValidation {
    /// Any existing file is reused as-is.
    Existence,
    /// The file is reused only if it was computed from the same chunk texts.
    #[default]
    Fingerprint,
}

/// Embeddings handed back by [`EmbeddingCache::ensure`].
#[derive(Debug, Clone, PartialEq)]
pub struct CachedEmbeddings {
    /// One vector per chunk, in chunk order.
    pub vectors: Vec<Vec<f32>>,
    /// `true` if the provider was called during this run.
    pub computed: bool,
}

/// Contents of a cache file.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEmbeddings {
    pub vectors: Vec<Vec<f32>>,
    pub fingerprint: Option<String>,
}

/// Hash of the ordered chunk texts, hex encoded.
///
/// # Examples
///
/// ```
/// use docrag::cache::fingerprint;
///
/// assert_eq!(fingerprint(["a", "b"]), fingerprint(["a", "b"]));
/// assert_ne!(fingerprint(["a", "b"]), fingerprint(["ab"]));
/// ```
pub fn fingerprint<'a>(texts: impl IntoIterator<Item = &'a str>) -> String {
    let mut hasher = blake3::Hasher::new();
    for text in texts {
        hasher.update(&(text.len() as u64).to_le_bytes());
        hasher.update(text.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

fn chunk_fingerprint(chunks: &[Chunk]) -> String {
    fingerprint(chunks.iter().map(|c| c.text.as_str()))
}

/// Local store for the corpus embeddings, one file on disk.
///
/// The file is a redb database with two tables:
/// - `embeddings`: position (u64) -> 4-byte dimension D (u32 LE) followed
///   by D f32 values in native byte order
/// - `meta`: `count` (u64 LE) and `fingerprint` (hex string)
///
/// Writes go to a temporary sibling that is renamed into place, so a file
/// at the cache path is always complete.
#[derive(Debug, Clone)]
pub struct EmbeddingCache {
    path: PathBuf,
    validation: CacheValidation,
}

impl EmbeddingCache {
    pub fn new(path: impl Into<PathBuf>, validation: CacheValidation) -> Self {
        Self {
            path: path.into(),
            validation,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Return embeddings for `chunks`, calling `provider` only when the
    /// cache cannot be reused.
    ///
    /// The provider gets every chunk text in a single call. Nothing is
    /// written unless that call succeeds.
    pub async fn ensure<P: EmbeddingProvider>(
        &self,
        chunks: &[Chunk],
        provider: &P,
    ) -> Result<CachedEmbeddings> {
        let current = chunk_fingerprint(chunks);

        if self.exists() {
            match self.reusable(&current, chunks.len())? {
                Some(vectors) => {
                    tracing::info!(
                        path = %self.path.display(),
                        embeddings = vectors.len(),
                        "embeddings file already exists, skipping computation"
                    );
                    return Ok(CachedEmbeddings {
                        vectors,
                        computed: false,
                    });
                }
                None => tracing::warn!(
                    path = %self.path.display(),
                    "embeddings file does not match current chunks, recomputing"
                ),
            }
        } else {
            tracing::info!(
                path = %self.path.display(),
                "no local embeddings file, creating embeddings"
            );
        }

        let texts: Vec<String> =
            chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = provider.embed_many(&texts).await?;
        if vectors.len() != chunks.len() {
            return Err(Error::Embedding(format!(
                "provider returned {} embeddings for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }
        tracing::info!(embeddings = vectors.len(), "embeddings created");

        self.store(&vectors, &current)?;
        tracing::info!(path = %self.path.display(), "embeddings saved");

        Ok(CachedEmbeddings {
            vectors,
            computed: true,
        })
    }

    /// Load the cached vectors if the validation policy accepts them.
    fn reusable(
        &self,
        current: &str,
        chunk_count: usize,
    ) -> Result<Option<Vec<Vec<f32>>>> {
        match self.validation {
            CacheValidation::Existence => Ok(Some(self.load()?.vectors)),
            CacheValidation::Fingerprint => match self.load() {
                Ok(stored)
                    if stored.fingerprint.as_deref() == Some(current)
                        && stored.vectors.len() == chunk_count =>
                {
                    Ok(Some(stored.vectors))
                }
                Ok(_) => Ok(None),
                Err(e) => {
                    tracing::warn!(error = %e, "unreadable embeddings file");
                    Ok(None)
                }
            },
        }
    }

    /// Read every vector from the cache file.
    pub fn load(&self) -> Result<StoredEmbeddings> {
        let db = Database::open(&self.path)?;
        let txn = db.begin_read()?;
        let meta = txn.open_table(META)?;
        let table = txn.open_table(EMBEDDINGS)?;

        let count = match meta.get(COUNT_KEY)? {
            Some(guard) => decode_count(guard.value())
                .ok_or_else(|| self.corrupt("malformed entry count"))?,
            None => return Err(self.corrupt("missing entry count")),
        };
        let fingerprint = meta
            .get(FINGERPRINT_KEY)?
            .and_then(|guard| String::from_utf8(guard.value().to_vec()).ok());

        let entries = table.len()?;
        if count != entries {
            return Err(self.corrupt(&format!(
                "entry count {count} disagrees with {entries} stored entries"
            )));
        }

        let mut vectors = Vec::new();
        for position in 0..count {
            let guard = table
                .get(position)?
                .ok_or_else(|| {
                    self.corrupt(&format!("missing entry {position}"))
                })?;
            let vector = decode_vector(guard.value()).ok_or_else(|| {
                self.corrupt(&format!("malformed entry {position}"))
            })?;
            vectors.push(vector);
        }

        Ok(StoredEmbeddings {
            vectors,
            fingerprint,
        })
    }

    /// Replace the cache file with `vectors`.
    pub fn store(&self, vectors: &[Vec<f32>], fingerprint: &str) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let staging = self.staging_path();
        if staging.exists() {
            std::fs::remove_file(&staging)?;
        }

        {
            let db = Database::create(&staging)?;
            let txn = db.begin_write()?;
            {
                let mut table = txn.open_table(EMBEDDINGS)?;
                for (position, vector) in vectors.iter().enumerate() {
                    let byte_len =
                        HEADER_SIZE + std::mem::size_of_val(vector.as_slice());
                    let mut guard =
                        table.insert_reserve(position as u64, byte_len)?;
                    let dest = guard.as_mut();
                    dest[..HEADER_SIZE]
                        .copy_from_slice(&(vector.len() as u32).to_le_bytes());
                    dest[HEADER_SIZE..]
                        .copy_from_slice(bytemuck::cast_slice(vector));
                }

                let mut meta = txn.open_table(META)?;
                meta.insert(
                    COUNT_KEY,
                    (vectors.len() as u64).to_le_bytes().as_slice(),
                )?;
                meta.insert(FINGERPRINT_KEY, fingerprint.as_bytes())?;
            }
            txn.commit()?;
        }

        std::fs::rename(&staging, &self.path)?;
        Ok(())
    }

    /// Delete the cache file. Returns `false` if there was none.
    pub fn remove(&self) -> Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn corrupt(&self, reason: &str) -> Error {
        Error::Cache {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }
}

fn decode_count(bytes: &[u8]) -> Option<u64> {
    Some(u64::from_le_bytes(bytes.try_into().ok()?))
}

fn decode_vector(bytes: &[u8]) -> Option<Vec<f32>> {
    let header: [u8; HEADER_SIZE] = bytes.get(..HEADER_SIZE)?.try_into().ok()?;
    let dimension = u32::from_le_bytes(header) as usize;
    let body = &bytes[HEADER_SIZE..];
    if body.len() != dimension * std::mem::size_of::<f32>() {
        return None;
    }

    // Copy into an f32 buffer; the stored bytes carry no alignment guarantee.
    let mut vector = vec![0.0f32; dimension];
    bytemuck::cast_slice_mut::<f32, u8>(&mut vector).copy_from_slice(body);
    Some(vector)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::chunking::ChunkLocation;

    struct CountingEmbedder {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingEmbedder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl EmbeddingProvider for CountingEmbedder {
        async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::Embedding("provider unavailable".into()));
            }
            Ok(texts
                .iter()
                .map(|t| vec![t.len() as f32, 1.0, -0.5])
                .collect())
        }

        async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
            Ok(vec![text.len() as f32, 1.0, -0.5])
        }
    }

    fn chunks(texts: &[&str]) -> Vec<Chunk> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| Chunk {
                text: t.to_string(),
                source_ref: "Page: 1".into(),
                index: i,
                location: ChunkLocation {
                    page: 1,
                    start: 0,
                    end: t.len(),
                },
            })
            .collect()
    }

    fn cache_in(
        dir: &tempfile::TempDir,
        validation: CacheValidation,
    ) -> EmbeddingCache {
        EmbeddingCache::new(
            dir.path().join("embeddings").join("gg9.redb"),
            validation,
        )
    }

    /// Overwrite the stored entry count without touching the entries.
    fn write_count(cache: &EmbeddingCache, count: u64) {
        let db = Database::create(cache.path()).unwrap();
        let txn = db.begin_write().unwrap();
        {
            let mut meta = txn.open_table(META).unwrap();
            meta.insert(COUNT_KEY, count.to_le_bytes().as_slice())
                .unwrap();
        }
        txn.commit().unwrap();
    }

    #[tokio::test]
    async fn second_call_loads_instead_of_computing() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = cache_in(&tmp, CacheValidation::Fingerprint);
        let provider = CountingEmbedder::new();
        let input = chunks(&["alpha", "beta", "gamma"]);

        let first = cache.ensure(&input, &provider).await.unwrap();
        let second = cache.ensure(&input, &provider).await.unwrap();

        assert_eq!(provider.calls(), 1);
        assert!(first.computed);
        assert!(!second.computed);
        assert_eq!(first.vectors, second.vectors);
        assert_eq!(second.vectors.len(), 3);
    }

    #[tokio::test]
    async fn creates_parent_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = cache_in(&tmp, CacheValidation::Fingerprint);
        cache
            .ensure(&chunks(&["alpha"]), &CountingEmbedder::new())
            .await
            .unwrap();
        assert!(cache.exists());
        assert!(!cache.staging_path().exists());
    }

    #[tokio::test]
    async fn existence_policy_trusts_stale_file() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = cache_in(&tmp, CacheValidation::Existence);
        let provider = CountingEmbedder::new();

        cache.ensure(&chunks(&["alpha", "beta"]), &provider).await.unwrap();
        let reused = cache
            .ensure(&chunks(&["something", "else", "entirely"]), &provider)
            .await
            .unwrap();

        assert_eq!(provider.calls(), 1);
        assert!(!reused.computed);
        assert_eq!(reused.vectors.len(), 2);
    }

    #[tokio::test]
    async fn fingerprint_policy_recomputes_stale_file() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = cache_in(&tmp, CacheValidation::Fingerprint);
        let provider = CountingEmbedder::new();

        cache.ensure(&chunks(&["alpha", "beta"]), &provider).await.unwrap();
        let fresh = cache
            .ensure(&chunks(&["alpha", "beta", "gamma"]), &provider)
            .await
            .unwrap();

        assert_eq!(provider.calls(), 2);
        assert!(fresh.computed);
        assert_eq!(cache.load().unwrap().vectors.len(), 3);
    }

    #[tokio::test]
    async fn provider_failure_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = cache_in(&tmp, CacheValidation::Fingerprint);

        let err = cache
            .ensure(&chunks(&["alpha"]), &CountingEmbedder::failing())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Embedding(_)));
        assert!(!cache.exists());
    }

    #[test]
    fn store_and_load_roundtrip_with_fingerprint() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = cache_in(&tmp, CacheValidation::Fingerprint);
        let vectors = vec![vec![0.25, -1.0], vec![3.5, 0.0]];

        cache.store(&vectors, "abc123").unwrap();
        let stored = cache.load().unwrap();

        assert_eq!(stored.vectors, vectors);
        assert_eq!(stored.fingerprint.as_deref(), Some("abc123"));
    }

    #[test]
    fn store_overwrites_previous_file() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = cache_in(&tmp, CacheValidation::Fingerprint);

        cache.store(&[vec![1.0], vec![2.0], vec![3.0]], "one").unwrap();
        cache.store(&[vec![9.0]], "two").unwrap();

        let stored = cache.load().unwrap();
        assert_eq!(stored.vectors, vec![vec![9.0]]);
        assert_eq!(stored.fingerprint.as_deref(), Some("two"));
    }

    #[test]
    fn inflated_count_is_reported_as_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = cache_in(&tmp, CacheValidation::Existence);
        cache.store(&[vec![1.0], vec![2.0]], "x").unwrap();

        write_count(&cache, u64::MAX);
        assert!(matches!(cache.load(), Err(Error::Cache { .. })));

        write_count(&cache, 3);
        assert!(matches!(cache.load(), Err(Error::Cache { .. })));
    }

    #[tokio::test]
    async fn corrupt_count_triggers_recompute() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = cache_in(&tmp, CacheValidation::Fingerprint);
        let provider = CountingEmbedder::new();
        let input = chunks(&["alpha", "beta"]);

        cache.ensure(&input, &provider).await.unwrap();
        write_count(&cache, u64::MAX);
        let again = cache.ensure(&input, &provider).await.unwrap();

        assert!(again.computed);
        assert_eq!(provider.calls(), 2);
        assert_eq!(cache.load().unwrap().vectors.len(), 2);
    }

    #[test]
    fn remove_reports_presence() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = cache_in(&tmp, CacheValidation::Fingerprint);

        assert!(!cache.remove().unwrap());
        cache.store(&[vec![1.0]], "x").unwrap();
        assert!(cache.remove().unwrap());
        assert!(!cache.exists());
    }

    #[test]
    fn decode_rejects_truncated_entries() {
        assert!(decode_vector(&[1, 0]).is_none());
        let mut bytes = 2u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(bytemuck::cast_slice(&[1.0f32]));
        assert!(decode_vector(&bytes).is_none());
    }

    #[test]
    fn fingerprint_depends_on_order() {
        assert_ne!(fingerprint(["a", "b"]), fingerprint(["b", "a"]));
    }
}
