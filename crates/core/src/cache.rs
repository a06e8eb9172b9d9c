use crate::config::DEFAULT_CACHE_FILE_NAME;
use crate::index::IndexBundle;
use crate::models::{IngestionOptions, KeywordOptions};
use crate::traits::{DocumentSource, Embedder};
use crate::{IngestError, SearchError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, PoisonError, Weak};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

const CACHE_FORMAT_VERSION: u32 = 1;

type FolderLocks = std::sync::Mutex<HashMap<PathBuf, Weak<Mutex<()>>>>;

/// Build locks shared by every `IndexCache` in the process, keyed by
/// canonical folder path. Entries die with their last holder.
static FOLDER_LOCKS: OnceLock<FolderLocks> = OnceLock::new();

fn folder_lock(key: &Path) -> Arc<Mutex<()>> {
    let mut locks = FOLDER_LOCKS
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(PoisonError::into_inner);

    if let Some(lock) = locks.get(key).and_then(Weak::upgrade) {
        return lock;
    }

    locks.retain(|_, lock| lock.strong_count() > 0);
    let lock = Arc::new(Mutex::new(()));
    locks.insert(key.to_path_buf(), Arc::downgrade(&lock));
    lock
}

#[cfg(test)]
fn folder_lock_is_held(key: &Path) -> bool {
    FOLDER_LOCKS
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(key)
        .is_some_and(|lock| lock.strong_count() > 0)
}

#[derive(Debug, Clone)]
pub struct CacheOptions {
    pub cache_file_name: String,
    pub ingestion: IngestionOptions,
    pub keywords: KeywordOptions,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            cache_file_name: DEFAULT_CACHE_FILE_NAME.to_string(),
            ingestion: IngestionOptions::default(),
            keywords: KeywordOptions::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheArtifact<I> {
    format_version: u32,
    folder: String,
    built_at: DateTime<Utc>,
    embedder: String,
    index: I,
}

/// Builds each folder's indices once and persists them next to the
/// documents. There is no freshness check: a cached folder keeps its
/// index until `invalidate` removes the artifact.
///
/// Builds are serialized per folder across all caches in the process, so
/// two caches over the same folder build it once and the second loads the
/// artifact.
pub struct IndexCache {
    source: Arc<dyn DocumentSource>,
    embedder: Arc<dyn Embedder>,
    options: CacheOptions,
    loaded: RwLock<HashMap<PathBuf, Arc<IndexBundle>>>,
}

impl IndexCache {
    pub fn new(
        source: Arc<dyn DocumentSource>,
        embedder: Arc<dyn Embedder>,
        options: CacheOptions,
    ) -> Self {
        Self {
            source,
            embedder,
            options,
            loaded: RwLock::new(HashMap::new()),
        }
    }

    pub fn embedder(&self) -> Arc<dyn Embedder> {
        Arc::clone(&self.embedder)
    }

    pub fn artifact_path(&self, folder: &Path) -> PathBuf {
        folder.join(&self.options.cache_file_name)
    }

    async fn cache_key(folder: &Path) -> PathBuf {
        tokio::fs::canonicalize(folder)
            .await
            .unwrap_or_else(|_| folder.to_path_buf())
    }

    async fn memoized(&self, key: &Path) -> Option<Arc<IndexBundle>> {
        self.loaded.read().await.get(key).cloned()
    }

    /// Returns the folder's index, loading the artifact or building it
    /// when absent. At most one caller builds a given folder at a time.
    pub async fn load_or_build(&self, folder: &Path) -> Result<Arc<IndexBundle>, SearchError> {
        let key = Self::cache_key(folder).await;
        if let Some(bundle) = self.memoized(&key).await {
            debug!(folder = %folder.display(), "index cache hit (memory)");
            return Ok(bundle);
        }

        let lock = folder_lock(&key);
        let _guard = lock.lock().await;

        if let Some(bundle) = self.memoized(&key).await {
            debug!(folder = %folder.display(), "index cache hit after wait");
            return Ok(bundle);
        }

        let artifact_path = self.artifact_path(folder);
        let exists = tokio::fs::try_exists(&artifact_path)
            .await
            .map_err(IngestError::Io)?;

        let bundle = if exists {
            info!(artifact = %artifact_path.display(), "loading cached index");
            self.read_artifact(&artifact_path).await?
        } else {
            info!(folder = %folder.display(), "building index");
            let bundle = self.build(folder).await?;
            self.write_artifact(&artifact_path, folder, &bundle).await?;
            info!(
                folder = %folder.display(),
                nodes = bundle.documents.len(),
                keywords = bundle.keyword.len(),
                "index built"
            );
            bundle
        };

        let bundle = Arc::new(bundle);
        self.loaded.write().await.insert(key, Arc::clone(&bundle));
        Ok(bundle)
    }

    /// The folder's index if it has already been loaded by this cache.
    pub async fn cached(&self, folder: &Path) -> Result<Arc<IndexBundle>, SearchError> {
        self.memoized(&Self::cache_key(folder).await)
            .await
            .ok_or_else(|| SearchError::NotInitialized(folder.display().to_string()))
    }

    /// Drops the in-memory index and deletes the artifact. Returns whether
    /// an artifact was removed.
    pub async fn invalidate(&self, folder: &Path) -> Result<bool, SearchError> {
        let key = Self::cache_key(folder).await;
        let lock = folder_lock(&key);
        let _guard = lock.lock().await;

        self.loaded.write().await.remove(&key);

        let artifact_path = self.artifact_path(folder);
        match tokio::fs::remove_file(&artifact_path).await {
            Ok(()) => {
                info!(artifact = %artifact_path.display(), "index cache invalidated");
                Ok(true)
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(error) => Err(IngestError::Io(error).into()),
        }
    }

    async fn build(&self, folder: &Path) -> Result<IndexBundle, IngestError> {
        let source = Arc::clone(&self.source);
        let owned = folder.to_path_buf();
        let documents = tokio::task::spawn_blocking(move || source.load(&owned)).await??;
        IndexBundle::build(
            &documents,
            &self.options.ingestion,
            self.options.keywords,
            self.embedder.as_ref(),
        )
        .await
    }

    async fn read_artifact(&self, path: &Path) -> Result<IndexBundle, IngestError> {
        let bytes = tokio::fs::read(path).await?;
        let artifact: CacheArtifact<IndexBundle> = serde_json::from_slice(&bytes)?;

        if artifact.format_version != CACHE_FORMAT_VERSION {
            return Err(IngestError::InvalidArgument(format!(
                "cache artifact {} has format version {}, expected {}",
                path.display(),
                artifact.format_version,
                CACHE_FORMAT_VERSION
            )));
        }

        let embedder = self.embedder.name();
        if artifact.embedder != embedder {
            return Err(IngestError::InvalidArgument(format!(
                "cache artifact {} was built with {} but the current embedder is {}",
                path.display(),
                artifact.embedder,
                embedder
            )));
        }

        Ok(artifact.index)
    }

    async fn write_artifact(
        &self,
        path: &Path,
        folder: &Path,
        bundle: &IndexBundle,
    ) -> Result<(), IngestError> {
        let artifact = CacheArtifact {
            format_version: CACHE_FORMAT_VERSION,
            folder: folder.display().to_string(),
            built_at: Utc::now(),
            embedder: self.embedder.name(),
            index: bundle,
        };
        let bytes = serde_json::to_vec(&artifact)?;

        let staging = path.with_file_name(format!(
            "{}.{}.tmp",
            self.options.cache_file_name,
            Uuid::new_v4().simple()
        ));
        if let Err(error) = tokio::fs::write(&staging, &bytes).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(error.into());
        }
        if let Err(error) = tokio::fs::rename(&staging, path).await {
            warn!(staging = %staging.display(), %error, "failed to move cache artifact into place");
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(error.into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingEmbedder;
    use crate::ingest::FolderSource;
    use crate::models::SourceDocument;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};
    use tempfile::tempdir;

    struct CountingSource {
        inner: FolderSource,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl CountingSource {
        fn new() -> Arc<Self> {
            Self::slow(Duration::ZERO)
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                inner: FolderSource::default().excluding(DEFAULT_CACHE_FILE_NAME),
                calls: AtomicUsize::new(0),
                delay,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl DocumentSource for CountingSource {
        fn load(&self, folder: &Path) -> Result<Vec<SourceDocument>, IngestError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            self.inner.load(folder)
        }
    }

    fn cache_with(source: Arc<CountingSource>) -> IndexCache {
        IndexCache::new(
            source,
            Arc::new(HashingEmbedder::default()),
            CacheOptions::default(),
        )
    }

    fn write_corpus(folder: &Path) -> std::io::Result<()> {
        fs::write(
            folder.join("a.txt"),
            "URL: https://example.com/sintra\n\nPena Palace tickets sell out early in summer.",
        )?;
        fs::write(
            folder.join("b.txt"),
            "URL: https://example.com/cascais\n\nCascais beaches are a short train ride away.",
        )
    }

    #[tokio::test]
    async fn second_access_does_not_reload_documents() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        write_corpus(dir.path())?;
        let source = CountingSource::new();
        let cache = cache_with(source.clone());

        let first = cache.load_or_build(dir.path()).await?;
        let second = cache.load_or_build(dir.path()).await?;

        assert_eq!(source.calls(), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(cache.artifact_path(dir.path()).exists());
        Ok(())
    }

    #[tokio::test]
    async fn artifact_is_reused_by_a_fresh_cache() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        write_corpus(dir.path())?;

        let built = cache_with(CountingSource::new()).load_or_build(dir.path()).await?;

        let source = CountingSource::new();
        let loaded = cache_with(source.clone()).load_or_build(dir.path()).await?;

        assert_eq!(source.calls(), 0);
        assert_eq!(loaded.documents.len(), built.documents.len());
        Ok(())
    }

    #[tokio::test]
    async fn changed_documents_do_not_invalidate_the_artifact() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        write_corpus(dir.path())?;
        let built = cache_with(CountingSource::new()).load_or_build(dir.path()).await?;

        fs::write(dir.path().join("c.txt"), "Brand new page about Porto wine cellars.")?;
        let source = CountingSource::new();
        let loaded = cache_with(source.clone()).load_or_build(dir.path()).await?;

        assert_eq!(source.calls(), 0);
        assert_eq!(loaded.documents.len(), built.documents.len());
        Ok(())
    }

    #[tokio::test]
    async fn invalidate_forces_a_rebuild() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        write_corpus(dir.path())?;
        let source = CountingSource::new();
        let cache = cache_with(source.clone());

        cache.load_or_build(dir.path()).await?;
        assert!(cache.invalidate(dir.path()).await?);
        assert!(!cache.artifact_path(dir.path()).exists());
        assert!(!cache.invalidate(dir.path()).await?);

        cache.load_or_build(dir.path()).await?;
        assert_eq!(source.calls(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn failed_build_writes_no_artifact() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let cache = cache_with(CountingSource::new());

        let error = cache.load_or_build(dir.path()).await.unwrap_err();

        assert!(matches!(error, SearchError::IndexBuild(IngestError::EmptyCorpus(_))));
        assert!(!cache.artifact_path(dir.path()).exists());
        assert_eq!(fs::read_dir(dir.path())?.count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn cached_before_load_is_not_initialized() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        write_corpus(dir.path())?;
        let cache = cache_with(CountingSource::new());

        assert!(matches!(
            cache.cached(dir.path()).await,
            Err(SearchError::NotInitialized(_))
        ));
        cache.load_or_build(dir.path()).await?;
        assert!(cache.cached(dir.path()).await.is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn artifact_from_another_embedder_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        write_corpus(dir.path())?;
        cache_with(CountingSource::new()).load_or_build(dir.path()).await?;

        let other = IndexCache::new(
            CountingSource::new(),
            Arc::new(HashingEmbedder { dimensions: 32 }),
            CacheOptions::default(),
        );
        let error = other.load_or_build(dir.path()).await.unwrap_err();
        assert!(matches!(error, SearchError::IndexBuild(IngestError::InvalidArgument(_))));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_one_build() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        write_corpus(dir.path())?;
        let source = CountingSource::new();
        let cache = Arc::new(cache_with(source.clone()));

        let tasks = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let folder = dir.path().to_path_buf();
                tokio::spawn(async move { cache.load_or_build(&folder).await.map(|_| ()) })
            })
            .collect::<Vec<_>>();

        for task in tasks {
            task.await??;
        }

        assert_eq!(source.calls(), 1);
        Ok(())
    }

    fn staging_files(folder: &Path) -> std::io::Result<Vec<String>> {
        Ok(fs::read_dir(folder)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.ends_with(".tmp"))
            .collect())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn separate_caches_build_a_folder_once() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        write_corpus(dir.path())?;
        let source = CountingSource::slow(Duration::from_millis(200));

        let tasks = (0..2)
            .map(|_| {
                let cache = cache_with(source.clone());
                let folder = dir.path().to_path_buf();
                tokio::spawn(async move {
                    cache
                        .load_or_build(&folder)
                        .await
                        .map(|bundle| bundle.documents.len())
                })
            })
            .collect::<Vec<_>>();

        let mut sizes = Vec::new();
        for task in tasks {
            sizes.push(task.await??);
        }

        assert_eq!(source.calls(), 1);
        assert_eq!(sizes[0], sizes[1]);
        assert!(staging_files(dir.path())?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn slow_document_load_leaves_the_runtime_free() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        write_corpus(dir.path())?;
        let cache = cache_with(CountingSource::slow(Duration::from_millis(300)));

        let started = Instant::now();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            started.elapsed()
        });

        cache.load_or_build(dir.path()).await?;
        let timer_elapsed = timer.await?;

        assert!(
            timer_elapsed < Duration::from_millis(200),
            "timer finished after {timer_elapsed:?}"
        );
        Ok(())
    }

    #[tokio::test]
    async fn folder_lock_is_released_after_build() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        write_corpus(dir.path())?;
        let cache = cache_with(CountingSource::new());

        cache.load_or_build(dir.path()).await?;
        cache.invalidate(dir.path()).await?;

        assert!(!folder_lock_is_held(&dir.path().canonicalize()?));
        Ok(())
    }
}
