//! Source fetching into the shared download cache
//!
//! A fetch is keyed by (source, region). With a complete cache entry and no
//! forced refresh it performs no network I/O at all. New downloads are
//! staged, unpacked, checked for every expected file and only then
//! committed, so a failed fetch never damages a good entry.

pub mod sources;
pub mod transport;

pub use sources::{StateCoverage, TransportKind};
pub use transport::{HttpTransport, Transport, UnzipCli, Unpacker};

use crate::cache::{CacheEntry, CacheKey, DownloadCache, Staging};
use crate::error::{BasinError, BasinResult};
use chrono::Utc;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One remote file belonging to a source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub url: String,
    /// Extract after download and discard the archive
    pub unpack: bool,
}

impl RemoteFile {
    pub fn plain(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            unpack: false,
        }
    }

    pub fn archive(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            unpack: true,
        }
    }
}

/// Everything needed to populate one cache entry
#[derive(Debug, Clone)]
pub struct SourceRequest {
    pub key: CacheKey,
    pub files: Vec<RemoteFile>,
    /// Paths, relative to the entry, that must exist after unpacking
    pub expected: Vec<PathBuf>,
}

/// Outcome of a successful fetch
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    pub key: CacheKey,
    /// Absolute paths of the expected files
    pub paths: Vec<PathBuf>,
    pub origin_urls: Vec<String>,
    /// True when served from the cache without network I/O
    pub cached: bool,
}

/// Retry policy for transient network failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

/// Fetches sources into a [`DownloadCache`]
#[derive(Clone)]
pub struct SourceFetcher {
    cache: DownloadCache,
    transport: Arc<dyn Transport>,
    unpacker: Arc<dyn Unpacker>,
    retry: RetryPolicy,
}

impl SourceFetcher {
    pub fn new(
        cache: DownloadCache,
        transport: Arc<dyn Transport>,
        unpacker: Arc<dyn Unpacker>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            cache,
            transport,
            unpacker,
            retry,
        }
    }

    pub fn cache(&self) -> &DownloadCache {
        &self.cache
    }

    /// Fetch one source, reusing a complete cache entry unless forced
    pub async fn fetch(&self, request: &SourceRequest, force: bool) -> BasinResult<FetchResult> {
        if !force {
            if let Some(entry) = self.cache.lookup(&request.key).await? {
                debug!("Using cached {}", request.key);
                let dir = self.cache.entry_dir(&request.key);
                return Ok(FetchResult {
                    key: request.key.clone(),
                    paths: entry.files.iter().map(|f| dir.join(f)).collect(),
                    origin_urls: entry.origin_urls,
                    cached: true,
                });
            }
        }

        info!(source = %request.key.source, region = %request.key.region, "Downloading");
        let staging = self.cache.begin(&request.key).await?;
        match self.populate(request, &staging).await {
            Ok(origin_urls) => {
                let entry = CacheEntry {
                    key: request.key.clone(),
                    files: request.expected.clone(),
                    origin_urls: origin_urls.clone(),
                    fetched_at: Utc::now(),
                };
                let dir = self.cache.commit(staging, &entry).await?;
                Ok(FetchResult {
                    key: request.key.clone(),
                    paths: request.expected.iter().map(|f| dir.join(f)).collect(),
                    origin_urls,
                    cached: false,
                })
            }
            Err(e) => {
                self.cache.abandon(staging).await;
                Err(e)
            }
        }
    }

    /// Download, unpack and verify into the staging directory
    async fn populate(&self, request: &SourceRequest, staging: &Staging) -> BasinResult<Vec<String>> {
        let mut origin_urls = Vec::with_capacity(request.files.len());

        for file in &request.files {
            let name = file.url.rsplit('/').next().unwrap_or("download");
            let dest = staging.dir.join(name);
            self.download_with_retry(&file.url, &dest).await?;

            if file.unpack {
                self.unpacker.unpack(&dest, &staging.dir).await?;
                let _ = tokio::fs::remove_file(&dest).await;
            }
            origin_urls.push(file.url.clone());
        }

        if let Some(missing) = request
            .expected
            .iter()
            .find(|rel| !staging.dir.join(rel).exists())
        {
            return Err(BasinError::SourceIncomplete {
                source_key: request.key.source.clone(),
                region: request.key.region.clone(),
                missing: missing.display().to_string(),
            });
        }

        Ok(origin_urls)
    }

    async fn download_with_retry(&self, url: &str, dest: &Path) -> BasinResult<()> {
        let mut attempt = 0;
        loop {
            match self.transport.download(url, dest).await {
                Ok(bytes) => {
                    debug!("Downloaded {} ({} bytes)", url, bytes);
                    return Ok(());
                }
                Err(e) if e.is_retryable() && attempt < self.retry.retries => {
                    let delay = self.retry.backoff * 2u32.saturating_pow(attempt);
                    warn!("Download of {} failed ({}), retrying in {:?}", url, e, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Fetch many independent sources on a bounded worker pool
    ///
    /// Every request gets an outcome; one failure does not stop the others.
    /// Requests not yet started when `cancel` fires report `Cancelled`.
    /// Results are ordered by cache key, not completion order.
    pub async fn fetch_all(
        &self,
        requests: Vec<SourceRequest>,
        force: bool,
        workers: usize,
        cancel: &CancellationToken,
    ) -> Vec<(CacheKey, BasinResult<FetchResult>)> {
        let limiter = Arc::new(Semaphore::new(workers.max(1)));
        let mut tasks = JoinSet::new();
        let mut pending: HashSet<CacheKey> = HashSet::with_capacity(requests.len());

        for request in requests {
            pending.insert(request.key.clone());
            let fetcher = self.clone();
            let limiter = limiter.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let key = request.key.clone();
                let _permit = match limiter.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (key, Err(BasinError::Cancelled)),
                };
                if cancel.is_cancelled() {
                    return (key, Err(BasinError::Cancelled));
                }
                let result = fetcher.fetch(&request, force).await;
                (key, result)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    pending.remove(&outcome.0);
                    results.push(outcome);
                }
                Err(e) => warn!("Fetch task failed to complete: {}", e),
            }
        }
        // Tasks that panicked or were aborted never returned their key
        for key in pending {
            let reason = format!("fetch of {}/{} did not complete", key.source, key.region);
            results.push((key, Err(BasinError::Internal(reason))));
        }
        results.sort_by(|a, b| (&a.0.source, &a.0.region).cmp(&(&b.0.source, &b.0.region)));
        results
    }
}
