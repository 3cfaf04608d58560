//! Directory-level upload and download over an `ObjectStore`
//!
//! Each call lists or walks its objects, then transfers them on a bounded
//! pool of scoped worker threads. Transient store failures are retried with
//! exponential backoff; the first permanent failure stops the remaining
//! workers and is returned to the caller. The call blocks until every worker
//! has exited.
//!
//! A failed download may leave files behind in `local_dir`. Callers that
//! publish the directory (the cache) must discard it on error.

use super::retry::RetryPolicy;
use super::state::{format_bytes, TransferState};
use super::store::{ObjectInfo, ObjectStore, RemoteLocation, StoreError};
use crate::config::schema::TransferConfig;
use crate::error::{LayerError, LayerResult};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Tuning for one transport
#[derive(Debug, Clone)]
pub struct TransferOptions {
    /// Maximum parallel object transfers per call
    pub workers: usize,
    /// Retry policy applied to every store request
    pub retry: RetryPolicy,
    /// Whole-call timeout
    pub timeout: Option<Duration>,
}

impl TransferOptions {
    pub fn from_config(config: &TransferConfig) -> Self {
        Self {
            workers: config.workers.max(1),
            retry: RetryPolicy::from_config(config),
            timeout: config.timeout(),
        }
    }
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self::from_config(&TransferConfig::default())
    }
}

/// Call-level deadline
struct Deadline {
    at: Option<Instant>,
    timeout: Option<Duration>,
}

impl Deadline {
    fn new(timeout: Option<Duration>) -> Self {
        Self {
            at: timeout.map(|t| Instant::now() + t),
            timeout,
        }
    }

    fn expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }

    fn check(&self, location: &RemoteLocation) -> LayerResult<()> {
        match self.timeout {
            Some(timeout) if self.expired() => Err(LayerError::transfer(
                location,
                format!("timed out after {}s", timeout.as_secs_f32()),
            )),
            _ => Ok(()),
        }
    }

    /// Error for adapters that stop streaming once the deadline has passed
    fn io_check(&self) -> io::Result<()> {
        if self.expired() {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "transfer deadline passed",
            ));
        }
        Ok(())
    }

    /// Sleep for `delay`, or until the deadline if that comes first
    fn sleep(&self, delay: Duration, location: &RemoteLocation) -> LayerResult<()> {
        let delay = match self.at {
            Some(at) => delay.min(at.saturating_duration_since(Instant::now())),
            None => delay,
        };
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        self.check(location)
    }
}

/// Reports bytes to a `TransferState`, never counting a byte twice
///
/// A retried object restarts from zero; only bytes past the best earlier
/// attempt (`reported`) are added, so the shared counter never runs ahead
/// of the real total and never decreases.
struct Progress<'a> {
    state: &'a TransferState,
    reported: &'a mut u64,
    current: u64,
    deadline: &'a Deadline,
}

impl<'a> Progress<'a> {
    fn new(state: &'a TransferState, reported: &'a mut u64, deadline: &'a Deadline) -> Self {
        Self {
            state,
            reported,
            current: 0,
            deadline,
        }
    }

    fn advance(&mut self, n: usize) {
        self.current += n as u64;
        if self.current > *self.reported {
            self.state.add_bytes(self.current - *self.reported);
            *self.reported = self.current;
        }
    }
}

struct ProgressWriter<'a, W: Write> {
    inner: W,
    hasher: Option<Sha256>,
    progress: Progress<'a>,
}

impl<W: Write> Write for ProgressWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.progress.deadline.io_check()?;
        let n = self.inner.write(buf)?;
        if let Some(ref mut hasher) = self.hasher {
            hasher.update(&buf[..n]);
        }
        self.progress.advance(n);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct ProgressReader<'a, R: Read> {
    inner: R,
    progress: Progress<'a>,
}

impl<R: Read> Read for ProgressReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.progress.deadline.io_check()?;
        let n = self.inner.read(buf)?;
        self.progress.advance(n);
        Ok(n)
    }
}

struct DownloadJob {
    object: ObjectInfo,
    path: PathBuf,
}

struct UploadJob {
    path: PathBuf,
    key: String,
    size: u64,
}

/// Join a `/`-separated relative key onto `base`, refusing anything that escapes it
fn safe_join(base: &Path, relative: &str) -> Option<PathBuf> {
    let rel = Path::new(relative);
    if relative.is_empty() || !rel.components().all(|c| matches!(c, Component::Normal(_))) {
        return None;
    }
    Some(base.join(rel))
}

/// Walk `dir` collecting upload jobs, keys relative to `base` with `/` separators
fn collect_files(
    dir: &Path,
    base: &Path,
    location: &RemoteLocation,
    out: &mut Vec<UploadJob>,
) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let metadata = fs::metadata(&path)?;
        if metadata.is_dir() {
            collect_files(&path, base, location, out)?;
        } else if metadata.is_file() {
            let rel = path
                .strip_prefix(base)
                .unwrap_or(&path)
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            out.push(UploadJob {
                key: location.key_for(&rel),
                path,
                size: metadata.len(),
            });
        }
    }
    Ok(())
}

/// Object storage transport
#[derive(Clone)]
pub struct Transport {
    store: Arc<dyn ObjectStore>,
    options: TransferOptions,
}

impl Transport {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self::with_options(store, TransferOptions::default())
    }

    pub fn with_options(store: Arc<dyn ObjectStore>, options: TransferOptions) -> Self {
        Self { store, options }
    }

    /// Download every object under `location` into `local_dir`
    ///
    /// Relative key structure is preserved. Fails if the prefix holds no
    /// objects or any object still fails after retries.
    pub fn download_dir(
        &self,
        location: &RemoteLocation,
        local_dir: &Path,
        state: &TransferState,
    ) -> LayerResult<()> {
        state.start();
        let result = self.download_inner(location, local_dir, state);
        match result {
            Ok(()) => state.complete(),
            Err(_) => state.fail(),
        }
        result
    }

    /// Upload every file under `local_dir` to `location`
    pub fn upload_dir(
        &self,
        local_dir: &Path,
        location: &RemoteLocation,
        state: &TransferState,
    ) -> LayerResult<()> {
        state.start();
        let result = self.upload_inner(local_dir, location, state);
        match result {
            Ok(()) => state.complete(),
            Err(_) => state.fail(),
        }
        result
    }

    fn download_inner(
        &self,
        location: &RemoteLocation,
        local_dir: &Path,
        state: &TransferState,
    ) -> LayerResult<()> {
        let deadline = Deadline::new(self.options.timeout);
        let objects = self.with_retry(location, "listing", &deadline, || {
            self.store.list(location)
        })?;

        let mut jobs = Vec::with_capacity(objects.len());
        for object in objects {
            // Directory placeholder objects carry no content
            let Some(rel) = location.relative_key(&object.key) else {
                continue;
            };
            if rel.ends_with('/') {
                continue;
            }
            let path = safe_join(local_dir, rel).ok_or_else(|| {
                LayerError::transfer(
                    location,
                    format!("object key {:?} escapes the target directory", object.key),
                )
            })?;
            jobs.push(DownloadJob { object, path });
        }

        if jobs.is_empty() {
            return Err(LayerError::transfer(location, "no objects found under prefix"));
        }

        let total: u64 = jobs.iter().map(|j| j.object.size).sum();
        state.set_total(total);
        info!(
            "Downloading {} objects ({}) from {}",
            jobs.len(),
            format_bytes(total),
            location
        );

        fs::create_dir_all(local_dir)
            .map_err(|e| LayerError::io(format!("creating {}", local_dir.display()), e))?;

        self.run_parallel(&jobs, |job| {
            self.download_one(location, job, state, &deadline)
        })?;
        deadline.check(location)?;

        debug!("Downloaded {} into {}", location, local_dir.display());
        Ok(())
    }

    fn download_one(
        &self,
        location: &RemoteLocation,
        job: &DownloadJob,
        state: &TransferState,
        deadline: &Deadline,
    ) -> LayerResult<()> {
        if let Some(parent) = job.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| LayerError::io(format!("creating {}", parent.display()), e))?;
        }

        let mut reported = 0u64;
        self.with_retry(location, &job.object.key, deadline, || {
            let file = File::create(&job.path)
                .map_err(|e| StoreError::io(format!("creating {}", job.path.display()), e))?;
            let mut writer = ProgressWriter {
                inner: BufWriter::new(file),
                hasher: job.object.sha256.as_ref().map(|_| Sha256::new()),
                progress: Progress::new(state, &mut reported, deadline),
            };

            self.store.get(location, &job.object.key, &mut writer)?;
            writer
                .flush()
                .map_err(|e| StoreError::io(format!("flushing {}", job.path.display()), e))?;

            if let (Some(expected), Some(hasher)) = (&job.object.sha256, writer.hasher.take()) {
                let actual = hex::encode(hasher.finalize());
                if !actual.eq_ignore_ascii_case(expected) {
                    return Err(StoreError::Checksum {
                        key: job.object.key.clone(),
                        expected: expected.clone(),
                        actual,
                    });
                }
            }
            Ok(())
        })
    }

    fn upload_inner(
        &self,
        local_dir: &Path,
        location: &RemoteLocation,
        state: &TransferState,
    ) -> LayerResult<()> {
        let deadline = Deadline::new(self.options.timeout);

        let mut jobs = Vec::new();
        collect_files(local_dir, local_dir, location, &mut jobs)
            .map_err(|e| LayerError::io(format!("walking {}", local_dir.display()), e))?;
        if jobs.is_empty() {
            return Err(LayerError::transfer(
                location,
                format!("nothing to upload in {}", local_dir.display()),
            ));
        }

        let total: u64 = jobs.iter().map(|j| j.size).sum();
        state.set_total(total);
        info!(
            "Uploading {} files ({}) to {}",
            jobs.len(),
            format_bytes(total),
            location
        );

        self.run_parallel(&jobs, |job| {
            let mut reported = 0u64;
            self.with_retry(location, &job.key, &deadline, || {
                let file = File::open(&job.path)
                    .map_err(|e| StoreError::io(format!("opening {}", job.path.display()), e))?;
                let mut reader = ProgressReader {
                    inner: file,
                    progress: Progress::new(state, &mut reported, &deadline),
                };
                self.store.put(location, &job.key, &mut reader, job.size)
            })
        })?;
        deadline.check(location)?;

        debug!("Uploaded {} to {}", local_dir.display(), location);
        Ok(())
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out
    fn with_retry<T>(
        &self,
        location: &RemoteLocation,
        what: &str,
        deadline: &Deadline,
        mut op: impl FnMut() -> Result<T, StoreError>,
    ) -> LayerResult<T> {
        let policy = &self.options.retry;
        let mut attempt: u32 = 0;
        loop {
            deadline.check(location)?;
            let result = op();
            // A slow attempt may finish after the deadline, successful or not
            deadline.check(location)?;
            match result {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt + 1 < policy.max_attempts => {
                    attempt += 1;
                    let delay = policy.delay_for_attempt(attempt);
                    warn!(
                        "{} failed ({}), retry {}/{} in {:?}",
                        what,
                        err,
                        attempt,
                        policy.max_attempts - 1,
                        delay
                    );
                    deadline.sleep(delay, location)?;
                }
                Err(err) => {
                    return Err(LayerError::transfer(
                        location,
                        format!("{what}: {err} (after {} attempts)", attempt + 1),
                    ))
                }
            }
        }
    }

    /// Run `work` over `jobs` on at most `options.workers` threads
    fn run_parallel<J, F>(&self, jobs: &[J], work: F) -> LayerResult<()>
    where
        J: Sync,
        F: Fn(&J) -> LayerResult<()> + Sync,
    {
        let workers = self.options.workers.clamp(1, jobs.len().max(1));
        let next = AtomicUsize::new(0);
        let failed = AtomicBool::new(false);
        let first_error: Mutex<Option<LayerError>> = Mutex::new(None);

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    if failed.load(Ordering::Acquire) {
                        break;
                    }
                    let Some(job) = jobs.get(next.fetch_add(1, Ordering::AcqRel)) else {
                        break;
                    };
                    if let Err(err) = work(job) {
                        failed.store(true, Ordering::Release);
                        let mut slot = first_error.lock().unwrap_or_else(PoisonError::into_inner);
                        if slot.is_none() {
                            *slot = Some(err);
                        }
                        break;
                    }
                });
            }
        });

        match first_error
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
        {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
