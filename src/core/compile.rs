//! Background archive compilation.
//!
//! A compile runs on one dedicated worker thread per store. The worker writes
//! into a temporary file next to the target, reports progress every
//! [`CHECKPOINT_INTERVAL`] records, polls a cancellation flag at the same
//! cadence and, on success, renames the temporary file over the target in a
//! single step. A cancelled or failed compile drops the temporary file and
//! never touches the target.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tempfile::NamedTempFile;

use crate::util::{Error, Result};

/// Records processed between two progress reports / cancellation checks.
pub const CHECKPOINT_INTERVAL: usize = 500;

/// Which archive a progress report belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArchiveKind {
    Sprites,
    Objects,
}

/// A progress report: `percent` grows monotonically from 0 to 100 per compile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProgressEvent {
    pub archive: ArchiveKind,
    pub percent: u8,
}

/// Receiver of progress reports. Called on the worker thread.
pub trait ProgressSink: Send + Sync {
    fn progress(&self, event: ProgressEvent);
}

impl ProgressSink for Sender<ProgressEvent> {
    fn progress(&self, event: ProgressEvent) {
        let _ = self.send(event);
    }
}

/// Sink that drops every report.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn progress(&self, _event: ProgressEvent) {}
}

/// Shared cancellation flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// What `save` did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveStatus {
    /// Nothing changed; the backing file was copied (or already was the target).
    Copied,
    /// A background compile was started.
    Started,
    /// A compile is already running for this store; nothing was queued.
    NotStarted,
}

/// How a compile ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompileOutcome {
    /// The target was replaced and the store now reads from it.
    Compiled(PathBuf),
    /// The compile was cancelled; the target is untouched.
    Cancelled,
}

/// Progress accounting for one compile.
pub(crate) struct Progress {
    archive: ArchiveKind,
    sink: Arc<dyn ProgressSink>,
    cancel: CancelToken,
    total: u64,
    done: u64,
    since_checkpoint: usize,
    last: u8,
}

impl Progress {
    pub(crate) fn new(archive: ArchiveKind, sink: Arc<dyn ProgressSink>, cancel: CancelToken, total: u64) -> Self {
        Self {
            archive,
            sink,
            cancel,
            total,
            done: 0,
            since_checkpoint: 0,
            last: 0,
        }
    }

    /// Report 0%. Returns `true` if the compile was cancelled before it began.
    pub(crate) fn start(&mut self) -> bool {
        self.sink.progress(ProgressEvent { archive: self.archive, percent: 0 });
        self.cancel.is_cancelled()
    }

    /// Account for `n` processed records. At each checkpoint reports progress
    /// and returns `true` if cancellation was requested.
    pub(crate) fn advance(&mut self, n: usize) -> bool {
        self.done += n as u64;
        self.since_checkpoint += n;
        if self.since_checkpoint < CHECKPOINT_INTERVAL {
            return false;
        }
        self.since_checkpoint = 0;
        self.report(self.percent().min(99));
        self.cancel.is_cancelled()
    }

    /// Report 100%.
    pub(crate) fn finish(&mut self) {
        self.report(100);
    }

    fn percent(&self) -> u8 {
        if self.total == 0 {
            100
        } else {
            (self.done.min(self.total) * 100 / self.total) as u8
        }
    }

    fn report(&mut self, percent: u8) {
        if percent > self.last {
            self.last = percent;
            self.sink.progress(ProgressEvent { archive: self.archive, percent });
        }
    }
}

/// A running compile. `T` is what the worker hands back for rebinding the store.
pub(crate) struct CompileJob<T> {
    handle: JoinHandle<Result<Option<T>>>,
    cancel: CancelToken,
}

impl<T: Send + 'static> CompileJob<T> {
    /// Spawn a worker. The closure returns `Ok(None)` when it observed cancellation.
    pub(crate) fn spawn<F>(name: &str, cancel: CancelToken, work: F) -> Result<Self>
    where
        F: FnOnce() -> Result<Option<T>> + Send + 'static,
    {
        let handle = thread::Builder::new().name(name.to_string()).spawn(work)?;
        Ok(Self { handle, cancel })
    }

    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the worker. `Ok(None)` means cancelled.
    pub(crate) fn join(self) -> Result<Option<T>> {
        self.handle
            .join()
            .map_err(|_| Error::other("compile worker panicked"))?
    }
}

/// Create the temporary output file in the target's directory so the final rename stays on one filesystem.
pub(crate) fn temp_file_for(target: &Path) -> Result<NamedTempFile> {
    let dir = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    Ok(tempfile::Builder::new()
        .prefix(".thingpack-")
        .suffix(".tmp")
        .tempfile_in(dir)?)
}

/// Flush the temporary file to disk and rename it over `target` in one step.
pub(crate) fn persist(temp: NamedTempFile, target: &Path) -> Result<()> {
    temp.as_file().sync_all()?;
    temp.persist(target).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// True when both paths name the same existing file.
pub(crate) fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    #[test]
    fn test_progress_is_monotonic_and_reaches_100() {
        let (tx, rx) = channel();
        let mut progress = Progress::new(ArchiveKind::Sprites, Arc::new(tx), CancelToken::new(), 1200);
        assert!(!progress.start());
        for _ in 0..1200 {
            assert!(!progress.advance(1));
        }
        progress.finish();

        let percents: Vec<u8> = rx.try_iter().map(|e| e.percent).collect();
        assert_eq!(percents.first(), Some(&0));
        assert_eq!(percents.last(), Some(&100));
        assert!(percents.windows(2).all(|w| w[0] < w[1]));
        // 0, two checkpoints, 100
        assert_eq!(percents.len(), 4);
    }

    #[test]
    fn test_cancellation_seen_at_checkpoint_only() {
        let cancel = CancelToken::new();
        let mut progress = Progress::new(ArchiveKind::Objects, Arc::new(NoProgress), cancel.clone(), 10_000);
        cancel.cancel();
        assert!(!progress.advance(CHECKPOINT_INTERVAL - 1));
        assert!(progress.advance(1));
    }

    #[test]
    fn test_job_join_returns_worker_result() {
        let job = CompileJob::spawn("test-worker", CancelToken::new(), || Ok(Some(7u32))).unwrap();
        assert_eq!(job.join().unwrap(), Some(7));
    }

    #[test]
    fn test_dropped_temp_file_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.bin");
        let temp = temp_file_for(&target).unwrap();
        let temp_path = temp.path().to_path_buf();
        assert!(temp_path.exists());
        drop(temp);
        assert!(!temp_path.exists());
        assert!(!target.exists());
    }
}
