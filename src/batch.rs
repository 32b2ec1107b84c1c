// src/batch.rs
//
// BatchOrchestrator: runs many comparisons against one reference, one at a
// time, and owns every BatchItem. Jobs run on a scoped worker thread while the
// caller's thread drains their progress, so item state is only ever touched
// from the thread that called `start`.

use crate::analyzer::Analyzer;
use crate::error::{Result, ValidationError};
use crate::job::{ComparisonJob, JobProgress, check_resolution};
use crate::metrics::ComparisonResult;
use crate::probe::VideoProperties;
use crate::progress::ProgressEvent;
use crossbeam_channel::{Sender, unbounded};
use log::{info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use uuid::Uuid;

// --- Items ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ItemStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Snapshot of one comparison in a batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    pub id: Uuid,
    pub url: PathBuf,
    pub status: ItemStatus,
    pub progress_frames: u64,
    pub total_frames: Option<u64>,
    /// 0..=100. When `percent_is_estimate` is set this comes from elapsed
    /// media time, not from a frame total.
    pub percent: f64,
    pub percent_is_estimate: bool,
    pub fps: f64,
    pub result: Option<ComparisonResult>,
    pub error: Option<String>,
}

impl BatchItem {
    fn new(url: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4(),
            url,
            status: ItemStatus::Pending,
            progress_frames: 0,
            total_frames: None,
            percent: 0.0,
            percent_is_estimate: false,
            fps: 0.0,
            result: None,
            error: None,
        }
    }

    fn reset(&mut self) {
        self.status = ItemStatus::Pending;
        self.progress_frames = 0;
        self.total_frames = None;
        self.percent = 0.0;
        self.percent_is_estimate = false;
        self.fps = 0.0;
        self.result = None;
        self.error = None;
    }

    fn apply_progress(&mut self, event: &ProgressEvent) {
        self.progress_frames = event.frame_count;
        self.fps = event.fps;
        if let Some(total) = event.total_frames_estimate.filter(|t| *t > 0) {
            self.total_frames = Some(total);
        }
        match self.total_frames {
            Some(total) => {
                self.percent = (self.progress_frames as f64 / total as f64 * 100.0).clamp(0.0, 100.0);
                self.percent_is_estimate = false;
            }
            None => {
                self.percent = event.indicative_percent();
                self.percent_is_estimate = true;
            }
        }
    }

    fn complete(&mut self, result: ComparisonResult) {
        self.status = ItemStatus::Completed;
        self.progress_frames = result.frame_count;
        self.total_frames = Some(result.frame_count);
        self.percent = 100.0;
        self.percent_is_estimate = false;
        self.error = None;
        self.result = Some(result);
    }

    fn fail(&mut self, message: String) {
        self.status = ItemStatus::Failed;
        self.result = None;
        self.error = Some(message);
    }

    /// File name for messages.
    pub fn display_name(&self) -> String {
        file_label(&self.url)
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

// --- Events and Outcome ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BatchOutcome {
    NothingToDo,
    Finished { completed: usize, failed: usize },
    Cancelled { completed: usize, failed: usize, skipped: usize },
}

impl BatchOutcome {
    /// True when at least one item of this run ended Failed.
    pub fn has_failures(&self) -> bool {
        match self {
            BatchOutcome::NothingToDo => false,
            BatchOutcome::Finished { failed, .. } | BatchOutcome::Cancelled { failed, .. } => *failed > 0,
        }
    }
}

#[derive(Debug, Clone)]
pub enum BatchEvent {
    ItemUpdated(BatchItem),
    Progress { item_id: Uuid, event: ProgressEvent },
    Finished(BatchOutcome),
}

/// Cloneable handle for stopping a running batch from another thread.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    running: Arc<AtomicBool>,
    cancel_requested: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Stops scheduling further items. The comparison in flight runs to completion.
    /// Does nothing when no batch is running.
    pub fn cancel(&self) {
        if self.running.load(Ordering::SeqCst) {
            info!("Batch cancellation requested");
            self.cancel_requested.store(true, Ordering::SeqCst);
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Clears the running flag on every exit path of `start`.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// --- BatchOrchestrator ---

pub struct BatchOrchestrator {
    reference: PathBuf,
    items: HashMap<Uuid, BatchItem>,
    /// Insertion order of `items`.
    order: Vec<Uuid>,
    handle: CancelHandle,
    listener: Option<Sender<BatchEvent>>,
}

impl BatchOrchestrator {
    pub fn new(reference: impl Into<PathBuf>) -> Self {
        Self {
            reference: reference.into(),
            items: HashMap::new(),
            order: Vec::new(),
            handle: CancelHandle {
                running: Arc::new(AtomicBool::new(false)),
                cancel_requested: Arc::new(AtomicBool::new(false)),
            },
            listener: None,
        }
    }

    pub fn reference(&self) -> &Path {
        &self.reference
    }

    pub fn set_listener(&mut self, listener: Sender<BatchEvent>) {
        self.listener = Some(listener);
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.handle.clone()
    }

    pub fn cancel(&self) {
        self.handle.cancel();
    }

    /// Appends Pending items. Nothing starts until [`start`](Self::start).
    pub fn add_items<I, P>(&mut self, urls: I) -> Vec<Uuid>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        urls.into_iter()
            .map(|url| {
                let item = BatchItem::new(url.into());
                let id = item.id;
                self.order.push(id);
                self.items.insert(id, item);
                id
            })
            .collect()
    }

    pub fn remove_item(&mut self, id: Uuid) -> bool {
        if self.items.remove(&id).is_some() {
            self.order.retain(|existing| *existing != id);
            true
        } else {
            false
        }
    }

    pub fn clear(&mut self) -> bool {
        let changed = !self.order.is_empty();
        self.items.clear();
        self.order.clear();
        changed
    }

    pub fn item(&self, id: Uuid) -> Option<&BatchItem> {
        self.items.get(&id)
    }

    /// Snapshots in insertion order.
    pub fn items(&self) -> Vec<BatchItem> {
        self.order.iter().filter_map(|id| self.items.get(id)).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Runs every item that is not Completed, in insertion order.
    pub fn start(&mut self, analyzer: &Analyzer) -> Result<BatchOutcome> {
        let pending: Vec<Uuid> = self
            .order
            .iter()
            .copied()
            .filter(|id| self.items.get(id).is_some_and(|item| item.status != ItemStatus::Completed))
            .collect();

        if pending.is_empty() {
            info!("No pending videos to process.");
            return Ok(BatchOutcome::NothingToDo);
        }

        // Running from here on, so a cancel during validation is not lost.
        self.handle.cancel_requested.store(false, Ordering::SeqCst);
        self.handle.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.handle.running);
        let _guard = RunningGuard(&running);

        let reference_props = self.validate_pending(analyzer, &pending)?;

        if self.handle.cancel_requested.load(Ordering::SeqCst) {
            info!("Batch cancelled during validation; {} item(s) not started", pending.len());
            let outcome = BatchOutcome::Cancelled { completed: 0, failed: 0, skipped: pending.len() };
            self.emit(BatchEvent::Finished(outcome));
            return Ok(outcome);
        }

        for id in &pending {
            if let Some(item) = self.items.get_mut(id) {
                item.reset();
            }
            self.emit_item(*id);
        }

        info!("Starting batch of {} comparison(s) against {}", pending.len(), self.reference.display());
        let (mut completed, mut failed) = (0usize, 0usize);

        for (position, id) in pending.iter().enumerate() {
            if self.handle.cancel_requested.load(Ordering::SeqCst) {
                let skipped = pending.len() - position;
                info!("Batch cancelled; {} item(s) left pending", skipped);
                let outcome = BatchOutcome::Cancelled { completed, failed, skipped };
                self.emit(BatchEvent::Finished(outcome));
                return Ok(outcome);
            }

            match self.run_item(analyzer, *id, reference_props) {
                Some(true) => completed += 1,
                Some(false) => failed += 1,
                None => {}
            }
        }

        if failed > 0 {
            warn!("One or more comparisons failed ({} of {})", failed, pending.len());
        }
        let outcome = BatchOutcome::Finished { completed, failed };
        info!("Batch finished: {} completed, {} failed", completed, failed);
        self.emit(BatchEvent::Finished(outcome));
        Ok(outcome)
    }

    /// Probes the reference once and checks every pending item against it.
    fn validate_pending(&self, analyzer: &Analyzer, pending: &[Uuid]) -> Result<VideoProperties> {
        let reference_props = match analyzer.probe().probe(&self.reference) {
            Ok(props) => props,
            Err(e) => {
                warn!("Reference video rejected: {}", e);
                return Err(ValidationError::BatchRejected {
                    issues: vec!["Reference video is unreadable or has no video track.".to_string()],
                }
                .into());
            }
        };

        let mut issues = Vec::new();
        for id in pending {
            let Some(item) = self.items.get(id) else { continue };
            let name = item.display_name();
            match analyzer.probe().probe(&item.url) {
                Ok(props) => {
                    if check_resolution(&reference_props, &props).is_err() {
                        issues.push(format!(
                            "{}: resolution {}x{} does not match reference {}x{}.",
                            name, props.width, props.height, reference_props.width, reference_props.height
                        ));
                    }
                }
                Err(e) => {
                    warn!("Probe failed for {}: {}", item.url.display(), e);
                    issues.push(format!("{}: unreadable or no video track.", name));
                }
            }
        }

        if issues.is_empty() {
            Ok(reference_props)
        } else {
            Err(ValidationError::BatchRejected { issues }.into())
        }
    }

    /// Runs one item. `Some(true)` on success, `Some(false)` on failure.
    fn run_item(&mut self, analyzer: &Analyzer, id: Uuid, reference_props: VideoProperties) -> Option<bool> {
        let url = {
            let item = self.items.get_mut(&id)?;
            item.status = ItemStatus::Running;
            item.url.clone()
        };
        info!("Processing {}", url.display());
        self.emit_item(id);

        let (job_tx, job_rx) = unbounded::<JobProgress>();
        let mut job = ComparisonJob::with_id(id, &self.reference, &url).with_reference_properties(reference_props);
        job.set_listener(job_tx);

        let outcome = thread::scope(|scope| {
            // The job owns the only sender, so the receive loop ends when the job is dropped.
            let worker = scope.spawn(move || {
                let mut job = job;
                job.run(analyzer)
            });
            for progress in job_rx.iter() {
                self.apply_progress(progress);
            }
            worker.join()
        });

        let item = self.items.get_mut(&id)?;
        let succeeded = match outcome {
            Ok(Ok(result)) => {
                info!("{}: VMAF {:.2}", item.display_name(), result.score);
                item.complete(result);
                true
            }
            Ok(Err(e)) => {
                warn!("{} failed: {}", item.display_name(), e);
                item.fail(e.to_string());
                false
            }
            Err(_) => {
                item.fail("Comparison worker panicked".to_string());
                false
            }
        };
        self.emit_item(id);
        Some(succeeded)
    }

    fn apply_progress(&mut self, progress: JobProgress) {
        let Some(item) = self.items.get_mut(&progress.job_id) else { return };
        if item.status != ItemStatus::Running {
            return;
        }
        item.apply_progress(&progress.event);
        self.emit(BatchEvent::Progress { item_id: progress.job_id, event: progress.event });
        self.emit_item(progress.job_id);
    }

    fn emit_item(&self, id: Uuid) {
        if let Some(item) = self.items.get(&id) {
            self.emit(BatchEvent::ItemUpdated(item.clone()));
        }
    }

    fn emit(&self, event: BatchEvent) {
        if let Some(listener) = &self.listener {
            let _ = listener.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn event(frame_count: u64, total: Option<u64>, elapsed_secs: f64) -> ProgressEvent {
        ProgressEvent {
            frame_count,
            fps: 42.0,
            elapsed: Duration::from_secs_f64(elapsed_secs),
            total_frames_estimate: total,
        }
    }

    #[test]
    fn progress_with_total_is_a_real_percentage() {
        let mut item = BatchItem::new(PathBuf::from("a.mp4"));
        item.apply_progress(&event(75, Some(300), 2.5));
        assert_eq!(item.percent, 25.0);
        assert!(!item.percent_is_estimate);
        assert_eq!(item.total_frames, Some(300));
        assert_eq!(item.fps, 42.0);

        item.apply_progress(&event(320, Some(300), 11.0));
        assert_eq!(item.percent, 100.0);
    }

    #[test]
    fn progress_without_total_is_flagged_as_estimate() {
        let mut item = BatchItem::new(PathBuf::from("a.mp4"));
        item.apply_progress(&event(90, None, 3.0));
        assert_eq!(item.progress_frames, 90);
        assert!(item.percent_is_estimate);
        assert!((item.percent - 0.5).abs() < 1e-9);
    }

    #[test]
    fn reset_clears_everything_but_identity() {
        let mut item = BatchItem::new(PathBuf::from("/v/a.mp4"));
        let id = item.id;
        item.apply_progress(&event(10, Some(20), 1.0));
        item.fail("boom".to_string());
        item.reset();
        assert_eq!(item.id, id);
        assert_eq!(item.status, ItemStatus::Pending);
        assert_eq!(item.progress_frames, 0);
        assert_eq!(item.total_frames, None);
        assert_eq!(item.percent, 0.0);
        assert!(item.error.is_none() && item.result.is_none());
        assert_eq!(item.display_name(), "a.mp4");
    }

    #[test]
    fn items_keep_insertion_order() {
        let mut batch = BatchOrchestrator::new("ref.mp4");
        let ids = batch.add_items(["c.mp4", "a.mp4", "b.mp4"]);
        let urls: Vec<PathBuf> = batch.items().into_iter().map(|i| i.url).collect();
        assert_eq!(urls, vec![PathBuf::from("c.mp4"), PathBuf::from("a.mp4"), PathBuf::from("b.mp4")]);

        assert!(batch.remove_item(ids[1]));
        assert!(!batch.remove_item(ids[1]));
        assert_eq!(batch.len(), 2);
        assert!(batch.items().iter().all(|i| i.status == ItemStatus::Pending));

        assert!(batch.clear());
        assert!(batch.is_empty());
        assert!(!batch.clear());
    }

    #[test]
    fn cancel_is_a_no_op_when_idle() {
        let batch = BatchOrchestrator::new("ref.mp4");
        let handle = batch.cancel_handle();
        handle.cancel();
        assert!(!handle.is_running());
        assert!(!batch.handle.cancel_requested.load(Ordering::SeqCst));
    }

    #[test]
    fn outcome_reports_failures() {
        assert!(!BatchOutcome::NothingToDo.has_failures());
        assert!(!BatchOutcome::Finished { completed: 3, failed: 0 }.has_failures());
        assert!(BatchOutcome::Finished { completed: 2, failed: 1 }.has_failures());
        assert!(BatchOutcome::Cancelled { completed: 0, failed: 1, skipped: 2 }.has_failures());
    }
}
