//! Parallel batch processing for multi-day datasets.
//!
//! Every day file is an independent job. Jobs share only the immutable
//! [`Pipeline`] (and through it the [`crate::schema::PipelineSpec`]); each
//! job reads, processes and writes its own day and nothing else.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    BatchProcessor                               │
//! │   skip existing ─► JobRunner                                    │
//! │  ┌─────────────────────────────────────────────────────────────┐│
//! │  │              Rayon Thread Pool (N workers)                  ││
//! │  │                                                             ││
//! │  │  Worker 1        Worker 2        Worker N                   ││
//! │  │  day1.csv        day2.csv        dayN.csv                   ││
//! │  │     │               │               │   Arc<Pipeline>       ││
//! │  │     ▼               ▼               ▼   (shared, read-only) ││
//! │  │  JobRecord       JobRecord       JobRecord                  ││
//! │  └──────────────────────┬──────────────────────────────────────┘│
//! │                         ▼                                       │
//! │                   BatchManifest                                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Job States
//!
//! ```text
//! Pending ─► Running ─┬─► Succeeded
//!                     ├─► SucceededEmpty
//!                     └─► Failed
//! ```
//!
//! Terminal states are final. An error or a panic inside a job marks that job
//! `Failed` and never stops the others. There are no retries: resubmit
//! [`BatchManifest::failed_ids`] as a new batch instead.
//!
//! # Ordering
//!
//! With one worker jobs run in submission order. With more, completion order
//! is unspecified; the progress counter still moves by exactly one per
//! finished job and the manifest lists records in submission order.
//!
//! # Cancellation
//!
//! A [`CancellationToken`] stops new jobs from starting. Jobs already running
//! finish normally; jobs that never started are recorded as `Failed` with
//! reason `"cancelled"`, so they can be resubmitted.

use crate::error::{Error, Result};
use crate::export::DayExporter;
use crate::pipeline::{Pipeline, PipelineOutput};
use crate::source::DaySource;
use ahash::AHashMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// ============================================================================
// Cancellation Support
// ============================================================================

/// Token for cancelling a running batch.
///
/// Cloned tokens share one flag, so any clone can cancel from any thread.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Running jobs complete; pending jobs do not start.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for batch processing.
///
/// # Example
///
/// ```
/// use solarnc_features::batch::BatchConfig;
///
/// let config = BatchConfig::new().with_threads(4).with_skip_existing(true);
/// assert_eq!(config.effective_threads(), 4);
/// ```
#[derive(Debug, Clone, Default)]
pub struct BatchConfig {
    /// Number of workers.
    ///
    /// - `None`: Rayon default (typically the number of CPUs)
    /// - `Some(n)`: exactly `n` workers; `n ≤ 1` runs sequentially
    pub num_threads: Option<usize>,

    /// Skip days whose outputs already exist.
    pub skip_existing: bool,

    /// Stack size per worker thread in bytes (advanced).
    pub stack_size: Option<usize>,
}

impl BatchConfig {
    /// Create a batch configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of workers. `0` and `1` both mean sequential.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.num_threads = Some(threads);
        self
    }

    /// Skip days whose outputs already exist.
    pub fn with_skip_existing(mut self, skip: bool) -> Self {
        self.skip_existing = skip;
        self
    }

    /// Set custom stack size per worker thread.
    pub fn with_stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }

    /// Effective worker count (at least 1).
    pub fn effective_threads(&self) -> usize {
        self.num_threads
            .unwrap_or_else(rayon::current_num_threads)
            .max(1)
    }
}

// ============================================================================
// Jobs and Records
// ============================================================================

/// One unit of work: an identifier plus its input.
#[derive(Debug, Clone)]
pub struct Job<I> {
    /// Unique identifier (the day id for day files).
    pub id: String,
    /// Job input.
    pub input: I,
}

impl<I> Job<I> {
    pub fn new(id: impl Into<String>, input: I) -> Self {
        Self {
            id: id.into(),
            input,
        }
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    SucceededEmpty,
    Failed,
}

impl JobState {
    /// Whether no further transition is allowed.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::SucceededEmpty | JobState::Failed
        )
    }

    /// Move to `next` if the transition is legal.
    ///
    /// Legal: `Pending → Running`, `Pending → Failed` (never started),
    /// `Running → {Succeeded, SucceededEmpty, Failed}`.
    pub fn advance(self, next: JobState) -> Option<JobState> {
        use JobState::*;
        match (self, next) {
            (Pending, Running) | (Pending, Failed) => Some(next),
            (Running, Succeeded) | (Running, SucceededEmpty) | (Running, Failed) => Some(next),
            _ => None,
        }
    }

    /// Runner-internal transition; an illegal move is a runner bug.
    fn step(self, next: JobState) -> JobState {
        let moved = self.advance(next);
        debug_assert!(moved.is_some(), "illegal job transition {self:?} -> {next:?}");
        moved.unwrap_or(next)
    }
}

/// What a successful job reports back, used to tell empty successes apart.
pub trait JobOutput: Send {
    /// Rows produced.
    fn row_count(&self) -> usize;

    /// Whether the job succeeded without producing any rows.
    fn is_empty_result(&self) -> bool {
        self.row_count() == 0
    }
}

impl JobOutput for usize {
    fn row_count(&self) -> usize {
        *self
    }
}

impl JobOutput for PipelineOutput {
    fn row_count(&self) -> usize {
        self.rows()
    }
}

/// Terminal record of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Job identifier.
    pub id: String,
    /// Input the job read (the day file path for day jobs).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    /// Terminal state.
    pub state: JobState,
    /// Rows produced by a successful job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<usize>,
    /// Failure reason for `Failed` jobs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall time spent in the job.
    pub elapsed_ms: u64,
}

// ============================================================================
// Manifest
// ============================================================================

/// Final classification of every submitted job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchManifest {
    /// One record per dispatched job, in submission order.
    pub records: Vec<JobRecord>,

    /// Identifiers filtered out before dispatch (outputs already present).
    #[serde(default)]
    pub skipped: Vec<String>,

    /// Workers used.
    pub threads_used: usize,

    /// Total wall time.
    pub elapsed_ms: u64,

    /// Whether cancellation was requested during the run.
    #[serde(default)]
    pub was_cancelled: bool,
}

impl BatchManifest {
    fn ids_in(&self, state: JobState) -> Vec<&str> {
        self.records
            .iter()
            .filter(|r| r.state == state)
            .map(|r| r.id.as_str())
            .collect()
    }

    /// Number of dispatched jobs.
    pub fn total(&self) -> usize {
        self.records.len()
    }

    /// Identifiers of jobs that produced rows.
    pub fn succeeded_ids(&self) -> Vec<&str> {
        self.ids_in(JobState::Succeeded)
    }

    /// Identifiers of jobs that succeeded with no rows.
    pub fn empty_ids(&self) -> Vec<&str> {
        self.ids_in(JobState::SucceededEmpty)
    }

    /// Identifiers of failed jobs; resubmit these to retry.
    pub fn failed_ids(&self) -> Vec<&str> {
        self.ids_in(JobState::Failed)
    }

    pub fn succeeded_count(&self) -> usize {
        self.succeeded_ids().len()
    }

    pub fn empty_count(&self) -> usize {
        self.empty_ids().len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed_ids().len()
    }

    /// Whether no job failed.
    pub fn all_successful(&self) -> bool {
        self.records.iter().all(|r| r.state != JobState::Failed)
    }

    /// Record for `id`, if dispatched.
    pub fn record(&self, id: &str) -> Option<&JobRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Speedup over running every job back to back.
    pub fn speedup_factor(&self) -> f64 {
        let sequential: u64 = self.records.iter().map(|r| r.elapsed_ms).sum();
        if self.elapsed_ms == 0 {
            return 1.0;
        }
        sequential as f64 / self.elapsed_ms as f64
    }

    /// One-line summary, e.g. `"8 succeeded, 1 empty, 1 failed, 2 skipped"`.
    pub fn summary(&self) -> String {
        format!(
            "{} succeeded, {} empty, {} failed, {} skipped",
            self.succeeded_count(),
            self.empty_count(),
            self.failed_count(),
            self.skipped.len()
        )
    }

    /// Save as pretty JSON.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    /// Load from JSON.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = BufReader::new(File::open(path.as_ref())?);
        serde_json::from_reader(file)
            .map_err(|e| Error::generic(format!("{}: {e}", path.as_ref().display())))
    }
}

// ============================================================================
// Progress Reporting
// ============================================================================

/// Progress information for callbacks.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Job that just finished.
    pub job_id: String,

    /// Its terminal state.
    pub state: JobState,

    /// Jobs finished so far, this one included.
    pub completed: usize,

    /// Jobs failed so far.
    pub failed: usize,

    /// Jobs dispatched.
    pub total: usize,

    /// Elapsed time since start.
    pub elapsed: Duration,
}

impl ProgressInfo {
    /// Completion percentage (0.0 to 100.0).
    pub fn percent_complete(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.completed as f64 / self.total as f64 * 100.0
        }
    }

    /// Estimate remaining time from the average so far.
    pub fn estimated_remaining(&self) -> Option<Duration> {
        if self.completed == 0 {
            return None;
        }
        let remaining = self.total.saturating_sub(self.completed);
        let avg = self.elapsed.as_secs_f64() / self.completed as f64;
        Some(Duration::from_secs_f64(avg * remaining as f64))
    }
}

/// Receives progress updates during a batch.
///
/// `on_progress` is called once per finished job, from the worker that ran
/// it, so implementations must be thread-safe.
pub trait ProgressCallback: Send + Sync {
    /// Called after each job reaches a terminal state.
    fn on_progress(&self, info: &ProgressInfo);

    /// Called once when the batch completes.
    fn on_complete(&self, manifest: &BatchManifest);
}

/// Console progress reporter: `Done: j/n` lines and a final summary.
#[derive(Debug, Default)]
pub struct ConsoleProgress {
    /// Also print the id and state of every finished job.
    pub verbose: bool,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }
}

impl ProgressCallback for ConsoleProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        if self.verbose {
            println!(
                "[{:3}/{:3}] {} {:?} ({:.1}% complete)",
                info.completed,
                info.total,
                info.job_id,
                info.state,
                info.percent_complete()
            );
        } else {
            println!("Done: {}/{}", info.completed, info.total);
        }
    }

    fn on_complete(&self, manifest: &BatchManifest) {
        println!("═══════════════════════════════════════════════════════════════");
        println!("Batch Processing Complete");
        println!("═══════════════════════════════════════════════════════════════");
        println!("  Succeeded:       {}", manifest.succeeded_count());
        println!("  Empty:           {}", manifest.empty_count());
        println!("  Failed:          {}", manifest.failed_count());
        println!("  Skipped:         {}", manifest.skipped.len());
        println!("  Total time:      {} ms", manifest.elapsed_ms);
        println!("  Speedup:         {:.2}x", manifest.speedup_factor());
        for record in manifest.records.iter().filter(|r| r.state == JobState::Failed) {
            println!(
                "  FAILED {}: {}",
                record.id,
                record.error.as_deref().unwrap_or("unknown error")
            );
        }
        println!("═══════════════════════════════════════════════════════════════");
    }
}

// ============================================================================
// Job Runner
// ============================================================================

/// Generic partial-failure-tolerant job runner.
///
/// # Example
///
/// ```
/// use solarnc_features::batch::{BatchConfig, Job, JobRunner};
/// use solarnc_features::error::Error;
///
/// let jobs: Vec<Job<usize>> = (0..6).map(|i| Job::new(format!("job{i}"), i)).collect();
/// let runner = JobRunner::new(BatchConfig::new().with_threads(3));
/// let manifest = runner
///     .run(&jobs, |job| {
///         if job.input == 4 {
///             Err(Error::generic("boom"))
///         } else {
///             Ok(job.input)
///         }
///     })
///     .unwrap();
///
/// assert_eq!(manifest.total(), 6);
/// assert_eq!(manifest.empty_ids(), vec!["job0"]);
/// assert_eq!(manifest.failed_ids(), vec!["job4"]);
/// ```
pub struct JobRunner {
    config: BatchConfig,
    progress_callback: Option<Arc<dyn ProgressCallback>>,
    cancellation_token: CancellationToken,
}

impl JobRunner {
    pub fn new(config: BatchConfig) -> Self {
        Self {
            config,
            progress_callback: None,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Set a progress callback.
    pub fn with_progress_callback(mut self, callback: Box<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(Arc::from(callback));
        self
    }

    /// Set a cancellation token.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Clone of the cancellation token, for cancelling from another thread.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Run every job and classify its outcome.
    ///
    /// # Errors
    ///
    /// Only if the worker pool cannot be created. Job failures are recorded
    /// in the manifest, never returned.
    pub fn run<I, T, F>(&self, jobs: &[Job<I>], f: F) -> Result<BatchManifest>
    where
        I: Sync,
        T: JobOutput,
        F: Fn(&Job<I>) -> Result<T> + Sync,
    {
        let start = Instant::now();
        let total = jobs.len();
        let threads_used = self.config.effective_threads();

        let completed = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);

        let run_one = |job: &Job<I>| -> JobRecord {
            let record = self.run_single_job(job, &f);
            if record.state == JobState::Failed {
                failed.fetch_add(1, Ordering::Relaxed);
            }
            let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(ref callback) = self.progress_callback {
                callback.on_progress(&ProgressInfo {
                    job_id: record.id.clone(),
                    state: record.state,
                    completed: done,
                    failed: failed.load(Ordering::Relaxed),
                    total,
                    elapsed: start.elapsed(),
                });
            }
            record
        };

        let records: Vec<JobRecord> = if threads_used <= 1 {
            jobs.iter().map(run_one).collect()
        } else {
            // Local pool: the global one can only be configured once per process.
            let mut pool_builder = rayon::ThreadPoolBuilder::new().num_threads(threads_used);
            if let Some(stack_size) = self.config.stack_size {
                pool_builder = pool_builder.stack_size(stack_size);
            }
            let pool = pool_builder
                .build()
                .map_err(|e| Error::generic(format!("Failed to create thread pool: {e}")))?;

            pool.install(|| jobs.par_iter().map(run_one).collect())
        };

        let manifest = BatchManifest {
            records,
            skipped: Vec::new(),
            threads_used,
            elapsed_ms: start.elapsed().as_millis() as u64,
            was_cancelled: self.cancellation_token.is_cancelled(),
        };

        log::info!(
            "Batch finished in {} ms on {} worker(s): {}",
            manifest.elapsed_ms,
            threads_used,
            manifest.summary()
        );

        if let Some(ref callback) = self.progress_callback {
            callback.on_complete(&manifest);
        }
        Ok(manifest)
    }

    fn run_single_job<I, T, F>(&self, job: &Job<I>, f: &F) -> JobRecord
    where
        T: JobOutput,
        F: Fn(&Job<I>) -> Result<T>,
    {
        let start = Instant::now();
        let state = JobState::Pending;

        if self.cancellation_token.is_cancelled() {
            return JobRecord {
                id: job.id.clone(),
                input: None,
                state: state.step(JobState::Failed),
                rows: None,
                error: Some("cancelled".to_string()),
                elapsed_ms: 0,
            };
        }

        let state = state.step(JobState::Running);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(job)));

        let (next, rows, error) = match outcome {
            Ok(Ok(output)) if output.is_empty_result() => (JobState::SucceededEmpty, Some(0), None),
            Ok(Ok(output)) => (JobState::Succeeded, Some(output.row_count()), None),
            Ok(Err(e)) => (JobState::Failed, None, Some(e.to_string())),
            Err(payload) => (JobState::Failed, None, Some(panic_message(payload.as_ref()))),
        };

        match (&next, &error) {
            (JobState::Failed, Some(reason)) => log::warn!("Job {} failed: {}", job.id, reason),
            (JobState::SucceededEmpty, _) => log::warn!("Job {} produced no aligned rows", job.id),
            _ => log::info!("Job {} done: {} rows", job.id, rows.unwrap_or(0)),
        }

        JobRecord {
            id: job.id.clone(),
            input: None,
            state: state.step(next),
            rows,
            error,
            elapsed_ms: start.elapsed().as_millis() as u64,
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

// ============================================================================
// Batch Processor
// ============================================================================

/// Runs the day pipeline over many day files.
///
/// # Example
///
/// ```ignore
/// use solarnc_features::prelude::*;
///
/// let config = PipelineConfig::load_toml("run.toml")?;
/// let spec = Arc::new(config.build_spec()?);
/// let processor = BatchProcessor::new(
///     Arc::new(Pipeline::new(spec)),
///     Arc::new(CsvDaySource::new()),
///     DayExporter::new(&config.output.dir, config.output.format),
///     config.batch_config(),
/// );
/// let files = discover_day_files(&config.dataset.input_dir, "csv")?;
/// let manifest = processor.process_files(&files)?;
/// println!("{}", manifest.summary());
/// ```
pub struct BatchProcessor {
    pipeline: Arc<Pipeline>,
    source: Arc<dyn DaySource>,
    exporter: DayExporter,
    runner: JobRunner,
    skip_existing: bool,
}

impl BatchProcessor {
    pub fn new(
        pipeline: Arc<Pipeline>,
        source: Arc<dyn DaySource>,
        exporter: DayExporter,
        batch_config: BatchConfig,
    ) -> Self {
        let skip_existing = batch_config.skip_existing;
        Self {
            pipeline,
            source,
            exporter,
            runner: JobRunner::new(batch_config),
            skip_existing,
        }
    }

    /// Set a progress callback.
    pub fn with_progress_callback(mut self, callback: Box<dyn ProgressCallback>) -> Self {
        self.runner = self.runner.with_progress_callback(callback);
        self
    }

    /// Set a cancellation token.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.runner = self.runner.with_cancellation_token(token);
        self
    }

    /// The exporter days are written with.
    pub fn exporter(&self) -> &DayExporter {
        &self.exporter
    }

    /// Process every file, one job per day.
    ///
    /// # Errors
    ///
    /// Fails before dispatch if two files map to the same day id (their
    /// outputs would collide), or if the worker pool cannot be created.
    pub fn process_files<P: AsRef<Path>>(&self, files: &[P]) -> Result<BatchManifest> {
        let mut seen: AHashMap<String, PathBuf> = AHashMap::with_capacity(files.len());
        let mut jobs = Vec::with_capacity(files.len());
        let mut skipped = Vec::new();

        for file in files {
            let path = file.as_ref().to_path_buf();
            let day = day_from_path(&path);
            if let Some(other) = seen.insert(day.clone(), path.clone()) {
                return Err(Error::config(format!(
                    "day id '{day}' is shared by {} and {}",
                    other.display(),
                    path.display()
                )));
            }
            if self.skip_existing && self.exporter.outputs_exist(&day) {
                log::debug!("Skipping {day}: outputs exist");
                skipped.push(day);
                continue;
            }
            jobs.push(Job::new(day, path));
        }

        log::info!(
            "Dispatching {} day(s), {} skipped as already exported",
            jobs.len(),
            skipped.len()
        );

        let mut manifest = self.runner.run(&jobs, |job| self.process_day(job))?;
        for (record, job) in manifest.records.iter_mut().zip(&jobs) {
            record.input = Some(job.input.display().to_string());
        }
        manifest.skipped = skipped;
        Ok(manifest)
    }

    fn process_day(&self, job: &Job<PathBuf>) -> Result<PipelineOutput> {
        let output = self.pipeline.process_file(self.source.as_ref(), &job.input)?;
        self.exporter.export_day(&job.id, &output)?;
        Ok(output)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Day identifier of a day file: its file name up to the first dot.
///
/// - `/data/20100320.csv` → `20100320`
/// - `2010-03-20.tar.gz` → `2010-03-20`
pub fn day_from_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.split('.').next())
        .filter(|stem| !stem.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

/// Day files in `dir` with the given extension, sorted by name.
pub fn discover_day_files<P: AsRef<Path>>(dir: P, extension: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir.as_ref())? {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(extension) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

// ============================================================================
// Tests
// ============================================================================
