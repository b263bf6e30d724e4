// logfacts - app/coordinator.rs
//
// One file's parse pass:
//   1. wait for a file permit (engine-wide bound on concurrently parsed files)
//   2. delete the file's previously stored facts
//   3. load the file and split it into lines
//   4. split the line range into partitions and run one scoped thread each
//   5. barrier: join every partition, then flush the write queue if any
//   6. release the permit, record parse metadata, persist it, report
//
// A failure anywhere in 3-5 is recorded as the file's last error and the
// parse stamp goes back to `Never`. Partition workers share an abort flag so
// siblings of a failed partition stop at their next line.

use crate::app::progress::ProgressSink;
use crate::app::projects;
use crate::app::registrar::{FactRegistrar, FactSink};
use crate::app::write_queue::WriteQueue;
use crate::core::matcher::{build_fact, PatternMatcher};
use crate::core::model::{
    Attributes, ClaimPolicy, LogFile, LogFileSummary, LogType, ParseProject, ParseStamp,
};
use crate::core::partition::partition;
use crate::core::store::FactStore;
use crate::core::timestamp::{derive_file_attributes, format_instant, TimestampResolver};
use crate::platform::fs::{split_lines, LineSource};
use crate::util::constants;
use crate::util::error::ParseError;
use chrono::{DateTime, Utc};
use std::ops::Range;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Instant;

// =============================================================================
// File permit
// =============================================================================

/// Counting semaphore bounding how many files are parsed at the same time.
#[derive(Debug)]
pub struct ParseGate {
    available: Mutex<usize>,
    released: Condvar,
    capacity: usize,
}

impl ParseGate {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            available: Mutex::new(capacity),
            released: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits not currently held.
    pub fn available(&self) -> usize {
        *self.lock()
    }

    /// Block until a permit is free. The permit is returned on drop.
    pub fn acquire(&self) -> GatePermit<'_> {
        let mut available = self.lock();
        while *available == 0 {
            available = self
                .released
                .wait(available)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        *available -= 1;
        GatePermit { gate: self }
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.available
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A held file permit.
#[derive(Debug)]
pub struct GatePermit<'g> {
    gate: &'g ParseGate,
}

impl Drop for GatePermit<'_> {
    fn drop(&mut self) {
        *self.gate.lock() += 1;
        self.gate.released.notify_one();
    }
}

// =============================================================================
// Coordinator
// =============================================================================

/// Per-file parse tuning.
#[derive(Debug, Clone, Copy)]
pub struct ParseSettings {
    /// Partition workers per file.
    pub workers: usize,
    /// Files with fewer lines run as a single partition.
    pub sequential_threshold: usize,
    /// A progress step is reported every this many lines.
    pub progress_interval: u64,
    pub claim_policy: ClaimPolicy,
}

impl Default for ParseSettings {
    fn default() -> Self {
        Self {
            workers: constants::DEFAULT_WORKERS,
            sequential_threshold: constants::DEFAULT_SEQUENTIAL_THRESHOLD,
            progress_interval: constants::DEFAULT_PROGRESS_INTERVAL,
            claim_policy: ClaimPolicy::default(),
        }
    }
}

/// Runs parse passes against borrowed engine resources.
#[derive(Clone, Copy)]
pub struct ParseCoordinator<'e> {
    pub settings: ParseSettings,
    pub gate: &'e ParseGate,
    pub store: &'e dyn FactStore,
    /// When set, fact statements are queued and flushed at the barrier.
    pub queue: Option<&'e WriteQueue>,
    pub source: &'e dyn LineSource,
    pub progress: &'e dyn ProgressSink,
}

impl ParseCoordinator<'_> {
    /// Parse `file` of `project` with the rules of `log_type`.
    ///
    /// The returned error has already been recorded on the file and
    /// persisted as its last error.
    pub fn parse(
        &self,
        project: &ParseProject,
        log_type: &LogType,
        file: &LogFile,
    ) -> Result<LogFileSummary, ParseError> {
        let permit = self.gate.acquire();
        let started = Instant::now();
        tracing::debug!(file = %file.path.display(), "Parse permit acquired");

        let outcome = self.run_pass(project, log_type, file);

        drop(permit);
        let duration = started.elapsed();

        file.update_meta(|meta| {
            meta.duration = duration;
            match &outcome {
                Ok(()) => {
                    meta.parsed = ParseStamp::At(Utc::now());
                    meta.last_error = None;
                }
                Err(e) => {
                    meta.parsed = ParseStamp::Never;
                    meta.last_error = Some(e.to_string());
                }
            }
        });

        let saved = projects::save_file(self.store, file).map_err(|source| ParseError::Persist {
            file: file.path.clone(),
            source,
        });

        match (outcome, saved) {
            (Ok(()), Ok(())) => {
                tracing::info!(
                    file = %file.path.display(),
                    facts = file.facts(),
                    errors = file.errors(),
                    duration_ms = duration.as_millis() as u64,
                    "File parsed"
                );
                self.progress.completed(&file.path);
                Ok(file.summary())
            }
            (Err(e), saved) => {
                if let Err(persist) = saved {
                    tracing::warn!(error = %persist, "Could not record parse failure");
                }
                tracing::error!(file = %file.path.display(), error = %e, "File parse failed");
                self.progress.error(&file.path, &e.to_string());
                Err(e)
            }
            (Ok(()), Err(e)) => {
                tracing::error!(file = %file.path.display(), error = %e, "Parse metadata not saved");
                self.progress.error(&file.path, &e.to_string());
                Err(e)
            }
        }
    }

    fn run_pass(
        &self,
        project: &ParseProject,
        log_type: &LogType,
        file: &LogFile,
    ) -> Result<(), ParseError> {
        let path = file.path.as_path();
        refresh_file_meta(file);

        let deleted = projects::delete_file_facts(self.store, log_type, project.id, file.id)
            .map_err(|source| ParseError::Persist {
                file: path.to_path_buf(),
                source,
            })?;
        if deleted > 0 {
            tracing::debug!(file = %path.display(), deleted, "Previous facts deleted");
        }

        let content = self.source.load(path).map_err(|source| ParseError::Read {
            file: path.to_path_buf(),
            source,
        })?;
        let lines = split_lines(&content);

        let mut attributes = Attributes::default();
        for (key, value) in derive_file_attributes(file.file_name()) {
            attributes.insert(key, value);
        }
        file.begin_pass(attributes.clone());

        let resolver = log_type.resolver().map_err(|source| ParseError::Timestamp {
            file: path.to_path_buf(),
            line_number: 0,
            raw_timestamp: String::new(),
            source,
        })?;

        let total = lines.len() as u64;
        self.progress.setup(path, total);

        let ranges = partition(
            lines.len(),
            self.settings.workers,
            self.settings.sequential_threshold,
        );
        tracing::debug!(
            file = %path.display(),
            lines = total,
            partitions = ranges.len(),
            "Partitioned"
        );

        let created = format_instant(&Utc::now().naive_utc());
        let pass = Pass {
            lines: &lines,
            total,
            path,
            matcher: PatternMatcher::new(&log_type.patterns, self.settings.claim_policy),
            resolver,
            registrar: FactRegistrar {
                project,
                log_type,
                file,
                attributes: &attributes,
                sink: match self.queue {
                    Some(queue) => FactSink::Queued(queue),
                    None => FactSink::Direct(self.store),
                },
                created: &created,
            },
            progress: self.progress,
            interval: self.settings.progress_interval.max(1),
            processed: Mutex::new(0),
            abort: AtomicBool::new(false),
        };

        let partitioned = pass.run_all(ranges);

        // Drain even after a failure so the queue holds nothing for this file.
        let flushed = match self.queue {
            Some(queue) => queue.flush(file.id).map_err(|source| ParseError::Persist {
                file: path.to_path_buf(),
                source,
            }),
            None => Ok(()),
        };

        pass.report_remainder();
        partitioned.and(flushed)
    }
}

impl std::fmt::Debug for ParseCoordinator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParseCoordinator")
            .field("settings", &self.settings)
            .field("gate", &self.gate)
            .field("batched", &self.queue.is_some())
            .finish_non_exhaustive()
    }
}

/// Size and modification time as they are now on disk.
fn refresh_file_meta(file: &LogFile) {
    match std::fs::metadata(&file.path) {
        Ok(md) => file.update_meta(|meta| {
            meta.size = md.len();
            meta.modified = md.modified().ok().map(DateTime::<Utc>::from);
        }),
        Err(e) => {
            tracing::debug!(file = %file.path.display(), error = %e, "Metadata unavailable");
        }
    }
}

/// State shared by the partition workers of one pass.
struct Pass<'a> {
    lines: &'a [&'a str],
    total: u64,
    path: &'a Path,
    matcher: PatternMatcher<'a>,
    resolver: &'a TimestampResolver,
    registrar: FactRegistrar<'a>,
    progress: &'a dyn ProgressSink,
    interval: u64,
    /// Lines processed across all partitions. The per-file progress lock.
    processed: Mutex<u64>,
    abort: AtomicBool,
}

impl Pass<'_> {
    /// Run every partition and wait for all of them. The first failure wins.
    fn run_all(&self, ranges: Vec<Range<usize>>) -> Result<(), ParseError> {
        if let [only] = ranges.as_slice() {
            return self.run(only.clone());
        }

        std::thread::scope(|scope| {
            let handles: Vec<_> = ranges
                .into_iter()
                .map(|range| scope.spawn(move || self.run(range)))
                .collect();

            let mut first_error = None;
            for (partition, handle) in handles.into_iter().enumerate() {
                let result = handle.join().unwrap_or_else(|_| {
                    self.abort.store(true, Ordering::SeqCst);
                    Err(ParseError::PartitionPanicked {
                        file: self.path.to_path_buf(),
                        partition,
                    })
                });
                if let Err(e) = result {
                    first_error.get_or_insert(e);
                }
            }
            first_error.map_or(Ok(()), Err)
        })
    }

    fn run(&self, range: Range<usize>) -> Result<(), ParseError> {
        for index in range {
            if self.abort.load(Ordering::Relaxed) {
                tracing::debug!(file = %self.path.display(), line = index + 1, "Partition aborted");
                return Ok(());
            }
            if let Err(e) = self.process_line(index) {
                self.abort.store(true, Ordering::SeqCst);
                return Err(e);
            }
            self.advance();
        }
        Ok(())
    }

    fn process_line(&self, index: usize) -> Result<(), ParseError> {
        let line = self.lines[index];
        let line_number = index as u64 + 1;
        let evaluated = self.matcher.evaluate(line);

        for _ in 0..evaluated.misses {
            self.registrar.file.add_error();
        }

        for matched in evaluated.matches {
            let raw_timestamp = matched.values.first().cloned().unwrap_or_default();
            let mut fact = build_fact(
                matched,
                line_number,
                line,
                self.resolver,
                self.registrar.attributes,
            )
            .map_err(|source| ParseError::Timestamp {
                file: self.path.to_path_buf(),
                line_number,
                raw_timestamp,
                source,
            })?;

            self.registrar
                .register(&mut fact)
                .map_err(|source| ParseError::Store {
                    file: self.path.to_path_buf(),
                    line_number,
                    source,
                })?;
        }
        Ok(())
    }

    fn advance(&self) {
        let mut processed = self
            .processed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *processed += 1;
        if *processed % self.interval == 0 {
            self.progress.step(
                self.path,
                self.interval,
                &format!("{} of {} lines", *processed, self.total),
            );
        }
    }

    /// Report lines processed since the last full interval.
    fn report_remainder(&self) {
        let processed = *self
            .processed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let remainder = processed % self.interval;
        if remainder > 0 {
            self.progress.step(
                self.path,
                remainder,
                &format!("{processed} of {} lines", self.total),
            );
        }
    }
}
