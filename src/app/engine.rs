// logfacts - app/engine.rs
//
// The engine context: owns configuration, the log type catalog, the fact
// store, the optional write queue, the file permit and the progress sink.
// Components borrow what they need from it; nothing is global.

use crate::app::catalog::LogTypeCatalog;
use crate::app::coordinator::{ParseCoordinator, ParseGate, ParseSettings};
use crate::app::progress::{ProgressSink, TracingProgress};
use crate::app::projects;
use crate::app::write_queue::WriteQueue;
use crate::core::discovery::{discover_files, DiscoveryConfig};
use crate::core::logtype::create_table_statements;
use crate::core::model::{LogFile, LogFileSummary, LogType, ParseProject};
use crate::core::store::{FactStore, RetryPolicy, RetryingStore};
use crate::platform::config::AppConfig;
use crate::platform::fs::{FsLineSource, LineSource};
use crate::util::constants;
use crate::util::error::{LogFactsError, ParseError, StoreError};
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Engine tuning, usually derived from `AppConfig`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub parse: ParseSettings,
    /// Files parsed at the same time across the engine.
    pub max_concurrent_files: usize,
    pub discovery: DiscoveryConfig,
    /// Queue fact statements and write them in batches.
    pub batch_writes: bool,
    pub batch_size: usize,
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parse: ParseSettings::default(),
            max_concurrent_files: constants::DEFAULT_MAX_CONCURRENT_FILES,
            discovery: DiscoveryConfig::default(),
            batch_writes: false,
            batch_size: constants::DEFAULT_BATCH_SIZE,
            retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        let mut discovery = DiscoveryConfig {
            max_depth: config.max_depth,
            max_files: config.max_files,
            ..Default::default()
        };
        if let Some(patterns) = &config.exclude_patterns {
            discovery.exclude_patterns = patterns.clone();
        }

        Self {
            parse: ParseSettings {
                workers: config.workers,
                sequential_threshold: config.sequential_threshold,
                progress_interval: config.progress_interval,
                claim_policy: config.claim_policy,
            },
            max_concurrent_files: config.max_concurrent_files,
            discovery,
            batch_writes: config.batch_writes,
            batch_size: config.batch_size,
            retry: RetryPolicy {
                max_attempts: config.write_attempts,
                initial_delay: Duration::from_millis(config.write_retry_delay_ms),
                max_delay: Duration::from_millis(constants::MAX_WRITE_RETRY_DELAY_MS),
            },
        }
    }
}

/// Result of reconciling a project's registered files with the disk.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Newly registered files.
    pub added: usize,
    /// Registered files that no longer exist and were deleted with their facts.
    pub removed: usize,
    /// Matching files found before the `max_files` cap.
    pub total_found: usize,
    pub warnings: Vec<String>,
}

/// Outcome of parsing one file of a project.
#[derive(Debug)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub result: Result<LogFileSummary, ParseError>,
}

/// Outcome of parsing a whole project.
#[derive(Debug, Default)]
pub struct ProjectReport {
    pub sync: SyncReport,
    /// One entry per file, in project file order.
    pub files: Vec<FileOutcome>,
}

impl ProjectReport {
    pub fn total_facts(&self) -> u64 {
        self.succeeded().map(|s| s.facts).sum()
    }

    pub fn total_errors(&self) -> u64 {
        self.succeeded().map(|s| s.errors).sum()
    }

    pub fn failed(&self) -> usize {
        self.files.iter().filter(|f| f.result.is_err()).count()
    }

    fn succeeded(&self) -> impl Iterator<Item = &LogFileSummary> {
        self.files.iter().filter_map(|f| f.result.as_ref().ok())
    }
}

pub struct Engine {
    config: EngineConfig,
    catalog: LogTypeCatalog,
    store: Arc<dyn FactStore>,
    queue: Option<WriteQueue>,
    gate: ParseGate,
    source: Arc<dyn LineSource>,
    progress: Arc<dyn ProgressSink>,
    /// Open projects by (log type, location). One instance per project, so
    /// every handle shares the same fact counter.
    projects: Mutex<HashMap<ProjectKey, Arc<ParseProject>>>,
}

type ProjectKey = (String, PathBuf);

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("log_types", &self.catalog.len())
            .field("batched", &self.queue.is_some())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Wrap `store` with retries, create the bookkeeping tables and start the
    /// write queue when batching is enabled.
    pub fn new(
        config: EngineConfig,
        catalog: LogTypeCatalog,
        store: Arc<dyn FactStore>,
    ) -> Result<Self, StoreError> {
        let store: Arc<dyn FactStore> = Arc::new(RetryingStore::new(store, config.retry));
        projects::ensure_schema(store.as_ref())?;

        let queue = config
            .batch_writes
            .then(|| WriteQueue::start(Arc::clone(&store), config.batch_size));

        tracing::info!(
            workers = config.parse.workers,
            max_concurrent_files = config.max_concurrent_files,
            batch_writes = config.batch_writes,
            claim_policy = ?config.parse.claim_policy,
            "Engine ready"
        );

        Ok(Self {
            gate: ParseGate::new(config.max_concurrent_files),
            source: Arc::new(FsLineSource {
                large_file_threshold: config.discovery.large_file_threshold,
            }),
            progress: Arc::new(TracingProgress),
            projects: Mutex::new(HashMap::new()),
            config,
            catalog,
            store,
            queue,
        })
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_line_source(mut self, source: Arc<dyn LineSource>) -> Self {
        self.source = source;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &LogTypeCatalog {
        &self.catalog
    }

    pub fn store(&self) -> &dyn FactStore {
        self.store.as_ref()
    }

    fn coordinator(&self) -> ParseCoordinator<'_> {
        ParseCoordinator {
            settings: self.config.parse,
            gate: &self.gate,
            store: self.store.as_ref(),
            queue: self.queue.as_ref(),
            source: self.source.as_ref(),
            progress: self.progress.as_ref(),
        }
    }

    fn log_type_of(&self, project: &ParseProject) -> Result<Arc<LogType>, LogFactsError> {
        Ok(self.catalog.require(&project.log_type)?)
    }

    fn open_projects(&self) -> MutexGuard<'_, HashMap<ProjectKey, Arc<ParseProject>>> {
        self.projects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Find or create the project for (`log_type`, `location`) and make sure
    /// the log type's fact tables exist. Repeated calls return the same
    /// instance.
    pub fn open_project(
        &self,
        log_type: &str,
        location: &Path,
    ) -> Result<Arc<ParseProject>, LogFactsError> {
        let log_type = self.catalog.require(log_type)?;
        let location = normalize_location(location);
        let mut open = self.open_projects();
        if let Some(project) = open.get(&(log_type.name.clone(), location.clone())) {
            return Ok(Arc::clone(project));
        }

        for statement in create_table_statements(&log_type) {
            self.store.execute_write(&statement)?;
        }
        let project = Arc::new(projects::open_project(
            self.store.as_ref(),
            &log_type,
            &location,
        )?);
        open.insert((log_type.name.clone(), location), Arc::clone(&project));
        Ok(project)
    }

    /// The existing project for (`log_type`, `location`), if any.
    pub fn find_project(
        &self,
        log_type: &str,
        location: &Path,
    ) -> Result<Option<Arc<ParseProject>>, LogFactsError> {
        let log_type = self.catalog.require(log_type)?;
        let location = normalize_location(location);
        let mut open = self.open_projects();
        if let Some(project) = open.get(&(log_type.name.clone(), location.clone())) {
            return Ok(Some(Arc::clone(project)));
        }

        let Some(project) = projects::find_project(self.store.as_ref(), &log_type, &location)?
        else {
            return Ok(None);
        };
        let project = Arc::new(project);
        open.insert((log_type.name.clone(), location), Arc::clone(&project));
        Ok(Some(project))
    }

    /// Register newly discovered files and drop registered files that have
    /// disappeared from disk.
    pub fn sync_files(&self, project: &ParseProject) -> Result<SyncReport, LogFactsError> {
        let log_type = self.log_type_of(project)?;
        let discovery = discover_files(
            &project.location,
            &log_type.file_pattern,
            log_type.scope,
            &self.config.discovery,
        )?;

        let mut report = SyncReport {
            total_found: discovery.total_found,
            warnings: discovery.warnings,
            ..Default::default()
        };

        for found in &discovery.files {
            if project.file_by_path(&found.path).is_none() {
                projects::register_file(
                    self.store.as_ref(),
                    project,
                    &found.path,
                    found.size,
                    found.modified,
                )?;
                report.added += 1;
            }
        }

        for file in project.files() {
            if !file.path.exists() {
                projects::delete_file(self.store.as_ref(), &log_type, project, file.id)?;
                report.removed += 1;
            }
        }

        tracing::info!(
            project = project.id,
            found = report.total_found,
            added = report.added,
            removed = report.removed,
            "Project files synchronised"
        );
        Ok(report)
    }

    /// Parse one registered file.
    pub fn parse_file(
        &self,
        project: &ParseProject,
        file: &LogFile,
    ) -> Result<LogFileSummary, LogFactsError> {
        let log_type = self.log_type_of(project)?;
        Ok(self.coordinator().parse(project, &log_type, file)?)
    }

    /// Synchronise the project's files, then parse all of them concurrently.
    /// A failed file does not stop the others.
    pub fn parse_project(&self, project: &ParseProject) -> Result<ProjectReport, LogFactsError> {
        let sync = self.sync_files(project)?;
        let log_type = self.log_type_of(project)?;
        let coordinator = self.coordinator();

        let files = project.files();
        tracing::info!(project = project.id, files = files.len(), "Parsing project");

        let outcomes: Vec<FileOutcome> = files
            .par_iter()
            .map(|file| FileOutcome {
                path: file.path.clone(),
                result: coordinator.parse(project, &log_type, file),
            })
            .collect();

        let report = ProjectReport {
            sync,
            files: outcomes,
        };
        tracing::info!(
            project = project.id,
            facts = report.total_facts(),
            errors = report.total_errors(),
            failed = report.failed(),
            "Project parsed"
        );
        Ok(report)
    }

    /// Delete the project with all of its files and facts.
    pub fn delete_project(&self, project: &ParseProject) -> Result<(), LogFactsError> {
        let log_type = self.log_type_of(project)?;
        let mut open = self.open_projects();
        projects::delete_project(self.store.as_ref(), &log_type, project)?;
        open.remove(&(log_type.name.clone(), project.location.clone()));
        Ok(())
    }
}

/// Absolute form of a project location, so one location maps to one project
/// however it was spelled.
fn normalize_location(location: &Path) -> PathBuf {
    std::fs::canonicalize(location).unwrap_or_else(|_| location.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::sqlite::SqliteFactStore;
    use std::fs;

    fn engine(config: EngineConfig) -> Engine {
        let (catalog, errors) = LogTypeCatalog::load(None);
        assert!(errors.is_empty());
        let store = Arc::new(SqliteFactStore::open_in_memory().unwrap());
        Engine::new(config, catalog, store).unwrap()
    }

    #[test]
    fn test_from_app_config_copies_limits() {
        let app = AppConfig {
            workers: 8,
            max_files: 12,
            write_attempts: 5,
            exclude_patterns: Some(vec!["*.old".to_string()]),
            ..Default::default()
        };
        let config = EngineConfig::from_app_config(&app);
        assert_eq!(config.parse.workers, 8);
        assert_eq!(config.discovery.max_files, 12);
        assert_eq!(config.discovery.exclude_patterns, vec!["*.old".to_string()]);
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn test_sync_adds_and_removes_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.trc"), "").unwrap();
        fs::write(dir.path().join("b.trace"), "").unwrap();
        fs::write(dir.path().join("c.log"), "").unwrap();

        let engine = engine(EngineConfig::default());
        let project = engine.open_project("compact-trace", dir.path()).unwrap();
        let first = engine.sync_files(&project).unwrap();
        assert_eq!(first.added, 2);
        assert_eq!(project.files().len(), 2);

        fs::remove_file(dir.path().join("a.trc")).unwrap();
        let second = engine.sync_files(&project).unwrap();
        assert_eq!((second.added, second.removed), (0, 1));
        assert_eq!(project.files().len(), 1);
    }

    #[test]
    fn test_unknown_log_type_is_rejected() {
        let engine = engine(EngineConfig::default());
        let err = engine.open_project("nope", Path::new(".")).unwrap_err();
        assert!(matches!(err, LogFactsError::Catalog(_)));
    }

    #[test]
    fn test_find_project_before_any_parse() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(EngineConfig::default());
        assert!(engine
            .find_project("app-events", dir.path())
            .unwrap()
            .is_none());
        let opened = engine.open_project("app-events", dir.path()).unwrap();
        let found = engine.find_project("app-events", dir.path()).unwrap().unwrap();
        assert_eq!(opened.id, found.id);
        assert!(Arc::ptr_eq(&opened, &found));
    }

    #[test]
    fn test_two_handles_share_one_fact_counter() {
        let dir = tempfile::tempdir().unwrap();
        let line = "20190531,172355,44 ERR 1 disk full\n";
        fs::write(dir.path().join("a.trc"), line.repeat(2)).unwrap();

        let engine = engine(EngineConfig::default());
        let first = engine.open_project("compact-trace", dir.path()).unwrap();
        let second = engine.open_project("Compact-Trace", dir.path()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        engine.sync_files(&first).unwrap();
        let a = first.files().pop().unwrap();
        engine.parse_file(&first, &a).unwrap();

        fs::write(dir.path().join("b.trc"), line.repeat(3)).unwrap();
        engine.sync_files(&second).unwrap();
        let b = second
            .file_by_path(&dir.path().canonicalize().unwrap().join("b.trc"))
            .unwrap();
        engine.parse_file(&second, &b).unwrap();

        let rows = engine
            .store()
            .execute_query("SELECT COUNT(DISTINCT Id), MAX(Id) FROM TraceFacts")
            .unwrap();
        assert_eq!(rows[0][0].as_i64(), Some(5));
        assert_eq!(rows[0][1].as_i64(), Some(5));
    }

    #[test]
    fn test_delete_forgets_the_open_project() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(EngineConfig::default());
        let opened = engine.open_project("app-events", dir.path()).unwrap();
        engine.delete_project(&opened).unwrap();
        assert!(engine
            .find_project("app-events", dir.path())
            .unwrap()
            .is_none());
        let reopened = engine.open_project("app-events", dir.path()).unwrap();
        assert!(!Arc::ptr_eq(&opened, &reopened));
    }
}
