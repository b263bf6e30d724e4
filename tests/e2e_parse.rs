// logfacts - tests/e2e_parse.rs
//
// End-to-end tests for the parse pipeline.
//
// These tests exercise the real filesystem, the embedded log types, real
// walkdir discovery, real timestamp resolution and a real SQLite store:
// from raw log files on disk to fact rows with resolved times.

use logfacts::app::catalog::LogTypeCatalog;
use logfacts::app::engine::{Engine, EngineConfig};
use logfacts::app::progress::{ChannelProgress, ParseProgress};
use logfacts::core::partition::partition;
use logfacts::core::store::{FactStore, Value};
use logfacts::platform::sqlite::SqliteFactStore;
use logfacts::util::error::{LogFactsError, ParseError};
use std::fs;
use std::path::Path;
use std::sync::Arc;

// =============================================================================
// Helpers
// =============================================================================

fn engine_with(config: EngineConfig, store: Arc<SqliteFactStore>) -> Engine {
    let (catalog, errors) = LogTypeCatalog::load(None);
    assert!(errors.is_empty(), "built-in log types failed: {errors:?}");
    Engine::new(config, catalog, store).expect("engine starts")
}

fn memory_engine(config: EngineConfig) -> Engine {
    engine_with(
        config,
        Arc::new(SqliteFactStore::open_in_memory().expect("in-memory store")),
    )
}

fn query(engine: &Engine, sql: &str) -> Vec<Vec<Value>> {
    engine.store().execute_query(sql).expect("query runs")
}

fn count(engine: &Engine, sql: &str) -> i64 {
    query(engine, sql)[0][0].as_i64().expect("count is an integer")
}

fn trace_lines(count: usize) -> String {
    (0..count)
        .map(|i| format!("20190531,172355,44 ERR {i} failure number {i}"))
        .collect::<Vec<_>>()
        .join("\n")
}

const APP_EVENTS: &str = "\
2024-01-15 14:30:22.123 ERROR [db] 1205 Deadlock victim
2024-01-15 14:30:23.004 WARN  [http] Slow response 2300 ms
2024-01-15 14:30:24.000 WARN  [cache] eviction storm
2024-01-15 14:30:25.000 INFO  [http] GET /health
2024-01-15 14:30:26.000 ERROR without a component tag
";

// =============================================================================
// Parsing
// =============================================================================

/// Each built-in app-events pattern extracts its columns and resolves the
/// line's mask timestamp.
#[test]
fn e2e_app_events_facts_and_times() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("service.log"), APP_EVENTS).unwrap();

    let engine = memory_engine(EngineConfig::default());
    let project = engine.open_project("app-events", dir.path()).unwrap();
    let report = engine.parse_project(&project).unwrap();

    assert_eq!(report.files.len(), 1);
    assert_eq!(report.failed(), 0);
    // Three facts; the untagged ERROR line passes the filter but not the regex.
    assert_eq!(report.total_facts(), 3);
    assert_eq!(report.total_errors(), 1);

    let rows = query(
        &engine,
        "SELECT FactType, LineNo, LogTime, level, component, code, message, elapsed_ms \
         FROM AppEvents ORDER BY LineNo",
    );
    assert_eq!(rows.len(), 3);
    assert_eq!(
        rows[0],
        vec![
            Value::Text("error".into()),
            Value::Integer(1),
            Value::Text("2024-01-15T14:30:22.123".into()),
            Value::Text("ERROR".into()),
            Value::Text("db".into()),
            Value::Integer(1205),
            Value::Text("Deadlock victim".into()),
            Value::Null,
        ]
    );
    assert_eq!(rows[1][0], Value::Text("slow-response".into()));
    assert_eq!(rows[1][7], Value::Integer(2300));
    assert_eq!(rows[1][6], Value::Text("slow response".into()));
    assert_eq!(rows[2][0], Value::Text("warning".into()));
    assert_eq!(rows[2][6], Value::Text("eviction storm".into()));
}

/// `compactts` times land in the store normalised.
#[test]
fn e2e_compact_trace_time_is_normalised() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("node.trc"),
        "20190531,172355,44 ERR 42 disk full\n20190531,172356,02 OK  write committed\n",
    )
    .unwrap();

    let engine = memory_engine(EngineConfig::default());
    let project = engine.open_project("compact-trace", dir.path()).unwrap();
    engine.parse_project(&project).unwrap();

    let rows = query(&engine, "SELECT LogTime, code, message FROM TraceFacts");
    assert_eq!(
        rows,
        vec![vec![
            Value::Text("2019-05-31T17:23:55.440".into()),
            Value::Integer(42),
            Value::Text("disk full".into()),
        ]]
    );
}

/// Process logs take their date and process id from the file name and roll
/// over midnight relative to the process start.
#[test]
fn e2e_process_log_uses_file_name_context() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("worker_20240115_235950_4242.log"),
        "23:59:58.120 WARN cache miss ratio 0.42\n00:00:01.500 FATAL worker 3 exited\n",
    )
    .unwrap();
    // Not a process log name: ignored by discovery.
    fs::write(dir.path().join("notes.log"), "00:00:01.500 FATAL x\n").unwrap();

    let engine = memory_engine(EngineConfig::default());
    let project = engine.open_project("process-log", dir.path()).unwrap();
    let report = engine.parse_project(&project).unwrap();
    assert_eq!(report.files.len(), 1);

    let rows = query(
        &engine,
        "SELECT FactType, LogTime, message, ratio, processid FROM ProcessFacts ORDER BY LineNo",
    );
    assert_eq!(
        rows,
        vec![
            vec![
                Value::Text("cache-ratio".into()),
                Value::Text("2024-01-15T23:59:58.120".into()),
                Value::Text("cache miss ratio 0.42".into()),
                Value::Real(0.42),
                Value::Integer(4242),
            ],
            vec![
                Value::Text("fatal".into()),
                Value::Text("2024-01-16T00:00:01.500".into()),
                Value::Text("worker 3 exited".into()),
                Value::Null,
                Value::Integer(4242),
            ],
        ]
    );
}

/// 10,050 lines with four workers and a 10,000 line threshold: four
/// partitions, and every fact still gets a unique id.
#[test]
fn e2e_partitioned_file_ids_unique() {
    let ranges = partition(10_050, 4, 10_000);
    assert_eq!(ranges.len(), 4);
    assert_eq!(ranges.iter().map(|r| r.len()).sum::<usize>(), 10_050);
    for r in &ranges[..3] {
        assert_eq!(r.len() % 10, 0);
    }

    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("big.trc"), trace_lines(10_050)).unwrap();

    let mut config = EngineConfig::default();
    config.parse.workers = 4;
    config.parse.sequential_threshold = 10_000;
    let engine = memory_engine(config);
    let project = engine.open_project("compact-trace", dir.path()).unwrap();
    let report = engine.parse_project(&project).unwrap();

    assert_eq!(report.total_facts(), 10_050);
    assert_eq!(count(&engine, "SELECT COUNT(DISTINCT Id) FROM TraceFacts"), 10_050);
    assert_eq!(count(&engine, "SELECT MIN(Id) FROM TraceFacts"), 1);
    assert_eq!(count(&engine, "SELECT MAX(Id) FROM TraceFacts"), 10_050);
    assert_eq!(count(&engine, "SELECT COUNT(DISTINCT LineNo) FROM TraceFacts"), 10_050);
    assert_eq!(project.last_fact_id(), 10_050);
}

/// A second parse yields the same counts and replaces the stored rows.
#[test]
fn e2e_reparse_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("service.log"), APP_EVENTS).unwrap();
    fs::write(dir.path().join("other.log"), APP_EVENTS.repeat(20)).unwrap();

    let mut config = EngineConfig::default();
    config.parse.sequential_threshold = 10;
    let engine = memory_engine(config);
    let project = engine.open_project("app-events", dir.path()).unwrap();

    let first = engine.parse_project(&project).unwrap();
    let rows_after_first = count(&engine, "SELECT COUNT(*) FROM AppEvents");
    let second = engine.parse_project(&project).unwrap();
    let rows_after_second = count(&engine, "SELECT COUNT(*) FROM AppEvents");

    assert_eq!(first.total_facts(), second.total_facts());
    assert_eq!(first.total_errors(), second.total_errors());
    assert_eq!(rows_after_first, rows_after_second);
    assert_eq!(rows_after_second as u64, second.total_facts());
    assert_eq!(second.sync.added, 0);
}

/// A bad timestamp fails its file only, records the error and leaves the
/// file marked as never parsed.
#[test]
fn e2e_failed_file_records_last_error() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("good.trc"), trace_lines(20)).unwrap();
    fs::write(
        dir.path().join("bad.trc"),
        "20190531,172355,44 ERR 1 fine\n20191399,172355,44 ERR 2 bad month\n",
    )
    .unwrap();

    let (progress, rx) = ChannelProgress::channel();
    let engine = memory_engine(EngineConfig::default()).with_progress(Arc::new(progress));
    let project = engine.open_project("compact-trace", dir.path()).unwrap();
    let report = engine.parse_project(&project).unwrap();

    assert_eq!(report.failed(), 1);
    let failed = report.files.iter().find(|f| f.result.is_err()).unwrap();
    assert!(failed.path.ends_with("bad.trc"));
    assert!(matches!(
        failed.result,
        Err(ParseError::Timestamp { line_number: 2, .. })
    ));
    assert_eq!(report.total_facts(), 20);

    let bad = project
        .files()
        .into_iter()
        .find(|f| f.path.ends_with("bad.trc"))
        .unwrap();
    let summary = bad.summary();
    assert!(summary.parsed.is_none());
    assert!(summary.last_error.as_deref().unwrap().contains("line 2"));

    let stored = query(
        &engine,
        &format!("SELECT Parsed, LastError FROM LogFiles WHERE Id = {}", bad.id),
    );
    assert!(stored[0][0].is_null());
    assert!(stored[0][1].as_str().unwrap().contains("20191399,172355,44"));

    let errors: Vec<_> = rx
        .try_iter()
        .filter(|m| matches!(m, ParseProgress::Error { .. }))
        .collect();
    assert_eq!(errors.len(), 1);
}

/// Batched writes reach the store before the parse reports completion.
#[test]
fn e2e_batched_writes_are_complete() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.trc"), trace_lines(2_345)).unwrap();
    fs::write(dir.path().join("b.trc"), trace_lines(1_001)).unwrap();

    let mut config = EngineConfig::default();
    config.batch_writes = true;
    config.batch_size = 64;
    config.parse.sequential_threshold = 100;
    let engine = memory_engine(config);
    let project = engine.open_project("compact-trace", dir.path()).unwrap();
    let report = engine.parse_project(&project).unwrap();

    assert_eq!(report.failed(), 0);
    assert_eq!(report.total_facts(), 3_346);
    assert_eq!(count(&engine, "SELECT COUNT(*) FROM TraceFacts"), 3_346);
}

/// Fact ids continue from the stored maximum after a restart.
#[test]
fn e2e_ids_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let logs = dir.path().join("logs");
    fs::create_dir(&logs).unwrap();
    fs::write(logs.join("a.trc"), trace_lines(30)).unwrap();
    let db = dir.path().join("facts.db");

    {
        let engine = engine_with(
            EngineConfig::default(),
            Arc::new(SqliteFactStore::open(&db).unwrap()),
        );
        let project = engine.open_project("compact-trace", &logs).unwrap();
        engine.parse_project(&project).unwrap();
        assert_eq!(project.last_fact_id(), 30);
    }

    fs::write(logs.join("b.trc"), trace_lines(5)).unwrap();
    let engine = engine_with(
        EngineConfig::default(),
        Arc::new(SqliteFactStore::open(&db).unwrap()),
    );
    let project = engine.find_project("compact-trace", &logs).unwrap().unwrap();
    assert_eq!(project.last_fact_id(), 30);
    assert_eq!(project.files().len(), 1);
    assert_eq!(project.files()[0].summary().facts, 30);

    let report = engine.parse_project(&project).unwrap();
    assert_eq!(report.sync.added, 1);
    assert_eq!(count(&engine, "SELECT COUNT(*) FROM TraceFacts"), 35);
    assert_eq!(count(&engine, "SELECT MIN(Id) FROM TraceFacts"), 31);
}

/// Deleting a project removes its facts and files but not other projects'.
#[test]
fn e2e_delete_project_cascades() {
    let dir = tempfile::tempdir().unwrap();
    let (a, b) = (dir.path().join("a"), dir.path().join("b"));
    for d in [&a, &b] {
        fs::create_dir(d).unwrap();
        fs::write(d.join("x.trc"), trace_lines(10)).unwrap();
    }

    let engine = memory_engine(EngineConfig::default());
    let pa = engine.open_project("compact-trace", &a).unwrap();
    let pb = engine.open_project("compact-trace", &b).unwrap();
    engine.parse_project(&pa).unwrap();
    engine.parse_project(&pb).unwrap();
    assert_eq!(count(&engine, "SELECT COUNT(*) FROM TraceFacts"), 20);

    engine.delete_project(&pa).unwrap();
    assert_eq!(count(&engine, "SELECT COUNT(*) FROM TraceFacts"), 10);
    assert_eq!(count(&engine, "SELECT COUNT(*) FROM LogFiles"), 1);
    assert!(engine.find_project("compact-trace", &a).unwrap().is_none());
    assert!(engine.find_project("compact-trace", &b).unwrap().is_some());
}

/// A project location that does not exist fails discovery.
#[test]
fn e2e_missing_location_is_a_discovery_error() {
    let engine = memory_engine(EngineConfig::default());
    let project = engine
        .open_project("compact-trace", Path::new("/nonexistent/logfacts-e2e"))
        .unwrap();
    let err = engine.parse_project(&project).unwrap_err();
    assert!(
        matches!(err, LogFactsError::Discovery(_)),
        "expected a discovery error, got {err:?}"
    );
}
