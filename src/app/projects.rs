// logfacts - app/projects.rs
//
// Persistence of parse projects and their log files through the fact store.
//
// Two bookkeeping tables (`Projects`, `LogFiles`) live next to the fact
// tables. All statements are rendered with inlined, quoted values, the same
// way fact inserts are.

use crate::core::model::{LogFile, LogType, ParseMeta, ParseProject, ParseStamp};
use crate::core::store::{FactStore, Row, Value};
use crate::core::template::quote;
use crate::util::constants::{LOG_FILES_TABLE, PROJECTS_TABLE};
use crate::util::error::StoreError;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Create the bookkeeping tables if they do not exist.
pub fn ensure_schema(store: &dyn FactStore) -> Result<(), StoreError> {
    store.execute_write(&format!(
        "CREATE TABLE IF NOT EXISTS {PROJECTS_TABLE} (\
         Id INTEGER PRIMARY KEY, \
         LogType TEXT NOT NULL, \
         Location TEXT NOT NULL, \
         Created TEXT, \
         UNIQUE (LogType, Location))"
    ))?;
    store.execute_write(&format!(
        "CREATE TABLE IF NOT EXISTS {LOG_FILES_TABLE} (\
         Id INTEGER PRIMARY KEY, \
         ProjectId INTEGER NOT NULL, \
         Path TEXT NOT NULL, \
         Size INTEGER, \
         Modified TEXT, \
         Parsed TEXT, \
         DurationMs INTEGER, \
         Facts INTEGER, \
         Errors INTEGER, \
         LastError TEXT, \
         UNIQUE (ProjectId, Path))"
    ))?;
    Ok(())
}

fn path_text(path: &Path) -> String {
    quote(&path.to_string_lossy())
}

fn time_text(time: Option<DateTime<Utc>>) -> String {
    time.map_or_else(|| "null".to_string(), |t| quote(&t.to_rfc3339()))
}

fn parse_time(value: &Value) -> Option<DateTime<Utc>> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

fn cell(row: &Row, index: usize) -> &Value {
    row.get(index).unwrap_or(&Value::Null)
}

/// Highest fact id stored for `project_id` across every table of the log type.
pub fn last_fact_id(
    store: &dyn FactStore,
    log_type: &LogType,
    project_id: i64,
) -> Result<u64, StoreError> {
    let filter = format!("ProjectId = {project_id}");
    let mut last = 0u64;
    for table in log_type.tables() {
        let max = store.max_value(table, "Id", &filter)?;
        if let Some(id) = max.as_i64() {
            last = last.max(u64::try_from(id).unwrap_or(0));
        }
    }
    Ok(last)
}

/// Look up the project for (`log_type`, `location`) and load its files.
pub fn find_project(
    store: &dyn FactStore,
    log_type: &LogType,
    location: &Path,
) -> Result<Option<ParseProject>, StoreError> {
    let rows = store.execute_query(&format!(
        "SELECT Id FROM {PROJECTS_TABLE} WHERE LogType = {} AND Location = {}",
        quote(&log_type.name),
        path_text(location)
    ))?;
    let Some(id) = rows.first().and_then(|r| cell(r, 0).as_i64()) else {
        return Ok(None);
    };

    let project = ParseProject::new(
        id,
        log_type.name.clone(),
        location.to_path_buf(),
        last_fact_id(store, log_type, id)?,
    );
    for file in load_files(store, id)? {
        project.add_file(Arc::new(file));
    }

    tracing::debug!(
        project = id,
        files = project.files().len(),
        last_fact_id = project.last_fact_id(),
        "Project loaded"
    );
    Ok(Some(project))
}

/// Find the project for (`log_type`, `location`), creating it if needed.
pub fn open_project(
    store: &dyn FactStore,
    log_type: &LogType,
    location: &Path,
) -> Result<ParseProject, StoreError> {
    if let Some(project) = find_project(store, log_type, location)? {
        return Ok(project);
    }

    store.execute_write(&format!(
        "INSERT INTO {PROJECTS_TABLE} (LogType, Location, Created) VALUES ({}, {}, {})",
        quote(&log_type.name),
        path_text(location),
        time_text(Some(Utc::now()))
    ))?;
    tracing::info!(
        log_type = %log_type.name,
        location = %location.display(),
        "Project created"
    );

    // Facts may survive from a project row deleted by hand; seed from them.
    find_project(store, log_type, location)?.ok_or_else(|| StoreError::Statement {
        statement: format!("SELECT Id FROM {PROJECTS_TABLE}"),
        source: rusqlite::Error::QueryReturnedNoRows,
    })
}

fn load_files(store: &dyn FactStore, project_id: i64) -> Result<Vec<LogFile>, StoreError> {
    let rows = store.execute_query(&format!(
        "SELECT Id, Path, Size, Modified, Parsed, DurationMs, Facts, Errors, LastError \
         FROM {LOG_FILES_TABLE} WHERE ProjectId = {project_id} ORDER BY Id"
    ))?;

    let files = rows
        .iter()
        .filter_map(|row| {
            let id = cell(row, 0).as_i64()?;
            let path = PathBuf::from(cell(row, 1).as_str()?);
            let meta = ParseMeta {
                size: cell(row, 2).as_i64().unwrap_or(0).max(0) as u64,
                modified: parse_time(cell(row, 3)),
                parsed: parse_time(cell(row, 4)).map_or(ParseStamp::Never, ParseStamp::At),
                duration: Duration::from_millis(cell(row, 5).as_i64().unwrap_or(0).max(0) as u64),
                last_error: cell(row, 8).as_str().map(str::to_string),
            };
            let file = LogFile::new(id, path, meta);
            file.restore_counts(
                cell(row, 6).as_i64().unwrap_or(0).max(0) as u64,
                cell(row, 7).as_i64().unwrap_or(0).max(0) as u64,
            );
            Some(file)
        })
        .collect();
    Ok(files)
}

/// Register a newly discovered file with the project.
pub fn register_file(
    store: &dyn FactStore,
    project: &ParseProject,
    path: &Path,
    size: u64,
    modified: Option<DateTime<Utc>>,
) -> Result<Arc<LogFile>, StoreError> {
    store.execute_write(&format!(
        "INSERT INTO {LOG_FILES_TABLE} (ProjectId, Path, Size, Modified, Facts, Errors) \
         VALUES ({}, {}, {size}, {}, 0, 0)",
        project.id,
        path_text(path),
        time_text(modified)
    ))?;
    let rows = store.execute_query(&format!(
        "SELECT Id FROM {LOG_FILES_TABLE} WHERE ProjectId = {} AND Path = {}",
        project.id,
        path_text(path)
    ))?;
    let id = rows
        .first()
        .and_then(|r| cell(r, 0).as_i64())
        .ok_or_else(|| StoreError::Statement {
            statement: format!("SELECT Id FROM {LOG_FILES_TABLE}"),
            source: rusqlite::Error::QueryReturnedNoRows,
        })?;

    let file = Arc::new(LogFile::new(
        id,
        path.to_path_buf(),
        ParseMeta {
            size,
            modified,
            ..Default::default()
        },
    ));
    project.add_file(Arc::clone(&file));
    tracing::debug!(project = project.id, file = id, path = %path.display(), "File registered");
    Ok(file)
}

/// Write a file's parse metadata and counts.
pub fn save_file(store: &dyn FactStore, file: &LogFile) -> Result<(), StoreError> {
    let summary = file.summary();
    store.execute_write(&format!(
        "UPDATE {LOG_FILES_TABLE} SET Size = {}, Modified = {}, Parsed = {}, DurationMs = {}, \
         Facts = {}, Errors = {}, LastError = {} WHERE Id = {}",
        summary.size,
        time_text(summary.modified),
        time_text(summary.parsed),
        summary.duration_ms,
        summary.facts,
        summary.errors,
        summary
            .last_error
            .as_deref()
            .map_or_else(|| "null".to_string(), quote),
        summary.id
    ))?;
    Ok(())
}

/// Delete the facts stored for one file in every table of the log type.
pub fn delete_file_facts(
    store: &dyn FactStore,
    log_type: &LogType,
    project_id: i64,
    file_id: i64,
) -> Result<usize, StoreError> {
    let mut deleted = 0;
    for table in log_type.tables() {
        deleted += store.execute_write(&format!(
            "DELETE FROM {table} WHERE ProjectId = {project_id} AND LogId = {file_id}"
        ))?;
    }
    Ok(deleted)
}

/// Remove a file from the project together with its facts.
pub fn delete_file(
    store: &dyn FactStore,
    log_type: &LogType,
    project: &ParseProject,
    file_id: i64,
) -> Result<(), StoreError> {
    let facts = delete_file_facts(store, log_type, project.id, file_id)?;
    store.execute_write(&format!(
        "DELETE FROM {LOG_FILES_TABLE} WHERE Id = {file_id}"
    ))?;
    project.remove_file(file_id);
    tracing::info!(project = project.id, file = file_id, facts, "File deleted");
    Ok(())
}

/// Delete a project, its files and all of its facts.
pub fn delete_project(
    store: &dyn FactStore,
    log_type: &LogType,
    project: &ParseProject,
) -> Result<(), StoreError> {
    let mut facts = 0;
    for table in log_type.tables() {
        facts += store.execute_write(&format!(
            "DELETE FROM {table} WHERE ProjectId = {}",
            project.id
        ))?;
    }
    store.execute_write(&format!(
        "DELETE FROM {LOG_FILES_TABLE} WHERE ProjectId = {}",
        project.id
    ))?;
    store.execute_write(&format!(
        "DELETE FROM {PROJECTS_TABLE} WHERE Id = {}",
        project.id
    ))?;
    for file in project.files() {
        project.remove_file(file.id);
    }
    tracing::info!(project = project.id, facts, "Project deleted");
    Ok(())
}
