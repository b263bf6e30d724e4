// logfacts - core/model.rs
//
// Core data model types: log types and their extraction patterns, the
// ephemeral fact produced per matched line, and the project / log file
// records that own parse state.
//
// Counters live next to the data they count (atomics, or a mutex where a
// critical section is required) instead of in any global.

use crate::core::timestamp::{TimestampFormat, TimestampResolver};
use crate::util::error::TimestampError;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use std::time::Duration;

// =============================================================================
// Log type configuration (immutable after load, except counters)
// =============================================================================

/// Whether a project location names one file or a directory of files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    File,
    #[default]
    Directory,
}

/// How a quick-filter hit claims a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ClaimPolicy {
    /// The first pattern whose quick filter hits owns the line, whether or
    /// not its regex then matches.
    #[default]
    Exclusive,
    /// A regex miss counts an error and evaluation moves to the next pattern.
    FallThrough,
    /// Every pattern whose filter and regex match yields a fact.
    All,
}

impl std::str::FromStr for ClaimPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exclusive" => Ok(Self::Exclusive),
            "fall-through" | "fallthrough" => Ok(Self::FallThrough),
            "all" => Ok(Self::All),
            other => Err(format!(
                "unknown claim policy '{other}' (expected exclusive, fall-through or all)"
            )),
        }
    }
}

/// Storage type of a destination column. Decides quoting in statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    #[default]
    Text,
    Integer,
    Real,
}

impl ColumnKind {
    pub fn is_text(self) -> bool {
        matches!(self, Self::Text)
    }

    /// SQL type name used in generated `CREATE TABLE` statements.
    pub fn sql_type(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
        }
    }
}

/// A declared destination column of a log type's fact table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

/// The declared destination columns, looked up case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct ColumnSet {
    columns: Vec<Column>,
}

impl ColumnSet {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn get(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Where a destination column's value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TosserValue {
    /// `#N`: the N-th captured value (0-based, group N+1 of the regex).
    Capture(usize),
    /// A string with `$(i)` placeholders replaced by captured values.
    Composite(String),
    /// A constant.
    Literal(String),
}

/// One `column=value` mapping rule, validated at load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TosserRule {
    pub column: String,
    pub value: TosserValue,
}

/// A pattern's ordered tosser rules.
#[derive(Debug, Clone, Default)]
pub struct TosserRules {
    rules: Vec<TosserRule>,
}

impl TosserRules {
    pub fn new(rules: Vec<TosserRule>) -> Self {
        Self { rules }
    }

    /// Case-insensitive lookup by destination column.
    pub fn get(&self, column: &str) -> Option<&TosserRule> {
        self.rules
            .iter()
            .find(|r| r.column.eq_ignore_ascii_case(column))
    }

    pub fn iter(&self) -> impl Iterator<Item = &TosserRule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Running per-pattern totals. Never reset during the engine's lifetime.
#[derive(Debug, Default)]
pub struct PatternCounters {
    facts: AtomicU64,
    errors: AtomicU64,
}

impl PatternCounters {
    pub fn add_fact(&self) {
        self.facts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn facts(&self) -> u64 {
        self.facts.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

/// A named quick filter + regex + field mapping rule set.
#[derive(Debug)]
pub struct ExtractionPattern {
    pub name: String,

    /// Cheap substring precheck. Assumed (not validated) to occur in every
    /// line the regex can match.
    pub quick_filter: String,

    pub regex: Regex,

    pub rules: TosserRules,

    /// Destination table override; `None` writes to the log type's table.
    pub table: Option<String>,

    pub counters: PatternCounters,
}

impl ExtractionPattern {
    /// Number of capture groups after the full match.
    pub fn group_count(&self) -> usize {
        self.regex.captures_len().saturating_sub(1)
    }
}

/// Runtime representation of a log type after TOML parsing, validation and
/// regex compilation.
#[derive(Debug)]
pub struct LogType {
    pub name: String,

    pub description: String,

    /// Default destination table for facts.
    pub table: String,

    pub timestamp_format: TimestampFormat,

    /// Matched against file names during discovery.
    pub file_pattern: Regex,

    pub scope: Scope,

    pub columns: ColumnSet,

    /// Statement template expanded once per fact.
    pub insert_template: String,

    /// Evaluated in order for every line.
    pub patterns: Vec<ExtractionPattern>,

    /// Whether this is a built-in log type (true) or user-defined (false).
    pub is_builtin: bool,

    resolver: OnceLock<Result<TimestampResolver, TimestampError>>,
}

impl LogType {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: String,
        description: String,
        table: String,
        timestamp_format: TimestampFormat,
        file_pattern: Regex,
        scope: Scope,
        columns: ColumnSet,
        insert_template: String,
        patterns: Vec<ExtractionPattern>,
        is_builtin: bool,
    ) -> Self {
        Self {
            name,
            description,
            table,
            timestamp_format,
            file_pattern,
            scope,
            columns,
            insert_template,
            patterns,
            is_builtin,
            resolver: OnceLock::new(),
        }
    }

    /// The timestamp resolver, constructed on first use and cached.
    pub fn resolver(&self) -> Result<&TimestampResolver, TimestampError> {
        self.resolver
            .get_or_init(|| self.timestamp_format.build())
            .as_ref()
            .map_err(Clone::clone)
    }

    /// Tables this log type writes facts to (default table first).
    pub fn tables(&self) -> Vec<&str> {
        let mut tables = vec![self.table.as_str()];
        for p in &self.patterns {
            if let Some(t) = p.table.as_deref() {
                if !tables.iter().any(|x| x.eq_ignore_ascii_case(t)) {
                    tables.push(t);
                }
            }
        }
        tables
    }

    /// Destination table for a pattern's facts.
    pub fn table_for<'a>(&'a self, pattern: &'a ExtractionPattern) -> &'a str {
        pattern.table.as_deref().unwrap_or(&self.table)
    }
}

// =============================================================================
// Facts (ephemeral)
// =============================================================================

/// One matched line. Created per match, consumed immediately by the
/// registrar, never retained.
#[derive(Debug)]
pub struct LogFact<'a> {
    pub pattern: &'a ExtractionPattern,

    /// 1-based line number in the source file.
    pub line_number: u64,

    pub line: &'a str,

    /// Resolved timestamp rendered with `FACT_TIME_FORMAT`, if group 1 exists.
    pub log_time: Option<String>,

    /// Every capture group after the full match, in order.
    pub values: Vec<String>,

    /// Assigned by the registrar; zero until registered.
    pub id: u64,
}

// =============================================================================
// Context attributes
// =============================================================================

/// File-level context attributes, keyed case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    values: HashMap<String, String>,
}

impl Attributes {
    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

// =============================================================================
// Projects and log files
// =============================================================================

/// When a file was last parsed successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseStamp {
    /// Never parsed, or the last parse failed.
    #[default]
    Never,
    At(DateTime<Utc>),
}

impl ParseStamp {
    pub fn at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Never => None,
            Self::At(t) => Some(*t),
        }
    }
}

/// Mutable parse metadata of a log file.
#[derive(Debug, Clone, Default)]
pub struct ParseMeta {
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub parsed: ParseStamp,
    pub duration: Duration,
    pub last_error: Option<String>,
}

/// Snapshot of a log file's state, for reporting and persistence.
#[derive(Debug, Clone, Serialize)]
pub struct LogFileSummary {
    pub id: i64,
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub parsed: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    pub facts: u64,
    pub errors: u64,
    pub last_error: Option<String>,
}

/// A log file registered in a project.
#[derive(Debug)]
pub struct LogFile {
    pub id: i64,
    pub path: PathBuf,
    meta: Mutex<ParseMeta>,
    facts: AtomicU64,
    errors: AtomicU64,
    attributes: RwLock<Attributes>,
}

impl LogFile {
    pub fn new(id: i64, path: PathBuf, meta: ParseMeta) -> Self {
        Self {
            id,
            path,
            meta: Mutex::new(meta),
            facts: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            attributes: RwLock::new(Attributes::default()),
        }
    }

    /// File name component used for context attributes.
    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    /// Start a parse pass: counters back to zero, attributes replaced.
    pub fn begin_pass(&self, attributes: Attributes) {
        self.facts.store(0, Ordering::SeqCst);
        self.errors.store(0, Ordering::SeqCst);
        *self
            .attributes
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = attributes;
    }

    pub fn add_fact(&self) {
        self.facts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn facts(&self) -> u64 {
        self.facts.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Counts loaded from the project database.
    pub fn restore_counts(&self, facts: u64, errors: u64) {
        self.facts.store(facts, Ordering::SeqCst);
        self.errors.store(errors, Ordering::SeqCst);
    }

    /// Read access to the context attributes.
    pub fn attributes(&self) -> std::sync::RwLockReadGuard<'_, Attributes> {
        self.attributes
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn meta(&self) -> ParseMeta {
        self.lock_meta().clone()
    }

    pub fn update_meta(&self, f: impl FnOnce(&mut ParseMeta)) {
        f(&mut self.lock_meta());
    }

    fn lock_meta(&self) -> std::sync::MutexGuard<'_, ParseMeta> {
        self.meta.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn summary(&self) -> LogFileSummary {
        let meta = self.meta();
        LogFileSummary {
            id: self.id,
            path: self.path.clone(),
            size: meta.size,
            modified: meta.modified,
            parsed: meta.parsed.at(),
            duration_ms: meta.duration.as_millis() as u64,
            facts: self.facts(),
            errors: self.errors(),
            last_error: meta.last_error,
        }
    }
}

/// A persistent grouping of log files sharing a location and log type.
#[derive(Debug)]
pub struct ParseProject {
    pub id: i64,
    pub log_type: String,
    pub location: PathBuf,
    files: RwLock<Vec<Arc<LogFile>>>,
    /// Last assigned fact id. The lock is the project's critical section.
    fact_counter: Mutex<u64>,
}

impl ParseProject {
    pub fn new(id: i64, log_type: String, location: PathBuf, last_fact_id: u64) -> Self {
        Self {
            id,
            log_type,
            location,
            files: RwLock::new(Vec::new()),
            fact_counter: Mutex::new(last_fact_id),
        }
    }

    /// Assign the next fact id. `on_assigned` runs inside the critical section.
    pub fn next_fact_id(&self, on_assigned: impl FnOnce(u64)) -> u64 {
        let mut counter = self
            .fact_counter
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *counter += 1;
        let id = *counter;
        on_assigned(id);
        id
    }

    pub fn last_fact_id(&self) -> u64 {
        *self
            .fact_counter
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn files(&self) -> Vec<Arc<LogFile>> {
        self.files
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn file_by_path(&self, path: &std::path::Path) -> Option<Arc<LogFile>> {
        self.files
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .find(|f| f.path == path)
            .cloned()
    }

    pub fn add_file(&self, file: Arc<LogFile>) {
        self.files
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(file);
    }

    pub fn remove_file(&self, id: i64) -> Option<Arc<LogFile>> {
        let mut files = self
            .files
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let pos = files.iter().position(|f| f.id == id)?;
        Some(files.remove(pos))
    }
}
