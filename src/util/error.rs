// logfacts - util/error.rs
//
// Typed error hierarchy with context-preserving error chains.
// No string-based error propagation: every failure carries the path, log
// type, pattern or line it happened at, and keeps its source error.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Top-level error type for all logfacts operations.
/// Errors are categorised by the subsystem that produced them.
#[derive(Debug)]
pub enum LogFactsError {
    /// Log type loading or validation failed.
    Catalog(CatalogError),

    /// File discovery failed.
    Discovery(DiscoveryError),

    /// A captured timestamp could not be resolved.
    Timestamp(TimestampError),

    /// The fact store rejected a statement.
    Store(StoreError),

    /// A file parse failed.
    Parse(ParseError),

    /// I/O error with path context.
    Io {
        path: PathBuf,
        operation: &'static str,
        source: io::Error,
    },
}

impl fmt::Display for LogFactsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Catalog(e) => write!(f, "Log type error: {e}"),
            Self::Discovery(e) => write!(f, "Discovery error: {e}"),
            Self::Timestamp(e) => write!(f, "Timestamp error: {e}"),
            Self::Store(e) => write!(f, "Store error: {e}"),
            Self::Parse(e) => write!(f, "Parse error: {e}"),
            Self::Io {
                path,
                operation,
                source,
            } => write!(
                f,
                "I/O error during {operation} on '{}': {source}",
                path.display()
            ),
        }
    }
}

impl std::error::Error for LogFactsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Catalog(e) => Some(e),
            Self::Discovery(e) => Some(e),
            Self::Timestamp(e) => Some(e),
            Self::Store(e) => Some(e),
            Self::Parse(e) => Some(e),
            Self::Io { source, .. } => Some(source),
        }
    }
}

// ---------------------------------------------------------------------------
// Catalog errors
// ---------------------------------------------------------------------------

/// Errors related to log type loading and validation.
#[derive(Debug)]
pub enum CatalogError {
    /// TOML file could not be parsed.
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Log type file exceeds the maximum allowed size.
    FileTooLarge {
        path: PathBuf,
        size: u64,
        max_size: u64,
    },

    /// A required field is missing or empty.
    MissingField {
        log_type: String,
        field: String,
    },

    /// A regex in the definition is invalid.
    InvalidRegex {
        log_type: String,
        field: String,
        pattern: String,
        source: regex::Error,
    },

    /// A regex exceeds the maximum allowed length.
    RegexTooLong {
        log_type: String,
        field: String,
        length: usize,
        max_length: usize,
    },

    /// The timestamp format identifier is not registered.
    UnknownTimestampFormat {
        log_type: String,
        source: TimestampError,
    },

    /// A tosser rule is not of the form `column=value`.
    InvalidTosserRule {
        log_type: String,
        pattern: String,
        rule: String,
        reason: &'static str,
    },

    /// A tosser rule targets a column the log type does not declare.
    UnknownColumn {
        log_type: String,
        pattern: String,
        column: String,
    },

    /// A tosser rule references a capture group the regex does not have.
    CaptureOutOfRange {
        log_type: String,
        pattern: String,
        index: usize,
        groups: usize,
    },

    /// A destination column is declared twice, or clashes with a fixed column.
    DuplicateColumn { log_type: String, column: String },

    /// An insert template token names no fixed field, column or attribute.
    UnknownTemplateToken { log_type: String, token: String },

    /// A table or column name is not a plain SQL identifier.
    InvalidIdentifier {
        log_type: String,
        field: String,
        value: String,
    },

    /// A log type declares more patterns than allowed.
    TooManyPatterns {
        log_type: String,
        count: usize,
        max: usize,
    },

    /// Two user definitions declare the same log type name.
    DuplicateName {
        name: String,
        path1: PathBuf,
        path2: PathBuf,
    },

    /// Maximum number of log types exceeded.
    TooManyLogTypes { count: usize, max: usize },

    /// A project refers to a log type that is not loaded.
    UnknownLogType { name: String },

    /// I/O error reading a log type file.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TomlParse { path, source } => {
                write!(f, "Failed to parse TOML '{}': {source}", path.display())
            }
            Self::FileTooLarge {
                path,
                size,
                max_size,
            } => write!(
                f,
                "Log type file '{}' is {size} bytes, exceeds maximum of {max_size} bytes",
                path.display()
            ),
            Self::MissingField { log_type, field } => {
                write!(f, "Log type '{log_type}': missing required field '{field}'")
            }
            Self::InvalidRegex {
                log_type,
                field,
                pattern,
                source,
            } => write!(
                f,
                "Log type '{log_type}': invalid regex in '{field}' ('{pattern}'): {source}"
            ),
            Self::RegexTooLong {
                log_type,
                field,
                length,
                max_length,
            } => write!(
                f,
                "Log type '{log_type}': regex in '{field}' is {length} chars, \
                 exceeds maximum of {max_length}"
            ),
            Self::UnknownTimestampFormat { log_type, source } => {
                write!(f, "Log type '{log_type}': {source}")
            }
            Self::InvalidTosserRule {
                log_type,
                pattern,
                rule,
                reason,
            } => write!(
                f,
                "Log type '{log_type}', pattern '{pattern}': invalid rule '{rule}': {reason}"
            ),
            Self::UnknownColumn {
                log_type,
                pattern,
                column,
            } => write!(
                f,
                "Log type '{log_type}', pattern '{pattern}': rule targets undeclared column '{column}'"
            ),
            Self::CaptureOutOfRange {
                log_type,
                pattern,
                index,
                groups,
            } => write!(
                f,
                "Log type '{log_type}', pattern '{pattern}': capture #{index} requested \
                 but the regex has {groups} group(s)"
            ),
            Self::DuplicateColumn { log_type, column } => {
                write!(f, "Log type '{log_type}': column '{column}' declared twice")
            }
            Self::UnknownTemplateToken { log_type, token } => write!(
                f,
                "Log type '{log_type}': insert template token '$({token})' names no \
                 fixed field, column or file attribute"
            ),
            Self::InvalidIdentifier {
                log_type,
                field,
                value,
            } => write!(
                f,
                "Log type '{log_type}': '{value}' in '{field}' is not a valid identifier"
            ),
            Self::TooManyPatterns {
                log_type,
                count,
                max,
            } => write!(
                f,
                "Log type '{log_type}' has {count} patterns, maximum is {max}"
            ),
            Self::DuplicateName { name, path1, path2 } => write!(
                f,
                "Duplicate log type '{name}' in '{}' and '{}'",
                path1.display(),
                path2.display()
            ),
            Self::TooManyLogTypes { count, max } => {
                write!(f, "Too many log types loaded ({count}), maximum is {max}")
            }
            Self::UnknownLogType { name } => write!(f, "Log type '{name}' is not loaded"),
            Self::Io { path, source } => {
                write!(
                    f,
                    "I/O error reading log type '{}': {source}",
                    path.display()
                )
            }
        }
    }
}

impl std::error::Error for CatalogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TomlParse { source, .. } => Some(source),
            Self::InvalidRegex { source, .. } => Some(source),
            Self::UnknownTimestampFormat { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<CatalogError> for LogFactsError {
    fn from(e: CatalogError) -> Self {
        Self::Catalog(e)
    }
}

// ---------------------------------------------------------------------------
// Discovery errors
// ---------------------------------------------------------------------------

/// Errors related to enumerating a project's files.
#[derive(Debug)]
pub enum DiscoveryError {
    /// The project location does not exist or is not accessible.
    RootNotFound { path: PathBuf },

    /// A directory-scoped log type was pointed at a plain file.
    NotADirectory { path: PathBuf },

    /// A file-scoped log type was pointed at a directory.
    NotAFile { path: PathBuf },

    /// Permission denied accessing the location.
    PermissionDenied { path: PathBuf, source: io::Error },
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RootNotFound { path } => {
                write!(f, "Project location '{}' does not exist", path.display())
            }
            Self::NotADirectory { path } => write!(
                f,
                "Project location '{}' is not a directory",
                path.display()
            ),
            Self::NotAFile { path } => {
                write!(f, "Project location '{}' is not a file", path.display())
            }
            Self::PermissionDenied { path, source } => {
                write!(
                    f,
                    "Permission denied accessing '{}': {source}",
                    path.display()
                )
            }
        }
    }
}

impl std::error::Error for DiscoveryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::PermissionDenied { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<DiscoveryError> for LogFactsError {
    fn from(e: DiscoveryError) -> Self {
        Self::Discovery(e)
    }
}

// ---------------------------------------------------------------------------
// Timestamp errors
// ---------------------------------------------------------------------------

/// Errors raised by timestamp resolution strategies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimestampError {
    /// No strategy is registered under the identifier.
    UnknownFormat { identifier: String },

    /// The strategy needs a parameter that was not supplied.
    MissingParameter { format: &'static str },

    /// A context attribute the strategy depends on is absent.
    MissingContext { attribute: &'static str },

    /// The input text does not fit the strategy's layout.
    Malformed {
        format: &'static str,
        input: String,
        reason: &'static str,
    },

    /// The fields parsed but do not form a valid calendar date or time.
    OutOfRange { format: &'static str, input: String },
}

impl fmt::Display for TimestampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownFormat { identifier } => {
                write!(f, "unknown timestamp format '{identifier}'")
            }
            Self::MissingParameter { format } => {
                write!(f, "timestamp format '{format}' requires a ':' parameter")
            }
            Self::MissingContext { attribute } => {
                write!(f, "required context attribute '{attribute}' is not set")
            }
            Self::Malformed {
                format,
                input,
                reason,
            } => write!(f, "cannot parse '{input}' as '{format}': {reason}"),
            Self::OutOfRange { format, input } => {
                write!(f, "'{input}' is not a valid date/time for '{format}'")
            }
        }
    }
}

impl std::error::Error for TimestampError {}

impl From<TimestampError> for LogFactsError {
    fn from(e: TimestampError) -> Self {
        Self::Timestamp(e)
    }
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

/// Errors returned by a fact store.
#[derive(Debug)]
pub enum StoreError {
    /// The database could not be opened.
    Open {
        path: PathBuf,
        source: rusqlite::Error,
    },

    /// A statement failed. `statement` is a truncated preview.
    Statement {
        statement: String,
        source: rusqlite::Error,
    },

    /// The write queue worker has shut down.
    QueueClosed,
}

impl StoreError {
    /// Returns true for failures that are worth retrying (busy/locked database).
    pub fn is_transient(&self) -> bool {
        let source = match self {
            Self::Open { source, .. } | Self::Statement { source, .. } => source,
            Self::QueueClosed => return false,
        };
        matches!(
            source.sqlite_error_code(),
            Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked)
        )
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open { path, source } => {
                write!(f, "Cannot open fact store '{}': {source}", path.display())
            }
            Self::Statement { statement, source } => {
                write!(f, "Statement failed ({statement}): {source}")
            }
            Self::QueueClosed => write!(f, "Write queue is closed"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Open { source, .. } => Some(source),
            Self::Statement { source, .. } => Some(source),
            Self::QueueClosed => None,
        }
    }
}

impl From<StoreError> for LogFactsError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

// ---------------------------------------------------------------------------
// Parse errors
// ---------------------------------------------------------------------------

/// Errors that abort the parse of a single file.
#[derive(Debug)]
pub enum ParseError {
    /// The file could not be read.
    Read { file: PathBuf, source: io::Error },

    /// A matched line's timestamp could not be resolved.
    Timestamp {
        file: PathBuf,
        line_number: u64,
        raw_timestamp: String,
        source: TimestampError,
    },

    /// A fact could not be written.
    Store {
        file: PathBuf,
        line_number: u64,
        source: StoreError,
    },

    /// Deleting old facts, flushing the write queue or saving metadata failed.
    Persist { file: PathBuf, source: StoreError },

    /// A partition worker panicked.
    PartitionPanicked { file: PathBuf, partition: usize },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read { file, source } => {
                write!(f, "'{}': cannot read file: {source}", file.display())
            }
            Self::Timestamp {
                file,
                line_number,
                raw_timestamp,
                source,
            } => write!(
                f,
                "'{}' line {line_number}: cannot resolve timestamp '{raw_timestamp}': {source}",
                file.display()
            ),
            Self::Store {
                file,
                line_number,
                source,
            } => write!(
                f,
                "'{}' line {line_number}: fact write failed: {source}",
                file.display()
            ),
            Self::Persist { file, source } => {
                write!(f, "'{}': {source}", file.display())
            }
            Self::PartitionPanicked { file, partition } => write!(
                f,
                "'{}': partition {partition} worker panicked",
                file.display()
            ),
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Read { source, .. } => Some(source),
            Self::Timestamp { source, .. } => Some(source),
            Self::Store { source, .. } => Some(source),
            Self::Persist { source, .. } => Some(source),
            Self::PartitionPanicked { .. } => None,
        }
    }
}

impl From<ParseError> for LogFactsError {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}

/// Convenience type alias for logfacts results.
pub type Result<T> = std::result::Result<T, LogFactsError>;
