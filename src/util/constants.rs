// logfacts - util/constants.rs
//
// Single source of truth for all named constants, limits, and defaults.
// Config loading validates user values against the bounds defined here.

// =============================================================================
// Application metadata
// =============================================================================

/// Application display name.
pub const APP_NAME: &str = "logfacts";

/// Application identifier used for config/data directories.
pub const APP_ID: &str = "logfacts";

/// Current application version (updated by release script).
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Partitioning and concurrency
// =============================================================================

/// Default number of partition workers per file.
pub const DEFAULT_WORKERS: usize = 4;

/// Hard upper bound on partition workers per file.
pub const ABSOLUTE_MAX_WORKERS: usize = 64;

/// Files with fewer lines than this are parsed as a single partition.
pub const DEFAULT_SEQUENTIAL_THRESHOLD: usize = 10_000;

/// Partition sizes are rounded up to a multiple of this value.
pub const PARTITION_ALIGNMENT: usize = 10;

/// Default number of files parsed at the same time across the engine.
pub const DEFAULT_MAX_CONCURRENT_FILES: usize = 2;

/// Hard upper bound on concurrently parsed files.
pub const ABSOLUTE_MAX_CONCURRENT_FILES: usize = 32;

/// A progress step is reported every this many processed lines.
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 1_000;

/// Minimum user-configurable progress interval.
pub const MIN_PROGRESS_INTERVAL: u64 = 10;

// =============================================================================
// Discovery limits
// =============================================================================

/// Maximum directory recursion depth for directory-scoped log types.
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Hard upper bound on max depth (prevents infinite traversal).
pub const ABSOLUTE_MAX_DEPTH: usize = 50;

/// Maximum number of files registered for a single project.
pub const DEFAULT_MAX_FILES: usize = 500;

/// Hard upper bound on max files (prevents configuration mistakes).
pub const ABSOLUTE_MAX_FILES: usize = 10_000;

/// File size threshold in bytes above which the line source memory-maps
/// the file instead of reading it into a heap buffer.
pub const DEFAULT_LARGE_FILE_THRESHOLD: u64 = 100 * 1024 * 1024; // 100 MB

/// Skipped during discovery. Wildcard-free entries also prune directories.
pub const DEFAULT_EXCLUDE_PATTERNS: &[&str] = &[
    "*.gz", "*.zip", "*.7z", "*.bak", ".git", ".svn", "node_modules",
];

// =============================================================================
// Storage
// =============================================================================

/// Number of queued statements written in one transaction.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Hard upper bound on the write batch size.
pub const ABSOLUTE_MAX_BATCH_SIZE: usize = 50_000;

/// Write queue capacity in batches. Producers block once this many batches
/// are waiting for the writer.
pub const WRITE_QUEUE_DEPTH_BATCHES: usize = 4;

/// Write attempts before a store error is surfaced.
pub const DEFAULT_WRITE_ATTEMPTS: u32 = 3;

/// Hard upper bound on write attempts.
pub const ABSOLUTE_MAX_WRITE_ATTEMPTS: u32 = 10;

/// First retry delay; doubled on each further attempt.
pub const DEFAULT_WRITE_RETRY_DELAY_MS: u64 = 50;

/// Upper bound on a single retry delay.
pub const MAX_WRITE_RETRY_DELAY_MS: u64 = 2_000;

/// SQLite busy timeout applied to every connection.
pub const SQLITE_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Table holding one row per parse project.
pub const PROJECTS_TABLE: &str = "Projects";

/// Table holding one row per log file.
pub const LOG_FILES_TABLE: &str = "LogFiles";

/// Default fact database file name (in the platform data directory).
pub const DEFAULT_DATABASE_NAME: &str = "facts.db";

// =============================================================================
// Log type limits
// =============================================================================

/// Maximum number of log types that can be loaded (built-in + user).
pub const MAX_LOG_TYPES: usize = 100;

/// Maximum number of extraction patterns in one log type.
pub const MAX_PATTERNS_PER_TYPE: usize = 256;

/// Maximum size of a log type TOML file in bytes.
pub const MAX_LOG_TYPE_FILE_SIZE: u64 = 64 * 1024; // 64 KB

/// Maximum regex pattern length to prevent ReDoS.
pub const MAX_REGEX_PATTERN_LENGTH: usize = 4_096;

// =============================================================================
// Fact rendering
// =============================================================================

/// chrono format used for resolved fact timestamps.
pub const FACT_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// Context attribute holding the file name of the log being parsed.
pub const ATTR_LOG_FILE_NAME: &str = "logfilename";

/// Context attribute holding the date derived from the file name.
pub const ATTR_LOG_DATE: &str = "logdate";

/// Context attribute holding the process start instant from the file name.
pub const ATTR_LOG_START: &str = "logstart";

/// Context attribute holding the process identifier from the file name.
pub const ATTR_PROCESS_ID: &str = "processid";

// =============================================================================
// Logging
// =============================================================================

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Maximum length of a log line included in debug output.
/// Prevents accidental exposure of sensitive data in long lines.
pub const DEBUG_MAX_LINE_PREVIEW: usize = 200;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// User log type subdirectory name.
pub const LOG_TYPES_DIR_NAME: &str = "log_types";
