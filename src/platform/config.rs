// logfacts - platform/config.rs
//
// Platform directory resolution and config.toml loading with startup
// validation.
//
// Uses the `directories` crate for XDG (Linux), AppData (Windows),
// Library (macOS) compliance.

use crate::core::model::ClaimPolicy;
use crate::util::constants;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Resolved platform paths for logfacts data and configuration.
#[derive(Debug, Clone)]
pub struct PlatformPaths {
    /// Configuration directory (e.g. ~/.config/logfacts/).
    pub config_dir: PathBuf,

    /// User log type directory (e.g. ~/.config/logfacts/log_types/).
    pub user_log_types_dir: PathBuf,

    /// Data directory holding the default fact database.
    pub data_dir: PathBuf,
}

impl PlatformPaths {
    /// Resolve platform-appropriate paths.
    ///
    /// Falls back to the current directory if platform dirs cannot be
    /// determined.
    pub fn resolve() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from("", "", constants::APP_ID) {
            let config_dir = proj_dirs.config_dir().to_path_buf();
            let user_log_types_dir = config_dir.join(constants::LOG_TYPES_DIR_NAME);
            let data_dir = proj_dirs.data_dir().to_path_buf();

            tracing::debug!(
                config = %config_dir.display(),
                log_types = %user_log_types_dir.display(),
                data = %data_dir.display(),
                "Platform paths resolved"
            );

            Self {
                config_dir,
                user_log_types_dir,
                data_dir,
            }
        } else {
            tracing::warn!("Could not determine platform directories, using current directory");
            Self::rooted_at(Path::new("."))
        }
    }

    /// All paths under one directory (used for `--config-dir`).
    pub fn rooted_at(dir: &Path) -> Self {
        Self {
            config_dir: dir.to_path_buf(),
            user_log_types_dir: dir.join(constants::LOG_TYPES_DIR_NAME),
            data_dir: dir.to_path_buf(),
        }
    }

    /// Default location of the fact database.
    pub fn default_database(&self) -> PathBuf {
        self.data_dir.join(constants::DEFAULT_DATABASE_NAME)
    }
}

// =============================================================================
// config.toml loading and validation
// =============================================================================

/// Raw deserialisable shape of config.toml.
///
/// Unknown keys are silently ignored for forward compatibility.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct RawConfig {
    pub engine: EngineSection,
    pub discovery: DiscoverySection,
    pub storage: StorageSection,
    pub log_types: LogTypesSection,
    pub logging: LoggingSection,
}

/// `[engine]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Partition workers per file.
    pub workers: Option<usize>,
    /// Files with fewer lines are parsed as one partition.
    pub sequential_threshold: Option<usize>,
    /// Files parsed at the same time.
    pub max_concurrent_files: Option<usize>,
    /// Lines between progress reports.
    pub progress_interval: Option<u64>,
    /// "exclusive", "fall-through" or "all".
    pub claim_policy: Option<String>,
}

/// `[discovery]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct DiscoverySection {
    pub max_depth: Option<usize>,
    pub max_files: Option<usize>,
    pub exclude_patterns: Option<Vec<String>>,
}

/// `[storage]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Fact database path.
    pub database: Option<String>,
    /// Queue fact writes and commit them in batches.
    pub batch_writes: Option<bool>,
    pub batch_size: Option<usize>,
    pub write_attempts: Option<u32>,
    pub write_retry_delay_ms: Option<u64>,
}

/// `[log_types]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct LogTypesSection {
    /// Additional log type directory.
    pub user_directory: Option<String>,
}

/// `[logging]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub level: Option<String>,
}

/// Validated application configuration derived from `config.toml`.
///
/// Invalid values produce actionable warnings and fall back to defaults.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // -- Engine --
    pub workers: usize,
    pub sequential_threshold: usize,
    pub max_concurrent_files: usize,
    pub progress_interval: u64,
    pub claim_policy: ClaimPolicy,

    // -- Discovery --
    pub max_depth: usize,
    pub max_files: usize,
    pub exclude_patterns: Option<Vec<String>>,

    // -- Storage --
    pub database: Option<PathBuf>,
    pub batch_writes: bool,
    pub batch_size: usize,
    pub write_attempts: u32,
    pub write_retry_delay_ms: u64,

    // -- Log types --
    pub user_log_types_dir: Option<PathBuf>,

    // -- Logging --
    /// Logging level string (for init before tracing is available).
    pub log_level: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workers: constants::DEFAULT_WORKERS,
            sequential_threshold: constants::DEFAULT_SEQUENTIAL_THRESHOLD,
            max_concurrent_files: constants::DEFAULT_MAX_CONCURRENT_FILES,
            progress_interval: constants::DEFAULT_PROGRESS_INTERVAL,
            claim_policy: ClaimPolicy::default(),
            max_depth: constants::DEFAULT_MAX_DEPTH,
            max_files: constants::DEFAULT_MAX_FILES,
            exclude_patterns: None,
            database: None,
            batch_writes: false,
            batch_size: constants::DEFAULT_BATCH_SIZE,
            write_attempts: constants::DEFAULT_WRITE_ATTEMPTS,
            write_retry_delay_ms: constants::DEFAULT_WRITE_RETRY_DELAY_MS,
            user_log_types_dir: None,
            log_level: None,
        }
    }
}

/// Load and validate `config.toml` from the given config directory.
///
/// Returns `AppConfig` with validated values and a list of non-fatal warnings.
/// A missing file yields defaults with no warnings; an unparseable one yields
/// defaults with a warning.
pub fn load_config(config_dir: &Path) -> (AppConfig, Vec<String>) {
    let config_path = config_dir.join(constants::CONFIG_FILE_NAME);
    let mut warnings: Vec<String> = Vec::new();

    if !config_path.exists() {
        tracing::debug!(path = %config_path.display(), "No config.toml found; using defaults");
        return (AppConfig::default(), warnings);
    }

    let content = match std::fs::read_to_string(&config_path) {
        Ok(c) => c,
        Err(e) => {
            let msg = format!(
                "Could not read config file '{}': {e}. Using defaults.",
                config_path.display()
            );
            tracing::warn!("{}", msg);
            warnings.push(msg);
            return (AppConfig::default(), warnings);
        }
    };

    let raw: RawConfig = match toml::from_str(&content) {
        Ok(r) => r,
        Err(e) => {
            let msg = format!(
                "Failed to parse config file '{}': {e}. Using defaults.",
                config_path.display()
            );
            tracing::warn!("{}", msg);
            warnings.push(msg);
            return (AppConfig::default(), warnings);
        }
    };

    tracing::info!(path = %config_path.display(), "Loaded config.toml");

    let config = validate(raw, config_dir, &mut warnings);

    if !warnings.is_empty() {
        tracing::warn!(
            count = warnings.len(),
            "Config validation produced warnings"
        );
    }

    (config, warnings)
}

/// Accept `value` into `slot` when inside `range`, otherwise record a warning.
fn bounded<T>(
    slot: &mut T,
    value: Option<T>,
    range: std::ops::RangeInclusive<T>,
    key: &str,
    warnings: &mut Vec<String>,
) where
    T: PartialOrd + Copy + std::fmt::Display,
{
    let Some(value) = value else {
        return;
    };
    if range.contains(&value) {
        *slot = value;
    } else {
        warnings.push(format!(
            "{key} = {value} is out of range ({}-{}). Using default ({}).",
            range.start(),
            range.end(),
            slot
        ));
    }
}

/// Relative paths in config.toml are resolved against the config directory.
fn resolve_path(config_dir: &Path, value: &str) -> PathBuf {
    let path = PathBuf::from(value);
    if path.is_absolute() {
        path
    } else {
        config_dir.join(path)
    }
}

fn validate(raw: RawConfig, config_dir: &Path, warnings: &mut Vec<String>) -> AppConfig {
    let mut config = AppConfig::default();

    // -- Engine --
    bounded(
        &mut config.workers,
        raw.engine.workers,
        1..=constants::ABSOLUTE_MAX_WORKERS,
        "[engine] workers",
        warnings,
    );
    bounded(
        &mut config.sequential_threshold,
        raw.engine.sequential_threshold,
        0..=usize::MAX,
        "[engine] sequential_threshold",
        warnings,
    );
    bounded(
        &mut config.max_concurrent_files,
        raw.engine.max_concurrent_files,
        1..=constants::ABSOLUTE_MAX_CONCURRENT_FILES,
        "[engine] max_concurrent_files",
        warnings,
    );
    bounded(
        &mut config.progress_interval,
        raw.engine.progress_interval,
        constants::MIN_PROGRESS_INTERVAL..=u64::MAX,
        "[engine] progress_interval",
        warnings,
    );
    if let Some(ref policy) = raw.engine.claim_policy {
        match policy.parse::<ClaimPolicy>() {
            Ok(p) => config.claim_policy = p,
            Err(e) => warnings.push(format!("[engine] claim_policy: {e}. Using default (exclusive).")),
        }
    }

    // -- Discovery --
    bounded(
        &mut config.max_depth,
        raw.discovery.max_depth,
        1..=constants::ABSOLUTE_MAX_DEPTH,
        "[discovery] max_depth",
        warnings,
    );
    bounded(
        &mut config.max_files,
        raw.discovery.max_files,
        1..=constants::ABSOLUTE_MAX_FILES,
        "[discovery] max_files",
        warnings,
    );
    config.exclude_patterns = raw.discovery.exclude_patterns;

    // -- Storage --
    if let Some(ref db) = raw.storage.database {
        if !db.trim().is_empty() {
            config.database = Some(resolve_path(config_dir, db.trim()));
        }
    }
    if let Some(batch) = raw.storage.batch_writes {
        config.batch_writes = batch;
    }
    bounded(
        &mut config.batch_size,
        raw.storage.batch_size,
        1..=constants::ABSOLUTE_MAX_BATCH_SIZE,
        "[storage] batch_size",
        warnings,
    );
    bounded(
        &mut config.write_attempts,
        raw.storage.write_attempts,
        1..=constants::ABSOLUTE_MAX_WRITE_ATTEMPTS,
        "[storage] write_attempts",
        warnings,
    );
    bounded(
        &mut config.write_retry_delay_ms,
        raw.storage.write_retry_delay_ms,
        0..=constants::MAX_WRITE_RETRY_DELAY_MS,
        "[storage] write_retry_delay_ms",
        warnings,
    );

    // -- Log types --
    if let Some(ref dir) = raw.log_types.user_directory {
        if !dir.trim().is_empty() {
            config.user_log_types_dir = Some(resolve_path(config_dir, dir.trim()));
        }
    }

    // -- Logging: level --
    if let Some(ref level) = raw.logging.level {
        let valid = ["error", "warn", "info", "debug", "trace"];
        if valid.contains(&level.to_lowercase().as_str()) {
            config.log_level = Some(level.clone());
        } else {
            warnings.push(format!(
                "[logging] level = \"{level}\" is not recognised. \
                 Valid values: error, warn, info, debug, trace. Using default (info).",
            ));
        }
    }

    config
}
