// logfacts - core/discovery.rs
//
// Enumerating the files of a project location.
//
// A log type's `file_pattern` regex selects file names; its scope decides
// whether the location names one file or a directory tree. Only metadata is
// read here, never file contents.
//
// Per-entry I/O errors are non-fatal and collected as warnings. Only an
// unusable location fails the call.

use crate::core::model::Scope;
use crate::util::constants;
use crate::util::error::DiscoveryError;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::path::{Path, PathBuf};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for a discovery operation.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Maximum directory recursion depth.
    pub max_depth: usize,

    /// Maximum number of matching files to return.
    pub max_files: usize,

    /// Glob patterns matched against file names and directory component
    /// names. Matching files are skipped; matching directories are not
    /// descended into.
    pub exclude_patterns: Vec<String>,

    /// File size (bytes) above which `is_large` is set.
    pub large_file_threshold: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_depth: constants::DEFAULT_MAX_DEPTH,
            max_files: constants::DEFAULT_MAX_FILES,
            exclude_patterns: constants::DEFAULT_EXCLUDE_PATTERNS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            large_file_threshold: constants::DEFAULT_LARGE_FILE_THRESHOLD,
        }
    }
}

/// A file accepted by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub is_large: bool,
}

/// Result of a discovery run.
#[derive(Debug, Default)]
pub struct Discovery {
    /// Accepted files, sorted by path.
    pub files: Vec<DiscoveredFile>,
    pub warnings: Vec<String>,
    /// Matching files found before `max_files` was applied.
    pub total_found: usize,
}

// =============================================================================
// Discovery
// =============================================================================

/// Discover the files of a project location.
///
/// With `Scope::File` the location itself is the only file and must exist as
/// a regular file. With `Scope::Directory` the tree under the location is
/// walked and every file whose name matches `file_pattern` is accepted.
///
/// When more files match than `max_files`, the most recently modified ones
/// are kept and a warning is recorded.
pub fn discover_files(
    location: &Path,
    file_pattern: &Regex,
    scope: Scope,
    config: &DiscoveryConfig,
) -> Result<Discovery, DiscoveryError> {
    let meta = std::fs::metadata(location).map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => DiscoveryError::PermissionDenied {
            path: location.to_path_buf(),
            source: e,
        },
        _ => DiscoveryError::RootNotFound {
            path: location.to_path_buf(),
        },
    })?;

    match scope {
        Scope::File => {
            if !meta.is_file() {
                return Err(DiscoveryError::NotAFile {
                    path: location.to_path_buf(),
                });
            }
            let file = DiscoveredFile {
                path: location.to_path_buf(),
                size: meta.len(),
                modified: meta.modified().ok().map(DateTime::<Utc>::from),
                is_large: meta.len() >= config.large_file_threshold,
            };
            let mut warnings = Vec::new();
            let name = location.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if !file_pattern.is_match(name) {
                warnings.push(format!(
                    "'{}' does not match the log type's file pattern",
                    location.display()
                ));
            }
            Ok(Discovery {
                files: vec![file],
                warnings,
                total_found: 1,
            })
        }
        Scope::Directory => {
            if !meta.is_dir() {
                return Err(DiscoveryError::NotADirectory {
                    path: location.to_path_buf(),
                });
            }
            Ok(walk(location, file_pattern, config))
        }
    }
}

fn walk(root: &Path, file_pattern: &Regex, config: &DiscoveryConfig) -> Discovery {
    let max_files = config.max_files.min(constants::ABSOLUTE_MAX_FILES);
    let max_depth = config.max_depth.min(constants::ABSOLUTE_MAX_DEPTH);
    let exclude_pats = compile_patterns(&config.exclude_patterns);

    tracing::debug!(
        root = %root.display(),
        max_depth,
        max_files,
        file_pattern = file_pattern.as_str(),
        "Discovery starting"
    );

    let mut files: Vec<DiscoveredFile> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();

    let walker = walkdir::WalkDir::new(root)
        .max_depth(max_depth)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            if e.file_type().is_dir() && e.depth() > 0 {
                let name = e.file_name().to_str().unwrap_or("");
                return !is_excluded_component(name, &exclude_pats);
            }
            true
        });

    for entry_result in walker {
        let entry = match entry_result {
            Ok(e) => e,
            Err(e) => {
                let path_str = e
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "<unknown>".to_string());
                let msg = format!("Cannot access '{path_str}': {e}");
                tracing::debug!(warning = %msg, "Discovery warning");
                warnings.push(msg);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            warnings.push(format!("Skipping '{}': non-UTF-8 filename", path.display()));
            continue;
        };

        if exclude_pats.iter().any(|p| p.matches(file_name)) {
            tracing::trace!(file = file_name, "Excluded by pattern");
            continue;
        }
        if !file_pattern.is_match(file_name) {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                let msg = format!("Cannot read metadata for '{}': {e}", path.display());
                tracing::debug!(warning = %msg, "Discovery warning");
                warnings.push(msg);
                continue;
            }
        };

        let size = metadata.len();
        let is_large = size >= config.large_file_threshold;
        if is_large {
            tracing::debug!(
                file = %path.display(),
                size_mb = size / (1024 * 1024),
                "Large file flagged"
            );
        }

        files.push(DiscoveredFile {
            path: path.to_path_buf(),
            size,
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            is_large,
        });
    }

    let total_found = files.len();

    if total_found > max_files {
        // Newest first; files without an mtime count as oldest.
        files.sort_unstable_by(|a, b| b.modified.cmp(&a.modified));
        files.truncate(max_files);
        warnings.push(format!(
            "{total_found} log files match but the limit is {max_files}; \
             only the {max_files} most recently modified files are used"
        ));
        tracing::info!(
            total_found,
            limit = max_files,
            "File list truncated to most recently modified files"
        );
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));

    tracing::debug!(
        total_found,
        accepted = files.len(),
        warnings = warnings.len(),
        "Discovery complete"
    );

    Discovery {
        files,
        warnings,
        total_found,
    }
}

// =============================================================================
// Glob helpers
// =============================================================================

/// Compile glob patterns, logging and skipping any that fail.
fn compile_patterns(patterns: &[String]) -> Vec<glob::Pattern> {
    patterns
        .iter()
        .filter_map(|p| match glob::Pattern::new(p) {
            Ok(compiled) => Some(compiled),
            Err(e) => {
                tracing::warn!(pattern = p, error = %e, "Invalid exclude pattern, skipping");
                None
            }
        })
        .collect()
}

/// Literal (wildcard-free) exclude patterns also exclude directories.
fn is_excluded_component(dir_name: &str, exclude_pats: &[glob::Pattern]) -> bool {
    exclude_pats.iter().any(|p| {
        let s = p.as_str();
        !s.contains(['*', '?', '[']) && p.matches(dir_name)
    })
}

// =============================================================================
// Tests
// =============================================================================
