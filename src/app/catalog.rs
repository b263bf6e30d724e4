// logfacts - app/catalog.rs
//
// The set of log types available to the engine: built-ins embedded in the
// binary plus user-defined TOML files from a directory. A user definition
// replaces the built-in with the same name.

use crate::core::logtype;
use crate::core::model::LogType;
use crate::util::constants;
use crate::util::error::CatalogError;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Loaded, validated log types. Lookup by name is case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct LogTypeCatalog {
    types: Vec<Arc<LogType>>,
}

impl LogTypeCatalog {
    /// Load built-ins, then apply definitions from `user_dir`.
    ///
    /// Invalid user definitions are skipped and returned as non-fatal errors.
    pub fn load(user_dir: Option<&Path>) -> (Self, Vec<CatalogError>) {
        let mut types: Vec<LogType> = logtype::load_builtin_log_types();
        let mut errors = Vec::new();

        tracing::info!(builtin_count = types.len(), "Loaded built-in log types");

        if let Some(dir) = user_dir {
            if dir.is_dir() {
                let (user_types, user_errors) = load_user_log_types(dir);
                errors.extend(user_errors);

                for user_type in user_types {
                    if let Some(pos) = types
                        .iter()
                        .position(|t| t.name.eq_ignore_ascii_case(&user_type.name))
                    {
                        tracing::info!(log_type = %user_type.name, "User log type overrides built-in");
                        types[pos] = user_type;
                    } else {
                        tracing::info!(log_type = %user_type.name, "Loaded user-defined log type");
                        types.push(user_type);
                    }
                }
            } else {
                tracing::debug!(
                    dir = %dir.display(),
                    "User log type directory does not exist (skipping)"
                );
            }
        }

        if types.len() > constants::MAX_LOG_TYPES {
            tracing::warn!(
                count = types.len(),
                max = constants::MAX_LOG_TYPES,
                "Too many log types loaded, truncating"
            );
            errors.push(CatalogError::TooManyLogTypes {
                count: types.len(),
                max: constants::MAX_LOG_TYPES,
            });
            types.truncate(constants::MAX_LOG_TYPES);
        }

        tracing::info!(total = types.len(), "Log type loading complete");

        (
            Self {
                types: types.into_iter().map(Arc::new).collect(),
            },
            errors,
        )
    }

    pub fn from_types(types: Vec<LogType>) -> Self {
        Self {
            types: types.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<LogType>> {
        self.types
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Like `get`, but a missing name is an error.
    pub fn require(&self, name: &str) -> Result<Arc<LogType>, CatalogError> {
        self.get(name).ok_or_else(|| CatalogError::UnknownLogType {
            name: name.to_string(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<LogType>> {
        self.types.iter()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Load every `*.toml` in `dir`, sorted by file name.
fn load_user_log_types(dir: &Path) -> (Vec<LogType>, Vec<CatalogError>) {
    let mut types: Vec<(LogType, PathBuf)> = Vec::new();
    let mut errors = Vec::new();

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            errors.push(CatalogError::Io {
                path: dir.to_path_buf(),
                source: e,
            });
            return (Vec::new(), errors);
        }
    };

    let mut paths = Vec::new();
    for entry_result in entries {
        match entry_result {
            Ok(entry) => paths.push(entry.path()),
            Err(e) => errors.push(CatalogError::Io {
                path: dir.to_path_buf(),
                source: e,
            }),
        }
    }
    paths.retain(|p| p.extension().and_then(|e| e.to_str()) == Some("toml"));
    paths.sort();

    for path in paths {
        let metadata = match std::fs::metadata(&path) {
            Ok(m) => m,
            Err(e) => {
                errors.push(CatalogError::Io { path, source: e });
                continue;
            }
        };

        if metadata.len() > constants::MAX_LOG_TYPE_FILE_SIZE {
            errors.push(CatalogError::FileTooLarge {
                path,
                size: metadata.len(),
                max_size: constants::MAX_LOG_TYPE_FILE_SIZE,
            });
            continue;
        }

        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                errors.push(CatalogError::Io { path, source: e });
                continue;
            }
        };

        match logtype::parse_log_type_toml(&content, &path)
            .and_then(|def| logtype::validate_and_compile(def, false))
        {
            Ok(log_type) => {
                if let Some((_, first)) = types
                    .iter()
                    .find(|(t, _)| t.name.eq_ignore_ascii_case(&log_type.name))
                {
                    tracing::warn!(log_type = %log_type.name, file = %path.display(), "Duplicate user log type skipped");
                    errors.push(CatalogError::DuplicateName {
                        name: log_type.name.clone(),
                        path1: first.clone(),
                        path2: path,
                    });
                } else {
                    types.push((log_type, path));
                }
            }
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "Invalid user log type skipped");
                errors.push(e);
            }
        }
    }

    (types.into_iter().map(|(t, _)| t).collect(), errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const USER_APP_EVENTS: &str = r#"
[log_type]
name = "App-Events"
description = "Overridden"
table = "MyEvents"
timestamp_format = "now"
file_pattern = '\.txt$'

[[columns]]
name = "message"

[[patterns]]
name = "any"
quick_filter = "!"
regex = '!(.*)'
tossers = ["message=#0"]
"#;

    #[test]
    fn test_builtins_load_without_user_dir() {
        let (catalog, errors) = LogTypeCatalog::load(None);
        assert!(errors.is_empty(), "{errors:?}");
        assert!(catalog.get("app-events").is_some());
        assert!(catalog.get("COMPACT-TRACE").is_some());
        assert!(catalog.get("process-log").is_some());
        assert!(matches!(
            catalog.require("nope"),
            Err(CatalogError::UnknownLogType { .. })
        ));
    }

    #[test]
    fn test_user_type_overrides_builtin() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("events.toml"), USER_APP_EVENTS).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let (catalog, errors) = LogTypeCatalog::load(Some(dir.path()));
        assert!(errors.is_empty(), "{errors:?}");
        let lt = catalog.get("app-events").unwrap();
        assert_eq!(lt.table, "MyEvents");
        assert!(!lt.is_builtin);
        assert_eq!(catalog.len(), 3);
    }

    #[test]
    fn test_duplicate_user_types_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.toml"), USER_APP_EVENTS).unwrap();
        fs::write(dir.path().join("b.toml"), USER_APP_EVENTS).unwrap();

        let (catalog, errors) = LogTypeCatalog::load(Some(dir.path()));
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], CatalogError::DuplicateName { .. }));
        assert_eq!(catalog.get("app-events").unwrap().table, "MyEvents");
    }

    #[test]
    fn test_invalid_and_oversized_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.toml"), "[log_type\nname=").unwrap();
        let big = format!(
            "{USER_APP_EVENTS}\n# {}",
            "x".repeat(constants::MAX_LOG_TYPE_FILE_SIZE as usize)
        );
        fs::write(dir.path().join("big.toml"), big).unwrap();

        let (catalog, errors) = LogTypeCatalog::load(Some(dir.path()));
        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .any(|e| matches!(e, CatalogError::FileTooLarge { .. })));
        assert!(errors
            .iter()
            .any(|e| matches!(e, CatalogError::TomlParse { .. })));
        assert!(catalog.get("app-events").unwrap().is_builtin);
    }
}
