// logfacts - core/logtype.rs
//
// Log type definition loading and validation.
// Core layer: accepts TOML strings, never touches the filesystem.
// I/O is handled by app::catalog which feeds content here.

use crate::core::model::{
    Column, ColumnKind, ColumnSet, ExtractionPattern, LogType, PatternCounters, Scope, TosserRule,
    TosserRules, TosserValue,
};
use crate::core::template;
use crate::core::timestamp::TimestampFormat;
use crate::util::constants;
use crate::util::error::CatalogError;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use std::sync::OnceLock;

// =============================================================================
// TOML deserialization structures (raw input)
// =============================================================================

/// Raw TOML log type definition as deserialized from a .toml file.
/// This is validated and compiled into a `LogType` for runtime use.
#[derive(Debug, Deserialize)]
pub struct LogTypeDefinition {
    pub log_type: LogTypeMeta,
    #[serde(default)]
    pub columns: Vec<ColumnDef>,
    #[serde(default)]
    pub patterns: Vec<PatternDef>,
}

#[derive(Debug, Deserialize)]
pub struct LogTypeMeta {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub table: String,
    pub timestamp_format: String,
    pub file_pattern: String,
    #[serde(default)]
    pub scope: Scope,
    /// Overrides the generated fact-insert template.
    #[serde(default)]
    pub insert_template: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(default)]
    pub kind: ColumnKind,
}

#[derive(Debug, Deserialize)]
pub struct PatternDef {
    pub name: String,
    pub quick_filter: String,
    pub regex: String,
    /// `column=value` rules: `#N`, a `$(i)` composite, or a literal.
    #[serde(default)]
    pub tossers: Vec<String>,
    #[serde(default)]
    pub table: Option<String>,
}

// =============================================================================
// Fixed fact columns
// =============================================================================

/// Columns every fact table carries: (column name, template token, kind).
pub const FIXED_COLUMNS: &[(&str, &str, ColumnKind)] = &[
    ("Id", "factId", ColumnKind::Integer),
    ("ProjectId", "projectId", ColumnKind::Integer),
    ("LogId", "logId", ColumnKind::Integer),
    ("LineNo", "lineNo", ColumnKind::Integer),
    ("FactType", "factType", ColumnKind::Text),
    ("Line", "line", ColumnKind::Text),
    ("LogTime", "logTime", ColumnKind::Text),
    ("Created", "created", ColumnKind::Text),
];

/// The insert template used when a log type does not supply one.
pub fn default_insert_template(columns: &ColumnSet) -> String {
    let mut names: Vec<&str> = FIXED_COLUMNS.iter().map(|(c, _, _)| *c).collect();
    let mut tokens: Vec<String> = FIXED_COLUMNS
        .iter()
        .map(|(_, t, _)| format!("$({t})"))
        .collect();
    for column in columns.iter() {
        names.push(&column.name);
        tokens.push(format!("$({})", column.name));
    }
    format!(
        "INSERT INTO $(tableName) ({}) VALUES ({})",
        names.join(", "),
        tokens.join(", ")
    )
}

/// `CREATE TABLE` / `CREATE INDEX` statements for every table the log type
/// writes to.
pub fn create_table_statements(log_type: &LogType) -> Vec<String> {
    let mut defs: Vec<String> = FIXED_COLUMNS
        .iter()
        .map(|(name, _, kind)| match *name {
            "Id" | "ProjectId" | "LogId" => format!("{name} {} NOT NULL", kind.sql_type()),
            _ => format!("{name} {}", kind.sql_type()),
        })
        .collect();
    defs.extend(
        log_type
            .columns
            .iter()
            .map(|c| format!("{} {}", c.name, c.kind.sql_type())),
    );
    defs.push("PRIMARY KEY (ProjectId, Id)".to_string());
    let body = defs.join(", ");

    log_type
        .tables()
        .into_iter()
        .flat_map(|table| {
            [
                format!("CREATE TABLE IF NOT EXISTS {table} ({body})"),
                format!(
                    "CREATE INDEX IF NOT EXISTS idx_{table}_log ON {table} (ProjectId, LogId)"
                ),
            ]
        })
        .collect()
}

// =============================================================================
// Validation and compilation
// =============================================================================

/// Parse a TOML string into a `LogTypeDefinition`.
///
/// `source_path` is used for error messages only (not for I/O).
pub fn parse_log_type_toml(
    toml_content: &str,
    source_path: &Path,
) -> Result<LogTypeDefinition, CatalogError> {
    toml::from_str(toml_content).map_err(|e| CatalogError::TomlParse {
        path: source_path.to_path_buf(),
        source: e,
    })
}

/// Validate a `LogTypeDefinition` and compile it into a runtime `LogType`.
///
/// Validates:
/// - Required fields are present and non-empty
/// - Table and column names are plain identifiers, columns are unique
/// - Regex patterns are valid and within size limits
/// - The timestamp format is registered and its parameter is usable
/// - Every tosser rule targets a declared column and a capture the regex has
pub fn validate_and_compile(
    def: LogTypeDefinition,
    is_builtin: bool,
) -> Result<LogType, CatalogError> {
    let meta = def.log_type;
    let name = meta.name.trim().to_string();

    if name.is_empty() {
        return Err(missing("(empty)", "log_type.name"));
    }
    if meta.table.trim().is_empty() {
        return Err(missing(&name, "log_type.table"));
    }
    if meta.timestamp_format.trim().is_empty() {
        return Err(missing(&name, "log_type.timestamp_format"));
    }
    if meta.file_pattern.is_empty() {
        return Err(missing(&name, "log_type.file_pattern"));
    }
    if def.patterns.len() > constants::MAX_PATTERNS_PER_TYPE {
        return Err(CatalogError::TooManyPatterns {
            log_type: name,
            count: def.patterns.len(),
            max: constants::MAX_PATTERNS_PER_TYPE,
        });
    }

    let table = check_identifier(&name, "log_type.table", meta.table.trim())?;

    let timestamp_format = TimestampFormat::parse(meta.timestamp_format.trim())
        .and_then(|format| format.build().map(|_| format))
        .map_err(|source| CatalogError::UnknownTimestampFormat {
            log_type: name.clone(),
            source,
        })?;

    let file_pattern = compile_regex(&name, "log_type.file_pattern", &meta.file_pattern)?;
    let columns = compile_columns(&name, def.columns)?;

    let mut patterns = Vec::with_capacity(def.patterns.len());
    for (i, p) in def.patterns.into_iter().enumerate() {
        patterns.push(compile_pattern(&name, i, p, &columns)?);
    }
    if patterns.is_empty() {
        tracing::warn!(log_type = %name, "Log type has no patterns; it will never produce facts");
    }

    let insert_template = match meta.insert_template {
        Some(t) if !t.trim().is_empty() => t,
        _ => default_insert_template(&columns),
    };
    check_template_tokens(&name, &insert_template, &columns)?;

    Ok(LogType::new(
        name,
        meta.description,
        table,
        timestamp_format,
        file_pattern,
        meta.scope,
        columns,
        insert_template,
        patterns,
        is_builtin,
    ))
}

/// File attributes a template may reference besides columns.
const TEMPLATE_ATTRIBUTES: &[&str] = &[
    constants::ATTR_LOG_FILE_NAME,
    constants::ATTR_LOG_DATE,
    constants::ATTR_LOG_START,
    constants::ATTR_PROCESS_ID,
];

/// Every `$(name)` in `insert_template` must resolve to something other
/// than the `null` fallback.
fn check_template_tokens(
    log_type: &str,
    insert_template: &str,
    columns: &ColumnSet,
) -> Result<(), CatalogError> {
    for token in template::tokens(insert_template) {
        let known = token.eq_ignore_ascii_case("tableName")
            || FIXED_COLUMNS
                .iter()
                .any(|(_, t, _)| t.eq_ignore_ascii_case(token))
            || columns.get(token).is_some()
            || TEMPLATE_ATTRIBUTES
                .iter()
                .any(|a| a.eq_ignore_ascii_case(token));
        if !known {
            return Err(CatalogError::UnknownTemplateToken {
                log_type: log_type.to_string(),
                token: token.to_string(),
            });
        }
    }
    Ok(())
}

fn missing(log_type: &str, field: &str) -> CatalogError {
    CatalogError::MissingField {
        log_type: log_type.to_string(),
        field: field.to_string(),
    }
}

fn identifier_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex is valid"))
}

fn check_identifier(log_type: &str, field: &str, value: &str) -> Result<String, CatalogError> {
    if identifier_regex().is_match(value) {
        Ok(value.to_string())
    } else {
        Err(CatalogError::InvalidIdentifier {
            log_type: log_type.to_string(),
            field: field.to_string(),
            value: value.to_string(),
        })
    }
}

fn compile_columns(log_type: &str, defs: Vec<ColumnDef>) -> Result<ColumnSet, CatalogError> {
    let mut columns: Vec<Column> = Vec::with_capacity(defs.len());
    for def in defs {
        let name = check_identifier(log_type, "columns.name", def.name.trim())?;
        let clashes_fixed = FIXED_COLUMNS
            .iter()
            .any(|(c, t, _)| c.eq_ignore_ascii_case(&name) || t.eq_ignore_ascii_case(&name));
        let duplicate = columns.iter().any(|c| c.name.eq_ignore_ascii_case(&name));
        if clashes_fixed || duplicate || name.eq_ignore_ascii_case("tableName") {
            return Err(CatalogError::DuplicateColumn {
                log_type: log_type.to_string(),
                column: name,
            });
        }
        columns.push(Column {
            name,
            kind: def.kind,
        });
    }
    Ok(ColumnSet::new(columns))
}

fn compile_pattern(
    log_type: &str,
    index: usize,
    def: PatternDef,
    columns: &ColumnSet,
) -> Result<ExtractionPattern, CatalogError> {
    let name = def.name.trim().to_string();
    if name.is_empty() {
        return Err(missing(log_type, &format!("patterns[{index}].name")));
    }
    if def.quick_filter.is_empty() {
        return Err(missing(log_type, &format!("patterns[{index}].quick_filter")));
    }

    let regex = compile_regex(log_type, &format!("patterns[{index}].regex"), &def.regex)?;
    let groups = regex.captures_len().saturating_sub(1);

    let table = match def.table.as_deref().map(str::trim) {
        Some(t) if !t.is_empty() => Some(check_identifier(
            log_type,
            &format!("patterns[{index}].table"),
            t,
        )?),
        _ => None,
    };

    let mut rules: Vec<TosserRule> = Vec::with_capacity(def.tossers.len());
    for text in &def.tossers {
        let rule = parse_tosser_rule(log_type, &name, text, groups, columns)?;
        if rules
            .iter()
            .any(|r| r.column.eq_ignore_ascii_case(&rule.column))
        {
            return Err(CatalogError::InvalidTosserRule {
                log_type: log_type.to_string(),
                pattern: name,
                rule: text.clone(),
                reason: "column is mapped more than once",
            });
        }
        rules.push(rule);
    }

    Ok(ExtractionPattern {
        name,
        quick_filter: def.quick_filter,
        regex,
        rules: TosserRules::new(rules),
        table,
        counters: PatternCounters::default(),
    })
}

/// Parse one `column=value` rule into its typed form.
pub fn parse_tosser_rule(
    log_type: &str,
    pattern: &str,
    text: &str,
    groups: usize,
    columns: &ColumnSet,
) -> Result<TosserRule, CatalogError> {
    let invalid = |reason| CatalogError::InvalidTosserRule {
        log_type: log_type.to_string(),
        pattern: pattern.to_string(),
        rule: text.to_string(),
        reason,
    };

    let (column, value) = text.split_once('=').ok_or_else(|| invalid("expected 'column=value'"))?;
    let column = column.trim();
    if column.is_empty() {
        return Err(invalid("column name is empty"));
    }
    let Some(declared) = columns.get(column) else {
        return Err(CatalogError::UnknownColumn {
            log_type: log_type.to_string(),
            pattern: pattern.to_string(),
            column: column.to_string(),
        });
    };

    let check_index = |index: usize| {
        if index < groups {
            Ok(index)
        } else {
            Err(CatalogError::CaptureOutOfRange {
                log_type: log_type.to_string(),
                pattern: pattern.to_string(),
                index,
                groups,
            })
        }
    };

    let value = value.trim();
    let value = if let Some(index) = value.strip_prefix('#').and_then(|n| n.parse().ok()) {
        TosserValue::Capture(check_index(index)?)
    } else if value.contains("$(") {
        for token in template::tokens(value) {
            if let Ok(index) = token.parse::<usize>() {
                check_index(index)?;
            }
        }
        TosserValue::Composite(value.to_string())
    } else {
        TosserValue::Literal(value.to_string())
    };

    Ok(TosserRule {
        column: declared.name.clone(),
        value,
    })
}

/// Compile a regex pattern with length validation to prevent ReDoS.
fn compile_regex(log_type: &str, field: &str, pattern: &str) -> Result<Regex, CatalogError> {
    if pattern.len() > constants::MAX_REGEX_PATTERN_LENGTH {
        return Err(CatalogError::RegexTooLong {
            log_type: log_type.to_string(),
            field: field.to_string(),
            length: pattern.len(),
            max_length: constants::MAX_REGEX_PATTERN_LENGTH,
        });
    }

    Regex::new(pattern).map_err(|e| CatalogError::InvalidRegex {
        log_type: log_type.to_string(),
        field: field.to_string(),
        pattern: pattern.to_string(),
        source: e,
    })
}

// =============================================================================
// Built-in log types (embedded at compile time)
// =============================================================================

/// Embedded TOML content for built-in log types: (filename, TOML content).
pub fn builtin_sources() -> Vec<(&'static str, &'static str)> {
    vec![
        (
            "app_events.toml",
            include_str!("../../log_types/app_events.toml"),
        ),
        (
            "compact_trace.toml",
            include_str!("../../log_types/compact_trace.toml"),
        ),
        (
            "process_log.toml",
            include_str!("../../log_types/process_log.toml"),
        ),
    ]
}

/// Load and validate all built-in log types.
///
/// Invalid definitions are logged and skipped (non-fatal).
pub fn load_builtin_log_types() -> Vec<LogType> {
    let mut types = Vec::new();
    let mut failures = 0usize;

    for (filename, content) in builtin_sources() {
        let path = Path::new("<builtin>").join(filename);
        match parse_log_type_toml(content, &path).and_then(|def| validate_and_compile(def, true)) {
            Ok(log_type) => {
                tracing::debug!(log_type = %log_type.name, "Loaded built-in log type");
                types.push(log_type);
            }
            Err(e) => {
                tracing::error!(file = filename, error = %e, "Failed to load built-in log type");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        tracing::warn!(count = failures, "Some built-in log types failed to load");
    }

    types
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_TOML: &str = r#"
[log_type]
name = "app"
description = "Application log"
table = "AppFacts"
timestamp_format = "bymask:yyyy-mm-dd hh:mm:ss"
file_pattern = '\.log$'

[[columns]]
name = "code"
kind = "integer"

[[columns]]
name = "message"

[[patterns]]
name = "error"
quick_filter = "ERR"
regex = '^(\S+ \S+) ERR (\d+) (.+)$'
tossers = ["code=#1", "message=[$(1)] $(2)"]

[[patterns]]
name = "audit"
quick_filter = "AUDIT"
regex = '^(\S+ \S+) AUDIT (.+)$'
tossers = ["message=#1"]
table = "AuditFacts"
"#;

    fn compile(toml: &str) -> Result<LogType, CatalogError> {
        let def = parse_log_type_toml(toml, Path::new("test.toml"))?;
        validate_and_compile(def, false)
    }

    #[test]
    fn test_compile_valid_definition() {
        let lt = compile(VALID_TOML).unwrap();
        assert_eq!(lt.name, "app");
        assert_eq!(lt.scope, Scope::Directory);
        assert_eq!(lt.patterns.len(), 2);
        assert_eq!(lt.columns.len(), 2);
        assert!(!lt.is_builtin);
        assert_eq!(
            lt.patterns[0].rules.get("CODE").map(|r| &r.value),
            Some(&TosserValue::Capture(1))
        );
        assert_eq!(
            lt.patterns[0].rules.get("message").map(|r| &r.value),
            Some(&TosserValue::Composite("[$(1)] $(2)".into()))
        );
        assert_eq!(lt.tables(), vec!["AppFacts", "AuditFacts"]);
    }

    #[test]
    fn test_default_insert_template_lists_all_columns() {
        let lt = compile(VALID_TOML).unwrap();
        assert!(lt.insert_template.starts_with("INSERT INTO $(tableName) (Id, ProjectId"));
        assert!(lt.insert_template.contains("code, message) VALUES"));
        assert!(lt.insert_template.ends_with("$(code), $(message))"));
    }

    #[test]
    fn test_create_table_statements_cover_override_tables() {
        let lt = compile(VALID_TOML).unwrap();
        let stmts = create_table_statements(&lt);
        assert_eq!(stmts.len(), 4);
        assert!(stmts[0].starts_with("CREATE TABLE IF NOT EXISTS AppFacts ("));
        assert!(stmts[0].contains("code INTEGER"));
        assert!(stmts[0].contains("message TEXT"));
        assert!(stmts[2].starts_with("CREATE TABLE IF NOT EXISTS AuditFacts ("));
    }

    #[test]
    fn test_rule_for_undeclared_column_is_rejected() {
        let toml = VALID_TOML.replace("code=#1", "severity=#1");
        assert!(matches!(
            compile(&toml).unwrap_err(),
            CatalogError::UnknownColumn { column, .. } if column == "severity"
        ));
    }

    #[test]
    fn test_capture_index_beyond_groups_is_rejected() {
        let toml = VALID_TOML.replace("code=#1", "code=#3");
        assert!(matches!(
            compile(&toml).unwrap_err(),
            CatalogError::CaptureOutOfRange {
                index: 3,
                groups: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_composite_index_beyond_groups_is_rejected() {
        let toml = VALID_TOML.replace("[$(1)] $(2)", "$(7)");
        assert!(matches!(
            compile(&toml).unwrap_err(),
            CatalogError::CaptureOutOfRange { index: 7, .. }
        ));
    }

    #[test]
    fn test_rule_without_equals_is_rejected() {
        let toml = VALID_TOML.replace("code=#1", "code");
        assert!(matches!(
            compile(&toml).unwrap_err(),
            CatalogError::InvalidTosserRule { .. }
        ));
    }

    #[test]
    fn test_literal_rule() {
        let toml = VALID_TOML.replace("message=#1", "message=audited");
        let lt = compile(&toml).unwrap();
        assert_eq!(
            lt.patterns[1].rules.get("message").map(|r| &r.value),
            Some(&TosserValue::Literal("audited".into()))
        );
    }

    #[test]
    fn test_insert_template_tokens_are_checked() {
        let with_template = |template: &str| {
            VALID_TOML.replace(
                "file_pattern = '\\.log$'",
                &format!("file_pattern = '\\.log$'\ninsert_template = \"{template}\""),
            )
        };

        let ok = with_template(
            "INSERT INTO $(tableName) (Id, Code, Src) VALUES ($(factId), $(CODE), $(logfilename))",
        );
        let lt = compile(&ok).unwrap();
        assert!(lt.insert_template.contains("$(logfilename)"));

        let bad = with_template("INSERT INTO $(tableName) (Id, X) VALUES ($(factId), $(sevrity))");
        match compile(&bad).unwrap_err() {
            CatalogError::UnknownTemplateToken { token, .. } => assert_eq!(token, "sevrity"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unknown_timestamp_format_is_rejected() {
        let toml = VALID_TOML.replace("bymask:yyyy-mm-dd hh:mm:ss", "sundial");
        assert!(matches!(
            compile(&toml).unwrap_err(),
            CatalogError::UnknownTimestampFormat { .. }
        ));
    }

    #[test]
    fn test_column_clashing_with_fixed_column_is_rejected() {
        let toml = VALID_TOML.replace("name = \"message\"", "name = \"LineNo\"");
        assert!(matches!(
            compile(&toml).unwrap_err(),
            CatalogError::DuplicateColumn { .. }
        ));
    }

    #[test]
    fn test_bad_table_identifier_is_rejected() {
        let toml = VALID_TOML.replace("table = \"AppFacts\"", "table = \"App Facts; drop\"");
        assert!(matches!(
            compile(&toml).unwrap_err(),
            CatalogError::InvalidIdentifier { .. }
        ));
    }

    #[test]
    fn test_missing_name() {
        let toml = VALID_TOML.replace("name = \"app\"", "name = \"\"");
        match compile(&toml).unwrap_err() {
            CatalogError::MissingField { field, .. } => assert_eq!(field, "log_type.name"),
            other => panic!("Expected MissingField, got: {other:?}"),
        }
    }

    #[test]
    fn test_regex_too_long() {
        let long = "a".repeat(constants::MAX_REGEX_PATTERN_LENGTH + 1);
        let toml = VALID_TOML.replace(r"'\.log$'", &format!("'{long}'"));
        assert!(matches!(
            compile(&toml).unwrap_err(),
            CatalogError::RegexTooLong { .. }
        ));
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            compile("[log_type\nname=").unwrap_err(),
            CatalogError::TomlParse { .. }
        ));
    }

    #[test]
    fn test_load_builtin_log_types() {
        let types = load_builtin_log_types();
        assert_eq!(types.len(), builtin_sources().len());
        assert!(types.iter().all(|t| t.is_builtin));
        assert!(types.iter().any(|t| t.name == "app-events"));
        for t in &types {
            assert!(t.resolver().is_ok(), "{}", t.name);
        }
    }
}
