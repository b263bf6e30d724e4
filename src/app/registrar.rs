// logfacts - app/registrar.rs
//
// Fact registration: identity, counters, statement expansion, write.

use crate::app::write_queue::WriteQueue;
use crate::core::model::{Attributes, LogFact, LogFile, LogType, ParseProject};
use crate::core::store::FactStore;
use crate::core::template::{self, Field, TemplateContext};
use crate::util::error::StoreError;

/// Where rendered statements go.
#[derive(Debug, Clone, Copy)]
pub enum FactSink<'a> {
    /// Written before `register` returns.
    Direct(&'a dyn FactStore),
    /// Queued; the coordinator awaits the queue's flush barrier.
    Queued(&'a WriteQueue),
}

/// Registers the facts of one parse pass of one file.
#[derive(Debug)]
pub struct FactRegistrar<'a> {
    pub project: &'a ParseProject,
    pub log_type: &'a LogType,
    pub file: &'a LogFile,
    /// Snapshot of the file's attributes taken at the start of the pass.
    pub attributes: &'a Attributes,
    pub sink: FactSink<'a>,
    /// Rendered into every fact's `created` field.
    pub created: &'a str,
}

impl FactRegistrar<'_> {
    /// Assign the fact its id, count it, render its insert statement and hand
    /// the statement to the sink.
    pub fn register(&self, fact: &mut LogFact<'_>) -> Result<(), StoreError> {
        let pattern = fact.pattern;
        fact.id = self.project.next_fact_id(|_| {
            pattern.counters.add_fact();
            self.file.add_fact();
        });

        let statement = self.render(fact);
        tracing::trace!(fact_id = fact.id, line = fact.line_number, "Fact registered");

        match self.sink {
            FactSink::Direct(store) => store.execute_write(&statement).map(|_| ()),
            FactSink::Queued(queue) => queue.enqueue(self.file.id, statement),
        }
    }

    /// The expanded insert statement for `fact`.
    pub fn render(&self, fact: &LogFact<'_>) -> String {
        let fixed = [
            Field::raw("tableName", self.log_type.table_for(fact.pattern)),
            Field::number("factId", fact.id),
            Field::number("projectId", self.project.id),
            Field::number("logId", self.file.id),
            Field::number("lineNo", fact.line_number),
            Field::text("factType", Some(fact.pattern.name.as_str())),
            Field::text("line", Some(fact.line)),
            Field::text("logTime", fact.log_time.as_deref()),
            Field::text("created", Some(self.created)),
        ];
        let ctx = TemplateContext {
            fixed: &fixed,
            rules: Some(&fact.pattern.rules),
            values: &fact.values,
            attributes: Some(self.attributes),
            columns: Some(&self.log_type.columns),
            ..Default::default()
        };
        template::expand(&self.log_type.insert_template, &ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::logtype::{create_table_statements, parse_log_type_toml, validate_and_compile};
    use crate::core::matcher::{build_fact, PatternMatcher};
    use crate::core::model::{ClaimPolicy, ParseMeta};
    use crate::core::store::Value;
    use crate::platform::sqlite::SqliteFactStore;
    use std::path::{Path, PathBuf};

    const ERRORS_TOML: &str = r#"
[log_type]
name = "errors"
table = "Errors"
timestamp_format = "now"
file_pattern = '\.log$'

[[columns]]
name = "code"
kind = "integer"

[[columns]]
name = "message"

[[columns]]
name = "host"

[[patterns]]
name = "err"
quick_filter = "ERR"
regex = 'ERR (\d+) (.+)'
tossers = ["code=#0", "message=#1"]
"#;

    fn log_type() -> LogType {
        let def = parse_log_type_toml(ERRORS_TOML, Path::new("errors.toml")).unwrap();
        validate_and_compile(def, false).unwrap()
    }

    #[test]
    fn test_code_column_takes_first_capture() {
        let lt = log_type();
        let project = ParseProject::new(3, lt.name.clone(), PathBuf::from("/logs"), 0);
        let file = LogFile::new(11, PathBuf::from("/logs/a.log"), ParseMeta::default());
        let mut attrs = Attributes::default();
        attrs.insert("host", "db01");

        let line = "2019-01-01 ERR 42 disk full";
        let matched = PatternMatcher::new(&lt.patterns, ClaimPolicy::Exclusive)
            .first_match(line)
            .unwrap();
        assert_eq!(matched.values, vec!["42".to_string(), "disk full".to_string()]);
        let mut fact = build_fact(matched, 1, line, lt.resolver().unwrap(), &attrs).unwrap();

        let store = SqliteFactStore::open_in_memory().unwrap();
        for stmt in create_table_statements(&lt) {
            store.execute_write(&stmt).unwrap();
        }
        let registrar = FactRegistrar {
            project: &project,
            log_type: &lt,
            file: &file,
            attributes: &attrs,
            sink: FactSink::Direct(&store),
            created: "2024-01-01T00:00:00.000",
        };
        registrar.register(&mut fact).unwrap();

        assert_eq!(fact.id, 1);
        assert_eq!(file.facts(), 1);
        assert_eq!(lt.patterns[0].counters.facts(), 1);

        let statement = registrar.render(&fact);
        assert!(statement.contains("VALUES (1, 3, 11, 1, 'err', "), "{statement}");
        assert!(statement.ends_with(", 42, 'disk full', 'db01')"), "{statement}");

        let rows = store
            .execute_query("SELECT code, message, host, LogTime FROM Errors")
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0][..3],
            [
                Value::Integer(42),
                Value::Text("disk full".into()),
                Value::Text("db01".into()),
            ]
        );
        assert!(rows[0][3].as_str().is_some());
    }

    #[test]
    fn test_ids_continue_from_project_counter() {
        let lt = log_type();
        let project = ParseProject::new(1, lt.name.clone(), PathBuf::from("/logs"), 99);
        let file = LogFile::new(1, PathBuf::from("/logs/a.log"), ParseMeta::default());
        let attrs = Attributes::default();
        let store = SqliteFactStore::open_in_memory().unwrap();
        for stmt in create_table_statements(&lt) {
            store.execute_write(&stmt).unwrap();
        }
        let registrar = FactRegistrar {
            project: &project,
            log_type: &lt,
            file: &file,
            attributes: &attrs,
            sink: FactSink::Direct(&store),
            created: "now",
        };
        let line = "ERR 7 x";
        for n in 0..3u64 {
            let m = PatternMatcher::new(&lt.patterns, ClaimPolicy::Exclusive)
                .first_match(line)
                .unwrap();
            let mut fact = build_fact(m, n + 1, line, lt.resolver().unwrap(), &attrs).unwrap();
            registrar.register(&mut fact).unwrap();
            assert_eq!(fact.id, 100 + n);
        }
        assert_eq!(project.last_fact_id(), 102);
    }
}
