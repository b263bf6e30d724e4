// logfacts - core/template.rs
//
// Macro expansion of `$(name)` tokens in statement templates.
//
// Resolution order, first match wins:
//   1. fixed fields supplied by the caller
//   2. the pattern's tosser rule for that destination column
//   3. a file-level context attribute
//   4. the literal `null`
// All lookups are case-insensitive. In SQL mode text values are quoted with
// embedded quotes doubled, numeric values are inlined bare, and an empty
// numeric value becomes `null`.

use crate::core::model::{Attributes, ColumnKind, ColumnSet, TosserRules, TosserValue};
use std::borrow::Cow;

/// How substituted values are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quoting {
    /// SQL literals: text quoted, numbers bare.
    #[default]
    Sql,
    /// Raw values, for non-SQL documents.
    None,
}

/// How a single value is rendered in SQL mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Inlined verbatim (identifiers such as table names).
    Raw,
    Number,
    Text,
}

impl From<ColumnKind> for ValueKind {
    fn from(kind: ColumnKind) -> Self {
        if kind.is_text() {
            Self::Text
        } else {
            Self::Number
        }
    }
}

/// A caller-supplied fixed field.
#[derive(Debug, Clone)]
pub struct Field<'a> {
    pub name: &'a str,
    pub value: Option<Cow<'a, str>>,
    pub kind: ValueKind,
}

impl<'a> Field<'a> {
    pub fn raw(name: &'a str, value: impl Into<Cow<'a, str>>) -> Self {
        Self {
            name,
            value: Some(value.into()),
            kind: ValueKind::Raw,
        }
    }

    pub fn number(name: &'a str, value: impl ToString) -> Self {
        Self {
            name,
            value: Some(Cow::Owned(value.to_string())),
            kind: ValueKind::Number,
        }
    }

    pub fn text(name: &'a str, value: Option<&'a str>) -> Self {
        Self {
            name,
            value: value.map(Cow::Borrowed),
            kind: ValueKind::Text,
        }
    }
}

/// Everything a template may draw on.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateContext<'a> {
    pub fixed: &'a [Field<'a>],
    pub rules: Option<&'a TosserRules>,
    /// Captured values the rules index into.
    pub values: &'a [String],
    pub attributes: Option<&'a Attributes>,
    /// Declared column kinds; undeclared names render as text.
    pub columns: Option<&'a ColumnSet>,
    pub quoting: Quoting,
}

/// Iterate the names of all `$(name)` tokens in `template`.
pub fn tokens(template: &str) -> impl Iterator<Item = &str> {
    let mut rest = template;
    std::iter::from_fn(move || {
        let start = rest.find("$(")?;
        let after = &rest[start + 2..];
        let end = after.find(')')?;
        rest = &after[end + 1..];
        Some(after[..end].trim())
    })
}

/// Expand every `$(name)` token in `template`.
pub fn expand(template: &str, ctx: &TemplateContext<'_>) -> String {
    let mut out = String::with_capacity(template.len() + 64);
    let mut rest = template;

    while let Some(start) = rest.find("$(") {
        let after = &rest[start + 2..];
        let Some(end) = after.find(')') else {
            break;
        };
        out.push_str(&rest[..start]);
        let (value, kind) = resolve(after[..end].trim(), ctx);
        render(&mut out, value.as_deref(), kind, ctx.quoting);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

fn resolve<'a>(name: &str, ctx: &TemplateContext<'a>) -> (Option<Cow<'a, str>>, ValueKind) {
    if let Some(field) = ctx.fixed.iter().find(|f| f.name.eq_ignore_ascii_case(name)) {
        return (field.value.clone(), field.kind);
    }

    let kind = ctx
        .columns
        .and_then(|c| c.get(name))
        .map_or(ValueKind::Text, |c| c.kind.into());

    if let Some(rule) = ctx.rules.and_then(|r| r.get(name)) {
        return (apply_rule(&rule.value, ctx.values), kind);
    }

    if let Some(value) = ctx.attributes.and_then(|a| a.get(name)) {
        return (Some(Cow::Owned(value.to_string())), kind);
    }

    (None, ValueKind::Raw)
}

/// Evaluate a tosser rule against captured values. A capture reference to a
/// group that did not participate yields `None`.
pub fn apply_rule<'a>(value: &TosserValue, values: &[String]) -> Option<Cow<'a, str>> {
    match value {
        TosserValue::Capture(i) => values.get(*i).map(|v| Cow::Owned(v.clone())),
        TosserValue::Composite(template) => Some(Cow::Owned(expand_indices(template, values))),
        TosserValue::Literal(s) => Some(Cow::Owned(s.clone())),
    }
}

/// Replace `$(i)` placeholders with captured values; unknown indices become
/// empty strings.
fn expand_indices(template: &str, values: &[String]) -> String {
    let mut out = String::with_capacity(template.len() + 32);
    let mut rest = template;
    while let Some(start) = rest.find("$(") {
        let after = &rest[start + 2..];
        let Some(end) = after.find(')') else {
            break;
        };
        out.push_str(&rest[..start]);
        match after[..end].trim().parse::<usize>() {
            Ok(i) => out.push_str(values.get(i).map(String::as_str).unwrap_or("")),
            // Not an index: keep the token verbatim.
            Err(_) => out.push_str(&rest[start..start + 2 + end + 1]),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

fn render(out: &mut String, value: Option<&str>, kind: ValueKind, quoting: Quoting) {
    let Some(value) = value else {
        out.push_str("null");
        return;
    };
    match (quoting, kind) {
        (Quoting::None, _) | (Quoting::Sql, ValueKind::Raw) => out.push_str(value),
        (Quoting::Sql, ValueKind::Number) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                out.push_str("null");
            } else if trimmed.parse::<f64>().is_ok() {
                out.push_str(trimmed);
            } else {
                // Not a number: quoted so it can never alter the statement.
                push_quoted(out, trimmed);
            }
        }
        (Quoting::Sql, ValueKind::Text) => push_quoted(out, value),
    }
}

/// Append `value` as a single-quoted SQL literal.
pub fn push_quoted(out: &mut String, value: &str) {
    out.push('\'');
    for ch in value.chars() {
        if ch == '\'' {
            out.push('\'');
        }
        out.push(ch);
    }
    out.push('\'');
}

/// `value` as a single-quoted SQL literal.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    push_quoted(&mut out, value);
    out
}
