// logfacts - core/matcher.rs
//
// Line evaluation against a log type's ordered extraction patterns.
//
// The quick filter is a plain substring test that keeps the regex engine
// away from lines that cannot match. What happens after a filter hit is
// governed by `ClaimPolicy`; the default (`Exclusive`) lets the first filter
// hit own the line even if its regex then fails.

use crate::core::model::{Attributes, ClaimPolicy, ExtractionPattern, LogFact};
use crate::core::timestamp::{format_instant, TimestampResolver};
use crate::util::error::TimestampError;
use crate::util::logging::preview;

/// A successful regex match, before timestamp resolution.
#[derive(Debug)]
pub struct Matched<'p> {
    pub pattern: &'p ExtractionPattern,
    /// Capture groups after the full match; non-participating groups are empty.
    pub values: Vec<String>,
}

/// Outcome of evaluating one line.
#[derive(Debug, Default)]
pub struct LineMatch<'p> {
    pub matches: Vec<Matched<'p>>,
    /// Filter hits whose regex did not match (already counted on the pattern).
    pub misses: u32,
}

/// Evaluates lines against an ordered pattern list.
#[derive(Debug, Clone, Copy)]
pub struct PatternMatcher<'p> {
    patterns: &'p [ExtractionPattern],
    policy: ClaimPolicy,
}

impl<'p> PatternMatcher<'p> {
    pub fn new(patterns: &'p [ExtractionPattern], policy: ClaimPolicy) -> Self {
        Self { patterns, policy }
    }

    pub fn policy(&self) -> ClaimPolicy {
        self.policy
    }

    /// Evaluate `line`. Each pattern's regex runs at most once per line, and
    /// only after its quick filter hit.
    pub fn evaluate(&self, line: &str) -> LineMatch<'p> {
        let mut result = LineMatch::default();

        for pattern in self.patterns {
            if !line.contains(pattern.quick_filter.as_str()) {
                continue;
            }

            match pattern.regex.captures(line) {
                Some(caps) => {
                    let values = caps
                        .iter()
                        .skip(1)
                        .map(|m| m.map_or_else(String::new, |m| m.as_str().to_string()))
                        .collect();
                    result.matches.push(Matched { pattern, values });
                    if self.policy != ClaimPolicy::All {
                        break;
                    }
                }
                None => {
                    pattern.counters.add_error();
                    result.misses += 1;
                    tracing::debug!(
                        pattern = %pattern.name,
                        line = preview(line),
                        "Quick filter hit but regex did not match"
                    );
                    if self.policy == ClaimPolicy::Exclusive {
                        break;
                    }
                }
            }
        }

        result
    }

    /// The first match for `line` under the configured policy, if any.
    pub fn first_match(&self, line: &str) -> Option<Matched<'p>> {
        self.evaluate(line).matches.into_iter().next()
    }
}

/// Turn a match into a fact, resolving group 1 (by convention the time
/// substring) with the log type's timestamp resolver.
///
/// A pattern without groups, or whose time group is empty, yields a fact
/// without a time unless the resolver ignores its input anyway.
pub fn build_fact<'a>(
    matched: Matched<'a>,
    line_number: u64,
    line: &'a str,
    resolver: &TimestampResolver,
    attributes: &Attributes,
) -> Result<LogFact<'a>, TimestampError> {
    let time_text = matched.values.first().map(String::as_str).unwrap_or("");
    let log_time = if !time_text.is_empty()
        || matches!(resolver, TimestampResolver::CurrentInstant)
    {
        let instant = resolver.parse_with_context(time_text, attributes)?;
        Some(format_instant(&instant))
    } else {
        None
    };

    Ok(LogFact {
        pattern: matched.pattern,
        line_number,
        line,
        log_time,
        values: matched.values,
        id: 0,
    })
}
