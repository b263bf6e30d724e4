// logfacts - core/timestamp.rs
//
// Timestamp resolution strategies.
//
// A log type names its strategy with a configuration string such as
// `compactts` or `bymask:yyyy-mm-dd hh:mm:ss.fff`. `TimestampFormat::parse`
// validates that string at load time; `TimestampFormat::build` produces the
// runtime `TimestampResolver`, which the log type constructs lazily once and
// caches. Resolvers are pure: file context arrives through `Attributes`.

use crate::core::model::Attributes;
use crate::util::constants;
use crate::util::error::TimestampError;
use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use std::sync::OnceLock;

// =============================================================================
// Registry
// =============================================================================

/// Validated timestamp format identifier (the registry key plus parameter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimestampFormat {
    /// `now`: ignore the input and use the current local time.
    Now,
    /// `bymask:<mask>`: per-character field mask.
    ByMask(String),
    /// `compactts`: `yyyymmdd,hhmmss,hh` fixed-width layout.
    Compact,
    /// `filename`: date from the log file name, time of day from the line.
    Filename,
}

impl TimestampFormat {
    /// Parse a configuration identifier. The identifier is case-insensitive;
    /// the parameter after the first `:` is kept verbatim (masks are
    /// case-sensitive).
    pub fn parse(identifier: &str) -> Result<Self, TimestampError> {
        let (name, param) = match identifier.split_once(':') {
            Some((name, param)) => (name, Some(param)),
            None => (identifier, None),
        };

        match name.trim().to_ascii_lowercase().as_str() {
            "now" | "current" => Ok(Self::Now),
            "bymask" | "mask" => match param {
                Some(mask) if !mask.is_empty() => Ok(Self::ByMask(mask.to_string())),
                _ => Err(TimestampError::MissingParameter { format: "bymask" }),
            },
            "compactts" => Ok(Self::Compact),
            "filename" | "byfilename" => Ok(Self::Filename),
            _ => Err(TimestampError::UnknownFormat {
                identifier: identifier.to_string(),
            }),
        }
    }

    /// Construct the runtime resolver for this format.
    pub fn build(&self) -> Result<TimestampResolver, TimestampError> {
        Ok(match self {
            Self::Now => TimestampResolver::CurrentInstant,
            Self::ByMask(mask) => TimestampResolver::MaskBased(MaskLayout::analyze(mask)?),
            Self::Compact => TimestampResolver::CompactNumeric,
            Self::Filename => TimestampResolver::FilenameDerived,
        })
    }
}

impl std::fmt::Display for TimestampFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Now => f.write_str("now"),
            Self::ByMask(mask) => write!(f, "bymask:{mask}"),
            Self::Compact => f.write_str("compactts"),
            Self::Filename => f.write_str("filename"),
        }
    }
}

// =============================================================================
// Resolver
// =============================================================================

/// A constructed timestamp strategy. Each variant holds only its own state.
#[derive(Debug, Clone)]
pub enum TimestampResolver {
    CurrentInstant,
    MaskBased(MaskLayout),
    CompactNumeric,
    FilenameDerived,
}

impl TimestampResolver {
    /// Replace the strategy's parameter. Only the mask strategy has one;
    /// the others accept and ignore it.
    pub fn set_parameter(&mut self, text: &str) -> Result<(), TimestampError> {
        if let Self::MaskBased(layout) = self {
            *layout = MaskLayout::analyze(text)?;
        }
        Ok(())
    }

    /// Resolve `text` without any file context.
    pub fn parse(&self, text: &str) -> Result<NaiveDateTime, TimestampError> {
        self.parse_with_context(text, &Attributes::default())
    }

    /// Resolve `text`, consulting file-level context attributes where the
    /// strategy needs them.
    pub fn parse_with_context(
        &self,
        text: &str,
        attributes: &Attributes,
    ) -> Result<NaiveDateTime, TimestampError> {
        match self {
            Self::CurrentInstant => Ok(Local::now().naive_local()),
            Self::MaskBased(layout) => layout.parse(text, attributes),
            Self::CompactNumeric => parse_compact(text),
            Self::FilenameDerived => parse_filename_derived(text, attributes),
        }
    }
}

/// Render a resolved instant the way facts store it.
pub fn format_instant(instant: &NaiveDateTime) -> String {
    instant.format(constants::FACT_TIME_FORMAT).to_string()
}

// =============================================================================
// Mask strategy
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Fraction,
}

/// Per-offset field assignment derived from a mask string.
#[derive(Debug, Clone)]
pub struct MaskLayout {
    mask: String,
    offsets: Vec<Option<Field>>,
    /// Characters up to and including the last field character.
    required_len: usize,
}

impl MaskLayout {
    /// Analyse a mask. Codes: `y` year, `M` month, `d` day, `h`/`H` hour,
    /// `n` minute, `s` second, `f` fraction. A run of `m` is minutes when it
    /// directly follows an hour run or precedes a second run, month otherwise.
    /// Every other character is a literal separator.
    pub fn analyze(mask: &str) -> Result<Self, TimestampError> {
        let mut runs: Vec<(char, usize)> = Vec::new();
        for c in mask.chars() {
            match runs.last_mut() {
                Some((last, len)) if *last == c => *len += 1,
                _ => runs.push((c, 1)),
            }
        }

        let fixed = |c: char| match c {
            'y' | 'Y' => Some(Field::Year),
            'M' => Some(Field::Month),
            'd' | 'D' => Some(Field::Day),
            'h' | 'H' => Some(Field::Hour),
            'n' | 'N' => Some(Field::Minute),
            's' | 'S' => Some(Field::Second),
            'f' | 'F' => Some(Field::Fraction),
            _ => None,
        };

        let mut fields: Vec<Option<Field>> = Vec::with_capacity(runs.len());
        for (i, (c, _)) in runs.iter().enumerate() {
            let field = if *c == 'm' {
                let after_hour = runs[..i]
                    .iter()
                    .rev()
                    .find(|(p, _)| fixed(*p).is_some() || *p == 'm')
                    .is_some_and(|(p, _)| fixed(*p) == Some(Field::Hour));
                let before_second = runs[i + 1..]
                    .iter()
                    .find(|(n, _)| fixed(*n).is_some() || *n == 'm')
                    .is_some_and(|(n, _)| fixed(*n) == Some(Field::Second));
                if after_hour || before_second {
                    Some(Field::Minute)
                } else {
                    Some(Field::Month)
                }
            } else {
                fixed(*c)
            };
            fields.push(field);
        }

        if fields.iter().all(Option::is_none) {
            return Err(TimestampError::Malformed {
                format: "bymask",
                input: mask.to_string(),
                reason: "mask has no date or time fields",
            });
        }

        let mut offsets = Vec::with_capacity(mask.chars().count());
        for ((_, len), field) in runs.iter().zip(fields) {
            offsets.extend(std::iter::repeat(field).take(*len));
        }

        let required_len = offsets.iter().rposition(Option::is_some).map_or(0, |i| i + 1);
        Ok(Self {
            mask: mask.to_string(),
            offsets,
            required_len,
        })
    }

    /// The mask this layout was built from.
    pub fn mask(&self) -> &str {
        &self.mask
    }

    fn parse(&self, text: &str, attributes: &Attributes) -> Result<NaiveDateTime, TimestampError> {
        let malformed = |reason: &'static str| TimestampError::Malformed {
            format: "bymask",
            input: text.to_string(),
            reason,
        };
        if text.chars().count() < self.required_len {
            return Err(malformed("text is shorter than the mask"));
        }

        let mut year = String::new();
        let mut month = String::new();
        let mut day = String::new();
        let mut hour = String::new();
        let mut minute = String::new();
        let mut second = String::new();
        let mut fraction = String::new();

        for (ch, field) in text.chars().zip(self.offsets.iter()) {
            let buf = match field {
                Some(Field::Year) => &mut year,
                Some(Field::Month) => &mut month,
                Some(Field::Day) => &mut day,
                Some(Field::Hour) => &mut hour,
                Some(Field::Minute) => &mut minute,
                Some(Field::Second) => &mut second,
                Some(Field::Fraction) => &mut fraction,
                None => continue,
            };
            buf.push(ch);
        }

        // Every field the mask declares must carry at least one digit.
        let fields = [
            (Field::Year, &year),
            (Field::Month, &month),
            (Field::Day, &day),
            (Field::Hour, &hour),
            (Field::Minute, &minute),
            (Field::Second, &second),
            (Field::Fraction, &fraction),
        ];
        for (field, buf) in fields {
            if buf.trim().is_empty() && self.offsets.contains(&Some(field)) {
                return Err(malformed("a mask field is blank"));
            }
        }
        let number = |s: &str, default: u32| -> Result<u32, TimestampError> {
            let s = s.trim();
            if s.is_empty() {
                return Ok(default);
            }
            if !s.bytes().all(|b| b.is_ascii_digit()) {
                return Err(malformed("non-digit character in a numeric field"));
            }
            s.parse().map_err(|_| malformed("numeric field overflow"))
        };

        let date = if year.is_empty() && month.is_empty() && day.is_empty() {
            date_from_context(attributes)?
        } else {
            if year.trim().is_empty() {
                return Err(malformed("mask has date fields but no year"));
            }
            let mut y = number(&year, 0)? as i32;
            if year.trim().len() <= 2 {
                y += 2000;
            }
            NaiveDate::from_ymd_opt(y, number(&month, 1)?, number(&day, 1)?).ok_or(
                TimestampError::OutOfRange {
                    format: "bymask",
                    input: text.to_string(),
                },
            )?
        };

        let nanos = fraction_nanos(&fraction).ok_or_else(|| malformed("fraction is not numeric"))?;
        let time = NaiveTime::from_hms_nano_opt(
            number(&hour, 0)?,
            number(&minute, 0)?,
            number(&second, 0)?,
            nanos,
        )
        .ok_or(TimestampError::OutOfRange {
            format: "bymask",
            input: text.to_string(),
        })?;

        Ok(date.and_time(time))
    }
}

/// Convert fractional-second digits to nanoseconds (`"44"` -> 440 ms).
fn fraction_nanos(digits: &str) -> Option<u32> {
    let digits = digits.trim();
    if digits.is_empty() {
        return Some(0);
    }
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let mut padded: String = digits.chars().take(9).collect();
    while padded.len() < 9 {
        padded.push('0');
    }
    padded.parse().ok()
}

fn date_from_context(attributes: &Attributes) -> Result<NaiveDate, TimestampError> {
    let raw = attributes
        .get(constants::ATTR_LOG_DATE)
        .ok_or(TimestampError::MissingContext {
            attribute: constants::ATTR_LOG_DATE,
        })?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| TimestampError::Malformed {
        format: "logdate",
        input: raw.to_string(),
        reason: "expected YYYY-MM-DD",
    })
}

// =============================================================================
// Compact numeric strategy
// =============================================================================

/// Parse `yyyymmdd,hhmmss[,hh]` by fixed offsets; the optional trailing
/// field is hundredths of a second.
fn parse_compact(text: &str) -> Result<NaiveDateTime, TimestampError> {
    let text = text.trim();
    let field = |start: usize, len: usize| -> Option<u32> {
        let s = text.get(start..start + len)?;
        if s.bytes().all(|b| b.is_ascii_digit()) {
            s.parse().ok()
        } else {
            None
        }
    };
    let malformed = || TimestampError::Malformed {
        format: "compactts",
        input: text.to_string(),
        reason: "expected yyyymmdd,hhmmss,hh",
    };

    let year = field(0, 4).ok_or_else(malformed)?;
    let month = field(4, 2).ok_or_else(malformed)?;
    let day = field(6, 2).ok_or_else(malformed)?;
    let hour = field(9, 2).ok_or_else(malformed)?;
    let minute = field(11, 2).ok_or_else(malformed)?;
    let second = field(13, 2).ok_or_else(malformed)?;
    let hundredths = if text.len() > 15 {
        field(16, 2).ok_or_else(malformed)?
    } else {
        0
    };

    NaiveDate::from_ymd_opt(year as i32, month, day)
        .and_then(|d| d.and_hms_milli_opt(hour, minute, second, hundredths * 10))
        .ok_or(TimestampError::OutOfRange {
            format: "compactts",
            input: text.to_string(),
        })
}

// =============================================================================
// Filename-derived strategy
// =============================================================================

/// What a log file's name says about its contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameParts {
    pub date: NaiveDate,
    /// Process start, from the `<name>_<yyyymmdd>_<hhmmss>_<pid>` sub-format.
    pub start: Option<NaiveDateTime>,
    pub process_id: Option<String>,
}

fn filename_regexes() -> &'static [Regex; 3] {
    static RES: OnceLock<[Regex; 3]> = OnceLock::new();
    RES.get_or_init(|| {
        // Literal patterns, covered by the tests below.
        fn re(pat: &str) -> Regex {
            Regex::new(pat).expect("filename_regexes: invalid regex")
        }
        [
            re(r"(?:^|[^0-9])(\d{8})_(\d{6})_(\d+)(?:[^0-9]|$)"),
            re(r"(?:^|[^0-9])(\d{8})(?:[^0-9]|$)"),
            re(r"(?:^|[^0-9])(\d{6})(?:[^0-9]|$)"),
        ]
    })
}

/// Derive the date (and optionally start instant and process id) encoded in
/// a log file name. Returns `None` when the name carries no usable date.
pub fn filename_parts(file_name: &str) -> Option<FilenameParts> {
    let [with_start, date8, date6] = filename_regexes();

    if let Some(caps) = with_start.captures(file_name) {
        let date = NaiveDate::parse_from_str(&caps[1], "%Y%m%d").ok();
        let time = NaiveTime::parse_from_str(&caps[2], "%H%M%S").ok();
        if let (Some(date), Some(time)) = (date, time) {
            return Some(FilenameParts {
                date,
                start: Some(date.and_time(time)),
                process_id: Some(caps[3].to_string()),
            });
        }
    }
    if let Some(caps) = date8.captures(file_name) {
        if let Ok(date) = NaiveDate::parse_from_str(&caps[1], "%Y%m%d") {
            return Some(FilenameParts {
                date,
                start: None,
                process_id: None,
            });
        }
    }
    if let Some(caps) = date6.captures(file_name) {
        if let Ok(date) = NaiveDate::parse_from_str(&caps[1], "%y%m%d") {
            return Some(FilenameParts {
                date,
                start: None,
                process_id: None,
            });
        }
    }
    None
}

/// File-level context attributes derived from a file name, merged into the
/// log file's attribute map at the start of every parse.
pub fn derive_file_attributes(file_name: &str) -> Vec<(&'static str, String)> {
    let mut attrs = vec![(constants::ATTR_LOG_FILE_NAME, file_name.to_string())];
    if let Some(parts) = filename_parts(file_name) {
        attrs.push((constants::ATTR_LOG_DATE, parts.date.format("%Y-%m-%d").to_string()));
        if let Some(start) = parts.start {
            attrs.push((constants::ATTR_LOG_START, format_instant(&start)));
        }
        if let Some(pid) = parts.process_id {
            attrs.push((constants::ATTR_PROCESS_ID, pid));
        }
    }
    attrs
}

fn time_of_day_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d{1,2}):(\d{2}):(\d{2})(?:[.,](\d{1,9}))?")
            .expect("time_of_day_regex: invalid regex")
    })
}

fn parse_filename_derived(
    text: &str,
    attributes: &Attributes,
) -> Result<NaiveDateTime, TimestampError> {
    let file_name = attributes
        .get(constants::ATTR_LOG_FILE_NAME)
        .ok_or(TimestampError::MissingContext {
            attribute: constants::ATTR_LOG_FILE_NAME,
        })?;

    // Prefer the attributes derived at parse start; fall back to the name.
    let (date, start) = match date_from_context(attributes) {
        Ok(date) => {
            let start = attributes
                .get(constants::ATTR_LOG_START)
                .and_then(|s| NaiveDateTime::parse_from_str(s, constants::FACT_TIME_FORMAT).ok());
            (date, start)
        }
        Err(_) => {
            let parts = filename_parts(file_name).ok_or_else(|| TimestampError::Malformed {
                format: "filename",
                input: file_name.to_string(),
                reason: "file name carries no date",
            })?;
            (parts.date, parts.start)
        }
    };

    let caps = time_of_day_regex()
        .captures(text)
        .ok_or_else(|| TimestampError::Malformed {
            format: "filename",
            input: text.to_string(),
            reason: "no hh:mm:ss time of day",
        })?;
    let out_of_range = || TimestampError::OutOfRange {
        format: "filename",
        input: text.to_string(),
    };
    let part = |i: usize| -> Result<u32, TimestampError> {
        caps[i].parse().map_err(|_| out_of_range())
    };
    let nanos = caps
        .get(4)
        .and_then(|m| fraction_nanos(m.as_str()))
        .unwrap_or(0);
    let time = NaiveTime::from_hms_nano_opt(part(1)?, part(2)?, part(3)?, nanos)
        .ok_or_else(out_of_range)?;

    // A process that ran past midnight logs times earlier than its start.
    let date = match start {
        Some(start) if time < start.time() => date + Duration::days(1),
        _ => date,
    };
    Ok(date.and_time(time))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &str)]) -> Attributes {
        let mut a = Attributes::default();
        for (k, v) in pairs {
            a.insert(k, *v);
        }
        a
    }

    fn fmt(dt: NaiveDateTime) -> String {
        format_instant(&dt)
    }

    #[test]
    fn test_registry_is_case_insensitive() {
        assert_eq!(TimestampFormat::parse("CompactTS").unwrap(), TimestampFormat::Compact);
        assert_eq!(TimestampFormat::parse("NOW").unwrap(), TimestampFormat::Now);
        assert_eq!(
            TimestampFormat::parse("ByMask:yyyyMMdd").unwrap(),
            TimestampFormat::ByMask("yyyyMMdd".to_string())
        );
    }

    #[test]
    fn test_registry_rejects_unknown_and_missing_parameter() {
        assert!(matches!(
            TimestampFormat::parse("julian"),
            Err(TimestampError::UnknownFormat { .. })
        ));
        assert!(matches!(
            TimestampFormat::parse("bymask"),
            Err(TimestampError::MissingParameter { .. })
        ));
    }

    #[test]
    fn test_compact_with_hundredths() {
        let r = TimestampFormat::Compact.build().unwrap();
        let ts = r.parse("20190531,172355,44").unwrap();
        assert_eq!(fmt(ts), "2019-05-31T17:23:55.440");
    }

    #[test]
    fn test_compact_without_hundredths() {
        let r = TimestampFormat::Compact.build().unwrap();
        assert_eq!(fmt(r.parse("20190531,172355").unwrap()), "2019-05-31T17:23:55.000");
    }

    #[test]
    fn test_compact_rejects_bad_month() {
        let r = TimestampFormat::Compact.build().unwrap();
        assert!(matches!(
            r.parse("20191331,172355,44"),
            Err(TimestampError::OutOfRange { .. })
        ));
        assert!(matches!(r.parse("2019"), Err(TimestampError::Malformed { .. })));
    }

    #[test]
    fn test_mask_date_only() {
        let r = TimestampFormat::parse("bymask:yyyymmdd").unwrap().build().unwrap();
        assert_eq!(fmt(r.parse("20190531").unwrap()), "2019-05-31T00:00:00.000");
    }

    #[test]
    fn test_mask_minutes_after_hours() {
        let r = TimestampFormat::parse("bymask:yyyy-mm-dd hh:mm:ss.fff")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(
            fmt(r.parse("2021-03-04 05:06:07.089").unwrap()),
            "2021-03-04T05:06:07.089"
        );
    }

    #[test]
    fn test_mask_two_digit_year_and_day_first() {
        let r = TimestampFormat::parse("bymask:dd.MM.yy HH:nn")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(fmt(r.parse("26.02.24 22:07").unwrap()), "2024-02-26T22:07:00.000");
    }

    #[test]
    fn test_mask_time_only_uses_logdate() {
        let r = TimestampFormat::parse("bymask:hh:mm:ss").unwrap().build().unwrap();
        let ctx = attrs(&[("logdate", "2020-01-02")]);
        assert_eq!(
            fmt(r.parse_with_context("10:11:12", &ctx).unwrap()),
            "2020-01-02T10:11:12.000"
        );
        assert!(matches!(
            r.parse("10:11:12"),
            Err(TimestampError::MissingContext { .. })
        ));
    }

    #[test]
    fn test_mask_rejects_truncated_text() {
        let r = TimestampFormat::parse("bymask:yyyymmdd").unwrap().build().unwrap();
        assert!(matches!(r.parse("2019"), Err(TimestampError::Malformed { .. })));

        let r = TimestampFormat::parse("bymask:yyyy-mm-dd hh:mm:ss")
            .unwrap()
            .build()
            .unwrap();
        assert!(matches!(
            r.parse("2019-05-31 17"),
            Err(TimestampError::Malformed { .. })
        ));
        // Trailing text after the last field is ignored.
        assert_eq!(
            fmt(r.parse("2019-05-31 17:23:55 extra").unwrap()),
            "2019-05-31T17:23:55.000"
        );
    }

    #[test]
    fn test_mask_rejects_blank_field() {
        let r = TimestampFormat::parse("bymask:yyyy-mm-dd hh:mm:ss")
            .unwrap()
            .build()
            .unwrap();
        assert!(matches!(
            r.parse("2019-05-31   :23:55"),
            Err(TimestampError::Malformed { .. })
        ));
        // Space padding inside a field still leaves a digit.
        assert_eq!(
            fmt(r.parse("2019-05-31  7:23:55").unwrap()),
            "2019-05-31T07:23:55.000"
        );
    }

    #[test]
    fn test_mask_rejects_letters_in_fields() {
        let r = TimestampFormat::parse("bymask:yyyymmdd").unwrap().build().unwrap();
        assert!(matches!(r.parse("2019ab31"), Err(TimestampError::Malformed { .. })));
    }

    #[test]
    fn test_set_parameter_replaces_mask() {
        let mut r = TimestampFormat::parse("bymask:yyyymmdd").unwrap().build().unwrap();
        r.set_parameter("ddmmyyyy").unwrap();
        assert_eq!(fmt(r.parse("31052019").unwrap()), "2019-05-31T00:00:00.000");
        assert!(r.set_parameter("----").is_err());
    }

    #[test]
    fn test_filename_requires_logfilename() {
        let r = TimestampFormat::Filename.build().unwrap();
        assert_eq!(
            r.parse("12:00:00"),
            Err(TimestampError::MissingContext {
                attribute: "logfilename"
            })
        );
    }

    #[test]
    fn test_filename_date_merged_with_time_of_day() {
        let r = TimestampFormat::Filename.build().unwrap();
        let ctx = attrs(&[("logfilename", "server_20190531.log")]);
        assert_eq!(
            fmt(r.parse_with_context("[17:23:55.5] started", &ctx).unwrap()),
            "2019-05-31T17:23:55.500"
        );
    }

    #[test]
    fn test_filename_start_rolls_past_midnight() {
        let r = TimestampFormat::Filename.build().unwrap();
        let ctx = attrs(&[("logfilename", "worker_20190531_230000_4711.log")]);
        assert_eq!(
            fmt(r.parse_with_context("23:30:00", &ctx).unwrap()),
            "2019-05-31T23:30:00.000"
        );
        assert_eq!(
            fmt(r.parse_with_context("00:15:00", &ctx).unwrap()),
            "2019-06-01T00:15:00.000"
        );
    }

    #[test]
    fn test_filename_parts_variants() {
        let full = filename_parts("worker_20190531_230000_4711.log").unwrap();
        assert_eq!(full.process_id.as_deref(), Some("4711"));
        assert!(full.start.is_some());

        let short = filename_parts("ex190531.log").unwrap();
        assert_eq!(short.date, NaiveDate::from_ymd_opt(2019, 5, 31).unwrap());
        assert!(short.start.is_none());

        assert!(filename_parts("app.log").is_none());
    }

    #[test]
    fn test_derive_file_attributes() {
        let attrs = derive_file_attributes("worker_20190531_230000_4711.log");
        let get = |k: &str| attrs.iter().find(|(n, _)| *n == k).map(|(_, v)| v.as_str());
        assert_eq!(get("logfilename"), Some("worker_20190531_230000_4711.log"));
        assert_eq!(get("logdate"), Some("2019-05-31"));
        assert_eq!(get("logstart"), Some("2019-05-31T23:00:00.000"));
        assert_eq!(get("processid"), Some("4711"));
    }
}
