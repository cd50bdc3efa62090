//! Prompt template placeholders.
//!
//! A template is plain text with `{{KIND:arg}}` placeholders:
//!
//! - `{{INPUT:last10}}`: the 10 most recent transcript entries
//! - `{{INPUT:past5m}}`: transcript entries from the trailing 5 minutes (`s`, `m`, `h`)
//! - `{{NOTES:summary}}`: everything recorded under note tag `summary`
//!
//! Anything else between double braces parses as [`Placeholder::Unknown`] and
//! renders empty.

use std::collections::BTreeSet;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([^{}]*?)\s*\}\}").expect("placeholder pattern is valid")
});

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Placeholder {
    /// `INPUT:lastN`
    LastEntries(usize),
    /// `INPUT:pastD`
    Trailing(Duration),
    /// `NOTES:tag`
    Notes(String),
    /// Raw text between the braces.
    Unknown(String),
}

impl Placeholder {
    pub fn parse(inner: &str) -> Self {
        let unknown = || Self::Unknown(inner.to_string());
        let Some((kind, arg)) = inner.split_once(':') else {
            return unknown();
        };
        let arg = arg.trim();
        match kind.trim() {
            "INPUT" => parse_input_arg(arg).unwrap_or_else(unknown),
            "NOTES" if !arg.is_empty() => Self::Notes(arg.to_string()),
            _ => unknown(),
        }
    }
}

fn parse_input_arg(arg: &str) -> Option<Placeholder> {
    if let Some(count) = arg.strip_prefix("last") {
        return count.parse().ok().map(Placeholder::LastEntries);
    }
    let duration = arg.strip_prefix("past")?;
    let unit_at = duration.find(|c: char| !c.is_ascii_digit())?;
    let (amount, unit) = duration.split_at(unit_at);
    let amount: u64 = amount.parse().ok()?;
    let secs = match unit {
        "s" => amount,
        "m" => amount.checked_mul(60)?,
        "h" => amount.checked_mul(3600)?,
        _ => return None,
    };
    Some(Placeholder::Trailing(Duration::from_secs(secs)))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Placeholder(Placeholder),
}

/// A parsed prompt template. Parsing never fails.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

impl PromptTemplate {
    pub fn parse(source: &str) -> Self {
        let mut segments = Vec::new();
        let mut last = 0;
        for caps in PLACEHOLDER.captures_iter(source) {
            let whole = caps.get(0).expect("group 0 always matches");
            if whole.start() > last {
                segments.push(Segment::Text(source[last..whole.start()].to_string()));
            }
            segments.push(Segment::Placeholder(Placeholder::parse(&caps[1])));
            last = whole.end();
        }
        if last < source.len() {
            segments.push(Segment::Text(source[last..].to_string()));
        }
        Self { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &Placeholder> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder(p) => Some(p),
            Segment::Text(_) => None,
        })
    }

    /// Tags this template reads through `NOTES` placeholders.
    pub fn note_tags(&self) -> BTreeSet<&str> {
        self.placeholders()
            .filter_map(|p| match p {
                Placeholder::Notes(tag) => Some(tag.as_str()),
                _ => None,
            })
            .collect()
    }
}
