use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised before a session ever reaches the network.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    /// The query was empty after trimming whitespace.
    #[error("Please enter a search term.")]
    EmptyQuery,
}

// ============================================================================
// Query
// ============================================================================

/// A non-empty, trimmed search query as typed by the user.
///
/// This is the string titles are matched against. The string sent upstream
/// is derived from it via [`Query::effective`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query(String);

impl Query {
    /// Trims `raw` and rejects it if nothing is left.
    pub fn parse(raw: &str) -> Result<Self, SessionError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(SessionError::EmptyQuery);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The query string sent to the search API.
    ///
    /// Date bounds are appended as `after:`/`before:` qualifiers so the
    /// proxy (which only forwards `q`) still narrows the upstream search.
    pub fn effective(&self, range: &DateRange) -> String {
        let mut effective = self.0.clone();
        if let Some(after) = range.after {
            effective.push_str(&format!(" after:{}", after.format("%Y-%m-%d")));
        }
        if let Some(before) = range.before {
            effective.push_str(&format!(" before:{}", before.format("%Y-%m-%d")));
        }
        effective
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// DateRange
// ============================================================================

/// Optional publish-date bounds, both inclusive, in UTC.
///
/// `after <= before` is not checked here; the upstream API rejects or
/// ignores inverted ranges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub after: Option<NaiveDate>,
    pub before: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(after: Option<NaiveDate>, before: Option<NaiveDate>) -> Self {
        Self { after, before }
    }

    pub fn is_unbounded(&self) -> bool {
        self.after.is_none() && self.before.is_none()
    }

    /// Start of the `after` day (00:00:00Z).
    pub fn published_after(&self) -> Option<DateTime<Utc>> {
        self.after.map(|d| d.and_time(NaiveTime::MIN).and_utc())
    }

    /// End of the `before` day (23:59:59Z).
    pub fn published_before(&self) -> Option<DateTime<Utc>> {
        self.before
            .and_then(|d| d.and_hms_opt(23, 59, 59))
            .map(|dt| dt.and_utc())
    }

    /// RFC 3339 form of [`published_after`](Self::published_after), as the API expects it.
    pub fn published_after_param(&self) -> Option<String> {
        self.published_after()
            .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    /// RFC 3339 form of [`published_before`](Self::published_before).
    pub fn published_before_param(&self) -> Option<String> {
        self.published_before()
            .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
    }
}

// ============================================================================
// FilterMode
// ============================================================================

/// How a query is compared against result titles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Every whitespace-separated query word appears somewhere in the title.
    #[default]
    Default,
    /// The whole query appears as one contiguous substring of the title.
    Phrase,
    /// The title equals the query.
    Exact,
}

impl FilterMode {
    pub fn as_str(self) -> &'static str {
        match self {
            FilterMode::Default => "default",
            FilterMode::Phrase => "phrase",
            FilterMode::Exact => "exact",
        }
    }
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" | "words" => Ok(FilterMode::Default),
            "phrase" => Ok(FilterMode::Phrase),
            "exact" => Ok(FilterMode::Exact),
            other => Err(format!(
                "unknown filter mode '{}' (expected default, phrase or exact)",
                other
            )),
        }
    }
}

// ============================================================================
// Results
// ============================================================================

/// One search result, decoded from the upstream snippet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Item {
    pub id: String,
    pub title: String,
    pub description: String,
    pub published_at: Option<DateTime<Utc>>,
    pub thumbnail_url: Option<String>,
}

impl Item {
    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.id)
    }
}

/// One page of results. `next_cursor == None` marks the last page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub items: Vec<Item>,
    pub next_cursor: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_query_is_trimmed() {
        let query = Query::parse("  red fox \n").unwrap();
        assert_eq!(query.as_str(), "red fox");
    }

    #[test]
    fn test_blank_query_rejected() {
        assert_eq!(Query::parse(""), Err(SessionError::EmptyQuery));
        assert_eq!(Query::parse("   \t"), Err(SessionError::EmptyQuery));
    }

    #[test]
    fn test_effective_query_without_dates() {
        let query = Query::parse("cats").unwrap();
        assert_eq!(query.effective(&DateRange::default()), "cats");
    }

    #[test]
    fn test_effective_query_with_dates() {
        let query = Query::parse("cats").unwrap();
        let range = DateRange::new(Some(date("2024-01-01")), Some(date("2024-02-15")));
        assert_eq!(
            query.effective(&range),
            "cats after:2024-01-01 before:2024-02-15"
        );
        // The original stays untouched
        assert_eq!(query.as_str(), "cats");
    }

    #[test]
    fn test_date_bounds_normalized_to_day_edges() {
        let range = DateRange::new(Some(date("2024-03-10")), Some(date("2024-03-12")));
        assert_eq!(
            range.published_after_param().as_deref(),
            Some("2024-03-10T00:00:00Z")
        );
        assert_eq!(
            range.published_before_param().as_deref(),
            Some("2024-03-12T23:59:59Z")
        );
    }

    #[test]
    fn test_inverted_range_is_not_validated() {
        let range = DateRange::new(Some(date("2024-05-01")), Some(date("2024-01-01")));
        assert!(range.published_after().unwrap() > range.published_before().unwrap());
        assert!(!range.is_unbounded());
    }

    #[test]
    fn test_filter_mode_parse() {
        assert_eq!("exact".parse::<FilterMode>(), Ok(FilterMode::Exact));
        assert_eq!(" Phrase ".parse::<FilterMode>(), Ok(FilterMode::Phrase));
        assert_eq!("default".parse::<FilterMode>(), Ok(FilterMode::Default));
        assert!("fuzzy".parse::<FilterMode>().is_err());
    }

    #[test]
    fn test_watch_url() {
        let item = Item {
            id: "dQw4w9WgXcQ".to_string(),
            title: "t".to_string(),
            description: String::new(),
            published_at: None,
            thumbnail_url: None,
        };
        assert_eq!(item.watch_url(), "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
    }
}
