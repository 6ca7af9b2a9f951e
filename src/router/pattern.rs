use regex::Regex;

use super::RouteError;
use crate::context::Vars;

/// A compiled route, host or query pattern.
///
/// Compilation happens once, when the route is configured; matching and
/// capture extraction run per request against the prepared subject.
#[derive(Clone, Debug)]
pub struct Pattern {
    regex: Regex,
}

// === impl Pattern ===

impl Pattern {
    pub fn new(pattern: &str) -> Result<Self, RouteError> {
        let regex = Regex::new(pattern).map_err(|source| RouteError::InvalidPattern {
            pattern: pattern.to_owned(),
            source,
        })?;
        Ok(Self { regex })
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    pub fn is_match(&self, subject: &str) -> bool {
        self.regex.is_match(subject)
    }

    /// Names of the capture groups that contribute to [`Vars`], in
    /// definition order.
    pub fn capture_names(&self) -> impl Iterator<Item = &str> {
        self.regex
            .capture_names()
            .skip(1)
            .flatten()
            .filter(|name| !name.is_empty())
    }

    /// Matches `subject` and collects its named captures.
    ///
    /// Returns `None` when the pattern does not match. Named groups that did
    /// not participate in the match are recorded as empty strings.
    pub fn extract(&self, subject: &str) -> Option<Vars> {
        let caps = self.regex.captures(subject)?;
        let vars = self
            .capture_names()
            .map(|name| {
                let value = caps.name(name).map_or("", |m| m.as_str());
                (name, value)
            })
            .collect();
        Some(vars)
    }
}

impl std::cmp::PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl std::cmp::Eq for Pattern {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_named_groups_only() {
        let p = Pattern::new(r"^/user/(?P<id>[0-9]+)$").unwrap();
        let vars = p.extract("/user/42").unwrap();
        assert_eq!(vars.get("id"), Some("42"));
        assert_eq!(vars.len(), 1);
    }

    #[test]
    fn unnamed_groups_are_ignored() {
        let p = Pattern::new(r"^/(a|b)/(?P<name>\w+)/(\d+)$").unwrap();
        let vars = p.extract("/a/rust/7").unwrap();
        assert_eq!(vars.len(), 1);
        assert_eq!(vars.get("name"), Some("rust"));
        assert_eq!(p.capture_names().collect::<Vec<_>>(), vec!["name"]);
    }

    #[test]
    fn optional_group_that_did_not_match_is_empty() {
        let p = Pattern::new(r"^/files(?:/(?P<rest>.+))?$").unwrap();
        let vars = p.extract("/files").unwrap();
        assert_eq!(vars.get("rest"), Some(""));
    }

    #[test]
    fn no_match_yields_nothing() {
        let p = Pattern::new(r"^/user/(?P<id>[0-9]+)$").unwrap();
        assert!(!p.is_match("/user/abc"));
        assert!(p.extract("/user/abc").is_none());
    }

    #[test]
    fn invalid_pattern_is_reported_with_source() {
        let err = Pattern::new("^/broken(").unwrap_err();
        match err {
            RouteError::InvalidPattern { pattern, .. } => assert_eq!(pattern, "^/broken("),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
