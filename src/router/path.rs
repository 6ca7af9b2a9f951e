//! Request path preparation applied before any route pattern is consulted.

use std::borrow::Cow;

use serde::Deserialize;

/// The two independent normalisation switches a [`Router`](super::Router)
/// applies to every request path.
///
/// | `clean_path` | `trim_trailing_slashes` | `/a//b/../c/` becomes |
/// |--------------|-------------------------|-----------------------|
/// | on           | on                      | `/a/c`                |
/// | on           | off                     | `/a/c/`               |
/// | off          | on                      | `/a//b/../c`          |
/// | off          | off                     | `/a//b/../c/`         |
///
/// Both default to on. The policy deserializes from configuration with
/// missing fields taking their defaults:
///
/// ```
/// use reroute::router::PathPolicy;
///
/// let policy: PathPolicy = serde_json::from_str(r#"{"trim_trailing_slashes": false}"#).unwrap();
/// assert!(policy.clean_path);
/// assert!(!policy.trim_trailing_slashes);
/// assert_eq!(policy.prepare("/docs//intro/"), "/docs/intro/");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PathPolicy {
    pub clean_path: bool,
    pub trim_trailing_slashes: bool,
}

impl Default for PathPolicy {
    fn default() -> Self {
        Self {
            clean_path: true,
            trim_trailing_slashes: true,
        }
    }
}

impl PathPolicy {
    /// Prepares `path` for matching. Preparing an already prepared path is a
    /// no-op.
    pub fn prepare<'a>(&self, path: &'a str) -> Cow<'a, str> {
        if self.clean_path {
            let mut cleaned = clean(path);
            if !self.trim_trailing_slashes
                && path.ends_with('/')
                && !cleaned.ends_with('/')
            {
                cleaned.push('/');
            }
            return Cow::Owned(cleaned);
        }

        if self.trim_trailing_slashes {
            let trimmed = path.trim_end_matches('/');
            // The root stays routable.
            if trimmed.is_empty() && !path.is_empty() {
                return Cow::Borrowed("/");
            }
            return Cow::Borrowed(trimmed);
        }

        Cow::Borrowed(path)
    }
}

/// Lexically normalises a path into its shortest rooted equivalent.
///
/// Repeated separators collapse, `.` segments vanish, `..` removes the
/// preceding segment (and is dropped at the root). The result always starts
/// with `/` and never ends with one unless it is the root itself.
pub fn clean(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    let mut out = String::with_capacity(path.len() + 1);
    for segment in &segments {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}
