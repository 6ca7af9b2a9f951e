//! Built-in request constraints.
//!
//! Each type here is the filter appended by one of the fluent
//! [`Route`](crate::router::Route) configuration methods. Everything that can
//! be wrong with the configuration is rejected by the constructor, so `apply`
//! never fails.
//!
//! | Constraint        | Checks                               | On mismatch            |
//! |-------------------|--------------------------------------|------------------------|
//! | [`SchemeFilter`]  | request scheme equals a name         | [`Rejection::NotFound`]   |
//! | [`HostFilter`]    | host matches a pattern (with captures) | [`Rejection::NotFound`]   |
//! | [`HeaderFilter`]  | every header equals its value        | [`Rejection::BadRequest`] |
//! | [`QueryFilter`]   | every query field matches its pattern | [`Rejection::BadRequest`] |

use super::{Filter, FilterError, Gate, Rejection};
use crate::context::Context;
use crate::router::{RouteError, pattern::Pattern};

/// Passes requests whose scheme equals the configured one (ASCII
/// case-insensitively). Requests with no known scheme only pass an empty
/// scheme name.
#[derive(Clone, Debug)]
pub struct SchemeFilter {
    scheme: String,
}

impl SchemeFilter {
    pub fn new(scheme: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
        }
    }
}

impl Filter for SchemeFilter {
    fn apply(&self, ctx: &mut Context) -> Result<Gate, FilterError> {
        let scheme = ctx.request().scheme().unwrap_or("");
        if scheme.eq_ignore_ascii_case(&self.scheme) {
            Ok(Gate::Pass)
        } else {
            Ok(Gate::Reject(Rejection::NotFound))
        }
    }

    fn name(&self) -> &str {
        "scheme"
    }
}

/// Matches the request host against a pattern and merges the pattern's named
/// captures into the request's variables.
///
/// The pattern is not anchored implicitly; write `^...$` to match the whole
/// host.
#[derive(Clone, Debug)]
pub struct HostFilter {
    pattern: Pattern,
}

impl HostFilter {
    pub fn new(pattern: &str) -> Result<Self, RouteError> {
        Ok(Self {
            pattern: Pattern::new(pattern)?,
        })
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }
}

impl Filter for HostFilter {
    fn apply(&self, ctx: &mut Context) -> Result<Gate, FilterError> {
        let host = ctx.request().host().unwrap_or("");
        match self.pattern.extract(host) {
            Some(vars) => {
                ctx.vars_mut().extend(vars);
                Ok(Gate::Pass)
            }
            None => Ok(Gate::Reject(Rejection::NotFound)),
        }
    }

    fn name(&self) -> &str {
        "host"
    }
}

/// Requires each named header to carry exactly the expected value.
///
/// Comparison is literal. A missing header reads as the empty string, so an
/// empty expected value also accepts a request without the header.
#[derive(Clone, Debug)]
pub struct HeaderFilter {
    expected: Vec<(String, String)>,
}

impl HeaderFilter {
    /// Builds the filter from a flat `name, value, name, value, ...` list.
    ///
    /// # Errors
    ///
    /// [`RouteError::OddPairs`] when `pairs` has an odd length.
    pub fn new(pairs: &[&str]) -> Result<Self, RouteError> {
        Ok(Self {
            expected: to_pairs("headers", pairs)?,
        })
    }
}

impl Filter for HeaderFilter {
    fn apply(&self, ctx: &mut Context) -> Result<Gate, FilterError> {
        let headers = ctx.request().headers();
        let all_match = self
            .expected
            .iter()
            .all(|(name, value)| headers.get(name).unwrap_or("") == value);

        if all_match {
            Ok(Gate::Pass)
        } else {
            Ok(Gate::Reject(Rejection::BadRequest))
        }
    }

    fn name(&self) -> &str {
        "headers"
    }
}

/// Requires each named field to appear in the raw query string with a value
/// matching its pattern.
///
/// A field `name` with value pattern `v` matches
/// `(^|&)name=(?:v)(&|$)` against the raw query, so the pattern has to cover
/// the whole field value. An empty value pattern only requires the field to be
/// present, with or without `=` and a value.
#[derive(Clone, Debug)]
pub struct QueryFilter {
    fields: Vec<(String, Pattern)>,
}

impl QueryFilter {
    /// Builds the filter from a flat `name, pattern, name, pattern, ...` list.
    ///
    /// # Errors
    ///
    /// - [`RouteError::OddPairs`] when `pairs` has an odd length.
    /// - [`RouteError::EmptyQueryName`] when a field name is empty.
    /// - [`RouteError::InvalidPattern`] when a value pattern does not compile.
    pub fn new(pairs: &[&str]) -> Result<Self, RouteError> {
        let fields = to_pairs("queries", pairs)?
            .into_iter()
            .map(|(name, value)| {
                if name.is_empty() {
                    return Err(RouteError::EmptyQueryName);
                }
                let pattern = Pattern::new(&field_pattern(&name, &value))?;
                Ok((name, pattern))
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { fields })
    }
}

impl Filter for QueryFilter {
    fn apply(&self, ctx: &mut Context) -> Result<Gate, FilterError> {
        let query = ctx.request().query_string().unwrap_or("");
        let all_match = self
            .fields
            .iter()
            .all(|(_, pattern)| pattern.is_match(query));

        if all_match {
            Ok(Gate::Pass)
        } else {
            Ok(Gate::Reject(Rejection::BadRequest))
        }
    }

    fn name(&self) -> &str {
        "queries"
    }
}

fn field_pattern(name: &str, value: &str) -> String {
    let name = regex::escape(name);
    if value.is_empty() {
        format!("(?:^|&){name}(?:=[^&]*)?(?:&|$)")
    } else {
        format!("(?:^|&){name}=(?:{value})(?:&|$)")
    }
}

// Splits a flat list into (name, value) pairs. A repeated name keeps its first
// position and its last value.
fn to_pairs(filter: &'static str, items: &[&str]) -> Result<Vec<(String, String)>, RouteError> {
    if items.len() % 2 != 0 {
        return Err(RouteError::OddPairs {
            filter,
            count: items.len(),
        });
    }

    let mut pairs: Vec<(String, String)> = Vec::with_capacity(items.len() / 2);
    for pair in items.chunks_exact(2) {
        let (name, value) = (pair[0], pair[1]);
        match pairs.iter_mut().find(|(n, _)| n.as_str() == name) {
            Some(existing) => existing.1 = value.to_owned(),
            None => pairs.push((name.to_owned(), value.to_owned())),
        }
    }
    Ok(pairs)
}
