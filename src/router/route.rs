use super::{Handler, RouteError, pattern::Pattern};
use crate::Method;
use crate::context::Vars;
use crate::filter::{
    Filter, FilterChain,
    constraints::{HeaderFilter, HostFilter, QueryFilter, SchemeFilter},
};

/// How a single route relates to a request.
#[derive(Debug, PartialEq, Eq)]
pub enum RouteMatch {
    /// The path pattern does not match.
    NoMatch,
    /// The path pattern matches but the method is not allowed.
    MethodMismatch,
    /// Both match; carries the variables captured from the path.
    Full(Vars),
}

/// One registered pattern with its handler and constraints.
///
/// Routes are created by [`Router`](super::Router) registration and configured
/// through the chained methods below. A route holds no per-request state:
/// [`matches`](Self::matches) returns the captured variables instead of
/// storing them.
pub struct Route {
    pattern: Pattern,
    handler: Option<Handler>,
    methods: Option<Vec<Method>>,
    filters: FilterChain,
}

impl Route {
    pub(super) fn new(pattern: Pattern, handler: Option<Handler>) -> Self {
        Self {
            pattern,
            handler,
            methods: None,
            filters: FilterChain::new(),
        }
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn handler(&self) -> Option<&Handler> {
        self.handler.as_ref()
    }

    /// The explicit method restriction, or `None` when every method is allowed.
    pub fn allowed_methods(&self) -> Option<&[Method]> {
        self.methods.as_deref()
    }

    pub fn filters(&self) -> &FilterChain {
        &self.filters
    }

    /// Classifies a request against this route.
    ///
    /// `path` must already be prepared by the router's
    /// [`PathPolicy`](super::PathPolicy). The method is checked before any
    /// capture is extracted.
    pub fn matches(&self, method: &Method, path: &str) -> RouteMatch {
        if !self.pattern.is_match(path) {
            return RouteMatch::NoMatch;
        }
        if !self.allows(method) {
            return RouteMatch::MethodMismatch;
        }
        match self.pattern.extract(path) {
            Some(vars) => RouteMatch::Full(vars),
            None => RouteMatch::NoMatch,
        }
    }

    fn allows(&self, method: &Method) -> bool {
        self.methods
            .as_ref()
            .is_none_or(|allowed| allowed.contains(method))
    }

    /// Restricts the route to the given methods, replacing any earlier
    /// restriction.
    pub fn methods<I, M>(&mut self, methods: I) -> &mut Self
    where
        I: IntoIterator<Item = M>,
        M: Into<Method>,
    {
        self.methods = Some(methods.into_iter().map(Into::into).collect());
        self
    }

    /// Only serves requests whose scheme is `scheme`; others get the router's
    /// not-found handler.
    pub fn schemes(&mut self, scheme: impl Into<String>) -> &mut Self {
        self.filters.push(SchemeFilter::new(scheme));
        self
    }

    /// Only serves requests whose host matches `pattern`. Named captures in
    /// the host pattern join the path variables.
    ///
    /// # Errors
    ///
    /// - [`RouteError::InvalidPattern`] when `pattern` does not compile.
    /// - [`RouteError::DuplicateVariable`] when a host capture reuses a path
    ///   capture name.
    pub fn host(&mut self, pattern: &str) -> Result<&mut Self, RouteError> {
        let filter = HostFilter::new(pattern)?;
        let clash = filter
            .pattern()
            .capture_names()
            .find(|name| self.pattern.capture_names().any(|own| own == *name));
        if let Some(name) = clash {
            return Err(RouteError::DuplicateVariable {
                name: name.to_owned(),
            });
        }
        self.filters.push(filter);
        Ok(self)
    }

    /// Requires each `name, value` header pair to match literally; otherwise
    /// the router's bad-request handler answers.
    ///
    /// # Errors
    ///
    /// [`RouteError::OddPairs`] for an odd number of arguments.
    pub fn headers(&mut self, pairs: &[&str]) -> Result<&mut Self, RouteError> {
        self.filters.push(HeaderFilter::new(pairs)?);
        Ok(self)
    }

    /// Requires each `name, value-pattern` query pair to match the raw query
    /// string; otherwise the router's bad-request handler answers.
    ///
    /// # Errors
    ///
    /// [`RouteError::OddPairs`], [`RouteError::EmptyQueryName`] or
    /// [`RouteError::InvalidPattern`], see [`QueryFilter::new`].
    pub fn queries(&mut self, pairs: &[&str]) -> Result<&mut Self, RouteError> {
        self.filters.push(QueryFilter::new(pairs)?);
        Ok(self)
    }

    /// Appends a custom filter after the ones already configured.
    pub fn filter(&mut self, filter: impl Filter) -> &mut Self {
        self.filters.push(filter);
        self
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("pattern", &self.pattern.as_str())
            .field("methods", &self.methods)
            .field("filters", &self.filters)
            .field("inert", &self.handler.is_none())
            .finish()
    }
}
