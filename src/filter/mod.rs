//! Per-route filter chains — ordered gates evaluated before a handler runs.
//!
//! A route owns one [`FilterChain`]. When the route is selected, the router
//! walks the chain gate by gate:
//!
//! - [`Gate::Pass`] moves on to the next filter;
//! - [`Gate::Reject`] stops the chain and lets the router answer with its
//!   configured error handler for that [`Rejection`];
//! - [`Gate::Respond`] stops the chain with a response the filter built itself.
//!
//! The handler only runs when every filter passes. An empty chain passes.
//!
//! ## Core types
//!
//! - [`Filter`] — trait implemented by every gate; closures of the right shape
//!   implement it automatically.
//! - [`FilterChain`] — the append-only list attached to a route.
//! - [`Cursor`] — position inside one run of a chain. Each run creates its own,
//!   so concurrent requests never share chain state.
//! - [`constraints`] — the scheme, host, header and query gates behind the
//!   fluent route configuration methods.

use std::sync::Arc;

use thiserror::Error;
use tracing::trace;

use crate::{Response, StatusCode, context::Context};

pub mod constraints;

/// The decision a single filter makes about a request.
#[derive(Debug)]
pub enum Gate {
    /// Continue with the next filter, or the handler after the last one.
    Pass,
    /// Stop and answer with the router's handler for this rejection.
    Reject(Rejection),
    /// Stop and send this response as-is.
    Respond(Response),
}

impl Gate {
    pub fn is_pass(&self) -> bool {
        matches!(self, Gate::Pass)
    }
}

/// Which of the router's error handlers answers a rejected request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Rejection {
    BadRequest,
    NotFound,
    MethodNotAllowed,
    InternalServerError,
}

impl Rejection {
    pub fn status(self) -> StatusCode {
        match self {
            Rejection::BadRequest => StatusCode::BadRequest,
            Rejection::NotFound => StatusCode::NotFound,
            Rejection::MethodNotAllowed => StatusCode::MethodNotAllowed,
            Rejection::InternalServerError => StatusCode::InternalServerError,
        }
    }
}

/// A filter that could not reach a decision.
///
/// The router answers such requests with its internal-server-error handler;
/// the failure never escapes the request that triggered it.
#[derive(Debug, Error)]
#[error("filter `{filter}` failed: {reason}")]
pub struct FilterError {
    filter: String,
    reason: String,
}

impl FilterError {
    pub fn new(filter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
            reason: reason.into(),
        }
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// A pre-handler gate.
///
/// Implementations inspect (and may annotate) the request [`Context`] and
/// return a [`Gate`]. They must be `Send + Sync`: one chain serves every
/// request routed to its route.
///
/// # Examples
///
/// ```rust
/// use reroute::context::Context;
/// use reroute::filter::{FilterChain, FilterError, Gate, Rejection};
///
/// let mut chain = FilterChain::new();
/// chain.push(|ctx: &mut Context| -> Result<Gate, FilterError> {
///     if ctx.request().headers().contains("authorization") {
///         Ok(Gate::Pass)
///     } else {
///         Ok(Gate::Reject(Rejection::BadRequest))
///     }
/// });
/// assert_eq!(chain.len(), 1);
/// ```
pub trait Filter: Send + Sync + 'static {
    /// Decide whether the request may continue down the chain.
    fn apply(&self, ctx: &mut Context) -> Result<Gate, FilterError>;

    /// Name used in logs.
    fn name(&self) -> &str {
        "filter"
    }
}

impl<F> Filter for F
where
    F: Fn(&mut Context) -> Result<Gate, FilterError> + Send + Sync + 'static,
{
    fn apply(&self, ctx: &mut Context) -> Result<Gate, FilterError> {
        (self)(ctx)
    }
}

/// An ordered, append-only list of filters.
#[derive(Clone, Default)]
pub struct FilterChain {
    filters: Vec<Arc<dyn Filter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `filter` after every filter already in the chain.
    pub fn push(&mut self, filter: impl Filter) {
        self.filters.push(Arc::new(filter));
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// A fresh cursor positioned at the first filter.
    pub fn cursor(&self) -> Cursor<'_> {
        Cursor {
            filters: &self.filters,
            position: 0,
        }
    }

    /// Runs the chain from the first filter until one of them does not pass.
    ///
    /// Returns [`Gate::Pass`] when every filter passed (or the chain is empty),
    /// otherwise the first non-passing gate. Filters after that one are never
    /// evaluated. Every call starts over from the first filter.
    ///
    /// # Errors
    ///
    /// Returns the [`FilterError`] of the first filter that failed to decide;
    /// later filters are not evaluated.
    pub fn run(&self, ctx: &mut Context) -> Result<Gate, FilterError> {
        let mut cursor = self.cursor();
        while let Some(gate) = cursor.step(ctx) {
            match gate? {
                Gate::Pass => {}
                stop => {
                    trace!(position = cursor.position(), "filter chain stopped");
                    return Ok(stop);
                }
            }
        }
        Ok(Gate::Pass)
    }
}

impl std::fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.filters.iter().map(|filter| filter.name()))
            .finish()
    }
}

/// Position inside one run of a [`FilterChain`].
///
/// A cursor only lives as long as the run that created it; running the chain
/// again always begins at the first filter.
pub struct Cursor<'a> {
    filters: &'a [Arc<dyn Filter>],
    position: usize,
}

impl Cursor<'_> {
    /// Number of filters already evaluated.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_done(&self) -> bool {
        self.position >= self.filters.len()
    }

    /// Evaluates the filter under the cursor and advances past it.
    ///
    /// Returns `None` once every filter has been evaluated, so stepping an
    /// exhausted cursor is always a pass.
    pub fn step(&mut self, ctx: &mut Context) -> Option<Result<Gate, FilterError>> {
        let filters = self.filters;
        let filter = filters.get(self.position)?;
        self.position += 1;
        trace!(filter = filter.name(), position = self.position, "applying filter");
        Some(filter.apply(ctx))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::Request;

    fn ctx() -> Context {
        let (req, _) = Request::parse(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n").unwrap();
        Context::new(req)
    }

    // Counts its invocations and answers with a fixed decision.
    fn counting(
        hits: &Arc<AtomicUsize>,
        decide: fn() -> Gate,
    ) -> impl Fn(&mut Context) -> Result<Gate, FilterError> + Send + Sync + 'static {
        let hits = Arc::clone(hits);
        move |_ctx: &mut Context| {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok(decide())
        }
    }

    #[test]
    fn empty_chain_passes() {
        let chain = FilterChain::new();
        assert!(chain.is_empty());
        assert!(chain.run(&mut ctx()).unwrap().is_pass());
        assert!(chain.cursor().is_done());
    }

    #[test]
    fn all_passing_filters_run_in_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut chain = FilterChain::new();
        for i in 0..3 {
            let order = Arc::clone(&order);
            chain.push(move |_: &mut Context| -> Result<Gate, FilterError> {
                order.lock().unwrap().push(i);
                Ok(Gate::Pass)
            });
        }
        assert!(chain.run(&mut ctx()).unwrap().is_pass());
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn rejection_stops_later_filters() {
        let before = Arc::new(AtomicUsize::new(0));
        let rejecting = Arc::new(AtomicUsize::new(0));
        let after = Arc::new(AtomicUsize::new(0));

        let mut chain = FilterChain::new();
        chain.push(counting(&before, || Gate::Pass));
        chain.push(counting(&rejecting, || Gate::Reject(Rejection::BadRequest)));
        chain.push(counting(&after, || Gate::Pass));

        let gate = chain.run(&mut ctx()).unwrap();
        assert!(matches!(gate, Gate::Reject(Rejection::BadRequest)));
        assert_eq!(before.load(Ordering::SeqCst), 1);
        assert_eq!(rejecting.load(Ordering::SeqCst), 1);
        assert_eq!(after.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn every_run_starts_from_the_first_filter() {
        let first = Arc::new(AtomicUsize::new(0));
        let mut chain = FilterChain::new();
        chain.push(counting(&first, || Gate::Pass));
        chain.push(|_: &mut Context| -> Result<Gate, FilterError> {
            Ok(Gate::Reject(Rejection::NotFound))
        });

        for _ in 0..3 {
            assert!(!chain.run(&mut ctx()).unwrap().is_pass());
        }
        assert_eq!(first.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn custom_response_short_circuits() {
        let mut chain = FilterChain::new();
        chain.push(|_: &mut Context| -> Result<Gate, FilterError> {
            Ok(Gate::Respond(
                Response::new(StatusCode::TooManyRequests).body("slow down"),
            ))
        });
        match chain.run(&mut ctx()).unwrap() {
            Gate::Respond(res) => assert_eq!(res.status(), StatusCode::TooManyRequests),
            other => panic!("unexpected gate: {other:?}"),
        }
    }

    #[test]
    fn failure_is_returned_and_stops_the_chain() {
        let after = Arc::new(AtomicUsize::new(0));
        let mut chain = FilterChain::new();
        chain.push(|_: &mut Context| -> Result<Gate, FilterError> {
            Err(FilterError::new("quota", "backend unavailable"))
        });
        chain.push(counting(&after, || Gate::Pass));

        let err = chain.run(&mut ctx()).unwrap_err();
        assert_eq!(err.filter(), "quota");
        assert_eq!(err.to_string(), "filter `quota` failed: backend unavailable");
        assert_eq!(after.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn cursor_steps_one_filter_at_a_time() {
        let mut chain = FilterChain::new();
        chain.push(|_: &mut Context| -> Result<Gate, FilterError> { Ok(Gate::Pass) });
        chain.push(|_: &mut Context| -> Result<Gate, FilterError> { Ok(Gate::Pass) });

        let mut c = ctx();
        let mut cursor = chain.cursor();
        assert_eq!(cursor.position(), 0);
        assert!(cursor.step(&mut c).unwrap().unwrap().is_pass());
        assert_eq!(cursor.position(), 1);
        assert!(cursor.step(&mut c).is_some());
        assert!(cursor.is_done());
        assert!(cursor.step(&mut c).is_none());
        assert_eq!(chain.cursor().position(), 0);
    }

    #[test]
    fn filters_can_annotate_the_context() {
        let mut chain = FilterChain::new();
        chain.push(|ctx: &mut Context| -> Result<Gate, FilterError> {
            ctx.vars_mut().insert("tenant", "acme");
            Ok(Gate::Pass)
        });
        let mut c = ctx();
        chain.run(&mut c).unwrap();
        assert_eq!(c.var("tenant"), Some("acme"));
    }
}
