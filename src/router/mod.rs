//! Request routing — map path patterns to handlers through per-route filters.
//!
//! A [`Router`] keeps an ordered table of [`Route`]s. Each route is a regular
//! expression matched against the prepared request path, plus an optional
//! method restriction and a [`FilterChain`](crate::filter::FilterChain) of
//! pre-handler constraints.
//!
//! | Registration                  | Pattern as compiled   | Matches               |
//! |-------------------------------|-----------------------|-----------------------|
//! | `handle("/users")`            | `^/users$`            | `/users` only         |
//! | `handle(r"/user/(?P<id>\d+)")`| `^/user/(?P<id>\d+)$` | `/user/42` → `id = 42` |
//! | `handle_partial("/static/")`  | `^/static/`           | `/static/app.css`, …  |
//!
//! Dispatch scans routes in registration order:
//!
//! 1. The first route whose pattern and method both match wins.
//! 2. If no route fully matched but some route matched the path with the wrong
//!    method, the method-not-allowed handler answers.
//! 3. Otherwise, or when the winning route has no handler, the not-found
//!    handler answers.
//! 4. The winner's captures are placed in the request [`Context`], its filters
//!    run, and the handler runs only if every filter passes.

use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error};

use crate::context::{Context, Vars};
use crate::filter::{Gate, Rejection};
use crate::{Method, Request, Response, StatusCode};

pub mod path;
pub mod pattern;
pub mod route;

pub use path::PathPolicy;
pub use pattern::Pattern;
pub use route::{Route, RouteMatch};

/// Errors raised while configuring routes. None of them can occur while
/// serving.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("invalid pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("{filter} expects name/value pairs, got {count} arguments")]
    OddPairs { filter: &'static str, count: usize },

    #[error("query constraint with an empty field name")]
    EmptyQueryName,

    #[error("variable `{name}` is captured by both the host and the path pattern")]
    DuplicateVariable { name: String },
}

/// Future returned by every handler.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

/// Type-erased, heap-allocated async handler that processes a [`Context`] and
/// returns a [`Response`].
///
/// Handlers are stored behind `Arc<dyn Fn(…)>` so the route table can be
/// shared across tasks. Build one from a closure with [`handler_fn`].
pub type Handler = Arc<dyn Fn(Context) -> HandlerFuture + Send + Sync + 'static>;

/// Conversion trait for async handlers.
///
/// Any `Fn(Context) -> impl Future<Output = Response> + Send` that is also
/// `Send + Sync + 'static` implements this trait through the blanket impl
/// below. Handler objects implement it directly:
///
/// ```rust
/// use reroute::{Response, StatusCode};
/// use reroute::context::Context;
/// use reroute::router::{HandlerFuture, IntoHandler};
///
/// struct Static(&'static str);
///
/// impl IntoHandler for Static {
///     fn call(&self, _ctx: Context) -> HandlerFuture {
///         let body = self.0;
///         Box::pin(async move { Response::new(StatusCode::Ok).body(body) })
///     }
/// }
/// ```
pub trait IntoHandler: Send + Sync + 'static {
    /// Call the handler with the given context, boxing the returned future.
    fn call(&self, ctx: Context) -> HandlerFuture;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> HandlerFuture {
        Box::pin((self)(ctx))
    }
}

/// Erases `handler` into a [`Handler`].
pub fn handler_fn(handler: impl IntoHandler) -> Handler {
    Arc::new(move |ctx: Context| handler.call(ctx))
}

// Default error handler: plain text echoing the status, e.g. `404 Not Found`.
fn plain_status(status: StatusCode) -> Handler {
    handler_fn(move |_ctx: Context| async move { Response::plain(status) })
}

// Outcome of scanning the route table for one request.
enum Selection<'r> {
    Found(&'r Route, Vars),
    WrongMethod,
    Missing,
}

/// Regex-based HTTP request router.
///
/// Build the table before serving; [`route`](Self::route) only needs `&self`,
/// so a finished router can be shared behind an [`Arc`] by any number of
/// concurrent requests.
///
/// # Examples
///
/// ```rust,no_run
/// use reroute::{Router, Response, StatusCode};
/// use reroute::context::Context;
///
/// # fn main() -> Result<(), reroute::router::RouteError> {
/// let mut router = Router::new();
///
/// router.get("/ping", |_ctx: Context| async { Response::new(StatusCode::Ok) })?;
///
/// router
///     .handle(r"/users/(?P<id>[0-9]+)", |ctx: Context| async move {
///         let id = ctx.var("id").unwrap_or_default().to_owned();
///         Response::new(StatusCode::Ok).body(id)
///     })?
///     .methods(["GET", "DELETE"])
///     .headers(&["X-Api-Version", "2"])?;
/// # Ok(())
/// # }
/// ```
pub struct Router {
    routes: Vec<Route>,
    policy: PathPolicy,

    bad_request: Handler,
    not_found: Handler,
    method_not_allowed: Handler,
    internal_server_error: Handler,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Creates an empty router with path cleaning and trailing-slash trimming
    /// enabled and plain-text error handlers.
    pub fn new() -> Self {
        Self::with_policy(PathPolicy::default())
    }

    /// Creates an empty router with the given path policy.
    pub fn with_policy(policy: PathPolicy) -> Self {
        Self {
            routes: Vec::new(),
            policy,
            bad_request: plain_status(StatusCode::BadRequest),
            not_found: plain_status(StatusCode::NotFound),
            method_not_allowed: plain_status(StatusCode::MethodNotAllowed),
            internal_server_error: plain_status(StatusCode::InternalServerError),
        }
    }

    pub fn policy(&self) -> PathPolicy {
        self.policy
    }

    /// Toggles structural path cleaning (`//`, `.` and `..` removal).
    pub fn clean_path(&mut self, clean: bool) -> &mut Self {
        self.policy.clean_path = clean;
        self
    }

    /// Toggles trailing-slash trimming.
    pub fn trim_trailing_slashes(&mut self, trim: bool) -> &mut Self {
        self.policy.trim_trailing_slashes = trim;
        self
    }

    pub fn bad_request_handler(&mut self, handler: impl IntoHandler) -> &mut Self {
        self.bad_request = handler_fn(handler);
        self
    }

    pub fn not_found_handler(&mut self, handler: impl IntoHandler) -> &mut Self {
        self.not_found = handler_fn(handler);
        self
    }

    pub fn method_not_allowed_handler(&mut self, handler: impl IntoHandler) -> &mut Self {
        self.method_not_allowed = handler_fn(handler);
        self
    }

    pub fn internal_server_error_handler(&mut self, handler: impl IntoHandler) -> &mut Self {
        self.internal_server_error = handler_fn(handler);
        self
    }

    /// Registers `pattern` for exact matching: it is anchored at the start and,
    /// unless it already ends with `$`, at the end.
    ///
    /// # Errors
    ///
    /// [`RouteError::InvalidPattern`] when the pattern does not compile.
    pub fn handle(
        &mut self,
        pattern: &str,
        handler: impl IntoHandler,
    ) -> Result<&mut Route, RouteError> {
        let mut pattern = pattern.to_owned();
        if !pattern.ends_with('$') {
            pattern.push('$');
        }
        self.new_route(&pattern, Some(handler_fn(handler)))
    }

    /// Registers `pattern` for prefix matching: it is only anchored at the
    /// start.
    ///
    /// # Errors
    ///
    /// [`RouteError::InvalidPattern`] when the pattern does not compile.
    pub fn handle_partial(
        &mut self,
        pattern: &str,
        handler: impl IntoHandler,
    ) -> Result<&mut Route, RouteError> {
        self.new_route(pattern, Some(handler_fn(handler)))
    }

    /// Appends a route for `pattern` (anchored at the start only) with an
    /// already erased handler. A route without a handler still takes part in
    /// matching, and requests it wins are answered as not found.
    ///
    /// # Errors
    ///
    /// [`RouteError::InvalidPattern`] when the pattern does not compile.
    pub fn new_route(
        &mut self,
        pattern: &str,
        handler: Option<Handler>,
    ) -> Result<&mut Route, RouteError> {
        let pattern = if pattern.starts_with('^') {
            Pattern::new(pattern)?
        } else {
            Pattern::new(&format!("^{pattern}"))?
        };

        let index = self.routes.len();
        self.routes.push(Route::new(pattern, handler));
        Ok(&mut self.routes[index])
    }

    /// Registers an exact-match route restricted to `GET`.
    ///
    /// # Errors
    ///
    /// [`RouteError::InvalidPattern`] when the pattern does not compile.
    pub fn get(
        &mut self,
        pattern: &str,
        handler: impl IntoHandler,
    ) -> Result<&mut Route, RouteError> {
        self.with_method(Method::Get, pattern, handler)
    }

    /// Registers an exact-match route restricted to `POST`.
    ///
    /// # Errors
    ///
    /// [`RouteError::InvalidPattern`] when the pattern does not compile.
    pub fn post(
        &mut self,
        pattern: &str,
        handler: impl IntoHandler,
    ) -> Result<&mut Route, RouteError> {
        self.with_method(Method::Post, pattern, handler)
    }

    /// Registers an exact-match route restricted to `PUT`.
    ///
    /// # Errors
    ///
    /// [`RouteError::InvalidPattern`] when the pattern does not compile.
    pub fn put(
        &mut self,
        pattern: &str,
        handler: impl IntoHandler,
    ) -> Result<&mut Route, RouteError> {
        self.with_method(Method::Put, pattern, handler)
    }

    /// Registers an exact-match route restricted to `DELETE`.
    ///
    /// # Errors
    ///
    /// [`RouteError::InvalidPattern`] when the pattern does not compile.
    pub fn delete(
        &mut self,
        pattern: &str,
        handler: impl IntoHandler,
    ) -> Result<&mut Route, RouteError> {
        self.with_method(Method::Delete, pattern, handler)
    }

    /// Registers an exact-match route restricted to `PATCH`.
    ///
    /// # Errors
    ///
    /// [`RouteError::InvalidPattern`] when the pattern does not compile.
    pub fn patch(
        &mut self,
        pattern: &str,
        handler: impl IntoHandler,
    ) -> Result<&mut Route, RouteError> {
        self.with_method(Method::Patch, pattern, handler)
    }

    /// Registers an exact-match route restricted to `OPTIONS`.
    ///
    /// # Errors
    ///
    /// [`RouteError::InvalidPattern`] when the pattern does not compile.
    pub fn options(
        &mut self,
        pattern: &str,
        handler: impl IntoHandler,
    ) -> Result<&mut Route, RouteError> {
        self.with_method(Method::Options, pattern, handler)
    }

    fn with_method(
        &mut self,
        method: Method,
        pattern: &str,
        handler: impl IntoHandler,
    ) -> Result<&mut Route, RouteError> {
        Ok(self.handle(pattern, handler)?.methods([method]))
    }

    /// Return the number of routes registered in this router.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Return `true` if no routes have been registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Registered routes in match priority order.
    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    /// The handler the router uses for `rejection`.
    pub fn error_handler(&self, rejection: Rejection) -> &Handler {
        match rejection {
            Rejection::BadRequest => &self.bad_request,
            Rejection::NotFound => &self.not_found,
            Rejection::MethodNotAllowed => &self.method_not_allowed,
            Rejection::InternalServerError => &self.internal_server_error,
        }
    }

    // Scans the table in order. The first full match ends the scan; a method
    // mismatch only matters if nothing after it fully matches.
    fn select(&self, request: &Request) -> Selection<'_> {
        let path = self.policy.prepare(request.path());
        let mut wrong_method = false;

        for route in &self.routes {
            match route.matches(request.method(), &path) {
                RouteMatch::Full(vars) => return Selection::Found(route, vars),
                RouteMatch::MethodMismatch => wrong_method = true,
                RouteMatch::NoMatch => {}
            }
        }

        if wrong_method {
            Selection::WrongMethod
        } else {
            Selection::Missing
        }
    }

    /// Dispatch `request` and return the response.
    ///
    /// The matched handler receives a [`Context`] whose
    /// [`vars`](Context::vars) hold the captures of this request only.
    /// Filter rejections are answered by the corresponding error handler; a
    /// filter failure is logged and answered by the internal-server-error
    /// handler.
    pub async fn route(&self, request: Request) -> Response {
        let (route, vars) = match self.select(&request) {
            Selection::Found(route, vars) => (route, vars),
            Selection::WrongMethod => {
                debug!(method = %request.method(), path = request.path(), "method not allowed");
                return self.reject(Rejection::MethodNotAllowed, Context::new(request)).await;
            }
            Selection::Missing => {
                debug!(method = %request.method(), path = request.path(), "no route matched");
                return self.reject(Rejection::NotFound, Context::new(request)).await;
            }
        };

        debug!(
            method = %request.method(),
            path = request.path(),
            pattern = route.pattern().as_str(),
            vars = vars.len(),
            "route matched"
        );

        let mut ctx = Context::with_vars(request, vars);

        let Some(handler) = route.handler() else {
            debug!(pattern = route.pattern().as_str(), "matched route has no handler");
            return self.reject(Rejection::NotFound, ctx).await;
        };

        match route.filters().run(&mut ctx) {
            Ok(Gate::Pass) => handler(ctx).await,
            Ok(Gate::Respond(response)) => response,
            Ok(Gate::Reject(rejection)) => {
                debug!(
                    pattern = route.pattern().as_str(),
                    status = rejection.status().as_u16(),
                    "filter rejected request"
                );
                self.reject(rejection, ctx).await
            }
            Err(e) => {
                error!(
                    pattern = route.pattern().as_str(),
                    error = %e,
                    "filter failed"
                );
                self.reject(Rejection::InternalServerError, ctx).await
            }
        }
    }

    async fn reject(&self, rejection: Rejection, ctx: Context) -> Response {
        (self.error_handler(rejection))(ctx).await
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
