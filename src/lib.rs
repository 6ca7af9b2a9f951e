//! # reroute
//!
//! A regular-expression HTTP router with per-route filter chains, served over
//! a small async HTTP/1.1 transport.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use reroute::{Context, Response, Router, Server, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut router = Router::new();
//!     router
//!         .handle(r"/user/(?P<id>[0-9]+)", |ctx: Context| async move {
//!             let id = ctx.var("id").unwrap_or_default().to_owned();
//!             Response::new(StatusCode::Ok).body(format!("user {id}"))
//!         })?
//!         .methods(["GET", "HEAD"])
//!         .headers(&["Accept", "text/plain"])?;
//!
//!     Server::bind("127.0.0.1:8080").await?.serve(router).await?;
//!     Ok(())
//! }
//! ```

// ── Transport ─────────────────────────────────────────────────────────────────
pub mod http;
pub mod server;

// ── Routing ───────────────────────────────────────────────────────────────────
pub mod context;
pub mod filter;
pub mod router;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use context::{Context, Vars};
pub use filter::{Filter, FilterChain, FilterError, Gate, Rejection};
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use router::{Handler, IntoHandler, PathPolicy, Route, RouteError, Router, handler_fn};
pub use server::{Server, ServerError};
