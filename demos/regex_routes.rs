//! Serves a handful of regex routes on 127.0.0.1:8080.
//!
//! ```text
//! RUST_LOG=debug cargo run --example regex_routes
//! curl -i http://127.0.0.1:8080/users/42
//! curl -i -X DELETE http://127.0.0.1:8080/users/42        # 405
//! curl -i 'http://127.0.0.1:8080/search?q=rust&page=2'
//! curl -i -H 'X-Api-Version: 2' http://127.0.0.1:8080/v2/status
//! curl -i http://127.0.0.1:8080/static/css/../app.css
//! ```

use reroute::{Context, Gate, Rejection, Response, Router, Server, StatusCode};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut router = Router::new();

    router
        .handle(r"/users/(?P<id>[0-9]+)", |ctx: Context| async move {
            let id = ctx.var("id").unwrap_or_default().to_owned();
            Response::new(StatusCode::Ok).body(format!("user {id}\n"))
        })?
        .methods(["GET", "HEAD"]);

    router
        .get("/search", |ctx: Context| async move {
            let q = ctx.request().query_param("q").unwrap_or_default().to_owned();
            let page = ctx.request().query_param("page").unwrap_or("1").to_owned();
            Response::new(StatusCode::Ok).body(format!("results for {q:?}, page {page}\n"))
        })?
        .queries(&["q", "", "page", "[0-9]+"])?;

    router
        .get("/v2/status", |_ctx: Context| async {
            Response::new(StatusCode::Ok)
                .header("Content-Type", "application/json")
                .body(r#"{"status":"ok"}"#)
        })?
        .headers(&["X-Api-Version", "2"])?;

    router
        .handle_partial("/static/", |ctx: Context| async move {
            let path = ctx.request().path().to_owned();
            Response::new(StatusCode::Ok).body(format!("static asset {path}\n"))
        })?
        .filter(|ctx: &mut Context| -> Result<Gate, reroute::FilterError> {
            if ctx.request().path().ends_with(".map") {
                Ok(Gate::Reject(Rejection::NotFound))
            } else {
                Ok(Gate::Pass)
            }
        });

    router.not_found_handler(|ctx: Context| async move {
        Response::new(StatusCode::NotFound).body(format!("nothing at {}\n", ctx.request().path()))
    });

    let server = Server::bind("127.0.0.1:8080").await?;
    tracing::info!(address = %server.local_addr(), routes = router.len(), "serving demo routes");
    server.serve(router).await?;
    Ok(())
}
