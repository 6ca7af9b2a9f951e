//! End-to-end routing over a real TCP connection.

use std::net::SocketAddr;

use reroute::{Context, Response, Router, Server, StatusCode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn spawn(router: Router) -> SocketAddr {
    init_tracing();
    let server = Server::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr();
    tokio::spawn(server.serve(router));
    addr
}

// Sends one request with `Connection: close` and returns (status line, body).
async fn send(addr: SocketAddr, head: &str) -> (String, String) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let raw = format!("{head}\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(raw.as_bytes()).await.unwrap();

    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.unwrap();
    let text = String::from_utf8(out).unwrap();

    let (head, body) = text.split_once("\r\n\r\n").unwrap();
    let status_line = head.lines().next().unwrap().to_owned();
    (status_line, body.to_owned())
}

// Writes `raw` as-is and returns everything the server sends back.
async fn exchange(addr: SocketAddr, raw: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw).await.unwrap();
    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.unwrap();
    String::from_utf8(out).unwrap()
}

fn demo_router() -> Router {
    let mut router = Router::new();
    router
        .handle(r"/user/(?P<id>[0-9]+)", |ctx: Context| async move {
            let id = ctx.var("id").unwrap_or_default().to_owned();
            Response::new(StatusCode::Ok).body(format!("user={id}"))
        })
        .unwrap()
        .methods(["GET"])
        .schemes("http");
    router
        .get("/secure", |_ctx: Context| async { Response::new(StatusCode::Ok).body("secret") })
        .unwrap()
        .schemes("https");
    router
        .get("/search", |ctx: Context| async move {
            let q = ctx.request().query_param("q").unwrap_or_default().to_owned();
            Response::new(StatusCode::Ok).body(q)
        })
        .unwrap()
        .queries(&["q", "[a-z]+"])
        .unwrap();
    router
}

#[tokio::test]
async fn captures_reach_the_handler() {
    let addr = spawn(demo_router()).await;
    let (status, body) = send(addr, "GET /user/42 HTTP/1.1").await;
    assert_eq!(status, "HTTP/1.1 200 OK");
    assert_eq!(body, "user=42");
}

#[tokio::test]
async fn path_is_cleaned_before_matching() {
    let addr = spawn(demo_router()).await;
    let (status, body) = send(addr, "GET //user/./7/ HTTP/1.1").await;
    assert_eq!(status, "HTTP/1.1 200 OK");
    assert_eq!(body, "user=7");
}

#[tokio::test]
async fn default_error_handlers_answer_with_plain_status() {
    let addr = spawn(demo_router()).await;

    let (status, body) = send(addr, "POST /user/42 HTTP/1.1").await;
    assert_eq!(status, "HTTP/1.1 405 Method Not Allowed");
    assert_eq!(body, "405 Method Not Allowed");

    let (status, body) = send(addr, "GET /nowhere HTTP/1.1").await;
    assert_eq!(status, "HTTP/1.1 404 Not Found");
    assert_eq!(body, "404 Not Found");
}

#[tokio::test]
async fn plain_connections_fail_an_https_scheme_constraint() {
    let addr = spawn(demo_router()).await;
    let (status, _) = send(addr, "GET /secure HTTP/1.1").await;
    assert_eq!(status, "HTTP/1.1 404 Not Found");
}

#[tokio::test]
async fn query_constraint_selects_bad_request() {
    let addr = spawn(demo_router()).await;

    let (status, body) = send(addr, "GET /search?q=rust HTTP/1.1").await;
    assert_eq!(status, "HTTP/1.1 200 OK");
    assert_eq!(body, "rust");

    let (status, body) = send(addr, "GET /search?q=42 HTTP/1.1").await;
    assert_eq!(status, "HTTP/1.1 400 Bad Request");
    assert_eq!(body, "400 Bad Request");
}

#[tokio::test]
async fn keep_alive_connection_serves_several_requests() {
    let addr = spawn(demo_router()).await;
    let text = exchange(
        addr,
        b"GET /user/1 HTTP/1.1\r\nHost: localhost\r\n\r\n\
          GET /user/2 HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert_eq!(text.matches("HTTP/1.1 200 OK").count(), 2);
    assert!(text.contains("user=1"));
    assert!(text.ends_with("user=2"));
}

#[tokio::test]
async fn malformed_request_gets_400() {
    let addr = spawn(Router::new()).await;
    let text = exchange(addr, b"NOT A REQUEST\r\n\r\n").await;
    assert!(text.starts_with("HTTP/1.1 400 Bad Request"));
}

#[tokio::test]
async fn unaddressable_content_length_gets_400() {
    let addr = spawn(demo_router()).await;
    let text = exchange(
        addr,
        b"POST /user/1 HTTP/1.1\r\nHost: x\r\nContent-Length: 18446744073709551615\r\n\r\nab",
    )
    .await;
    assert!(text.starts_with("HTTP/1.1 400 Bad Request"), "{text}");
}

#[tokio::test]
async fn declared_body_over_the_limit_gets_413_without_waiting() {
    let addr = spawn(demo_router()).await;
    let text = exchange(
        addr,
        b"POST /user/1 HTTP/1.1\r\nHost: x\r\nContent-Length: 1000000000\r\n\r\nab",
    )
    .await;
    assert!(text.starts_with("HTTP/1.1 413 Payload Too Large"), "{text}");
}
