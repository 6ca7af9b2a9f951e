//! HTTP/1.1 request parsing using the [`httparse`] crate.

use std::collections::HashMap;

use bytes::Bytes;
use thiserror::Error;

use super::{Headers, Method};

/// Errors that can occur while parsing an HTTP/1.1 request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete — more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("Content-Length {length} is too large")]
    ContentLengthOverflow { length: usize },
}

/// A fully parsed HTTP/1.1 request.
///
/// This is the request description routes match against: method, path,
/// scheme, host, raw query string and headers. Origin-form targets
/// (`/path?q`) leave the scheme unset until the transport fills it in;
/// absolute-form targets (`http://host/path?q`) carry both scheme and host.
///
/// # Examples
///
/// ```
/// use reroute::http::request::Request;
///
/// let raw = b"GET /users/42?sort=asc HTTP/1.1\r\nHost: api.example.com\r\n\r\n";
/// let (request, _offset) = Request::parse(raw).unwrap();
///
/// assert_eq!(request.path(), "/users/42");
/// assert_eq!(request.query_string(), Some("sort=asc"));
/// assert_eq!(request.host(), Some("api.example.com"));
/// assert_eq!(request.scheme(), None);
/// ```
#[derive(Debug)]
pub struct Request {
    method: Method,
    scheme: Option<String>,
    authority: Option<String>,
    path: String,
    /// HTTP minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    version: u8,
    headers: Headers,
    query: Option<String>,
    body: Bytes,
    params: HashMap<String, String>,
}

impl Request {
    /// Maximum number of headers we support per request.
    const MAX_HEADERS: usize = 64;

    /// Parse a raw HTTP/1.1 request from a byte slice.
    ///
    /// Returns the parsed `Request` and the byte offset at which the body begins
    /// in `buf` (i.e. immediately after the `\r\n\r\n` header terminator).
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`] — more data is needed to complete the request headers.
    /// - [`RequestError::Parse`] — the data is malformed and cannot be parsed.
    /// - [`RequestError::MissingField`] — a required field (method, path, version) is absent.
    /// - [`RequestError::ContentLengthOverflow`] — the declared body length cannot be
    ///   addressed past the headers.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw_req = httparse::Request::new(&mut headers);

        let body_offset = match raw_req.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method = Method::from(
            raw_req
                .method
                .ok_or(RequestError::MissingField { field: "method" })?,
        );

        let target = raw_req
            .path
            .ok_or(RequestError::MissingField { field: "path" })?;
        let target = Target::split(target);

        let version = raw_req
            .version
            .ok_or(RequestError::MissingField { field: "version" })?;

        let mut header_map = Headers::with_capacity(raw_req.headers.len());
        for header in raw_req.headers.iter() {
            if let Ok(value) = std::str::from_utf8(header.value) {
                header_map.insert(header.name, value);
            }
        }

        let params = target
            .query
            .as_deref()
            .map(parse_query_string)
            .unwrap_or_default();
        // Only `Content-Length` bytes belong to this request; anything after
        // them is the next pipelined request.
        let body_len = header_map
            .get("content-length")
            .and_then(|len| len.parse::<usize>().ok())
            .unwrap_or(0);
        let body_end = body_offset
            .checked_add(body_len)
            .ok_or(RequestError::ContentLengthOverflow { length: body_len })?
            .min(buf.len());
        let body = Bytes::copy_from_slice(&buf[body_offset..body_end]);

        Ok((
            Self {
                method,
                scheme: target.scheme,
                authority: target.authority,
                path: target.path,
                version,
                headers: header_map,
                query: target.query,
                body,
                params,
            },
            body_offset,
        ))
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the URL scheme, when known.
    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    /// Sets the URL scheme. Transports call this for origin-form requests.
    pub fn set_scheme(&mut self, scheme: impl Into<String>) {
        self.scheme = Some(scheme.into());
    }

    /// Returns the target host: the authority of an absolute-form target,
    /// falling back to the `Host` header.
    pub fn host(&self) -> Option<&str> {
        self.authority
            .as_deref()
            .or_else(|| self.headers.get("host"))
    }

    /// Returns the request path (without the query string).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the HTTP minor version number (0 = HTTP/1.0, 1 = HTTP/1.1).
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the raw query string (without the leading `?`), if any.
    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Returns a parsed query parameter value by key.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Returns the request body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns `true` if the connection should be kept alive after this request.
    ///
    /// HTTP/1.1 defaults to keep-alive. HTTP/1.0 defaults to close unless
    /// `Connection: keep-alive` is explicitly set.
    pub fn is_keep_alive(&self) -> bool {
        match self.headers.get("connection") {
            Some(conn) => conn.eq_ignore_ascii_case("keep-alive"),
            None => self.version == 1,
        }
    }

    /// Returns the value of the `Content-Length` header parsed as a `usize`, if present.
    pub fn content_length(&self) -> Option<usize> {
        self.headers.get("content-length")?.parse().ok()
    }
}

// The pieces of a request target, split once at parse time.
struct Target {
    scheme: Option<String>,
    authority: Option<String>,
    path: String,
    query: Option<String>,
}

impl Target {
    fn split(raw: &str) -> Self {
        let (rest, query) = match raw.split_once('?') {
            Some((rest, query)) => (rest, Some(query.to_owned())),
            None => (raw, None),
        };

        // Absolute-form: `scheme://authority/path`.
        if let Some((scheme, after)) = rest.split_once("://") {
            if !scheme.is_empty() && scheme.bytes().all(|b| b.is_ascii_alphabetic()) {
                let (authority, path) = match after.find('/') {
                    Some(pos) => (&after[..pos], &after[pos..]),
                    None => (after, ""),
                };
                return Self {
                    scheme: Some(scheme.to_ascii_lowercase()),
                    authority: Some(authority.to_owned()),
                    path: path.to_owned(),
                    query,
                };
            }
        }

        Self {
            scheme: None,
            authority: None,
            path: rest.to_owned(),
            query,
        }
    }
}

/// Parses a URL query string (`key=value&key2=value2`) into a `HashMap`.
///
/// Keys and values have `+` decoded as a space. Route query constraints do
/// not use this map; they match the raw query string.
fn parse_query_string(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next()?.replace('+', " ");
            let value = parts.next().unwrap_or("").replace('+', " ");
            Some((key, value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_get() {
        let raw = b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let (req, offset) = Request::parse(raw).unwrap();
        assert_eq!(req.method(), &Method::Get);
        assert_eq!(req.path(), "/");
        assert_eq!(req.version(), 1);
        assert_eq!(req.host(), Some("localhost"));
        assert_eq!(offset, raw.len());
    }

    #[test]
    fn raw_query_is_kept_verbatim() {
        let raw = b"GET /search?q=rust+lang&debug HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert_eq!(req.path(), "/search");
        assert_eq!(req.query_string(), Some("q=rust+lang&debug"));
        assert_eq!(req.query_param("q"), Some("rust lang"));
        assert_eq!(req.query_param("debug"), Some(""));
    }

    #[test]
    fn absolute_form_sets_scheme_and_host() {
        let raw = b"GET https://Api.example.com:8443/v1/items?x=1 HTTP/1.1\r\nHost: ignored\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert_eq!(req.scheme(), Some("https"));
        assert_eq!(req.host(), Some("Api.example.com:8443"));
        assert_eq!(req.path(), "/v1/items");
        assert_eq!(req.query_string(), Some("x=1"));
    }

    #[test]
    fn absolute_form_without_path() {
        let raw = b"GET http://example.com HTTP/1.1\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert_eq!(req.path(), "");
        assert_eq!(req.host(), Some("example.com"));
    }

    #[test]
    fn scheme_can_be_filled_in_later() {
        let raw = b"GET / HTTP/1.1\r\n\r\n";
        let (mut req, _) = Request::parse(raw).unwrap();
        assert_eq!(req.scheme(), None);
        assert_eq!(req.host(), None);
        req.set_scheme("http");
        assert_eq!(req.scheme(), Some("http"));
    }

    #[test]
    fn incomplete_request() {
        let raw = b"GET / HTTP/1.1\r\nHost:";
        assert!(matches!(Request::parse(raw), Err(RequestError::Incomplete)));
    }

    #[test]
    fn connection_close() {
        let raw = b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert!(!req.is_keep_alive());
    }

    #[test]
    fn content_length() {
        let raw = b"POST / HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\n\r\nhello";
        let (req, body_offset) = Request::parse(raw).unwrap();
        assert_eq!(req.content_length(), Some(5));
        assert_eq!(&raw[body_offset..], b"hello");
    }

    #[test]
    fn oversized_content_length_is_an_error() {
        let raw = b"POST / HTTP/1.1\r\nHost: x\r\nContent-Length: 18446744073709551615\r\n\r\nab";
        match Request::parse(raw) {
            Err(RequestError::ContentLengthOverflow { length }) => assert_eq!(length, usize::MAX),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn body_stops_at_content_length() {
        let raw = b"POST /a HTTP/1.1\r\nContent-Length: 2\r\n\r\nokGET /b HTTP/1.1\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert_eq!(req.body().as_ref(), b"ok");
    }
}
