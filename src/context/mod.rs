//! Per-request context: the request plus request-scoped ambient state.
//!
//! The router threads one [`Context`] through the filter chain and into the
//! handler. Captured route variables travel in the context's own [`Vars`]
//! slot, so every in-flight request owns its own copy. Anything else a filter
//! wants to hand to the handler goes into the type-keyed [`Extensions`] map.

use std::{
    any::{Any, TypeId},
    collections::{HashMap, hash_map},
};

use serde::Serialize;

use crate::Request;

/// Type-erased, request-scoped values keyed by their type.
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value`, returning the previous value of the same type.
    pub fn insert<T>(&mut self, value: T) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    pub fn get<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    pub fn get_mut<T>(&mut self) -> Option<&mut T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get_mut(&TypeId::of::<T>())
            .and_then(|value| value.downcast_mut::<T>())
    }

    pub fn remove<T>(&mut self) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }
}

/// Named capture values extracted from a route's path and host patterns.
///
/// Serializes as a flat JSON object, so a handler can echo it directly.
///
/// # Examples
///
/// ```
/// use reroute::context::Vars;
///
/// let mut vars = Vars::new();
/// vars.insert("id", "42");
/// assert_eq!(vars.get("id"), Some("42"));
/// assert_eq!(serde_json::to_string(&vars).unwrap(), r#"{"id":"42"}"#);
/// ```
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Vars {
    map: HashMap<String, String>,
}

impl Vars {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a capture, replacing any earlier value under the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.map.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.map.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Moves every capture from `other` into `self`.
    pub fn extend(&mut self, other: Vars) {
        self.map.extend(other.map);
    }
}

impl<K, V> FromIterator<(K, V)> for Vars
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            map: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl IntoIterator for Vars {
    type Item = (String, String);
    type IntoIter = hash_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.map.into_iter()
    }
}

/// The value a filter or handler receives for one request.
pub struct Context {
    request: Request,
    vars: Option<Vars>,
    extensions: Extensions,
}

impl Context {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            vars: None,
            extensions: Extensions::new(),
        }
    }

    /// Context carrying `vars`, as the router builds it for a matched route.
    pub fn with_vars(request: Request, vars: Vars) -> Self {
        Self {
            vars: Some(vars),
            ..Self::new(request)
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Variables captured by the matched route, or `None` if this context
    /// never went through routing.
    pub fn vars(&self) -> Option<&Vars> {
        self.vars.as_ref()
    }

    /// Mutable access to the captured variables, creating an empty map on
    /// first use.
    pub fn vars_mut(&mut self) -> &mut Vars {
        self.vars.get_or_insert_with(Vars::new)
    }

    /// Shorthand for a single captured variable.
    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars()?.get(name)
    }

    pub fn into_request(self) -> Request {
        self.request
    }

    /// Deserializes the request body as JSON.
    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_slice(self.request.body())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(raw: &str) -> Request {
        Request::parse(raw.as_bytes()).unwrap().0
    }

    #[test]
    fn unrouted_context_has_no_vars() {
        let ctx = Context::new(request("GET / HTTP/1.1\r\n\r\n"));
        assert!(ctx.vars().is_none());
        assert_eq!(ctx.var("id"), None);
    }

    #[test]
    fn routed_context_exposes_its_vars() {
        let vars: Vars = [("id", "7")].into_iter().collect();
        let ctx = Context::with_vars(request("GET /u/7 HTTP/1.1\r\n\r\n"), vars);
        assert_eq!(ctx.vars().and_then(|v| v.get("id")), Some("7"));
        assert_eq!(ctx.var("id"), Some("7"));
    }

    #[test]
    fn vars_mut_creates_then_merges() {
        let mut ctx = Context::new(request("GET / HTTP/1.1\r\n\r\n"));
        ctx.vars_mut().insert("sub", "api");
        let mut more = Vars::new();
        more.insert("id", "1");
        ctx.vars_mut().extend(more);
        assert_eq!(ctx.vars().map(Vars::len), Some(2));
        assert_eq!(ctx.var("sub"), Some("api"));
    }

    #[test]
    fn vars_mut_keeps_routed_captures() {
        let vars: Vars = [("id", "7")].into_iter().collect();
        let mut ctx = Context::with_vars(request("GET /u/7 HTTP/1.1\r\n\r\n"), vars);
        ctx.vars_mut().insert("tenant", "acme");
        assert_eq!(ctx.var("id"), Some("7"));
        assert_eq!(ctx.var("tenant"), Some("acme"));
    }

    #[test]
    fn extensions_are_independent_of_vars() {
        let mut ctx = Context::new(request("GET / HTTP/1.1\r\n\r\n"));
        ctx.extensions_mut().insert(42u64);
        assert!(ctx.vars().is_none());
        assert_eq!(ctx.extensions().get::<u64>(), Some(&42));
    }

    #[test]
    fn extensions_replace_by_type() {
        let mut ext = Extensions::new();
        assert_eq!(ext.insert(1u32), None);
        assert_eq!(ext.insert(2u32), Some(1));
        assert_eq!(ext.remove::<u32>(), Some(2));
        assert!(ext.get::<u32>().is_none());
    }

    #[test]
    fn json_body() {
        #[derive(serde::Deserialize)]
        struct Payload {
            name: String,
        }
        let ctx = Context::new(request(
            "POST / HTTP/1.1\r\nContent-Length: 15\r\n\r\n{\"name\":\"rust\"}",
        ));
        let payload: Payload = ctx.json().unwrap();
        assert_eq!(payload.name, "rust");
    }
}
