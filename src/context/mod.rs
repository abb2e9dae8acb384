//! Per-request context handed to middleware and handlers.
//!
//! A [`Context`] is created by the dispatcher for exactly one request and is never
//! shared with another request's task. It holds the merged route/query [`Params`],
//! the parsed JSON body, typed [`Extensions`] that middleware can attach, and the
//! response status if one was set explicitly.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
};

use serde_json::{Map, Value};

use crate::http::{Headers, Method, StatusCode};

/// Type-erased map for per-request state keyed by type.
///
/// Middleware inserts values here (an authenticated principal, a request id) and
/// handlers read them back without either knowing about the other.
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, returning the previous value of the same type.
    pub fn insert<T>(&mut self, value: T) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|prev| prev.downcast::<T>().ok())
            .map(|prev| *prev)
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

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// String parameters: path captures, query pairs, or both merged.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Params {
    map: HashMap<String, String>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, replacing any earlier value for the same key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.map.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.map.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
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

    /// Copies every entry of `other` over this map; `other` wins on shared keys.
    pub fn merge(&mut self, other: &Params) {
        for (k, v) in &other.map {
            self.map.insert(k.clone(), v.clone());
        }
    }

    /// JSON object view used by the query validator.
    pub fn to_value(&self) -> Value {
        let object: Map<String, Value> = self
            .map
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        Value::Object(object)
    }
}

impl<K, V> FromIterator<(K, V)> for Params
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            map: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Per-request state shared by the middleware chain and the handler.
pub struct Context {
    method: Method,
    url: String,
    path: String,
    headers: Headers,
    params: Params,
    query: Params,
    body: Option<Value>,
    extensions: Extensions,
    status: Option<StatusCode>,
}

impl Context {
    /// Creates a context for `url`; the path is the URL with its query string removed.
    pub fn new(method: Method, url: impl Into<String>, headers: Headers) -> Self {
        let url = url.into();
        let path = url.split_once('?').map_or(url.as_str(), |(p, _)| p).to_owned();
        Self {
            method,
            url,
            path,
            headers,
            params: Params::new(),
            query: Params::new(),
            body: None,
            extensions: Extensions::new(),
            status: None,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Raw request target, query string included.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Query parameters merged with path parameters; path parameters win.
    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    /// Query parameters alone, as parsed by the route's compiled parser.
    pub fn query(&self) -> &Params {
        &self.query
    }

    /// The parsed JSON body. `None` for methods that do not carry one.
    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// Deserializes the parsed body into `T`. A missing body reads as `{}`.
    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        match &self.body {
            Some(body) => T::deserialize(body),
            None => T::deserialize(&Value::Object(Map::new())),
        }
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Overrides the success status of the response (200 when never set).
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub(crate) fn set_params(&mut self, query: Params, params: Params) {
        self.query = query;
        self.params = params;
    }

    pub(crate) fn set_body(&mut self, body: Value) {
        self.body = Some(body);
    }
}
