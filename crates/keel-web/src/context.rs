//! Per-request context.

use crate::template::TemplateEngine;
use crate::WebError;
use bytes::Bytes;
use http::request::Parts;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use http_body_util::Full;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Everything a handler needs about one request, plus the deferred
/// response. Handlers and middlewares only fill `resp_status_code`,
/// `resp_data` and the response headers; the flush step turns them into
/// the actual response exactly once.
pub struct Context {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,

    /// Captures from parametric and regex segments.
    pub path_params: HashMap<String, String>,
    /// Full registered path of the matched node.
    pub matched_route: Option<String>,

    query: Option<HashMap<String, String>>,
    form: Option<HashMap<String, String>>,
    values: HashMap<String, Box<dyn Any + Send + Sync>>,

    pub resp_status_code: StatusCode,
    pub resp_data: Vec<u8>,
    resp_headers: HeaderMap,
    response: Option<http::Response<Full<Bytes>>>,

    template_engine: Option<Arc<dyn TemplateEngine>>,
}

impl Context {
    pub(crate) fn new(
        parts: Parts,
        body: Bytes,
        template_engine: Option<Arc<dyn TemplateEngine>>,
    ) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            path_params: HashMap::new(),
            matched_route: None,
            query: None,
            form: None,
            values: HashMap::new(),
            resp_status_code: StatusCode::OK,
            resp_data: Vec::new(),
            resp_headers: HeaderMap::new(),
            response: None,
            template_engine,
        }
    }

    #[cfg(test)]
    pub(crate) fn for_testing() -> Self {
        let (parts, _) = http::Request::builder()
            .method(Method::GET)
            .uri("/test")
            .body(())
            .unwrap()
            .into_parts();
        Self::new(parts, Bytes::new(), None)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Deserializes the request body as JSON.
    pub fn bind_json<T: DeserializeOwned>(&self) -> Result<T, WebError> {
        if self.body.is_empty() {
            return Err(WebError::BodyDecode("empty body".to_string()));
        }
        serde_json::from_slice(&self.body).map_err(|err| WebError::BodyDecode(err.to_string()))
    }

    /// A captured path parameter.
    pub fn path_value(&self, key: &str) -> Result<String, WebError> {
        self.path_params
            .get(key)
            .cloned()
            .ok_or_else(|| WebError::MissingParam(key.to_string()))
    }

    /// A query-string value; the query is parsed once and cached.
    pub fn query_value(&mut self, key: &str) -> Result<String, WebError> {
        if self.query.is_none() {
            let raw = self.uri.query().unwrap_or("");
            let pairs: Vec<(String, String)> = serde_urlencoded::from_str(raw)
                .map_err(|err| WebError::BodyDecode(err.to_string()))?;
            self.query = Some(pairs.into_iter().collect());
        }
        self.query
            .as_ref()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| WebError::MissingQuery(key.to_string()))
    }

    /// A form value from an urlencoded body; parsed once and cached.
    pub fn form_value(&mut self, key: &str) -> Result<String, WebError> {
        if self.form.is_none() {
            let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(&self.body)
                .map_err(|err| WebError::BodyDecode(err.to_string()))?;
            self.form = Some(pairs.into_iter().collect());
        }
        self.form
            .as_ref()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| WebError::MissingForm(key.to_string()))
    }

    /// Stashes a request-scoped value for later steps of the chain.
    pub fn set_value<T: Any + Send + Sync>(&mut self, key: &str, value: T) {
        self.values.insert(key.to_string(), Box::new(value));
    }

    pub fn get_value<T: Any + Send + Sync>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|v| v.downcast_ref())
    }

    pub fn set_resp_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.resp_headers.insert(name, value);
    }

    /// Defers a plain-text response.
    pub fn resp_string(&mut self, code: StatusCode, body: impl Into<String>) {
        self.resp_status_code = code;
        self.resp_data = body.into().into_bytes();
    }

    /// Defers a JSON response.
    pub fn resp_json<T: Serialize>(&mut self, code: StatusCode, value: &T) -> Result<(), WebError> {
        let data = serde_json::to_vec(value).map_err(|err| WebError::Encode(err.to_string()))?;
        self.resp_status_code = code;
        self.resp_data = data;
        self.resp_headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        Ok(())
    }

    /// Renders `template_name` through the configured engine into the
    /// deferred response.
    pub async fn render<T: Serialize>(
        &mut self,
        template_name: &str,
        data: &T,
    ) -> Result<(), WebError> {
        let engine = self
            .template_engine
            .as_ref()
            .ok_or(WebError::NoTemplateEngine)?
            .clone();
        let data = serde_json::to_value(data).map_err(|err| WebError::Encode(err.to_string()))?;
        let rendered = engine.render(template_name, &data).await?;
        self.resp_status_code = StatusCode::OK;
        self.resp_data = rendered;
        Ok(())
    }

    /// Commits the deferred fields into the response. Only the first call
    /// does anything.
    pub(crate) fn flush(&mut self) {
        if self.response.is_some() {
            return;
        }
        let mut builder = http::Response::builder().status(self.resp_status_code);
        if let Some(headers) = builder.headers_mut() {
            headers.extend(self.resp_headers.drain());
        }
        let body = Full::new(Bytes::from(std::mem::take(&mut self.resp_data)));
        self.response = Some(builder.body(body).expect("statically valid response"));
    }

    pub(crate) fn into_response(mut self) -> http::Response<Full<Bytes>> {
        self.flush();
        self.response.take().expect("flush populates the response")
    }
}
