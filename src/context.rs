//! Request-side inputs of the matcher.
//!
//! [`RequestContext`] carries what the matcher itself looks at (path, method,
//! host, scheme) plus what redirects need to build an absolute URL.
//! [`Request`] adds the parts only conditions care about.

use std::collections::BTreeMap;

use http::Method;
use serde::{Serialize, Serializer};
use serde_json::Value;

fn serialize_method<S: Serializer>(method: &Method, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(method.as_str())
}

/// Where a request is going: path, method, host and scheme.
#[derive(Debug, Clone, Serialize)]
pub struct RequestContext {
    base_url: String,
    path_info: String,
    #[serde(serialize_with = "serialize_method")]
    method: Method,
    host: String,
    scheme: String,
    http_port: u16,
    https_port: u16,
    query_string: String,
    parameters: BTreeMap<String, Value>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            path_info: String::from("/"),
            method: Method::GET,
            host: String::from("localhost"),
            scheme: String::from("http"),
            http_port: 80,
            https_port: 443,
            query_string: String::new(),
            parameters: BTreeMap::new(),
        }
    }
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Hosts are compared case-insensitively and stored lowercased.
    #[must_use]
    pub fn with_host(mut self, host: &str) -> Self {
        self.host = host.to_ascii_lowercase();
        self
    }

    #[must_use]
    pub fn with_scheme(mut self, scheme: &str) -> Self {
        self.scheme = scheme.to_ascii_lowercase();
        self
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_path_info(mut self, path_info: &str) -> Self {
        self.path_info = path_info.to_string();
        self
    }

    #[must_use]
    pub fn with_ports(mut self, http_port: u16, https_port: u16) -> Self {
        self.http_port = http_port;
        self.https_port = https_port;
        self
    }

    #[must_use]
    pub fn with_query_string(mut self, query_string: &str) -> Self {
        self.query_string = query_string.trim_start_matches('?').to_string();
        self
    }

    #[must_use]
    pub fn with_parameter(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.to_string(), value.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn path_info(&self) -> &str {
        &self.path_info
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    pub fn https_port(&self) -> u16 {
        self.https_port
    }

    pub fn query_string(&self) -> &str {
        &self.query_string
    }

    pub fn parameters(&self) -> &BTreeMap<String, Value> {
        &self.parameters
    }
}

/// A request as seen by route conditions.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Request {
    #[serde(flatten)]
    context: RequestContext,
    headers: BTreeMap<String, String>,
    client_ip: Option<String>,
}

impl Request {
    pub fn new(context: RequestContext) -> Self {
        Self {
            context,
            headers: BTreeMap::new(),
            client_ip: None,
        }
    }

    /// Header names are stored lowercased.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    #[must_use]
    pub fn with_client_ip(mut self, ip: &str) -> Self {
        self.client_ip = Some(ip.to_string());
        self
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn client_ip(&self) -> Option<&str> {
        self.client_ip.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let ctx = RequestContext::default();
        assert_eq!(ctx.method(), &Method::GET);
        assert_eq!(ctx.host(), "localhost");
        assert_eq!(ctx.scheme(), "http");
        assert_eq!(ctx.path_info(), "/");
        assert_eq!((ctx.http_port(), ctx.https_port()), (80, 443));
    }

    #[test]
    fn test_normalization() {
        let ctx = RequestContext::new()
            .with_host("WWW.Example.com")
            .with_scheme("HTTPS")
            .with_base_url("/app/")
            .with_query_string("?a=1");
        assert_eq!(ctx.host(), "www.example.com");
        assert_eq!(ctx.scheme(), "https");
        assert_eq!(ctx.base_url(), "/app");
        assert_eq!(ctx.query_string(), "a=1");
    }

    #[test]
    fn test_request_serializes_flat() {
        let request = Request::new(RequestContext::new().with_method(Method::POST))
            .with_header("X-Debug", "1")
            .with_client_ip("10.0.0.1");
        let value = serde_json::to_value(&request).expect("serializable");
        assert_eq!(value["method"], json!("POST"));
        assert_eq!(value["headers"]["x-debug"], json!("1"));
        assert_eq!(value["client_ip"], json!("10.0.0.1"));
        assert_eq!(request.header("x-DEBUG"), Some("1"));
    }
}
