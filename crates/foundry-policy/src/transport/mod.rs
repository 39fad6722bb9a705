//! HTTP transport capability
//!
//! The decision client and feed source only need "send a request, get a
//! status and body back". That capability is expressed by [`HttpTransport`]
//! (blocking) and [`AsyncHttpTransport`]; the concrete implementation is picked
//! explicitly with [`TransportKind`].

mod reqwest_transport;
mod ureq_transport;

pub use reqwest_transport::ReqwestTransport;
pub use ureq_transport::UreqTransport;

use crate::error::{PolicyError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outgoing request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    /// Attach a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Attach a raw body with its content type
    pub fn body(mut self, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        self.headers
            .push(("Content-Type".to_string(), content_type.to_string()));
        self.body = Some(body.into());
        self
    }

    /// Attach a JSON body
    pub fn json(self, value: &serde_json::Value) -> Result<Self> {
        let bytes = serde_json::to_vec(value)?;
        Ok(self.body("application/json", bytes))
    }
}

/// Response status and raw body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// 2xx status
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as text, lossily decoded
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body parsed as JSON
    pub fn json(&self) -> std::result::Result<serde_json::Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Blocking transport
pub trait HttpTransport: Send + Sync {
    /// Send a request; only transport failures are errors, any status is a response
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// Non-blocking transport
#[async_trait]
pub trait AsyncHttpTransport: Send + Sync {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// Available transport implementations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Pooled `reqwest` client with rustls
    #[default]
    Reqwest,
    /// Minimal `ureq` agent; async calls run on the blocking pool
    Ureq,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Reqwest => f.write_str("reqwest"),
            TransportKind::Ureq => f.write_str("ureq"),
        }
    }
}

impl std::str::FromStr for TransportKind {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "reqwest" => Ok(TransportKind::Reqwest),
            "ureq" => Ok(TransportKind::Ureq),
            other => Err(PolicyError::Config(format!("Unknown transport '{}'", other))),
        }
    }
}

/// Blocking and async halves of one transport
#[derive(Clone)]
pub struct Transports {
    pub blocking: Arc<dyn HttpTransport>,
    pub non_blocking: Arc<dyn AsyncHttpTransport>,
}

impl Transports {
    /// Build both halves of the selected implementation
    pub fn build(kind: TransportKind, timeout: Duration) -> Result<Self> {
        match kind {
            TransportKind::Reqwest => {
                let transport = Arc::new(ReqwestTransport::new(timeout)?);
                Ok(Self {
                    blocking: transport.clone(),
                    non_blocking: transport,
                })
            }
            TransportKind::Ureq => {
                let transport = Arc::new(UreqTransport::new(timeout));
                Ok(Self {
                    blocking: transport.clone(),
                    non_blocking: transport,
                })
            }
        }
    }

    /// Use a single value for both halves
    pub fn from_shared<T>(transport: Arc<T>) -> Self
    where
        T: HttpTransport + AsyncHttpTransport + 'static,
    {
        Self {
            blocking: transport.clone(),
            non_blocking: transport,
        }
    }
}

impl fmt::Debug for Transports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transports").finish_non_exhaustive()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = HttpRequest::new(Method::Put, "http://opa/v1/policies/a")
            .body("text/plain", "package a\n");
        assert_eq!(request.method.as_str(), "PUT");
        assert_eq!(
            request.headers,
            vec![("Content-Type".to_string(), "text/plain".to_string())]
        );
        assert_eq!(request.body.as_deref(), Some(&b"package a\n"[..]));
    }

    #[test]
    fn test_response_helpers() {
        let ok = HttpResponse::new(200, br#"{"result":true}"#.to_vec());
        assert!(ok.is_success());
        assert_eq!(ok.json().unwrap()["result"], true);

        let missing = HttpResponse::new(404, b"not found".to_vec());
        assert!(!missing.is_success());
        assert_eq!(missing.text(), "not found");
    }

    #[test]
    fn test_transport_kind_parsing() {
        assert_eq!("UREQ".parse::<TransportKind>().unwrap(), TransportKind::Ureq);
        assert_eq!(TransportKind::default().to_string(), "reqwest");
        assert!("curl".parse::<TransportKind>().is_err());
    }
}
