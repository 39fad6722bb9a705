//! `reqwest`-backed transport

use super::{AsyncHttpTransport, HttpRequest, HttpResponse, HttpTransport, Method};
use crate::error::{PolicyError, Result};
use async_trait::async_trait;
use std::sync::OnceLock;
use std::time::Duration;

/// Pooled HTTP client with rustls
///
/// The blocking client is created lazily on first blocking use and must not be
/// driven from inside a Tokio runtime.
pub struct ReqwestTransport {
    client: reqwest::Client,
    blocking: OnceLock<reqwest::blocking::Client>,
    timeout: Duration,
}

impl ReqwestTransport {
    /// Create a new transport with a per-request timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PolicyError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            blocking: OnceLock::new(),
            timeout,
        })
    }

    fn blocking_client(&self) -> Result<&reqwest::blocking::Client> {
        if let Some(client) = self.blocking.get() {
            return Ok(client);
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| PolicyError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(self.blocking.get_or_init(|| client))
    }
}

impl std::fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
    }
}

fn connection_error(request: &HttpRequest, err: reqwest::Error) -> PolicyError {
    if err.is_timeout() {
        PolicyError::Connection(format!("{} {} timed out", request.method, request.url))
    } else {
        PolicyError::Connection(format!("{} {} failed: {}", request.method, request.url, err))
    }
}

#[async_trait]
impl AsyncHttpTransport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut builder = self.client.request(method(request.method), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| connection_error(request, e))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| connection_error(request, e))?;

        Ok(HttpResponse::new(status, body.to_vec()))
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut builder = self
            .blocking_client()?
            .request(method(request.method), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().map_err(|e| connection_error(request, e))?;
        let status = response.status().as_u16();
        let body = response.bytes().map_err(|e| connection_error(request, e))?;

        Ok(HttpResponse::new(status, body.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string, header, method as http_method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_async_send_against_server() {
        let server = MockServer::start().await;
        Mock::given(http_method("PUT"))
            .and(path("/v1/policies/foundry/spawn"))
            .and(header("Content-Type", "text/plain"))
            .and(body_string("package foundry.spawn\n"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();
        let request = HttpRequest::new(Method::Put, format!("{}/v1/policies/foundry/spawn", server.uri()))
            .body("text/plain", "package foundry.spawn\n");

        let response = AsyncHttpTransport::send(&transport, &request).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.text(), "{}");
    }

    #[tokio::test]
    async fn test_error_status_is_a_response() {
        let server = MockServer::start().await;
        Mock::given(http_method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();
        let request = HttpRequest::new(Method::Post, format!("{}/v1/data/x", server.uri()));
        let response = AsyncHttpTransport::send(&transport, &request).await.unwrap();
        assert_eq!(response.status, 500);
        assert_eq!(response.text(), "boom");
    }

    #[tokio::test]
    async fn test_timeout_is_connection_error() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new(Duration::from_millis(50)).unwrap();
        let request = HttpRequest::get(format!("{}/crl", server.uri()));
        let err = AsyncHttpTransport::send(&transport, &request).await.unwrap_err();
        assert!(matches!(err, PolicyError::Connection(_)));
    }
}
