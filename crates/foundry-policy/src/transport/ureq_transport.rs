//! `ureq`-backed transport

use super::{AsyncHttpTransport, HttpRequest, HttpResponse, HttpTransport};
use crate::error::{PolicyError, Result};
use async_trait::async_trait;
use std::io::Read;
use std::time::Duration;

/// Minimal blocking agent; the async form runs on Tokio's blocking pool
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self { agent }
    }
}

impl std::fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UreqTransport").finish_non_exhaustive()
    }
}

fn read_body(request: &HttpRequest, response: ureq::Response) -> Result<HttpResponse> {
    let status = response.status();
    let mut body = Vec::new();
    response
        .into_reader()
        .read_to_end(&mut body)
        .map_err(|e| {
            PolicyError::Connection(format!(
                "{} {} body read failed: {}",
                request.method, request.url, e
            ))
        })?;
    Ok(HttpResponse::new(status, body))
}

impl HttpTransport for UreqTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut call = self.agent.request(request.method.as_str(), &request.url);
        for (name, value) in &request.headers {
            call = call.set(name, value);
        }

        let outcome = match &request.body {
            Some(body) => call.send_bytes(body),
            None => call.call(),
        };

        match outcome {
            Ok(response) => read_body(request, response),
            Err(ureq::Error::Status(_, response)) => read_body(request, response),
            Err(ureq::Error::Transport(transport)) => Err(PolicyError::Connection(format!(
                "{} {} failed: {}",
                request.method, request.url, transport
            ))),
        }
    }
}

#[async_trait]
impl AsyncHttpTransport for UreqTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let transport = self.clone();
        let request = request.clone();
        tokio::task::spawn_blocking(move || HttpTransport::send(&transport, &request))
            .await
            .map_err(|e| PolicyError::Connection(format!("Blocking transport task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Method;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_async_send_runs_on_blocking_pool() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/data/foundry/spawn"))
            .and(body_json(serde_json::json!({"input": {"tenant": "blue"}})))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"result":true}"#))
            .mount(&server)
            .await;

        let transport = UreqTransport::new(Duration::from_secs(5));
        let request = HttpRequest::new(Method::Post, format!("{}/v1/data/foundry/spawn", server.uri()))
            .json(&serde_json::json!({"input": {"tenant": "blue"}}))
            .unwrap();

        let response = AsyncHttpTransport::send(&transport, &request).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.json().unwrap()["result"], true);
    }

    #[tokio::test]
    async fn test_status_error_is_returned_as_response() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(400).set_body_string("rego_parse_error"))
            .mount(&server)
            .await;

        let transport = UreqTransport::new(Duration::from_secs(5));
        let request = HttpRequest::new(Method::Put, format!("{}/v1/policies/a", server.uri()))
            .body("text/plain", "package a\n");

        let response = AsyncHttpTransport::send(&transport, &request).await.unwrap();
        assert_eq!(response.status, 400);
        assert_eq!(response.text(), "rego_parse_error");
    }

    #[test]
    fn test_unreachable_host_is_connection_error() {
        let transport = UreqTransport::new(Duration::from_millis(200));
        let err = HttpTransport::send(&transport, &HttpRequest::get("http://127.0.0.1:1/crl")).unwrap_err();
        assert!(matches!(err, PolicyError::Connection(_)));
    }
}
