/*!
 * HTTP transport for the remote processing service.
 *
 * The backend client only needs three request shapes: a JSON POST, a
 * JSON GET and a POST whose body is read as an event stream. They sit
 * behind the `Transport` trait so the protocol logic can be driven by a
 * scripted transport in tests.
 */

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use log::{debug, error};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;

use crate::errors::BackendError;

/// Byte stream of a response body
pub type ByteStream = BoxStream<'static, Result<Bytes, BackendError>>;

/// Request/response primitives used by the backend client
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST a JSON body and decode a JSON response
    async fn post_json(&self, url: &str, body: &Value, bearer: Option<&str>) -> Result<Value, BackendError>;

    /// GET and decode a JSON response
    async fn get_json(&self, url: &str, bearer: Option<&str>) -> Result<Value, BackendError>;

    /// POST a JSON body asking for `text/event-stream` and return the body stream
    async fn post_event_stream(
        &self,
        url: &str,
        body: &Value,
        bearer: Option<&str>,
    ) -> Result<ByteStream, BackendError>;
}

/// `reqwest` implementation
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self { client: Client::new() }
    }

    fn authorize(request: RequestBuilder, bearer: Option<&str>) -> RequestBuilder {
        match bearer {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(request: RequestBuilder, url: &str) -> Result<Response, BackendError> {
        let response = request
            .send()
            .await
            .map_err(|e| BackendError::Transport(format!("Failed to reach {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to get error response text".to_string());
            error!("Backend error ({}) from {}: {}", status, url, message);
            return Err(BackendError::Http { status_code: status.as_u16(), message });
        }
        Ok(response)
    }

    async fn decode(response: Response) -> Result<Value, BackendError> {
        response
            .json::<Value>()
            .await
            .map_err(|e| BackendError::Protocol(format!("Response is not valid JSON: {}", e)))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_json(&self, url: &str, body: &Value, bearer: Option<&str>) -> Result<Value, BackendError> {
        debug!("POST {}", url);
        let request = Self::authorize(self.client.post(url).json(body), bearer);
        Self::decode(Self::send(request, url).await?).await
    }

    async fn get_json(&self, url: &str, bearer: Option<&str>) -> Result<Value, BackendError> {
        debug!("GET {}", url);
        let request = Self::authorize(self.client.get(url), bearer);
        Self::decode(Self::send(request, url).await?).await
    }

    async fn post_event_stream(
        &self,
        url: &str,
        body: &Value,
        bearer: Option<&str>,
    ) -> Result<ByteStream, BackendError> {
        debug!("POST {} (event stream)", url);
        let request = self
            .client
            .post(url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(body);
        let response = Self::send(Self::authorize(request, bearer), url).await?;

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| BackendError::Transport(format!("Stream interrupted: {}", e))))
            .boxed())
    }
}
