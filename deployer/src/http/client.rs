//! HTTP client implementation

use std::time::Duration;

use futures::TryStreamExt;
use reqwest::{header, Body, Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use tokio_util::io::StreamReader;
use tracing::{debug, error};

use crate::errors::DeployerError;
use crate::resolver::ArtefactReader;

/// Thin wrapper over `reqwest` that turns non-2xx responses into errors
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// `timeout` bounds each request end to end, body included
    pub fn new(timeout: Duration) -> Result<Self, DeployerError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("deployer/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }

    /// GET `url` and hand back the body as a stream
    pub async fn get_stream(
        &self,
        url: &str,
        headers: &[(&str, String)],
    ) -> Result<ArtefactReader, DeployerError> {
        debug!("GET {}", url);

        let response = send(with_headers(self.client.get(url), headers), url).await?;

        let body = response.bytes_stream().map_err(std::io::Error::other);
        Ok(Box::new(Box::pin(StreamReader::new(body))))
    }

    /// GET `url` and decode the JSON body
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: &[(&str, String)],
    ) -> Result<T, DeployerError> {
        debug!("GET {}", url);

        let request = with_headers(self.client.get(url), headers)
            .header(header::ACCEPT, "application/json");
        let response = send(request, url).await?;

        Ok(response.json().await?)
    }

    /// POST a JSON body and decode the JSON response
    pub async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        url: &str,
        headers: &[(&str, String)],
        body: &B,
    ) -> Result<T, DeployerError> {
        debug!("POST {}", url);

        let request = with_headers(self.client.post(url), headers).json(body);
        let response = send(request, url).await?;

        Ok(response.json().await?)
    }

    /// POST a body of known length. The response is returned as-is so callers
    /// can interpret non-2xx statuses themselves.
    pub async fn post_body(
        &self,
        url: &str,
        headers: &[(&str, String)],
        content_type: &str,
        body: Body,
        content_length: u64,
    ) -> Result<Response, DeployerError> {
        debug!("POST {} ({} bytes)", url, content_length);

        let response = with_headers(self.client.post(url), headers)
            .header(header::CONTENT_TYPE, content_type)
            .header(header::CONTENT_LENGTH, content_length)
            .body(body)
            .send()
            .await?;

        Ok(response)
    }
}

fn with_headers(mut request: RequestBuilder, headers: &[(&str, String)]) -> RequestBuilder {
    for (name, value) in headers {
        request = request.header(*name, value);
    }
    request
}

async fn send(request: RequestBuilder, url: &str) -> Result<Response, DeployerError> {
    let response = request.send().await?;

    if !response.status().is_success() {
        return Err(status_error(url, response).await);
    }

    Ok(response)
}

/// Consume a failed response into an error carrying its body
pub async fn status_error(url: &str, response: Response) -> DeployerError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    error!("HTTP request failed: {} - {}", status, body);

    DeployerError::HttpStatus {
        url: url.to_string(),
        status: status.as_u16(),
        body,
    }
}
