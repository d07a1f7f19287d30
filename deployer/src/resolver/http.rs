//! Artefacts from a plain HTTP(S) location

use tracing::debug;

use crate::errors::DeployerError;
use crate::http::client::HttpClient;
use crate::resolver::ArtefactReader;

/// The filename is appended to the base URL verbatim, so the base should
/// normally end in "/".
#[derive(Debug, Clone)]
pub struct HttpResolver {
    base_url: String,
    http: HttpClient,
}

impl HttpResolver {
    pub fn new(base_url: &str, http: HttpClient) -> Self {
        Self {
            base_url: base_url.to_string(),
            http,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn download_artefact(&self, filename: &str) -> Result<ArtefactReader, DeployerError> {
        let url = format!("{}{}", self.base_url, filename);
        debug!("downloading {}", url);

        self.http.get_stream(&url, &[]).await
    }
}
