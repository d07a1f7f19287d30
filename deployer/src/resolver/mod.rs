//! Artefact resolution
//!
//! A release's artefacts live behind a location URI. The URI's scheme picks
//! the backend once, at construction; after that every backend answers the
//! same question: "give me a byte stream for file X".
//!
//! | location                                   | backend          |
//! |--------------------------------------------|------------------|
//! | `file:<dir>`                               | local directory  |
//! | `http://…/`, `https://…/`                  | base URL + name  |
//! | `githubrelease:<owner>:<repo>:<releaseId>` | GitHub release   |
//! | `docker://<image>:<tag>`, `oci://…`        | OCI registry     |

pub mod github;
pub mod http;
pub mod local;
pub mod oci;

use std::sync::Arc;

use tokio::io::AsyncRead;

use crate::errors::DeployerError;
use crate::http::client::HttpClient;
use crate::http::github::GithubClient;

pub use github::GithubReleaseResolver;
pub use http::HttpResolver;
pub use local::LocalFileResolver;
pub use oci::{OciResolver, OrasCli};

/// Readable content of one artefact
pub type ArtefactReader = Box<dyn AsyncRead + Send + Unpin>;

/// Shared clients the backends are built from
#[derive(Clone)]
pub struct ResolverDeps {
    pub http: HttpClient,

    /// `None` when no GitHub token is configured. GitHub locations still
    /// parse, but downloading from them fails.
    pub github: Option<Arc<GithubClient>>,

    pub oras: OrasCli,
}

/// Artefact backend, selected by location scheme
#[derive(Debug)]
pub enum ArtefactResolver {
    LocalFile(LocalFileResolver),
    Http(HttpResolver),
    GithubRelease(GithubReleaseResolver),
    Oci(OciResolver),
}

impl ArtefactResolver {
    /// Pick and construct the backend for `uri`
    pub fn from_uri(uri: &str, deps: &ResolverDeps) -> Result<Self, DeployerError> {
        if let Some(path) = uri.strip_prefix("file:") {
            return Ok(ArtefactResolver::LocalFile(LocalFileResolver::new(path)));
        }

        if uri.starts_with("http:") || uri.starts_with("https:") {
            return Ok(ArtefactResolver::Http(HttpResolver::new(uri, deps.http.clone())));
        }

        if uri.starts_with("githubrelease:") {
            return Ok(ArtefactResolver::GithubRelease(GithubReleaseResolver::parse(
                uri,
                deps.github.clone(),
            )?));
        }

        if let Some(image_ref) = uri
            .strip_prefix("docker://")
            .or_else(|| uri.strip_prefix("oci://"))
        {
            return Ok(ArtefactResolver::Oci(OciResolver::new(image_ref, deps.oras.clone())?));
        }

        Err(DeployerError::UnsupportedUri(uri.to_string()))
    }

    /// Fetch a named artefact. May be called any number of times; backend
    /// metadata (asset listings, manifests) is fetched on first use only.
    pub async fn download_artefact(&self, filename: &str) -> Result<ArtefactReader, DeployerError> {
        match self {
            ArtefactResolver::LocalFile(r) => r.download_artefact(filename).await,
            ArtefactResolver::Http(r) => r.download_artefact(filename).await,
            ArtefactResolver::GithubRelease(r) => r.download_artefact(filename).await,
            ArtefactResolver::Oci(r) => r.download_artefact(filename).await,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ArtefactResolver::LocalFile(_) => "file",
            ArtefactResolver::Http(_) => "http",
            ArtefactResolver::GithubRelease(_) => "githubrelease",
            ArtefactResolver::Oci(_) => "oci",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn deps() -> ResolverDeps {
        ResolverDeps {
            http: HttpClient::new(Duration::from_secs(5)).unwrap(),
            github: None,
            oras: OrasCli::default(),
        }
    }

    #[test]
    fn test_github_release() {
        let resolver =
            ArtefactResolver::from_uri("githubrelease:function61:coolproduct:12345", &deps()).unwrap();

        match resolver {
            ArtefactResolver::GithubRelease(ghr) => {
                assert_eq!(ghr.repo().owner, "function61");
                assert_eq!(ghr.repo().name, "coolproduct");
                assert_eq!(ghr.release_id(), 12345);
            }
            other => panic!("unexpected backend {}", other.kind()),
        }
    }

    #[test]
    fn test_github_release_component_count_and_id() {
        for bad in [
            "githubrelease:function61:coolproduct",
            "githubrelease:function61:coolproduct:12:34",
            "githubrelease:function61:coolproduct:latest",
            "githubrelease:function61:coolproduct:",
        ] {
            let err = ArtefactResolver::from_uri(bad, &deps()).unwrap_err();
            assert!(
                matches!(err, DeployerError::InvalidLocation(_)),
                "{} gave {:?}",
                bad,
                err
            );
        }
    }

    #[test]
    fn test_http() {
        match ArtefactResolver::from_uri("http://downloads.example.com/", &deps()).unwrap() {
            ArtefactResolver::Http(h) => assert_eq!(h.base_url(), "http://downloads.example.com/"),
            other => panic!("unexpected backend {}", other.kind()),
        }
    }

    #[test]
    fn test_https() {
        match ArtefactResolver::from_uri("https://downloads.example.com/v2/", &deps()).unwrap() {
            ArtefactResolver::Http(h) => assert_eq!(h.base_url(), "https://downloads.example.com/v2/"),
            other => panic!("unexpected backend {}", other.kind()),
        }
    }

    #[test]
    fn test_file_and_oci() {
        assert_eq!(
            ArtefactResolver::from_uri("file:/tmp/build/", &deps()).unwrap().kind(),
            "file"
        );
        assert_eq!(
            ArtefactResolver::from_uri("docker://ghcr.io/function61/coolproduct:20200219", &deps())
                .unwrap()
                .kind(),
            "oci"
        );
    }

    #[test]
    fn test_unsupported_uri() {
        let err = ArtefactResolver::from_uri("ftp://stuff", &deps()).unwrap_err();
        assert_eq!(err.to_string(), "unsupported URI: ftp://stuff");
    }
}
