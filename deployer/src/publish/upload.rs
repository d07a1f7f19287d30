//! Concurrent release asset uploads
//!
//! A fixed number of workers pull file paths from a shared channel. The first
//! failing worker cancels the group: no further paths are handed out and
//! uploads already running finish on their own. The call returns only after
//! every worker has exited.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use github_models::RepoRef;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::DeployerError;
use crate::filesys::dir::Dir;
use crate::publish::host::{ReleaseHost, UploadOutcome};
use crate::utils::{calc_exp_backoff, CooldownOptions};

/// Upload options
#[derive(Debug, Clone)]
pub struct Options {
    /// Number of upload workers
    pub concurrency: usize,

    /// Budget for one file, retries included
    pub per_file_timeout: Duration,

    /// Delay between retries of one file
    pub cooldown: CooldownOptions,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            concurrency: 3,
            per_file_timeout: Duration::from_secs(300),
            cooldown: CooldownOptions::default(),
        }
    }
}

/// What a batch upload did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub uploaded: usize,
    pub already_existed: usize,
}

impl UploadSummary {
    fn record(&mut self, outcome: UploadOutcome) {
        match outcome {
            UploadOutcome::Uploaded => self.uploaded += 1,
            UploadOutcome::AlreadyExists => self.already_existed += 1,
        }
    }

    fn merge(&mut self, other: UploadSummary) {
        self.uploaded += other.uploaded;
        self.already_existed += other.already_existed;
    }
}

/// Upload every regular file directly inside `assets_dir` to the release
pub async fn upload_artefacts(
    host: Arc<dyn ReleaseHost>,
    repo: &RepoRef,
    release_id: u64,
    assets_dir: &Dir,
    options: &Options,
    cancel: &CancellationToken,
) -> Result<UploadSummary, DeployerError> {
    let files = assets_dir.list_files().await?;
    info!("uploading {} files from {}", files.len(), assets_dir.path().display());

    let group = cancel.child_token();
    let (tx, rx) = mpsc::channel::<PathBuf>(1);
    let rx = Arc::new(Mutex::new(rx));

    let mut workers = JoinSet::new();
    for worker_id in 0..options.concurrency.max(1) {
        let host = host.clone();
        let repo = repo.clone();
        let rx = rx.clone();
        let group = group.clone();
        let options = options.clone();

        workers.spawn(async move {
            let mut summary = UploadSummary::default();

            loop {
                let next = {
                    let mut rx = rx.lock().await;
                    tokio::select! {
                        path = rx.recv() => path,
                        _ = group.cancelled() => None,
                    }
                };

                let Some(path) = next else {
                    debug!("upload worker {} done", worker_id);
                    return Ok(summary);
                };

                match upload_one(host.as_ref(), &repo, release_id, &path, &options, &group).await {
                    Ok(outcome) => summary.record(outcome),
                    Err(e) => {
                        group.cancel();
                        return Err(e);
                    }
                }
            }
        });
    }

    for path in files {
        tokio::select! {
            sent = tx.send(path) => {
                if sent.is_err() {
                    break;
                }
            }
            _ = group.cancelled() => break,
        }
    }
    // no more work: idle workers see the channel close and exit
    drop(tx);

    let mut summary = UploadSummary::default();
    let mut first_error = None;

    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Ok(worker_summary)) => summary.merge(worker_summary),
            Ok(Err(e)) => {
                first_error.get_or_insert(e);
            }
            Err(e) => {
                group.cancel();
                first_error.get_or_insert(DeployerError::Internal(format!("upload worker: {}", e)));
            }
        }
    }

    if let Some(e) = first_error {
        return Err(e);
    }

    if cancel.is_cancelled() {
        return Err(DeployerError::Cancelled("upload interrupted".to_string()));
    }

    Ok(summary)
}

/// Upload one file, retrying with backoff until it succeeds or its time budget runs out
async fn upload_one(
    host: &dyn ReleaseHost,
    repo: &RepoRef,
    release_id: u64,
    path: &Path,
    options: &Options,
    cancel: &CancellationToken,
) -> Result<UploadOutcome, DeployerError> {
    let attempts = async {
        let mut attempt = 0;

        loop {
            info!("uploading {}", path.display());

            let err = match host.upload_asset(repo, release_id, path).await {
                Ok(UploadOutcome::AlreadyExists) => {
                    info!("{} already uploaded", path.display());
                    return Ok(UploadOutcome::AlreadyExists);
                }
                Ok(outcome) => return Ok(outcome),
                Err(e) => e,
            };

            warn!("upload {} try failed: {}", path.display(), err);

            let delay = calc_exp_backoff(&options.cooldown, attempt);
            attempt += 1;

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    return Err(DeployerError::UploadFailed {
                        path: path.display().to_string(),
                        reason: format!("cancelled after error: {}", err),
                    });
                }
            }
        }
    };

    tokio::time::timeout(options.per_file_timeout, attempts)
        .await
        .map_err(|_| DeployerError::UploadFailed {
            path: path.display().to_string(),
            reason: format!("gave up after {:?}", options.per_file_timeout),
        })?
}
