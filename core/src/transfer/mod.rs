//! Multi-item upload, download and delete workflows.
//!
//! Each item is one collaborator call, issued sequentially. A failed item is
//! recorded and the batch moves on, except for a lapsed login, which aborts
//! the whole batch because every following call would fail the same way.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::backends::TransferBackend;
use crate::errors::{BackendError, TransferError};
use crate::files::RemotePath;

/// Outcome of a batch, item by item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub succeeded: Vec<String>,
    /// `(item, reason)`.
    pub failed: Vec<(String, String)>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// The succeeded items, or [`TransferError::PartialBatchFailure`] if any
    /// item failed.
    pub fn into_result(self) -> Result<Vec<String>, TransferError> {
        if self.failed.is_empty() {
            return Ok(self.succeeded);
        }
        Err(TransferError::PartialBatchFailure {
            succeeded: self.succeeded.len(),
            failed: self.failed.len(),
            failures: self.failed,
        })
    }

    /// Record one item. A lapsed login aborts the batch.
    pub(crate) fn record(
        &mut self,
        item: String,
        result: Result<(), BackendError>,
    ) -> Result<(), TransferError> {
        match result {
            Ok(()) => {
                self.succeeded.push(item);
                Ok(())
            }
            Err(BackendError::Unauthorized) => Err(TransferError::SessionExpired),
            Err(e) => {
                warn!(%item, "Batch item failed: {e}");
                self.failed.push((item, e.to_string()));
                Ok(())
            }
        }
    }
}

/// A local file to upload.
#[derive(Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub name: String,
    pub data: Vec<u8>,
}

impl LocalFile {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

impl std::fmt::Debug for LocalFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalFile")
            .field("name", &self.name)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Files finished so far out of the whole batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    pub completed: usize,
    pub total: usize,
}

impl UploadProgress {
    /// Whole percent, `100` for an empty batch.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.completed * 100) / self.total) as u8
    }
}

/// A downloaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    pub path: RemotePath,
    pub data: Vec<u8>,
}

/// Upload `files` into `dir` one at a time.
///
/// `on_progress` is called after every file, failed or not.
pub async fn upload_files<F>(
    backend: &dyn TransferBackend,
    dir: &RemotePath,
    files: Vec<LocalFile>,
    mut on_progress: F,
) -> Result<BatchReport, TransferError>
where
    F: FnMut(UploadProgress) + Send,
{
    if files.is_empty() {
        return Err(TransferError::NothingToDo("no files selected".into()));
    }

    let total = files.len();
    let mut report = BatchReport::default();
    info!(%dir, total, "Uploading files");

    for (index, file) in files.into_iter().enumerate() {
        if is_plain_file_name(&file.name) {
            let result = backend.upload_file(dir, &file.name, &file.data).await;
            report.record(file.name, result)?;
        } else {
            warn!(name = %file.name, "Skipping upload with an invalid file name");
            report.failed.push((file.name, "invalid file name".into()));
        }
        on_progress(UploadProgress {
            completed: index + 1,
            total,
        });
    }

    debug!(
        succeeded = report.succeeded.len(),
        failed = report.failed.len(),
        "Upload batch finished"
    );
    Ok(report)
}

fn is_plain_file_name(name: &str) -> bool {
    !name.trim().is_empty() && !name.contains(['/', '\0']) && name != "." && name != ".."
}

/// Trim every link and drop the blank ones.
pub fn clean_links<S: AsRef<str>>(links: &[S]) -> Vec<String> {
    links
        .iter()
        .map(|l| l.as_ref().trim())
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Split a pasted block of text into links, one per line.
pub fn parse_links(text: &str) -> Vec<String> {
    clean_links(&text.lines().collect::<Vec<_>>())
}

/// Submit links for the backend to fetch into `dir`.
///
/// Returns how many links were submitted. Processing happens in the
/// background and shows up as a session.
pub async fn submit_links<S: AsRef<str>>(
    backend: &dyn TransferBackend,
    dir: &RemotePath,
    links: &[S],
) -> Result<usize, TransferError> {
    let links = clean_links(links);
    if links.is_empty() {
        return Err(TransferError::NothingToDo("no links provided".into()));
    }

    backend.submit_link_batch(&links, dir).await?;
    info!(%dir, count = links.len(), "Link batch submitted");
    Ok(links.len())
}

/// Delete every path, one request each.
pub async fn delete_batch(
    backend: &dyn TransferBackend,
    paths: &[RemotePath],
) -> Result<BatchReport, TransferError> {
    if paths.is_empty() {
        return Err(TransferError::NothingToDo("no files selected".into()));
    }

    let mut report = BatchReport::default();
    for path in paths {
        let result = backend.delete_file(path).await;
        report.record(path.to_string(), result)?;
    }
    info!(
        deleted = report.succeeded.len(),
        failed = report.failed.len(),
        "Delete batch finished"
    );
    Ok(report)
}

/// Download every path, one request each.
pub async fn download_batch(
    backend: &dyn TransferBackend,
    paths: &[RemotePath],
) -> Result<(BatchReport, Vec<DownloadedFile>), TransferError> {
    if paths.is_empty() {
        return Err(TransferError::NothingToDo("no files selected".into()));
    }

    let mut report = BatchReport::default();
    let mut files = Vec::new();
    for path in paths {
        let result = match backend.download_file(path).await {
            Ok(data) => {
                files.push(DownloadedFile {
                    path: path.clone(),
                    data,
                });
                Ok(())
            }
            Err(e) => Err(e),
        };
        report.record(path.to_string(), result)?;
    }
    Ok((report, files))
}
