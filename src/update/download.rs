use std::{fmt, path::PathBuf, time::Duration};

use anyhow::{Result, bail};
use log::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DownloadStatus {
    Running,
    Succeeded,
    Failed,
}

impl DownloadStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, DownloadStatus::Running)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub destination: PathBuf,
    pub title: String,
}

/// A queue that performs downloads in the background and can only be asked
/// about their progress.
pub trait DownloadManager: Send + Sync {
    fn enqueue(&self, request: DownloadRequest) -> Result<JobId>;
    fn query_status(&self, job: JobId) -> Result<DownloadStatus>;
}

pub trait Delay: Send + Sync {
    fn wait(&self, duration: Duration);
}

/// One in-flight download.
#[derive(Debug)]
pub struct DownloadJob {
    id: JobId,
    destination: PathBuf,
    status: DownloadStatus,
}

impl DownloadJob {
    pub fn enqueue(downloads: &dyn DownloadManager, request: DownloadRequest) -> Result<Self> {
        let destination = request.destination.clone();
        let id = downloads.enqueue(request)?;
        debug!("Enqueued download {} to {}", id, destination.display());

        Ok(DownloadJob {
            id,
            destination,
            status: DownloadStatus::Running,
        })
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn status(&self) -> DownloadStatus {
        self.status
    }

    pub fn poll(&mut self, downloads: &dyn DownloadManager) -> Result<DownloadStatus> {
        self.status = downloads.query_status(self.id)?;
        Ok(self.status)
    }

    /// Polls until the job reaches a terminal state, sleeping `interval`
    /// between queries.
    ///
    /// Yields the destination path on success and `None` on failure. With
    /// `max_polls` set, a job still running after that many queries is an
    /// error; without it the loop never gives up.
    pub fn wait(
        mut self,
        downloads: &dyn DownloadManager,
        delay: &dyn Delay,
        interval: Duration,
        max_polls: Option<u32>,
    ) -> Result<Option<PathBuf>> {
        let mut polls: u32 = 0;

        loop {
            match self.poll(downloads)? {
                DownloadStatus::Succeeded => return Ok(Some(self.destination)),
                DownloadStatus::Failed => {
                    warn!("Download {} failed", self.id);
                    return Ok(None);
                }
                DownloadStatus::Running => {}
            }

            polls = polls.saturating_add(1);
            if max_polls.is_some_and(|max| polls >= max) {
                bail!("Download {} still running after {} polls", self.id, polls);
            }

            delay.wait(interval);
        }
    }
}
