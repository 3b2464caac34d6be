//! Production implementations of the update capabilities.

use std::{
    collections::BTreeMap,
    fs::{self, File},
    io,
    path::Path,
    process::Command,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    thread,
    time::Duration,
};

use anyhow::{Error, Result, bail, ensure};
use log::{debug, info, warn};
use parking_lot::Mutex;

use super::{
    ACCEPT_HEADER, AppMetadata, Delay, DownloadManager, DownloadRequest, DownloadStatus,
    HTTP_TIMEOUT, HttpFetcher, HttpResponse, Installer, JobId,
};

const USER_AGENT: &str = concat!("wolcast/", env!("CARGO_PKG_VERSION"));

/// Blocking HTTP GET with the release feed's accept header.
#[derive(Clone)]
pub struct UreqFetcher {
    agent: ureq::Agent,
}

impl UreqFetcher {
    pub fn new() -> Self {
        UreqFetcher {
            agent: ureq::AgentBuilder::new()
                .timeout_connect(HTTP_TIMEOUT)
                .timeout_read(HTTP_TIMEOUT)
                .build(),
        }
    }
}

impl Default for UreqFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpFetcher for UreqFetcher {
    fn get(&self, url: &str) -> HttpResponse {
        let response = self
            .agent
            .get(url)
            .set("Accept", ACCEPT_HEADER)
            .set("User-Agent", USER_AGENT)
            .call();

        match response {
            Ok(response) => {
                let status_code = i32::from(response.status());
                match response.into_string() {
                    Ok(body) => HttpResponse {
                        successful: (200..300).contains(&status_code),
                        body: Some(body),
                        status_code,
                    },
                    Err(e) => {
                        debug!("Unable to read response body from {} ({})", url, e);
                        HttpResponse {
                            successful: false,
                            body: None,
                            status_code,
                        }
                    }
                }
            }
            Err(ureq::Error::Status(code, _)) => HttpResponse {
                successful: false,
                body: None,
                status_code: i32::from(code),
            },
            Err(e) => {
                debug!("Request to {} failed ({})", url, e);
                HttpResponse {
                    successful: false,
                    body: None,
                    status_code: -1,
                }
            }
        }
    }
}

/// Runs each download on its own thread and tracks its status in a job
/// table that callers poll.
#[derive(Clone)]
pub struct ThreadDownloadManager {
    agent: ureq::Agent,
    jobs: Arc<Mutex<BTreeMap<JobId, DownloadStatus>>>,
    next_id: Arc<AtomicU64>,
}

impl ThreadDownloadManager {
    pub fn new() -> Self {
        ThreadDownloadManager {
            agent: ureq::AgentBuilder::new()
                .timeout_connect(HTTP_TIMEOUT)
                .build(),
            jobs: Arc::default(),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl Default for ThreadDownloadManager {
    fn default() -> Self {
        Self::new()
    }
}

fn fetch_to_file(agent: &ureq::Agent, request: &DownloadRequest) -> Result<u64> {
    let response = agent
        .get(&request.url)
        .set("User-Agent", USER_AGENT)
        .call()
        .map_err(|e| Error::msg(e.to_string()))?;

    let mut reader = response.into_reader();
    let mut file = File::create(&request.destination)?;
    let written = io::copy(&mut reader, &mut file)?;
    file.sync_all()?;

    Ok(written)
}

impl DownloadManager for ThreadDownloadManager {
    fn enqueue(&self, request: DownloadRequest) -> Result<JobId> {
        if let Some(parent) = request.destination.parent() {
            fs::create_dir_all(parent)?;
        }

        let id = JobId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.jobs.lock().insert(id, DownloadStatus::Running);

        let agent = self.agent.clone();
        let jobs = self.jobs.clone();

        info!(
            "{}: downloading {} to {}",
            request.title,
            request.url,
            request.destination.display()
        );

        let spawned = thread::Builder::new()
            .name(format!("download-{}", id.0))
            .spawn(move || {
                let status = match fetch_to_file(&agent, &request) {
                    Ok(size) => {
                        info!("Download {} completed ({} bytes)", id, size);
                        DownloadStatus::Succeeded
                    }
                    Err(e) => {
                        warn!("Download {} failed ({:#})", id, e);
                        if let Err(e) = fs::remove_file(&request.destination) {
                            debug!(
                                "Unable to remove partial download {} ({})",
                                request.destination.display(),
                                e
                            );
                        }
                        DownloadStatus::Failed
                    }
                };
                jobs.lock().insert(id, status);
            });

        if let Err(e) = spawned {
            self.jobs.lock().remove(&id);
            return Err(e.into());
        }

        Ok(id)
    }

    /// A terminal status is reported once, then the job is forgotten.
    fn query_status(&self, job: JobId) -> Result<DownloadStatus> {
        let mut jobs = self.jobs.lock();
        let status = jobs
            .get(&job)
            .copied()
            .ok_or_else(|| Error::msg(format!("Unknown download {job}")))?;
        if status.is_terminal() {
            jobs.remove(&job);
        }
        Ok(status)
    }
}

/// Reports the compiled-in package version unless an override is given.
#[derive(Clone, Debug, Default)]
pub struct PackageMetadata {
    version: Option<String>,
}

impl PackageMetadata {
    pub fn new(version: Option<String>) -> Self {
        PackageMetadata { version }
    }
}

impl AppMetadata for PackageMetadata {
    fn current_version_name(&self) -> Result<String> {
        match self.version.as_deref().map(str::trim) {
            Some("") => bail!("Empty version override"),
            Some(version) => Ok(version.to_owned()),
            None => Ok(env!("CARGO_PKG_VERSION").to_owned()),
        }
    }
}

/// Hands the downloaded artifact to the platform's default opener, which
/// launches whatever installer is registered for it.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemInstaller;

fn opener_command(file: &Path) -> Command {
    #[cfg(target_os = "windows")]
    let mut command = {
        let mut command = Command::new("cmd");
        command.args(["/C", "start", ""]);
        command
    };
    #[cfg(target_os = "macos")]
    let mut command = Command::new("open");
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    let mut command = Command::new("xdg-open");

    command.arg(file);
    command
}

impl Installer for SystemInstaller {
    fn install(&self, file: &Path) -> Result<()> {
        ensure!(file.is_file(), "{} is not a file", file.display());

        let status = opener_command(file).status()?;
        ensure!(status.success(), "Opener exited with {}", status);

        info!("Handed {} to the system installer", file.display());
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadDelay;

impl Delay for ThreadDelay {
    fn wait(&self, duration: Duration) {
        thread::sleep(duration);
    }
}
