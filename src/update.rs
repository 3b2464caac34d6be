//! Self-update against a GitHub style release feed.
//!
//! The service only talks to the outside world through the capability
//! traits below, so the whole check → download → install flow can run
//! against canned responses.

mod download;
pub mod platform;
mod release;
mod version;

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Result;
use log::{error, info, warn};

pub use download::{Delay, DownloadJob, DownloadManager, DownloadRequest, DownloadStatus, JobId};
pub use release::{Asset, ReleaseInfo, latest_release};
pub use version::is_newer;

use platform::{PackageMetadata, SystemInstaller, ThreadDelay, ThreadDownloadManager, UreqFetcher};

pub const RELEASES_URL: &str = "https://api.github.com/repos/happyjake/WakeOnLAN/releases";
pub const ACCEPT_HEADER: &str = "application/vnd.github.v3+json";
pub const HTTP_TIMEOUT: Duration = Duration::from_millis(5000);
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const ARTIFACT_SUFFIX: &str = ".apk";
pub const ARTIFACT_STEM: &str = "WakeOnLAN_update";
pub const FALLBACK_VERSION: &str = "0.0.0";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
    pub successful: bool,
    pub body: Option<String>,
    /// `-1` when no response was received at all.
    pub status_code: i32,
}

pub trait HttpFetcher: Send + Sync {
    fn get(&self, url: &str) -> HttpResponse;
}

pub trait AppMetadata: Send + Sync {
    fn current_version_name(&self) -> Result<String>;
}

pub trait Installer: Send + Sync {
    fn install(&self, file: &Path) -> Result<()>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateInfo {
    pub current_version: String,
    pub new_version: String,
    pub release_url: String,
    pub download_url: String,
}

#[derive(Clone, Debug)]
pub struct UpdateConfig {
    pub releases_url: String,
    pub artifact_suffix: String,
    pub download_dir: PathBuf,
    pub file_name: String,
    pub poll_interval: Duration,
    pub max_polls: Option<u32>,
}

impl UpdateConfig {
    pub fn destination(&self) -> PathBuf {
        self.download_dir.join(&self.file_name)
    }
}

impl Default for UpdateConfig {
    fn default() -> Self {
        UpdateConfig {
            releases_url: RELEASES_URL.to_owned(),
            artifact_suffix: ARTIFACT_SUFFIX.to_owned(),
            download_dir: dirs::download_dir().unwrap_or_else(std::env::temp_dir),
            file_name: format!("{ARTIFACT_STEM}{ARTIFACT_SUFFIX}"),
            poll_interval: POLL_INTERVAL,
            max_polls: None,
        }
    }
}

pub struct UpdateService {
    config: UpdateConfig,
    fetcher: Box<dyn HttpFetcher>,
    metadata: Box<dyn AppMetadata>,
    downloads: Box<dyn DownloadManager>,
    installer: Box<dyn Installer>,
    delay: Box<dyn Delay>,
}

impl UpdateService {
    pub fn new(
        config: UpdateConfig,
        fetcher: impl HttpFetcher + 'static,
        metadata: impl AppMetadata + 'static,
        downloads: impl DownloadManager + 'static,
    ) -> Self {
        UpdateService {
            config,
            fetcher: Box::new(fetcher),
            metadata: Box::new(metadata),
            downloads: Box::new(downloads),
            installer: Box::new(SystemInstaller),
            delay: Box::new(ThreadDelay),
        }
    }

    /// Wires the service to the real network, file system and platform
    /// opener. `version` overrides the compiled-in package version.
    pub fn system(config: UpdateConfig, version: Option<String>) -> Self {
        UpdateService::new(
            config,
            UreqFetcher::new(),
            PackageMetadata::new(version),
            ThreadDownloadManager::new(),
        )
    }

    pub fn with_installer(mut self, installer: impl Installer + 'static) -> Self {
        self.installer = Box::new(installer);
        self
    }

    pub fn with_delay(mut self, delay: impl Delay + 'static) -> Self {
        self.delay = Box::new(delay);
        self
    }

    pub fn config(&self) -> &UpdateConfig {
        &self.config
    }

    fn current_version(&self) -> String {
        match self.metadata.current_version_name() {
            Ok(version) => version,
            Err(e) => {
                warn!("Unable to read the running version ({:#})", e);
                FALLBACK_VERSION.to_owned()
            }
        }
    }

    /// Fetches the release list and returns its first release, provided it
    /// offers an installable asset.
    pub fn get_latest_release(&self) -> Option<ReleaseInfo> {
        let response = self.fetcher.get(&self.config.releases_url);

        if !response.successful {
            warn!("Error checking for updates: HTTP {}", response.status_code);
            return None;
        }

        let Some(body) = response.body else {
            warn!("Release list response has no body");
            return None;
        };

        match latest_release(&body, &self.config.artifact_suffix) {
            Ok(Some(release)) => Some(release),
            Ok(None) => {
                info!(
                    "Latest release has no asset ending in {}",
                    self.config.artifact_suffix
                );
                None
            }
            Err(e) => {
                warn!("Unable to parse release list ({})", e);
                None
            }
        }
    }

    /// Returns an update only when the latest release is strictly newer
    /// than the running version. A failed check looks the same as no update.
    pub fn check_for_update(&self) -> Option<UpdateInfo> {
        let current_version = self.current_version();
        let release = self.get_latest_release()?;

        if !is_newer(&current_version, &release.version) {
            info!(
                "Running version {} is up to date (latest {})",
                current_version, release.version
            );
            return None;
        }

        Some(UpdateInfo {
            current_version,
            new_version: release.version,
            release_url: release.html_url,
            download_url: release.download_url,
        })
    }

    /// Downloads `url` to the configured destination and blocks until the
    /// download finishes. Returns the local file on success.
    pub fn download(&self, url: &str) -> Option<PathBuf> {
        let request = DownloadRequest {
            url: url.to_owned(),
            destination: self.config.destination(),
            title: format!("{ARTIFACT_STEM} download"),
        };

        let result = DownloadJob::enqueue(self.downloads.as_ref(), request).and_then(|job| {
            info!("Waiting for download {}", job.id());
            job.wait(
                self.downloads.as_ref(),
                self.delay.as_ref(),
                self.config.poll_interval,
                self.config.max_polls,
            )
        });

        match result {
            Ok(file) => file,
            Err(e) => {
                error!("Error downloading update ({:#})", e);
                None
            }
        }
    }

    pub fn install_update(&self, file: &Path) {
        if let Err(e) = self.installer.install(file) {
            error!("Error installing update {} ({:#})", file.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use std::{collections::VecDeque, sync::Arc};

    use anyhow::bail;
    use parking_lot::Mutex;

    use super::*;

    #[derive(Clone)]
    struct CannedFetcher {
        response: HttpResponse,
        requested: Arc<Mutex<Vec<String>>>,
    }

    impl CannedFetcher {
        fn ok(body: &str) -> Self {
            CannedFetcher {
                response: HttpResponse {
                    successful: true,
                    body: Some(body.to_owned()),
                    status_code: 200,
                },
                requested: Arc::default(),
            }
        }

        fn status(code: i32) -> Self {
            CannedFetcher {
                response: HttpResponse {
                    successful: false,
                    body: None,
                    status_code: code,
                },
                requested: Arc::default(),
            }
        }
    }

    impl HttpFetcher for CannedFetcher {
        fn get(&self, url: &str) -> HttpResponse {
            self.requested.lock().push(url.to_owned());
            self.response.clone()
        }
    }

    struct FixedVersion(Option<&'static str>);

    impl AppMetadata for FixedVersion {
        fn current_version_name(&self) -> Result<String> {
            match self.0 {
                Some(version) => Ok(version.to_owned()),
                None => bail!("package not found"),
            }
        }
    }

    #[derive(Clone, Default)]
    struct ScriptedDownloads {
        statuses: Arc<Mutex<VecDeque<DownloadStatus>>>,
        enqueued: Arc<Mutex<Vec<DownloadRequest>>>,
        refuse: bool,
    }

    impl ScriptedDownloads {
        fn with(statuses: &[DownloadStatus]) -> Self {
            ScriptedDownloads {
                statuses: Arc::new(Mutex::new(statuses.iter().copied().collect())),
                ..Default::default()
            }
        }
    }

    impl DownloadManager for ScriptedDownloads {
        fn enqueue(&self, request: DownloadRequest) -> Result<JobId> {
            if self.refuse {
                bail!("download queue unavailable");
            }
            self.enqueued.lock().push(request);
            Ok(JobId(1))
        }

        fn query_status(&self, _job: JobId) -> Result<DownloadStatus> {
            let mut statuses = self.statuses.lock();
            match statuses.len() {
                0 => bail!("unknown job"),
                1 => Ok(statuses[0]),
                _ => Ok(statuses.pop_front().unwrap()),
            }
        }
    }

    #[derive(Clone, Default)]
    struct CountingDelay(Arc<Mutex<Vec<Duration>>>);

    impl Delay for CountingDelay {
        fn wait(&self, duration: Duration) {
            self.0.lock().push(duration);
        }
    }

    #[derive(Clone, Default)]
    struct RecordingInstaller {
        installed: Arc<Mutex<Vec<PathBuf>>>,
        fail: bool,
    }

    impl Installer for RecordingInstaller {
        fn install(&self, file: &Path) -> Result<()> {
            self.installed.lock().push(file.to_owned());
            if self.fail {
                bail!("no package installer");
            }
            Ok(())
        }
    }

    fn config() -> UpdateConfig {
        UpdateConfig {
            download_dir: PathBuf::from("/tmp/wolcast-test"),
            ..Default::default()
        }
    }

    fn release_list(tag: &str, asset: &str) -> String {
        format!(
            r#"[{{
                "tag_name": "{tag}",
                "html_url": "https://github.com/happyjake/WakeOnLAN/releases/tag/{tag}",
                "assets": [{{
                    "name": "{asset}",
                    "browser_download_url": "https://github.com/happyjake/WakeOnLAN/releases/download/{tag}/{asset}"
                }}]
            }}]"#
        )
    }

    fn service(fetcher: CannedFetcher, version: Option<&'static str>) -> UpdateService {
        UpdateService::new(
            config(),
            fetcher,
            FixedVersion(version),
            ScriptedDownloads::default(),
        )
    }

    #[test]
    fn same_version_is_not_an_update() {
        let fetcher = CannedFetcher::ok(&release_list("v1.0.2", "app-release.apk"));
        assert_eq!(service(fetcher, Some("1.0.2")).check_for_update(), None);
    }

    #[test]
    fn newer_version_with_apk_is_an_update() {
        let fetcher = CannedFetcher::ok(&release_list("v1.0.3", "app-release.apk"));
        let update = service(fetcher.clone(), Some("1.0.2"))
            .check_for_update()
            .unwrap();

        assert_eq!(update.current_version, "1.0.2");
        assert_eq!(update.new_version, "1.0.3");
        assert_eq!(
            update.download_url,
            "https://github.com/happyjake/WakeOnLAN/releases/download/v1.0.3/app-release.apk"
        );
        assert_eq!(
            update.release_url,
            "https://github.com/happyjake/WakeOnLAN/releases/tag/v1.0.3"
        );
        assert_eq!(*fetcher.requested.lock(), vec![RELEASES_URL.to_owned()]);
    }

    #[test]
    fn newer_version_without_apk_is_not_an_update() {
        let fetcher = CannedFetcher::ok(&release_list("v9.0.0", "source.zip"));
        let service = service(fetcher, Some("1.0.2"));

        assert_eq!(service.get_latest_release(), None);
        assert_eq!(service.check_for_update(), None);
    }

    #[test]
    fn http_failure_is_not_an_update() {
        assert_eq!(
            service(CannedFetcher::status(404), Some("1.0.2")).check_for_update(),
            None
        );
        assert_eq!(
            service(CannedFetcher::status(-1), Some("1.0.2")).check_for_update(),
            None
        );
    }

    #[test]
    fn garbage_body_is_not_an_update() {
        let fetcher = CannedFetcher::ok("<html>rate limited</html>");
        assert_eq!(service(fetcher, Some("1.0.2")).check_for_update(), None);
    }

    #[test]
    fn empty_release_list_is_not_an_update() {
        let fetcher = CannedFetcher::ok("[]");
        assert_eq!(service(fetcher, Some("1.0.2")).check_for_update(), None);
    }

    #[test]
    fn unknown_running_version_falls_back_to_zero() {
        let fetcher = CannedFetcher::ok(&release_list("v0.1", "app.apk"));
        let update = service(fetcher, None).check_for_update().unwrap();

        assert_eq!(update.current_version, FALLBACK_VERSION);
        assert_eq!(update.new_version, "0.1");
    }

    #[test]
    fn custom_suffix_selects_other_artifacts() {
        let fetcher = CannedFetcher::ok(&release_list("v2.0.0", "wolcast.tar.gz"));
        let service = UpdateService::new(
            UpdateConfig {
                artifact_suffix: ".tar.gz".to_owned(),
                ..config()
            },
            fetcher,
            FixedVersion(Some("1.0.0")),
            ScriptedDownloads::default(),
        );

        assert_eq!(service.check_for_update().unwrap().new_version, "2.0.0");
    }

    #[test]
    fn successful_download_returns_destination() {
        use DownloadStatus::*;
        let downloads = ScriptedDownloads::with(&[Running, Running, Succeeded]);
        let delay = CountingDelay::default();
        let service = UpdateService::new(
            config(),
            CannedFetcher::status(500),
            FixedVersion(Some("1.0.0")),
            downloads.clone(),
        )
        .with_delay(delay.clone());

        let file = service.download("https://example.com/app.apk").unwrap();

        assert_eq!(file, PathBuf::from("/tmp/wolcast-test/WakeOnLAN_update.apk"));
        assert_eq!(*delay.0.lock(), vec![POLL_INTERVAL; 2]);
        let enqueued = downloads.enqueued.lock();
        assert_eq!(enqueued.len(), 1);
        assert_eq!(enqueued[0].url, "https://example.com/app.apk");
        assert_eq!(enqueued[0].destination, file);
    }

    #[test]
    fn failed_download_returns_nothing() {
        use DownloadStatus::*;
        let service = UpdateService::new(
            config(),
            CannedFetcher::status(500),
            FixedVersion(Some("1.0.0")),
            ScriptedDownloads::with(&[Running, Failed]),
        )
        .with_delay(CountingDelay::default());

        assert_eq!(service.download("https://example.com/app.apk"), None);
    }

    #[test]
    fn refused_enqueue_returns_nothing() {
        let downloads = ScriptedDownloads {
            refuse: true,
            ..Default::default()
        };
        let service = UpdateService::new(
            config(),
            CannedFetcher::status(500),
            FixedVersion(Some("1.0.0")),
            downloads,
        )
        .with_delay(CountingDelay::default());

        assert_eq!(service.download("https://example.com/app.apk"), None);
    }

    #[test]
    fn stuck_download_gives_up_when_bounded() {
        let delay = CountingDelay::default();
        let service = UpdateService::new(
            UpdateConfig {
                max_polls: Some(10),
                ..config()
            },
            CannedFetcher::status(500),
            FixedVersion(Some("1.0.0")),
            ScriptedDownloads::with(&[DownloadStatus::Running]),
        )
        .with_delay(delay.clone());

        assert_eq!(service.download("https://example.com/app.apk"), None);
        assert_eq!(delay.0.lock().len(), 9);
    }

    #[test]
    fn install_failures_are_absorbed() {
        let installer = RecordingInstaller {
            fail: true,
            ..Default::default()
        };
        let service = service(CannedFetcher::status(500), Some("1.0.0"))
            .with_installer(installer.clone());

        service.install_update(Path::new("/tmp/wolcast-test/WakeOnLAN_update.apk"));

        assert_eq!(installer.installed.lock().len(), 1);
    }
}
