use std::{
    io::{self, Write},
    path::PathBuf,
    sync::Arc,
};

use anyhow::Result;
use wolcast::{UpdateInfo, UpdateService};

/// Runs one blocking call on the blocking pool and waits for it.
pub async fn blocking<F, R>(work: F) -> Result<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(work).await?)
}

pub async fn check_for_update(service: Arc<UpdateService>) -> Result<Option<UpdateInfo>> {
    blocking(move || service.check_for_update()).await
}

pub async fn download(service: Arc<UpdateService>, url: String) -> Result<Option<PathBuf>> {
    blocking(move || service.download(&url)).await
}

pub async fn install(service: Arc<UpdateService>, file: PathBuf) -> Result<()> {
    blocking(move || service.install_update(&file)).await
}

pub async fn confirm(prompt: String) -> Result<bool> {
    blocking(move || -> Result<bool> {
        print!("{prompt} [y/N] ");
        io::stdout().flush()?;

        let mut answer = String::new();
        io::stdin().read_line(&mut answer)?;

        Ok(matches!(answer.trim(), "y" | "Y" | "yes" | "Yes"))
    })
    .await?
}
