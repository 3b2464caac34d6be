mod tasks;

use std::{path::PathBuf, sync::Arc};

use anyhow::{Error, Result, bail};
use clap::Parser;
use env_logger::Env;
use log::info;
use wolcast::{
    UpdateService,
    update::{ARTIFACT_STEM, ARTIFACT_SUFFIX, RELEASES_URL, UpdateConfig},
};

#[derive(Parser)]
struct UpdateArgs {
    #[clap(long, default_value_t = RELEASES_URL.to_owned())]
    releases_url: String,
    /// Version to compare against instead of the built-in one.
    #[clap(long)]
    current_version: Option<String>,
    #[clap(long)]
    download_dir: Option<PathBuf>,
    /// File name suffix of the installable release asset.
    #[clap(long, default_value_t = ARTIFACT_SUFFIX.to_owned())]
    suffix: String,
    /// Give up on a download still running after this many status polls.
    #[clap(long)]
    max_polls: Option<u32>,
    #[clap(long)]
    check_only: bool,
    #[clap(long)]
    no_install: bool,
    /// Do not ask before downloading and installing.
    #[clap(long, short = 'y')]
    yes: bool,
}

fn args_to_config(args: &UpdateArgs) -> Result<UpdateConfig> {
    if args.suffix.is_empty() {
        return Err(Error::msg("The artifact suffix must not be empty."));
    }

    if args.max_polls == Some(0) {
        return Err(Error::msg("The poll limit must be at least 1."));
    }

    let mut config = UpdateConfig {
        releases_url: args.releases_url.clone(),
        artifact_suffix: args.suffix.clone(),
        file_name: format!("{}{}", ARTIFACT_STEM, args.suffix),
        max_polls: args.max_polls,
        ..Default::default()
    };

    if let Some(dir) = &args.download_dir {
        config.download_dir = dir.clone();
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = UpdateArgs::parse();
    let config = args_to_config(&args)?;
    let service = Arc::new(UpdateService::system(config, args.current_version.clone()));

    let Some(update) = tasks::check_for_update(service.clone()).await? else {
        info!("No update available");
        return Ok(());
    };

    info!(
        "Version {} is available (running {}), see {}",
        update.new_version, update.current_version, update.release_url
    );

    if args.check_only {
        return Ok(());
    }

    if !args.yes
        && !tasks::confirm(format!("Download version {}?", update.new_version)).await?
    {
        return Ok(());
    }

    info!(
        "Saving the update to {}",
        service.config().destination().display()
    );

    let Some(file) = tasks::download(service.clone(), update.download_url.clone()).await? else {
        bail!("Failed to download update");
    };

    info!("Downloaded update to {}", file.display());

    if args.no_install
        || (!args.yes && !tasks::confirm("Install the update now?".to_owned()).await?)
    {
        return Ok(());
    }

    tasks::install(service, file).await?;

    Ok(())
}
