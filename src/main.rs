use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use tracing::info;

use teebot::booking::{self, plan};
use teebot::driver::CdpDriver;
use teebot::{RunMode, credentials, schedule};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "teebot=info".into()),
        )
        .init();

    let config_path = std::env::var("TEEBOT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.yaml"));
    let config = teebot::load_yaml_config(&config_path)?;

    let credentials = credentials::load_or_prompt(&config.run.credentials_file)
        .context("failed to load portal credentials")?;

    let target = config.reservation.target_date()?;
    info!(
        date = %target,
        time = %config.reservation.time_label,
        rank = config.reservation.result_rank,
        mode = ?config.run.mode,
        confirm = config.run.confirm,
        "starting booking run"
    );

    let checkpoints = match config.run.mode {
        RunMode::Timed => {
            let cps = schedule::compute_checkpoints(
                config.reservation.target_midnight()?,
                &config.window,
                Local::now().naive_local(),
            );
            info!(
                login_at = %cps.login_at,
                search_at = %cps.search_at,
                deferred = cps.deferred,
                "checkpoints computed"
            );
            Some(cps)
        }
        RunMode::Immediate => None,
    };

    if let Some(cps) = &checkpoints {
        schedule::wait_until(cps.login_at).await;
    }

    let search = plan::search_plan(
        &config.portal.url,
        &config.portal.selectors,
        target,
        &config.reservation.time_label,
        &credentials,
    );
    let selection = plan::selection_plan(
        &config.portal.selectors,
        config.reservation.result_rank,
        config.run.confirm,
    );

    let driver = CdpDriver::launch(&config.browser)
        .await
        .context("failed to launch browser")?;

    booking::run_booking(driver, &search, &selection, checkpoints.as_ref()).await?;

    info!("booking run completed");
    Ok(())
}
