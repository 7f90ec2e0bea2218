//! Timed tee-time reservation automation for the VSCloud booking portal.
//!
//! Drives the portal's multi-step search form via chromiumoxide, waking at
//! precomputed checkpoints so the search lands the instant the booking
//! window opens.

pub mod booking;
pub mod browser_setup;
pub mod credentials;
pub mod driver;
pub mod error;
pub mod schedule;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use booking::plan::PortalSelectors;
use error::BookingError;
use schedule::BookingWindowPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub reservation: ReservationRequest,

    #[serde(default)]
    pub portal: PortalConfig,

    #[serde(default)]
    pub window: BookingWindowPolicy,

    #[serde(default)]
    pub browser: BrowserConfig,

    #[serde(default)]
    pub run: RunConfig,
}

/// What to book. Immutable once parsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationRequest {
    pub year: i32,
    pub month: u32,
    pub day: u32,

    /// Label of the start time exactly as the portal's time picker renders
    /// it.
    #[serde(default = "default_time_label")]
    pub time_label: String,

    /// Zero-based position in the result list to book.
    #[serde(default)]
    pub result_rank: usize,
}

impl ReservationRequest {
    pub fn target_date(&self) -> Result<NaiveDate, BookingError> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day).ok_or_else(|| {
            BookingError::InvalidRequest(format!(
                "{:04}-{:02}-{:02} is not a calendar date",
                self.year, self.month, self.day
            ))
        })
    }

    /// Midnight of the target date; the portal releases whole days at
    /// once, so checkpoints are anchored here rather than at the tee time.
    pub fn target_midnight(&self) -> Result<NaiveDateTime, BookingError> {
        Ok(self.target_date()?.and_time(chrono::NaiveTime::MIN))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    #[serde(default = "default_portal_url")]
    pub url: String,

    #[serde(default)]
    pub selectors: PortalSelectors,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Run browser in headless mode
    #[serde(default = "default_headless")]
    pub headless: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Wait for the login and search checkpoints, refresh at the release
    /// instant.
    Timed,
    /// Book right now; the window is assumed already open.
    Immediate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_run_mode")]
    pub mode: RunMode,

    /// Click the final one-click-finish button. Off by default so
    /// exploratory runs stop at the cart without committing a booking.
    #[serde(default)]
    pub confirm: bool,

    #[serde(default = "default_credentials_file")]
    pub credentials_file: PathBuf,
}

fn default_portal_url() -> String {
    "https://web1.myvscloud.com/wbwsc/sccharlestonwt.wsc/search.html?module=GR&search=no".into()
}

fn default_time_label() -> String {
    "07:00 AM".into()
}

fn default_headless() -> bool {
    true
}

fn default_run_mode() -> RunMode {
    RunMode::Immediate
}

fn default_credentials_file() -> PathBuf {
    PathBuf::from(".credentials")
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            url: default_portal_url(),
            selectors: PortalSelectors::default(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mode: default_run_mode(),
            confirm: false,
            credentials_file: default_credentials_file(),
        }
    }
}

/// Load config from a YAML file. The reservation date has no sensible
/// default, so a missing file is an error rather than `Config::default()`.
pub fn load_yaml_config(path: &Path) -> anyhow::Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&contents)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(config)
}
