use thiserror::Error;

/// Failures surfaced by the browser session layer.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("element not interactable within {waited_ms}ms: {locator}")]
    WaitTimeout { locator: String, waited_ms: u128 },

    #[error("browser protocol error: {0}")]
    Cdp(String),

    #[error("navigation failed for {url}: {reason}")]
    Navigation { url: String, reason: String },
}

/// Fatal conditions that abort a booking run.
///
/// Optional-step timeouts never become a `BookingError`; they are swallowed
/// by the step loop. Everything here unwinds to the top level after the
/// browser session has been released.
#[derive(Error, Debug)]
pub enum BookingError {
    #[error("step '{step}' timed out after {waited_ms}ms waiting for {locator}")]
    ElementTimeout {
        step: &'static str,
        locator: String,
        waited_ms: u128,
    },

    #[error("step '{step}' found no option matching '{wanted}'")]
    NoMatchingOption { step: &'static str, wanted: String },

    #[error("credential file error: {0}")]
    Credentials(#[from] std::io::Error),

    #[error("invalid reservation request: {0}")]
    InvalidRequest(String),

    #[error("step '{step}' failed: {source}")]
    Browser {
        step: &'static str,
        #[source]
        source: DriverError,
    },
}

impl BookingError {
    /// Attach a step name to a session-layer failure, promoting wait
    /// timeouts to the dedicated variant so the failing locator shows up
    /// in the rendered message.
    pub fn from_driver(step: &'static str, err: DriverError) -> Self {
        match err {
            DriverError::WaitTimeout { locator, waited_ms } => BookingError::ElementTimeout {
                step,
                locator,
                waited_ms,
            },
            other => BookingError::Browser { step, source: other },
        }
    }
}
