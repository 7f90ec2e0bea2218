//! Browser session capability surface.
//!
//! The booking machine only ever talks to this trait pair, never to
//! chromiumoxide directly, so the step sequence can run against an
//! in-memory session in tests.

mod cdp;

pub use cdp::{CdpDriver, CdpElement};

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::DriverError;

/// Selector strategy + identifier, mapped onto CSS for the CDP session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Id(String),
    ClassName(String),
    Css(String),
}

impl Locator {
    pub fn id(value: impl Into<String>) -> Self {
        Locator::Id(value.into())
    }

    pub fn class(value: impl Into<String>) -> Self {
        Locator::ClassName(value.into())
    }

    pub fn css(value: impl Into<String>) -> Self {
        Locator::Css(value.into())
    }

    pub fn to_css(&self) -> String {
        match self {
            Locator::Id(id) => format!("#{id}"),
            Locator::ClassName(class) => format!(".{class}"),
            Locator::Css(css) => css.clone(),
        }
    }

    /// Narrow this locator to descendants of `parent`.
    pub fn within(&self, parent: &Locator) -> Locator {
        Locator::Css(format!("{} {}", parent.to_css(), self.to_css()))
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_css())
    }
}

/// One interactable element on the portal page.
#[async_trait]
pub trait Element: Send + Sync {
    async fn click(&self) -> Result<(), DriverError>;

    async fn type_text(&self, text: &str) -> Result<(), DriverError>;

    /// Rendered label of the element.
    async fn text(&self) -> Result<String, DriverError>;

    /// Assistive-technology label, used to disambiguate day cells that
    /// repeat a displayed number across adjacent months.
    async fn accessible_name(&self) -> Result<String, DriverError>;
}

/// One live browser session, exclusively owned by a single booking run.
#[async_trait]
pub trait Driver: Send + Sync {
    type Elem: Element;

    async fn navigate(&self, url: &str) -> Result<(), DriverError>;

    /// Block until the element is present and interactable, or time out.
    async fn wait_for_clickable(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<Self::Elem, DriverError>;

    /// All current matches, in document order. Absence is an empty vec,
    /// not an error.
    async fn find_all(&self, locator: &Locator) -> Result<Vec<Self::Elem>, DriverError>;

    /// Force-reload the current page.
    async fn refresh(&self) -> Result<(), DriverError>;

    /// Release the session. Consumes the driver; a run calls this exactly
    /// once on every exit path.
    async fn quit(self) -> Result<(), DriverError>;
}
