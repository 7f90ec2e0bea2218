//! chromiumoxide-backed browser session.
//!
//! Owns the Chrome process, its CDP event handler task, and the profile
//! temp directory. The handler MUST be aborted when the session ends or it
//! keeps running after Chrome is gone; `quit()` does this on the normal
//! path and `Drop` is the backstop.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::page::Page;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::{Driver, Element, Locator};
use crate::BrowserConfig;
use crate::browser_setup;
use crate::error::DriverError;

const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Poll interval bounds for element lookup. Starts small and backs off so
/// slow-rendering picker widgets don't get hammered.
const POLL_START: Duration = Duration::from_millis(100);
const POLL_CAP: Duration = Duration::from_secs(1);

fn cdp<E: std::fmt::Display>(err: E) -> DriverError {
    DriverError::Cdp(err.to_string())
}

pub struct CdpDriver {
    browser: Browser,
    handler: Option<JoinHandle<()>>,
    page: Page,
    user_data_dir: Option<PathBuf>,
}

impl CdpDriver {
    /// Launch Chrome with an isolated profile and open a blank page for
    /// the run.
    pub async fn launch(config: &BrowserConfig) -> Result<Self, DriverError> {
        let user_data_dir =
            std::env::temp_dir().join(format!("teebot_{}", std::process::id()));

        let (browser, handler) =
            browser_setup::launch_browser(config.headless, user_data_dir.clone())
                .await
                .map_err(|e| DriverError::Cdp(format!("{e:#}")))?;

        let page = browser.new_page("about:blank").await.map_err(cdp)?;

        Ok(Self {
            browser,
            handler: Some(handler),
            page,
            user_data_dir: Some(user_data_dir),
        })
    }

    /// Remove the profile temp directory. Blocking fs call; only invoked
    /// after Chrome has exited and released its file handles.
    fn cleanup_temp_dir(&mut self) {
        if let Some(path) = self.user_data_dir.take() {
            if let Err(e) = std::fs::remove_dir_all(&path) {
                warn!(
                    "failed to clean up profile dir {}: {e}. Manual cleanup may be required.",
                    path.display()
                );
            }
        }
    }
}

impl Drop for CdpDriver {
    fn drop(&mut self) {
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
        if self.user_data_dir.is_some() {
            warn!(
                "browser session dropped without quit(); profile dir will be orphaned: {}",
                self.user_data_dir.as_ref().unwrap().display()
            );
        }
    }
}

pub struct CdpElement {
    inner: chromiumoxide::element::Element,
    page: Page,
}

#[async_trait]
impl Element for CdpElement {
    async fn click(&self) -> Result<(), DriverError> {
        // Click via clickable point rather than Element::click to bypass
        // the IntersectionObserver hang on off-screen elements.
        self.inner.scroll_into_view().await.map_err(cdp)?;
        let point = self.inner.clickable_point().await.map_err(cdp)?;
        self.page.click(point).await.map_err(cdp)?;
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<(), DriverError> {
        // Focus first; type_str dispatches key events to whatever holds
        // focus.
        self.click().await?;
        self.inner.type_str(text).await.map_err(cdp)?;
        Ok(())
    }

    async fn text(&self) -> Result<String, DriverError> {
        Ok(self
            .inner
            .inner_text()
            .await
            .map_err(cdp)?
            .unwrap_or_default())
    }

    async fn accessible_name(&self) -> Result<String, DriverError> {
        // The portal's picker widgets carry their full date in aria-label.
        if let Some(label) = self.inner.attribute("aria-label").await.map_err(cdp)? {
            return Ok(label);
        }
        self.text().await
    }
}

#[async_trait]
impl Driver for CdpDriver {
    type Elem = CdpElement;

    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        info!(url, "navigating");
        tokio::time::timeout(NAVIGATION_TIMEOUT, self.page.goto(url))
            .await
            .map_err(|_| DriverError::Navigation {
                url: url.to_string(),
                reason: format!("timeout after {}ms", NAVIGATION_TIMEOUT.as_millis()),
            })?
            .map_err(|e| DriverError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        self.page
            .wait_for_navigation()
            .await
            .map_err(|e| DriverError::Navigation {
                url: url.to_string(),
                reason: format!("page never finished loading: {e}"),
            })?;
        Ok(())
    }

    async fn wait_for_clickable(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<Self::Elem, DriverError> {
        let css = locator.to_css();
        let start = std::time::Instant::now();
        let mut poll_interval = POLL_START;

        loop {
            // Present AND scrollable into view counts as interactable;
            // the portal renders its pickers lazily.
            if let Ok(element) = self.page.find_element(&css).await {
                if element.scroll_into_view().await.is_ok() {
                    return Ok(CdpElement {
                        inner: element,
                        page: self.page.clone(),
                    });
                }
            }

            if start.elapsed() >= timeout {
                return Err(DriverError::WaitTimeout {
                    locator: css,
                    waited_ms: timeout.as_millis(),
                });
            }

            tokio::time::sleep(poll_interval).await;
            poll_interval = (poll_interval * 2).min(POLL_CAP);
        }
    }

    async fn find_all(&self, locator: &Locator) -> Result<Vec<Self::Elem>, DriverError> {
        // querySelectorAll resolves to an empty list when nothing matches;
        // an Err here is a protocol failure, not absence, and must not be
        // folded into "no options found".
        let elements = self
            .page
            .find_elements(locator.to_css())
            .await
            .map_err(cdp)?;
        Ok(elements
            .into_iter()
            .map(|inner| CdpElement {
                inner,
                page: self.page.clone(),
            })
            .collect())
    }

    async fn refresh(&self) -> Result<(), DriverError> {
        self.page.reload().await.map_err(cdp)?;
        self.page.wait_for_navigation().await.map_err(cdp)?;
        Ok(())
    }

    async fn quit(mut self) -> Result<(), DriverError> {
        info!("closing browser session");
        let close_result = self.browser.close().await;
        let _ = self.browser.wait().await;

        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
        self.cleanup_temp_dir();

        close_result.map(|_| ()).map_err(cdp)
    }
}
