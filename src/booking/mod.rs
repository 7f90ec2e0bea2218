//! Booking state machine.
//!
//! A run is an ordered list of [`Step`]s executed by one driver loop.
//! Mandatory step failure aborts the run; optional step failure is
//! swallowed and the machine proceeds. No step is retried beyond the
//! single wait-with-timeout it already performs.

pub mod plan;

use std::time::Duration;

use tracing::{error, info, warn};

use crate::driver::{Driver, Element, Locator};
use crate::error::BookingError;
use crate::schedule::{self, Checkpoints, SAFETY_MARGIN};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Mandatory,
    Optional,
}

/// What a step does, expressed as data so the loop below stays the only
/// place that touches the session.
#[derive(Debug, Clone)]
pub enum StepAction {
    Navigate {
        url: String,
    },
    Click {
        target: Locator,
    },
    TypeText {
        target: Locator,
        text: String,
    },
    /// Scan `list` for the entry whose trimmed text equals `label` and
    /// click it. When `scope` is set, wait for that container to become
    /// interactable first.
    SelectOption {
        list: Locator,
        scope: Option<Locator>,
        label: String,
    },
    /// Open the day table and click the cell whose accessible name leads
    /// with the two-digit `month` and whose displayed text equals `day`.
    /// The double check disambiguates day numbers repeated across the
    /// adjacent months shown in the same table.
    SelectDay {
        table: Locator,
        cell: Locator,
        month: u32,
        day: u32,
    },
    /// Wait until at least one match is interactable.
    WaitFor {
        target: Locator,
    },
    /// Click the `rank`-th (zero-based) match of `list`.
    SelectByRank {
        list: Locator,
        rank: usize,
    },
}

#[derive(Debug, Clone)]
pub struct Step {
    pub name: &'static str,
    pub kind: StepKind,
    pub timeout: Duration,
    pub action: StepAction,
}

/// Result of one executed step.
#[derive(Debug)]
pub enum StepOutcome {
    Succeeded,
    SkippedOptional,
    FailedFatal(BookingError),
}

async fn apply<D: Driver>(driver: &D, step: &Step) -> Result<(), BookingError> {
    let wrap = |err| BookingError::from_driver(step.name, err);

    match &step.action {
        StepAction::Navigate { url } => driver.navigate(url).await.map_err(wrap),

        StepAction::Click { target } => {
            let element = driver
                .wait_for_clickable(target, step.timeout)
                .await
                .map_err(wrap)?;
            element.click().await.map_err(wrap)
        }

        StepAction::TypeText { target, text } => {
            let element = driver
                .wait_for_clickable(target, step.timeout)
                .await
                .map_err(wrap)?;
            element.type_text(text).await.map_err(wrap)
        }

        StepAction::SelectOption { list, scope, label } => {
            if let Some(scope) = scope {
                driver
                    .wait_for_clickable(scope, step.timeout)
                    .await
                    .map_err(wrap)?;
            }
            for option in driver.find_all(list).await.map_err(wrap)? {
                if option.text().await.map_err(wrap)?.trim() == label.as_str() {
                    return option.click().await.map_err(wrap);
                }
            }
            Err(BookingError::NoMatchingOption {
                step: step.name,
                wanted: label.clone(),
            })
        }

        StepAction::SelectDay {
            table,
            cell,
            month,
            day,
        } => {
            let table = driver
                .wait_for_clickable(table, step.timeout)
                .await
                .map_err(wrap)?;
            table.click().await.map_err(wrap)?;

            for candidate in driver.find_all(cell).await.map_err(wrap)? {
                let label = candidate.accessible_name().await.map_err(wrap)?;
                let text = candidate.text().await.map_err(wrap)?;
                if leading_month(&label) == Some(*month)
                    && text.trim().parse::<u32>().ok() == Some(*day)
                {
                    return candidate.click().await.map_err(wrap);
                }
            }
            Err(BookingError::NoMatchingOption {
                step: step.name,
                wanted: format!("day cell {month:02}/{day:02}"),
            })
        }

        StepAction::WaitFor { target } => driver
            .wait_for_clickable(target, step.timeout)
            .await
            .map(|_| ())
            .map_err(wrap),

        StepAction::SelectByRank { list, rank } => {
            let entries = driver.find_all(list).await.map_err(wrap)?;
            match entries.get(*rank) {
                Some(entry) => entry.click().await.map_err(wrap),
                None => Err(BookingError::NoMatchingOption {
                    step: step.name,
                    wanted: format!("result at rank {rank}, only {} available", entries.len()),
                }),
            }
        }
    }
}

/// Numeric value of the leading two characters of a day cell's accessible
/// name ("04/19/2026" -> 4). Numeric so "4" and "04" compare equal.
fn leading_month(label: &str) -> Option<u32> {
    label.get(..2)?.parse().ok()
}

/// Run one step and fold its failure through the mandatory/optional
/// policy.
pub async fn execute_step<D: Driver>(driver: &D, step: &Step) -> StepOutcome {
    match apply(driver, step).await {
        Ok(()) => StepOutcome::Succeeded,
        Err(err) => match step.kind {
            StepKind::Optional => {
                warn!(step = step.name, error = %err, "optional step skipped");
                StepOutcome::SkippedOptional
            }
            StepKind::Mandatory => StepOutcome::FailedFatal(err),
        },
    }
}

/// Execute steps in order, stopping at the first fatal failure.
pub async fn run_plan<D: Driver>(driver: &D, steps: &[Step]) -> Result<(), BookingError> {
    for step in steps {
        info!(step = step.name, "running step");
        match execute_step(driver, step).await {
            StepOutcome::Succeeded | StepOutcome::SkippedOptional => {}
            StepOutcome::FailedFatal(err) => {
                error!(step = step.name, error = %err, "step failed, aborting run");
                return Err(err);
            }
        }
    }
    Ok(())
}

async fn drive<D: Driver>(
    driver: &D,
    search: &[Step],
    selection: &[Step],
    checkpoints: Option<&Checkpoints>,
) -> Result<(), BookingError> {
    run_plan(driver, search).await?;

    if let Some(cps) = checkpoints {
        schedule::wait_until(cps.search_at).await;
        if cps.deferred {
            // Absorb clock skew, then force the portal to re-render the
            // just-released slots.
            tokio::time::sleep(SAFETY_MARGIN).await;
            info!("release instant reached, refreshing results");
            driver
                .refresh()
                .await
                .map_err(|e| BookingError::from_driver("refresh results", e))?;
        }
    }

    run_plan(driver, selection).await
}

/// Run the full step sequence against an exclusively-owned session,
/// releasing the session on every exit path. The quit happens exactly
/// once whether the run completes or a mandatory step fails partway.
pub async fn run_booking<D: Driver>(
    driver: D,
    search: &[Step],
    selection: &[Step],
    checkpoints: Option<&Checkpoints>,
) -> Result<(), BookingError> {
    let outcome = drive(&driver, search, selection, checkpoints).await;

    if let Err(err) = driver.quit().await {
        warn!(error = %err, "browser session did not shut down cleanly");
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::plan::{PortalSelectors, search_plan, selection_plan};
    use super::*;
    use crate::credentials::Credentials;
    use crate::error::DriverError;
    use async_trait::async_trait;
    use chrono::{Local, NaiveDate};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Shared {
        clicks: Vec<String>,
        typed: Vec<(String, String)>,
        quits: usize,
        refreshes: usize,
    }

    #[derive(Clone)]
    struct MockElement {
        name: String,
        text: String,
        label: String,
        shared: Arc<Mutex<Shared>>,
    }

    #[async_trait]
    impl Element for MockElement {
        async fn click(&self) -> Result<(), DriverError> {
            self.shared.lock().unwrap().clicks.push(self.name.clone());
            Ok(())
        }

        async fn type_text(&self, text: &str) -> Result<(), DriverError> {
            self.shared
                .lock()
                .unwrap()
                .typed
                .push((self.name.clone(), text.to_string()));
            Ok(())
        }

        async fn text(&self) -> Result<String, DriverError> {
            Ok(self.text.clone())
        }

        async fn accessible_name(&self) -> Result<String, DriverError> {
            Ok(self.label.clone())
        }
    }

    /// In-memory session: a fixed css -> elements map. Locators with no
    /// entry never appear, so waits on them time out instantly. Locators
    /// listed in `failing` simulate protocol failures on list queries.
    struct MockDriver {
        dom: HashMap<String, Vec<MockElement>>,
        failing: Vec<String>,
        shared: Arc<Mutex<Shared>>,
    }

    impl MockDriver {
        fn new() -> Self {
            Self {
                dom: HashMap::new(),
                failing: Vec::new(),
                shared: Arc::new(Mutex::new(Shared::default())),
            }
        }

        fn failing_on(mut self, css: &str) -> Self {
            self.failing.push(css.to_string());
            self
        }

        fn with(mut self, css: &str, elements: Vec<(&str, &str, &str)>) -> Self {
            let elements = elements
                .into_iter()
                .map(|(name, text, label)| MockElement {
                    name: name.to_string(),
                    text: text.to_string(),
                    label: label.to_string(),
                    shared: self.shared.clone(),
                })
                .collect();
            self.dom.insert(css.to_string(), elements);
            self
        }

        fn clicks(&self) -> Vec<String> {
            self.shared.lock().unwrap().clicks.clone()
        }
    }

    #[async_trait]
    impl Driver for MockDriver {
        type Elem = MockElement;

        async fn navigate(&self, _url: &str) -> Result<(), DriverError> {
            Ok(())
        }

        async fn wait_for_clickable(
            &self,
            locator: &Locator,
            timeout: Duration,
        ) -> Result<MockElement, DriverError> {
            let css = locator.to_css();
            self.dom
                .get(&css)
                .and_then(|elements| elements.first().cloned())
                .ok_or_else(|| DriverError::WaitTimeout {
                    locator: css,
                    waited_ms: timeout.as_millis(),
                })
        }

        async fn find_all(&self, locator: &Locator) -> Result<Vec<MockElement>, DriverError> {
            let css = locator.to_css();
            if self.failing.contains(&css) {
                return Err(DriverError::Cdp(format!("node query failed for {css}")));
            }
            Ok(self.dom.get(&css).cloned().unwrap_or_default())
        }

        async fn refresh(&self) -> Result<(), DriverError> {
            self.shared.lock().unwrap().refreshes += 1;
            Ok(())
        }

        async fn quit(self) -> Result<(), DriverError> {
            self.shared.lock().unwrap().quits += 1;
            Ok(())
        }
    }

    fn day_step() -> Step {
        Step {
            name: "select day",
            kind: StepKind::Mandatory,
            timeout: Duration::from_secs(1),
            action: StepAction::SelectDay {
                table: Locator::id("begindate_table"),
                cell: Locator::class("picker__day"),
                month: 4,
                day: 19,
            },
        }
    }

    #[tokio::test]
    async fn day_cell_match_requires_month_and_day() {
        let driver = MockDriver::new()
            .with("#begindate_table", vec![("table", "", "")])
            .with(
                ".picker__day",
                vec![("march-19", "19", "03/19/2026"), ("april-19", "19", "04/19/2026")],
            );

        run_plan(&driver, &[day_step()]).await.unwrap();

        let clicks = driver.clicks();
        assert!(clicks.contains(&"april-19".to_string()));
        assert!(!clicks.contains(&"march-19".to_string()));
    }

    #[tokio::test]
    async fn missing_day_cell_is_no_matching_option() {
        let driver = MockDriver::new()
            .with("#begindate_table", vec![("table", "", "")])
            .with(".picker__day", vec![("march-19", "19", "03/19/2026")]);

        let err = run_plan(&driver, &[day_step()]).await.unwrap_err();
        match err {
            BookingError::NoMatchingOption { step, wanted } => {
                assert_eq!(step, "select day");
                assert!(wanted.contains("04/19"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn optional_step_absence_continues() {
        let driver = MockDriver::new().with("#after", vec![("after", "", "")]);

        let steps = [
            Step {
                name: "dismiss session alert",
                kind: StepKind::Optional,
                timeout: Duration::from_millis(10),
                action: StepAction::Click {
                    target: Locator::id("websessionalert_buttoncontinue"),
                },
            },
            Step {
                name: "after",
                kind: StepKind::Mandatory,
                timeout: Duration::from_millis(10),
                action: StepAction::Click {
                    target: Locator::id("after"),
                },
            },
        ];

        run_plan(&driver, &steps).await.unwrap();
        assert_eq!(driver.clicks(), vec!["after".to_string()]);
    }

    #[tokio::test]
    async fn mandatory_timeout_names_the_step() {
        let driver = MockDriver::new();

        let steps = [Step {
            name: "submit search",
            kind: StepKind::Mandatory,
            timeout: Duration::from_millis(10),
            action: StepAction::Click {
                target: Locator::id("grwebsearch_buttonsearch"),
            },
        }];

        let err = run_plan(&driver, &steps).await.unwrap_err();
        match err {
            BookingError::ElementTimeout { step, locator, .. } => {
                assert_eq!(step, "submit search");
                assert_eq!(locator, "#grwebsearch_buttonsearch");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn result_rank_selects_zero_indexed_entry() {
        let selectors = PortalSelectors::default();
        let driver = MockDriver::new().with(
            ".button-cell--cart",
            vec![("slot-0", "", ""), ("slot-1", "", ""), ("slot-2", "", "")],
        );

        run_plan(&driver, &selection_plan(&selectors, 2, false))
            .await
            .unwrap();
        assert_eq!(driver.clicks(), vec!["slot-2".to_string()]);
    }

    #[tokio::test]
    async fn result_rank_out_of_range_fails() {
        let selectors = PortalSelectors::default();
        let driver = MockDriver::new().with(
            ".button-cell--cart",
            vec![("slot-0", "", ""), ("slot-1", "", "")],
        );

        let err = run_plan(&driver, &selection_plan(&selectors, 2, false))
            .await
            .unwrap_err();
        match err {
            BookingError::NoMatchingOption { step, wanted } => {
                assert_eq!(step, "add slot to cart");
                assert!(wanted.contains("rank 2"));
                assert!(wanted.contains("only 2"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(driver.clicks().is_empty());
    }

    /// Portal markup for everything up to (not including) year options of
    /// the wanted year, so the run dies at year selection.
    fn dom_through_year(wanted_options: Vec<(&'static str, &'static str, &'static str)>) -> MockDriver {
        MockDriver::new()
            .with(".login-link", vec![("login-link", "", "")])
            .with("#weblogin_username", vec![("username", "", "")])
            .with("#weblogin_password", vec![("password", "", "")])
            .with("#weblogin_buttonlogin", vec![("login", "", "")])
            .with("#begindate", vec![("begindate", "", "")])
            .with(".picker__select--year", vec![("year-select", "", "")])
            .with(".picker__select--year option", wanted_options)
    }

    #[tokio::test]
    async fn fatal_year_failure_releases_session_exactly_once() {
        let driver = dom_through_year(vec![("y2024", "2024", ""), ("y2025", "2025", "")]);
        let shared = driver.shared.clone();

        let search = search_plan(
            "https://portal.test/search.html",
            &PortalSelectors::default(),
            NaiveDate::from_ymd_opt(2026, 4, 19).unwrap(),
            "07:00 AM",
            &Credentials {
                username: "golfer".into(),
                password: "secret".into(),
            },
        );
        let selection = selection_plan(&PortalSelectors::default(), 0, false);

        let err = run_booking(driver, &search, &selection, None)
            .await
            .unwrap_err();

        match err {
            BookingError::NoMatchingOption { step, wanted } => {
                assert_eq!(step, "select year");
                assert_eq!(wanted, "2026");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(shared.lock().unwrap().quits, 1);
    }

    #[tokio::test]
    async fn completed_run_releases_session_exactly_once() {
        let mut driver = dom_through_year(vec![("y2026", "2026", "")]);
        driver = driver
            .with(".picker__select--month", vec![("month-select", "", "")])
            .with(
                ".picker__select--month option",
                vec![("march", "March", ""), ("april", "April", "")],
            )
            .with("#begindate_table", vec![("table", "", "")])
            .with(
                "#begindate_table .picker__day",
                vec![("april-19", "19", "04/19/2026")],
            )
            .with("#begintime", vec![("begintime", "", "")])
            .with(
                ".picker__list-item",
                vec![("t0645", "06:45 AM", ""), ("t0700", "07:00 AM", "")],
            )
            .with("#grwebsearch_buttonsearch", vec![("search", "", "")])
            .with(".button-cell--cart", vec![("slot-0", "", "")]);
        let shared = driver.shared.clone();

        let search = search_plan(
            "https://portal.test/search.html",
            &PortalSelectors::default(),
            NaiveDate::from_ymd_opt(2026, 4, 19).unwrap(),
            "07:00 AM",
            &Credentials {
                username: "golfer".into(),
                password: "secret".into(),
            },
        );
        let selection = selection_plan(&PortalSelectors::default(), 0, false);

        run_booking(driver, &search, &selection, None).await.unwrap();

        let shared = shared.lock().unwrap();
        assert_eq!(shared.quits, 1);
        assert!(shared.clicks.contains(&"april-19".to_string()));
        assert!(shared.clicks.contains(&"t0700".to_string()));
        assert!(shared.clicks.contains(&"slot-0".to_string()));
        assert_eq!(
            shared.typed,
            vec![
                ("username".to_string(), "golfer".to_string()),
                ("password".to_string(), "secret".to_string()),
            ]
        );
    }

    fn elapsed_checkpoints(deferred: bool) -> Checkpoints {
        let past = Local::now().naive_local() - chrono::Duration::hours(1);
        Checkpoints {
            login_at: past,
            search_at: past,
            deferred,
        }
    }

    #[tokio::test]
    async fn deferred_checkpoints_refresh_once_before_selection() {
        let driver = MockDriver::new().with(".button-cell--cart", vec![("slot-0", "", "")]);
        let shared = driver.shared.clone();
        let cps = elapsed_checkpoints(true);

        run_booking(
            driver,
            &[],
            &selection_plan(&PortalSelectors::default(), 0, false),
            Some(&cps),
        )
        .await
        .unwrap();

        let shared = shared.lock().unwrap();
        assert_eq!(shared.refreshes, 1);
        assert!(shared.clicks.contains(&"slot-0".to_string()));
        assert_eq!(shared.quits, 1);
    }

    #[tokio::test]
    async fn open_window_checkpoints_skip_the_refresh() {
        let driver = MockDriver::new().with(".button-cell--cart", vec![("slot-0", "", "")]);
        let shared = driver.shared.clone();
        let cps = elapsed_checkpoints(false);

        run_booking(
            driver,
            &[],
            &selection_plan(&PortalSelectors::default(), 0, false),
            Some(&cps),
        )
        .await
        .unwrap();

        let shared = shared.lock().unwrap();
        assert_eq!(shared.refreshes, 0);
        assert!(shared.clicks.contains(&"slot-0".to_string()));
    }

    #[tokio::test]
    async fn protocol_failure_is_not_reported_as_missing_option() {
        let driver = MockDriver::new()
            .with(".button-cell--cart", vec![("slot-0", "", "")])
            .failing_on(".button-cell--cart");

        let err = run_plan(&driver, &selection_plan(&PortalSelectors::default(), 0, false))
            .await
            .unwrap_err();

        match err {
            BookingError::Browser { step, .. } => assert_eq!(step, "add slot to cart"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
