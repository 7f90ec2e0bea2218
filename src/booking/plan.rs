//! Concrete step plans for the VSCloud tee-time portal.
//!
//! Every selector the portal's markup forces on us lives in
//! [`PortalSelectors`] so the step loop in `booking` stays free of DOM
//! knowledge. These ids and classes are an implicit contract with the
//! third-party site and are the most fragile part of the whole tool.

use std::time::Duration;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use super::{Step, StepAction, StepKind};
use crate::credentials::Credentials;
use crate::driver::Locator;

/// Default wait for a mandatory element to become interactable.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(20);

/// Short wait for the optional "continue session" interstitial; absence is
/// the normal case.
pub const OPTIONAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Longer wait for the result list, which renders after the search round
/// trip.
pub const RESULTS_TIMEOUT: Duration = Duration::from_secs(20);

/// Element ids and class names of the portal's booking form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalSelectors {
    pub login_link_class: String,
    pub username_id: String,
    pub password_id: String,
    pub login_button_id: String,
    pub session_alert_continue_id: String,
    pub date_field_id: String,
    pub year_select_class: String,
    pub month_select_class: String,
    pub day_table_id: String,
    pub day_cell_class: String,
    pub time_field_id: String,
    pub time_item_class: String,
    pub search_button_id: String,
    pub cart_button_class: String,
    pub finish_button_id: String,
}

impl Default for PortalSelectors {
    fn default() -> Self {
        Self {
            login_link_class: "login-link".into(),
            username_id: "weblogin_username".into(),
            password_id: "weblogin_password".into(),
            login_button_id: "weblogin_buttonlogin".into(),
            session_alert_continue_id: "websessionalert_buttoncontinue".into(),
            date_field_id: "begindate".into(),
            year_select_class: "picker__select--year".into(),
            month_select_class: "picker__select--month".into(),
            day_table_id: "begindate_table".into(),
            day_cell_class: "picker__day".into(),
            time_field_id: "begintime".into(),
            time_item_class: "picker__list-item".into(),
            search_button_id: "grwebsearch_buttonsearch".into(),
            cart_button_class: "button-cell--cart".into(),
            finish_button_id: "golfmemberselection_buttononeclicktofinish".into(),
        }
    }
}

/// Steps from opening the portal through submitting the search: login,
/// date/time selection, search. Run before the release instant in the
/// timed flow.
pub fn search_plan(
    url: &str,
    selectors: &PortalSelectors,
    target: NaiveDate,
    time_label: &str,
    credentials: &Credentials,
) -> Vec<Step> {
    let year_select = Locator::class(&selectors.year_select_class);
    let month_select = Locator::class(&selectors.month_select_class);

    vec![
        Step {
            name: "open booking page",
            kind: StepKind::Mandatory,
            timeout: STEP_TIMEOUT,
            action: StepAction::Navigate { url: url.into() },
        },
        Step {
            name: "open login form",
            kind: StepKind::Mandatory,
            timeout: STEP_TIMEOUT,
            action: StepAction::Click {
                target: Locator::class(&selectors.login_link_class),
            },
        },
        Step {
            name: "enter username",
            kind: StepKind::Mandatory,
            timeout: STEP_TIMEOUT,
            action: StepAction::TypeText {
                target: Locator::id(&selectors.username_id),
                text: credentials.username.clone(),
            },
        },
        Step {
            name: "enter password",
            kind: StepKind::Mandatory,
            timeout: STEP_TIMEOUT,
            action: StepAction::TypeText {
                target: Locator::id(&selectors.password_id),
                text: credentials.password.clone(),
            },
        },
        Step {
            name: "submit login",
            kind: StepKind::Mandatory,
            timeout: STEP_TIMEOUT,
            action: StepAction::Click {
                target: Locator::id(&selectors.login_button_id),
            },
        },
        // Shown only when the portal decides the account has a stale
        // session; usually absent.
        Step {
            name: "dismiss session alert",
            kind: StepKind::Optional,
            timeout: OPTIONAL_TIMEOUT,
            action: StepAction::Click {
                target: Locator::id(&selectors.session_alert_continue_id),
            },
        },
        // Login may have redirected to the account landing page.
        Step {
            name: "return to booking page",
            kind: StepKind::Mandatory,
            timeout: STEP_TIMEOUT,
            action: StepAction::Navigate { url: url.into() },
        },
        Step {
            name: "open date picker",
            kind: StepKind::Mandatory,
            timeout: STEP_TIMEOUT,
            action: StepAction::Click {
                target: Locator::id(&selectors.date_field_id),
            },
        },
        Step {
            name: "select year",
            kind: StepKind::Mandatory,
            timeout: STEP_TIMEOUT,
            action: StepAction::SelectOption {
                list: Locator::css("option").within(&year_select),
                scope: Some(year_select),
                label: target.format("%Y").to_string(),
            },
        },
        Step {
            name: "select month",
            kind: StepKind::Mandatory,
            timeout: STEP_TIMEOUT,
            action: StepAction::SelectOption {
                list: Locator::css("option").within(&month_select),
                scope: Some(month_select),
                label: target.format("%B").to_string(),
            },
        },
        Step {
            name: "select day",
            kind: StepKind::Mandatory,
            timeout: STEP_TIMEOUT,
            action: StepAction::SelectDay {
                table: Locator::id(&selectors.day_table_id),
                cell: Locator::class(&selectors.day_cell_class)
                    .within(&Locator::id(&selectors.day_table_id)),
                month: target.month(),
                day: target.day(),
            },
        },
        Step {
            name: "open time picker",
            kind: StepKind::Mandatory,
            timeout: STEP_TIMEOUT,
            action: StepAction::Click {
                target: Locator::id(&selectors.time_field_id),
            },
        },
        // Clicking the first entry forces the lazily-rendered time list to
        // populate before the scan below.
        Step {
            name: "prime time list",
            kind: StepKind::Mandatory,
            timeout: STEP_TIMEOUT,
            action: StepAction::Click {
                target: Locator::class(&selectors.time_item_class),
            },
        },
        Step {
            name: "select start time",
            kind: StepKind::Mandatory,
            timeout: STEP_TIMEOUT,
            action: StepAction::SelectOption {
                list: Locator::class(&selectors.time_item_class),
                scope: None,
                label: time_label.to_string(),
            },
        },
        Step {
            name: "submit search",
            kind: StepKind::Mandatory,
            timeout: STEP_TIMEOUT,
            action: StepAction::Click {
                target: Locator::id(&selectors.search_button_id),
            },
        },
    ]
}

/// Steps from the rendered result list through booking: wait for results,
/// pick the slot at `rank`, and (when `confirm` is set) finalize. Run
/// after the release instant in the timed flow.
pub fn selection_plan(selectors: &PortalSelectors, rank: usize, confirm: bool) -> Vec<Step> {
    let cart = Locator::class(&selectors.cart_button_class);

    let mut steps = vec![
        // Explicit non-emptiness precondition before indexing; the list
        // renders well after the search round trip completes.
        Step {
            name: "wait for results",
            kind: StepKind::Mandatory,
            timeout: RESULTS_TIMEOUT,
            action: StepAction::WaitFor {
                target: cart.clone(),
            },
        },
        Step {
            name: "add slot to cart",
            kind: StepKind::Mandatory,
            timeout: STEP_TIMEOUT,
            action: StepAction::SelectByRank { list: cart, rank },
        },
    ];

    if confirm {
        steps.push(Step {
            name: "finish booking",
            kind: StepKind::Mandatory,
            timeout: STEP_TIMEOUT,
            action: StepAction::Click {
                target: Locator::id(&selectors.finish_button_id),
            },
        });
    }

    steps
}
