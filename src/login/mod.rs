//! Login flow for the pilot app.
//!
//! The flow is an explicit state machine: each transition is an isolated
//! step returning a tagged outcome, which keeps timeout injection uniform
//! and every step independently testable. Popup dismissal is strictly
//! ordered because later steps assume a stable UI.

use std::time::Duration;

use thiserror::Error;

use crate::device::{AutomationSession, DriverError, Locator, MatchRule, Widget};
use crate::runlog::RunLog;

/// Dialog title shown by the app when the password is rejected.
const INCORRECT_PASSWORD_TEXT: &str = "invalid password";

/// Default settle delay after submitting credentials.
pub const DEFAULT_PASSWORD_SETTLE: Duration = Duration::from_secs(4);
/// Default settle delay before triggering record synchronization.
pub const DEFAULT_SYNC_TRIGGER_SETTLE: Duration = Duration::from_secs(5);
/// Default interval between synchronization indicator polls.
pub const DEFAULT_SYNC_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Account credentials entered into the login form.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Credentials {
    /// Login identifier, normally an email address.
    pub login: String,
    /// Account password.
    pub password: String,
}

/// Element addresses for the login surface.
///
/// Resource-id locators that embed the package are derived from the app
/// package so one locator set serves rebranded builds of the app.
#[derive(Clone, Debug)]
pub struct LoginLocators {
    /// Email entry field on the login form.
    pub email_field: Locator,
    /// Verification-code field shown on the challenge screen.
    pub verification_field: Locator,
    /// Password field (the only empty editable on the form).
    pub password_field: Locator,
    /// Submit button.
    pub login_button: Locator,
    /// Legal agreement accept control.
    pub legal_agree: Locator,
    /// App-update prompt cancel control.
    pub update_cancel: Locator,
    /// Generic dismissible banner.
    pub ignorable_banner: Locator,
    /// Error dialog title.
    pub dialog_title: Locator,
    /// Challenge image element.
    pub challenge_image: Locator,
    /// Device menu opening the records screen.
    pub records_menu: Locator,
    /// Records screen entry in the menu.
    pub records_entry: Locator,
    /// Refresh control that triggers record synchronization.
    pub records_refresh: Locator,
    /// Indicator shown while synchronization is in progress.
    pub sync_indicator: Locator,
}

impl LoginLocators {
    /// Builds the locator set for the given app package.
    #[must_use]
    pub fn for_package(package: &str) -> Self {
        Self {
            email_field: Locator::new(
                Widget::EditText,
                MatchRule::TextContains(String::from("Enter a valid email")),
            ),
            verification_field: Locator::new(
                Widget::EditText,
                MatchRule::TextContains(String::from("verification code")),
            ),
            password_field: Locator::new(Widget::EditText, MatchRule::TextEquals(String::new())),
            login_button: Locator::new(Widget::Button, MatchRule::TextEquals(String::from("Login"))),
            legal_agree: Locator::new(
                Widget::TextView,
                MatchRule::ResourceIdContains(String::from("legal_agreement_agree")),
            ),
            update_cancel: Locator::new(
                Widget::TextView,
                MatchRule::ResourceIdContains(String::from("popup_dlg_cancel_btn")),
            ),
            ignorable_banner: Locator::new(
                Widget::TextView,
                MatchRule::TextContains(String::from("Ignore")),
            ),
            dialog_title: Locator::new(
                Widget::TextView,
                MatchRule::ResourceIdContains(String::from("dialog_title")),
            ),
            challenge_image: Locator::new(
                Widget::ImageView,
                MatchRule::ResourceIdContains(String::from("verification_code")),
            ),
            records_menu: Locator::new(
                Widget::ImageView,
                MatchRule::ResourceIdEquals(format!("{package}:id/main_device_more")),
            ),
            records_entry: Locator::new(
                Widget::TextView,
                MatchRule::TextEquals(String::from("Flight Record")),
            ),
            records_refresh: Locator::new(
                Widget::ImageView,
                MatchRule::ResourceIdEquals(format!("{package}:id/flightrecord_view_refresh")),
            ),
            sync_indicator: Locator::new(
                Widget::TextView,
                MatchRule::TextContains(String::from("Synchronizing")),
            ),
        }
    }
}

/// Settle delays used by the flow.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LoginTimings {
    /// Delay between submit and the incorrect-password check.
    pub password_settle: Duration,
    /// Delay before tapping the synchronization trigger.
    pub sync_trigger_settle: Duration,
    /// Interval between synchronization indicator polls.
    pub sync_poll_interval: Duration,
}

impl Default for LoginTimings {
    fn default() -> Self {
        Self {
            password_settle: DEFAULT_PASSWORD_SETTLE,
            sync_trigger_settle: DEFAULT_SYNC_TRIGGER_SETTLE,
            sync_poll_interval: DEFAULT_SYNC_POLL_INTERVAL,
        }
    }
}

/// States of the login machine.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LoginStep {
    /// Nothing has happened yet.
    Idle,
    /// Popups are dismissed and the records screen is open.
    PopupsDismissed,
    /// Credentials are typed and submitted.
    CredentialsEntered,
    /// Waiting for the app to accept or reject the credentials.
    AwaitingResult,
}

/// Terminal outcome of the machine.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LoginOutcome {
    /// Credentials accepted; the app is past the login screen.
    Success,
    /// A challenge screen interrupted the login.
    ChallengePresented,
}

/// Result of one transition.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StepOutcome {
    /// Continue with the next state.
    Advance(LoginStep),
    /// The machine reached a terminal outcome.
    Resolved(LoginOutcome),
}

/// Errors raised by the login flow.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum LoginError {
    /// Raised when the app rejects the password. Never retried.
    #[error("incorrect password")]
    IncorrectPassword,
    /// Raised when an automation step fails.
    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Drives the login state machine over one automation session.
#[derive(Debug)]
pub struct LoginFlow<'s, S> {
    session: &'s S,
    credentials: Credentials,
    locators: LoginLocators,
    timings: LoginTimings,
    log: RunLog,
}

impl<'s, S> LoginFlow<'s, S>
where
    S: AutomationSession,
{
    /// Creates a flow bound to `session`.
    #[must_use]
    pub fn new(
        session: &'s S,
        credentials: Credentials,
        locators: LoginLocators,
        log: RunLog,
    ) -> Self {
        Self {
            session,
            credentials,
            locators,
            timings: LoginTimings::default(),
            log,
        }
    }

    /// Overrides the settle delays.
    #[must_use]
    pub const fn with_timings(mut self, timings: LoginTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Runs the machine from `Idle` to a terminal outcome.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::IncorrectPassword`] when the app rejects the
    /// password and [`LoginError::Driver`] when an automation step fails.
    pub async fn run(&self) -> Result<LoginOutcome, LoginError> {
        let mut step = LoginStep::Idle;
        loop {
            match self.transition(step).await? {
                StepOutcome::Advance(next) => step = next,
                StepOutcome::Resolved(outcome) => return Ok(outcome),
            }
        }
    }

    /// Executes one transition of the machine.
    ///
    /// # Errors
    ///
    /// Propagates the step's [`LoginError`].
    pub async fn transition(&self, step: LoginStep) -> Result<StepOutcome, LoginError> {
        match step {
            LoginStep::Idle => {
                self.dismiss_popups().await?;
                Ok(StepOutcome::Advance(LoginStep::PopupsDismissed))
            }
            LoginStep::PopupsDismissed => {
                self.enter_credentials(None).await?;
                Ok(StepOutcome::Advance(LoginStep::CredentialsEntered))
            }
            LoginStep::CredentialsEntered => Ok(StepOutcome::Advance(LoginStep::AwaitingResult)),
            LoginStep::AwaitingResult => self.evaluate_result().await,
        }
    }

    /// Dismisses the startup popups and opens the records screen.
    ///
    /// Each dismissal is best-effort: an absent popup is only negative
    /// telemetry. Opening the records screen is not optional.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::Driver`] when the endpoint fails or the
    /// records screen cannot be opened.
    pub async fn dismiss_popups(&self) -> Result<(), LoginError> {
        self.dismiss(&self.locators.ignorable_banner, "Ignorable popup").await?;
        self.dismiss(&self.locators.ignorable_banner, "Ignorable popup").await?;
        self.dismiss(&self.locators.legal_agree, "Legal popup").await?;
        self.dismiss(&self.locators.ignorable_banner, "Ignorable popup").await?;
        self.dismiss(&self.locators.update_cancel, "Update popup").await?;
        self.dismiss(&self.locators.ignorable_banner, "Ignorable popup").await?;

        self.session.tap(&self.locators.records_menu).await?;
        self.session.tap(&self.locators.records_entry).await?;

        self.dismiss(&self.locators.ignorable_banner, "Ignorable popup").await?;
        Ok(())
    }

    /// Types credentials and submits the form.
    ///
    /// With a `challenge` value the solved code goes into the
    /// verification field instead of the login identifier; the password
    /// and submit steps are identical on both paths.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::Driver`] when a form element is missing or
    /// the endpoint fails.
    pub async fn enter_credentials(&self, challenge: Option<&str>) -> Result<(), LoginError> {
        if let Some(code) = challenge {
            self.session
                .type_text(&self.locators.verification_field, code)
                .await?;
        } else {
            self.session
                .type_text(&self.locators.email_field, &self.credentials.login)
                .await?;
        }
        self.session
            .type_text(&self.locators.password_field, &self.credentials.password)
            .await?;
        self.session.tap(&self.locators.login_button).await?;
        Ok(())
    }

    /// Settles, then classifies the submission result.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::IncorrectPassword`] on the rejection dialog
    /// and [`LoginError::Driver`] when the endpoint fails.
    pub async fn evaluate_result(&self) -> Result<StepOutcome, LoginError> {
        self.check_password_accepted().await?;

        self.log.push("Captcha checking started");
        let challenged = self.session.exists(&self.locators.challenge_image).await?;
        self.log.push(format!("Is captcha displayed: {challenged}"));
        if challenged {
            return Ok(StepOutcome::Resolved(LoginOutcome::ChallengePresented));
        }
        Ok(StepOutcome::Resolved(LoginOutcome::Success))
    }

    /// Waits the settle delay and fails on the incorrect-password dialog.
    ///
    /// The dialog text comparison is case-insensitive; any other dialog
    /// is logged and ignored.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::IncorrectPassword`] on a match and
    /// [`LoginError::Driver`] when the endpoint fails.
    pub async fn check_password_accepted(&self) -> Result<(), LoginError> {
        self.session.settle(self.timings.password_settle).await?;
        let dialog = self.session.read_text(&self.locators.dialog_title).await?;
        self.log
            .push(format!("Is dialogue displayed: {}", dialog.is_some()));
        if let Some(text) = dialog {
            self.log.push(format!("Dialogue text: {text}"));
            let rejected = text.trim().eq_ignore_ascii_case(INCORRECT_PASSWORD_TEXT);
            self.log.push(format!("Password is correct: {}", !rejected));
            if rejected {
                return Err(LoginError::IncorrectPassword);
            }
        }
        Ok(())
    }

    /// Resubmits credentials with the solved challenge value and
    /// finishes the login.
    ///
    /// Runs the same rejection check as the normal path before the
    /// post-login synchronization.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::IncorrectPassword`] or
    /// [`LoginError::Driver`] as the normal path does.
    pub async fn complete_after_challenge(&self, solution: &str) -> Result<(), LoginError> {
        self.log.push("Login after captcha passing");
        self.enter_credentials(Some(solution)).await?;
        self.check_password_accepted().await?;
        self.synchronize_records().await
    }

    /// Triggers record synchronization and waits for it to finish.
    ///
    /// The indicator poll deliberately has no attempt bound: it recurses
    /// while the indicator is present and is bounded only by the
    /// enclosing run timeout.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::Driver`] when the endpoint fails.
    pub async fn synchronize_records(&self) -> Result<(), LoginError> {
        self.log.push("Synchronizing the flight records");
        self.session.settle(self.timings.sync_trigger_settle).await?;
        self.session.tap(&self.locators.records_refresh).await?;

        loop {
            self.session.settle(self.timings.sync_poll_interval).await?;
            let in_progress = self.session.exists(&self.locators.sync_indicator).await?;
            self.log
                .push(format!("Is record sync in progress: {in_progress}"));
            if !in_progress {
                return Ok(());
            }
        }
    }

    /// Dismisses one residual banner before artifact collection.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::Driver`] when the endpoint fails.
    pub async fn dismiss_residual_banner(&self) -> Result<(), LoginError> {
        self.dismiss(&self.locators.ignorable_banner, "Ignorable popup").await
    }

    async fn dismiss(&self, locator: &Locator, label: &str) -> Result<(), LoginError> {
        let shown = self.session.try_tap(locator).await?;
        self.log.push(format!("{label} shown: {shown}"));
        Ok(())
    }
}
