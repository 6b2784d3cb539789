//! Challenge (CAPTCHA) detection and resolution.
//!
//! The coordinator captures the screen, crops the challenge region, and
//! delegates recognition to the external solver. Everything around the
//! solver call is fatal on I/O error: resubmitting against the solver is
//! costly, so the run fails instead of retrying.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use thiserror::Error;

use crate::device::{AutomationSession, DriverError, ElementRegion, Locator};
use crate::provider::ProviderFuture;
use crate::runlog::RunLog;

mod solver;
mod store;

pub use solver::{HttpCaptchaSolver, HttpSolverError};
pub use store::{ChallengeStore, StoreError};

/// Default settle delay before the challenge region is measured.
pub const DEFAULT_CHALLENGE_SETTLE: Duration = Duration::from_secs(2);

/// Collaborator that recognises challenge images.
pub trait CaptchaSolver {
    /// Solver specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Resolves a base64-encoded challenge image to its text.
    fn solve<'a>(&'a self, image_base64: &'a str) -> ProviderFuture<'a, String, Self::Error>;
}

impl<C: CaptchaSolver> CaptchaSolver for &C {
    type Error = C::Error;

    fn solve<'a>(&'a self, image_base64: &'a str) -> ProviderFuture<'a, String, Self::Error> {
        (**self).solve(image_base64)
    }
}

/// Errors raised on the challenge path. All are fatal for the run.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CaptchaError {
    /// Raised when capture, crop, or store I/O fails.
    #[error("captcha flow error: {message}")]
    Flow {
        /// Description of the failing step.
        message: String,
    },
    /// Raised when the solver collaborator fails.
    #[error("captcha solver error: {message}")]
    Solver {
        /// Message reported by the solver.
        message: String,
    },
}

impl From<DriverError> for CaptchaError {
    fn from(value: DriverError) -> Self {
        Self::Flow {
            message: value.to_string(),
        }
    }
}

impl From<StoreError> for CaptchaError {
    fn from(value: StoreError) -> Self {
        Self::Flow {
            message: value.to_string(),
        }
    }
}

/// Crops `region` out of a PNG screenshot and re-encodes the crop.
///
/// The region is clamped to the screenshot bounds so an element that
/// hangs off-screen still produces a usable crop.
///
/// # Errors
///
/// Returns [`CaptchaError::Flow`] when the screenshot cannot be decoded
/// or the clamped region is empty.
pub fn crop_challenge(screenshot_png: &[u8], region: ElementRegion) -> Result<Vec<u8>, CaptchaError> {
    let screen = image::load_from_memory(screenshot_png).map_err(|err| CaptchaError::Flow {
        message: format!("screenshot decode failed: {err}"),
    })?;

    let x = u32::try_from(region.x.max(0)).unwrap_or(0);
    let y = u32::try_from(region.y.max(0)).unwrap_or(0);
    let width = region.width.min(screen.width().saturating_sub(x));
    let height = region.height.min(screen.height().saturating_sub(y));
    if width == 0 || height == 0 {
        return Err(CaptchaError::Flow {
            message: String::from("challenge region lies outside the screenshot"),
        });
    }

    let crop = screen.crop_imm(x, y, width, height);
    let mut encoded = std::io::Cursor::new(Vec::new());
    crop.write_to(&mut encoded, image::ImageFormat::Png)
        .map_err(|err| CaptchaError::Flow {
            message: format!("crop encode failed: {err}"),
        })?;
    Ok(encoded.into_inner())
}

/// Detects and resolves a challenge on one automation session.
#[derive(Debug)]
pub struct CaptchaCoordinator<'s, S, C> {
    session: &'s S,
    solver: C,
    store: &'s ChallengeStore,
    challenge_image: Locator,
    settle: Duration,
    log: RunLog,
}

impl<'s, S, C> CaptchaCoordinator<'s, S, C>
where
    S: AutomationSession,
    C: CaptchaSolver,
{
    /// Creates a coordinator for `session`.
    #[must_use]
    pub fn new(
        session: &'s S,
        solver: C,
        store: &'s ChallengeStore,
        challenge_image: Locator,
        log: RunLog,
    ) -> Self {
        Self {
            session,
            solver,
            store,
            challenge_image,
            settle: DEFAULT_CHALLENGE_SETTLE,
            log,
        }
    }

    /// Overrides the settle delay before the region is measured.
    #[must_use]
    pub const fn with_settle(mut self, value: Duration) -> Self {
        self.settle = value;
        self
    }

    /// Whether the challenge screen is currently shown.
    ///
    /// # Errors
    ///
    /// Returns [`CaptchaError::Flow`] when the endpoint fails.
    pub async fn detect(&self) -> Result<bool, CaptchaError> {
        Ok(self.session.exists(&self.challenge_image).await?)
    }

    /// Captures, crops, stores, and solves the challenge image.
    ///
    /// # Errors
    ///
    /// Returns [`CaptchaError::Flow`] on any capture/crop/store failure
    /// and [`CaptchaError::Solver`] when the solver fails.
    pub async fn resolve(&self) -> Result<String, CaptchaError> {
        self.log.push("Wait for captcha element loading");
        self.session.settle(self.settle).await?;

        let screenshot = self.session.screenshot().await?;
        let screenshot_path = self.store.save_screenshot(&screenshot)?;
        self.log
            .push(format!("Saved the screenshot by path: {screenshot_path}"));

        let region = self.session.region_of(&self.challenge_image).await?;
        self.log
            .push(format!("Captcha location: {} {}", region.x, region.y));
        self.log
            .push(format!("Captcha size: {} {}", region.width, region.height));

        let crop = crop_challenge(&screenshot, region)?;
        let crop_path = self.store.save_crop(&crop)?;
        self.log
            .push(format!("Saved the captcha fragment by path: {crop_path}"));

        let encoded = BASE64.encode(&crop);
        let solution = self
            .solver
            .solve(&encoded)
            .await
            .map_err(|err| CaptchaError::Solver {
                message: err.to_string(),
            })?;
        self.log
            .push(format!("Solver returned the solution: {solution}"));
        Ok(solution)
    }
}

#[cfg(test)]
mod tests;
