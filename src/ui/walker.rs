//! Iterative challenge walk over the live UI.
//!
//! Every iteration re-probes the screen, classifies it as one of five
//! mutually-exclusive states, and acts on it. The bounds on the walk are
//! structural: a transitions budget caps the loop itself, and two semantic
//! counters cap image rounds and error-dialog dismissals.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::driver::{UiDriver, UiElement};
use super::locators::VariantSpec;
use crate::error::{CapdriverError, Result};
use crate::resolver::{CoordinateResolver, ResolveOptions, ResolvedTaps};

/// Which of the challenge pages is on screen right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeState {
    /// The image grid is up and waiting for clicks.
    ImageChallenge,
    /// The service rejected the last answer and offers a retry.
    WrongResult,
    /// The initial verify page; carries the control's current text.
    StartVerify(String),
    /// Rate-limit or cannot-contact dialog.
    ErrorDialog,
    /// Transient checking/loading page.
    Loading,
    /// None of the known pages matched.
    Unmatched,
}

/// Retry bounds for one walk; reset at every [`ChallengeWalker::run`] entry.
#[derive(Debug, Clone)]
pub struct WalkLimits {
    /// Oracle retries per screenshot.
    pub resolve_retries: u32,
    /// Total image rounds before the walk gives up.
    pub all_resolve_retries: u32,
    /// Error-dialog dismissals before the walk gives up.
    pub error_retries: u32,
    /// Hard cap on loop iterations, covering every state.
    pub max_transitions: u32,
}

impl Default for WalkLimits {
    fn default() -> Self {
        Self {
            resolve_retries: 3,
            all_resolve_retries: 15,
            error_retries: 3,
            max_transitions: 40,
        }
    }
}

enum RoundOutcome {
    /// Coordinates were tapped.
    Tapped,
    /// The oracle answered "nothing to click".
    NothingToTap,
    /// The oracle gave up on this image set.
    Unsolved,
    /// A failure that ends the whole walk.
    Abandon,
}

/// Drives one CAPTCHA challenge to a terminal state.
pub struct ChallengeWalker<'a, D: UiDriver> {
    driver: &'a D,
    resolver: &'a CoordinateResolver,
    spec: VariantSpec,
    limits: WalkLimits,
    resolve_opts: ResolveOptions,
}

impl<'a, D: UiDriver> ChallengeWalker<'a, D> {
    pub fn new(driver: &'a D, resolver: &'a CoordinateResolver, spec: VariantSpec) -> Self {
        let resolve_opts = ResolveOptions {
            initial_factor: spec.initial_reduction,
            report_blank: spec.report_blank,
            ..ResolveOptions::default()
        };
        Self {
            driver,
            resolver,
            spec,
            limits: WalkLimits::default(),
            resolve_opts,
        }
    }

    pub fn with_limits(mut self, limits: WalkLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_resolve_options(mut self, opts: ResolveOptions) -> Self {
        self.resolve_opts = opts;
        self
    }

    /// Walk the challenge until it succeeds, fails, or a retry budget runs
    /// out (`TooManyRetries`, which callers must treat as fatal for this
    /// challenge instance).
    pub async fn run(&self) -> Result<bool> {
        info!(variant = self.spec.name, "starting challenge walk");

        let mut rounds_left = self.limits.all_resolve_retries;
        let mut errors_left = self.limits.error_retries;
        let mut transitions = 0;
        let mut engage = true;

        loop {
            if transitions >= self.limits.max_transitions {
                warn!(variant = self.spec.name, transitions, "walk budget exhausted");
                return Err(CapdriverError::TooManyRetries {
                    what: "state transitions",
                    attempts: self.limits.max_transitions,
                });
            }
            transitions += 1;

            if engage {
                self.click_start().await?;
                engage = false;
            }

            let state = self.classify().await?;
            debug!(variant = self.spec.name, ?state, transitions, "classified page");

            match state {
                ChallengeState::ImageChallenge => {
                    if rounds_left == 0 {
                        warn!(variant = self.spec.name, "image rounds exhausted");
                        return Err(CapdriverError::TooManyRetries {
                            what: "image-challenge rounds",
                            attempts: self.limits.all_resolve_retries,
                        });
                    }
                    rounds_left -= 1;

                    match self.resolve_round().await? {
                        RoundOutcome::Tapped => {
                            if let Some(submit) = &self.spec.submit_control {
                                self.driver.click(submit).await?;
                            }
                        }
                        RoundOutcome::NothingToTap => {
                            debug!("no matching images, skipping this round");
                            if let Some(submit) = &self.spec.submit_control {
                                self.driver.click(submit).await?;
                            }
                            if let Some(tip) = &self.spec.more_images_tip {
                                if let Some(element) = self.driver.find(tip).await? {
                                    if element.text.to_lowercase().contains("select all matching") {
                                        debug!("another round of images requested");
                                    }
                                }
                            }
                        }
                        RoundOutcome::Unsolved => {
                            debug!("could not resolve this image set, reloading");
                            self.driver.click(&self.spec.reload_control).await?;
                        }
                        RoundOutcome::Abandon => return Ok(false),
                    }
                }

                ChallengeState::WrongResult => {
                    debug!("wrong result, trying again");
                    if let Some(try_again) = &self.spec.try_again_control {
                        self.driver.click(try_again).await?;
                    }
                    engage = true;
                }

                ChallengeState::StartVerify(text) => {
                    let text = text.to_lowercase();
                    if text.contains("verified") {
                        if let Some(cont) = &self.spec.continue_control {
                            info!(variant = self.spec.name, "challenge verified");
                            self.driver.click(cont).await?;
                            return Ok(true);
                        }
                    }
                    // Untouched checkbox or an expired verification; either
                    // way the challenge starts over.
                    debug!("on the start page, engaging");
                    engage = true;
                }

                ChallengeState::ErrorDialog => {
                    if errors_left == 0 {
                        warn!(variant = self.spec.name, "error dialogs exhausted");
                        return Err(CapdriverError::TooManyRetries {
                            what: "error dialogs",
                            attempts: self.limits.error_retries,
                        });
                    }
                    errors_left -= 1;
                    debug!("dismissing error dialog");
                    if let Some((_, dismiss)) = &self.spec.error_dialog {
                        self.driver.click(dismiss).await?;
                    }
                    engage = true;
                }

                ChallengeState::Loading => {
                    debug!("challenge still checking, waiting");
                    sleep(Duration::from_secs(1)).await;
                    engage = true;
                }

                ChallengeState::Unmatched => {
                    info!(
                        variant = self.spec.name,
                        success = self.spec.success_on_fallthrough,
                        "challenge walk finished"
                    );
                    return Ok(self.spec.success_on_fallthrough);
                }
            }
        }
    }

    /// Probe the live UI for the current page. States are checked in a fixed
    /// order; the first probe that matches wins.
    async fn classify(&self) -> Result<ChallengeState> {
        if self.driver.find(&self.spec.challenge_probe).await?.is_some() {
            return Ok(ChallengeState::ImageChallenge);
        }
        if let Some(try_again) = &self.spec.try_again_control {
            if self.driver.find(try_again).await?.is_some() {
                return Ok(ChallengeState::WrongResult);
            }
        }
        for control in &self.spec.start_controls {
            if let Some(element) = self.driver.find(control).await? {
                return Ok(ChallengeState::StartVerify(element.text));
            }
        }
        if let Some((probe, _)) = &self.spec.error_dialog {
            if self.driver.find(probe).await?.is_some() {
                return Ok(ChallengeState::ErrorDialog);
            }
        }
        if let Some(probe) = &self.spec.loading_probe {
            if self.driver.find(probe).await?.is_some() {
                return Ok(ChallengeState::Loading);
            }
        }
        Ok(ChallengeState::Unmatched)
    }

    async fn click_start(&self) -> Result<()> {
        for control in &self.spec.start_controls {
            if self.driver.click(control).await? {
                return Ok(());
            }
        }
        warn!(variant = self.spec.name, "no start control on screen");
        Ok(())
    }

    /// One image round: screenshot, resolve, tap. Failures below the fatal
    /// kinds end the walk with a failure result rather than an error.
    async fn resolve_round(&self) -> Result<RoundOutcome> {
        match self.try_resolve_round().await {
            Ok(outcome) => Ok(outcome),
            Err(err @ CapdriverError::AccessDenied(_)) => Err(err),
            Err(err @ CapdriverError::TooManyRetries { .. }) => Err(err),
            Err(err) => {
                warn!(variant = self.spec.name, "abandoning challenge: {err}");
                Ok(RoundOutcome::Abandon)
            }
        }
    }

    async fn try_resolve_round(&self) -> Result<RoundOutcome> {
        let anchor: UiElement = self
            .driver
            .find(&self.spec.challenge_image)
            .await?
            .ok_or_else(|| CapdriverError::Driver("challenge image vanished".into()))?;
        let screenshot = self.driver.screenshot(&self.spec.challenge_image).await?;

        let resolved = self
            .resolver
            .resolve_with_retry(&screenshot, &self.resolve_opts, self.limits.resolve_retries)
            .await?;
        let Some(ResolvedTaps { points, factor }) = resolved else {
            return Ok(RoundOutcome::Unsolved);
        };
        if points.is_empty() {
            return Ok(RoundOutcome::NothingToTap);
        }

        info!(count = points.len(), factor, "tapping resolved coordinates");
        for point in &points {
            self.driver.tap(anchor.x + point.x, anchor.y + point.y).await?;
            if !self.spec.tap_interval.is_zero() {
                sleep(self.spec.tap_interval).await;
            }
        }
        Ok(RoundOutcome::Tapped)
    }
}
