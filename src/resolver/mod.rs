//! Coordinate-resolution facade over a solving client.

pub mod coordinates;
pub mod image;

use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::Provider;
use crate::error::{CapdriverError, Result};
use crate::solver::client::SolverClient;
use crate::solver::types::CaptchaTask;

pub use coordinates::TapPoint;
pub use image::ShrunkImage;

/// Screenshot upload budget the DeathByCaptcha-style APIs enforce.
pub const DBC_IMAGE_BUDGET: usize = 180 * 1024;
/// The 2Captcha-style API is stricter.
pub const TWOCAPTCHA_IMAGE_BUDGET: usize = 100 * 1024;

/// The provider's own upload limit, used when the config does not override it.
pub fn budget_for(provider: Provider) -> usize {
    match provider {
        Provider::Twocaptcha => TWOCAPTCHA_IMAGE_BUDGET,
        Provider::DbcHttp | Provider::DbcSocket => DBC_IMAGE_BUDGET,
    }
}

/// Knobs for one resolve call.
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    pub byte_budget: usize,
    pub initial_factor: f64,
    pub reduce_step: f64,
    /// Decode deadline; `None` uses the task-kind default.
    pub timeout: Option<Duration>,
    /// Report an explicitly blank coordinate list as incorrect. Challenges
    /// with no skip control want this.
    pub report_blank: bool,
    pub hint: Option<String>,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            byte_budget: DBC_IMAGE_BUDGET,
            initial_factor: 1.0,
            reduce_step: 0.125,
            timeout: None,
            report_blank: false,
            hint: None,
        }
    }
}

/// Tap positions resolved back into original-image pixel space.
#[derive(Debug, Clone)]
pub struct ResolvedTaps {
    pub points: Vec<TapPoint>,
    /// Reduction factor that was applied before upload.
    pub factor: f64,
}

/// Turns challenge screenshots into tap positions via the solving service.
pub struct CoordinateResolver {
    client: SolverClient,
}

impl CoordinateResolver {
    pub fn new(client: SolverClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &SolverClient {
        &self.client
    }

    /// Account balance in US cents. Propagates `AccessDenied`.
    pub async fn balance(&self) -> Result<f64> {
        self.client.balance().await
    }

    /// Resolve one screenshot into tap positions.
    ///
    /// `Ok(None)` means the service gave up or answered unusably; where that
    /// was an unusable answer the job has already been reported incorrect.
    pub async fn resolve(
        &self,
        image: &[u8],
        opts: &ResolveOptions,
    ) -> Result<Option<ResolvedTaps>> {
        let ShrunkImage { png, factor } = image::shrink_to_budget(
            image,
            opts.byte_budget,
            opts.initial_factor,
            opts.reduce_step,
        )?;
        debug!(factor, bytes = png.len(), "normalized challenge image");

        let task = CaptchaTask::Coordinates {
            image: png,
            hint: opts.hint.clone(),
        };
        let Some(job) = self.client.decode(&task, opts.timeout).await? else {
            return Ok(None);
        };
        let text = job.text.as_deref().unwrap_or_default();
        info!(job = job.id, answer = text, "CAPTCHA solved");

        let Some(pairs) = coordinates::parse_coordinates(text) else {
            self.report_best_effort(job.id, "no coordinates in answer").await;
            return Ok(None);
        };
        if pairs.is_empty() {
            if opts.report_blank {
                self.report_best_effort(job.id, "blank coordinate list").await;
                return Ok(None);
            }
            return Ok(Some(ResolvedTaps {
                points: Vec::new(),
                factor,
            }));
        }

        Ok(Some(ResolvedTaps {
            points: coordinates::rescale(&pairs, factor),
            factor,
        }))
    }

    /// Retry wrapper around [`CoordinateResolver::resolve`].
    ///
    /// Failures and absent results consume one of `retries`; an
    /// `AccessDenied` triggers a balance check and aborts outright when the
    /// balance is negative; `ServiceOverloaded` and protocol errors
    /// propagate immediately without consuming a retry.
    pub async fn resolve_with_retry(
        &self,
        image: &[u8],
        opts: &ResolveOptions,
        retries: u32,
    ) -> Result<Option<ResolvedTaps>> {
        let mut attempts = 0;
        loop {
            match self.resolve(image, opts).await {
                Ok(Some(taps)) => return Ok(Some(taps)),
                Ok(None) => {}
                Err(CapdriverError::AccessDenied(reason)) => {
                    error!("access denied while resolving: {reason}");
                    let balance = self.balance().await?;
                    if balance < 0.0 {
                        error!(balance, "balance is below zero, abandoning");
                        return Err(CapdriverError::AccessDenied(format!(
                            "balance is negative ({balance} cents)"
                        )));
                    }
                }
                Err(err @ (CapdriverError::ServiceOverloaded | CapdriverError::Protocol(_))) => {
                    return Err(err);
                }
                Err(err) => {
                    warn!("resolve attempt failed: {err}");
                    let pause = rand::thread_rng().gen_range(1..=3);
                    sleep(Duration::from_secs(pause)).await;
                }
            }

            attempts += 1;
            if attempts > retries {
                debug!(attempts, "resolve retries exhausted");
                return Ok(None);
            }
            warn!(attempt = attempts, "failed to resolve CAPTCHA, retrying");
        }
    }

    /// Best-effort incorrect report; failures are logged and swallowed.
    async fn report_best_effort(&self, id: u64, reason: &str) {
        debug!(job = id, reason, "reporting incorrectly solved CAPTCHA");
        if let Err(err) = self.client.report_incorrect(id).await {
            warn!(job = id, "failed to report CAPTCHA: {err}");
        }
    }
}
