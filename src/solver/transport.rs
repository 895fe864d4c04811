//! Contract shared by the solving-service transports.

use async_trait::async_trait;

use crate::error::Result;
use crate::solver::types::{AccountStatus, CaptchaJob, CaptchaTask};

/// Abstraction over the solving-service backends, eliminating if/else
/// branching in the resolver and walker layers.
///
/// Three implementations:
/// - `HttpTransport`: request/response HTTP API
/// - `SocketTransport`: persistent line-delimited JSON connection
/// - `TwoCaptchaTransport`: 2Captcha-style JSON API
#[async_trait]
pub trait SolverTransport: Send + Sync {
    /// Fetch account details. `user_id` is 0 when authentication failed;
    /// invalid credentials, suspension and empty balances surface as
    /// `AccessDenied`.
    async fn account_status(&self) -> Result<AccountStatus>;

    /// Fetch a job snapshot. An unknown id yields an empty job (`id == 0`).
    async fn job_status(&self, id: u64) -> Result<CaptchaJob>;

    /// Upload a task. The returned job is not solved yet; poll `job_status`
    /// until `text` appears.
    async fn submit(&self, task: &CaptchaTask) -> Result<CaptchaJob>;

    /// Flag a previously solved job as incorrect, for billing and service
    /// quality. Returns whether the service accepted the report.
    async fn report_incorrect(&self, id: u64) -> Result<bool>;
}
