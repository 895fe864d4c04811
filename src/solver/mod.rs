//! Solving-service clients: transports, wire types, and the decode loop.

pub mod client;
pub mod http;
pub mod poll;
pub mod socket;
pub mod transport;
pub mod twocaptcha;
pub mod types;

use std::sync::Arc;

use crate::config::{Config, Provider};
use crate::error::Result;

pub use client::SolverClient;
pub use poll::PollSchedule;
pub use transport::SolverTransport;
pub use types::{AccountStatus, CaptchaJob, CaptchaTask, Credential, ProxySpec};

/// Client identification sent with every API request.
pub const CLIENT_VERSION: &str = concat!("capdriver/", env!("CARGO_PKG_VERSION"));

/// Build the transport variant named by the configuration.
pub fn transport_from_config(config: &Config) -> Result<Arc<dyn SolverTransport>> {
    let credential = config.credential()?;
    let endpoint = config.service.endpoint.as_deref();

    Ok(match config.service.provider {
        Provider::DbcHttp => Arc::new(http::HttpTransport::with_base_url(
            endpoint.unwrap_or(http::DEFAULT_BASE_URL),
            credential,
        )?),
        Provider::DbcSocket => Arc::new(socket::SocketTransport::with_host(
            endpoint.unwrap_or(socket::DEFAULT_HOST),
            credential,
        )),
        Provider::Twocaptcha => Arc::new(twocaptcha::TwoCaptchaTransport::with_base_url(
            endpoint.unwrap_or(twocaptcha::DEFAULT_BASE_URL),
            credential,
        )?),
    })
}
