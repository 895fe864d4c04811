//! 2Captcha-style JSON API transport.
//!
//! The service exposes a submit endpoint (`in.php`) and a polling endpoint
//! (`res.php`); both answer `{"status": 0|1, "request": "..."}`. Solved
//! answers come through `request`, and so do error codes.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::{CapdriverError, Result};
use crate::solver::transport::SolverTransport;
use crate::solver::types::{validate_image, AccountStatus, CaptchaJob, CaptchaTask, Credential};
use crate::solver::CLIENT_VERSION;

pub const DEFAULT_BASE_URL: &str = "http://2captcha.com";

const NOT_READY: &str = "CAPCHA_NOT_READY";

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: i32,
    request: String,
}

/// JSON API client for a 2Captcha-style service.
#[derive(Debug, Clone)]
pub struct TwoCaptchaTransport {
    base_url: String,
    client: Client,
    credential: Credential,
}

impl TwoCaptchaTransport {
    pub fn new(credential: Credential) -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL, credential)
    }

    pub fn with_base_url(base_url: &str, credential: Credential) -> Result<Self> {
        let client = Client::builder()
            .user_agent(CLIENT_VERSION)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            credential,
        })
    }

    fn auth_fields(&self) -> Vec<(&'static str, String)> {
        self.credential.fields()
    }

    async fn poll_endpoint(&self, mut query: Vec<(&'static str, String)>) -> Result<ApiResponse> {
        query.extend(self.auth_fields());
        query.push(("json", "1".into()));
        let response = self
            .client
            .get(format!("{}/res.php", self.base_url))
            .query(&query)
            .send()
            .await?;
        response
            .json::<ApiResponse>()
            .await
            .map_err(|_| CapdriverError::Protocol("invalid API response".into()))
    }

    /// Check an API response, mapping error codes to typed errors.
    fn accept(response: ApiResponse) -> Result<String> {
        if response.status == 1 || response.request == NOT_READY {
            return Ok(response.request);
        }
        Err(map_error_code(&response.request))
    }
}

fn map_error_code(code: &str) -> CapdriverError {
    match code {
        "ERROR_WRONG_USER_KEY" | "ERROR_KEY_DOES_NOT_EXIST" => {
            CapdriverError::AccessDenied("check your API key".into())
        }
        "ERROR_ZERO_BALANCE" => CapdriverError::AccessDenied("balance is too low".into()),
        "ERROR_IP_NOT_ALLOWED" | "IP_BANNED" => {
            CapdriverError::AccessDenied("account or address is blocked".into())
        }
        "ERROR_NO_SLOT_AVAILABLE" => CapdriverError::ServiceOverloaded,
        "ERROR_ZERO_CAPTCHA_FILESIZE"
        | "ERROR_TOO_BIG_CAPTCHA_FILESIZE"
        | "ERROR_WRONG_FILE_EXTENSION"
        | "ERROR_IMAGE_TYPE_NOT_SUPPORTED" => {
            CapdriverError::InvalidInput("the service rejected the image".into())
        }
        other => CapdriverError::Protocol(format!("API error: {other}")),
    }
}

#[async_trait]
impl SolverTransport for TwoCaptchaTransport {
    async fn account_status(&self) -> Result<AccountStatus> {
        let response = self
            .poll_endpoint(vec![("action", "getbalance".into())])
            .await?;
        let request = Self::accept(response)?;
        let balance = request
            .parse::<f64>()
            .map_err(|_| CapdriverError::Protocol("invalid balance in API response".into()))?;
        // The service exposes no numeric account id or rate; auth failures
        // surface as AccessDenied instead of a zero id.
        Ok(AccountStatus {
            user_id: 0,
            rate: 0.0,
            balance,
            is_banned: false,
        })
    }

    async fn job_status(&self, id: u64) -> Result<CaptchaJob> {
        let response = self
            .poll_endpoint(vec![("action", "get".into()), ("id", id.to_string())])
            .await?;
        let request = Self::accept(response)?;
        if request == NOT_READY {
            return Ok(CaptchaJob {
                id,
                text: None,
                is_correct: None,
            });
        }
        Ok(CaptchaJob {
            id,
            text: Some(request),
            is_correct: Some(true),
        })
    }

    async fn submit(&self, task: &CaptchaTask) -> Result<CaptchaJob> {
        let mut fields: Vec<(&'static str, String)> = self.auth_fields();
        fields.push(("json", "1".into()));

        match task {
            CaptchaTask::Image(image) => {
                validate_image(image)?;
                fields.push(("method", "base64".into()));
                fields.push(("body", BASE64.encode(image)));
            }
            CaptchaTask::Coordinates { image, hint } => {
                validate_image(image)?;
                fields.push(("method", "base64".into()));
                fields.push(("coordinatescaptcha", "1".into()));
                fields.push(("body", BASE64.encode(image)));
                if let Some(hint) = hint {
                    fields.push(("textinstructions", hint.clone()));
                }
            }
            CaptchaTask::RecaptchaToken {
                site_key,
                page_url,
                action,
                min_score,
                proxy,
            } => {
                fields.push(("method", "userrecaptcha".into()));
                fields.push(("googlekey", site_key.clone()));
                fields.push(("pageurl", page_url.clone()));
                if let Some(action) = action {
                    fields.push(("action", action.clone()));
                }
                if let Some(score) = min_score {
                    fields.push(("min_score", score.to_string()));
                }
                if let Some(proxy) = proxy {
                    fields.push(("proxy", proxy.url.clone()));
                    fields.push(("proxytype", proxy.kind.clone()));
                }
            }
            CaptchaTask::FunCaptchaToken {
                public_key,
                page_url,
                proxy,
            } => {
                fields.push(("method", "funcaptcha".into()));
                fields.push(("publickey", public_key.clone()));
                fields.push(("pageurl", page_url.clone()));
                if let Some(proxy) = proxy {
                    fields.push(("proxy", proxy.url.clone()));
                    fields.push(("proxytype", proxy.kind.clone()));
                }
            }
        }

        debug!(kind = task.type_code(), "uploading CAPTCHA");
        let response = self
            .client
            .post(format!("{}/in.php", self.base_url))
            .form(&fields)
            .send()
            .await?;
        let response = response
            .json::<ApiResponse>()
            .await
            .map_err(|_| CapdriverError::Protocol("invalid API response".into()))?;
        let request = Self::accept(response)?;
        let id = request
            .parse::<u64>()
            .map_err(|_| CapdriverError::Protocol("invalid job id in API response".into()))?;
        Ok(CaptchaJob {
            id,
            text: None,
            is_correct: None,
        })
    }

    async fn report_incorrect(&self, id: u64) -> Result<bool> {
        debug!(job = id, "reporting CAPTCHA as incorrectly solved");
        let response = self
            .poll_endpoint(vec![("action", "reportbad".into()), ("id", id.to_string())])
            .await?;
        Ok(Self::accept(response).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_map_to_error_kinds() {
        assert!(matches!(
            map_error_code("ERROR_WRONG_USER_KEY"),
            CapdriverError::AccessDenied(_)
        ));
        assert!(matches!(
            map_error_code("ERROR_ZERO_BALANCE"),
            CapdriverError::AccessDenied(_)
        ));
        assert!(matches!(
            map_error_code("ERROR_NO_SLOT_AVAILABLE"),
            CapdriverError::ServiceOverloaded
        ));
        assert!(matches!(
            map_error_code("ERROR_TOO_BIG_CAPTCHA_FILESIZE"),
            CapdriverError::InvalidInput(_)
        ));
        assert!(matches!(
            map_error_code("ERROR_UNKNOWABLE"),
            CapdriverError::Protocol(_)
        ));
    }

    #[test]
    fn pending_jobs_are_unsolved() {
        let response = ApiResponse {
            status: 0,
            request: NOT_READY.into(),
        };
        assert_eq!(TwoCaptchaTransport::accept(response).unwrap(), NOT_READY);
    }
}
