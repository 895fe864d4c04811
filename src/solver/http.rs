//! HTTP API transport for the solving service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::error::{CapdriverError, Result};
use crate::solver::transport::SolverTransport;
use crate::solver::types::{validate_image, AccountStatus, CaptchaJob, CaptchaTask, Credential};
use crate::solver::CLIENT_VERSION;

pub const DEFAULT_BASE_URL: &str = "http://api.dbcapi.me/api";

/// Request/response HTTP client for the solving service.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: String,
    client: Client,
    credential: Credential,
}

impl HttpTransport {
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

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Authentication fields, sent with every mutating request.
    fn auth_form(&self) -> Form {
        self.credential
            .fields()
            .into_iter()
            .fold(Form::new(), |form, (name, value)| form.text(name, value))
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        if let Some(err) = map_status(response.status()) {
            return Err(err);
        }
        Ok(response)
    }

    async fn parse_job(response: reqwest::Response) -> Result<CaptchaJob> {
        let response = Self::check(response).await?;
        response
            .json::<CaptchaJob>()
            .await
            .map_err(|_| CapdriverError::Protocol("invalid API response".into()))
    }
}

/// The service signals error classes through HTTP status codes.
fn map_status(status: StatusCode) -> Option<CapdriverError> {
    match status {
        StatusCode::FORBIDDEN => Some(CapdriverError::AccessDenied(
            "check your credentials and/or balance".into(),
        )),
        StatusCode::BAD_REQUEST | StatusCode::PAYLOAD_TOO_LARGE => Some(
            CapdriverError::InvalidInput("the service rejected the image".into()),
        ),
        StatusCode::SERVICE_UNAVAILABLE => Some(CapdriverError::ServiceOverloaded),
        status if !status.is_success() => Some(CapdriverError::Protocol(format!(
            "unexpected API status {status}"
        ))),
        _ => None,
    }
}

#[async_trait]
impl SolverTransport for HttpTransport {
    async fn account_status(&self) -> Result<AccountStatus> {
        let response = self
            .client
            .post(self.url("user"))
            .multipart(self.auth_form())
            .send()
            .await?;
        let response = Self::check(response).await?;
        response
            .json::<AccountStatus>()
            .await
            .map_err(|_| CapdriverError::Protocol("invalid API response".into()))
    }

    async fn job_status(&self, id: u64) -> Result<CaptchaJob> {
        let response = self
            .client
            .get(self.url(&format!("captcha/{id}")))
            .send()
            .await?;
        Self::parse_job(response).await
    }

    async fn submit(&self, task: &CaptchaTask) -> Result<CaptchaJob> {
        let mut form = self.auth_form().text("type", task.type_code().to_string());

        if let Some(image) = task.image() {
            validate_image(image)?;
            form = form.part(
                "captchafile",
                Part::bytes(image.to_vec()).file_name("captcha"),
            );
        }
        if let CaptchaTask::Coordinates { hint: Some(hint), .. } = task {
            form = form.text("banner_text", hint.clone());
        }
        if let Some((field, params)) = task.token_params() {
            form = form.text(field, params.to_string());
        }

        debug!(kind = task.type_code(), "uploading CAPTCHA");
        let response = self
            .client
            .post(self.url("captcha"))
            .multipart(form)
            .send()
            .await?;
        Self::parse_job(response).await
    }

    async fn report_incorrect(&self, id: u64) -> Result<bool> {
        debug!(job = id, "reporting CAPTCHA as incorrectly solved");
        let response = self
            .client
            .post(self.url(&format!("captcha/{id}/report")))
            .multipart(self.auth_form())
            .send()
            .await?;
        let job = Self::parse_job(response).await?;
        Ok(job.is_correct != Some(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_error_kinds() {
        assert!(matches!(
            map_status(StatusCode::FORBIDDEN),
            Some(CapdriverError::AccessDenied(_))
        ));
        assert!(matches!(
            map_status(StatusCode::BAD_REQUEST),
            Some(CapdriverError::InvalidInput(_))
        ));
        assert!(matches!(
            map_status(StatusCode::PAYLOAD_TOO_LARGE),
            Some(CapdriverError::InvalidInput(_))
        ));
        assert!(matches!(
            map_status(StatusCode::SERVICE_UNAVAILABLE),
            Some(CapdriverError::ServiceOverloaded)
        ));
        assert!(matches!(
            map_status(StatusCode::INTERNAL_SERVER_ERROR),
            Some(CapdriverError::Protocol(_))
        ));
        assert!(map_status(StatusCode::OK).is_none());
    }

    #[test]
    fn base_url_is_normalized() {
        let credential = Credential::AuthToken("token".into());
        let transport = HttpTransport::with_base_url("http://example.com/api/", credential).unwrap();
        assert_eq!(transport.url("user"), "http://example.com/api/user");
    }
}
