//! Wire types shared by the solving-service transports.

use image::ImageFormat;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};

use crate::error::{CapdriverError, Result};

/// Account credentials for a solving service.
///
/// Exactly one form is active for the lifetime of a client.
#[derive(Debug, Clone)]
pub enum Credential {
    UserPass { username: String, password: String },
    AuthToken(String),
    ApiKey(String),
}

impl Credential {
    /// The form/JSON fields this credential contributes to a request.
    pub(crate) fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            Credential::UserPass { username, password } => vec![
                ("username", username.clone()),
                ("password", password.clone()),
            ],
            Credential::AuthToken(token) => vec![("authtoken", token.clone())],
            Credential::ApiKey(key) => vec![("key", key.clone())],
        }
    }
}

/// Account details as reported by the service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountStatus {
    /// Numeric account id; 0 when authentication failed.
    #[serde(rename = "user", default)]
    pub user_id: u64,

    /// Price of one solved CAPTCHA, in US cents.
    #[serde(default)]
    pub rate: f64,

    /// Balance in US cents.
    #[serde(default)]
    pub balance: f64,

    #[serde(default, deserialize_with = "de_loose_bool")]
    pub is_banned: bool,
}

/// One submitted CAPTCHA, awaiting or holding a solution.
///
/// Created on upload and only ever updated by re-fetching from the service;
/// `text` moves from `None` to its final value exactly once.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CaptchaJob {
    /// Service-assigned id; 0 means no such job / failed upload.
    #[serde(rename = "captcha", default)]
    pub id: u64,

    /// Solved text: literal characters, or an encoded coordinate list
    /// depending on the task kind.
    #[serde(default, deserialize_with = "de_text")]
    pub text: Option<String>,

    #[serde(default, deserialize_with = "de_opt_bool")]
    pub is_correct: Option<bool>,
}

impl CaptchaJob {
    pub fn is_empty(&self) -> bool {
        self.id == 0
    }

    pub fn is_solved(&self) -> bool {
        self.text.is_some()
    }

    pub fn is_solved_correctly(&self) -> bool {
        self.is_solved() && self.is_correct == Some(true)
    }
}

/// Proxy the solving service should route a token task through.
#[derive(Debug, Clone)]
pub struct ProxySpec {
    /// Full proxy URL, credentials included.
    pub url: String,
    /// Proxy scheme as the vendor spells it, e.g. "HTTP".
    pub kind: String,
}

/// A CAPTCHA to solve, one variant per challenge kind.
///
/// Each variant carries only the fields its kind requires; the transports
/// turn these into the vendor's numeric `type` code plus per-kind fields.
#[derive(Debug, Clone)]
pub enum CaptchaTask {
    /// Classic image CAPTCHA answered with literal text.
    Image(Vec<u8>),

    /// Screenshot challenge answered with a list of positions to click.
    Coordinates {
        image: Vec<u8>,
        hint: Option<String>,
    },

    /// reCAPTCHA solved out-of-band; the answer is a response token.
    RecaptchaToken {
        site_key: String,
        page_url: String,
        action: Option<String>,
        min_score: Option<f32>,
        proxy: Option<ProxySpec>,
    },

    /// FunCaptcha solved out-of-band; the answer is a session token.
    FunCaptchaToken {
        public_key: String,
        page_url: String,
        proxy: Option<ProxySpec>,
    },
}

impl CaptchaTask {
    /// The vendor's numeric type code for this task kind.
    pub fn type_code(&self) -> u8 {
        match self {
            CaptchaTask::Image(_) => 0,
            CaptchaTask::Coordinates { .. } => 2,
            CaptchaTask::RecaptchaToken { .. } => 5,
            CaptchaTask::FunCaptchaToken { .. } => 6,
        }
    }

    pub fn image(&self) -> Option<&[u8]> {
        match self {
            CaptchaTask::Image(image) | CaptchaTask::Coordinates { image, .. } => {
                Some(image.as_slice())
            }
            _ => None,
        }
    }

    pub fn carries_image(&self) -> bool {
        self.image().is_some()
    }

    /// The vendor field name and JSON payload for token task kinds.
    pub fn token_params(&self) -> Option<(&'static str, Value)> {
        match self {
            CaptchaTask::RecaptchaToken {
                site_key,
                page_url,
                action,
                min_score,
                proxy,
            } => {
                let mut params = json!({
                    "googlekey": site_key,
                    "pageurl": page_url,
                });
                if let Some(action) = action {
                    params["action"] = json!(action);
                }
                if let Some(score) = min_score {
                    params["min_score"] = json!(score.to_string());
                }
                apply_proxy(&mut params, proxy);
                Some(("token_params", params))
            }
            CaptchaTask::FunCaptchaToken {
                public_key,
                page_url,
                proxy,
            } => {
                let mut params = json!({
                    "publickey": public_key,
                    "pageurl": page_url,
                });
                apply_proxy(&mut params, proxy);
                Some(("funcaptcha_params", params))
            }
            _ => None,
        }
    }
}

fn apply_proxy(params: &mut Value, proxy: &Option<ProxySpec>) {
    if let Some(proxy) = proxy {
        params["proxy"] = json!(proxy.url);
        params["proxytype"] = json!(proxy.kind);
    }
}

/// Reject empty or unrecognized CAPTCHA images before upload.
pub(crate) fn validate_image(bytes: &[u8]) -> Result<()> {
    if bytes.is_empty() {
        return Err(CapdriverError::InvalidInput("CAPTCHA image is empty".into()));
    }
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::Gif | ImageFormat::Bmp) => Ok(()),
        _ => Err(CapdriverError::InvalidInput(
            "unknown CAPTCHA image format".into(),
        )),
    }
}

/// The services are inconsistent about booleans: `0`/`1` and `true`/`false`
/// both appear on the wire.
fn de_opt_bool<'de, D>(deserializer: D) -> std::result::Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Bool(b)) => Some(b),
        Some(Value::Number(n)) => Some(n.as_f64().unwrap_or(0.0) != 0.0),
        _ => None,
    })
}

fn de_loose_bool<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    de_opt_bool(deserializer).map(|b| b.unwrap_or(false))
}

/// An unsolved job comes back with `text` as `null` or `""`; both mean
/// "not solved yet".
fn de_text<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_deserializes_vendor_booleans() {
        let job: CaptchaJob =
            serde_json::from_str(r#"{"captcha": 42, "text": "[[10,20]]", "is_correct": 1}"#)
                .unwrap();
        assert_eq!(job.id, 42);
        assert!(job.is_solved_correctly());

        let job: CaptchaJob =
            serde_json::from_str(r#"{"captcha": 42, "text": "abc", "is_correct": false}"#).unwrap();
        assert!(job.is_solved());
        assert!(!job.is_solved_correctly());
    }

    #[test]
    fn empty_text_means_unsolved() {
        let job: CaptchaJob =
            serde_json::from_str(r#"{"captcha": 7, "text": "", "is_correct": null}"#).unwrap();
        assert!(!job.is_solved());

        let job: CaptchaJob = serde_json::from_str(r#"{}"#).unwrap();
        assert!(job.is_empty());
        assert!(!job.is_solved());
    }

    #[test]
    fn token_params_carry_only_their_fields() {
        let task = CaptchaTask::RecaptchaToken {
            site_key: "6Ld-key".into(),
            page_url: "https://example.com/login".into(),
            action: Some("login".into()),
            min_score: Some(0.3),
            proxy: None,
        };
        let (field, params) = task.token_params().unwrap();
        assert_eq!(field, "token_params");
        assert_eq!(params["googlekey"], "6Ld-key");
        assert_eq!(params["min_score"], "0.3");
        assert!(params.get("proxy").is_none());
        assert_eq!(task.type_code(), 5);

        let task = CaptchaTask::Coordinates {
            image: vec![1, 2, 3],
            hint: None,
        };
        assert_eq!(task.type_code(), 2);
        assert!(task.token_params().is_none());
    }

    #[test]
    fn image_validation_rejects_garbage() {
        assert!(matches!(
            validate_image(b""),
            Err(CapdriverError::InvalidInput(_))
        ));
        assert!(matches!(
            validate_image(b"not an image at all"),
            Err(CapdriverError::InvalidInput(_))
        ));
        // Minimal PNG signature is enough for format sniffing.
        let png = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0];
        assert!(validate_image(&png).is_ok());
    }
}
