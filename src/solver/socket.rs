//! Persistent-socket transport for the solving service.
//!
//! Keeps one line-delimited JSON connection open and serializes every
//! request through it. Any I/O failure tears the connection down and the
//! request is retried exactly once before a connection error surfaces.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures::{SinkExt, StreamExt};
use rand::Rng;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, warn};

use async_trait::async_trait;

use crate::error::{CapdriverError, Result};
use crate::solver::transport::SolverTransport;
use crate::solver::types::{validate_image, AccountStatus, CaptchaJob, CaptchaTask, Credential};
use crate::solver::CLIENT_VERSION;

pub const DEFAULT_HOST: &str = "api.dbcapi.me";

/// The service load-balances across a small port range; pick one at random
/// per connection.
const PORT_RANGE: std::ops::Range<u16> = 8123..8131;

type Conn = Framed<TcpStream, LinesCodec>;

/// Socket API client with one mutex-guarded persistent connection.
pub struct SocketTransport {
    host: String,
    credential: Credential,
    conn: Mutex<Option<Conn>>,
}

impl SocketTransport {
    pub fn new(credential: Credential) -> Self {
        Self::with_host(DEFAULT_HOST, credential)
    }

    pub fn with_host(host: &str, credential: Credential) -> Self {
        Self {
            host: host.to_string(),
            credential,
            conn: Mutex::new(None),
        }
    }

    /// Open a fresh connection and authenticate on it before anything else
    /// travels over the wire.
    async fn connect(&self) -> Result<Conn> {
        let port = rand::thread_rng().gen_range(PORT_RANGE);
        debug!(host = %self.host, port, "connecting to socket API");
        let stream = TcpStream::connect((self.host.as_str(), port))
            .await
            .map_err(|err| {
                CapdriverError::ConnectionLost(format!("connect {}:{port}: {err}", self.host))
            })?;
        let mut conn = Framed::new(stream, LinesCodec::new());

        let mut login = json!({ "cmd": "login", "version": CLIENT_VERSION });
        for (name, value) in self.credential.fields() {
            login[name] = json!(value);
        }
        let response = Self::exchange(&mut conn, &login).await?;
        parse_response(response)?;

        Ok(conn)
    }

    async fn exchange(conn: &mut Conn, request: &Value) -> Result<Value> {
        conn.send(request.to_string())
            .await
            .map_err(|err| CapdriverError::ConnectionLost(err.to_string()))?;
        match conn.next().await {
            Some(Ok(line)) => serde_json::from_str(&line)
                .map_err(|_| CapdriverError::Protocol("invalid API response".into())),
            Some(Err(err)) => Err(CapdriverError::ConnectionLost(err.to_string())),
            None => Err(CapdriverError::ConnectionLost("connection closed".into())),
        }
    }

    async fn call(&self, cmd: &str, mut payload: Value) -> Result<Value> {
        payload["cmd"] = json!(cmd);
        payload["version"] = json!(CLIENT_VERSION);

        let mut guard = self.conn.lock().await;
        let mut last_err = None;

        for _attempt in 0..2 {
            if guard.is_none() {
                match self.connect().await {
                    Ok(conn) => *guard = Some(conn),
                    Err(err) => {
                        warn!("socket API connect failed: {err}");
                        last_err = Some(err);
                        continue;
                    }
                }
            }
            let Some(conn) = guard.as_mut() else { continue };

            match Self::exchange(conn, &payload).await {
                Ok(response) => {
                    return match parse_response(response) {
                        // An unknown server error leaves the connection in an
                        // undefined state; drop it.
                        Err(err @ CapdriverError::Protocol(_)) => {
                            *guard = None;
                            Err(err)
                        }
                        other => other,
                    };
                }
                Err(err) => {
                    warn!(cmd, "socket API request failed: {err}");
                    *guard = None;
                    last_err = Some(err);
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| CapdriverError::ConnectionLost("socket API unavailable".into())))
    }
}

/// Map the `error` field of a response to a typed error, or pass the
/// response through unchanged.
fn parse_response(response: Value) -> Result<Value> {
    let Some(error) = response.get("error").and_then(Value::as_str) else {
        return Ok(response);
    };
    match error {
        "not-logged-in" | "invalid-credentials" => Err(CapdriverError::AccessDenied(
            "check your credentials".into(),
        )),
        "banned" => Err(CapdriverError::AccessDenied("account is suspended".into())),
        "insufficient-funds" => Err(CapdriverError::AccessDenied("balance is too low".into())),
        "invalid-captcha" => Err(CapdriverError::InvalidInput(
            "the service rejected the image".into(),
        )),
        "service-overload" => Err(CapdriverError::ServiceOverloaded),
        other => Err(CapdriverError::Protocol(format!("API server error: {other}"))),
    }
}

#[async_trait]
impl SolverTransport for SocketTransport {
    async fn account_status(&self) -> Result<AccountStatus> {
        let response = self.call("user", json!({})).await?;
        serde_json::from_value(response)
            .map_err(|_| CapdriverError::Protocol("invalid API response".into()))
    }

    async fn job_status(&self, id: u64) -> Result<CaptchaJob> {
        let response = self.call("captcha", json!({ "captcha": id })).await?;
        serde_json::from_value(response)
            .map_err(|_| CapdriverError::Protocol("invalid API response".into()))
    }

    async fn submit(&self, task: &CaptchaTask) -> Result<CaptchaJob> {
        let mut payload = json!({ "type": task.type_code() });

        if let Some(image) = task.image() {
            validate_image(image)?;
            payload["captcha"] = json!(BASE64.encode(image));
        }
        if let CaptchaTask::Coordinates { hint: Some(hint), .. } = task {
            payload["banner_text"] = json!(hint);
        }
        if let Some((field, params)) = task.token_params() {
            payload[field] = json!(params.to_string());
        }

        debug!(kind = task.type_code(), "uploading CAPTCHA");
        let response = self.call("upload", payload).await?;
        serde_json::from_value(response)
            .map_err(|_| CapdriverError::Protocol("invalid API response".into()))
    }

    async fn report_incorrect(&self, id: u64) -> Result<bool> {
        debug!(job = id, "reporting CAPTCHA as incorrectly solved");
        let response = self.call("report", json!({ "captcha": id })).await?;
        let job: CaptchaJob = serde_json::from_value(response)
            .map_err(|_| CapdriverError::Protocol("invalid API response".into()))?;
        Ok(job.is_correct != Some(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_error_strings_map_to_error_kinds() {
        let denied = ["not-logged-in", "invalid-credentials", "banned", "insufficient-funds"];
        for error in denied {
            assert!(matches!(
                parse_response(json!({ "error": error })),
                Err(CapdriverError::AccessDenied(_))
            ));
        }
        assert!(matches!(
            parse_response(json!({ "error": "invalid-captcha" })),
            Err(CapdriverError::InvalidInput(_))
        ));
        assert!(matches!(
            parse_response(json!({ "error": "service-overload" })),
            Err(CapdriverError::ServiceOverloaded)
        ));
        assert!(matches!(
            parse_response(json!({ "error": "out-of-cheese" })),
            Err(CapdriverError::Protocol(_))
        ));
    }

    #[test]
    fn clean_responses_pass_through() {
        let response = parse_response(json!({ "captcha": 42, "text": "" })).unwrap();
        assert_eq!(response["captcha"], 42);
    }
}
