//! Code delivery.
//!
//! The core never blocks on a delivery provider: `send_code` reports success
//! or failure as a bool, callers log failures and move on.

use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, Message,
    SmtpTransport, Transport,
};
use std::fmt;
use std::sync::Mutex;

use crate::config::DeliveryConfig;

/// Where a code goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Email(String),
    Mobile(String),
}

impl Destination {
    pub fn address(&self) -> &str {
        match self {
            Destination::Email(addr) | Destination::Mobile(addr) => addr,
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Email(addr) => write!(f, "email:{}", addr),
            Destination::Mobile(addr) => write!(f, "sms:{}", addr),
        }
    }
}

#[async_trait]
pub trait CodeNotifier: Send + Sync {
    /// Deliver a verification code. Best-effort: a `false` return means the
    /// code may arrive late or not at all, and callers must not fail the
    /// primary operation over it.
    async fn send_code(&self, destination: &Destination, code: &str) -> bool;
}

/// Production delivery: SMTP for email, an HTTP gateway for SMS when one is
/// configured.
pub struct DeliveryService {
    mailer: SmtpTransport,
    from_email: String,
    sms_gateway_url: Option<String>,
    http: reqwest::Client,
}

impl DeliveryService {
    pub fn new(config: &DeliveryConfig) -> Result<Self, anyhow::Error> {
        let creds = Credentials::new(config.smtp_user.clone(), config.smtp_password.clone());

        let mailer = SmtpTransport::relay(&config.smtp_host)
            .map_err(|e| anyhow::anyhow!("SMTP relay setup failed: {}", e))?
            .credentials(creds)
            .port(587)
            .timeout(Some(std::time::Duration::from_secs(10)))
            .build();

        tracing::info!(host = %config.smtp_host, "Delivery service initialized");

        Ok(Self {
            mailer,
            from_email: config.from_email.clone(),
            sms_gateway_url: config.sms_gateway_url.clone(),
            http: reqwest::Client::new(),
        })
    }

    async fn send_email(&self, to_email: &str, code: &str) -> bool {
        let body = format!(
            "Your verification code is {}.\n\nIt expires shortly. If you didn't request this, ignore this message.",
            code
        );

        let email = match Message::builder()
            .from(match self.from_email.parse() {
                Ok(addr) => addr,
                Err(e) => {
                    tracing::error!(error = %e, "Invalid from address");
                    return false;
                }
            })
            .to(match to_email.parse() {
                Ok(addr) => addr,
                Err(e) => {
                    tracing::error!(error = %e, "Invalid recipient address");
                    return false;
                }
            })
            .subject("Your verification code")
            .header(ContentType::TEXT_PLAIN)
            .body(body)
        {
            Ok(email) => email,
            Err(e) => {
                tracing::error!(error = %e, "Failed to build email");
                return false;
            }
        };

        // SmtpTransport is blocking; keep it off the async runtime.
        let mailer = self.mailer.clone();
        match tokio::task::spawn_blocking(move || mailer.send(&email)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                tracing::error!(error = %e, to = %to_email, "Failed to send email");
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "Email send task panicked");
                false
            }
        }
    }

    async fn send_sms(&self, mobile: &str, code: &str) -> bool {
        let Some(gateway) = &self.sms_gateway_url else {
            tracing::warn!(to = %mobile, "No SMS gateway configured; code not delivered");
            return false;
        };

        let result = self
            .http
            .post(format!("{}/messages", gateway))
            .json(&serde_json::json!({
                "to": mobile,
                "body": format!("Your verification code is {}", code),
            }))
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                tracing::error!(status = %resp.status(), to = %mobile, "SMS gateway rejected message");
                false
            }
            Err(e) => {
                tracing::error!(error = %e, to = %mobile, "Failed to reach SMS gateway");
                false
            }
        }
    }
}

#[async_trait]
impl CodeNotifier for DeliveryService {
    async fn send_code(&self, destination: &Destination, code: &str) -> bool {
        match destination {
            Destination::Email(addr) => self.send_email(addr, code).await,
            Destination::Mobile(number) => self.send_sms(number, code).await,
        }
    }
}

/// Records every delivery instead of performing one. Tests read codes back
/// out of it.
#[derive(Default)]
pub struct MockNotifier {
    pub sent: Mutex<Vec<(Destination, String)>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent code sent to the given address, regardless of channel.
    pub fn last_code_for(&self, address: &str) -> Option<String> {
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .iter()
            .rev()
            .find(|(dest, _)| dest.address() == address)
            .map(|(_, code)| code.clone())
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().expect("notifier mutex poisoned").len()
    }
}

#[async_trait]
impl CodeNotifier for MockNotifier {
    async fn send_code(&self, destination: &Destination, code: &str) -> bool {
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .push((destination.clone(), code.to_string()));
        true
    }
}
