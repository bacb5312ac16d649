use async_trait::async_trait;
use lettre::message::Message;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{SmtpTransport, Transport};
use tracing::warn;

use catalog_core::config::{NotificationsConfig, SmtpConfig};
use catalog_leads::{Lead, LeadNotifier};
use catalog_logging::{AlertSink, CriticalAlert};

/// Send-only SMTP notifier. Bounce handling, retries, and delivery receipts
/// are the out-of-scope "SMTP mail delivery" named in `spec.md` §1 — this
/// crate only puts the message on the wire.
#[derive(Clone)]
pub struct EmailNotifier {
    smtp: SmtpConfig,
    recipients: Vec<String>,
}

impl EmailNotifier {
    pub fn new(smtp: SmtpConfig, notifications: NotificationsConfig) -> Self {
        Self {
            smtp,
            recipients: notifications.manager_emails.0,
        }
    }

    /// `lettre`'s transport is blocking; the send itself runs on a blocking
    /// thread so it never stalls the async runtime (`spec.md` §5's scoped
    /// client rule — built, used, and dropped within this one call).
    async fn dispatch(&self, subject: String, body: String) {
        let notifier = self.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || notifier.send_blocking(&subject, &body)).await {
            warn!(error = %e, "email notifier: blocking send task panicked");
        }
    }

    fn send_blocking(&self, subject: &str, body: &str) {
        let (Some(host), Some(user), Some(password)) = (&self.smtp.host, &self.smtp.user, &self.smtp.password) else {
            warn!("email notifier: SMTP not configured, dropping notification");
            return;
        };
        if self.recipients.is_empty() {
            warn!("email notifier: no manager emails configured, dropping notification");
            return;
        }

        let mailer = match SmtpTransport::relay(host) {
            Ok(builder) => builder.credentials(Credentials::new(user.clone(), password.clone())).build(),
            Err(e) => {
                warn!(error = %e, "email notifier: failed to build SMTP transport");
                return;
            }
        };

        let from = match user.parse() {
            Ok(addr) => addr,
            Err(e) => {
                warn!(error = %e, "email notifier: SMTP_USER is not a valid address");
                return;
            }
        };

        for recipient in &self.recipients {
            let to = match recipient.parse() {
                Ok(addr) => addr,
                Err(e) => {
                    warn!(error = %e, recipient, "email notifier: invalid recipient address");
                    continue;
                }
            };
            let message = Message::builder()
                .from(from.clone())
                .to(to)
                .subject(subject)
                .body(body.to_string());
            let message = match message {
                Ok(m) => m,
                Err(e) => {
                    warn!(error = %e, "email notifier: failed to build message");
                    continue;
                }
            };
            if let Err(e) = mailer.send(&message) {
                warn!(error = %e, recipient, "email notifier: send failed");
            }
        }
    }
}

#[async_trait]
impl LeadNotifier for EmailNotifier {
    async fn notify_lead_captured(&self, lead: &Lead) {
        let subject = "New lead captured".to_string();
        let body = format!(
            "Name: {}\nPhone: {}\nEmail: {}\nSource: {}",
            lead.last_name,
            lead.phone.as_deref().unwrap_or("-"),
            lead.email.as_deref().unwrap_or("-"),
            lead.source,
        );
        self.dispatch(subject, body).await;
    }
}

#[async_trait]
impl AlertSink for EmailNotifier {
    async fn send(&self, alert: &CriticalAlert) {
        let subject = format!("CRITICAL: {}", alert.target);
        self.dispatch(subject, alert.message.clone()).await;
    }
}
