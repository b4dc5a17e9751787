use crate::config::AppConfig;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

/// Outgoing notification mail
#[derive(Debug, Clone, PartialEq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// SMTP mailer. Without credentials every message is logged and dropped.
pub struct Mailer {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from: String,
}

impl Mailer {
    pub fn from_config(config: &AppConfig) -> Self {
        let transport = match (&config.smtp_username, &config.smtp_password) {
            (Some(user), Some(pass)) => {
                match AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host) {
                    Ok(builder) => {
                        log::info!("📧 SMTP relay configured: {}", config.smtp_host);
                        Some(
                            builder
                                .credentials(Credentials::new(user.clone(), pass.clone()))
                                .build(),
                        )
                    }
                    Err(e) => {
                        log::error!("❌ Invalid SMTP relay {}: {}", config.smtp_host, e);
                        None
                    }
                }
            }
            _ => {
                log::warn!("⚠️  SMTP credentials not set, emails will only be logged");
                None
            }
        };

        Self {
            transport,
            from: config.mail_from.clone(),
        }
    }

    #[cfg(test)]
    pub fn disabled(from: &str) -> Self {
        Self {
            transport: None,
            from: from.to_string(),
        }
    }

    /// Sends a mail. Failures are logged, never returned.
    pub async fn send(&self, email: Email) {
        let transport = match &self.transport {
            Some(t) => t,
            None => {
                log::info!("📧 (mail disabled) to={} subject={}", email.to, email.subject);
                return;
            }
        };

        let message = match build_message(&self.from, &email) {
            Ok(m) => m,
            Err(e) => {
                log::warn!("❌ Could not build mail to {}: {}", email.to, e);
                return;
            }
        };

        match transport.send(message).await {
            Ok(_) => log::info!("📧 Mail sent to {}: {}", email.to, email.subject),
            Err(e) => log::error!("❌ Mail to {} failed: {}", email.to, e),
        }
    }
}

fn build_message(from: &str, email: &Email) -> Result<Message, String> {
    Message::builder()
        .from(from.parse::<Mailbox>().map_err(|e| format!("invalid from address: {}", e))?)
        .to(email.to.parse::<Mailbox>().map_err(|e| format!("invalid recipient: {}", e))?)
        .subject(email.subject.clone())
        .header(ContentType::TEXT_HTML)
        .body(email.html.clone())
        .map_err(|e| e.to_string())
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn format_usd(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.abs();
    format!("{}${}.{:02}", sign, abs / 100, abs % 100)
}

pub fn paper_approved(to: &str, name: &str, title: &str, paper_url: &str) -> Email {
    Email {
        to: to.to_string(),
        subject: format!("Your paper \"{}\" was approved", title),
        html: format!(
            "<p>Hi {},</p><p>Your paper <strong>{}</strong> has been approved and is now \
             visible on ScholarShare.</p><p><a href=\"{}\">View your paper</a></p>",
            escape_html(name),
            escape_html(title),
            paper_url
        ),
    }
}

pub fn paper_rejected(to: &str, name: &str, title: &str, reason: &str) -> Email {
    Email {
        to: to.to_string(),
        subject: format!("Your paper \"{}\" was not accepted", title),
        html: format!(
            "<p>Hi {},</p><p>Your paper <strong>{}</strong> was not accepted.</p>\
             <p>Reason: {}</p><p>You can update the paper and resubmit it from your dashboard.</p>",
            escape_html(name),
            escape_html(title),
            escape_html(reason)
        ),
    }
}

pub fn purchase_receipt(to: &str, title: &str, amount_cents: i64, payment_id: &str) -> Email {
    Email {
        to: to.to_string(),
        subject: format!("Receipt for \"{}\"", title),
        html: format!(
            "<p>Thank you for your purchase.</p><p>Paper: <strong>{}</strong><br/>\
             Amount: {}<br/>Payment reference: {}</p>",
            escape_html(title),
            format_usd(amount_cents),
            payment_id
        ),
    }
}

pub fn payout_settled(to: &str, amount_cents: i64, approved: bool) -> Email {
    let outcome = if approved { "approved" } else { "rejected" };
    Email {
        to: to.to_string(),
        subject: format!("Payout request {}", outcome),
        html: format!(
            "<p>Your payout request of {} was {}.</p>{}",
            format_usd(amount_cents),
            outcome,
            if approved {
                "<p>The funds are on their way.</p>"
            } else {
                "<p>The amount has been returned to your available balance.</p>"
            }
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_usd() {
        assert_eq!(format_usd(0), "$0.00");
        assert_eq!(format_usd(1999), "$19.99");
        assert_eq!(format_usd(5), "$0.05");
        assert_eq!(format_usd(-250), "-$2.50");
    }

    #[test]
    fn test_rejection_mail_escapes_html() {
        let mail = paper_rejected("a@b.io", "Ada", "<script>", "too <short>");
        assert!(mail.html.contains("&lt;script&gt;"));
        assert!(mail.html.contains("too &lt;short&gt;"));
        assert!(!mail.html.contains("<script>"));
    }

    #[test]
    fn test_build_message_rejects_bad_recipient() {
        let mail = purchase_receipt("not an address", "Paper", 500, "p1");
        assert!(build_message("ScholarShare <no-reply@example.org>", &mail).is_err());

        let mail = purchase_receipt("reader@example.org", "Paper", 500, "p1");
        assert!(build_message("ScholarShare <no-reply@example.org>", &mail).is_ok());
    }

    #[tokio::test]
    async fn test_disabled_mailer_does_not_fail() {
        let mailer = Mailer::disabled("no-reply@example.org");
        mailer.send(payout_settled("r@example.org", 1500, true)).await;
    }
}
