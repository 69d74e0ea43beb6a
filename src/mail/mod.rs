use anyhow::{Context, Result, anyhow};
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use tracing::info;

use crate::{config::SmtpSettings, web::escape_html};

const VERIFICATION_SUBJECT: &str = "Email Verification";

/// Recipients under this domain are refused by the in-memory test transport.
#[cfg(test)]
pub const UNDELIVERABLE_DOMAIN: &str = "@undeliverable.invalid";

/// Outgoing mail as handed to the transport.
#[derive(Clone, Debug)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

#[derive(Clone)]
enum Delivery {
    Smtp {
        transport: AsyncSmtpTransport<Tokio1Executor>,
        from: Mailbox,
    },
    /// SMTP is not configured; messages are written to the log.
    Log,
    #[cfg(test)]
    Memory(std::sync::Arc<std::sync::Mutex<Vec<OutgoingMail>>>),
}

#[derive(Clone)]
pub struct Mailer {
    delivery: Delivery,
}

impl Mailer {
    pub fn from_settings(settings: Option<&SmtpSettings>) -> Result<Self> {
        let Some(settings) = settings else {
            info!("SMTP not configured; verification links will be logged");
            return Ok(Self::log_only());
        };

        let credentials = Credentials::new(settings.username.clone(), settings.password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
            .with_context(|| format!("failed to build SMTP transport for {}", settings.host))?
            .port(settings.port)
            .credentials(credentials)
            .build();
        let from = settings
            .from_address
            .parse::<Mailbox>()
            .map_err(|err| anyhow!("invalid sender address '{}': {err}", settings.from_address))?;

        Ok(Self {
            delivery: Delivery::Smtp { transport, from },
        })
    }

    pub fn log_only() -> Self {
        Self {
            delivery: Delivery::Log,
        }
    }

    #[cfg(test)]
    pub fn in_memory() -> (Self, std::sync::Arc<std::sync::Mutex<Vec<OutgoingMail>>>) {
        let outbox = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        (
            Self {
                delivery: Delivery::Memory(outbox.clone()),
            },
            outbox,
        )
    }

    pub async fn send_verification_email(
        &self,
        username: &str,
        email: &str,
        confirm_url: &str,
    ) -> Result<()> {
        let mail = OutgoingMail {
            to: email.to_string(),
            subject: VERIFICATION_SUBJECT.to_string(),
            html_body: verification_email_html(username, confirm_url),
        };
        self.send(mail).await
    }

    async fn send(&self, mail: OutgoingMail) -> Result<()> {
        match &self.delivery {
            Delivery::Smtp { transport, from } => {
                let to = mail
                    .to
                    .parse::<Mailbox>()
                    .map_err(|err| anyhow!("invalid recipient address '{}': {err}", mail.to))?;
                let message = Message::builder()
                    .from(from.clone())
                    .to(to)
                    .subject(mail.subject.as_str())
                    .header(ContentType::TEXT_HTML)
                    .body(mail.html_body)
                    .context("failed to build email message")?;

                transport
                    .send(message)
                    .await
                    .with_context(|| format!("failed to send email to {}", mail.to))?;
                info!(to = %mail.to, subject = %mail.subject, "email sent");
            }
            Delivery::Log => {
                info!(to = %mail.to, subject = %mail.subject, body = %mail.html_body, "email not sent (SMTP disabled)");
            }
            #[cfg(test)]
            Delivery::Memory(outbox) => {
                if mail.to.ends_with(UNDELIVERABLE_DOMAIN) {
                    return Err(anyhow!("recipient {} rejected", mail.to));
                }
                outbox
                    .lock()
                    .map_err(|_| anyhow!("outbox poisoned"))?
                    .push(mail);
            }
        }
        Ok(())
    }
}

fn verification_email_html(username: &str, confirm_url: &str) -> String {
    format!(
        r#"<p>Hi {username},</p>
<p>Thanks for registering. Please click the link below to verify your email:</p>
<a href="{confirm_url}">Verify Email</a>"#,
        username = escape_html(username),
        confirm_url = escape_html(confirm_url),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn verification_mail_contains_link() {
        let (mailer, outbox) = Mailer::in_memory();
        mailer
            .send_verification_email("<alice>", "alice@example.com", "http://localhost/confirm/abc")
            .await
            .expect("send");

        let sent = outbox.lock().expect("outbox");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "alice@example.com");
        assert_eq!(sent[0].subject, "Email Verification");
        assert!(sent[0].html_body.contains(r#"href="http://localhost/confirm/abc""#));
        assert!(sent[0].html_body.contains("Hi &lt;alice&gt;,"));
    }
}
