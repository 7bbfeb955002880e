/// Outgoing mail
///
/// Handlers depend on the [`Mailer`] trait. Three backends exist:
///
/// - [`SmtpMailer`]: lettre async SMTP transport (production)
/// - [`LogMailer`]: logs the message instead of sending it (development)
/// - [`MemoryMailer`]: keeps messages in memory (tests)
///
/// # Example
///
/// ```
/// use todo_shared::mail::{Mailer, MemoryMailer, OutgoingMail};
///
/// # #[tokio::main]
/// # async fn main() {
/// let mailer = MemoryMailer::new();
///
/// mailer.send(OutgoingMail {
///     to: "alice@example.com".to_string(),
///     subject: "Hello".to_string(),
///     html_body: "<p>Hi</p>".to_string(),
/// }).await.unwrap();
///
/// assert_eq!(mailer.sent().len(), 1);
/// # }
/// ```

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use crate::auth::reset_token::RESET_TOKEN_TTL_SECS;

/// Subject of the password-reset mail
pub const RESET_MAIL_SUBJECT: &str = "Reset Password Notification";

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    /// Bad sender/recipient address
    #[error("Invalid address: {0}")]
    Address(String),

    /// Message couldn't be assembled
    #[error("Failed to build message: {0}")]
    Build(String),

    /// SMTP transport failure
    #[error("Failed to send mail: {0}")]
    Transport(String),
}

/// A message ready to be delivered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError>;
}

/// How the SMTP connection is secured
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpSecurity {
    /// Implicit TLS, usually port 465
    #[default]
    Tls,

    /// STARTTLS upgrade, usually port 587
    StartTls,

    /// Plaintext; local relays and test servers only
    None,
}

impl std::str::FromStr for SmtpSecurity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tls" | "ssl" | "smtps" => Ok(SmtpSecurity::Tls),
            "starttls" => Ok(SmtpSecurity::StartTls),
            "none" | "plain" => Ok(SmtpSecurity::None),
            other => Err(format!("unknown SMTP security mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,

    /// `From` header, e.g. `Todo <noreply@example.com>`
    pub from: String,

    pub security: SmtpSecurity,
}

/// lettre-backed SMTP mailer
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, MailError> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| MailError::Address(format!("{}: {}", config.from, e)))?;

        let builder = match config.security {
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| MailError::Transport(e.to_string()))?,
            SmtpSecurity::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                    .map_err(|e| MailError::Transport(e.to_string()))?
            }
            SmtpSecurity::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host),
        };

        let mut builder = builder.port(config.port);
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        tracing::info!(
            host = %config.host,
            port = config.port,
            security = ?config.security,
            "SMTP mailer configured"
        );

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

/// Builds the lettre message for an [`OutgoingMail`]
pub fn build_message(from: &Mailbox, mail: &OutgoingMail) -> Result<Message, MailError> {
    let to: Mailbox = mail
        .to
        .parse()
        .map_err(|e| MailError::Address(format!("{}: {}", mail.to, e)))?;

    Message::builder()
        .from(from.clone())
        .to(to)
        .subject(mail.subject.as_str())
        .header(ContentType::TEXT_HTML)
        .body(mail.html_body.clone())
        .map_err(|e| MailError::Build(e.to_string()))
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        let message = build_message(&self.from, &mail)?;

        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        tracing::info!(to = %mail.to, subject = %mail.subject, "Mail sent");
        Ok(())
    }
}

/// Logs mail instead of sending it
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        tracing::info!(
            to = %mail.to,
            subject = %mail.subject,
            body = %mail.html_body,
            "SMTP not configured, mail logged instead of sent"
        );
        Ok(())
    }
}

/// Keeps sent mail in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryMailer {
    sent: Arc<Mutex<Vec<OutgoingMail>>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything sent so far
    pub fn sent(&self) -> Vec<OutgoingMail> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        let mut sent = match self.sent.lock() {
            Ok(sent) => sent,
            Err(poisoned) => poisoned.into_inner(),
        };
        sent.push(mail);
        Ok(())
    }
}

/// Builds the password-reset mail
///
/// The link is `<reset_url>?token=<token>&email=<email>` with both values
/// query-encoded. User-supplied text is HTML-escaped.
pub fn password_reset_mail(
    reset_url: &str,
    email: &str,
    username: Option<&str>,
    token: &str,
) -> Result<OutgoingMail, MailError> {
    let link = reqwest::Url::parse_with_params(reset_url, &[("token", token), ("email", email)])
        .map_err(|e| MailError::Build(format!("invalid reset url {}: {}", reset_url, e)))?;

    let greeting = match username {
        Some(name) if !name.is_empty() => format!("Hello {},", html_escape::encode_text(name)),
        _ => "Hello,".to_string(),
    };

    let html_body = format!(
        "<p>{greeting}</p>\
         <p>You are receiving this email because we received a password reset request for your account.</p>\
         <p><a href=\"{link}\">Reset Password</a></p>\
         <p>This link expires in {minutes} minutes.</p>\
         <p>If you did not request a password reset, no further action is required.</p>",
        greeting = greeting,
        link = html_escape::encode_double_quoted_attribute(link.as_str()),
        minutes = RESET_TOKEN_TTL_SECS / 60,
    );

    Ok(OutgoingMail {
        to: email.to_string(),
        subject: RESET_MAIL_SUBJECT.to_string(),
        html_body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smtp_security_from_str() {
        assert_eq!("tls".parse::<SmtpSecurity>().unwrap(), SmtpSecurity::Tls);
        assert_eq!("STARTTLS".parse::<SmtpSecurity>().unwrap(), SmtpSecurity::StartTls);
        assert_eq!("none".parse::<SmtpSecurity>().unwrap(), SmtpSecurity::None);
        assert!("carrier-pigeon".parse::<SmtpSecurity>().is_err());
    }

    #[test]
    fn test_password_reset_mail() {
        let mail = password_reset_mail(
            "http://localhost:8080/reset",
            "alice+todo@example.com",
            Some("alice"),
            "abc123",
        )
        .unwrap();

        assert_eq!(mail.to, "alice+todo@example.com");
        assert_eq!(mail.subject, RESET_MAIL_SUBJECT);
        assert!(mail.html_body.contains("Hello alice,"));
        assert!(mail.html_body.contains("token=abc123"));
        assert!(mail.html_body.contains("email=alice%2Btodo%40example.com"));
        assert!(mail.html_body.contains("10 minutes"));
    }

    #[test]
    fn test_password_reset_mail_escapes_username() {
        let mail = password_reset_mail(
            "http://localhost:8080/reset",
            "a@b.c",
            Some("<script>x</script>"),
            "abc123",
        )
        .unwrap();

        assert!(!mail.html_body.contains("<script>"));
        assert!(mail.html_body.contains("Hello &lt;script&gt;x&lt;/script&gt;,"));
        assert!(mail.html_body.contains("token=abc123&amp;email="));
    }

    #[test]
    fn test_password_reset_mail_rejects_bad_url() {
        assert!(matches!(
            password_reset_mail("not a url", "a@b.c", None, "t"),
            Err(MailError::Build(_))
        ));
    }

    #[test]
    fn test_build_message() {
        let from: Mailbox = "Todo <noreply@example.com>".parse().unwrap();
        let mail = OutgoingMail {
            to: "alice@example.com".to_string(),
            subject: "Hi".to_string(),
            html_body: "<p>Hi</p>".to_string(),
        };

        let message = build_message(&from, &mail).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Subject: Hi"));
        assert!(raw.contains("text/html"));
    }

    #[test]
    fn test_build_message_bad_recipient() {
        let from: Mailbox = "noreply@example.com".parse().unwrap();
        let mail = OutgoingMail {
            to: "not an address".to_string(),
            subject: "Hi".to_string(),
            html_body: String::new(),
        };

        assert!(matches!(build_message(&from, &mail), Err(MailError::Address(_))));
    }

    #[tokio::test]
    async fn test_memory_mailer() {
        let mailer = MemoryMailer::new();
        let clone = mailer.clone();

        mailer
            .send(OutgoingMail {
                to: "a@example.com".to_string(),
                subject: "One".to_string(),
                html_body: String::new(),
            })
            .await
            .unwrap();

        assert_eq!(clone.sent().len(), 1);
        assert_eq!(clone.sent()[0].subject, "One");
    }

    #[tokio::test]
    async fn test_log_mailer_never_fails() {
        let result = LogMailer
            .send(OutgoingMail {
                to: "a@example.com".to_string(),
                subject: "x".to_string(),
                html_body: String::new(),
            })
            .await;
        assert!(result.is_ok());
    }
}
