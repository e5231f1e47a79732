use std::env;
use std::sync::Arc;

use async_trait::async_trait;
use lettre::{
    message::Mailbox,
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::debug;

use super::{MailError, Mailer};

#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub from: String,
    /// `None` sends without authentication or TLS (local relays, mailhog).
    pub credentials: Option<(String, String)>,
}

impl SmtpSettings {
    /// Reads `SMTP_HOST`, `SMTP_PORT`, `SMTP_FROM` and, unless
    /// `SMTP_TLS_DISABLED=true`, `SMTP_USERNAME`/`SMTP_PASSWORD`.
    pub fn from_env() -> Result<Self, MailError> {
        let var = |name: &str| {
            env::var(name).map_err(|_| MailError::Config(format!("{name} must be set")))
        };
        let port = var("SMTP_PORT")?
            .parse::<u16>()
            .map_err(|_| MailError::Config("SMTP_PORT must be a port number".to_string()))?;
        let tls_disabled = env::var("SMTP_TLS_DISABLED")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let credentials = if tls_disabled {
            None
        } else {
            Some((var("SMTP_USERNAME")?, var("SMTP_PASSWORD")?))
        };
        Ok(SmtpSettings {
            host: var("SMTP_HOST")?,
            port,
            from: var("SMTP_FROM")?,
            credentials,
        })
    }
}

#[derive(Clone)]
pub struct SmtpMailer {
    transport: Arc<AsyncSmtpTransport<Tokio1Executor>>,
    sender: Mailbox,
}

impl SmtpMailer {
    pub fn new(settings: SmtpSettings) -> Result<Self, MailError> {
        let sender: Mailbox = settings.from.parse()?;
        let transport = match settings.credentials {
            None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host)
                .port(settings.port)
                .build(),
            Some((username, password)) => {
                let tls = TlsParameters::new(settings.host.clone())?;
                AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)?
                    .port(settings.port)
                    .tls(Tls::Required(tls))
                    .credentials(Credentials::new(username, password))
                    .build()
            }
        };
        Ok(SmtpMailer {
            transport: Arc::new(transport),
            sender,
        })
    }

    pub fn from_env() -> Result<Self, MailError> {
        Self::new(SmtpSettings::from_env()?)
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError> {
        let recipient: Mailbox = to.parse()?;
        let message = Message::builder()
            .from(self.sender.clone())
            .to(recipient)
            .subject(subject)
            .body(body.to_string())?;
        self.transport.send(message).await?;
        debug!(%to, %subject, "email handed to smtp relay");
        Ok(())
    }
}
