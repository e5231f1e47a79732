use crate::services::mailer::{MailError, Mailer};
use async_trait::async_trait;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Records outgoing mail instead of sending it. Used in tests and as the
/// development fallback when SMTP is not configured.
#[derive(Debug, Default)]
pub struct MockMailer {
    pub sent: Mutex<Vec<RecordedEmail>>,
    pub fail_send: bool,
}

impl MockMailer {
    pub fn failing() -> Self {
        MockMailer {
            fail_send: true,
            ..Default::default()
        }
    }

    pub fn sent_emails(&self) -> Vec<RecordedEmail> {
        self.sent.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError> {
        if self.fail_send {
            return Err(MailError::Transport("mock failure".into()));
        }
        if !to.contains('@') {
            return Err(MailError::InvalidAddress(to.to_string()));
        }
        tracing::info!(%to, %subject, "mock mailer recorded email");
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(RecordedEmail {
                to: to.to_string(),
                subject: subject.to_string(),
                body: body.to_string(),
            });
        }
        Ok(())
    }
}
