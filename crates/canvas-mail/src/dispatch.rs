use std::path::PathBuf;

use async_trait::async_trait;
use mail_builder::MessageBuilder;
use mail_send::SmtpClientBuilder;
use tracing::info;

use crate::error::MailError;

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl SmtpConfig {
    pub fn is_configured(&self) -> bool {
        !self.host.is_empty() && !self.username.is_empty()
    }
}

/// A plain-text message with at most one file attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachment: Option<PathBuf>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError>;
}

/// Sends through an implicit-TLS SMTP submission port, authenticating as
/// and sending from the configured account.
pub struct SmtpMailer {
    config: SmtpConfig,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        if !self.config.is_configured() {
            return Err(MailError::NotConfigured("SMTP host or credentials missing"));
        }

        let attachment = match &mail.attachment {
            Some(path) => {
                let bytes = tokio::fs::read(path).await?;
                let filename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "attachment".to_string());
                Some((filename, bytes))
            }
            None => None,
        };

        let mut message = MessageBuilder::new()
            .from(self.config.username.as_str())
            .to(mail.to.as_str())
            .subject(mail.subject.as_str())
            .text_body(mail.body.as_str());
        if let Some((filename, bytes)) = attachment {
            message = message.attachment("application/octet-stream", filename, bytes);
        }

        SmtpClientBuilder::new(self.config.host.as_str(), self.config.port)
            .implicit_tls(true)
            .credentials((self.config.username.as_str(), self.config.password.as_str()))
            .connect()
            .await
            .map_err(|e| MailError::Smtp(format!("connect failed: {}", e)))?
            .send(message)
            .await
            .map_err(|e| MailError::Smtp(format!("send failed: {}", e)))?;

        info!(to = %mail.to, subject = %mail.subject, "Mail sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_mailer_refuses_to_send() {
        let mailer = SmtpMailer::new(SmtpConfig {
            host: String::new(),
            port: 465,
            username: String::new(),
            password: String::new(),
        });
        let err = mailer
            .send(OutgoingMail {
                to: "someone@example.com".into(),
                subject: "Board: Q3".into(),
                body: "Please find the board 'Q3' attached.".into(),
                attachment: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, MailError::NotConfigured(_)));
    }
}
