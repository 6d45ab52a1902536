use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail is not configured: {0}")]
    NotConfigured(&'static str),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("IMAP error: {0}")]
    Protocol(String),

    #[error("SMTP error: {0}")]
    Smtp(String),

    #[error("attachment storage failed: {0}")]
    Storage(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] anyhow::Error),
}
