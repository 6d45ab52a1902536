use std::path::PathBuf;

use anyhow::Context;
use canvas_mail::{ImapConfig, SmtpConfig};

/// Placeholder JWT secrets that MUST NOT be used.
pub const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

pub struct Config {
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub upload_dir: PathBuf,
    pub email_attach_dir: PathBuf,
    pub export_dir: PathBuf,
    pub public_url: String,
    pub chromium: String,
    pub max_upload_bytes: usize,
    pub imap: ImapConfig,
    pub smtp: SmtpConfig,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.into())
}

fn parsed_or<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().parse().with_context(|| format!("invalid {}", name)),
        _ => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let username = var_or("MAIL_USER", "");
        let password = var_or("MAIL_PASS", "");

        Ok(Self {
            host: var_or("CANVAS_HOST", "0.0.0.0"),
            port: parsed_or("CANVAS_PORT", 5000)?,
            jwt_secret: var_or("CANVAS_JWT_SECRET", ""),
            db_path: var_or("CANVAS_DB_PATH", ".tmp/canvas_board.db").into(),
            upload_dir: var_or("CANVAS_UPLOAD_DIR", "static/uploads").into(),
            email_attach_dir: var_or("CANVAS_EMAIL_ATTACH_DIR", ".tmp/email_attachments").into(),
            export_dir: var_or("CANVAS_EXPORT_DIR", ".tmp").into(),
            public_url: var_or("CANVAS_PUBLIC_URL", "http://127.0.0.1:5000"),
            chromium: var_or("CANVAS_CHROMIUM", "chromium"),
            max_upload_bytes: parsed_or("CANVAS_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            imap: ImapConfig {
                host: var_or("IMAP_HOST", ""),
                port: parsed_or("IMAP_PORT", 993)?,
                username: username.clone(),
                password: password.clone(),
            },
            smtp: SmtpConfig {
                host: var_or("SMTP_HOST", ""),
                port: parsed_or("SMTP_PORT", 465)?,
                username,
                password,
            },
        })
    }

    pub fn has_usable_secret(&self) -> bool {
        !self.jwt_secret.is_empty() && !PLACEHOLDER_SECRETS.contains(&self.jwt_secret.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_secrets_are_not_usable() {
        let mut config = Config {
            host: "0.0.0.0".into(),
            port: 5000,
            jwt_secret: "dev-secret-change-me".into(),
            db_path: "db".into(),
            upload_dir: "uploads".into(),
            email_attach_dir: "attach".into(),
            export_dir: ".tmp".into(),
            public_url: "http://127.0.0.1:5000".into(),
            chromium: "chromium".into(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            imap: ImapConfig {
                host: String::new(),
                port: 993,
                username: String::new(),
                password: String::new(),
            },
            smtp: SmtpConfig {
                host: String::new(),
                port: 465,
                username: String::new(),
                password: String::new(),
            },
        };
        assert!(!config.has_usable_secret());

        config.jwt_secret = String::new();
        assert!(!config.has_usable_secret());

        config.jwt_secret = "0f9c2b7e1d".into();
        assert!(config.has_usable_secret());
    }
}
