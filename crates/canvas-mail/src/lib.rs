pub mod dispatch;
pub mod error;
pub mod imap;
pub mod ingest;
pub mod parse;
pub mod source;

pub use dispatch::{Mailer, OutgoingMail, SmtpConfig, SmtpMailer};
pub use error::MailError;
pub use imap::{ImapConfig, ImapMailbox};
pub use ingest::Ingestor;
pub use source::MailSource;
