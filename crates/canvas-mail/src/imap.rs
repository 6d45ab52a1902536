use std::fmt;

use async_imap::Session;
use async_native_tls::TlsStream;
use async_trait::async_trait;
use futures_util::TryStreamExt;
use futures_util::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};
use tracing::{debug, info};

use crate::error::MailError;
use crate::source::MailSource;

pub type ImapSession = Session<TlsStream<Compat<TcpStream>>>;

#[derive(Debug, Clone)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl ImapConfig {
    pub fn is_configured(&self) -> bool {
        !self.host.is_empty() && !self.username.is_empty()
    }
}

/// An authenticated IMAP session with INBOX selected read-write.
pub struct ImapMailbox {
    session: ImapSession,
}

impl ImapMailbox {
    pub async fn connect(config: &ImapConfig) -> Result<Self, MailError> {
        if !config.is_configured() {
            return Err(MailError::NotConfigured("IMAP host or credentials missing"));
        }

        info!(host = %config.host, port = config.port, "Connecting to IMAP server");

        let tcp = TcpStream::connect((config.host.as_str(), config.port))
            .await
            .map_err(|e| MailError::Connect(format!("TCP connection failed: {}", e)))?;

        let tls = async_native_tls::TlsConnector::new();
        let tls_stream = tls
            .connect(config.host.as_str(), tcp.compat())
            .await
            .map_err(|e| MailError::Connect(format!("TLS handshake failed: {}", e)))?;

        let mut session = authenticate(tls_stream, config).await?;

        // SELECT rather than EXAMINE: fetching RFC822 sets \Seen.
        session
            .select("INBOX")
            .await
            .map_err(|e| MailError::Protocol(format!("SELECT failed: {}", e)))?;

        Ok(Self { session })
    }

    pub async fn logout(mut self) -> Result<(), MailError> {
        self.session
            .logout()
            .await
            .map_err(|e| MailError::Protocol(format!("LOGOUT failed: {}", e)))
    }
}

/// LOGIN over an established stream. A rejected login is `MailError::Auth`.
pub(crate) async fn authenticate<T>(stream: T, config: &ImapConfig) -> Result<Session<T>, MailError>
where
    T: AsyncRead + AsyncWrite + Unpin + fmt::Debug + Send,
{
    async_imap::Client::new(stream)
        .login(&config.username, &config.password)
        .await
        .map_err(|(e, _)| MailError::Auth(e.to_string()))
}

#[async_trait]
impl MailSource for ImapMailbox {
    async fn unseen_uids(&mut self) -> Result<Vec<u32>, MailError> {
        let uids = self
            .session
            .uid_search("UNSEEN")
            .await
            .map_err(|e| MailError::Protocol(format!("SEARCH failed: {}", e)))?;

        let mut uids: Vec<u32> = uids.into_iter().collect();
        uids.sort_unstable();
        debug!(count = uids.len(), "Unseen messages in INBOX");
        Ok(uids)
    }

    async fn fetch_raw(&mut self, uid: u32) -> Result<Option<Vec<u8>>, MailError> {
        let fetches: Vec<_> = self
            .session
            .uid_fetch(uid.to_string(), "RFC822")
            .await
            .map_err(|e| MailError::Protocol(format!("FETCH failed: {}", e)))?
            .try_collect()
            .await
            .map_err(|e| MailError::Protocol(format!("FETCH failed: {}", e)))?;

        Ok(fetches
            .iter()
            .find(|f| f.uid == Some(uid))
            .or_else(|| fetches.first())
            .and_then(|f| f.body())
            .map(|body| body.to_vec()))
    }
}
