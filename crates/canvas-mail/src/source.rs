use async_trait::async_trait;

use crate::error::MailError;

/// A mailbox the ingestor can enumerate and fetch from.
///
/// Enumeration is driven by the server's unseen flag; fetching a message
/// may mark it seen as a server-side effect.
#[async_trait]
pub trait MailSource: Send {
    /// Server-assigned identifiers of messages currently flagged unseen.
    async fn unseen_uids(&mut self) -> Result<Vec<u32>, MailError>;

    /// Full RFC 822 bytes of a message, or `None` if the server no longer
    /// has it.
    async fn fetch_raw(&mut self, uid: u32) -> Result<Option<Vec<u8>>, MailError>;
}
