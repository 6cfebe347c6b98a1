//! Connectivity collaborator — article store sessions
//!
//! The pipeline fetches through the [`Connector`]/[`Session`] seam so tests
//! can run it against in-memory fakes. The production implementation wraps
//! nntp-rs: one authenticated [`nntp_rs::NntpClient`] per connection slot,
//! never shared between workers.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::error::{Error, Result};

/// Opens independent sessions to the article store.
///
/// Each connection slot calls [`Connector::connect`] once (plus retries) and
/// owns the returned session exclusively for the rest of the pass.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    /// Establish one new session.
    async fn connect(&self) -> Result<Box<dyn Session>>;
}

/// One leased connection to the article store.
///
/// Sessions close on drop. Implementations must support many concurrent
/// independent instances.
#[async_trait::async_trait]
pub trait Session: Send {
    /// Fetch the raw body of the article with the given message identifier
    /// (without angle brackets).
    async fn fetch(&mut self, message_id: &str) -> Result<Vec<u8>>;
}

/// Production [`Connector`] backed by nntp-rs.
pub struct NntpConnector {
    server: Arc<nntp_rs::ServerConfig>,
    authenticate: bool,
}

impl NntpConnector {
    /// Create a connector for the given server configuration.
    pub fn new(config: ServerConfig) -> Self {
        let authenticate = config.username.is_some();
        Self {
            server: Arc::new(config.into()),
            authenticate,
        }
    }
}

#[async_trait::async_trait]
impl Connector for NntpConnector {
    async fn connect(&self) -> Result<Box<dyn Session>> {
        let mut client = nntp_rs::NntpClient::connect(Arc::clone(&self.server))
            .await
            .map_err(|e| Error::Nntp(format!("connect failed: {e}")))?;

        if self.authenticate {
            client
                .authenticate()
                .await
                .map_err(|e| Error::Nntp(format!("authentication failed: {e}")))?;
        }

        Ok(Box::new(NntpSession { client }))
    }
}

/// Production [`Session`] over a single NNTP client connection.
struct NntpSession {
    client: nntp_rs::NntpClient,
}

#[async_trait::async_trait]
impl Session for NntpSession {
    async fn fetch(&mut self, message_id: &str) -> Result<Vec<u8>> {
        // The store expects angle-bracketed identifiers on the wire.
        let wire_id = if message_id.starts_with('<') {
            message_id.to_string()
        } else {
            format!("<{message_id}>")
        };

        let response = self
            .client
            .fetch_article_binary(&wire_id)
            .await
            .map_err(|e| Error::Nntp(e.to_string()))?;

        Ok(response.data)
    }
}
