//! A single authenticated SSH connection to a node, used to open direct-tcpip channels
//! bridging to the node's Docker socket and to SFTP the helper agent binary into place.

use std::sync::Arc;

use russh::client::{self, Handle};
use russh_keys::key;
use tracing::{debug, warn};

use crate::model::SshEndpoint;
use crate::transport::TransportError;

pub(super) struct NoopHandler;

#[async_trait::async_trait]
impl client::Handler for NoopHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &key::PublicKey,
    ) -> Result<bool, Self::Error> {
        // Node SSH host keys are pinned out-of-band (fingerprint stored on the `Node`
        // record); the transport layer itself trusts whatever key it is handed.
        Ok(true)
    }
}

/// An authenticated SSH handle to one node, kept alive for the duration of a tunnel.
///
/// `russh`'s [`Handle`] is a lightweight sender onto the connection's background task, so
/// it is cheaply [`Clone`]; each bridged tunnel connection gets its own cloned handle to
/// open a channel on, rather than serializing channel opens behind a shared borrow.
pub struct SshSession {
    handle: Handle<NoopHandler>,
}

impl SshSession {
    /// Connects to `endpoint` and authenticates with `private_key` (decrypted OpenSSH
    /// private key bytes).
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Ssh`] if the TCP connection, handshake, or key
    /// authentication fails.
    pub async fn connect(endpoint: &SshEndpoint, private_key: &[u8]) -> Result<Self, TransportError> {
        let config = Arc::new(client::Config::default());
        let address = (endpoint.host.as_str(), endpoint.port);

        debug!(host = %endpoint.host, port = endpoint.port, "opening ssh connection");
        let mut handle = client::connect(config, address, NoopHandler)
            .await
            .map_err(|e| TransportError::Ssh(format!("connect to {}:{}: {e}", endpoint.host, endpoint.port)))?;

        let key_pair = russh_keys::decode_secret_key(
            std::str::from_utf8(private_key)
                .map_err(|e| TransportError::Ssh(format!("private key is not valid utf-8: {e}")))?,
            None,
        )
        .map_err(|e| TransportError::Ssh(format!("decoding private key: {e}")))?;

        let authenticated = handle
            .authenticate_publickey(&endpoint.user, Arc::new(key_pair))
            .await
            .map_err(|e| TransportError::Ssh(format!("authentication transport error: {e}")))?;

        if !authenticated {
            warn!(host = %endpoint.host, user = %endpoint.user, "ssh publickey authentication rejected");
            return Err(TransportError::Ssh(format!(
                "publickey authentication rejected for {}@{}",
                endpoint.user, endpoint.host
            )));
        }

        Ok(Self { handle })
    }

    /// Returns a cloned client handle, used by [`super::tunnel::Tunnel`] to open one
    /// direct-streamlocal channel per bridged connection without sharing a borrow across
    /// spawned tasks.
    pub(super) fn handle(&self) -> Handle<NoopHandler> {
        self.handle.clone()
    }
}
