//! Bridges a local TCP listener to a node's remote Docker Unix socket over an
//! `direct-streamlocal@openssh.com` SSH channel, so [`LocalDockerClient`] can point
//! `DOCKER_HOST` at a plain `tcp://127.0.0.1:PORT` regardless of where the daemon lives.
//!
//! [`LocalDockerClient`]: crate::transport::LocalDockerClient

use std::net::SocketAddr;

use russh::client::Handle;
use tokio::net::TcpListener;
use tracing::{debug, warn};

use crate::model::{NodeArch, SshEndpoint, SshKey};
use crate::transport::TransportError;

use super::agent::{bootstrap, HelperAgentBinaries};
use super::key::decrypt_private_key;
use super::session::{NoopHandler, SshSession};

/// A live bridge from a local address to one node's remote Docker socket.
///
/// Dropping the tunnel stops the background accept loop and closes the SSH session.
pub struct Tunnel {
    local_addr: SocketAddr,
    _session: SshSession,
    accept_task: tokio::task::JoinHandle<()>,
}

impl Tunnel {
    /// Opens an SSH session to `endpoint`, decrypts `key` with the process-wide encryption
    /// key, bootstraps the architecture-matched helper agent from `binaries` onto the
    /// remote host (uploading it only if this is the first contact; the agent itself
    /// refuses to rebind an already-listening socket), and starts bridging a freshly bound
    /// loopback port to the agent's Unix socket.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Ssh`] if the session cannot be established,
    /// [`TransportError::AgentBootstrap`] if the helper agent cannot be uploaded or started,
    /// or [`TransportError::Io`] if a local listener cannot be bound.
    pub async fn open(
        endpoint: &SshEndpoint,
        key: &SshKey,
        arch: NodeArch,
        binaries: &HelperAgentBinaries,
        docker_socket_path: &str,
    ) -> Result<Self, TransportError> {
        let encryption_key = crate::config::HosterConfig::from_env()
            .ok()
            .and_then(|c| c.encryption_key)
            .ok_or_else(|| TransportError::KeyDecryption("no encryption key configured".to_string()))?;

        let private_key = decrypt_private_key(&encryption_key, &key.encrypted_private_key)?;
        let session = SshSession::connect(endpoint, &private_key).await?;

        let remote_socket_path = bootstrap(&session, arch, binaries, docker_socket_path).await?;

        let listener = TcpListener::bind(("127.0.0.1", 0))
            .await
            .map_err(|e| TransportError::Io(format!("binding local tunnel listener: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| TransportError::Io(format!("reading local tunnel listener address: {e}")))?;

        debug!(local_addr = %local_addr, remote_socket_path, "tunnel established");

        let handle = session.handle();
        let accept_task = tokio::spawn(accept_loop(listener, handle, remote_socket_path));

        Ok(Self {
            local_addr,
            _session: session,
            accept_task,
        })
    }

    /// The local `host:port` other processes (the `docker` CLI via `DOCKER_HOST`) should
    /// connect to in order to reach the remote Docker socket.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for Tunnel {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn accept_loop(listener: TcpListener, handle: Handle<NoopHandler>, remote_socket_path: String) {
    loop {
        let (stream, _peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "tunnel listener accept failed");
                continue;
            }
        };
        let handle = handle.clone();
        let remote_socket_path = remote_socket_path.clone();
        tokio::spawn(async move {
            if let Err(e) = bridge_one_connection(stream, &handle, &remote_socket_path).await {
                warn!(error = %e, "tunnel connection bridging failed");
            }
        });
    }
}

/// Opens one `direct-streamlocal@openssh.com` channel against the remote Docker socket and
/// pumps bytes between it and the freshly accepted local connection until either side
/// closes. Each connection gets its own channel; `handle` is a cheap clone of the shared
/// session's sender so no borrow of `SshSession` needs to cross the spawned task boundary.
async fn bridge_one_connection(
    mut local: tokio::net::TcpStream,
    handle: &Handle<NoopHandler>,
    remote_socket_path: &str,
) -> Result<(), TransportError> {
    let channel = handle
        .channel_open_direct_streamlocal(remote_socket_path)
        .await
        .map_err(|e| TransportError::Ssh(format!("opening direct-streamlocal channel to {remote_socket_path}: {e}")))?;

    let mut remote = channel.into_stream();

    tokio::io::copy_bidirectional(&mut local, &mut remote)
        .await
        .map_err(|e| TransportError::Io(format!("bridging tunnel connection: {e}")))?;

    Ok(())
}
