//! Helper-agent bootstrap: on first contact with a remote node, upload the
//! architecture-matched agent binary via SFTP, make it executable, and spawn it detached
//! bound to a Unix socket, so [`super::tunnel::Tunnel`] has something to bridge to.
//!
//! Embedding the actual binary bytes (`include_bytes!`) is the embedding binary's job, not
//! this crate's — `hoster-core` only knows how to ship whichever slice it is handed.

use russh_sftp::client::SftpSession;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::model::NodeArch;
use crate::transport::TransportError;

use super::session::SshSession;

/// Compiled helper-agent binaries for the two architectures hoster-core supports,
/// supplied by the embedding binary at [`crate::transport::NodePool`] construction time.
#[derive(Debug, Clone, Copy)]
pub struct HelperAgentBinaries {
    /// amd64 (x86-64) Linux build.
    pub amd64: &'static [u8],
    /// arm64 (aarch64) Linux build.
    pub arm64: &'static [u8],
}

/// Remote path the helper agent binary is uploaded to.
pub const REMOTE_AGENT_PATH: &str = "/tmp/hoster-minion";

/// Remote Unix socket path the helper agent is asked to bind to.
pub const REMOTE_AGENT_SOCKET: &str = "/tmp/hoster-minion.sock";

/// How many 200ms polls the remote bootstrap command waits for the socket to appear.
const READY_POLL_ATTEMPTS: u32 = 50;

/// Selects the binary slice matching `arch`.
///
/// # Errors
///
/// Never fails today (every [`NodeArch`] variant has a corresponding field), but returns a
/// `Result` so adding an architecture [`HelperAgentBinaries`] does not support later is not
/// a breaking change for callers.
pub fn select_helper_agent_binary(
    arch: NodeArch,
    binaries: &HelperAgentBinaries,
) -> Result<&'static [u8], TransportError> {
    match arch {
        NodeArch::Amd64 => Ok(binaries.amd64),
        NodeArch::Arm64 => Ok(binaries.arm64),
    }
}

/// Uploads the architecture-matched helper agent to `session`'s remote host, starts it
/// detached bound to [`REMOTE_AGENT_SOCKET`], and waits for the socket to appear.
///
/// Returns the remote socket path the caller should bridge a tunnel to.
///
/// # Errors
///
/// Returns [`TransportError::AgentBootstrap`] if the SFTP upload, permission change, or
/// spawn-and-wait step fails or times out.
pub async fn bootstrap(
    session: &SshSession,
    arch: NodeArch,
    binaries: &HelperAgentBinaries,
    docker_socket_path: &str,
) -> Result<String, TransportError> {
    let binary = select_helper_agent_binary(arch, binaries)?;

    upload_binary(session, binary).await?;
    make_executable(session).await?;
    spawn_and_wait_for_socket(session, docker_socket_path).await?;

    debug!(socket = REMOTE_AGENT_SOCKET, "helper agent bootstrapped");
    Ok(REMOTE_AGENT_SOCKET.to_string())
}

async fn upload_binary(session: &SshSession, binary: &[u8]) -> Result<(), TransportError> {
    let mut channel = session
        .handle()
        .channel_open_session()
        .await
        .map_err(|e| TransportError::AgentBootstrap(format!("opening sftp channel: {e}")))?;

    channel
        .request_subsystem(true, "sftp")
        .await
        .map_err(|e| TransportError::AgentBootstrap(format!("requesting sftp subsystem: {e}")))?;

    let sftp = SftpSession::new(channel.into_stream())
        .await
        .map_err(|e| TransportError::AgentBootstrap(format!("starting sftp session: {e}")))?;

    let mut file = sftp
        .create(REMOTE_AGENT_PATH)
        .await
        .map_err(|e| TransportError::AgentBootstrap(format!("creating remote agent file: {e}")))?;
    file.write_all(binary)
        .await
        .map_err(|e| TransportError::AgentBootstrap(format!("uploading agent binary: {e}")))?;
    file.shutdown()
        .await
        .map_err(|e| TransportError::AgentBootstrap(format!("closing remote agent file: {e}")))?;

    Ok(())
}

async fn make_executable(session: &SshSession) -> Result<(), TransportError> {
    let status = exec(session, &format!("chmod +x {REMOTE_AGENT_PATH}")).await?;
    if status != 0 {
        return Err(TransportError::AgentBootstrap(format!(
            "chmod +x exited with status {status}"
        )));
    }
    Ok(())
}

async fn spawn_and_wait_for_socket(
    session: &SshSession,
    docker_socket_path: &str,
) -> Result<(), TransportError> {
    let command = format!(
        "rm -f {socket}; nohup {bin} --listen {socket} --docker-socket {docker_socket} \
         >/tmp/hoster-minion.log 2>&1 & disown; \
         for i in $(seq 1 {attempts}); do test -S {socket} && exit 0; sleep 0.2; done; exit 1",
        bin = REMOTE_AGENT_PATH,
        socket = REMOTE_AGENT_SOCKET,
        docker_socket = docker_socket_path,
        attempts = READY_POLL_ATTEMPTS,
    );
    let status = exec(session, &command).await?;
    if status != 0 {
        return Err(TransportError::AgentBootstrap(format!(
            "agent did not bind {REMOTE_AGENT_SOCKET} in time (exit {status})"
        )));
    }
    Ok(())
}

/// Runs one shell command over an exec channel and returns its exit status, discarding
/// output (bootstrap commands are diagnosed via the remote log file, not stdout).
async fn exec(session: &SshSession, command: &str) -> Result<u32, TransportError> {
    use russh::ChannelMsg;

    let mut channel = session
        .handle()
        .channel_open_session()
        .await
        .map_err(|e| TransportError::AgentBootstrap(format!("opening exec channel: {e}")))?;

    channel
        .exec(true, command)
        .await
        .map_err(|e| TransportError::AgentBootstrap(format!("requesting exec: {e}")))?;

    let mut exit_status = None;
    while let Some(msg) = channel.wait().await {
        match msg {
            ChannelMsg::ExitStatus { exit_status: status } => {
                exit_status = Some(status);
            }
            ChannelMsg::Eof | ChannelMsg::Close => break,
            ChannelMsg::Data { .. } | ChannelMsg::ExtendedData { .. } => {}
            other => {
                warn!(?other, "unexpected channel message during helper agent bootstrap exec");
            }
        }
    }

    exit_status.ok_or_else(|| {
        TransportError::AgentBootstrap(format!("command '{command}' closed without an exit status"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_matching_architecture() {
        let binaries = HelperAgentBinaries {
            amd64: b"amd64-binary",
            arm64: b"arm64-binary",
        };
        assert_eq!(
            select_helper_agent_binary(NodeArch::Amd64, &binaries).unwrap(),
            b"amd64-binary"
        );
        assert_eq!(
            select_helper_agent_binary(NodeArch::Arm64, &binaries).unwrap(),
            b"arm64-binary"
        );
    }
}
