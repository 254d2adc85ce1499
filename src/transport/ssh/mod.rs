//! SSH transport: key-at-rest encryption, session establishment, and the tunnel that
//! bridges a node's remote Docker socket to a local TCP listener so [`LocalDockerClient`]
//! can talk to it unmodified.
//!
//! [`LocalDockerClient`]: super::LocalDockerClient

mod agent;
mod key;
mod session;
mod tunnel;

pub use agent::{bootstrap as bootstrap_helper_agent, select_helper_agent_binary, HelperAgentBinaries};
pub use key::{decrypt_private_key, encrypt_private_key, fingerprint};
pub use session::SshSession;
pub use tunnel::Tunnel;
