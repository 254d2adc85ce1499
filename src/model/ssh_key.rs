//! Stored SSH key material, encrypted at rest.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An SSH private key, encrypted with AES-256-GCM, shared by weak reference across every
/// node owned by the same creator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshKey {
    /// Stable reference id.
    pub id: Uuid,
    /// Id of the user who owns this key.
    pub creator_id: Uuid,
    /// Human-readable label.
    pub name: String,
    /// AES-256-GCM ciphertext: 12-byte nonce prefix followed by the sealed private key bytes.
    pub encrypted_private_key: Vec<u8>,
    /// SHA-256 fingerprint of the plaintext public key material, safe to expose.
    pub fingerprint: String,
}
