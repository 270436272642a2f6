use std::path::Path;

use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use soulprint_core::error::SoulprintError;
use soulprint_core::time::now_iso8601;
use soulprint_core::types::Did;

/// A node (or agent) keypair: Ed25519 secret key with derived DID.
///
/// The secret key never leaves the owning process; on disk it exists only in
/// `node-identity.json` with owner-only permissions.
pub struct NodeKeypair {
    pub did: Did,
    signing: SigningKey,
}

/// On-disk form of the node identity.
#[derive(Serialize, Deserialize)]
struct IdentityFile {
    did: String,
    #[serde(rename = "privateKey")]
    private_key: String,
    created: String,
}

impl NodeKeypair {
    /// Generate a fresh Ed25519 keypair.
    pub fn generate() -> Self {
        let signing = SigningKey::generate(&mut OsRng);
        let did = Did::from_pubkey(signing.verifying_key().as_bytes());
        Self { did, signing }
    }

    /// Restore from the raw 32-byte secret key.
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        let signing = SigningKey::from_bytes(secret);
        let did = Did::from_pubkey(signing.verifying_key().as_bytes());
        Self { did, signing }
    }

    pub fn public_key(&self) -> [u8; 32] {
        *self.signing.verifying_key().as_bytes()
    }

    /// Sign raw bytes → 64-byte signature.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        crate::ed25519::sign(message, &self.signing)
    }

    /// Sign `sha256(canonical_json(payload))`, returning hex.
    pub fn sign_canonical<T: Serialize>(&self, payload: &T) -> Result<String, SoulprintError> {
        crate::ed25519::sign_canonical(payload, &self.signing)
    }

    /// Load the identity from `path`, or generate and persist a fresh one.
    pub fn load_or_create(path: &Path) -> Result<Self, SoulprintError> {
        if path.exists() {
            Self::load(path)
        } else {
            let kp = Self::generate();
            kp.save(path)?;
            Ok(kp)
        }
    }

    /// Load from a `node-identity.json` file.
    pub fn load(path: &Path) -> Result<Self, SoulprintError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| SoulprintError::Storage(format!("{}: {e}", path.display())))?;
        let file: IdentityFile =
            serde_json::from_str(&json).map_err(|e| SoulprintError::Serialization(e.to_string()))?;
        let bytes = Zeroizing::new(
            hex::decode(&file.private_key)
                .map_err(|e| SoulprintError::Serialization(e.to_string()))?,
        );
        let secret: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| SoulprintError::Serialization("private key must be 32 bytes".into()))?;
        let kp = Self::from_secret_bytes(&secret);
        if kp.did.as_str() != file.did {
            return Err(SoulprintError::InvalidDid(file.did));
        }
        Ok(kp)
    }

    /// Persist as `node-identity.json`, mode 0o600 on unix.
    pub fn save(&self, path: &Path) -> Result<(), SoulprintError> {
        let file = IdentityFile {
            did: self.did.to_string(),
            private_key: hex::encode(self.signing.to_bytes()),
            created: now_iso8601(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| SoulprintError::Serialization(e.to_string()))?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .map_err(|e| SoulprintError::Storage(format!("{}: {e}", dir.display())))?;
        }
        std::fs::write(path, json)
            .map_err(|e| SoulprintError::Storage(format!("{}: {e}", path.display())))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| SoulprintError::Storage(e.to_string()))?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for NodeKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NodeKeypair {{ did: {:?} }}", self.did)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_and_load_round_trip() {
        let dir = std::env::temp_dir().join(format!("soulprint_kp_{}", std::process::id()));
        let path = dir.join("node-identity.json");
        let kp = NodeKeypair::generate();
        kp.save(&path).unwrap();

        let loaded = NodeKeypair::load(&path).unwrap();
        assert_eq!(loaded.did, kp.did);
        assert_eq!(loaded.public_key(), kp.public_key());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn load_rejects_did_key_mismatch() {
        let dir = std::env::temp_dir().join(format!("soulprint_kpm_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("node-identity.json");
        let kp = NodeKeypair::generate();
        let other = NodeKeypair::generate();
        let json = serde_json::json!({
            "did": other.did.to_string(),
            "privateKey": hex::encode(kp.signing.to_bytes()),
            "created": "2026-01-01T00:00:00Z",
        });
        std::fs::write(&path, json.to_string()).unwrap();
        assert!(NodeKeypair::load(&path).is_err());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
