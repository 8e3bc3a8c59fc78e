//! Local node identity: keypair persistence and the node-info record
//! exchanged during the identity handshake.

use crate::error::Error;
use libp2p::identity::Keypair;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

/// Well-known filename a keypair is stored under inside a node's data
/// directory.
pub const NETWORK_KEY_FILE: &str = "network-key";

/// Storage for the node's long-lived network identity: an ed25519 `Keypair`
/// persisted as a raw protobuf-encoded secret, generated once and reused
/// afterwards.
pub trait SecretsManager: Send + Sync {
    fn has(&self, name: &str) -> bool;
    fn get(&self, name: &str) -> Result<Vec<u8>, Error>;
    fn set(&self, name: &str, data: &[u8]) -> Result<(), Error>;
}

/// Stores secrets as files under a directory, one file per name.
pub struct FileSecretsManager {
    dir: PathBuf,
}

impl FileSecretsManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

impl SecretsManager for FileSecretsManager {
    fn has(&self, name: &str) -> bool {
        self.path(name).is_file()
    }

    fn get(&self, name: &str) -> Result<Vec<u8>, Error> {
        fs::read(self.path(name)).map_err(|e| Error::Transport(format!("reading {name}: {e}")))
    }

    fn set(&self, name: &str, data: &[u8]) -> Result<(), Error> {
        if let Some(parent) = self.path(name).parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::Transport(format!("creating {:?}: {e}", parent)))?;
        }
        write_private(&self.path(name), data)
            .map_err(|e| Error::Transport(format!("writing {name}: {e}")))
    }
}

#[cfg(unix)]
fn write_private(path: &Path, data: &[u8]) -> io::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    use std::io::Write;
    file.write_all(data)
}

#[cfg(not(unix))]
fn write_private(path: &Path, data: &[u8]) -> io::Result<()> {
    fs::write(path, data)
}

/// Loads the persisted keypair from `secrets`, or generates and persists a
/// fresh ed25519 keypair if none exists yet.
pub fn load_or_generate_keypair(secrets: &dyn SecretsManager) -> Result<Keypair, Error> {
    if secrets.has(NETWORK_KEY_FILE) {
        let raw = secrets.get(NETWORK_KEY_FILE)?;
        return Keypair::from_protobuf_encoding(&raw)
            .map_err(|e| Error::Transport(format!("decoding stored network key: {e}")));
    }

    info!("no network key found, generating a new ed25519 identity");
    let keypair = Keypair::generate_ed25519();
    let encoded = keypair
        .to_protobuf_encoding()
        .map_err(|e| Error::Transport(format!("encoding new network key: {e}")))?;
    secrets.set(NETWORK_KEY_FILE, &encoded)?;
    Ok(keypair)
}

/// Supplies the local `NodeInfo` exchanged by the identity handshake
/// protocol. A thin wrapper so the handshake behaviour does not need direct
/// access to `Config`.
pub struct NodeInfoManager {
    node_info: crate::handshake::node_info::NodeInfo,
}

impl NodeInfoManager {
    pub fn new(network_id: String) -> Self {
        Self {
            node_info: crate::handshake::node_info::NodeInfo::new(network_id, None),
        }
    }

    pub fn get_node_info(&self) -> &crate::handshake::node_info::NodeInfo {
        &self.node_info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_and_persists_then_reloads_same_key() {
        let dir = std::env::temp_dir().join(format!("identity-test-{}", std::process::id()));
        let secrets = FileSecretsManager::new(&dir);
        let first = load_or_generate_keypair(&secrets).unwrap();
        let second = load_or_generate_keypair(&secrets).unwrap();
        assert_eq!(
            first.public().to_peer_id(),
            second.public().to_peer_id()
        );
        let _ = fs::remove_dir_all(&dir);
    }
}
