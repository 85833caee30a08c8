use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use log::{debug, info, warn};

use crate::{error::CheckpointErr, snapshot::ModelSnapshot};

const CACHE_DIR: &str = "_supervised";
const DOMAINS_DIR: &str = "_domains";
const LOCK_FILE: &str = ".lock";

/// The on disk cache of a single domain's local model.
///
/// Opening it takes an exclusive lock file in the domain's directory, which is removed
/// once the `Checkpoint` is dropped.
#[derive(Debug)]
pub struct Checkpoint {
    domain: String,
    algorithm: String,
    file: PathBuf,
    lock: PathBuf,
}

impl Checkpoint {
    /// Opens the cache of a domain, creating its directory if needed.
    ///
    /// # Arguments
    /// * `root` - The root of the node's cache.
    /// * `domain` - The domain whose model is cached.
    /// * `algorithm` - The name of the algorithm, part of the file name.
    ///
    /// # Returns
    /// The checkpoint or `Locked` if another process holds the directory.
    pub fn open(root: &Path, domain: &str, algorithm: &str) -> Result<Self, CheckpointErr> {
        let dir = root.join(CACHE_DIR).join(DOMAINS_DIR).join(domain);
        fs::create_dir_all(&dir)?;

        let lock = dir.join(LOCK_FILE);
        match OpenOptions::new().write(true).create_new(true).open(&lock) {
            Ok(mut file) => writeln!(file, "{}", std::process::id())?,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(CheckpointErr::Locked { path: lock });
            }
            Err(e) => return Err(e.into()),
        }

        let file = dir.join(format!("{algorithm}.model"));
        debug!(domain = domain; "opened model cache at {}", file.display());
        Ok(Self {
            domain: domain.to_string(),
            algorithm: algorithm.to_string(),
            file,
            lock,
        })
    }

    pub fn path(&self) -> &Path {
        &self.file
    }

    /// Reads the cached model.
    ///
    /// # Returns
    /// The cached snapshot, `None` if nothing was cached yet or `Corrupted` if it can't
    /// be decoded or belongs to another domain or algorithm.
    pub fn load(&self) -> Result<Option<ModelSnapshot>, CheckpointErr> {
        let bytes = match fs::read(&self.file) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if bytes.is_empty() {
            return Ok(None);
        }

        let snapshot: ModelSnapshot =
            serde_json::from_slice(&bytes).map_err(|e| CheckpointErr::Corrupted {
                path: self.file.clone(),
                reason: e.to_string(),
            })?;

        if snapshot.domain() != self.domain || snapshot.algorithm() != self.algorithm {
            return Err(CheckpointErr::Corrupted {
                path: self.file.clone(),
                reason: format!(
                    "cached {} model of domain {}",
                    snapshot.algorithm(),
                    snapshot.domain()
                ),
            });
        }

        info!(domain = snapshot.domain(); "loaded cached model {}", snapshot.id());
        Ok(Some(snapshot))
    }

    /// Writes a snapshot, replacing the cached one.
    ///
    /// The file is written next to the cache and renamed over it, a crash never
    /// leaves a truncated model behind.
    pub fn save(&self, snapshot: &ModelSnapshot) -> Result<(), CheckpointErr> {
        let bytes = serde_json::to_vec(snapshot).map_err(io::Error::other)?;
        let tmp = self.file.with_extension("model.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.file)?;

        debug!(domain = snapshot.domain(); "cached model {}", snapshot.id());
        Ok(())
    }
}

impl Drop for Checkpoint {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.lock) {
            warn!("failed to release cache lock {}: {e}", self.lock.display());
        }
    }
}
