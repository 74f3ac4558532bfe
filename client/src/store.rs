// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Durable single-slot token persistence.
//!
//! One file per site identifier, named `.sb_token_<site>`, containing the
//! token bytes as a JSON array of integers. The layout round-trips
//! byte-for-byte and carries no other metadata (no expiry, no issuer key
//! version); a documented limitation of the current format.
//!
//! Writes go through a temp file and an atomic rename, so a reader in this
//! or another process never observes a half-written file as valid.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use scopeblind_crypto::Token;
use tracing::debug;

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt; // for mode 0o600

/// Persistence failure. Reported, never silently swallowed.
#[derive(Debug)]
pub enum StoreError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    InvalidSite(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io { path, source } => {
                write!(f, "token store I/O failure at {}: {}", path.display(), source)
            }
            StoreError::Corrupt { path, source } => {
                write!(f, "token file {} is not valid: {}", path.display(), source)
            }
            StoreError::InvalidSite(site) => {
                write!(f, "site identifier '{}' is not storable", site)
            }
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io { source, .. } => Some(source),
            StoreError::Corrupt { source, .. } => Some(source),
            StoreError::InvalidSite(_) => None,
        }
    }
}

pub struct TokenStore {
    dir: PathBuf,
}

impl TokenStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, site: &str) -> Result<PathBuf, StoreError> {
        // The site identifier becomes part of a file name; restrict it to a
        // safe alphabet rather than trying to escape it.
        let safe = !site.is_empty()
            && site
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && site != "."
            && site != "..";
        if !safe {
            return Err(StoreError::InvalidSite(site.to_string()));
        }
        Ok(self.dir.join(format!(".sb_token_{}", site)))
    }

    /// Load the token for `site`, or `None` if never persisted.
    pub fn load(&self, site: &str) -> Result<Option<Token>, StoreError> {
        let path = self.path_for(site)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Io { path, source: e }),
        };
        let token_bytes: Vec<u8> =
            serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
                path: path.clone(),
                source: e,
            })?;
        debug!(site = %site, "token loaded from disk");
        Ok(Some(Token::new(token_bytes)))
    }

    /// Persist the token for `site`, replacing any previous one atomically.
    pub fn save(&self, site: &str, token: &Token) -> Result<(), StoreError> {
        let path = self.path_for(site)?;
        fs::create_dir_all(&self.dir).map_err(|e| StoreError::Io {
            path: self.dir.clone(),
            source: e,
        })?;

        let body = serde_json::to_vec(token.as_bytes()).map_err(|e| StoreError::Corrupt {
            path: path.clone(),
            source: e,
        })?;
        atomic_write(&path, &body).map_err(|e| StoreError::Io {
            path: path.clone(),
            source: e,
        })?;
        debug!(site = %site, "token persisted");
        Ok(())
    }

    /// Remove the stored token for `site`; absent files are fine.
    pub fn remove(&self, site: &str) -> Result<(), StoreError> {
        let path = self.path_for(site)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io { path, source: e }),
        }
    }
}

/// Write via temp file + rename; 0o600 where the platform supports it.
fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    #[cfg(unix)]
    {
        let mut f = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&tmp)?;
        f.write_all(data)?;
        f.sync_all()?;
    }

    #[cfg(not(unix))]
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(data)?;
        f.sync_all()?;
    }

    fs::rename(&tmp, path)?;
    Ok(())
}
