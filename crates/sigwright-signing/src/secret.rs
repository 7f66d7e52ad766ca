//! Decoded key material and its destruction
//!
//! Key material arrives base64-encoded from configuration. It is decoded in
//! memory, written to a file inside a private per-invocation scratch
//! directory, restricted to owner-read, and shredded when the owning
//! [`SecretScope`] is cleaned up or dropped.

use std::fs::{self, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use base64::Engine;
use rand::RngCore;
use tempfile::TempDir;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::error::{Result, SecretError};

/// Mode applied right after the decoded key is written
pub const KEY_FILE_MODE: u32 = 0o400;

/// Overwrite passes before removal: zeros, ones, random
const SHRED_PASSES: usize = 3;

/// Which half of the key pair is being materialized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Private,
    Public,
}

impl KeyKind {
    fn file_name(&self) -> &'static str {
        match self {
            Self::Private => "cosign.key",
            Self::Public => "cosign.pub",
        }
    }
}

/// Decoded key on disk plus its password
pub struct KeyMaterial {
    encoded: Zeroizing<String>,
    path: PathBuf,
    kind: KeyKind,
    permissions: u32,
    password: Option<Zeroizing<String>>,
}

impl KeyMaterial {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> KeyKind {
        self.kind
    }

    pub fn permissions(&self) -> u32 {
        self.permissions
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref().map(String::as_str)
    }

    /// Length of the encoded input, for diagnostics only
    pub fn encoded_len(&self) -> usize {
        self.encoded.len()
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("path", &self.path)
            .field("kind", &self.kind)
            .field("permissions", &format_args!("{:o}", self.permissions))
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Owner of all decoded secret files for one invocation.
///
/// Cleanup runs on [`SecretScope::cleanup`] and again (as a no-op) on drop,
/// so every exit path, including `?` returns and dropped futures, shreds
/// the files.
pub struct SecretScope {
    dir: Option<TempDir>,
    written: Vec<PathBuf>,
    material: Option<KeyMaterial>,
}

impl SecretScope {
    /// Create a scope with a fresh scratch directory under the system temp dir
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("sigwright-")
            .tempdir()
            .map_err(SecretError::Scratch)?;
        Self::with_dir(dir)
    }

    /// Create a scope whose scratch directory lives under `parent`
    pub fn new_in(parent: &Path) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(".sigwright-")
            .tempdir_in(parent)
            .map_err(SecretError::Scratch)?;
        Self::with_dir(dir)
    }

    fn with_dir(dir: TempDir) -> Result<Self> {
        restrict_dir(dir.path()).map_err(SecretError::Scratch)?;
        debug!(dir = %dir.path().display(), "created secret scope");
        Ok(Self {
            dir: Some(dir),
            written: Vec::new(),
            material: None,
        })
    }

    /// Scratch directory, until cleanup
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_ref().map(|d| d.path())
    }

    pub fn material(&self) -> Option<&KeyMaterial> {
        self.material.as_ref()
    }

    /// Decode `encoded` and write it to an owner-read-only file.
    ///
    /// `variable` names where the value came from, for diagnostics. The
    /// encoded value and password are moved in so the caller keeps no copy.
    pub fn materialize(
        &mut self,
        variable: &str,
        encoded: Zeroizing<String>,
        kind: KeyKind,
        password: Option<Zeroizing<String>>,
    ) -> Result<&KeyMaterial> {
        let decoded = decode(variable, &encoded)?;

        let dir = self.dir().ok_or_else(|| {
            SecretError::Scratch(io::Error::new(
                io::ErrorKind::NotFound,
                "secret scope has already been cleaned up",
            ))
        })?;
        let path = dir.join(kind.file_name());

        self.written.push(path.clone());
        write_restricted(&path, &decoded).map_err(|source| SecretError::Materialize {
            path: path.clone(),
            source,
        })?;

        info!(path = %path.display(), kind = ?kind, "materialized key");
        Ok(self.material.insert(KeyMaterial {
            encoded,
            path,
            kind,
            permissions: KEY_FILE_MODE,
            password,
        }))
    }

    /// Shred every written file, clear in-memory copies and remove the
    /// scratch directory. Safe to call repeatedly.
    pub fn cleanup(&mut self) -> io::Result<()> {
        let mut first_error = None;

        for path in self.written.drain(..) {
            if let Err(e) = shred(&path) {
                warn!(path = %path.display(), error = %e, "failed to shred secret file");
                first_error.get_or_insert(e);
            }
        }

        // Zeroizing buffers clear themselves on drop
        self.material = None;

        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            match dir.close() {
                Ok(()) => debug!(dir = %path.display(), "removed secret scope"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for SecretScope {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            warn!(error = %e, "secret cleanup incomplete");
        }
    }
}

/// Decode base64 key material, tolerating wrapped lines and padding whitespace
fn decode(variable: &str, encoded: &str) -> Result<Zeroizing<Vec<u8>>> {
    let compact: Zeroizing<String> =
        Zeroizing::new(encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect());

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map(Zeroizing::new)
        .map_err(|e| SecretError::Undecodable {
            variable: variable.to_string(),
            reason: e.to_string(),
        })?;

    if decoded.is_empty() {
        return Err(SecretError::Empty {
            variable: variable.to_string(),
        }
        .into());
    }

    Ok(decoded)
}

#[cfg(unix)]
fn restrict_dir(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o700))
}

#[cfg(not(unix))]
fn restrict_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn write_restricted(path: &Path, bytes: &[u8]) -> io::Result<()> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    fs::set_permissions(path, fs::Permissions::from_mode(KEY_FILE_MODE))
}

#[cfg(not(unix))]
fn write_restricted(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    let mut perms = fs::metadata(path)?.permissions();
    perms.set_readonly(true);
    fs::set_permissions(path, perms)
}

#[cfg(unix)]
fn make_writable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn make_writable(path: &Path) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_readonly(false);
    fs::set_permissions(path, perms)
}

/// Overwrite the file in place, then remove it. A missing file is success.
fn shred(path: &Path) -> io::Result<()> {
    let len = match fs::metadata(path) {
        Ok(meta) => meta.len() as usize,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    make_writable(path)?;
    let mut file = OpenOptions::new().write(true).open(path)?;
    let mut buf = Zeroizing::new(vec![0u8; len]);

    for pass in 0..SHRED_PASSES {
        match pass {
            0 => buf.fill(0x00),
            1 => buf.fill(0xFF),
            _ => rand::thread_rng().fill_bytes(&mut buf),
        }
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&buf)?;
        file.sync_all()?;
    }
    drop(file);

    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => {
            debug!(path = %path.display(), passes = SHRED_PASSES, "shredded secret file");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SigningError;
    use tempfile::TempDir;

    fn encode(bytes: &[u8]) -> Zeroizing<String> {
        Zeroizing::new(base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    #[test]
    fn test_materialize_writes_decoded_bytes() {
        let parent = TempDir::new().unwrap();
        let mut scope = SecretScope::new_in(parent.path()).unwrap();

        let material = scope
            .materialize("KEY", encode(b"-----BEGIN KEY-----"), KeyKind::Private, None)
            .unwrap();
        let path = material.path().to_path_buf();

        assert_eq!(fs::read(&path).unwrap(), b"-----BEGIN KEY-----");
        assert_eq!(path.file_name().unwrap(), "cosign.key");
    }

    #[cfg(unix)]
    #[test]
    fn test_materialized_file_is_owner_read_only() {
        use std::os::unix::fs::PermissionsExt;

        let parent = TempDir::new().unwrap();
        let mut scope = SecretScope::new_in(parent.path()).unwrap();
        let path = scope
            .materialize("KEY", encode(b"key"), KeyKind::Public, None)
            .unwrap()
            .path()
            .to_path_buf();

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, KEY_FILE_MODE);
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        let parent = TempDir::new().unwrap();
        let mut scope = SecretScope::new_in(parent.path()).unwrap();
        let path = scope
            .materialize(
                "KEY",
                encode(b"key"),
                KeyKind::Private,
                Some(Zeroizing::new("hunter2".to_string())),
            )
            .unwrap()
            .path()
            .to_path_buf();

        scope.cleanup().unwrap();
        scope.cleanup().unwrap();

        assert!(!path.exists());
        assert!(scope.material().is_none());
        assert!(scope.dir().is_none());
        assert_eq!(fs::read_dir(parent.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_cleanup_tolerates_missing_file() {
        let parent = TempDir::new().unwrap();
        let mut scope = SecretScope::new_in(parent.path()).unwrap();
        let path = scope
            .materialize("KEY", encode(b"key"), KeyKind::Private, None)
            .unwrap()
            .path()
            .to_path_buf();

        make_writable(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert!(scope.cleanup().is_ok());
    }

    #[test]
    fn test_invalid_base64_leaves_nothing_behind() {
        let parent = TempDir::new().unwrap();
        let err = {
            let mut scope = SecretScope::new_in(parent.path()).unwrap();
            scope
                .materialize(
                    "KEY",
                    Zeroizing::new("not*base64!".to_string()),
                    KeyKind::Private,
                    None,
                )
                .unwrap_err()
        };

        assert!(matches!(
            err,
            SigningError::Secret(SecretError::Undecodable { .. })
        ));
        assert_eq!(fs::read_dir(parent.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_empty_after_decode_is_distinct() {
        let parent = TempDir::new().unwrap();
        let mut scope = SecretScope::new_in(parent.path()).unwrap();
        let err = scope
            .materialize("KEY", Zeroizing::new("  \n".to_string()), KeyKind::Private, None)
            .unwrap_err();
        assert!(matches!(err, SigningError::Secret(SecretError::Empty { .. })));
    }

    #[test]
    fn test_wrapped_base64_is_accepted() {
        let parent = TempDir::new().unwrap();
        let mut scope = SecretScope::new_in(parent.path()).unwrap();
        let mut wrapped = encode(b"a longer key body that wraps").to_string();
        wrapped.insert(8, '\n');
        wrapped.push('\n');

        let material = scope
            .materialize("KEY", Zeroizing::new(wrapped), KeyKind::Private, None)
            .unwrap();
        assert_eq!(fs::read(material.path()).unwrap(), b"a longer key body that wraps");
    }

    #[test]
    fn test_drop_shreds() {
        let parent = TempDir::new().unwrap();
        let path = {
            let mut scope = SecretScope::new_in(parent.path()).unwrap();
            scope
                .materialize("KEY", encode(b"key"), KeyKind::Private, None)
                .unwrap()
                .path()
                .to_path_buf()
        };
        assert!(!path.exists());
        assert_eq!(fs::read_dir(parent.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_debug_redacts_password() {
        let parent = TempDir::new().unwrap();
        let mut scope = SecretScope::new_in(parent.path()).unwrap();
        let material = scope
            .materialize(
                "KEY",
                encode(b"key"),
                KeyKind::Private,
                Some(Zeroizing::new("hunter2".to_string())),
            )
            .unwrap();
        let debug = format!("{:?}", material);
        assert!(!debug.contains("hunter2"));
        assert_eq!(material.password(), Some("hunter2"));
    }
}
