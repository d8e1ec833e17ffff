//! On-disk key lifecycle for the agent.
//!
//! One Ed25519 keypair per domain, persisted as PKCS#8 DER in a directory
//! the agent owns. Keys are generated on first use and reused on every run
//! after that; the public half is surfaced to the operator for out-of-band
//! registration on the server.

use std::fs;
use std::path::{Path, PathBuf};

use wellknown_auth::identity::{PrivateKey, PublicKey};

use crate::error::AgentError;

/// File written and removed again by the directory probe.
const PROBE_FILE: &str = "wellknown-probe.txt";

/// A key resolved for one domain.
pub struct LoadedKey {
    pub key: PrivateKey,
    /// True if the key was generated by this call; the caller must surface
    /// the public half to the operator for registration.
    pub newly_generated: bool,
}

/// Keystore rooted at a caller-supplied directory.
#[derive(Debug, Clone)]
pub struct KeyStore {
    dir: PathBuf,
}

impl KeyStore {
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory this store reads and writes.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Confirm the key directory exists and is usable.
    ///
    /// Performs a write, read, delete probe of a throwaway file; each step
    /// fails with its own message so the operator knows what to fix. The
    /// probe leaves no residue on success.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the path is not an existing directory;
    /// `StorageUnavailable` if any probe step fails.
    pub fn validate_directory(&self) -> Result<&Path, AgentError> {
        if !self.dir.is_dir() {
            return Err(AgentError::InvalidConfig(format!(
                "key directory {} does not exist or is not a directory",
                self.dir.display()
            )));
        }

        let probe = self.dir.join(PROBE_FILE);

        fs::write(&probe, b"probe").map_err(|err| {
            AgentError::StorageUnavailable(format!(
                "could not write file to {}: {err}",
                self.dir.display()
            ))
        })?;

        fs::read(&probe).map_err(|err| {
            AgentError::StorageUnavailable(format!(
                "could not read file from {}: {err}",
                self.dir.display()
            ))
        })?;

        fs::remove_file(&probe).map_err(|err| {
            AgentError::StorageUnavailable(format!(
                "could not remove file from {}: {err}",
                self.dir.display()
            ))
        })?;

        Ok(&self.dir)
    }

    /// Path of the key file for a domain.
    ///
    /// The file name is a deterministic transform of the domain with
    /// non-alphanumeric separators stripped, so `example.org` and
    /// `example-org` collide deliberately rather than multiplying keys
    /// over punctuation variants.
    #[must_use]
    pub fn key_path(&self, domain: &str) -> PathBuf {
        let stripped: String = domain.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
        self.dir.join(format!("wellknown_id_ed25519_{stripped}"))
    }

    /// Load the domain's persisted key, generating one if absent.
    ///
    /// # Errors
    ///
    /// - `MissingCredential` if no key exists and `non_interactive` is set
    /// - `CryptoFailure` if an existing key file does not parse (a corrupt
    ///   key is never silently overwritten)
    /// - `StorageUnavailable` if persisting a fresh key fails
    pub fn load_or_create(
        &self,
        domain: &str,
        non_interactive: bool,
    ) -> Result<LoadedKey, AgentError> {
        let path = self.key_path(domain);

        match fs::read(&path) {
            Ok(der) => {
                let key = PrivateKey::from_pkcs8_der(&der).map_err(|_| {
                    AgentError::CryptoFailure(format!(
                        "key file {} exists but is not valid PKCS#8",
                        path.display()
                    ))
                })?;
                Ok(LoadedKey {
                    key,
                    newly_generated: false,
                })
            }
            Err(_) if non_interactive => Err(AgentError::MissingCredential(format!(
                "no key for {domain} in {} and non-interactive mode prevents generating one",
                self.dir.display()
            ))),
            Err(_) => {
                let key = PrivateKey::generate();
                self.persist(&path, &key)?;
                Ok(LoadedKey {
                    key,
                    newly_generated: true,
                })
            }
        }
    }

    /// Write a fresh private key: temp file in the same directory, owner-only
    /// permissions, then rename into place so a crash never leaves a partial
    /// key file under the final name.
    fn persist(&self, path: &Path, key: &PrivateKey) -> Result<(), AgentError> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("key");
        let tmp = self.dir.join(format!(".{file_name}.tmp"));

        let write_err = |err: std::io::Error| {
            AgentError::StorageUnavailable(format!(
                "could not write private key to {}: {err}",
                self.dir.display()
            ))
        };

        let der = key.to_pkcs8_der();
        fs::write(&tmp, der.as_bytes()).map_err(write_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600)).map_err(write_err)?;
        }

        fs::rename(&tmp, path).map_err(write_err)?;
        Ok(())
    }
}

/// Operator-facing instructions printed when a fresh key was generated.
///
/// Registration happens out-of-band: the operator must add this public key
/// to the named account on the server and make sure the account is trusted
/// with create and delete grants on challenge records.
#[must_use]
pub fn registration_notice(
    domain: &str,
    username: &str,
    key_path: &Path,
    public_key: &PublicKey,
) -> String {
    format!(
        "No private key was found at {key_path}, so a new one has been generated and saved.\n\
         Register the following public key for the user '{username}' on {domain}\n\
         (e.g. `wellknown-server user add-key {username} <key>` on that host, or via\n\
         http://{domain}/admin/ if an admin surface is available). Make sure '{username}'\n\
         is a trusted account with permission to create and delete challenge records.\n\
         \n\
         {public_key}\n",
        key_path = key_path.display(),
        public_key = public_key.to_base64(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_path_strips_separators() {
        let store = KeyStore::open("/keys");
        assert_eq!(
            store.key_path("example.org"),
            PathBuf::from("/keys/wellknown_id_ed25519_exampleorg")
        );
        assert_eq!(
            store.key_path("www.example-site.org"),
            PathBuf::from("/keys/wellknown_id_ed25519_wwwexamplesiteorg")
        );
    }

    #[test]
    fn test_load_or_create_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::open(dir.path());

        let first = store.load_or_create("example.org", false).unwrap();
        assert!(first.newly_generated);

        let second = store.load_or_create("example.org", false).unwrap();
        assert!(!second.newly_generated);
        assert_eq!(
            first.key.public_key().to_bytes(),
            second.key.public_key().to_bytes()
        );
    }

    #[test]
    fn test_distinct_domains_get_distinct_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::open(dir.path());

        let a = store.load_or_create("a.example.org", false).unwrap();
        let b = store.load_or_create("b.example.org", false).unwrap();
        assert_ne!(a.key.public_key().to_bytes(), b.key.public_key().to_bytes());
    }

    #[test]
    fn test_non_interactive_without_key_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::open(dir.path());

        let err = store.load_or_create("example.org", true).err().unwrap();
        assert!(matches!(err, AgentError::MissingCredential(_)));
        assert!(!store.key_path("example.org").exists());
    }

    #[test]
    fn test_corrupt_key_file_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::open(dir.path());

        let path = store.key_path("example.org");
        fs::write(&path, b"not a DER key").unwrap();

        let err = store.load_or_create("example.org", false).err().unwrap();
        assert!(matches!(err, AgentError::CryptoFailure(_)));
        assert_eq!(fs::read(&path).unwrap(), b"not a DER key");
    }

    #[test]
    fn test_validate_directory_ok_and_leaves_no_residue() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::open(dir.path());

        store.validate_directory().unwrap();
        assert!(fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[test]
    fn test_validate_directory_missing_path() {
        let store = KeyStore::open("/definitely/not/a/real/path");
        let err = store.validate_directory().unwrap_err();
        assert!(matches!(err, AgentError::InvalidConfig(_)));
    }

    #[test]
    #[cfg(unix)]
    fn test_validate_directory_unwritable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o555)).unwrap();

        // Mode bits don't bind a privileged user; nothing to assert there
        if fs::write(dir.path().join("canary"), b"x").is_ok() {
            fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o700)).unwrap();
            return;
        }

        let err = KeyStore::open(dir.path()).validate_directory().unwrap_err();
        assert!(matches!(err, AgentError::StorageUnavailable(_)));
        assert!(err.to_string().contains("could not write"));

        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o700)).unwrap();
    }

    #[test]
    fn test_validate_directory_rejects_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain-file");
        fs::write(&file, b"x").unwrap();

        let err = KeyStore::open(&file).validate_directory().unwrap_err();
        assert!(matches!(err, AgentError::InvalidConfig(_)));
    }

    #[test]
    #[cfg(unix)]
    fn test_persisted_key_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::open(dir.path());
        store.load_or_create("example.org", false).unwrap();

        let mode = fs::metadata(store.key_path("example.org"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_registration_notice_contains_key_and_username() {
        let key = PrivateKey::generate().public_key();
        let notice =
            registration_notice("example.org", "deployer", Path::new("/keys/k"), &key);

        assert!(notice.contains("deployer"));
        assert!(notice.contains("example.org"));
        assert!(notice.contains(&key.to_base64()));
        assert!(notice.contains("create and delete"));
    }
}
