//! Key material resolution.
//!
//! The TLS layer never reads files itself. It asks a [`KeyMaterialResolver`]
//! for the bytes behind a locator, so applications can plug in their own
//! storage (vaults, embedded resources, ...).

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use log::debug;
use url::Url;

use crate::errors::ConfigError;

/// Resolves a key material locator into PEM encoded bytes.
pub trait KeyMaterialResolver: Send + Sync + 'static {
    /// Returns the bytes stored at `location`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::KeyMaterial`] when the location is unknown,
    /// unreadable, or the password is rejected.
    fn resolve(&self, location: &Url, password: &str) -> Result<Vec<u8>, ConfigError>;
}

fn unavailable(location: &Url, reason: impl ToString) -> ConfigError {
    ConfigError::KeyMaterial { location: location.to_string(), reason: reason.to_string() }
}

/// Reads key material from the file system.
///
/// - `file:///absolute/path.pem` is read as is.
/// - `resource://<host>/relative/path.pem` is read relative to the base directory.
///
/// The password is not used here. Encrypted PKCS#8 keys are decrypted with
/// it once the TLS context is built.
#[derive(Clone, Debug)]
pub struct FileResolver {
    base: PathBuf,
}

impl FileResolver {
    /// Creates a resolver reading `resource://` locators under `base`.
    pub fn new(base: impl AsRef<Path>) -> Self {
        Self {
            base: base
                .as_ref()
                .to_path_buf(),
        }
    }

    fn path_for(&self, location: &Url) -> Result<PathBuf, ConfigError> {
        match location.scheme() {
            "file" => location
                .to_file_path()
                .map_err(|_| unavailable(location, "not a local file path")),
            "resource" => {
                let relative = location
                    .path()
                    .trim_start_matches('/');
                if relative.is_empty() {
                    return Err(unavailable(location, "resource path is empty"));
                }
                Ok(self
                    .base
                    .join(relative))
            }
            scheme => Err(unavailable(location, format!("unsupported scheme '{}'", scheme))),
        }
    }
}

impl Default for FileResolver {
    fn default() -> Self {
        Self::new(".")
    }
}

impl KeyMaterialResolver for FileResolver {
    fn resolve(&self, location: &Url, _password: &str) -> Result<Vec<u8>, ConfigError> {
        let path = self.path_for(location)?;
        debug!("Reading key material from {}", path.display());
        fs::read(&path).map_err(|e| unavailable(location, e))
    }
}

/// Serves key material registered in memory, guarded by a password.
///
/// # Examples
///
/// ```rust,ignore
/// use portico::server::resolver::MemoryResolver;
///
/// let resolver = MemoryResolver::new()
///     .with("resource://secret/identity.pem", identity_pem, "secret");
/// ```
#[derive(Clone, Default)]
pub struct MemoryResolver {
    entries: HashMap<String, (Vec<u8>, String)>,
}

impl MemoryResolver {
    /// Creates an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `bytes` at `location`, readable with `password`.
    pub fn insert(&mut self, location: &str, bytes: impl Into<Vec<u8>>, password: &str) {
        let key = Url::parse(location)
            .map(String::from)
            .unwrap_or_else(|_| location.to_string());
        self.entries
            .insert(key, (bytes.into(), password.to_string()));
    }

    /// Builder flavour of [`MemoryResolver::insert`].
    pub fn with(mut self, location: &str, bytes: impl Into<Vec<u8>>, password: &str) -> Self {
        self.insert(location, bytes, password);
        self
    }
}

impl KeyMaterialResolver for MemoryResolver {
    fn resolve(&self, location: &Url, password: &str) -> Result<Vec<u8>, ConfigError> {
        let (bytes, expected) = self
            .entries
            .get(location.as_str())
            .ok_or_else(|| unavailable(location, "not found"))?;

        if expected != password {
            return Err(unavailable(location, "wrong password"));
        }

        Ok(bytes.clone())
    }
}
