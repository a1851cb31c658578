//! Credential loading from a twurl-style profile store.
//!
//! The store is a YAML file (`~/.twurlrc` by default):
//!
//! ```yaml
//! configuration:
//!   default_profile:
//!   - some_user
//!   - CONSUMER_KEY
//! profiles:
//!   some_user:
//!     CONSUMER_KEY:
//!       consumer_key: CONSUMER_KEY
//!       consumer_secret: ...
//!       token: ...
//!       secret: ...
//! ```

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name of the profile store inside the home directory
pub const TWURLRC_FILE_NAME: &str = ".twurlrc";

/// Credential loading errors
#[derive(Debug, thiserror::Error)]
pub enum CredentialsError {
    /// Profile store could not be read
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// Path of the profile store
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// Profile store is not valid YAML of the expected shape
    #[error("failed to parse {}: {source}", path.display())]
    Yaml {
        /// Path of the profile store
        path: PathBuf,
        /// Underlying YAML error
        source: serde_yaml::Error,
    },

    /// Requested profile does not exist
    #[error("profile not found: {0}")]
    MissingProfile(String),

    /// Required field missing from the store
    #[error("missing field in profile store: {0}")]
    MissingField(String),

    /// No home directory to locate the default store
    #[error("home directory could not be determined")]
    HomeDirectoryUnavailable,
}

/// OAuth 1.0a credentials used to sign every request
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Consumer (application) key
    pub consumer_key: String,
    /// Consumer (application) secret
    pub consumer_secret: String,
    /// User access token
    pub token: String,
    /// User access token secret
    pub token_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &"<redacted>")
            .field("token", &self.token)
            .field("token_secret", &"<redacted>")
            .finish()
    }
}

/// Source of signing credentials
pub trait CredentialProvider {
    /// Load the credentials
    fn credentials(&self) -> Result<Credentials, CredentialsError>;
}

impl CredentialProvider for Credentials {
    fn credentials(&self) -> Result<Credentials, CredentialsError> {
        Ok(self.clone())
    }
}

#[derive(Debug, Deserialize)]
struct TwurlrcFile {
    configuration: TwurlrcConfiguration,
    #[serde(default)]
    profiles: BTreeMap<String, BTreeMap<String, TwurlrcProfile>>,
}

#[derive(Debug, Deserialize)]
struct TwurlrcConfiguration {
    #[serde(default)]
    default_profile: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TwurlrcProfile {
    consumer_key: Option<String>,
    consumer_secret: String,
    token: String,
    secret: String,
}

/// Reads credentials from a twurl profile store
#[derive(Debug, Clone)]
pub struct TwurlrcProvider {
    path: PathBuf,
    profile: Option<String>,
}

impl TwurlrcProvider {
    /// Provider reading the store at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            profile: None,
        }
    }

    /// Provider reading `~/.twurlrc`
    pub fn default_location() -> Result<Self, CredentialsError> {
        let home = dirs::home_dir().ok_or(CredentialsError::HomeDirectoryUnavailable)?;
        Ok(Self::new(home.join(TWURLRC_FILE_NAME)))
    }

    /// Use the named profile instead of the store's default profile
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    /// Path of the profile store
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse(&self, contents: &str) -> Result<Credentials, CredentialsError> {
        let file: TwurlrcFile =
            serde_yaml::from_str(contents).map_err(|source| CredentialsError::Yaml {
                path: self.path.clone(),
                source,
            })?;

        let (username, consumer_key) = match &self.profile {
            Some(name) => {
                let keys = file
                    .profiles
                    .get(name)
                    .ok_or_else(|| CredentialsError::MissingProfile(name.clone()))?;
                let key = keys
                    .keys()
                    .next()
                    .ok_or_else(|| CredentialsError::MissingProfile(name.clone()))?;
                (name.clone(), key.clone())
            }
            None => match file.configuration.default_profile.as_slice() {
                [username, consumer_key, ..] => (username.clone(), consumer_key.clone()),
                _ => {
                    return Err(CredentialsError::MissingField(
                        "configuration.default_profile".to_string(),
                    ))
                }
            },
        };

        let profile = file
            .profiles
            .get(&username)
            .and_then(|keys| keys.get(&consumer_key))
            .ok_or_else(|| CredentialsError::MissingProfile(format!("{username}/{consumer_key}")))?;

        debug!(profile = %username, path = ?self.path, "Loaded credentials profile");

        Ok(Credentials {
            consumer_key: profile.consumer_key.clone().unwrap_or(consumer_key),
            consumer_secret: profile.consumer_secret.clone(),
            token: profile.token.clone(),
            token_secret: profile.secret.clone(),
        })
    }
}

impl CredentialProvider for TwurlrcProvider {
    fn credentials(&self) -> Result<Credentials, CredentialsError> {
        let contents =
            std::fs::read_to_string(&self.path).map_err(|source| CredentialsError::Io {
                path: self.path.clone(),
                source,
            })?;
        self.parse(&contents)
    }
}
