//! Configuration management for formwork
//!
//! Configuration is loaded from multiple sources with clear precedence:
//!
//! 1. Environment variables (highest priority, `FORMWORK_` prefix, `__` as
//!    the section separator, e.g. `FORMWORK_STORAGE__BUCKET`)
//! 2. `./formwork.toml`
//! 3. Hardcoded defaults (fallback)
//!
//! # Example Configuration
//!
//! ```toml
//! # formwork.toml
//! [server]
//! bind = "127.0.0.1:3000"
//!
//! [storage]
//! endpoint = "https://nyc3.digitaloceanspaces.com"
//! region = "nyc3"
//! bucket = "uploads"
//! access_key = "..."
//! secret_key = "..."
//! acl = "public-read"
//!
//! [upload]
//! temp_dir = "/tmp/formwork"
//! allowed_extensions = ["png", "jpg", "pdf"]
//! allowed_types = ["image/*", "application/pdf"]
//! scan_uploads = true
//!
//! [scan]
//! command = "clamscan"
//! remove_infected = true
//! ```

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::storage::AccessPolicy;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FormworkConfig {
    /// HTTP server settings
    pub server: ServerSettings,
    /// Object storage settings
    pub storage: StorageSettings,
    /// Upload pipeline settings
    pub upload: UploadSettings,
    /// Malware scanner settings
    pub scan: ScanSettings,
}

impl FormworkConfig {
    /// Loads configuration from defaults, `formwork.toml`, and `FORMWORK_*`
    /// environment variables, in increasing precedence.
    ///
    /// # Errors
    ///
    /// Returns an error if a source is present but malformed.
    pub fn load() -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file("formwork.toml"))
            .merge(Env::prefixed("FORMWORK_").split("__"))
            .extract()
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Socket address to bind
    pub bind: String,

    /// Maximum accepted request body size in bytes
    pub max_body_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
            max_body_bytes: 25 * 1024 * 1024,
        }
    }
}

/// Object storage endpoint and credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Custom endpoint URL for S3-compatible providers; `None` uses AWS
    pub endpoint: Option<String>,

    /// Storage region
    pub region: String,

    /// Target bucket for uploads
    pub bucket: String,

    /// Access key id
    pub access_key: String,

    /// Secret access key
    pub secret_key: String,

    /// Canned access policy applied to stored objects
    pub acl: AccessPolicy,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: "us-east-1".to_string(),
            bucket: "uploads".to_string(),
            access_key: String::new(),
            secret_key: String::new(),
            acl: AccessPolicy::PublicRead,
        }
    }
}

/// Upload pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadSettings {
    /// Directory for temp files in the scanning variant
    pub temp_dir: PathBuf,

    /// File-extension allow-list; empty means no restriction
    pub allowed_extensions: Vec<String>,

    /// Declared MIME-type allow-list (`image/*` wildcards supported);
    /// empty means no restriction
    pub allowed_types: Vec<String>,

    /// Spool uploads to temp files and scan them before storing
    pub scan_uploads: bool,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            temp_dir: PathBuf::from("/tmp/formwork"),
            allowed_extensions: Vec::new(),
            allowed_types: Vec::new(),
            scan_uploads: false,
        }
    }
}

/// Malware scanner settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Scanner executable
    pub command: String,

    /// Ask the scanner to remove infected files
    pub remove_infected: bool,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            command: "clamscan".to_string(),
            remove_infected: true,
        }
    }
}
