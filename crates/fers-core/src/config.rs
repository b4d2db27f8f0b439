use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{FersError, FersResult};

/// Top-level configuration (loaded from fers.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FersConfig {
    /// Local root that every sync operation is confined to
    pub working_dir: PathBuf,
    pub crypto: CryptoConfig,
    pub storage: StorageConfig,
    pub sync: SyncConfig,
    pub log: LogConfig,
    /// Warn if the config file is world-readable (default: true)
    #[serde(default = "default_true")]
    pub config_file_mode_check: bool,
}

fn default_true() -> bool {
    true
}

/// Passphrase source for the shared secret key.
///
/// The passphrase is never serialized back out and is redacted from `Debug`.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    #[serde(skip_serializing)]
    pub passphrase: Option<String>,
}

impl std::fmt::Debug for CryptoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoConfig")
            .field("passphrase", &self.passphrase.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Filesystem-rooted store (keys map onto files under `base_dir`)
    #[default]
    Local,
    /// S3-compatible object storage (AWS, SeaweedFS, MinIO, Alibaba OSS)
    S3,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: Backend,
    pub local: LocalStoreConfig,
    pub s3: S3Config,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalStoreConfig {
    /// Directory the filesystem store keeps its objects in
    pub base_dir: PathBuf,
}

impl Default for LocalStoreConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("~/.local/share/fers/store"),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Config {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    /// Remote prefix every key is stored under
    pub work_dir: String,
    /// Enforce HTTPS for S3 connections (error on HTTP endpoints)
    pub enforce_tls: bool,
    /// Credentials may also come from FERS_ACCESS_KEY_ID / FERS_SECRET_ACCESS_KEY
    pub access_key_id: Option<String>,
    #[serde(skip_serializing)]
    pub secret_access_key: Option<String>,
}

impl std::fmt::Debug for S3Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Config")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("work_dir", &self.work_dir)
            .field("enforce_tls", &self.enforce_tls)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8333".into(),
            region: "us-east-1".into(),
            bucket: String::new(),
            work_dir: String::new(),
            enforce_tls: false,
            access_key_id: None,
            secret_access_key: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Glob patterns (matched against file names) to leave out of local scans
    pub exclude_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
    /// Append logs to this file instead of stderr
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
            file: None,
        }
    }
}

impl FersConfig {
    pub fn from_toml_str(content: &str) -> FersResult<Self> {
        toml::from_str(content).map_err(|e| FersError::Config(e.to_string()))
    }

    /// Check that everything the engine needs is present.
    pub fn validate(&self) -> FersResult<()> {
        if self.working_dir.as_os_str().is_empty() {
            return Err(FersError::Config("working_dir is not set".into()));
        }
        match self.crypto.passphrase.as_deref() {
            None | Some("") => return Err(FersError::Config("crypto.passphrase is not set".into())),
            Some(_) => {}
        }
        if self.storage.backend == Backend::S3 && self.storage.s3.bucket.is_empty() {
            return Err(FersError::Config(
                "storage.backend = \"s3\" requires storage.s3.bucket".into(),
            ));
        }
        Ok(())
    }
}

/// Warn when a file holding the passphrase can be read by other users.
#[cfg(unix)]
pub fn warn_if_world_readable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Ok(meta) = std::fs::metadata(path) {
        let mode = meta.permissions().mode();
        if mode & 0o004 != 0 {
            tracing::warn!(
                path = %path.display(),
                mode = %format!("{:o}", mode & 0o777),
                "config file is world-readable and may contain the passphrase; \
                 chmod 600 recommended"
            );
        }
    }
}

#[cfg(not(unix))]
pub fn warn_if_world_readable(_path: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
working_dir = "/home/user/vault"
config_file_mode_check = false

[crypto]
passphrase = "correct horse battery staple"

[storage]
backend = "s3"

[storage.local]
base_dir = "/tmp/store"

[storage.s3]
endpoint = "https://oss-cn-hangzhou.aliyuncs.com"
region = "cn-hangzhou"
bucket = "my-bucket"
work_dir = "backups/laptop"
enforce_tls = true

[sync]
exclude_patterns = ["*.swp", "Thumbs.db"]

[log]
level = "debug"
format = "json"
file = "/var/log/fers.log"
"#;
        let config = FersConfig::from_toml_str(toml_str).unwrap();

        assert_eq!(config.working_dir, PathBuf::from("/home/user/vault"));
        assert_eq!(
            config.crypto.passphrase.as_deref(),
            Some("correct horse battery staple")
        );
        assert_eq!(config.storage.backend, Backend::S3);
        assert_eq!(config.storage.s3.bucket, "my-bucket");
        assert_eq!(config.storage.s3.work_dir, "backups/laptop");
        assert!(config.storage.s3.enforce_tls);
        assert_eq!(config.sync.exclude_patterns.len(), 2);
        assert_eq!(config.log.format, "json");
        assert!(!config.config_file_mode_check);
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_defaults() {
        let config = FersConfig::from_toml_str("").unwrap();

        assert_eq!(config.storage.backend, Backend::Local);
        assert_eq!(config.log.level, "info");
        assert_eq!(config.log.format, "text");
        assert!(config.sync.exclude_patterns.is_empty());
        assert!(config.config_file_mode_check);
    }

    #[test]
    fn test_validate_missing_fields() {
        let mut config = FersConfig::default();
        assert!(config.validate().is_err(), "empty working_dir must fail");

        config.working_dir = PathBuf::from("/tmp/vault");
        assert!(config.validate().is_err(), "missing passphrase must fail");

        config.crypto.passphrase = Some("pw".into());
        config.validate().unwrap();

        config.storage.backend = Backend::S3;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("bucket"));
    }

    #[test]
    fn test_secrets_not_serialized_or_debugged() {
        let mut config = FersConfig::default();
        config.crypto.passphrase = Some("hunter2".into());
        config.storage.s3.secret_access_key = Some("s3cr3t".into());

        let toml_str = toml::to_string(&config).unwrap();
        assert!(!toml_str.contains("hunter2"));
        assert!(!toml_str.contains("s3cr3t"));

        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("s3cr3t"));
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let result = FersConfig::from_toml_str("[storage]\nbackend = \"ftp\"\n");
        assert!(matches!(result, Err(FersError::Config(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_warn_if_world_readable_does_not_panic() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(0o644)).unwrap();
        warn_if_world_readable(tmp.path());
    }
}
