//! Backend construction: OpenDAL S3 operator and the store factory

use std::sync::Arc;

use fers_core::config::{Backend, S3Config, StorageConfig};
use fers_core::{FersError, FersResult};
use opendal::Operator;

use crate::fs::FsStore;
use crate::remote::OpendalStore;
use crate::store::ObjectStore;

/// Access credentials for an S3-compatible service
#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .finish()
    }
}

/// Build an OpenDAL Operator for any S3-compatible endpoint (AWS, MinIO,
/// SeaweedFS, Alibaba OSS).
///
/// If `enforce_tls` is set and the endpoint uses HTTP, this returns an error.
/// Otherwise, a warning is logged for non-HTTPS endpoints.
pub fn build_s3_operator(cfg: &S3Config, creds: &Credentials) -> FersResult<Operator> {
    if cfg.endpoint.starts_with("http://") {
        if cfg.enforce_tls {
            return Err(FersError::Config(format!(
                "S3 endpoint uses plaintext HTTP ({}), but enforce_tls is enabled. \
                 Use an HTTPS endpoint or set storage.s3.enforce_tls = false \
                 for local development.",
                cfg.endpoint
            )));
        }
        tracing::warn!(
            endpoint = %cfg.endpoint,
            "S3 endpoint uses plaintext HTTP; credentials are transmitted unencrypted. \
             Set storage.s3.enforce_tls = true and use HTTPS in production."
        );
    }

    // opendal 0.55: S3 builder uses consuming pattern (methods take `self`, return `Self`)
    let builder = opendal::services::S3::default()
        .endpoint(&cfg.endpoint)
        .region(&cfg.region)
        .bucket(&cfg.bucket)
        .access_key_id(&creds.access_key_id)
        .secret_access_key(&creds.secret_access_key);

    let op = Operator::new(builder)
        .map_err(|e| FersError::Config(format!("creating OpenDAL S3 operator: {e}")))?
        .layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(5)
                .with_jitter(),
        )
        .finish();

    Ok(op)
}

/// Select and construct the configured backend. Called once at startup; the
/// engine only ever sees the trait object.
pub fn build_store(
    cfg: &StorageConfig,
    creds: Option<&Credentials>,
) -> FersResult<Arc<dyn ObjectStore>> {
    match cfg.backend {
        Backend::Local => Ok(Arc::new(FsStore::new(&cfg.local.base_dir)?)),
        Backend::S3 => {
            let creds = creds.ok_or_else(|| {
                FersError::Config(
                    "S3 credentials not set (FERS_ACCESS_KEY_ID / FERS_SECRET_ACCESS_KEY)".into(),
                )
            })?;
            let op = build_s3_operator(&cfg.s3, creds)?;
            Ok(Arc::new(OpendalStore::new(op, &cfg.s3.work_dir)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials {
            access_key_id: "test-key".into(),
            secret_access_key: "test-secret".into(),
        }
    }

    fn s3_config(endpoint: &str, enforce_tls: bool) -> S3Config {
        S3Config {
            endpoint: endpoint.into(),
            bucket: "test-bucket".into(),
            enforce_tls,
            ..Default::default()
        }
    }

    #[test]
    fn test_build_operator_http_warning() {
        // HTTP endpoint with enforce_tls=false should succeed (but log warning)
        let result = build_s3_operator(&s3_config("http://localhost:8333", false), &creds());
        assert!(result.is_ok());
    }

    #[test]
    fn test_build_operator_http_enforce_tls() {
        let result = build_s3_operator(&s3_config("http://insecure:8333", true), &creds());
        let err = result.unwrap_err();
        assert!(
            err.to_string().contains("enforce_tls"),
            "error message should mention enforce_tls"
        );
    }

    #[test]
    fn test_build_operator_https() {
        let result = build_s3_operator(
            &s3_config("https://oss-cn-hangzhou.aliyuncs.com", true),
            &creds(),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_build_store_s3_requires_credentials() {
        let cfg = StorageConfig {
            backend: Backend::S3,
            s3: s3_config("https://s3.example.com", true),
            ..Default::default()
        };
        let err = build_store(&cfg, None).err().expect("expected error");
        assert!(matches!(err, FersError::Config(_)));

        let store = build_store(&cfg, Some(&creds())).unwrap();
        assert!(store.describe().starts_with("s3"));
    }

    #[test]
    fn test_build_store_local() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut cfg = StorageConfig::default();
        cfg.local.base_dir = tmp.path().join("objects");

        let store = build_store(&cfg, None).unwrap();
        assert!(store.describe().starts_with("fs:"));
        assert!(tmp.path().join("objects").is_dir());
    }

    #[test]
    fn test_credentials_debug_redacts() {
        assert!(!format!("{:?}", creds()).contains("test-secret"));
    }
}
