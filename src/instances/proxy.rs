use crate::app::config::ProxyMode;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("proxy fragment io error: {0}")]
    Io(String),
    #[error("file-mode proxy adapter requires PROXY_FILE_OUTPUT_DIR")]
    MissingOutputDir,
}

pub type ProxyResult<T> = Result<T, ProxyError>;

/// Publishes/retracts virtual-host routing rules for the shared reverse
/// proxy (spec §4.3). Owns no durable state of its own — the Reconciler
/// can always rederive the whole routing table from the Store at startup,
/// so both calls are defined to be idempotent.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ProxyAdapter: Send + Sync {
    async fn publish(&self, subdomain: &str, internal_address: &str) -> ProxyResult<()>;
    async fn retract(&self, subdomain: &str) -> ProxyResult<()>;
}

/// The reverse proxy watches container labels directly, so publication is
/// implicit the moment `RuntimeAdapter::create` attaches the container to
/// `PROXY_NETWORK` with the right labels — both calls are no-ops here.
pub struct LabelModeProxyAdapter;

#[async_trait]
impl ProxyAdapter for LabelModeProxyAdapter {
    async fn publish(&self, _subdomain: &str, _internal_address: &str) -> ProxyResult<()> {
        Ok(())
    }

    async fn retract(&self, _subdomain: &str) -> ProxyResult<()> {
        Ok(())
    }
}

/// Writes one routing fragment per instance and signals the proxy to
/// reload by bumping a sentinel file the proxy's own watcher polls.
pub struct FileModeProxyAdapter {
    output_dir: PathBuf,
}

impl FileModeProxyAdapter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    fn fragment_path(&self, subdomain: &str) -> PathBuf {
        self.output_dir.join(format!("{subdomain}.conf"))
    }

    fn render(subdomain: &str, internal_address: &str) -> String {
        format!(
            "# managed by instancectl, do not edit by hand\n\
             upstream {subdomain} {{\n    server {internal_address};\n}}\n"
        )
    }

    async fn signal_reload(&self) -> ProxyResult<()> {
        let marker = self.output_dir.join(".reload");
        let now = chrono::Utc::now().to_rfc3339();
        tokio::fs::write(&marker, now)
            .await
            .map_err(|e| ProxyError::Io(e.to_string()))
    }
}

#[async_trait]
impl ProxyAdapter for FileModeProxyAdapter {
    async fn publish(&self, subdomain: &str, internal_address: &str) -> ProxyResult<()> {
        let path = self.fragment_path(subdomain);
        let desired = Self::render(subdomain, internal_address);

        let unchanged = tokio::fs::read_to_string(&path)
            .await
            .map(|existing| existing == desired)
            .unwrap_or(false);
        if unchanged {
            return Ok(());
        }

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| ProxyError::Io(e.to_string()))?;
        tokio::fs::write(&path, desired)
            .await
            .map_err(|e| ProxyError::Io(e.to_string()))?;
        self.signal_reload().await
    }

    async fn retract(&self, subdomain: &str) -> ProxyResult<()> {
        let path = self.fragment_path(subdomain);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => self.signal_reload().await,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ProxyError::Io(e.to_string())),
        }
    }
}

/// Builds the configured [`ProxyAdapter`] from `PROXY_MODE` (spec §6
/// configuration table).
pub fn build_proxy_adapter(
    mode: ProxyMode,
    file_output_dir: Option<&str>,
) -> ProxyResult<Box<dyn ProxyAdapter>> {
    match mode {
        ProxyMode::Label => Ok(Box::new(LabelModeProxyAdapter)),
        ProxyMode::File => {
            let dir = file_output_dir.ok_or(ProxyError::MissingOutputDir)?;
            Ok(Box::new(FileModeProxyAdapter::new(Path::new(dir))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn label_mode_publish_and_retract_are_no_ops() {
        let adapter = LabelModeProxyAdapter;
        assert!(adapter.publish("acme", "acme-internal:8080").await.is_ok());
        assert!(adapter.retract("acme").await.is_ok());
    }

    #[tokio::test]
    async fn file_mode_publish_is_idempotent() {
        let dir = tempfile_dir();
        let adapter = FileModeProxyAdapter::new(&dir);
        adapter.publish("acme", "acme-internal:8080").await.unwrap();
        let first = tokio::fs::read_to_string(dir.join("acme.conf")).await.unwrap();
        adapter.publish("acme", "acme-internal:8080").await.unwrap();
        let second = tokio::fs::read_to_string(dir.join("acme.conf")).await.unwrap();
        assert_eq!(first, second);
        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn file_mode_retract_of_unknown_subdomain_succeeds() {
        let dir = tempfile_dir();
        let adapter = FileModeProxyAdapter::new(&dir);
        assert!(adapter.retract("never-existed").await.is_ok());
    }

    fn tempfile_dir() -> PathBuf {
        std::env::temp_dir().join(format!("instancectl-proxy-test-{}", uuid::Uuid::new_v4()))
    }
}
