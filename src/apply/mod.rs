//! Change detection and submission of rendered documents.
//!
//! The [`Applier`] hashes every rendered document and only talks to the
//! control plane when the hash differs from the last *successfully*
//! applied one. Before submitting, the document is autosaved to disk on
//! a best-effort basis. A failed submission leaves the stored hash
//! untouched so the next differing document is tried again.

pub mod admin;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

pub use admin::AdminApi;

use crate::error::IngressError;

/// The running proxy's administrative interface.
// async_trait keeps ControlPlane usable as Box<dyn ControlPlane>.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    fn name(&self) -> &str;

    /// Replaces the running configuration with `document`.
    async fn load(&self, document: &str) -> Result<(), IngressError>;

    /// Tears down every running listener so the next load starts clean.
    async fn restart(&self) -> Result<(), IngressError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Same content as the last applied document; nothing was submitted.
    Unchanged,
    Applied { hash: String },
}

/// Default autosave location, `<config dir>/caddy/Caddyfile.autosave`.
#[must_use]
pub fn default_autosave_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("caddy").join("Caddyfile.autosave"))
}

/// Lowercase hex SHA-256 of the document.
#[must_use]
pub fn document_hash(document: &str) -> String {
    format!("{:x}", Sha256::digest(document.as_bytes()))
}

pub struct Applier {
    control_plane: Box<dyn ControlPlane>,
    autosave_path: Option<PathBuf>,
    restart_on_change: bool,
    last_applied: Option<String>,
}

impl Applier {
    #[must_use]
    pub fn new(control_plane: Box<dyn ControlPlane>, autosave_path: Option<PathBuf>) -> Self {
        Self {
            control_plane,
            autosave_path,
            restart_on_change: false,
            last_applied: None,
        }
    }

    #[must_use]
    pub const fn with_restart(mut self, restart_on_change: bool) -> Self {
        self.restart_on_change = restart_on_change;
        self
    }

    /// Hash of the last document the control plane accepted.
    #[must_use]
    pub fn last_applied(&self) -> Option<&str> {
        self.last_applied.as_deref()
    }

    /// Submits `document` unless it matches the last applied one.
    pub async fn apply(&mut self, document: &str) -> Result<ApplyOutcome, IngressError> {
        let hash = document_hash(document);
        if self.last_applied.as_deref() == Some(hash.as_str()) {
            tracing::debug!(hash = %short(&hash), "Caddyfile has not changed, skipping reload");
            return Ok(ApplyOutcome::Unchanged);
        }

        if let Some(path) = &self.autosave_path {
            if let Err(e) = autosave(path, document).await {
                tracing::warn!(error = %e, path = %path.display(), "failed to autosave Caddyfile");
            }
        }

        if self.restart_on_change {
            tracing::info!(control_plane = self.control_plane.name(), "restarting Caddy before load");
            self.control_plane.restart().await?;
        }
        self.control_plane.load(document).await?;

        tracing::info!(hash = %short(&hash), "successfully updated the Caddyfile");
        self.last_applied = Some(hash.clone());
        Ok(ApplyOutcome::Applied { hash })
    }
}

async fn autosave(path: &Path, document: &str) -> Result<(), std::io::Error> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, document).await
}

/// First eight characters of a hash, for logs and status output.
#[must_use]
pub fn short(hash: &str) -> &str {
    hash.get(..8).unwrap_or(hash)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Default)]
    struct Recorded {
        loads: Vec<String>,
        restarts: usize,
    }

    struct FakeControlPlane {
        recorded: Arc<Mutex<Recorded>>,
        fail: bool,
    }

    #[async_trait]
    impl ControlPlane for FakeControlPlane {
        fn name(&self) -> &str {
            "fake"
        }

        async fn load(&self, document: &str) -> Result<(), IngressError> {
            self.recorded.lock().unwrap().loads.push(document.to_string());
            if self.fail {
                return Err(IngressError::Adapt {
                    message: "rejected".into(),
                });
            }
            Ok(())
        }

        async fn restart(&self) -> Result<(), IngressError> {
            self.recorded.lock().unwrap().restarts += 1;
            Ok(())
        }
    }

    fn applier(fail: bool) -> (Applier, Arc<Mutex<Recorded>>) {
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let control_plane = FakeControlPlane {
            recorded: recorded.clone(),
            fail,
        };
        (Applier::new(Box::new(control_plane), None), recorded)
    }

    #[test]
    fn hash_is_stable_hex() {
        let hash = document_hash("example.com {\n}\n");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, document_hash("example.com {\n}\n"));
        assert_ne!(hash, document_hash("example.org {\n}\n"));
        assert_eq!(short(&hash).len(), 8);
    }

    #[tokio::test]
    async fn identical_document_is_submitted_once() {
        let (mut applier, recorded) = applier(false);

        let first = applier.apply("a.example.com {\n}").await.unwrap();
        let second = applier.apply("a.example.com {\n}").await.unwrap();

        assert!(matches!(first, ApplyOutcome::Applied { .. }));
        assert_eq!(second, ApplyOutcome::Unchanged);
        assert_eq!(recorded.lock().unwrap().loads.len(), 1);
    }

    #[tokio::test]
    async fn changed_document_is_submitted() {
        let (mut applier, recorded) = applier(false);

        applier.apply("a").await.unwrap();
        applier.apply("b").await.unwrap();

        assert_eq!(recorded.lock().unwrap().loads, vec!["a", "b"]);
        assert_eq!(applier.last_applied(), Some(document_hash("b").as_str()));
    }

    #[tokio::test]
    async fn failed_apply_keeps_previous_hash_and_retries() {
        let (mut applier, recorded) = applier(true);

        assert!(applier.apply("a").await.is_err());
        assert_eq!(applier.last_applied(), None);
        assert!(applier.apply("a").await.is_err());
        assert_eq!(recorded.lock().unwrap().loads.len(), 2);
    }

    #[tokio::test]
    async fn restart_mode_restarts_before_each_load() {
        let (applier, recorded) = applier(false);
        let mut applier = applier.with_restart(true);

        applier.apply("a").await.unwrap();
        applier.apply("a").await.unwrap();
        applier.apply("b").await.unwrap();

        let recorded = recorded.lock().unwrap();
        assert_eq!(recorded.restarts, 2);
        assert_eq!(recorded.loads.len(), 2);
    }

    #[tokio::test]
    async fn autosave_writes_document() {
        let dir = std::env::temp_dir().join(format!("consul-ingress-autosave-{}", std::process::id()));
        let path = dir.join("Caddyfile.autosave");
        let (applier, _) = applier(false);
        let mut applier = Applier {
            autosave_path: Some(path.clone()),
            ..applier
        };

        applier.apply("first").await.unwrap();
        applier.apply("second").await.unwrap();

        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "second");
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn autosave_failure_does_not_block_apply() {
        let (applier, recorded) = applier(false);
        // A path under a regular file can never be created
        let blocker = std::env::temp_dir().join(format!("consul-ingress-blocker-{}", std::process::id()));
        tokio::fs::write(&blocker, "x").await.unwrap();
        let mut applier = Applier {
            autosave_path: Some(blocker.join("Caddyfile.autosave")),
            ..applier
        };

        assert!(applier.apply("doc").await.is_ok());
        assert_eq!(recorded.lock().unwrap().loads.len(), 1);
        let _ = tokio::fs::remove_file(&blocker).await;
    }
}
