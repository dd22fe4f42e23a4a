//! Environment lifecycle management.
//!
//! Decides, per run, whether to reuse a previously bound environment or
//! provision a new one. A stale reference is replaced wholesale; the
//! replacement is reported so the caller can persist the substitution
//! and notify observers.

use std::sync::Arc;

use tern_interaction::{SandboxError, SandboxHandle, SandboxService};

/// How `acquire` changed the session's environment binding, if at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentChange {
    /// Always true today; reuse produces no change record.
    pub is_new: bool,
    /// Id of the stale reference this environment replaced.
    pub replaced_old: Option<String>,
}

/// Result of resolving a run's environment requirement.
#[derive(Debug, Clone)]
pub struct Acquisition {
    pub handle: SandboxHandle,
    /// `None` when an existing reference was verified and reused.
    pub change: Option<EnvironmentChange>,
}

/// Acquires and verifies execution environments for runs.
pub struct EnvironmentManager {
    service: Arc<dyn SandboxService>,
}

impl EnvironmentManager {
    pub fn new(service: Arc<dyn SandboxService>) -> Self {
        Self { service }
    }

    /// Provisions a fresh environment. Failure is run-fatal for the caller.
    pub async fn create(&self) -> Result<SandboxHandle, SandboxError> {
        self.service.create().await
    }

    /// Resolves the run's environment, reusing `existing` when it is
    /// still alive.
    ///
    /// A reference that fails verification (expired, unknown, or
    /// unreachable) is replaced with a fresh environment; the change
    /// record carries the stale id. Only a failure to provision the
    /// replacement surfaces as an error.
    pub async fn acquire(&self, existing: Option<&str>) -> Result<Acquisition, SandboxError> {
        if let Some(id) = existing {
            match self.service.resolve(id).await {
                Ok(Some(handle)) => {
                    tracing::debug!(target: "tern::lifecycle", id = %id, "reusing environment");
                    return Ok(Acquisition {
                        handle,
                        change: None,
                    });
                }
                Ok(None) => {
                    tracing::info!(target: "tern::lifecycle", id = %id, "environment expired, replacing");
                }
                Err(err) => {
                    tracing::warn!(
                        target: "tern::lifecycle",
                        id = %id,
                        error = %err,
                        "environment verification failed, replacing"
                    );
                }
            }
            let handle = self.service.create().await?;
            return Ok(Acquisition {
                handle,
                change: Some(EnvironmentChange {
                    is_new: true,
                    replaced_old: Some(id.to_string()),
                }),
            });
        }

        let handle = self.service.create().await?;
        Ok(Acquisition {
            handle,
            change: Some(EnvironmentChange {
                is_new: true,
                replaced_old: None,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tern_interaction::{CommandOutput, DirEntry};

    struct FakeSandbox {
        live: Vec<String>,
        resolve_fails: bool,
        created: AtomicUsize,
    }

    impl FakeSandbox {
        fn new(live: &[&str]) -> Self {
            Self {
                live: live.iter().map(|s| s.to_string()).collect(),
                resolve_fails: false,
                created: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SandboxService for FakeSandbox {
        async fn create(&self) -> Result<SandboxHandle, SandboxError> {
            let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(SandboxHandle {
                id: format!("env-new-{n}"),
                url: format!("https://env-new-{n}.example"),
                created_at: 1_700_000_000_000,
            })
        }

        async fn resolve(&self, sandbox_id: &str) -> Result<Option<SandboxHandle>, SandboxError> {
            if self.resolve_fails {
                return Err(SandboxError::Transport("connection refused".into()));
            }
            Ok(self
                .live
                .iter()
                .find(|id| id.as_str() == sandbox_id)
                .map(|id| SandboxHandle {
                    id: id.clone(),
                    url: format!("https://{id}.example"),
                    created_at: 1_700_000_000_000,
                }))
        }

        async fn write_file(&self, _: &str, _: &str, _: &str) -> Result<(), SandboxError> {
            unimplemented!()
        }

        async fn read_file(&self, _: &str, _: &str) -> Result<String, SandboxError> {
            unimplemented!()
        }

        async fn list_directory(&self, _: &str, _: &str) -> Result<Vec<DirEntry>, SandboxError> {
            unimplemented!()
        }

        async fn delete_path(&self, _: &str, _: &str) -> Result<(), SandboxError> {
            unimplemented!()
        }

        async fn run_command(&self, _: &str, _: &str) -> Result<CommandOutput, SandboxError> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn test_live_reference_is_reused() {
        let manager = EnvironmentManager::new(Arc::new(FakeSandbox::new(&["env-1"])));
        let acquisition = manager.acquire(Some("env-1")).await.unwrap();
        assert_eq!(acquisition.handle.id, "env-1");
        assert!(acquisition.change.is_none());
    }

    #[tokio::test]
    async fn test_expired_reference_is_replaced() {
        let manager = EnvironmentManager::new(Arc::new(FakeSandbox::new(&[])));
        let acquisition = manager.acquire(Some("env-stale")).await.unwrap();
        assert_eq!(acquisition.handle.id, "env-new-1");
        assert_eq!(
            acquisition.change,
            Some(EnvironmentChange {
                is_new: true,
                replaced_old: Some("env-stale".into()),
            })
        );
    }

    #[tokio::test]
    async fn test_verification_error_is_replaced() {
        let mut fake = FakeSandbox::new(&["env-1"]);
        fake.resolve_fails = true;
        let manager = EnvironmentManager::new(Arc::new(fake));
        let acquisition = manager.acquire(Some("env-1")).await.unwrap();
        assert_eq!(
            acquisition.change.unwrap().replaced_old,
            Some("env-1".into())
        );
    }

    #[tokio::test]
    async fn test_no_reference_creates_fresh() {
        let manager = EnvironmentManager::new(Arc::new(FakeSandbox::new(&[])));
        let acquisition = manager.acquire(None).await.unwrap();
        assert_eq!(
            acquisition.change,
            Some(EnvironmentChange {
                is_new: true,
                replaced_old: None,
            })
        );
    }
}
