//! In-process registry for local development and tests.
//!
//! A single task owns the records; handles talk to it over a channel, so the
//! handle is cheap to clone and safe to share between requests.

use std::collections::BTreeMap;
use std::time::Duration;
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use shared::types::CheckStatus;
use super::{service_check_id, Registry, RegistryError, ServiceRecord, TtlCheck};

/// Commands sent to the registry task
enum RegistryCommand {
    List(oneshot::Sender<Vec<ServiceRecord>>),
    Register(ServiceRecord, Option<TtlCheck>, oneshot::Sender<()>),
    Deregister(String, oneshot::Sender<Result<(), RegistryError>>),
    UpdateCheck {
        name: String,
        status: CheckStatus,
        reply: oneshot::Sender<Result<(), RegistryError>>,
    },
    GetCheck(String, oneshot::Sender<Option<CheckState>>),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckState {
    pub ttl: Duration,
    pub status: CheckStatus,
}

struct Entry {
    record: ServiceRecord,
    check: Option<CheckState>,
}

/// Handle to the in-memory registry task
#[derive(Clone)]
pub struct MemoryRegistry {
    tx: mpsc::Sender<RegistryCommand>,
}

fn stopped<T>(_: T) -> RegistryError {
    RegistryError::Unavailable("memory registry task stopped".to_string())
}

impl MemoryRegistry {
    /// Spawn the registry task on the current runtime
    pub fn spawn() -> Self {
        let (tx, mut rx) = mpsc::channel::<RegistryCommand>(256);

        tokio::spawn(async move {
            let mut services: BTreeMap<String, Entry> = BTreeMap::new();

            while let Some(cmd) = rx.recv().await {
                match cmd {
                    RegistryCommand::List(reply) => {
                        let records = services.values().map(|e| e.record.clone()).collect();
                        let _ = reply.send(records);
                    }
                    RegistryCommand::Register(record, check, reply) => {
                        // New TTL checks start critical until the first update
                        let check = check.map(|c| CheckState {
                            ttl: c.ttl,
                            status: CheckStatus::Critical,
                        });
                        services.insert(record.name.clone(), Entry { record, check });
                        let _ = reply.send(());
                    }
                    RegistryCommand::Deregister(name, reply) => {
                        let result = match services.remove(&name) {
                            Some(_) => Ok(()),
                            None => Err(RegistryError::Rejected(format!(
                                "Unknown service ID {:?}",
                                name
                            ))),
                        };
                        let _ = reply.send(result);
                    }
                    RegistryCommand::UpdateCheck { name, status, reply } => {
                        let result = match services.get_mut(&name).and_then(|e| e.check.as_mut()) {
                            Some(check) => {
                                check.status = status;
                                Ok(())
                            }
                            None => Err(RegistryError::Rejected(format!(
                                "CheckID {:?} does not have associated TTL",
                                service_check_id(&name)
                            ))),
                        };
                        let _ = reply.send(result);
                    }
                    RegistryCommand::GetCheck(name, reply) => {
                        let _ = reply.send(services.get(&name).and_then(|e| e.check));
                    }
                    RegistryCommand::Shutdown => {
                        tracing::info!("Memory registry shutting down");
                        break;
                    }
                }
            }
        });

        Self { tx }
    }

    /// Current state of a service's TTL check
    pub async fn check_state(&self, name: &str) -> Result<Option<CheckState>, RegistryError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RegistryCommand::GetCheck(name.to_string(), reply))
            .await
            .map_err(stopped)?;
        rx.await.map_err(stopped)
    }

    /// Stop the registry task
    pub async fn shutdown(&self) -> Result<(), RegistryError> {
        self.tx.send(RegistryCommand::Shutdown).await.map_err(stopped)
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn list_all(&self) -> Result<Vec<ServiceRecord>, RegistryError> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(RegistryCommand::List(reply)).await.map_err(stopped)?;
        rx.await.map_err(stopped)
    }

    async fn register(
        &self,
        record: ServiceRecord,
        check: Option<TtlCheck>,
    ) -> Result<(), RegistryError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RegistryCommand::Register(record, check, reply))
            .await
            .map_err(stopped)?;
        rx.await.map_err(stopped)
    }

    async fn deregister(&self, name: &str) -> Result<(), RegistryError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RegistryCommand::Deregister(name.to_string(), reply))
            .await
            .map_err(stopped)?;
        rx.await.map_err(stopped)?
    }

    async fn update_check_status(
        &self,
        name: &str,
        status: CheckStatus,
    ) -> Result<(), RegistryError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RegistryCommand::UpdateCheck {
                name: name.to_string(),
                status,
                reply,
            })
            .await
            .map_err(stopped)?;
        rx.await.map_err(stopped)?
    }
}
