use std::time::Duration;

use aegis_core::RbacBootstrapService;
use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::infra::app_state::AppState;

#[async_trait]
pub trait StartupHooks: Send + Sync {
    async fn run(&self, state: &AppState) -> Result<()>;
}

/// Seeds roles and permissions, then starts the expired-session sweep.
#[derive(Debug, Default)]
pub struct ProdStartupHooks;

#[async_trait]
impl StartupHooks for ProdStartupHooks {
    async fn run(&self, state: &AppState) -> Result<()> {
        RbacBootstrapService::new(state.unit_of_work.roles.clone())
            .ensure_defaults()
            .await
            .context("failed to bootstrap RBAC defaults")?;
        info!("RBAC defaults ensured");

        spawn_session_purge(state.clone(), state.config().sessions.purge_interval);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct NoopStartupHooks;

#[async_trait]
impl StartupHooks for NoopStartupHooks {
    async fn run(&self, _state: &AppState) -> Result<()> {
        Ok(())
    }
}

/// Delete expired refresh sessions every `every` until shutdown.
pub fn spawn_session_purge(state: AppState, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => {
                    debug!("session purge stopped");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(err) = state.lifecycle().sessions().purge_expired().await {
                        warn!(error = %err, "session purge failed");
                    }
                }
            }
        }
    })
}
