// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Runs an application as a task inside the host process.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use super::traits::{ApplicationExit, LaunchContext, LaunchHandle, Launcher, Result};
use crate::channel::{Consumer, MessageChannel};
use crate::ready::ReadySignal;
use crate::resolver::LaunchTarget;

/// What an in-process application receives when started.
#[derive(Debug)]
pub struct ApplicationContext {
    /// Messages routed to the application, in delivery order.
    pub inbound: Consumer,
    /// Used to send replies to the platform host.
    pub channel: Arc<MessageChannel>,
    /// Must be signalled once `inbound` is being consumed.
    pub ready: ReadySignal,
    pub target: LaunchTarget,
}

/// An application hosted in the same process.
#[async_trait]
pub trait Application: Send + Sync + 'static {
    async fn run(&self, context: ApplicationContext) -> anyhow::Result<()>;
}

struct FnApplication<F>(F);

#[async_trait]
impl<F, Fut> Application for FnApplication<F>
where
    F: Fn(ApplicationContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn run(&self, context: ApplicationContext) -> anyhow::Result<()> {
        (self.0)(context).await
    }
}

/// Wrap an async closure as an [`Application`].
pub fn application_fn<F, Fut>(f: F) -> Arc<dyn Application>
where
    F: Fn(ApplicationContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnApplication(f))
}

/// Launcher that spawns an [`Application`] on the tokio runtime.
pub struct InProcessLauncher {
    application: Arc<dyn Application>,
}

impl InProcessLauncher {
    pub fn new(application: Arc<dyn Application>) -> Self {
        Self { application }
    }
}

#[async_trait]
impl Launcher for InProcessLauncher {
    fn launcher_type(&self) -> &'static str {
        "in-process"
    }

    async fn launch(&self, target: &LaunchTarget, context: LaunchContext) -> Result<LaunchHandle> {
        let inbound = context.channel.take_inbound()?;
        let app_context = ApplicationContext {
            inbound,
            channel: context.channel.clone(),
            ready: context.ready.clone(),
            target: target.clone(),
        };

        let application = self.application.clone();
        let task = tokio::spawn(async move { application.run(app_context).await });
        let handle_id = format!("task-{}", task.id());

        let exit = context.exit;
        tokio::spawn(async move {
            let outcome = match task.await {
                Ok(Ok(())) => {
                    info!("In-process application returned");
                    ApplicationExit::Returned
                }
                Ok(Err(e)) => {
                    error!(error = %e, "In-process application failed");
                    ApplicationExit::Failed(e.to_string())
                }
                Err(e) if e.is_panic() => {
                    error!("In-process application panicked");
                    ApplicationExit::Failed("panicked".to_string())
                }
                Err(e) => ApplicationExit::Failed(e.to_string()),
            };
            exit.report(outcome);
        });

        Ok(LaunchHandle {
            handle_id,
            started_at: chrono::Utc::now(),
            pid: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::ExitNotifier;
    use std::path::PathBuf;
    use std::time::Duration;

    fn target() -> LaunchTarget {
        LaunchTarget {
            program: PathBuf::from("in-process"),
            arguments: vec![],
            working_dir: PathBuf::from("."),
        }
    }

    fn context() -> LaunchContext {
        LaunchContext {
            channel: Arc::new(MessageChannel::new()),
            ready: ReadySignal::new(),
            exit: ExitNotifier::new(),
        }
    }

    #[tokio::test]
    async fn test_launch_runs_application_and_reports_return() {
        let ctx = context();
        let launcher = InProcessLauncher::new(application_fn(|app: ApplicationContext| async move {
            app.ready.signal();
            Ok(())
        }));

        let handle = launcher.launch(&target(), ctx.clone()).await.unwrap();
        assert!(handle.handle_id.starts_with("task-"));
        assert!(handle.pid.is_none());

        let mut exit = ctx.exit.subscribe();
        tokio::time::timeout(Duration::from_secs(1), exit.wait_for(|e| e.is_some()))
            .await
            .unwrap()
            .unwrap();
        assert!(ctx.ready.is_set());
        assert_eq!(ctx.exit.exit(), Some(ApplicationExit::Returned));
    }

    #[tokio::test]
    async fn test_panic_is_reported_as_failure() {
        let ctx = context();
        let launcher = InProcessLauncher::new(application_fn(|_app: ApplicationContext| async move {
            let missing: Option<()> = None;
            missing.expect("application blew up");
            Ok(())
        }));

        launcher.launch(&target(), ctx.clone()).await.unwrap();

        let mut exit = ctx.exit.subscribe();
        tokio::time::timeout(Duration::from_secs(1), exit.wait_for(|e| e.is_some()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            ctx.exit.exit(),
            Some(ApplicationExit::Failed("panicked".to_string()))
        );
    }

    #[tokio::test]
    async fn test_launch_claims_inbound_queue() {
        let ctx = context();
        let launcher = InProcessLauncher::new(application_fn(|_app: ApplicationContext| async move {
            std::future::pending::<()>().await;
            Ok(())
        }));

        launcher.launch(&target(), ctx.clone()).await.unwrap();
        assert!(ctx.channel.take_inbound().is_err());
        assert!(launcher.launch(&target(), ctx).await.is_err());
    }
}
