// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Message router and the one-shot specialization state machine.
//!
//! Before specialization the router answers the platform's bootstrap
//! messages itself and holds back everything else. The first environment
//! reload request applies the environment, launches the application, waits
//! for it to report ready, and then hands it the reload request followed by
//! every held-back message. From then on all messages go straight to the
//! application.
//!
//! ```text
//!            ┌──────────── reload ────────────┐
//!            │                                ▼
//!   NotStarted ──(apply env, launch, wait ready)──► Completed
//!      │  ▲                                            │
//!      └──┘ init / metadata answered,                  └─► forward everything
//!           others deferred
//! ```
//!
//! All routing decisions are taken under one FIFO async mutex that the
//! specialization sequence keeps for its whole duration, so a message that
//! arrives mid-specialization is routed only after the state flipped and is
//! delivered after the reload request.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use fnhost_protocol::StreamingMessage;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard, Semaphore, watch};
use tracing::{debug, error, info, instrument, warn};

use crate::channel::{ChannelError, MessageChannel};
use crate::environment::{EnvironmentApplier, EnvironmentSnapshot, ProcessEnvironment};
use crate::loader::{ExitNotifier, LaunchContext, Launcher};
use crate::message::{self, WorkerInfo};
use crate::ready::ReadySignal;
use crate::resolver::{PathResolver, WorkerConfigResolver};

/// Default number of bootstrap responses built concurrently by [`MessageRouter::dispatch`].
pub const DEFAULT_BOOTSTRAP_CONCURRENCY: usize = 16;

/// Process-wide specialization state. Moves forward exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecializationState {
    NotStarted,
    Completed,
}

/// What the router did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// A synthesized bootstrap response was produced.
    Answered,
    /// The message went to the application's inbound queue.
    Forwarded,
    /// The message started specialization.
    Specialized,
    /// Held until specialization completes.
    Deferred,
}

/// Router errors.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("router requires a {0}")]
    Missing(&'static str),

    #[error("bootstrap concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("bootstrap pool closed")]
    PoolClosed,
}

/// Router tuning.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Upper bound on outstanding bootstrap response tasks.
    pub bootstrap_concurrency: usize,
    /// Identity reported in synthesized responses.
    pub worker_info: WorkerInfo,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            bootstrap_concurrency: DEFAULT_BOOTSTRAP_CONCURRENCY,
            worker_info: WorkerInfo::default(),
        }
    }
}

#[derive(Debug)]
struct RouterState {
    phase: SpecializationState,
    deferred: Vec<StreamingMessage>,
}

/// Inputs of one specialization, extracted from the reload request.
struct SpecializationPlan {
    environment: EnvironmentSnapshot,
    application_dir: PathBuf,
}

enum Admission {
    Done(Disposition),
    Bootstrap(StreamingMessage),
    Specialize {
        guard: OwnedMutexGuard<RouterState>,
        plan: SpecializationPlan,
        request: StreamingMessage,
    },
}

/// Routes every message received from the platform host.
pub struct MessageRouter {
    state: Arc<Mutex<RouterState>>,
    phase: watch::Sender<SpecializationState>,
    channel: Arc<MessageChannel>,
    ready: ReadySignal,
    exit: ExitNotifier,
    environment: Arc<dyn EnvironmentApplier>,
    resolver: Arc<dyn PathResolver>,
    launcher: Arc<dyn Launcher>,
    bootstrap_permits: Arc<Semaphore>,
    worker_info: WorkerInfo,
}

impl MessageRouter {
    pub fn builder() -> MessageRouterBuilder {
        MessageRouterBuilder::default()
    }

    /// Current specialization state.
    pub fn state(&self) -> SpecializationState {
        *self.phase.borrow()
    }

    /// Observe specialization state changes.
    pub fn subscribe(&self) -> watch::Receiver<SpecializationState> {
        self.phase.subscribe()
    }

    pub fn channel(&self) -> &Arc<MessageChannel> {
        &self.channel
    }

    pub fn ready(&self) -> &ReadySignal {
        &self.ready
    }

    /// Reports the launched application's termination.
    pub fn exit_notifier(&self) -> &ExitNotifier {
        &self.exit
    }

    /// Route one message and finish handling it before returning.
    ///
    /// A reload request that starts specialization keeps this call suspended
    /// until the application is ready, which may be forever.
    #[instrument(skip_all, fields(request_id = %message.request_id, kind = message::content_name(&message)))]
    pub async fn route(&self, message: StreamingMessage) -> Result<Disposition, RouterError> {
        match self.admit(message).await? {
            Admission::Done(disposition) => Ok(disposition),
            Admission::Bootstrap(request) => {
                self.answer(&request)?;
                Ok(Disposition::Answered)
            }
            Admission::Specialize {
                guard,
                plan,
                request,
            } => {
                self.specialize(guard, plan, request).await?;
                Ok(Disposition::Specialized)
            }
        }
    }

    /// Route one message without waiting for slow work.
    ///
    /// The routing decision is still taken in call order. Bootstrap responses
    /// are built on a bounded task pool and specialization runs on its own
    /// task, so the caller can keep reading the stream.
    #[instrument(skip_all, fields(request_id = %message.request_id, kind = message::content_name(&message)))]
    pub async fn dispatch(self: &Arc<Self>, message: StreamingMessage) -> Result<Disposition, RouterError> {
        match self.admit(message).await? {
            Admission::Done(disposition) => Ok(disposition),
            Admission::Bootstrap(request) => {
                let permit = self
                    .bootstrap_permits
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| RouterError::PoolClosed)?;
                let router = Arc::clone(self);
                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(e) = router.answer(&request) {
                        warn!(error = %e, request_id = %request.request_id, "Failed to queue bootstrap response");
                    }
                });
                Ok(Disposition::Answered)
            }
            Admission::Specialize {
                guard,
                plan,
                request,
            } => {
                let router = Arc::clone(self);
                tokio::spawn(async move {
                    if let Err(e) = router.specialize(guard, plan, request).await {
                        error!(error = %e, "Specialization failed to hand off messages");
                    }
                });
                Ok(Disposition::Specialized)
            }
        }
    }

    /// Take the routing decision under the state lock.
    async fn admit(&self, message: StreamingMessage) -> Result<Admission, RouterError> {
        let mut guard = Arc::clone(&self.state).lock_owned().await;

        if guard.phase == SpecializationState::Completed {
            self.channel.enqueue_inbound(message)?;
            return Ok(Admission::Done(Disposition::Forwarded));
        }

        if message::classify(&message).is_bootstrap() {
            return Ok(Admission::Bootstrap(message));
        }

        let plan = match message::reload_request(&message) {
            Some(reload) => SpecializationPlan {
                environment: EnvironmentSnapshot::from_request(reload),
                application_dir: PathBuf::from(&reload.function_app_directory),
            },
            None => {
                warn!(
                    kind = message::content_name(&message),
                    "Deferring message until specialization completes"
                );
                guard.deferred.push(message);
                return Ok(Admission::Done(Disposition::Deferred));
            }
        };

        Ok(Admission::Specialize {
            guard,
            plan,
            request: message,
        })
    }

    fn answer(&self, request: &StreamingMessage) -> Result<(), RouterError> {
        if let Some(response) = message::bootstrap_response(request, &self.worker_info) {
            debug!(request_id = %request.request_id, kind = message::content_name(&response), "Answering bootstrap request");
            self.channel.enqueue_outbound(response)?;
        }
        Ok(())
    }

    #[instrument(skip_all, fields(request_id = %request.request_id, dir = %plan.application_dir.display()))]
    async fn specialize(
        &self,
        mut guard: OwnedMutexGuard<RouterState>,
        plan: SpecializationPlan,
        request: StreamingMessage,
    ) -> Result<(), RouterError> {
        let started = Instant::now();
        info!(variables = plan.environment.len(), "Specialization started");

        let report = self.environment.apply(plan.environment);
        info!(
            applied = report.applied,
            skipped = report.skipped.len(),
            "Environment applied"
        );

        match self.resolver.resolve(&plan.application_dir) {
            Ok(target) => {
                let context = LaunchContext {
                    channel: Arc::clone(&self.channel),
                    ready: self.ready.clone(),
                    exit: self.exit.clone(),
                };
                match self.launcher.launch(&target, context).await {
                    Ok(handle) => info!(
                        launcher = self.launcher.launcher_type(),
                        handle_id = %handle.handle_id,
                        "Application launched"
                    ),
                    Err(e) => error!(
                        error = %e,
                        "Failed to launch application, specialization cannot complete"
                    ),
                }
            }
            Err(e) => error!(
                error = %e,
                "Failed to resolve application, specialization cannot complete"
            ),
        }

        self.ready.wait().await;
        debug!("Application ready");

        let handed_off = self.hand_off(request, &mut guard);

        guard.phase = SpecializationState::Completed;
        self.phase.send_replace(SpecializationState::Completed);
        drop(guard);

        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Specialization completed"
        );
        handed_off
    }

    /// Queue the reload request, then everything deferred, in arrival order.
    fn hand_off(&self, request: StreamingMessage, state: &mut RouterState) -> Result<(), RouterError> {
        self.channel.enqueue_inbound(request)?;
        let deferred = std::mem::take(&mut state.deferred);
        if !deferred.is_empty() {
            info!(count = deferred.len(), "Replaying deferred messages");
        }
        for message in deferred {
            self.channel.enqueue_inbound(message)?;
        }
        Ok(())
    }
}

/// Builder for [`MessageRouter`].
#[derive(Default)]
pub struct MessageRouterBuilder {
    channel: Option<Arc<MessageChannel>>,
    ready: Option<ReadySignal>,
    exit: Option<ExitNotifier>,
    environment: Option<Arc<dyn EnvironmentApplier>>,
    resolver: Option<Arc<dyn PathResolver>>,
    launcher: Option<Arc<dyn Launcher>>,
    config: RouterConfig,
}

impl MessageRouterBuilder {
    pub fn channel(mut self, channel: Arc<MessageChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn ready(mut self, ready: ReadySignal) -> Self {
        self.ready = Some(ready);
        self
    }

    pub fn exit_notifier(mut self, exit: ExitNotifier) -> Self {
        self.exit = Some(exit);
        self
    }

    /// Defaults to [`ProcessEnvironment`].
    pub fn environment(mut self, environment: Arc<dyn EnvironmentApplier>) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Defaults to [`WorkerConfigResolver`].
    pub fn resolver(mut self, resolver: Arc<dyn PathResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Required.
    pub fn launcher(mut self, launcher: Arc<dyn Launcher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    pub fn config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Arc<MessageRouter>, RouterError> {
        let launcher = self.launcher.ok_or(RouterError::Missing("launcher"))?;
        if self.config.bootstrap_concurrency == 0 {
            return Err(RouterError::ZeroConcurrency);
        }

        let (phase, _rx) = watch::channel(SpecializationState::NotStarted);
        Ok(Arc::new(MessageRouter {
            state: Arc::new(Mutex::new(RouterState {
                phase: SpecializationState::NotStarted,
                deferred: Vec::new(),
            })),
            phase,
            channel: self.channel.unwrap_or_default(),
            ready: self.ready.unwrap_or_default(),
            exit: self.exit.unwrap_or_default(),
            environment: self
                .environment
                .unwrap_or_else(|| Arc::new(ProcessEnvironment)),
            resolver: self
                .resolver
                .unwrap_or_else(|| Arc::new(WorkerConfigResolver)),
            launcher,
            bootstrap_permits: Arc::new(Semaphore::new(self.config.bootstrap_concurrency)),
            worker_info: self.config.worker_info,
        }))
    }
}
