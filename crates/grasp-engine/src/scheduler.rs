//! Per-node firing loops.
//!
//! Each node of a binding runs in its own task on a repeating timer whose
//! first tick is one full interval after activation. A cycle renders the
//! template, invokes the model, parses the decision and routes it. Ticks
//! missed while a cycle overruns are skipped.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use grasp_core::config::GraspNode;
use grasp_core::decision::Decision;
use grasp_core::errors::InvocationError;
use grasp_core::ids::{BindingId, MeetingId};
use grasp_core::invoker::ModelInvoker;

use crate::binding::BindingTable;
use crate::context::MeetingContext;
use crate::renderer;
use crate::router::{OutputRouter, RouteOutcome};
use crate::settings::EngineSettings;

/// How one firing ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The decision was committed to chat or notes.
    Intervened,
    /// The model chose not to intervene.
    Quiet,
    /// The binding was stopped or replaced while the cycle ran.
    Discarded,
    /// Invocation, parsing or dispatch failed. Nothing was committed.
    Failed,
}

/// Everything a node's cycles share for one binding.
#[derive(Clone)]
pub struct CycleScope {
    pub meeting_id: MeetingId,
    pub binding_id: BindingId,
    pub context: Arc<MeetingContext>,
    pub cancel: CancellationToken,
    /// Held shared while a cycle commits. Stopping the binding takes it
    /// exclusively, so nothing lands after the stop returns.
    pub commit: Arc<RwLock<()>>,
}

impl CycleScope {
    pub fn new(meeting_id: MeetingId, context: Arc<MeetingContext>) -> Self {
        Self {
            meeting_id,
            binding_id: BindingId::new(),
            context,
            cancel: CancellationToken::new(),
            commit: Arc::new(RwLock::new(())),
        }
    }
}

pub struct Scheduler {
    invoker: Arc<dyn ModelInvoker>,
    router: OutputRouter,
    settings: EngineSettings,
    bindings: BindingTable,
}

impl Scheduler {
    pub(crate) fn new(
        invoker: Arc<dyn ModelInvoker>,
        router: OutputRouter,
        settings: EngineSettings,
        bindings: BindingTable,
    ) -> Self {
        Self {
            invoker,
            router,
            settings,
            bindings,
        }
    }

    /// Spawn one timer task per node. Tasks exit when `scope.cancel` fires.
    pub fn start(self: &Arc<Self>, scope: &CycleScope, nodes: &[GraspNode]) -> Vec<JoinHandle<()>> {
        nodes
            .iter()
            .map(|node| {
                let scheduler = Arc::clone(self);
                let scope = scope.clone();
                let node = node.clone();
                tokio::spawn(async move { scheduler.run_node(scope, node).await })
            })
            .collect()
    }

    async fn run_node(&self, scope: CycleScope, node: GraspNode) {
        let period = Duration::from_secs(node.interval_sec.max(1));
        let Some(first_tick) = Instant::now().checked_add(period) else {
            warn!(
                meeting_id = %scope.meeting_id,
                node_id = %node.node_id,
                interval_sec = node.interval_sec,
                "interval out of range, node not scheduled"
            );
            return;
        };
        let mut ticker = time::interval_at(first_tick, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut idle_since = Instant::now();

        debug!(meeting_id = %scope.meeting_id, node_id = %node.node_id, interval_sec = node.interval_sec, "node timer started");
        loop {
            tokio::select! {
                biased;
                () = scope.cancel.cancelled() => break,
                scheduled = ticker.tick() => {
                    // A tick that came due while the previous cycle was still running is dropped.
                    if scheduled < idle_since {
                        debug!(meeting_id = %scope.meeting_id, node_id = %node.node_id, "tick skipped, previous cycle overran");
                    } else {
                        let outcome = self.run_cycle(&scope, &node).await;
                        idle_since = Instant::now();
                        debug!(meeting_id = %scope.meeting_id, node_id = %node.node_id, ?outcome, "cycle finished");
                    }
                }
            }
        }
        debug!(meeting_id = %scope.meeting_id, node_id = %node.node_id, "node timer stopped");
    }

    /// One Idle -> Firing -> Idle pass. Never retried.
    pub async fn run_cycle(&self, scope: &CycleScope, node: &GraspNode) -> CycleOutcome {
        let prompt = renderer::render(node.template(), &scope.context, Utc::now().timestamp_millis());

        let raw = match time::timeout(self.settings.invoke_timeout, self.invoker.invoke(&prompt.text)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => return self.abandon(scope, node, &e),
            Err(_) => {
                return self.abandon(scope, node, &InvocationError::Timeout(self.settings.invoke_timeout))
            }
        };

        let decision = match Decision::parse(&raw, self.settings.max_response_bytes) {
            Ok(d) => d,
            Err(e) => return self.abandon(scope, node, &e),
        };

        let _commit = scope.commit.read().await;
        if scope.cancel.is_cancelled() || !self.bindings.is_current(&scope.meeting_id, &scope.binding_id) {
            debug!(
                meeting_id = %scope.meeting_id,
                binding_id = %scope.binding_id,
                node_id = %node.node_id,
                "binding no longer active, output discarded"
            );
            return CycleOutcome::Discarded;
        }

        match self.router.route(&scope.context, node, &decision).await {
            Ok(RouteOutcome::Skipped) => CycleOutcome::Quiet,
            Ok(route) => {
                info!(meeting_id = %scope.meeting_id, node_id = %node.node_id, ?route, "node intervened");
                CycleOutcome::Intervened
            }
            Err(e) => {
                warn!(meeting_id = %scope.meeting_id, node_id = %node.node_id, error = %e, "dispatch failed");
                CycleOutcome::Failed
            }
        }
    }

    fn abandon(&self, scope: &CycleScope, node: &GraspNode, err: &InvocationError) -> CycleOutcome {
        warn!(
            meeting_id = %scope.meeting_id,
            node_id = %node.node_id,
            model = self.invoker.name(),
            error_kind = err.error_kind(),
            error = %err,
            "cycle abandoned"
        );
        CycleOutcome::Failed
    }
}
