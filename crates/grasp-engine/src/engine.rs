//! The engine: saved configs in, meeting bindings out.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use grasp_core::chat::ChatSink;
use grasp_core::config::{GraspConfig, GraspNode};
use grasp_core::errors::IngestionError;
use grasp_core::ids::{ConfigId, MeetingId};
use grasp_core::invoker::ModelInvoker;
use grasp_core::transcript::TranscriptEvent;
use grasp_core::validate::{parse_and_validate, validate_semantics};
use grasp_store::ConfigRepo;

use crate::binding::{ActiveBinding, BindingInfo, BindingTable};
use crate::context::{ContextRegistry, MeetingContext};
use crate::error::EngineError;
use crate::ingestion::{IngestOutcome, TranscriptIngestion};
use crate::reporter::ErrorReporter;
use crate::router::OutputRouter;
use crate::scheduler::{CycleScope, Scheduler};
use crate::settings::EngineSettings;

pub struct GraspEngine {
    configs: ConfigRepo,
    contexts: Arc<ContextRegistry>,
    ingestion: TranscriptIngestion,
    bindings: BindingTable,
    scheduler: Arc<Scheduler>,
    reporter: ErrorReporter,
}

impl GraspEngine {
    pub fn new(
        configs: ConfigRepo,
        invoker: Arc<dyn ModelInvoker>,
        chat: Arc<dyn ChatSink>,
        settings: EngineSettings,
    ) -> Self {
        let contexts = Arc::new(ContextRegistry::new(
            settings.window_capacity,
            settings.dedup_id_capacity,
        ));
        let bindings = BindingTable::default();
        let scheduler = Arc::new(Scheduler::new(
            invoker,
            OutputRouter::new(Arc::clone(&chat)),
            settings,
            bindings.clone(),
        ));
        Self {
            configs,
            ingestion: TranscriptIngestion::new(Arc::clone(&contexts)),
            contexts,
            bindings,
            scheduler,
            reporter: ErrorReporter::new(chat),
        }
    }

    /// Validate structurally and persist. Nothing is written on error.
    pub fn save_config(&self, name: &str, source: &str) -> Result<GraspConfig, EngineError> {
        Ok(self.configs.create(name, source)?)
    }

    pub fn read_config(&self, id: &ConfigId) -> Result<GraspConfig, EngineError> {
        Ok(self.configs.read(id)?)
    }

    pub fn list_configs(&self) -> Result<Vec<GraspConfig>, EngineError> {
        Ok(self.configs.list()?)
    }

    /// Run every check a config goes through on its way to a meeting,
    /// without saving or binding anything.
    pub fn check_config(source: &str) -> Result<Vec<GraspNode>, EngineError> {
        let nodes = parse_and_validate(source)?;
        validate_semantics(&nodes)?;
        Ok(nodes)
    }

    /// Apply a saved config to a meeting, replacing whatever was bound.
    ///
    /// On a semantic failure the meeting is told once in chat, no timer is
    /// started and the previous binding keeps running.
    #[instrument(skip_all, fields(meeting_id = %meeting_id, config_id = %config_id))]
    pub async fn bind(
        &self,
        meeting_id: &MeetingId,
        config_id: &ConfigId,
    ) -> Result<BindingInfo, EngineError> {
        let config = self.configs.read(config_id)?;

        if let Err(e) = validate_semantics(&config.nodes) {
            self.reporter
                .report_apply_failure(meeting_id, &config.name, &e)
                .await;
            return Err(e.into());
        }

        let scope = CycleScope::new(meeting_id.clone(), self.contexts.get_or_create(meeting_id));
        let info = BindingInfo {
            binding_id: scope.binding_id.clone(),
            config_id: config.id.clone(),
            config_name: config.name.clone(),
            node_ids: config.nodes.iter().map(|n| n.node_id.clone()).collect(),
            bound_at: Utc::now(),
        };

        let tasks = self.scheduler.start(&scope, &config.nodes);
        let binding = ActiveBinding {
            info: info.clone(),
            cancel: scope.cancel,
            commit: scope.commit,
            tasks,
        };

        if let Some(previous) = self.bindings.replace(meeting_id.clone(), binding) {
            info!(
                meeting_id = %meeting_id,
                binding_id = %previous.info.binding_id,
                config = %previous.info.config_name,
                "previous binding replaced"
            );
            previous.stop().await;
        }

        info!(
            meeting_id = %meeting_id,
            binding_id = %info.binding_id,
            config = %info.config_name,
            nodes = info.node_ids.len(),
            "config bound"
        );
        Ok(info)
    }

    /// Stop the meeting's binding. The transcript and notes are kept.
    /// In-flight cycles finish in the background and commit nothing.
    pub async fn unbind(&self, meeting_id: &MeetingId) -> bool {
        self.stop_binding(meeting_id).await.is_some()
    }

    /// Stop the binding, wait for its in-flight cycles, and drop everything
    /// held for the meeting.
    pub async fn end_meeting(&self, meeting_id: &MeetingId) {
        if let Some(tasks) = self.stop_binding(meeting_id).await {
            join_tasks(tasks).await;
        }
        if self.contexts.remove(meeting_id).is_some() {
            info!(meeting_id = %meeting_id, "meeting ended");
        }
    }

    /// Stop every binding and wait for in-flight cycles to wind down.
    /// Returns how many bindings were stopped.
    pub async fn shutdown(&self) -> usize {
        let stopped = self.bindings.drain();
        let count = stopped.len();
        let mut tasks = Vec::new();
        for binding in stopped {
            tasks.extend(binding.stop().await);
        }
        join_tasks(tasks).await;
        info!(bindings = count, "engine shut down");
        count
    }

    async fn stop_binding(&self, meeting_id: &MeetingId) -> Option<Vec<JoinHandle<()>>> {
        let binding = self.bindings.remove(meeting_id)?;
        info!(meeting_id = %meeting_id, binding_id = %binding.info.binding_id, "binding stopped");
        Some(binding.stop().await)
    }

    pub fn active_binding(&self, meeting_id: &MeetingId) -> Option<BindingInfo> {
        self.bindings.info(meeting_id)
    }

    pub fn active_bindings(&self) -> usize {
        self.bindings.len()
    }

    pub fn ingest(&self, event: TranscriptEvent) -> Result<IngestOutcome, IngestionError> {
        self.ingestion.accept(event)
    }

    pub fn context(&self, meeting_id: &MeetingId) -> Option<Arc<MeetingContext>> {
        self.contexts.get(meeting_id)
    }
}

async fn join_tasks(tasks: Vec<JoinHandle<()>>) {
    for result in futures::future::join_all(tasks).await {
        if let Err(e) = result {
            warn!(error = %e, "node task ended abnormally");
        }
    }
}
