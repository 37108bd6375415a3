//! Request orchestration
//!
//! Composes the pipeline for one request: validate, issue an identifier,
//! stage the input, run the worker, derive the relation table, persist the
//! record. Validation and worker failures abort the request; a failed join
//! only downgrades the stored generation status.

pub mod request;
pub mod state;

pub use request::{AnalysisRequest, RawAnalysisRequest};
pub use state::{RequestState, RequestTracker};

use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::join::join;
use crate::results::{
    JoinGeneration, RequestParams, ResultId, ResultRecord, ResultStore, StagedInput,
};
use crate::subprocess::ProcessRunner;
use crate::worker::{WorkerArgs, WorkerInvoker};

/// What a completed request produced
#[derive(Debug, Clone)]
pub struct PredictionOutcome {
    pub record: ResultRecord,
    pub record_path: PathBuf,
}

pub struct PredictionOrchestrator {
    store: ResultStore,
    worker: WorkerInvoker,
    reference_table: PathBuf,
}

impl PredictionOrchestrator {
    pub fn new(store: ResultStore, worker: WorkerInvoker, reference_table: PathBuf) -> Self {
        Self {
            store,
            worker,
            reference_table,
        }
    }

    pub fn from_config(config: &PipelineConfig, runner: Arc<dyn ProcessRunner>) -> Self {
        Self::new(
            ResultStore::from_config(config),
            WorkerInvoker::new(runner, config.worker.clone()),
            config.reference_table.clone(),
        )
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// Run one prediction request end to end
    pub async fn run(&self, raw: RawAnalysisRequest) -> Result<PredictionOutcome> {
        let request = AnalysisRequest::parse(raw).inspect_err(|e| {
            warn!("Rejected prediction request: {}", e);
        })?;
        let AnalysisRequest {
            source,
            alpha,
            clusters,
            params,
        } = request;

        let id = ResultId::generate();
        info!(result_id = %id, alpha, clusters, "Accepted prediction request");
        let mut tracker = RequestTracker::new(id.clone());

        let staged = match self.store.stage_input(&id, source).await {
            Ok(staged) => staged,
            Err(e) => {
                tracker.fail(&e);
                return Err(e);
            }
        };
        tracker.advance(RequestState::InputResolved);

        let outcome = self.process(&mut tracker, &id, &staged, params).await;
        staged.cleanup().await;

        match &outcome {
            Ok(_) => tracker.advance(RequestState::Responded),
            Err(e) => tracker.fail(e),
        }
        outcome
    }

    async fn process(
        &self,
        tracker: &mut RequestTracker,
        id: &ResultId,
        staged: &StagedInput,
        params: RequestParams,
    ) -> Result<PredictionOutcome> {
        tracker.advance(RequestState::WorkerInvoked);
        let output = self
            .worker
            .invoke(WorkerArgs {
                input_path: &staged.path,
                alpha: &params.alpha,
                clusters: &params.clusters,
                result_id: id,
                scratch_base: self.store.layout().worker_scratch_dir(),
            })
            .await?;

        tracker.advance(RequestState::JoinAttempted);
        let generation = self.generate_relations(id).await;

        let record = ResultRecord::new(
            id.clone(),
            staged.descriptor.clone(),
            params,
            output.result,
            generation,
            Utc::now(),
            self.store.ttl(),
        );
        let record_path = self.store.persist(&record).await?;
        tracker.advance(RequestState::Persisted);

        Ok(PredictionOutcome {
            record,
            record_path,
        })
    }

    /// Derive the relation table; every failure degrades to `failed_or_skipped`
    async fn generate_relations(&self, id: &ResultId) -> JoinGeneration {
        let layout = self.store.layout();
        let cluster_table = layout.cluster_table_path(id);
        let output = layout.derived_table_path(id);
        let reference_table = self.reference_table.clone();

        let joined = tokio::task::spawn_blocking(move || {
            join(&cluster_table, &reference_table, &output)
        })
        .await;

        match joined {
            Ok(Ok(stats)) => {
                info!(
                    result_id = %id,
                    allowed_nodes = stats.allowed_nodes_count,
                    results = stats.results_count,
                    "Relation generation completed"
                );
                JoinGeneration::success(layout.derived_table_relative(id), stats)
            }
            Ok(Err(e)) if e.is_fatal() => {
                error!(result_id = %id, "Relation generation failed: {}", e.developer_message());
                JoinGeneration::failed_or_skipped()
            }
            Ok(Err(e)) => {
                warn!(result_id = %id, "Relation generation skipped: {}", e);
                JoinGeneration::failed_or_skipped()
            }
            Err(e) => {
                error!(result_id = %id, "Relation generation task aborted: {}", e);
                JoinGeneration::failed_or_skipped()
            }
        }
    }
}
