//! Run orchestration
//!
//! One run: load the checkpoint window, gather records (search job or direct
//! payload), assemble them into a single envelope while advancing the window,
//! deliver or print the envelope, then persist the advanced window.
//!
//! The window is only persisted once the batch has been handed off, so a
//! rejected delivery leaves the checkpoint where it was.

use chrono::Local;
use ferry_client::{ClientError, IngestClient, SearchClient};
use ferry_core::domain::envelope::{Envelope, SourceMode};
use ferry_core::domain::window::TimeWindow;
use std::sync::Arc;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::checkpoint::{CheckpointStore, LoadOutcome};
use crate::config::{Config, ConfigError};
use crate::error::Result;
use crate::repository::{
    HttpIngestRepository, HttpSearchRepository, IngestRepository, SearchRepository,
};
use crate::scheduler::{JobOutcome, SearchJobController, SearchQuery};
use crate::service::batch::{prepare_messages, prepare_payload};
use crate::service::{BatchAssembler, Deliverer};

/// What the caller asked this run to do
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub source: SourceMode,
    /// Advance and persist the checkpoint window
    pub checkpoint: bool,
    /// Post the envelope; otherwise it is only handed back
    pub deliver: bool,
    /// JSON text for the `json` source
    pub payload: Option<String>,
}

/// What happened to the envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent { response: String },
    /// Delivery was turned off for this run
    Disabled,
    /// The batch was empty
    NothingToSend,
}

#[derive(Debug)]
pub struct RunReport {
    pub envelope: Envelope,
    /// Search messages left out of the batch
    pub skipped: usize,
    pub delivery: Delivery,
    /// Window persisted at the end of the run, if it moved
    pub checkpoint: Option<TimeWindow>,
}

pub struct Pipeline {
    result_limit: u64,
    query: SearchQuery,
    checkpoints: CheckpointStore,
    controller: SearchJobController,
    deliverer: Deliverer,
}

impl Pipeline {
    pub fn new(
        config: &Config,
        search: Arc<dyn SearchRepository>,
        ingest: Arc<dyn IngestRepository>,
    ) -> Self {
        Self {
            result_limit: config.result_limit,
            query: SearchQuery::from_config(config),
            checkpoints: CheckpointStore::new(config.checkpoint_path.clone()),
            controller: SearchJobController::from_config(search, config),
            deliverer: Deliverer::new(ingest),
        }
    }

    /// Wires the pipeline to the real services
    pub fn from_config(config: &Config) -> std::result::Result<Self, ClientError> {
        let search = SearchClient::new(
            config.search_endpoint.clone(),
            config.access_id.clone(),
            config.access_key.clone(),
        )?;
        let ingest = IngestClient::new(config.ingest_endpoint.clone(), config.ingest_token.clone());

        Ok(Self::new(
            config,
            Arc::new(HttpSearchRepository::new(search)),
            Arc::new(HttpIngestRepository::new(ingest)),
        ))
    }

    /// Executes one run
    pub async fn run(&self, options: &RunOptions) -> Result<RunReport> {
        let span = info_span!("run", run_id = %Uuid::new_v4(), source = %options.source);
        self.run_inner(options).instrument(span).await
    }

    async fn run_inner(&self, options: &RunOptions) -> Result<RunReport> {
        let now = Local::now();
        let needs_window = options.checkpoint || options.source == SourceMode::Sumo;

        let mut window = if needs_window {
            Some(self.load_window()?)
        } else {
            None
        };
        let mut advanced = false;
        let mut assembler = BatchAssembler::new(options.source);

        match options.source {
            SourceMode::Json => {
                let payload = options.payload.as_deref().ok_or_else(|| ConfigError::Invalid {
                    key: "payload",
                    reason: "required for the json source".to_string(),
                })?;

                let seconds = assembler.push(prepare_payload(payload)?);
                if options.checkpoint {
                    advanced |= advance(window.as_mut(), seconds, now.timestamp());
                }
            }
            SourceMode::Sumo => {
                // Query everything since the last checkpoint, up to now
                let mut query_window =
                    window.unwrap_or_else(|| TimeWindow::starting_today(now));
                query_window.extend_to(now.timestamp());

                let outcome = self
                    .controller
                    .execute(&query_window, &self.query, self.result_limit)
                    .await?;

                match outcome {
                    JobOutcome::Cancelled { job } => {
                        info!(job_id = %job.id, "Search job cancelled, nothing to assemble");
                    }
                    JobOutcome::Completed { job, records } => {
                        debug!(job_id = %job.id, records = records.len(), "Assembling batch");

                        for (position, prepared) in prepare_messages(records) {
                            match prepared {
                                Ok(prepared) => {
                                    let seconds = assembler.push(prepared);
                                    if options.checkpoint {
                                        advanced |=
                                            advance(window.as_mut(), seconds, now.timestamp());
                                    }
                                }
                                Err(reason) => assembler.skip(position, &reason),
                            }
                        }
                    }
                }
            }
        }

        let skipped = assembler.skipped();
        if skipped > 0 {
            if assembler.is_empty() {
                warn!(skipped, "Every search message was skipped");
            } else {
                warn!(skipped, kept = assembler.len(), "Some search messages were skipped");
            }
        }
        let envelope = assembler.finish();

        let delivery = if envelope.is_empty() {
            info!("No events to deliver");
            Delivery::NothingToSend
        } else if options.deliver {
            let response = self.deliverer.send(&envelope).await?.into_result()?;
            info!(events = envelope.len(), "Envelope delivered");
            Delivery::Sent { response }
        } else {
            debug!(events = envelope.len(), "Delivery disabled");
            Delivery::Disabled
        };

        let checkpoint = match window {
            Some(window) if advanced => {
                self.checkpoints.save(&window)?;
                info!(start = window.start, end = window.end, "Checkpoint advanced");
                Some(window)
            }
            _ => None,
        };

        Ok(RunReport {
            envelope,
            skipped,
            delivery,
            checkpoint,
        })
    }

    fn load_window(&self) -> Result<TimeWindow> {
        let loaded = self.checkpoints.load()?;

        match &loaded.outcome {
            LoadOutcome::Restored => {
                debug!(path = %self.checkpoints.path().display(), "Resuming from checkpoint")
            }
            LoadOutcome::Created => info!("Created checkpoint with today's window"),
            LoadOutcome::Recovered { reason } => {
                warn!(%reason, "Checkpoint replaced with today's window")
            }
        }

        Ok(loaded.window)
    }
}

fn advance(window: Option<&mut TimeWindow>, seconds: Option<i64>, now: i64) -> bool {
    match (window, seconds) {
        (Some(window), Some(seconds)) => window.advance(seconds, now),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::repository::testing::{FakeIngest, FakeSearch, status, wrapped};
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    const T0: i64 = 1_667_448_000; // 2022-11-03T04:00:00Z

    fn config_in(dir: &TempDir) -> Config {
        Config {
            access_id: "id".to_string(),
            access_key: "key".to_string(),
            ingest_token: "token".to_string(),
            poll_interval: Duration::ZERO,
            max_poll_attempts: 3,
            checkpoint_path: dir.path().join("checkpoint.json"),
            ..Config::default()
        }
    }

    fn sumo(checkpoint: bool, deliver: bool) -> RunOptions {
        RunOptions {
            source: SourceMode::Sumo,
            checkpoint,
            deliver,
            payload: None,
        }
    }

    fn json_payload(payload: &str, checkpoint: bool, deliver: bool) -> RunOptions {
        RunOptions {
            source: SourceMode::Json,
            checkpoint,
            deliver,
            payload: Some(payload.to_string()),
        }
    }

    fn pipeline(
        dir: &TempDir,
        search: &Arc<FakeSearch>,
        ingest: &Arc<FakeIngest>,
    ) -> Pipeline {
        Pipeline::new(&config_in(dir), search.clone(), ingest.clone())
    }

    fn seed_checkpoint(dir: &TempDir, window: TimeWindow) {
        CheckpointStore::new(dir.path().join("checkpoint.json"))
            .save(&window)
            .unwrap();
    }

    #[tokio::test]
    async fn test_search_record_becomes_event() {
        let dir = TempDir::new().unwrap();
        let search = Arc::new(FakeSearch::done_with(vec![json!({
            "map": {"_raw": "{\"timestamp\":\"2022-11-03T04:05:00\",\"x\":1}"}
        })]));
        let ingest = Arc::new(FakeIngest::accepting());

        let report = pipeline(&dir, &search, &ingest)
            .run(&sumo(false, true))
            .await
            .unwrap();

        let expected_ts = ferry_core::time::to_epoch_nanos(
            ferry_core::time::parse("2022-11-03T04:05:00").unwrap(),
        );
        assert_eq!(report.envelope.len(), 1);
        assert_eq!(report.envelope.events[0].message().unwrap()["x"], 1);
        assert_eq!(report.envelope.events[0].timestamp_nanos, Some(expected_ts));
        assert!(matches!(report.delivery, Delivery::Sent { .. }));

        let received = ingest.received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0]["session"], "sumo");
        assert_eq!(received[0]["events"][0]["ts"], expected_ts.to_string());
        assert_eq!(received[0]["events"][0]["attrs"]["message"]["x"], 1);
    }

    #[tokio::test]
    async fn test_json_payload_without_delivery() {
        let dir = TempDir::new().unwrap();
        let search = Arc::new(FakeSearch::done_with(vec![]));
        let ingest = Arc::new(FakeIngest::accepting());

        let report = pipeline(&dir, &search, &ingest)
            .run(&json_payload(r#"{"a":1}"#, false, false))
            .await
            .unwrap();

        assert_eq!(report.envelope.session, "json");
        assert_eq!(report.envelope.len(), 1);
        assert_eq!(report.envelope.events[0].message().unwrap()["a"], 1);
        assert_eq!(report.envelope.events[0].timestamp_nanos, None);
        assert_eq!(report.delivery, Delivery::Disabled);
        assert_eq!(ingest.calls(), 0);
        assert!(search.submitted.lock().unwrap().is_empty());

        // Without checkpointing the json source never touches the checkpoint
        assert!(!dir.path().join("checkpoint.json").exists());
    }

    #[tokio::test]
    async fn test_malformed_payload_aborts_run() {
        let dir = TempDir::new().unwrap();
        let search = Arc::new(FakeSearch::done_with(vec![]));
        let ingest = Arc::new(FakeIngest::accepting());

        let err = pipeline(&dir, &search, &ingest)
            .run(&json_payload("{not json", false, true))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Payload(_)));
        assert_eq!(ingest.calls(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_job_delivers_nothing() {
        let dir = TempDir::new().unwrap();
        let search = Arc::new(FakeSearch::new(
            vec![status("CANCELLED", 0)],
            vec![wrapped(json!({"x": 1}))],
        ));
        let ingest = Arc::new(FakeIngest::accepting());

        let report = pipeline(&dir, &search, &ingest)
            .run(&sumo(true, true))
            .await
            .unwrap();

        assert!(report.envelope.is_empty());
        assert_eq!(report.delivery, Delivery::NothingToSend);
        assert_eq!(report.checkpoint, None);
        assert_eq!(ingest.calls(), 0);
    }

    #[tokio::test]
    async fn test_no_usable_records_delivers_nothing() {
        let dir = TempDir::new().unwrap();
        let search = Arc::new(FakeSearch::done_with(vec![
            json!({"fields": []}),
            json!({"map": {"_raw": "not json"}}),
        ]));
        let ingest = Arc::new(FakeIngest::accepting());

        let report = pipeline(&dir, &search, &ingest)
            .run(&sumo(false, true))
            .await
            .unwrap();

        assert_eq!(report.skipped, 2);
        assert_eq!(report.delivery, Delivery::NothingToSend);
        assert_eq!(ingest.calls(), 0);
    }

    #[tokio::test]
    async fn test_malformed_record_does_not_spoil_batch() {
        let dir = TempDir::new().unwrap();
        let search = Arc::new(FakeSearch::done_with(vec![
            json!({"fields": []}),
            wrapped(json!({"n": 1})),
            wrapped(json!({"n": 2})),
        ]));
        let ingest = Arc::new(FakeIngest::accepting());

        let report = pipeline(&dir, &search, &ingest)
            .run(&sumo(false, true))
            .await
            .unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.envelope.len(), 2);
        assert_eq!(report.envelope.events[0].message().unwrap()["n"], 1);
        assert_eq!(report.envelope.events[1].message().unwrap()["n"], 2);
        assert_eq!(ingest.calls(), 1);
    }

    #[tokio::test]
    async fn test_checkpoint_advances_to_latest_record() {
        let dir = TempDir::new().unwrap();
        seed_checkpoint(&dir, TimeWindow { start: T0, end: T0 + 1800 });

        let search = Arc::new(FakeSearch::done_with(vec![
            wrapped(json!({"timestamp": "2022-11-03T04:10:00Z"})),
            wrapped(json!({"timestamp": "2022-11-03T04:20:00Z"})),
            wrapped(json!({"timestamp": "2022-11-03T04:15:00Z"})),
        ]));
        let ingest = Arc::new(FakeIngest::accepting());

        let report = pipeline(&dir, &search, &ingest)
            .run(&sumo(true, true))
            .await
            .unwrap();

        let saved = report.checkpoint.unwrap();
        assert_eq!(saved.start, T0 + 1200);
        assert!(saved.end >= saved.start);

        let on_disk = CheckpointStore::new(dir.path().join("checkpoint.json"))
            .load()
            .unwrap();
        assert_eq!(on_disk.outcome, LoadOutcome::Restored);
        assert_eq!(on_disk.window, saved);

        // The query started at the old checkpoint and ran up to now
        let submitted = search.submitted.lock().unwrap();
        assert_eq!(submitted[0].from, "2022-11-03T04:00:00");
        assert_eq!(submitted[0].time_zone, "UTC");
    }

    #[tokio::test]
    async fn test_checkpoint_untouched_without_flag() {
        let dir = TempDir::new().unwrap();
        let seeded = TimeWindow { start: T0, end: T0 + 1800 };
        seed_checkpoint(&dir, seeded);

        let search = Arc::new(FakeSearch::done_with(vec![wrapped(
            json!({"timestamp": "2022-11-03T04:10:00Z"}),
        )]));
        let ingest = Arc::new(FakeIngest::accepting());

        let report = pipeline(&dir, &search, &ingest)
            .run(&sumo(false, true))
            .await
            .unwrap();

        assert_eq!(report.checkpoint, None);
        let on_disk = CheckpointStore::new(dir.path().join("checkpoint.json"))
            .load()
            .unwrap();
        assert_eq!(on_disk.window, seeded);
    }

    #[tokio::test]
    async fn test_rejected_delivery_keeps_checkpoint() {
        let dir = TempDir::new().unwrap();
        let seeded = TimeWindow { start: T0, end: T0 + 1800 };
        seed_checkpoint(&dir, seeded);

        let search = Arc::new(FakeSearch::done_with(vec![wrapped(
            json!({"timestamp": "2022-11-03T04:10:00Z"}),
        )]));
        let ingest = Arc::new(FakeIngest::rejecting(401, "bad token"));

        let err = pipeline(&dir, &search, &ingest)
            .run(&sumo(true, true))
            .await
            .unwrap_err();

        match err {
            PipelineError::Delivery { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "bad token");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let on_disk = CheckpointStore::new(dir.path().join("checkpoint.json"))
            .load()
            .unwrap();
        assert_eq!(on_disk.window, seeded);
    }

    #[tokio::test]
    async fn test_checkpoint_write_failure_after_delivery_fails_run() {
        let dir = TempDir::new().unwrap();
        let state = dir.path().join("state");
        let config = Config {
            checkpoint_path: state.join("checkpoint.json"),
            ..config_in(&dir)
        };
        CheckpointStore::new(config.checkpoint_path.clone())
            .save(&TimeWindow { start: T0, end: T0 + 1800 })
            .unwrap();

        let search = Arc::new(FakeSearch::done_with(vec![wrapped(
            json!({"timestamp": "2022-11-03T04:10:00Z"}),
        )]));
        // Once the batch is accepted, the checkpoint directory turns into a file
        let blocked = state.clone();
        let ingest = Arc::new(FakeIngest::accepting_then(move || {
            std::fs::remove_dir_all(&blocked).unwrap();
            std::fs::write(&blocked, "in the way").unwrap();
        }));

        let err = Pipeline::new(&config, search.clone(), ingest.clone())
            .run(&sumo(true, true))
            .await
            .unwrap_err();

        assert_eq!(ingest.calls(), 1);
        assert!(matches!(
            err,
            PipelineError::Checkpoint(crate::checkpoint::CheckpointError::Write { .. })
        ));
    }

    #[tokio::test]
    async fn test_older_records_do_not_move_checkpoint_back() {
        let dir = TempDir::new().unwrap();
        let seeded = TimeWindow { start: T0, end: T0 + 1800 };
        seed_checkpoint(&dir, seeded);

        let search = Arc::new(FakeSearch::done_with(vec![wrapped(
            json!({"timestamp": "2022-11-03T03:00:00Z"}),
        )]));
        let ingest = Arc::new(FakeIngest::accepting());

        let report = pipeline(&dir, &search, &ingest)
            .run(&sumo(true, false))
            .await
            .unwrap();

        assert_eq!(report.delivery, Delivery::Disabled);
        assert_eq!(report.checkpoint, None);
        let on_disk = CheckpointStore::new(dir.path().join("checkpoint.json"))
            .load()
            .unwrap();
        assert_eq!(on_disk.window.start, T0);
    }

    #[tokio::test]
    async fn test_json_payload_with_checkpoint() {
        let dir = TempDir::new().unwrap();
        seed_checkpoint(&dir, TimeWindow { start: T0, end: T0 });
        let search = Arc::new(FakeSearch::done_with(vec![]));
        let ingest = Arc::new(FakeIngest::accepting());

        let report = pipeline(&dir, &search, &ingest)
            .run(&json_payload(
                r#"{"timestamp": "2022-11-03T05:00:00Z", "a": 1}"#,
                true,
                true,
            ))
            .await
            .unwrap();

        assert_eq!(ingest.calls(), 1);
        assert_eq!(report.checkpoint.map(|w| w.start), Some(T0 + 3600));
    }

    #[tokio::test]
    async fn test_stalled_job_fails_run() {
        let dir = TempDir::new().unwrap();
        let search = Arc::new(FakeSearch::new(vec![status("GATHERING RESULTS", 0)], vec![]));
        let ingest = Arc::new(FakeIngest::accepting());

        let err = pipeline(&dir, &search, &ingest)
            .run(&sumo(false, true))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::JobStalled { attempts: 3, .. }));
        assert_eq!(ingest.calls(), 0);
    }
}
