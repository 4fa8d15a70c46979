//! The long-lived polling loop that drives every job from discovered to paid.
//!
//! One cycle runs Bid Placement -> Award Monitor -> Change-Request Monitor ->
//! per-active-job Build-Verify-Fix -> Pre-Flight -> Submit -> Payment
//! Reconciler, persists the snapshot, then sleeps. Jobs are processed
//! sequentially; one job's failure never aborts the cycle for the others.
//! The loop is designed to run indefinitely: consecutive cycle-level errors
//! trigger a long cooldown, never a crash-exit.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;

use crate::bidding::BidEngine;
use crate::codemodel::CodeModel;
use crate::config::BotConfig;
use crate::marketplace::MarketplaceClient;
use crate::monitor::AwardMonitor;
use crate::pipeline::BuildPipeline;
use crate::pipeline::publish::ArtifactHost;
use crate::pipeline::validate::StepRunner;
use crate::preflight::PreflightVerifier;
use crate::settlement::SettlementEngine;
use crate::state::BotState;
use crate::ui::{self, EventLog};

pub struct PollLoop<M, H, R> {
    config: BotConfig,
    client: MarketplaceClient,
    model: Option<M>,
    host: H,
    runner: R,
    preflight: PreflightVerifier,
    log: EventLog,
    stop: Arc<AtomicBool>,
}

impl<M, H, R> PollLoop<M, H, R>
where
    M: CodeModel,
    H: ArtifactHost,
    R: StepRunner,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: BotConfig,
        client: MarketplaceClient,
        model: Option<M>,
        host: H,
        runner: R,
        log: EventLog,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            config,
            client,
            model,
            host,
            runner,
            preflight: PreflightVerifier::new(),
            log,
            stop,
        }
    }

    /// Run cycles until a stop is requested. Stop requests are honored at
    /// the cycle boundary only, never mid-cycle.
    pub async fn run(&self, state: &mut BotState) -> Result<()> {
        let mut consecutive_errors: u32 = 0;

        loop {
            if self.stop.load(Ordering::SeqCst) {
                self.log.info("stop requested; exiting at cycle boundary");
                break;
            }

            match self.run_cycle(state).await {
                Ok(()) => {
                    consecutive_errors = 0;
                    state.cycles_completed += 1;
                }
                Err(e) => {
                    consecutive_errors += 1;
                    self.log.error(format!(
                        "cycle failed ({consecutive_errors}/{}): {e}",
                        self.config.max_consecutive_errors
                    ));
                }
            }

            self.persist(state);

            if consecutive_errors >= self.config.max_consecutive_errors {
                self.log.warn(format!(
                    "too many consecutive errors; cooling down for {}s",
                    self.config.cooldown_secs
                ));
                consecutive_errors = 0;
                ui::idle_wait(self.config.cooldown_secs).await;
            } else {
                ui::idle_wait(self.config.poll_interval_secs).await;
            }
        }

        self.persist(state);
        Ok(())
    }

    /// Run one cycle and persist the snapshot (the `once` command).
    pub async fn run_once(&self, state: &mut BotState) -> Result<()> {
        let result = self.run_cycle(state).await;
        if result.is_ok() {
            state.cycles_completed += 1;
        }
        self.persist(state);
        result
    }

    /// One full polling cycle over all phases.
    pub async fn run_cycle(&self, state: &mut BotState) -> Result<()> {
        let bids = BidEngine::new(&self.client, &self.config, &self.log);
        let monitor = AwardMonitor::new(&self.client, &self.log);
        let settlement = SettlementEngine::new(&self.client, &self.log);

        let jobs = self.client.list_open_jobs().await?;
        self.log.debug(format!("scan found {} open jobs", jobs.len()));
        bids.run_bidding_pass(state, &jobs).await;

        monitor.check_bids(state).await?;
        monitor.check_for_request_changes(state).await?;

        let active_ids: Vec<String> = state.active_jobs.iter().map(|j| j.job_id.clone()).collect();
        for job_id in active_ids {
            if let Err(e) = self.process_active(state, &settlement, &job_id).await {
                // Per-job isolation: the rest of the cycle continues.
                self.log
                    .warn(format!("job {job_id}: processing failed this cycle: {e}"));
            }
        }

        settlement.reconcile_payments(state).await?;
        Ok(())
    }

    // Drive one active job as far as it can go this cycle.
    async fn process_active(
        &self,
        state: &mut BotState,
        settlement: &SettlementEngine<'_>,
        job_id: &str,
    ) -> Result<()> {
        self.ensure_assignment(state, job_id).await;
        self.send_starting_notice(state, job_id).await;

        let Some(job) = state.active_job(job_id).cloned() else {
            return Ok(());
        };

        let pipeline = BuildPipeline::new(
            self.model.as_ref(),
            &self.host,
            &self.runner,
            Path::new(&self.config.workdir),
            &self.log,
        );
        let Some(deliverable) = pipeline.produce(&job).await? else {
            self.log
                .info(format!("job {job_id}: no deliverable this cycle, retrying next"));
            return Ok(());
        };

        if !self.preflight.verify(&deliverable.url).await {
            // The deliverable is discarded; next cycle regenerates and re-hosts.
            self.log.warn(format!(
                "job {job_id}: deliverable URL failed pre-flight, submission blocked"
            ));
            return Ok(());
        }

        settlement.submit(state, job_id, &deliverable).await?;
        Ok(())
    }

    // An award can be visible before the marketplace shows the assignment;
    // keep trying to discover it on later detail fetches.
    async fn ensure_assignment(&self, state: &mut BotState, job_id: &str) {
        let missing = state
            .active_job(job_id)
            .is_some_and(|j| j.assignment_id.is_none());
        if !missing {
            return;
        }
        match self.client.get_job_detail(job_id).await {
            Ok(detail) => {
                if let Some(assignment) = detail.primary_assignment()
                    && let Some(job) = state.active_job_mut(job_id)
                {
                    job.assignment_id = Some(assignment.id.clone());
                }
            }
            Err(e) => {
                self.log
                    .warn(format!("job {job_id}: assignment discovery failed: {e}"));
            }
        }
    }

    // One-time "starting work" notice; `message_sent` survives a
    // request-changes round trip, so rework never re-sends it.
    async fn send_starting_notice(&self, state: &mut BotState, job_id: &str) {
        let Some(job) = state.active_job(job_id) else {
            return;
        };
        if job.message_sent {
            return;
        }
        let Some(assignment_id) = job.assignment_id.clone() else {
            return;
        };
        let body = format!(
            "Starting work on \"{}\" now. I'll post a delivery link here shortly.",
            job.title
        );
        match self.client.send_assignment_message(&assignment_id, &body).await {
            Ok(status) if (200..300).contains(&status) => {
                if let Some(job) = state.active_job_mut(job_id) {
                    job.message_sent = true;
                }
            }
            Ok(status) => {
                self.log
                    .warn(format!("job {job_id}: starting notice rejected ({status})"));
            }
            Err(e) => {
                self.log
                    .warn(format!("job {job_id}: starting notice failed: {e}"));
            }
        }
    }

    fn persist(&self, state: &BotState) {
        if let Err(e) = state.save(Path::new(&self.config.state_path)) {
            self.log.error(format!("state snapshot write failed: {e}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codemodel::ModelError;
    use crate::pipeline::files::GeneratedFile;
    use crate::pipeline::publish::PublishError;
    use crate::pipeline::validate::{ProjectKind, StepReport, ValidationStep};
    use crate::state::{TrackedJob, TrackedStatus};
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct NoModel;

    impl CodeModel for NoModel {
        async fn generate(&self, _prompt: &str) -> Result<String, ModelError> {
            Err(ModelError::EmptyResponse)
        }
    }

    struct FixedHost {
        url: String,
    }

    impl ArtifactHost for FixedHost {
        async fn publish(
            &self,
            _files: &[GeneratedFile],
            _summary: &str,
        ) -> Result<String, PublishError> {
            Ok(self.url.clone())
        }
    }

    struct PassRunner;

    impl StepRunner for PassRunner {
        async fn run(
            &self,
            _kind: ProjectKind,
            step: ValidationStep,
            _dir: &Path,
            _files: &[GeneratedFile],
        ) -> StepReport {
            StepReport {
                step,
                passed: true,
                output: String::new(),
            }
        }
    }

    fn awarded_job(job_id: &str) -> TrackedJob {
        let mut job = TrackedJob::new(
            job_id.to_string(),
            Some("a1".into()),
            2.0,
            "Convert CSV".into(),
            "to JSON".into(),
        );
        job.message_sent = true;
        job
    }

    async fn mount_empty_scan(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/jobs"))
            .and(query_param("status", "open"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/bids/mine"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(server)
            .await;
    }

    fn poll_loop(
        server: &MockServer,
        deliverable_url: String,
        workdir: &Path,
        state_path: &Path,
    ) -> PollLoop<NoModel, FixedHost, PassRunner> {
        let config = BotConfig {
            api_token: "tok".into(),
            marketplace_url: server.uri(),
            workdir: workdir.to_string_lossy().into_owned(),
            state_path: state_path.to_string_lossy().into_owned(),
            bid_delay_secs: 0,
            ..Default::default()
        };
        let client = MarketplaceClient::new("tok".into(), server.uri());
        PollLoop::new(
            config,
            client,
            None,
            FixedHost {
                url: deliverable_url,
            },
            PassRunner,
            EventLog::new(None, false),
            Arc::new(AtomicBool::new(false)),
        )
    }

    #[tokio::test]
    async fn cycle_delivers_active_job_when_preflight_passes() {
        let server = MockServer::start().await;
        mount_empty_scan(&server).await;
        Mock::given(method("GET"))
            .and(path("/deliverable"))
            .respond_with(ResponseTemplate::new(200).set_body_string("live"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/jobs/j1/submit"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;
        // Payment reconciler re-fetches the freshly delivered job.
        Mock::given(method("GET"))
            .and(path("/jobs/j1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "j1",
                "status": "awarded",
                "myAssignments": [{"id": "a1", "status": "submitted"}]
            })))
            .mount(&server)
            .await;

        let workdir = tempfile::tempdir().unwrap();
        let statedir = tempfile::tempdir().unwrap();
        let looper = poll_loop(
            &server,
            format!("{}/deliverable", server.uri()),
            workdir.path(),
            &statedir.path().join("state.json"),
        );
        let mut state = BotState::default();
        state.active_jobs.push(awarded_job("j1"));

        looper.run_cycle(&mut state).await.unwrap();

        assert!(state.active_jobs.is_empty());
        assert_eq!(state.delivered_jobs.len(), 1);
        assert_eq!(state.delivered_jobs[0].status, TrackedStatus::Delivered);
    }

    #[tokio::test]
    async fn failed_preflight_blocks_submission_and_keeps_job_awarded() {
        let server = MockServer::start().await;
        mount_empty_scan(&server).await;
        Mock::given(method("GET"))
            .and(path("/deliverable"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/jobs/j1/submit"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let workdir = tempfile::tempdir().unwrap();
        let statedir = tempfile::tempdir().unwrap();
        let looper = poll_loop(
            &server,
            format!("{}/deliverable", server.uri()),
            workdir.path(),
            &statedir.path().join("state.json"),
        );
        let mut state = BotState::default();
        state.active_jobs.push(awarded_job("j1"));

        looper.run_cycle(&mut state).await.unwrap();

        // The job remains awarded after the cycle completes.
        assert_eq!(state.active_jobs.len(), 1);
        assert_eq!(state.active_jobs[0].status, TrackedStatus::Awarded);
        assert!(state.delivered_jobs.is_empty());
    }

    #[tokio::test]
    async fn starting_notice_sent_once() {
        let server = MockServer::start().await;
        mount_empty_scan(&server).await;
        Mock::given(method("POST"))
            .and(path("/assignments/a1/messages"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/deliverable"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/jobs/j1/submit"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let workdir = tempfile::tempdir().unwrap();
        let statedir = tempfile::tempdir().unwrap();
        let looper = poll_loop(
            &server,
            format!("{}/deliverable", server.uri()),
            workdir.path(),
            &statedir.path().join("state.json"),
        );
        let mut state = BotState::default();
        let mut job = awarded_job("j1");
        job.message_sent = false;
        state.active_jobs.push(job);

        // Submission is rejected, so the job stays active across two cycles,
        // but the notice goes out exactly once.
        looper.run_cycle(&mut state).await.unwrap();
        assert!(state.active_jobs[0].message_sent);
        looper.run_cycle(&mut state).await.unwrap();
    }

    #[tokio::test]
    async fn run_honors_stop_at_cycle_boundary() {
        let server = MockServer::start().await;
        let workdir = tempfile::tempdir().unwrap();
        let statedir = tempfile::tempdir().unwrap();
        let state_path = statedir.path().join("state.json");
        let looper = poll_loop(&server, String::new(), workdir.path(), &state_path);
        looper.stop.store(true, Ordering::SeqCst);

        let mut state = BotState::default();
        looper.run(&mut state).await.unwrap();

        // No cycle ran, and the snapshot was still persisted on exit.
        assert_eq!(state.cycles_completed, 0);
        assert!(state_path.exists());
    }

    #[tokio::test]
    async fn run_once_persists_snapshot() {
        let server = MockServer::start().await;
        mount_empty_scan(&server).await;

        let workdir = tempfile::tempdir().unwrap();
        let statedir = tempfile::tempdir().unwrap();
        let state_path = statedir.path().join("state.json");
        let looper = poll_loop(&server, String::new(), workdir.path(), &state_path);

        let mut state = BotState::default();
        looper.run_once(&mut state).await.unwrap();

        assert_eq!(state.cycles_completed, 1);
        let reloaded = BotState::load(&state_path).unwrap();
        assert_eq!(reloaded.cycles_completed, 1);
    }

    #[tokio::test]
    async fn scan_failure_is_a_cycle_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jobs"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let workdir = tempfile::tempdir().unwrap();
        let statedir = tempfile::tempdir().unwrap();
        let looper = poll_loop(
            &server,
            String::new(),
            workdir.path(),
            &statedir.path().join("state.json"),
        );
        let mut state = BotState::default();
        assert!(looper.run_cycle(&mut state).await.is_err());
    }
}
