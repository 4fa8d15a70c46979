//! Award & Change-Request Monitor.
//!
//! Polls this agent's bids and delivered jobs to detect three remote events:
//! a bid was accepted (award), a requester sent delivered work back for
//! changes, or an assignment entered a dispute. Disputes resolve externally
//! and are never actively retried from here.

use anyhow::Result;

use crate::marketplace::MarketplaceClient;
use crate::marketplace::types::{AssignmentStatus, BidStatus, JobStatus};
use crate::state::{BotState, TrackedJob};
use crate::ui::EventLog;

pub struct AwardMonitor<'a> {
    client: &'a MarketplaceClient,
    log: &'a EventLog,
}

impl<'a> AwardMonitor<'a> {
    pub fn new(client: &'a MarketplaceClient, log: &'a EventLog) -> Self {
        Self { client, log }
    }

    /// Detect newly accepted bids and start tracking the won jobs.
    ///
    /// The assignment is discovered, not generated: a job detail fetch tells
    /// us what the marketplace created when it accepted our bid.
    pub async fn check_bids(&self, state: &mut BotState) -> Result<()> {
        let bids = self.client.list_my_bids().await?;

        for bid in &bids {
            match bid.status {
                BidStatus::Rejected => {
                    state.pending_bids.retain(|id| id != &bid.job_id);
                    continue;
                }
                BidStatus::Pending => continue,
                BidStatus::Accepted => {}
            }
            if state.is_tracked(&bid.job_id) {
                continue;
            }

            let detail = match self.client.get_job_detail(&bid.job_id).await {
                Ok(d) => d,
                Err(e) => {
                    self.log
                        .warn(format!("detail fetch for awarded job {} failed: {e}", bid.job_id));
                    continue;
                }
            };

            // The bid stays accepted server-side even after the job itself
            // expired or closed (e.g. reclaimed by the payment check). A
            // terminal job is never tracked again.
            if matches!(
                detail.status,
                JobStatus::Expired | JobStatus::Closed | JobStatus::Completed
            ) {
                state.pending_bids.retain(|id| id != &bid.job_id);
                self.log.debug(format!(
                    "job {} has an accepted bid but is {:?}, not tracking",
                    bid.job_id, detail.status
                ));
                continue;
            }

            let assignment_id = detail.primary_assignment().map(|a| a.id.clone());
            let tracked = TrackedJob::new(
                bid.job_id.clone(),
                assignment_id,
                bid.amount,
                detail.title.clone(),
                detail.description.clone(),
            );
            state.accept_award(tracked);
            self.log.transition(&bid.job_id, "pending_bid", "awarded");
        }

        // A pending entry whose bid no longer exists remotely (job deleted,
        // bid withdrawn by the marketplace) would otherwise linger forever.
        state
            .pending_bids
            .retain(|id| bids.iter().any(|b| &b.job_id == id));
        Ok(())
    }

    /// Detect requester-initiated "send back for changes" on delivered jobs.
    ///
    /// An assignment that reverted to `in_progress` means rework: the job
    /// moves back to active with the latest feedback attached. A `disputed`
    /// assignment is left parked in delivered untouched.
    pub async fn check_for_request_changes(&self, state: &mut BotState) -> Result<()> {
        let delivered_ids: Vec<(String, Option<String>)> = state
            .delivered_jobs
            .iter()
            .map(|j| (j.job_id.clone(), j.assignment_id.clone()))
            .collect();

        for (job_id, assignment_id) in delivered_ids {
            let detail = match self.client.get_job_detail(&job_id).await {
                Ok(d) => d,
                Err(e) => {
                    self.log
                        .warn(format!("detail fetch for delivered job {job_id} failed: {e}"));
                    continue;
                }
            };
            let Some(assignment) = detail.assignment_for(assignment_id.as_deref()) else {
                continue;
            };

            match assignment.status {
                AssignmentStatus::InProgress => {
                    let feedback = self.latest_feedback(&assignment.id).await;
                    state.return_for_changes(&job_id, feedback);
                    self.log.transition(&job_id, "delivered", "awarded");
                    self.log.info(format!("job {job_id} sent back for changes"));
                }
                AssignmentStatus::Disputed => {
                    self.log
                        .info(format!("job {job_id} is disputed; parked until external resolution"));
                }
                AssignmentStatus::Submitted | AssignmentStatus::Accepted => {}
            }
        }
        Ok(())
    }

    // Latest message on the assignment thread, used as the rework prompt.
    // A fetch failure just means regenerating without feedback.
    async fn latest_feedback(&self, assignment_id: &str) -> Option<String> {
        match self.client.get_assignment_messages(assignment_id).await {
            Ok(messages) => messages.last().map(|m| m.body.clone()),
            Err(e) => {
                self.log
                    .warn(format!("message fetch for assignment {assignment_id} failed: {e}"));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::TrackedStatus;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn delivered_job(job_id: &str, assignment_id: &str, amount: f64) -> TrackedJob {
        let mut job = TrackedJob::new(
            job_id.to_string(),
            Some(assignment_id.to_string()),
            amount,
            "Title".into(),
            "Desc".into(),
        );
        job.status = TrackedStatus::Delivered;
        job.message_sent = true;
        job
    }

    #[tokio::test]
    async fn check_bids_tracks_new_award() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bids/mine"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "bids": [
                    {"id": "b1", "jobId": "j1", "amount": 7.5, "status": "accepted"},
                    {"id": "b2", "jobId": "j2", "amount": 3.0, "status": "pending"}
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/jobs/j1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "j1",
                "title": "Scrape listings",
                "description": "three sites",
                "status": "awarded",
                "myAssignments": [
                    {"id": "a9", "status": "submitted"},
                    {"id": "a1", "status": "in_progress", "escrowAmount": 7.5}
                ]
            })))
            .mount(&server)
            .await;

        let client = MarketplaceClient::new("tok".into(), server.uri());
        let log = EventLog::new(None, false);
        let monitor = AwardMonitor::new(&client, &log);
        let mut state = BotState::default();
        state.pending_bids.push("j1".into());
        state.pending_bids.push("j2".into());

        monitor.check_bids(&mut state).await.unwrap();

        assert_eq!(state.active_jobs.len(), 1);
        let job = &state.active_jobs[0];
        assert_eq!(job.job_id, "j1");
        // Prefers the in_progress assignment.
        assert_eq!(job.assignment_id.as_deref(), Some("a1"));
        assert_eq!(job.bid_amount, 7.5);
        assert_eq!(job.title, "Scrape listings");
        assert_eq!(job.status, TrackedStatus::Awarded);
        assert!(!job.message_sent);
        // j1 left pending, j2 still waiting.
        assert_eq!(state.pending_bids, vec!["j2".to_string()]);
    }

    #[tokio::test]
    async fn check_bids_skips_tracked_jobs() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bids/mine"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "b1", "jobId": "j1", "amount": 7.5, "status": "accepted"}
            ])))
            .mount(&server)
            .await;
        // No detail fetch expected for an already-tracked job.
        Mock::given(method("GET"))
            .and(path("/jobs/j1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = MarketplaceClient::new("tok".into(), server.uri());
        let log = EventLog::new(None, false);
        let monitor = AwardMonitor::new(&client, &log);
        let mut state = BotState::default();
        state.delivered_jobs.push(delivered_job("j1", "a1", 7.5));

        monitor.check_bids(&mut state).await.unwrap();
        assert!(state.active_jobs.is_empty());
        assert_eq!(state.delivered_jobs.len(), 1);
    }

    #[tokio::test]
    async fn accepted_bid_on_expired_job_is_not_tracked() {
        let server = MockServer::start().await;
        // The marketplace keeps reporting the bid as accepted after the job
        // itself expired and was reclaimed without payment.
        Mock::given(method("GET"))
            .and(path("/bids/mine"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "b1", "jobId": "j1", "amount": 9.0, "status": "accepted"}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/jobs/j1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "j1",
                "status": "expired",
                "myAssignments": [{"id": "a1", "status": "in_progress"}]
            })))
            .mount(&server)
            .await;

        let client = MarketplaceClient::new("tok".into(), server.uri());
        let log = EventLog::new(None, false);
        let monitor = AwardMonitor::new(&client, &log);
        let mut state = BotState::default();
        state.pending_bids.push("j1".into());

        monitor.check_bids(&mut state).await.unwrap();
        monitor.check_bids(&mut state).await.unwrap();

        // Never resurrected, no matter how many cycles observe the bid.
        assert!(state.active_jobs.is_empty());
        assert!(state.pending_bids.is_empty());
    }

    #[tokio::test]
    async fn accepted_bid_on_closed_job_is_not_tracked() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bids/mine"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "b1", "jobId": "j1", "amount": 4.0, "status": "accepted"}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/jobs/j1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "j1",
                "status": "closed",
                "myAssignments": []
            })))
            .mount(&server)
            .await;

        let client = MarketplaceClient::new("tok".into(), server.uri());
        let log = EventLog::new(None, false);
        let monitor = AwardMonitor::new(&client, &log);
        let mut state = BotState::default();

        monitor.check_bids(&mut state).await.unwrap();
        assert!(state.active_jobs.is_empty());
    }

    #[tokio::test]
    async fn vanished_bid_is_pruned_from_pending() {
        let server = MockServer::start().await;
        // "j-gone" no longer shows up in the bid listing at all.
        Mock::given(method("GET"))
            .and(path("/bids/mine"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "b2", "jobId": "j-wait", "amount": 3.0, "status": "pending"}
            ])))
            .mount(&server)
            .await;

        let client = MarketplaceClient::new("tok".into(), server.uri());
        let log = EventLog::new(None, false);
        let monitor = AwardMonitor::new(&client, &log);
        let mut state = BotState::default();
        state.pending_bids.push("j-gone".into());
        state.pending_bids.push("j-wait".into());

        monitor.check_bids(&mut state).await.unwrap();
        assert_eq!(state.pending_bids, vec!["j-wait".to_string()]);
    }

    #[tokio::test]
    async fn check_bids_drops_rejected_from_pending() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bids/mine"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "b1", "jobId": "j1", "amount": 7.5, "status": "rejected"}
            ])))
            .mount(&server)
            .await;

        let client = MarketplaceClient::new("tok".into(), server.uri());
        let log = EventLog::new(None, false);
        let monitor = AwardMonitor::new(&client, &log);
        let mut state = BotState::default();
        state.pending_bids.push("j1".into());

        monitor.check_bids(&mut state).await.unwrap();
        assert!(state.pending_bids.is_empty());
        assert!(state.active_jobs.is_empty());
    }

    #[tokio::test]
    async fn request_changes_moves_job_back_with_feedback() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jobs/j1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "j1",
                "status": "awarded",
                "myAssignments": [{"id": "a1", "status": "in_progress"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/assignments/a1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messages": [
                    {"id": "m1", "author": "requester", "body": "first note"},
                    {"id": "m2", "author": "requester", "body": "the CSV headers are wrong"}
                ]
            })))
            .mount(&server)
            .await;

        let client = MarketplaceClient::new("tok".into(), server.uri());
        let log = EventLog::new(None, false);
        let monitor = AwardMonitor::new(&client, &log);
        let mut state = BotState::default();
        state.delivered_jobs.push(delivered_job("j1", "a1", 2.0));

        monitor.check_for_request_changes(&mut state).await.unwrap();

        assert!(state.delivered_jobs.is_empty());
        let job = state.active_job("j1").unwrap();
        assert_eq!(job.status, TrackedStatus::Awarded);
        // No duplicate "starting work" notice on rework.
        assert!(job.message_sent);
        assert_eq!(
            job.last_feedback.as_deref(),
            Some("the CSV headers are wrong")
        );
    }

    #[tokio::test]
    async fn disputed_assignment_stays_delivered() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jobs/j1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "j1",
                "status": "awarded",
                "myAssignments": [{"id": "a1", "status": "disputed"}]
            })))
            .mount(&server)
            .await;

        let client = MarketplaceClient::new("tok".into(), server.uri());
        let log = EventLog::new(None, false);
        let monitor = AwardMonitor::new(&client, &log);
        let mut state = BotState::default();
        state.delivered_jobs.push(delivered_job("j1", "a1", 2.0));

        monitor.check_for_request_changes(&mut state).await.unwrap();

        assert_eq!(state.delivered_jobs.len(), 1);
        assert!(state.active_jobs.is_empty());
        assert_eq!(state.delivered_jobs[0].status, TrackedStatus::Delivered);
    }

    #[tokio::test]
    async fn submitted_assignment_is_left_alone() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jobs/j1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "j1",
                "status": "awarded",
                "myAssignments": [{"id": "a1", "status": "submitted"}]
            })))
            .mount(&server)
            .await;

        let client = MarketplaceClient::new("tok".into(), server.uri());
        let log = EventLog::new(None, false);
        let monitor = AwardMonitor::new(&client, &log);
        let mut state = BotState::default();
        state.delivered_jobs.push(delivered_job("j1", "a1", 2.0));

        monitor.check_for_request_changes(&mut state).await.unwrap();
        assert_eq!(state.delivered_jobs.len(), 1);
    }
}
