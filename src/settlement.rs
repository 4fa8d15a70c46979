//! Submission & Payment Reconciler.
//!
//! Submission is attempted at most once per cycle per job and is safe to
//! repeat across cycles: a 409 means the assignment is already locked
//! server-side and counts as success. Earnings are accrued exactly once per
//! job, at the paid transition, and never recomputed afterward.

use anyhow::Result;

use crate::marketplace::MarketplaceClient;
use crate::marketplace::types::{AssignmentStatus, JobStatus};
use crate::pipeline::Deliverable;
use crate::state::BotState;
use crate::ui::EventLog;

pub struct SettlementEngine<'a> {
    client: &'a MarketplaceClient,
    log: &'a EventLog,
}

impl<'a> SettlementEngine<'a> {
    pub fn new(client: &'a MarketplaceClient, log: &'a EventLog) -> Self {
        Self { client, log }
    }

    /// Submit a verified deliverable. Returns whether the job advanced to
    /// delivered. A non-conflict failure leaves the job awarded for the next
    /// cycle; a transport error likewise.
    pub async fn submit(
        &self,
        state: &mut BotState,
        job_id: &str,
        deliverable: &Deliverable,
    ) -> Result<bool> {
        if let Some(failure) = &deliverable.validation_failure {
            self.log.warn(format!(
                "job {job_id}: submitting despite failing validation ({})",
                failure.lines().next().unwrap_or("")
            ));
        }

        let outcome = self
            .client
            .submit_deliverable(job_id, &deliverable.url, &deliverable.content_hash)
            .await;

        match outcome {
            Ok(status) if (200..300).contains(&status) || status == 409 => {
                if status == 409 {
                    self.log
                        .info(format!("job {job_id}: already submitted server-side (409)"));
                }
                if state.promote_to_delivered(job_id) {
                    self.log.transition(job_id, "awarded", "delivered");
                }
                Ok(true)
            }
            Ok(status) => {
                self.log
                    .warn(format!("job {job_id}: submit rejected with status {status}"));
                Ok(false)
            }
            Err(e) => {
                self.log
                    .warn(format!("job {job_id}: submit hit a transport error: {e}"));
                Ok(false)
            }
        }
    }

    /// Re-fetch detail for every delivered job and apply the payment
    /// transitions: completed/accepted/closed-with-assignment accrues
    /// earnings; expired reclaims the slot with no payment.
    pub async fn reconcile_payments(&self, state: &mut BotState) -> Result<()> {
        let delivered: Vec<(String, Option<String>)> = state
            .delivered_jobs
            .iter()
            .map(|j| (j.job_id.clone(), j.assignment_id.clone()))
            .collect();

        for (job_id, assignment_id) in delivered {
            let detail = match self.client.get_job_detail(&job_id).await {
                Ok(d) => d,
                Err(e) => {
                    self.log
                        .warn(format!("payment check for {job_id} failed: {e}"));
                    continue;
                }
            };

            let assignment_accepted = detail
                .assignment_for(assignment_id.as_deref())
                .is_some_and(|a| a.status == AssignmentStatus::Accepted);
            let closed_with_assignment =
                detail.status == JobStatus::Closed && !detail.my_assignments.is_empty();

            if detail.status == JobStatus::Completed || assignment_accepted || closed_with_assignment
            {
                if let Some(amount) = state.settle_paid(&job_id) {
                    self.log.transition(&job_id, "delivered", "paid");
                    self.log.info(format!("job {job_id}: earned {amount:.2}"));
                }
            } else if detail.status == JobStatus::Expired {
                state.drop_expired(&job_id);
                self.log
                    .info(format!("job {job_id}: expired before payment, reclaimed"));
            }
        }
        Ok(())
    }
}
