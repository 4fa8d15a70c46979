//! Bid Placement Engine: converts a discovered job into a priced bid.
//!
//! The one hard rule here: never bid twice on the same job. The job id is
//! added to the durable already-bid set immediately after every placement
//! attempt, success or failure.

use std::time::Duration;

use anyhow::Result;
use tokio::time::sleep;

use crate::categorize::{categorize, draft_proposal};
use crate::config::BotConfig;
use crate::marketplace::MarketplaceClient;
use crate::marketplace::types::{Job, JobStatus};
use crate::state::BotState;
use crate::ui::EventLog;

/// `max(budget × categoryMultiplier × strategyFactor, floorPrice)`, rounded
/// to two decimal places. A job with no budget is bid at the floor.
pub fn compute_bid_amount(
    budget: Option<f64>,
    category_multiplier: f64,
    strategy_factor: f64,
    floor_price: f64,
) -> f64 {
    let raw = budget.unwrap_or(0.0) * category_multiplier * strategy_factor;
    let amount = raw.max(floor_price);
    (amount * 100.0).round() / 100.0
}

pub struct BidEngine<'a> {
    client: &'a MarketplaceClient,
    config: &'a BotConfig,
    log: &'a EventLog,
}

impl<'a> BidEngine<'a> {
    pub fn new(client: &'a MarketplaceClient, config: &'a BotConfig, log: &'a EventLog) -> Self {
        Self {
            client,
            config,
            log,
        }
    }

    /// Whether a scanned job is worth bidding on at all.
    fn worth_bidding(&self, state: &BotState, job: &Job) -> bool {
        job.status == JobStatus::Open
            && !state.already_bid_job_ids.contains(&job.id)
            && job.budget.unwrap_or(0.0) >= self.config.min_budget
            && job.bid_count <= self.config.max_bid_count
    }

    /// Run the discovery half of a cycle over a fresh job scan, with the
    /// configured fixed delay between consecutive placements.
    pub async fn run_bidding_pass(&self, state: &mut BotState, jobs: &[Job]) {
        for job in jobs {
            if !self.worth_bidding(state, job) {
                continue;
            }
            if let Err(e) = self.place_bid(state, job).await {
                // Per-job isolation: one bad placement never aborts the pass.
                self.log.warn(format!("bid on {} failed: {e}", job.id));
            }
            sleep(Duration::from_secs(self.config.bid_delay_secs)).await;
        }
    }

    /// Place one bid. The job id lands in `already_bid_job_ids` no matter how
    /// the placement turns out, so a 409 or transport failure is not retried.
    pub async fn place_bid(&self, state: &mut BotState, job: &Job) -> Result<()> {
        if state.already_bid_job_ids.contains(&job.id) {
            return Ok(());
        }

        let category = categorize(job);
        let amount = compute_bid_amount(
            job.budget,
            category.multiplier(),
            self.config.strategy.factor(),
            self.config.floor_price,
        );
        let proposal = draft_proposal(job, category);

        let outcome = self
            .client
            .place_bid(&job.id, amount, self.config.delivery_eta_secs, &proposal)
            .await;

        state.mark_bid(&job.id);

        match outcome {
            Ok(status) if (200..300).contains(&status) => {
                state.pending_bids.push(job.id.clone());
                state.bids_placed += 1;
                self.log.info(format!(
                    "bid {amount:.2} placed on {} ({}, \"{}\")",
                    job.id,
                    category.label(),
                    job.title
                ));
            }
            Ok(409) => {
                self.log
                    .warn(format!("bid on {} conflicted (already exists), not retrying", job.id));
            }
            Ok(status) => {
                self.log
                    .warn(format!("bid on {} rejected with status {status}", job.id));
            }
            Err(e) => {
                self.log
                    .warn(format!("bid on {} hit a transport error, not retrying: {e}", job.id));
            }
        }
        Ok(())
    }
}
