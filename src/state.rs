//! Durable process state: bid history, job tracking collections, counters.
//!
//! [`BotState`] is loaded once at startup and persisted as a single JSON
//! snapshot at the end of every polling cycle, so a restart resumes from the
//! last completed cycle with no duplicated bids and no lost in-flight jobs.
//!
//! Invariants:
//! - a job id appears in at most one of `pending_bids`, `active_jobs`,
//!   `delivered_jobs`, `paid_jobs` at any observation point;
//! - `already_bid_job_ids` only grows, except via [`BotState::reset_bid_history`];
//! - earnings are accrued exactly once per job, at the paid transition.

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BotError;

/// Lifecycle status of a tracked job. The sole backward edge is
/// `Delivered -> Awarded` (requester sent the work back for changes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackedStatus {
    Awarded,
    Delivered,
    Paid,
}

impl std::fmt::Display for TrackedStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackedStatus::Awarded => write!(f, "awarded"),
            TrackedStatus::Delivered => write!(f, "delivered"),
            TrackedStatus::Paid => write!(f, "paid"),
        }
    }
}

/// The orchestrator-local projection of a won job.
///
/// Owned exclusively by the orchestrator; the marketplace's own records are
/// re-fetched whenever the remote state may have changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedJob {
    pub job_id: String,
    /// Discovered via a job detail fetch; `None` until the marketplace shows one.
    pub assignment_id: Option<String>,
    /// Cached at award time; the amount accrued when the job is paid.
    pub bid_amount: f64,
    pub title: String,
    pub description: String,
    pub status: TrackedStatus,
    /// Guards the one-time "starting work" notice, including across a
    /// request-changes round trip.
    pub message_sent: bool,
    pub delivered_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    /// Latest requester feedback, attached when the job bounces back.
    pub last_feedback: Option<String>,
}

impl TrackedJob {
    pub fn new(
        job_id: String,
        assignment_id: Option<String>,
        bid_amount: f64,
        title: String,
        description: String,
    ) -> Self {
        Self {
            job_id,
            assignment_id,
            bid_amount,
            title,
            description,
            status: TrackedStatus::Awarded,
            message_sent: false,
            delivered_at: None,
            paid_at: None,
            last_feedback: None,
        }
    }
}

/// The full durable snapshot: collections, counters, bid history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotState {
    /// Jobs this agent has ever attempted to bid on, success or failure.
    /// Monotonic except for the explicit reset operation.
    #[serde(default)]
    pub already_bid_job_ids: HashSet<String>,
    /// Job ids with an outstanding (not yet decided) bid.
    #[serde(default)]
    pub pending_bids: Vec<String>,
    #[serde(default)]
    pub active_jobs: Vec<TrackedJob>,
    #[serde(default)]
    pub delivered_jobs: Vec<TrackedJob>,
    #[serde(default)]
    pub paid_jobs: Vec<TrackedJob>,
    #[serde(default)]
    pub bids_placed: u64,
    #[serde(default)]
    pub cycles_completed: u64,
    #[serde(default)]
    pub total_earnings: f64,
}

impl BotState {
    /// Load the snapshot, or start fresh if the file does not exist yet.
    pub fn load(path: &Path) -> Result<Self, BotError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Persist the snapshot. Written to a temp file and renamed so a crash
    /// mid-write never leaves a truncated snapshot behind.
    pub fn save(&self, path: &Path) -> Result<(), BotError> {
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Whether the job is represented in active, delivered or paid.
    pub fn is_tracked(&self, job_id: &str) -> bool {
        self.active_jobs.iter().any(|j| j.job_id == job_id)
            || self.delivered_jobs.iter().any(|j| j.job_id == job_id)
            || self.paid_jobs.iter().any(|j| j.job_id == job_id)
    }

    /// Record a bid attempt. Called immediately after placement regardless of
    /// the outcome: a failed attempt is never retried. This trades one missed
    /// bid opportunity for never double-bidding.
    pub fn mark_bid(&mut self, job_id: &str) {
        self.already_bid_job_ids.insert(job_id.to_string());
    }

    /// The explicit reset operation, the only way `already_bid_job_ids` loses
    /// members. Returns how many entries were cleared.
    pub fn reset_bid_history(&mut self) -> usize {
        let n = self.already_bid_job_ids.len();
        self.already_bid_job_ids.clear();
        n
    }

    /// Accept an award: remove the job from `pending_bids` and start tracking
    /// it as active.
    pub fn accept_award(&mut self, job: TrackedJob) {
        self.pending_bids.retain(|id| id != &job.job_id);
        self.active_jobs.push(job);
    }

    pub fn active_job(&self, job_id: &str) -> Option<&TrackedJob> {
        self.active_jobs.iter().find(|j| j.job_id == job_id)
    }

    pub fn active_job_mut(&mut self, job_id: &str) -> Option<&mut TrackedJob> {
        self.active_jobs.iter_mut().find(|j| j.job_id == job_id)
    }

    /// Atomic move active -> delivered. No-op (false) if the job is not
    /// active, so a retried cycle after a 409 never duplicates it.
    pub fn promote_to_delivered(&mut self, job_id: &str) -> bool {
        let Some(pos) = self.active_jobs.iter().position(|j| j.job_id == job_id) else {
            return false;
        };
        let mut job = self.active_jobs.remove(pos);
        job.status = TrackedStatus::Delivered;
        job.delivered_at = Some(Utc::now());
        self.delivered_jobs.push(job);
        true
    }

    /// The sole backward edge: requester sent the work back. The job moves
    /// delivered -> active with status reset to awarded; `message_sent` is
    /// kept so no duplicate "starting work" notice goes out.
    pub fn return_for_changes(&mut self, job_id: &str, feedback: Option<String>) -> bool {
        let Some(pos) = self.delivered_jobs.iter().position(|j| j.job_id == job_id) else {
            return false;
        };
        let mut job = self.delivered_jobs.remove(pos);
        job.status = TrackedStatus::Awarded;
        job.delivered_at = None;
        if feedback.is_some() {
            job.last_feedback = feedback;
        }
        self.active_jobs.push(job);
        true
    }

    /// Atomic move delivered -> paid, accruing earnings exactly once.
    /// Returns the accrued amount, or `None` if the job was not in delivered
    /// (already settled, or never delivered).
    pub fn settle_paid(&mut self, job_id: &str) -> Option<f64> {
        let pos = self.delivered_jobs.iter().position(|j| j.job_id == job_id)?;
        let mut job = self.delivered_jobs.remove(pos);
        job.status = TrackedStatus::Paid;
        job.paid_at = Some(Utc::now());
        let amount = job.bid_amount;
        self.total_earnings += amount;
        self.paid_jobs.push(job);
        Some(amount)
    }

    /// Drop a delivered job whose remote side expired before payment.
    pub fn drop_expired(&mut self, job_id: &str) -> bool {
        let before = self.delivered_jobs.len();
        self.delivered_jobs.retain(|j| j.job_id != job_id);
        self.delivered_jobs.len() != before
    }
}
