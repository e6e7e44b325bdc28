//! Reconciliation engine — the periodic driver that scans pending
//! submissions, applies the decision engine, dispatches senders, and
//! commits delivery state.
//!
//! Per-submission pipelines are isolated failure domains: a failed or
//! skipped submission never aborts the run, and commit happens only after
//! the sender reports success. The delivered-flag gate plus the store's
//! conditional commit give at-most-once delivery even under overlapping
//! runs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;

use todoke_core::error::Result;
use todoke_core::traits::DeliverySender;
use todoke_core::types::{Campaign, DeliveryChannel, Submission};
use todoke_store::Store;

use crate::decision::{self, Decision};

/// Outcome counts for one reconciliation run.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RunSummary {
    pub checked_campaigns: usize,
    /// Submissions this run delivered AND committed (false→true transition).
    pub processed_deliveries: usize,
    pub failed: usize,
    pub skipped: usize,
    pub not_due: usize,
}

enum Outcome {
    Delivered,
    NotDue,
    Skipped,
    Failed,
}

/// The reconciliation engine. Stateless between runs; shared by the
/// interval loop and the manual trigger endpoint.
pub struct ReconcileEngine {
    store: Arc<Store>,
    senders: HashMap<DeliveryChannel, Arc<dyn DeliverySender>>,
    max_concurrent: usize,
    send_timeout: Duration,
}

impl ReconcileEngine {
    pub fn new(store: Arc<Store>, max_concurrent: usize, send_timeout: Duration) -> Self {
        Self {
            store,
            senders: HashMap::new(),
            max_concurrent: max_concurrent.max(1),
            send_timeout,
        }
    }

    /// Register a channel sender, keyed by the channel it serves.
    pub fn register_sender(&mut self, sender: Arc<dyn DeliverySender>) {
        self.senders.insert(sender.channel(), sender);
    }

    /// Execute one full reconciliation run.
    ///
    /// Structural failures (campaign/submission listing) propagate and fail
    /// the run; everything inside a per-submission pipeline is caught.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<RunSummary> {
        let campaigns = self.store.list_campaigns_with_delivery_policy()?;
        let checked_campaigns = campaigns.len();

        let mut units: Vec<(Arc<Campaign>, Submission)> = Vec::new();
        for campaign in campaigns {
            let pending = self.store.list_pending_for_campaign(&campaign.id)?;
            let campaign = Arc::new(campaign);
            for submission in pending {
                units.push((campaign.clone(), submission));
            }
        }

        let outcomes: Vec<Outcome> = futures::stream::iter(
            units
                .into_iter()
                .map(|(campaign, submission)| self.process_one(campaign, submission, now)),
        )
        .buffer_unordered(self.max_concurrent)
        .collect()
        .await;

        let mut summary = RunSummary {
            checked_campaigns,
            ..RunSummary::default()
        };
        for outcome in outcomes {
            match outcome {
                Outcome::Delivered => summary.processed_deliveries += 1,
                Outcome::NotDue => summary.not_due += 1,
                Outcome::Skipped => summary.skipped += 1,
                Outcome::Failed => summary.failed += 1,
            }
        }

        tracing::info!(
            "📬 Reconciliation run: {} campaign(s), {} delivered, {} failed, {} skipped, {} not due",
            summary.checked_campaigns,
            summary.processed_deliveries,
            summary.failed,
            summary.skipped,
            summary.not_due,
        );
        Ok(summary)
    }

    /// One submission's pipeline: decide → send → commit, strictly in that
    /// order. All errors are caught here.
    async fn process_one(
        &self,
        campaign: Arc<Campaign>,
        submission: Submission,
        now: DateTime<Utc>,
    ) -> Outcome {
        let channel = match decision::evaluate(&submission, &campaign, now) {
            Decision::NotDue { .. } => return Outcome::NotDue,
            Decision::Skip(reason) => {
                tracing::debug!(
                    submission_id = %submission.id,
                    campaign_id = %campaign.id,
                    %reason,
                    "Submission skipped this run"
                );
                return Outcome::Skipped;
            }
            Decision::Deliver { channel, .. } => channel,
        };

        let Some(sender) = self.senders.get(&channel) else {
            tracing::warn!(
                submission_id = %submission.id,
                campaign_id = %campaign.id,
                %channel,
                "No sender registered for channel"
            );
            return Outcome::Skipped;
        };

        match tokio::time::timeout(self.send_timeout, sender.send(&submission, &campaign)).await {
            Err(_) => {
                tracing::error!(
                    submission_id = %submission.id,
                    campaign_id = %campaign.id,
                    %channel,
                    "Send timed out after {:?}",
                    self.send_timeout
                );
                Outcome::Failed
            }
            Ok(Err(e)) => {
                tracing::error!(
                    submission_id = %submission.id,
                    campaign_id = %campaign.id,
                    %channel,
                    "Send failed: {e}"
                );
                Outcome::Failed
            }
            Ok(Ok(())) => match self.store.mark_delivered(&submission.id, Utc::now()) {
                Ok(true) => {
                    tracing::info!(
                        submission_id = %submission.id,
                        campaign_id = %campaign.id,
                        %channel,
                        "✅ Delivered"
                    );
                    Outcome::Delivered
                }
                Ok(false) => {
                    // A concurrent run committed first. The message may have
                    // gone out twice — surfaced loudly, but the store state
                    // stays consistent.
                    tracing::warn!(
                        submission_id = %submission.id,
                        campaign_id = %campaign.id,
                        "Delivery commit lost the race, submission was already delivered"
                    );
                    Outcome::Skipped
                }
                Err(e) => {
                    tracing::error!(
                        submission_id = %submission.id,
                        campaign_id = %campaign.id,
                        "Delivery commit failed: {e}"
                    );
                    Outcome::Failed
                }
            },
        }
    }
}

/// Run the reconciliation loop on a fixed cadence. Run errors are logged,
/// never propagated — the next tick retries from store state.
pub async fn spawn_scheduler(engine: Arc<ReconcileEngine>, check_interval_secs: u64) {
    tracing::info!(
        "⏰ Delivery scheduler started (check every {}s)",
        check_interval_secs
    );

    let mut interval = tokio::time::interval(Duration::from_secs(check_interval_secs.max(1)));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        if let Err(e) = engine.run(Utc::now()).await {
            tracing::error!("⚠️ Reconciliation run failed: {e}");
        }
    }
}
