//! Trait seams shared across crates.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Campaign, DeliveryChannel, Submission};

/// A stateless channel adapter that performs exactly one delivery attempt.
///
/// Senders never mutate the submission store — marking a submission as
/// delivered is the reconciliation engine's job, so the commit stays atomic
/// and centralized. Failures surface as `TodokeError::Channel` with a
/// human-readable reason.
#[async_trait]
pub trait DeliverySender: Send + Sync {
    /// Which channel this sender serves.
    fn channel(&self) -> DeliveryChannel;

    /// Attempt one delivery of this submission's message.
    async fn send(&self, submission: &Submission, campaign: &Campaign) -> Result<()>;
}
