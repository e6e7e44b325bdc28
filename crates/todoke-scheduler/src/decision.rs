//! Delivery decision engine — pure, side-effect-free.
//!
//! Given a submission, its campaign, and the current instant, decide
//! whether delivery should happen now and through which channel. Due-time
//! sources are resolved in strict priority order; later rules apply only
//! when earlier ones fail to produce a definite due-time:
//!
//! 1. The submission's own `delivered_at` (scheduled due-time, precomputed
//!    at creation), when present and parseable.
//! 2. Campaign `datetime` policy — one fixed instant, naive strings read
//!    as JST.
//! 3. Campaign `interval` policy — N calendar days after `submitted_at`.
//! 4. Otherwise the submission is not evaluable this pass and is retried
//!    on the next run.

use chrono::{DateTime, Utc};

use todoke_core::jst;
use todoke_core::types::{Campaign, DeliveryChannel, DeliveryType, Submission};

/// Why a submission was not evaluable this pass. Not an error — skipped
/// submissions stay candidates for the next run (except already-delivered
/// ones, which are permanently out).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Idempotence guard: `delivered == true` wins over any due-time math.
    AlreadyDelivered,
    /// No source produced a definite due-time.
    NoDueTime,
    /// Neither the submission nor the campaign names a usable channel.
    NoChannel,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyDelivered => write!(f, "already delivered"),
            Self::NoDueTime => write!(f, "no usable due-time"),
            Self::NoChannel => write!(f, "no usable channel"),
        }
    }
}

/// Outcome of evaluating one submission at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Due now — invoke the sender for this channel.
    Deliver {
        channel: DeliveryChannel,
        due: DateTime<Utc>,
    },
    /// Has a due-time in the future; leave untouched.
    NotDue { due: DateTime<Utc> },
    /// Not evaluable this pass.
    Skip(SkipReason),
}

/// Evaluate one submission. Boundary inclusive: `now >= due` delivers.
pub fn evaluate(submission: &Submission, campaign: &Campaign, now: DateTime<Utc>) -> Decision {
    if submission.delivered {
        return Decision::Skip(SkipReason::AlreadyDelivered);
    }

    let Some(due) = due_time(submission, campaign) else {
        return Decision::Skip(SkipReason::NoDueTime);
    };

    if now < due {
        return Decision::NotDue { due };
    }

    match channel_for(submission, campaign) {
        Some(channel) => Decision::Deliver { channel, due },
        None => Decision::Skip(SkipReason::NoChannel),
    }
}

/// Resolve the due-time through the priority chain. `None` means not
/// evaluable. Malformed time fields never panic; an unparseable
/// `delivered_at` is logged and falls through to the campaign policy.
pub fn due_time(submission: &Submission, campaign: &Campaign) -> Option<DateTime<Utc>> {
    if let Some(raw) = submission.delivered_at.as_deref() {
        if let Some(due) = jst::parse_due_time(raw) {
            return Some(due);
        }
        tracing::warn!(
            submission_id = %submission.id,
            campaign_id = %campaign.id,
            delivered_at = %raw,
            "Unparseable scheduled due-time, falling back to campaign policy"
        );
    }
    policy_due_time(campaign, submission.submitted_at)
}

/// Apply the campaign-level delivery policy to a submission instant.
/// Also used at submission-creation time to precompute `delivered_at`.
pub fn policy_due_time(campaign: &Campaign, submitted_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match campaign.delivery_type {
        DeliveryType::Datetime => campaign
            .delivery_datetime
            .as_deref()
            .and_then(jst::parse_due_time),
        DeliveryType::Interval => campaign
            .delivery_interval_days
            .map(|days| jst::add_days(submitted_at, days)),
    }
}

/// Channel precedence: the submission's explicit choice always wins; the
/// campaign channel is only a default for submissions that recorded none.
pub fn channel_for(submission: &Submission, campaign: &Campaign) -> Option<DeliveryChannel> {
    submission.delivery_choice.or(campaign.delivery_channel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::BTreeMap;
    use todoke_core::types::FormData;

    fn campaign(delivery_type: DeliveryType) -> Campaign {
        Campaign {
            id: "c1".into(),
            name: "Camp".into(),
            delivery_type,
            delivery_datetime: None,
            delivery_interval_days: None,
            delivery_channel: Some(DeliveryChannel::Email),
            line_channel_id: None,
            line_channel_secret: None,
            line_message: None,
            email_template: None,
            from_email: None,
            publish_start: None,
            publish_end: None,
            submission_start: None,
            submission_end: None,
        }
    }

    fn submission() -> Submission {
        Submission {
            id: "s1".into(),
            campaign_id: "c1".into(),
            submitted_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            delivery_choice: None,
            delivered: false,
            delivered_at: None,
            actual_delivered_at: None,
            form_data: FormData::new(),
            survey_answers: BTreeMap::new(),
        }
    }

    #[test]
    fn test_due_boundary_is_inclusive() {
        let c = campaign(DeliveryType::Datetime);
        let mut s = submission();
        s.delivered_at = Some("2024-01-08T00:00:00Z".into());
        let due = Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap();

        // One second before: not due.
        let before = due - chrono::Duration::seconds(1);
        assert_eq!(evaluate(&s, &c, before), Decision::NotDue { due });

        // Exactly at the boundary: due.
        assert_eq!(
            evaluate(&s, &c, due),
            Decision::Deliver {
                channel: DeliveryChannel::Email,
                due
            }
        );
    }

    #[test]
    fn test_delivered_guard_wins_over_due_time() {
        let c = campaign(DeliveryType::Datetime);
        let mut s = submission();
        s.delivered_at = Some("2024-01-08T00:00:00Z".into());
        s.delivered = true;
        let long_after = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            evaluate(&s, &c, long_after),
            Decision::Skip(SkipReason::AlreadyDelivered)
        );
    }

    #[test]
    fn test_interval_fallback_when_delivered_at_absent() {
        let mut c = campaign(DeliveryType::Interval);
        c.delivery_interval_days = Some(7);
        let s = submission(); // submitted 2024-01-01T00:00Z, no delivered_at
        let expected_due = Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap();
        assert_eq!(due_time(&s, &c), Some(expected_due));
    }

    #[test]
    fn test_delivered_at_shadows_campaign_policy() {
        let mut c = campaign(DeliveryType::Interval);
        c.delivery_interval_days = Some(30);
        let mut s = submission();
        s.delivered_at = Some("2024-01-08T00:00:00Z".into());
        // The precomputed due-time wins; the interval fallback is never consulted.
        assert_eq!(
            due_time(&s, &c),
            Some(Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_unparseable_delivered_at_falls_through() {
        let mut c = campaign(DeliveryType::Interval);
        c.delivery_interval_days = Some(7);
        let mut s = submission();
        s.delivered_at = Some("not a timestamp".into());
        assert_eq!(
            due_time(&s, &c),
            Some(Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_no_due_time_is_skip() {
        // Datetime campaign without a datetime, submission without delivered_at.
        let c = campaign(DeliveryType::Datetime);
        let s = submission();
        assert_eq!(
            evaluate(&s, &c, Utc::now()),
            Decision::Skip(SkipReason::NoDueTime)
        );
    }

    #[test]
    fn test_channel_precedence_submission_choice_wins() {
        let c = campaign(DeliveryType::Datetime); // campaign default: email
        let mut s = submission();
        s.delivery_choice = Some(DeliveryChannel::Line);
        assert_eq!(channel_for(&s, &c), Some(DeliveryChannel::Line));

        s.delivery_choice = None;
        assert_eq!(channel_for(&s, &c), Some(DeliveryChannel::Email));
    }

    #[test]
    fn test_missing_channel_is_skip() {
        let mut c = campaign(DeliveryType::Datetime);
        c.delivery_channel = None;
        c.delivery_datetime = Some("2024-01-01T00:00:00Z".into());
        let s = submission();
        let after = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        assert_eq!(evaluate(&s, &c, after), Decision::Skip(SkipReason::NoChannel));
    }

    #[test]
    fn test_naive_campaign_datetime_read_as_jst() {
        let mut c = campaign(DeliveryType::Datetime);
        c.delivery_datetime = Some("2025-06-01T09:00".into()); // 09:00 JST == 00:00 UTC
        let s = submission();

        let before = Utc.with_ymd_and_hms(2025, 5, 30, 0, 0, 0).unwrap();
        assert!(matches!(evaluate(&s, &c, before), Decision::NotDue { .. }));

        let after = Utc.with_ymd_and_hms(2025, 6, 1, 0, 5, 0).unwrap();
        assert!(matches!(evaluate(&s, &c, after), Decision::Deliver { .. }));
    }
}
