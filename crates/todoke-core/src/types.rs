//! Domain types: campaigns, submissions, and typed form data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Delivery transport for a submission's message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryChannel {
    Email,
    Line,
}

impl DeliveryChannel {
    /// Parse the stored string form ("email" / "line").
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "email" => Some(Self::Email),
            "line" => Some(Self::Line),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Line => "line",
        }
    }
}

impl std::fmt::Display for DeliveryChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a campaign schedules deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryType {
    /// One fixed instant for every submission.
    Datetime,
    /// N days after each submission's own submitted_at.
    Interval,
}

impl DeliveryType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "datetime" => Some(Self::Datetime),
            "interval" => Some(Self::Interval),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Datetime => "datetime",
            Self::Interval => "interval",
        }
    }
}

/// A single form field value — string or string list, never an untyped blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FormValue {
    Text(String),
    List(Vec<String>),
}

impl FormValue {
    /// The text form of this value. Lists join with ", ".
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::List(items) => items.join(", "),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s.as_str()),
            Self::List(_) => None,
        }
    }
}

// Well-known form field names. Everything else is a campaign custom field.
pub const FIELD_MESSAGE: &str = "message";
pub const FIELD_EMAIL: &str = "email";
pub const FIELD_IMAGE_URL: &str = "imageUrl";
pub const FIELD_LINE_ID: &str = "lineId";

/// Submitted form data: a mapping from field name to a tagged value, with
/// typed accessors for the well-known keys and an open-ended bag for the
/// campaign's custom fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormData(pub BTreeMap<String, FormValue>);

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: FormValue) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&FormValue> {
        self.0.get(name)
    }

    /// The message body text, if present and non-empty.
    pub fn message(&self) -> Option<&str> {
        self.text_field(FIELD_MESSAGE)
    }

    /// The recipient email address, if present and non-empty.
    pub fn email(&self) -> Option<&str> {
        self.text_field(FIELD_EMAIL)
    }

    /// An attached image reference (URL into external storage).
    pub fn image_url(&self) -> Option<&str> {
        self.text_field(FIELD_IMAGE_URL)
    }

    /// The LINE platform user identifier.
    pub fn line_id(&self) -> Option<&str> {
        self.text_field(FIELD_LINE_ID)
    }

    fn text_field(&self, name: &str) -> Option<&str> {
        self.0
            .get(name)
            .and_then(|v| v.as_text())
            .filter(|s| !s.is_empty())
    }
}

/// A user-submitted message awaiting (or past) delivery.
///
/// `delivered_at` is the dual-purpose field inherited from the document
/// store: it holds the *scheduled* due-time, written once at creation and
/// never overwritten. The moment of actual delivery is recorded separately
/// in `actual_delivered_at`. The raw string form is kept so a malformed
/// value degrades to "not evaluable" instead of failing the store read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: String,
    pub campaign_id: String,
    pub submitted_at: DateTime<Utc>,
    /// Channel chosen at submission time. Wins over the campaign default.
    pub delivery_choice: Option<DeliveryChannel>,
    pub delivered: bool,
    /// Scheduled due-time, write-once at creation. RFC3339, or tz-naive
    /// (interpreted as JST).
    pub delivered_at: Option<String>,
    /// When the send actually completed. Stamped once, on success.
    pub actual_delivered_at: Option<DateTime<Utc>>,
    pub form_data: FormData,
    /// Opaque to scheduling; carried for the admin surface.
    #[serde(default)]
    pub survey_answers: BTreeMap<String, serde_json::Value>,
}

/// Email subject/body templates with `{placeholder}` substitution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailTemplate {
    pub subject: String,
    pub body: String,
}

/// A campaign's delivery policy and channel credentials.
///
/// Exactly one of `delivery_datetime` / `delivery_interval_days` is active,
/// gated by `delivery_type`. The policy is a fallback: submissions normally
/// carry their own precomputed due-time in `delivered_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub name: String,
    pub delivery_type: DeliveryType,
    /// Fixed delivery instant, raw string (may be tz-naive — read as JST).
    pub delivery_datetime: Option<String>,
    pub delivery_interval_days: Option<i64>,
    /// Default channel; an explicit submission choice always wins.
    pub delivery_channel: Option<DeliveryChannel>,
    pub line_channel_id: Option<String>,
    pub line_channel_secret: Option<String>,
    /// LINE push message template.
    pub line_message: Option<String>,
    pub email_template: Option<EmailTemplate>,
    /// From address for email delivery (form settings).
    pub from_email: Option<String>,
    // Publish/submission windows — opaque to the scheduler.
    pub publish_start: Option<String>,
    pub publish_end: Option<String>,
    pub submission_start: Option<String>,
    pub submission_end: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_roundtrip() {
        assert_eq!(DeliveryChannel::parse("line"), Some(DeliveryChannel::Line));
        assert_eq!(DeliveryChannel::parse("email"), Some(DeliveryChannel::Email));
        assert_eq!(DeliveryChannel::parse("fax"), None);
        assert_eq!(DeliveryChannel::Line.as_str(), "line");
    }

    #[test]
    fn test_form_value_untagged_serde() {
        let json = r#"{"message":"hello","tags":["a","b"],"email":"x@example.com"}"#;
        let form: FormData = serde_json::from_str(json).unwrap();
        assert_eq!(form.message(), Some("hello"));
        assert_eq!(form.email(), Some("x@example.com"));
        assert_eq!(
            form.get("tags"),
            Some(&FormValue::List(vec!["a".into(), "b".into()]))
        );
    }

    #[test]
    fn test_empty_text_fields_read_as_absent() {
        let mut form = FormData::new();
        form.insert(FIELD_EMAIL, FormValue::Text(String::new()));
        assert_eq!(form.email(), None);
        assert_eq!(form.line_id(), None);
    }

    #[test]
    fn test_list_to_text() {
        let v = FormValue::List(vec!["red".into(), "blue".into()]);
        assert_eq!(v.to_text(), "red, blue");
        assert_eq!(v.as_text(), None);
    }
}
