//! Message template rendering.
//!
//! Campaign templates use `{placeholder}` substitution: `{message}`,
//! `{email}`, `{submittedAt}`, plus every custom form field by name.

use todoke_core::jst;
use todoke_core::types::{Submission, FIELD_EMAIL, FIELD_MESSAGE};

/// Render a template against a submission's form data.
///
/// Every form field (well-known and custom) substitutes by name;
/// `{submittedAt}` formats the submission instant as a JST wall-clock
/// string. Well-known placeholders with no value render as empty rather
/// than leaving raw braces in the outgoing message.
///
/// Single pass over the template: only placeholders written in the
/// template itself are substituted. Braces inside submitted field values
/// are user text and pass through verbatim.
pub fn render(template: &str, submission: &Submission) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 1..];
        let Some(end) = tail.find('}') else {
            // Unterminated brace: keep the remainder literally.
            out.push_str(&rest[start..]);
            return out;
        };
        let name = &tail[..end];
        match placeholder_value(name, submission) {
            Some(value) => out.push_str(&value),
            None => {
                // Unknown custom placeholder, left as-is.
                out.push('{');
                out.push_str(name);
                out.push('}');
            }
        }
        rest = &tail[end + 1..];
    }
    out.push_str(rest);
    out
}

fn placeholder_value(name: &str, submission: &Submission) -> Option<String> {
    if name == "submittedAt" {
        return Some(jst::format_local(submission.submitted_at));
    }
    if let Some(value) = submission.form_data.get(name) {
        return Some(value.to_text());
    }
    (name == FIELD_MESSAGE || name == FIELD_EMAIL).then(String::new)
}

/// Render, falling back to the raw message text when the template is
/// missing or renders to nothing usable.
pub fn render_or_message(template: Option<&str>, submission: &Submission) -> String {
    if let Some(t) = template {
        let rendered = render(t, submission);
        if !rendered.trim().is_empty() {
            return rendered;
        }
    }
    submission.form_data.message().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;
    use todoke_core::types::{FormData, FormValue, Submission};

    fn submission() -> Submission {
        let mut form = FormData::new();
        form.insert("message", FormValue::Text("Happy birthday!".into()));
        form.insert("email", FormValue::Text("taro@example.com".into()));
        form.insert("nickname", FormValue::Text("Taro".into()));
        form.insert("colors", FormValue::List(vec!["red".into(), "blue".into()]));
        Submission {
            id: "s1".into(),
            campaign_id: "c1".into(),
            submitted_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            delivery_choice: None,
            delivered: false,
            delivered_at: None,
            actual_delivered_at: None,
            form_data: form,
            survey_answers: BTreeMap::new(),
        }
    }

    #[test]
    fn test_well_known_and_custom_fields() {
        let s = submission();
        let out = render("Dear {nickname}: {message} ({email})", &s);
        assert_eq!(out, "Dear Taro: Happy birthday! (taro@example.com)");
    }

    #[test]
    fn test_submitted_at_is_jst() {
        let s = submission();
        // 2024-01-01T00:00Z == 09:00 JST
        assert_eq!(render("{submittedAt}", &s), "2024-01-01 09:00");
    }

    #[test]
    fn test_list_fields_join() {
        let s = submission();
        assert_eq!(render("{colors}", &s), "red, blue");
    }

    #[test]
    fn test_missing_well_known_renders_empty() {
        let mut s = submission();
        s.form_data = FormData::new();
        assert_eq!(render("[{message}][{email}]", &s), "[][]");
        // Unknown custom placeholders are left as-is
        assert_eq!(render("{mystery}", &s), "{mystery}");
    }

    #[test]
    fn test_braces_in_field_values_stay_literal() {
        let mut s = submission();
        s.form_data.insert(
            "message",
            FormValue::Text("reply to {email} please".into()),
        );
        // The recipient address must not be injected into user-written text.
        assert_eq!(render("{message}", &s), "reply to {email} please");
        assert_eq!(
            render("{nickname} wrote: {message}", &s),
            "Taro wrote: reply to {email} please"
        );
    }

    #[test]
    fn test_render_or_message_fallback() {
        let s = submission();
        // Whitespace-only template falls back to the raw message
        assert_eq!(render_or_message(Some("  "), &s), "Happy birthday!");
        assert_eq!(render_or_message(None, &s), "Happy birthday!");
        assert_eq!(render_or_message(Some("{nickname}"), &s), "Taro");
    }
}
