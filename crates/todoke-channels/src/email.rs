//! Email delivery via async SMTP (lettre).

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use todoke_core::config::SmtpConfig;
use todoke_core::error::{Result, TodokeError};
use todoke_core::traits::DeliverySender;
use todoke_core::types::{Campaign, DeliveryChannel, Submission};

use crate::template;

/// Bound on a single image download.
const IMAGE_FETCH_TIMEOUT_SECS: u64 = 20;

/// Appended to the body when an attached image could not be processed.
const IMAGE_FALLBACK_NOTE: &str = "\n\n(The attached image could not be included.)";

/// Email channel adapter.
pub struct EmailSender {
    config: SmtpConfig,
    http: reqwest::Client,
}

impl EmailSender {
    pub fn new(config: SmtpConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Parse and validate a recipient address. Invalid/missing recipients
    /// are a hard failure for this attempt — retry policy belongs to the
    /// reconciliation engine.
    fn parse_recipient(addr: &str) -> Result<Mailbox> {
        addr.parse()
            .map_err(|e| TodokeError::Channel(format!("Invalid recipient '{addr}': {e}")))
    }

    fn from_mailbox(&self, campaign: &Campaign) -> Result<Mailbox> {
        let addr = campaign
            .from_email
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(self.config.from_email.as_str());
        if addr.is_empty() {
            return Err(TodokeError::Channel(
                "No from address configured for campaign or SMTP".into(),
            ));
        }
        format!("{} <{}>", self.config.from_name, addr)
            .parse()
            .map_err(|e| TodokeError::Channel(format!("Invalid from '{addr}': {e}")))
    }

    /// Fetch the referenced image. Any failure here is recoverable — the
    /// caller degrades to a text-only send.
    async fn fetch_image(&self, url: &str) -> Result<(Vec<u8>, String, ContentType)> {
        let resp = self
            .http
            .get(url)
            .timeout(std::time::Duration::from_secs(IMAGE_FETCH_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|e| TodokeError::Channel(format!("Image fetch: {e}")))?;

        if !resp.status().is_success() {
            return Err(TodokeError::Channel(format!(
                "Image fetch: HTTP {}",
                resp.status()
            )));
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let parsed_type = ContentType::parse(&content_type)
            .map_err(|e| TodokeError::Channel(format!("Image content type: {e}")))?;

        let filename = url
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("image")
            .split('?')
            .next()
            .unwrap_or("image")
            .to_string();

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| TodokeError::Channel(format!("Image body: {e}")))?;

        Ok((bytes.to_vec(), filename, parsed_type))
    }

    /// Assemble the outgoing message from the rendered parts and the image
    /// fetch outcome. A failed fetch degrades to text-only with a note in
    /// the body; only a successful fetch yields a multipart message.
    fn build_message(
        from: Mailbox,
        to: Mailbox,
        subject: String,
        mut body: String,
        image: Option<Result<(Vec<u8>, String, ContentType)>>,
    ) -> Result<Message> {
        let attachment = match image {
            Some(Ok((bytes, filename, content_type))) => {
                Some(Attachment::new(filename).body(bytes, content_type))
            }
            Some(Err(_)) => {
                body.push_str(IMAGE_FALLBACK_NOTE);
                None
            }
            None => None,
        };

        let builder = Message::builder().from(from).to(to).subject(subject);
        match attachment {
            Some(part) => builder
                .multipart(
                    MultiPart::mixed()
                        .singlepart(SinglePart::plain(body))
                        .singlepart(part),
                )
                .map_err(|e| TodokeError::Channel(format!("Build email: {e}"))),
            None => builder
                .header(ContentType::TEXT_PLAIN)
                .body(body)
                .map_err(|e| TodokeError::Channel(format!("Build email: {e}"))),
        }
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let creds = Credentials::new(self.config.username.clone(), self.config.password.clone());
        Ok(
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.host)
                .map_err(|e| TodokeError::Channel(format!("SMTP relay: {e}")))?
                .port(self.config.port)
                .credentials(creds)
                .build(),
        )
    }
}

#[async_trait]
impl DeliverySender for EmailSender {
    fn channel(&self) -> DeliveryChannel {
        DeliveryChannel::Email
    }

    async fn send(&self, submission: &Submission, campaign: &Campaign) -> Result<()> {
        let recipient = submission
            .form_data
            .email()
            .ok_or_else(|| TodokeError::Channel("Submission has no recipient email".into()))?;
        let to = Self::parse_recipient(recipient)?;
        let from = self.from_mailbox(campaign)?;

        let subject = campaign
            .email_template
            .as_ref()
            .map(|t| template::render(&t.subject, submission))
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| campaign.name.clone());
        let body = template::render_or_message(
            campaign.email_template.as_ref().map(|t| t.body.as_str()),
            submission,
        );

        // Image processing must never abort the email — degrade to
        // text-only with a note on any failure.
        let image = match submission.form_data.image_url() {
            Some(url) => {
                let fetched = self.fetch_image(url).await;
                if let Err(e) = &fetched {
                    tracing::warn!(
                        "⚠️ Image degraded to text-only for submission {}: {e}",
                        submission.id
                    );
                }
                Some(fetched)
            }
            None => None,
        };

        let email = Self::build_message(from, to, subject, body, image)?;

        self.transport()?
            .send(email)
            .await
            .map_err(|e| TodokeError::Channel(format!("SMTP send: {e}")))?;

        tracing::info!("📤 Email sent for submission {} → {recipient}", submission.id);
        Ok(())
    }
}
