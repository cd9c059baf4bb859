//! Outbound email for invoices and receipts.

use crate::config::SmtpConfig;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Attachment, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use std::sync::Mutex;

/// A file attached to an outgoing email.
#[derive(Debug, Clone)]
pub struct EmailAttachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_html_email(&self, to: &str, subject: &str, html: &str) -> Result<(), AppError>;

    async fn send_email_with_attachment(
        &self,
        to: &str,
        subject: &str,
        html: &str,
        attachment: EmailAttachment,
    ) -> Result<(), AppError>;
}

pub struct SmtpEmailSender {
    config: SmtpConfig,
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
}

impl SmtpEmailSender {
    pub fn new(config: SmtpConfig) -> Result<Self, AppError> {
        if !config.enabled {
            return Ok(Self {
                config,
                transport: None,
            });
        }

        let creds = Credentials::new(
            config.user.clone(),
            config.password.expose_secret().clone(),
        );

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| AppError::EmailError(format!("Failed to create SMTP relay: {}", e)))?
            .port(config.port)
            .credentials(creds)
            .build();

        Ok(Self {
            config,
            transport: Some(transport),
        })
    }

    fn mailboxes(&self, to: &str) -> Result<(Mailbox, Mailbox), AppError> {
        let from: Mailbox = format!("{} <{}>", self.config.from_name, self.config.from_email)
            .parse()
            .map_err(|e| AppError::EmailError(format!("Invalid from address: {}", e)))?;
        let to: Mailbox = to
            .parse()
            .map_err(|e| AppError::EmailError(format!("Invalid recipient: {}", e)))?;
        Ok((from, to))
    }

    async fn deliver(&self, message: Message) -> Result<(), AppError> {
        let Some(transport) = self.transport.as_ref() else {
            tracing::debug!("SMTP disabled, dropping email");
            return Ok(());
        };
        transport
            .send(message)
            .await
            .map_err(|e| AppError::EmailError(format!("Failed to send email: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send_html_email(&self, to: &str, subject: &str, html: &str) -> Result<(), AppError> {
        let (from, recipient) = self.mailboxes(to)?;
        let message = Message::builder()
            .from(from)
            .to(recipient)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html.to_string())?;

        self.deliver(message).await?;
        tracing::info!(to = %to, subject = %subject, "Email sent");
        Ok(())
    }

    async fn send_email_with_attachment(
        &self,
        to: &str,
        subject: &str,
        html: &str,
        attachment: EmailAttachment,
    ) -> Result<(), AppError> {
        let (from, recipient) = self.mailboxes(to)?;
        let content_type = ContentType::parse(&attachment.content_type)
            .map_err(|e| AppError::EmailError(format!("Invalid attachment type: {}", e)))?;

        let message = Message::builder()
            .from(from)
            .to(recipient)
            .subject(subject)
            .multipart(
                MultiPart::mixed()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html.to_string()),
                    )
                    .singlepart(
                        Attachment::new(attachment.filename.clone())
                            .body(attachment.data, content_type),
                    ),
            )?;

        self.deliver(message).await?;
        tracing::info!(
            to = %to,
            subject = %subject,
            attachment = %attachment.filename,
            "Email with attachment sent"
        );
        Ok(())
    }
}

/// A message captured by [`MockEmailSender`].
#[derive(Debug, Clone)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub attachment: Option<String>,
}

/// Records messages instead of sending them.
#[derive(Default)]
pub struct MockEmailSender {
    sent: Mutex<Vec<SentEmail>>,
}

impl MockEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn record(&self, email: SentEmail) {
        tracing::info!(to = %email.to, subject = %email.subject, "[MOCK] Email would be sent");
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(email);
        }
    }
}

#[async_trait]
impl EmailSender for MockEmailSender {
    async fn send_html_email(&self, to: &str, subject: &str, _html: &str) -> Result<(), AppError> {
        self.record(SentEmail {
            to: to.to_string(),
            subject: subject.to_string(),
            attachment: None,
        });
        Ok(())
    }

    async fn send_email_with_attachment(
        &self,
        to: &str,
        subject: &str,
        _html: &str,
        attachment: EmailAttachment,
    ) -> Result<(), AppError> {
        self.record(SentEmail {
            to: to.to_string(),
            subject: subject.to_string(),
            attachment: Some(attachment.filename),
        });
        Ok(())
    }
}
