use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParametersBuilder};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tops_config::{SmtpConfig, SmtpTlsMode};
use tops_core::{EmailMessage, NotificationError, NotificationService};
use tracing::{debug, info};

/// Sends mail through the configured SMTP relay.
pub struct SmtpEmailService {
    from: String,
    mailer: Option<AsyncSmtpTransport<Tokio1Executor>>,
}

impl SmtpEmailService {
    /// Builds the transport. No connection is made until the first send.
    pub fn new(config: &SmtpConfig) -> Result<Self, NotificationError> {
        if !config.enabled {
            return Ok(Self {
                from: config.from.clone(),
                mailer: None,
            });
        }

        let credentials = (!config.user.is_empty())
            .then(|| Credentials::new(config.user.clone(), config.password.clone()));

        let mailer = match config.tls_mode {
            SmtpTlsMode::None => {
                let mut builder =
                    AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
                        .port(config.port);
                if let Some(credentials) = credentials {
                    builder = builder.credentials(credentials);
                }
                builder.build()
            }
            SmtpTlsMode::Starttls => {
                let tls = TlsParametersBuilder::new(config.host.clone())
                    .build()
                    .map_err(|e| NotificationError::ConfigurationError(e.to_string()))?;
                let mut builder =
                    AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
                        .port(config.port)
                        .tls(Tls::Required(tls));
                if let Some(credentials) = credentials {
                    builder = builder.credentials(credentials);
                }
                builder.build()
            }
            SmtpTlsMode::Tls => {
                let tls = TlsParametersBuilder::new(config.host.clone())
                    .build()
                    .map_err(|e| NotificationError::ConfigurationError(e.to_string()))?;
                let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                    .map_err(|e| NotificationError::ConfigurationError(e.to_string()))?
                    .port(config.port)
                    .tls(Tls::Wrapper(tls));
                if let Some(credentials) = credentials {
                    builder = builder.credentials(credentials);
                }
                builder.build()
            }
        };

        info!("SMTP notifications enabled via {}:{}", config.host, config.port);
        Ok(Self {
            from: config.from.clone(),
            mailer: Some(mailer),
        })
    }

    fn build_message(&self, message: &EmailMessage) -> Result<Message, NotificationError> {
        let from_address = message.from.as_deref().unwrap_or(&self.from);
        let from: Mailbox = from_address
            .parse()
            .map_err(|_| NotificationError::ConfigurationError(format!("invalid sender {from_address:?}")))?;

        let mut builder = Message::builder().from(from).subject(message.subject.clone());

        if message.to.is_empty() {
            return Err(NotificationError::InvalidRecipient("no recipients".to_string()));
        }
        for recipient in &message.to {
            let mailbox: Mailbox = recipient
                .parse()
                .map_err(|_| NotificationError::InvalidRecipient(recipient.clone()))?;
            builder = builder.to(mailbox);
        }

        if let Some(reply_to) = &message.reply_to {
            let mailbox: Mailbox = reply_to
                .parse()
                .map_err(|_| NotificationError::InvalidRecipient(reply_to.clone()))?;
            builder = builder.reply_to(mailbox);
        }

        let built = match &message.html_body {
            Some(html) => builder.multipart(MultiPart::alternative_plain_html(
                message.body.clone(),
                html.clone(),
            )),
            None => builder.singlepart(SinglePart::plain(message.body.clone())),
        };

        built.map_err(|e| NotificationError::SendError(e.to_string()))
    }
}

#[async_trait]
impl NotificationService for SmtpEmailService {
    async fn send_email(&self, message: EmailMessage) -> Result<(), NotificationError> {
        let Some(mailer) = &self.mailer else {
            return Err(NotificationError::ServiceUnavailable(
                "SMTP is not enabled".to_string(),
            ));
        };

        let email = self.build_message(&message)?;
        mailer
            .send(email)
            .await
            .map_err(|e| NotificationError::SendError(e.to_string()))?;

        debug!("sent email {:?} to {:?}", message.subject, message.to);
        Ok(())
    }

    async fn is_configured(&self) -> Result<bool, NotificationError> {
        Ok(self.mailer.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled_config() -> SmtpConfig {
        SmtpConfig {
            enabled: true,
            host: "localhost".to_string(),
            port: 2525,
            from: "tops@example.net".to_string(),
            tls_mode: SmtpTlsMode::None,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn disabled_service_reports_unconfigured() {
        let service = SmtpEmailService::new(&SmtpConfig::default()).unwrap();

        assert!(!service.is_configured().await.unwrap());
        let result = service
            .send_email(EmailMessage::new("ops@example.net", "subject"))
            .await;
        assert!(matches!(result, Err(NotificationError::ServiceUnavailable(_))));
    }

    #[tokio::test]
    async fn message_with_html_body_is_multipart() {
        let service = SmtpEmailService::new(&enabled_config()).unwrap();
        assert!(service.is_configured().await.unwrap());

        let mut message = EmailMessage::new("ops@example.net", "ACME renewal summary");
        message.body = "2 renewed".to_string();
        message.html_body = Some("<p>2 renewed</p>".to_string());

        let built = service.build_message(&message).unwrap();
        let raw = String::from_utf8(built.formatted()).unwrap();
        assert!(raw.contains("multipart/alternative"));
        assert!(raw.contains("Subject: ACME renewal summary"));
    }

    #[tokio::test]
    async fn invalid_recipient_is_rejected() {
        let service = SmtpEmailService::new(&enabled_config()).unwrap();
        let message = EmailMessage::new("not an address", "subject");

        assert!(matches!(
            service.build_message(&message),
            Err(NotificationError::InvalidRecipient(_))
        ));
    }
}
