use crate::backup::notifications::Notification;
use crate::backup::redacted::RedactedString;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{WithDebugObjectAndFnName, WithMsg};
use bon::Builder;
use getset::Getters;
use itertools::Itertools;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use validator::Validate;

static DEFAULT_SMTP_HOST: &str = "localhost";
static DEFAULT_SENDER: &str = "backups@localhost";

fn default_smtp_host() -> String {
    DEFAULT_SMTP_HOST.to_string()
}

/// The plan's `smtp` block, shared by every mailed report.
///
/// Credentials are only used when both `username` and `password` are set; the
/// password is a `RedactedString` so it never shows up in logs.
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct SmtpSettings {
    #[serde(default = "default_smtp_host")]
    #[validate(length(min = 1))]
    #[builder(into, default = default_smtp_host())]
    host: String,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    #[builder(default)]
    smtp_mode: SmtpMode,
    #[serde(default)]
    from: Option<Mailbox>,
    #[serde(default)]
    #[builder(into)]
    username: Option<String>,
    #[serde(default)]
    #[builder(into)]
    password: Option<RedactedString>,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        SmtpSettings::builder().build()
    }
}

impl SmtpSettings {
    pub fn sender(&self) -> Result<Mailbox> {
        match &self.from {
            Some(from) => Ok(from.clone()),
            None => DEFAULT_SENDER.parse::<Mailbox>().map_err(Error::from),
        }
    }

    fn transport(&self) -> Result<SmtpTransport> {
        let mut builder = match self.smtp_mode {
            SmtpMode::Unsecured => Ok(SmtpTransport::builder_dangerous(self.host.as_str())),
            SmtpMode::Ssl => SmtpTransport::relay(self.host.as_str()),
            SmtpMode::StartTls => SmtpTransport::starttls_relay(self.host.as_str()),
        }
        .map_err(Error::from)
        .with_msg(format!(
            "Failed to build smtp client for host: {:?} with mode {:?}",
            self.host, self.smtp_mode
        ))?;
        if let Some(port) = self.port {
            builder = builder.port(port);
        }
        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            builder = builder.credentials(Credentials::new(
                username.clone(),
                password.inner().to_string(),
            ));
        }
        Ok(builder.build())
    }
}

/// SMTP connection security modes
///
/// - `Unsecured`: Plain text connection (not recommended for production)
/// - `Ssl`: SSL/TLS encrypted connection from start
/// - `StartTls`: Start with plain text, then upgrade to TLS
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum SmtpMode {
    Unsecured,
    Ssl,
    #[default]
    StartTls,
}

/// Mails an HTML report to one recipient.
#[derive(Clone, Debug, Getters)]
#[getset(get = "pub")]
pub struct SmtpNotification {
    settings: SmtpSettings,
    to: Mailbox,
}

impl SmtpNotification {
    pub fn new(settings: SmtpSettings, to: Mailbox) -> Self {
        SmtpNotification { settings, to }
    }
}

impl Notification for SmtpNotification {
    fn send<D1: Display, D2: Display>(&self, topic: D1, msg: D2) -> Result<()> {
        let from = self.settings.sender()?;
        tracing::info!("Send email report from {} to {}", from, self.to);
        let email = Message::builder()
            .from(from.clone())
            .to(self.to.clone())
            .subject(format!("{}", topic))
            .header(ContentType::TEXT_HTML)
            .body(format!("{}", msg))
            .map_err(Error::from)
            .with_msg(format!(
                "Fail to build report email from {} to {}",
                from, self.to
            ))?;

        let response = self
            .settings
            .transport()?
            .send(&email)
            .map_err(Error::from)
            .with_debug_object_and_fn_name(self.to.clone(), "send")?;
        if response.is_positive() {
            return Ok(());
        }
        let errors = response
            .message()
            .map(|m| Error::SmtpSendError(m.to_owned()))
            .collect_vec();
        if errors.is_empty() {
            Err(Error::SmtpSendError(format!(
                "smtp server answered {}",
                response.code()
            )))
        } else {
            Err(errors.into())
        }
    }
}
