use anyhow::Context;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::SmtpConfig;

/// Outbound message transport.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(
        &self,
        subject: &str,
        template: &str,
        data: &Value,
        to: &[String],
    ) -> anyhow::Result<()>;
}

/// Fills `{{ key }}` placeholders from a JSON object, HTML-escaping each
/// value. Unknown keys render as empty strings.
pub fn render_template(template: &str, data: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        let key = after[..end].trim().trim_start_matches('.');
        let value = match data.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        out.push_str(&html_escape::encode_double_quoted_attribute(&value));
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}

/// Writes rendered messages to the log instead of delivering them.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(
        &self,
        subject: &str,
        template: &str,
        data: &Value,
        to: &[String],
    ) -> anyhow::Result<()> {
        let body = render_template(template, data);
        info!(subject, to = ?to, body = %body, "mail");
        Ok(())
    }
}

/// Delivers rendered HTML messages through an authenticated SMTP relay.
/// Port 465 uses implicit TLS, any other port STARTTLS.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(cfg: &SmtpConfig) -> anyhow::Result<Self> {
        let builder = if cfg.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)
        }
        .with_context(|| format!("smtp relay {}", cfg.host))?;

        let transport = builder
            .port(cfg.port)
            .credentials(Credentials::new(cfg.user.clone(), cfg.password.clone()))
            .build();
        let from = cfg
            .from
            .parse::<Mailbox>()
            .with_context(|| format!("invalid SMTP_FROM {:?}", cfg.from))?;
        Ok(Self { transport, from })
    }

    fn message(&self, subject: &str, body: String, to: &[String]) -> anyhow::Result<Message> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(subject)
            .header(ContentType::TEXT_HTML);
        for addr in to {
            let mailbox = addr
                .parse::<Mailbox>()
                .with_context(|| format!("invalid recipient {addr:?}"))?;
            builder = builder.to(mailbox);
        }
        builder.body(body).context("build message")
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(
        &self,
        subject: &str,
        template: &str,
        data: &Value,
        to: &[String],
    ) -> anyhow::Result<()> {
        let message = self.message(subject, render_template(template, data), to)?;
        let response = self.transport.send(message).await.context("smtp send")?;
        debug!(code = %response.code(), "smtp accepted message");
        Ok(())
    }
}
