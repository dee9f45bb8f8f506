use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Notify;

use super::oauth2::{OAuth2Identity, OAuth2Provider};
use crate::mailer::Mailer;

#[derive(Debug, Clone)]
pub struct SentMail {
    pub subject: String,
    pub template: String,
    pub data: Value,
    pub to: Vec<String>,
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
    attempts: AtomicUsize,
    fail: bool,
    notify: Notify,
}

impl RecordingMailer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Waits until at least `n` messages were recorded.
    pub async fn wait_for(&self, n: usize) -> Vec<SentMail> {
        let wait = async {
            loop {
                let notified = self.notify.notified();
                if self.sent.lock().unwrap().len() >= n {
                    return self.sent();
                }
                notified.await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), wait)
            .await
            .expect("mail not sent in time")
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(
        &self,
        subject: &str,
        template: &str,
        data: &Value,
        to: &[String],
    ) -> anyhow::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("smtp unavailable");
        }
        self.sent.lock().unwrap().push(SentMail {
            subject: subject.to_string(),
            template: template.to_string(),
            data: data.clone(),
            to: to.to_vec(),
        });
        self.notify.notify_waiters();
        Ok(())
    }
}

/// Provider answering from a fixed code → identity table.
pub struct ScriptedProvider {
    name: String,
    users: HashMap<String, OAuth2Identity>,
}

impl ScriptedProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            users: HashMap::new(),
        }
    }

    pub fn with_code(mut self, code: &str, email: &str, full_name: &str) -> Self {
        self.users.insert(
            code.to_string(),
            OAuth2Identity {
                email: email.to_string(),
                full_name: full_name.to_string(),
                provider: self.name.clone(),
            },
        );
        self
    }
}

#[async_trait]
impl OAuth2Provider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn authorize_url(&self, state: &str) -> String {
        format!("https://{}.test/authorize?state={}", self.name, state)
    }

    async fn get_user(&self, code: &str) -> anyhow::Result<OAuth2Identity> {
        self.users
            .get(code)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("invalid code"))
    }
}
