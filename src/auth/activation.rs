//! Activation emails, sent out-of-band after registration.
//!
//! Delivery is best-effort: a lookup or send failure is logged and dropped,
//! never reported back to the registering caller.

use std::sync::Arc;

use serde_json::json;
use tokio::{sync::mpsc, task::JoinHandle, task::JoinSet};
use tracing::{debug, error, info, warn};

use crate::{auth::repo::UserReadRepository, mailer::Mailer};

pub const ACTIVATION_SUBJECT: &str = "Activate your email!";

const ACTIVATION_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
	<head>
		<meta charset="UTF-8">
		<title>Activate for email</title>
	</head>
	<body>
		<a href="{{ link }}">Click here to activate your email</a>
	</body>
</html>"#;

/// Hands an activation job to whatever runs it. Must not block.
pub trait ActivationScheduler: Send + Sync {
    fn schedule(&self, user_id: i64);
}

pub struct ActivationNotifier {
    users: Arc<dyn UserReadRepository>,
    mailer: Arc<dyn Mailer>,
    activate_url: String,
}

impl ActivationNotifier {
    pub fn new(
        users: Arc<dyn UserReadRepository>,
        mailer: Arc<dyn Mailer>,
        activate_url: impl Into<String>,
    ) -> Self {
        Self {
            users,
            mailer,
            activate_url: activate_url.into(),
        }
    }

    pub fn activation_link(&self, key: &str) -> String {
        format!("{}/{}", self.activate_url.trim_end_matches('/'), key)
    }

    pub async fn notify(&self, user_id: i64) {
        let user = match self.users.find_by_id(user_id).await {
            Ok(Some(u)) => u,
            Ok(None) => {
                warn!(user_id, "activation: user not found");
                return;
            }
            Err(e) => {
                warn!(user_id, error = %e, "activation: user lookup failed");
                return;
            }
        };
        let Some(key) = user.activation_key.as_deref() else {
            debug!(user_id, "activation: user has no activation key");
            return;
        };

        let data = json!({ "link": self.activation_link(key) });
        match self
            .mailer
            .send(ACTIVATION_SUBJECT, ACTIVATION_TEMPLATE, &data, &[user.email.clone()])
            .await
        {
            Ok(()) => info!(user_id, email = %user.email, "activation email sent"),
            Err(e) => error!(user_id, error = %e, "activation email failed"),
        }
    }
}

/// Sending half of the activation worker. Cheap to clone.
#[derive(Clone)]
pub struct ActivationQueue {
    tx: mpsc::UnboundedSender<i64>,
}

impl ActivationScheduler for ActivationQueue {
    fn schedule(&self, user_id: i64) {
        if self.tx.send(user_id).is_err() {
            warn!(user_id, "activation worker stopped; job dropped");
        }
    }
}

/// Background task that runs activation jobs, each in its own task.
pub struct ActivationWorker {
    handle: JoinHandle<()>,
}

impl ActivationWorker {
    /// Starts the worker on the current tokio runtime. It runs until every
    /// [`ActivationQueue`] clone is dropped.
    pub fn spawn(notifier: ActivationNotifier) -> (ActivationQueue, Self) {
        let (tx, mut rx) = mpsc::unbounded_channel::<i64>();
        let notifier = Arc::new(notifier);
        let handle = tokio::spawn(async move {
            let mut jobs = JoinSet::new();
            loop {
                tokio::select! {
                    next = rx.recv() => match next {
                        Some(user_id) => {
                            let notifier = notifier.clone();
                            jobs.spawn(async move { notifier.notify(user_id).await });
                        }
                        None => break,
                    },
                    Some(done) = jobs.join_next(), if !jobs.is_empty() => {
                        if let Err(e) = done {
                            error!(error = %e, "activation job panicked");
                        }
                    }
                }
            }
            while let Some(done) = jobs.join_next().await {
                if let Err(e) = done {
                    error!(error = %e, "activation job panicked");
                }
            }
            debug!("activation worker stopped");
        });
        (ActivationQueue { tx }, Self { handle })
    }

    /// Waits for the worker to drain. Returns once all queues are dropped
    /// and in-flight jobs have finished.
    pub async fn shutdown(self) {
        if let Err(e) = self.handle.await {
            error!(error = %e, "activation worker join failed");
        }
    }
}
