//! Action dispatch. Forwards a fired task's target to the right collaborator.
//! Supports: agent runs, workflow runs, email, file operations, custom actions.
//!
//! The dispatcher holds no business logic: it shapes the call, bounds it with a
//! timeout, and turns collaborator failures into [`DispatchError`]s.

use std::sync::Arc;
use std::time::Duration;

use agentdesk_core::DispatchError;
use async_trait::async_trait;

use crate::tasks::Action;

/// Runs a named agent and returns its output.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run(&self, agent_name: &str) -> Result<String, String>;
}

/// Runs a named workflow and returns its output.
#[async_trait]
pub trait WorkflowRunner: Send + Sync {
    async fn run(&self, workflow_name: &str) -> Result<String, String>;
}

/// Sends mail through the owner's SMTP settings.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(
        &self,
        user_id: Option<&str>,
        recipients: &[String],
        subject: &str,
    ) -> Result<bool, String>;
}

#[async_trait]
pub trait FileOperator: Send + Sync {
    async fn apply(&self, operation: &str, path: &str) -> Result<bool, String>;
}

#[async_trait]
pub trait CustomActionRunner: Send + Sync {
    async fn run(&self, action: &str) -> Result<bool, String>;
}

/// The set of downstream collaborators a dispatcher forwards to.
#[derive(Clone)]
pub struct Collaborators {
    pub agents: Arc<dyn AgentRunner>,
    pub workflows: Arc<dyn WorkflowRunner>,
    pub email: Arc<dyn EmailSender>,
    pub files: Arc<dyn FileOperator>,
    pub custom: Arc<dyn CustomActionRunner>,
}

impl Collaborators {
    /// Every collaborator logs and succeeds after `delay`.
    pub fn simulated(delay: Duration) -> Self {
        let sim = Arc::new(SimulatedCollaborator { delay });
        Self {
            agents: sim.clone(),
            workflows: sim.clone(),
            email: sim.clone(),
            files: sim.clone(),
            custom: sim,
        }
    }

    /// Replace the custom-action runner.
    pub fn with_custom(mut self, custom: Arc<dyn CustomActionRunner>) -> Self {
        self.custom = custom;
        self
    }
}

/// Dispatches actions with a per-call timeout.
#[derive(Clone)]
pub struct ActionDispatcher {
    collaborators: Collaborators,
    timeout: Duration,
}

impl ActionDispatcher {
    pub fn new(collaborators: Collaborators, timeout: Duration) -> Self {
        Self { collaborators, timeout }
    }

    /// Forward `action` to its collaborator. Returns the collaborator's output text.
    pub async fn dispatch(&self, action: &Action) -> Result<String, DispatchError> {
        let label = action.action_type().to_string();
        match tokio::time::timeout(self.timeout, self.forward(action, &label)).await {
            Ok(result) => result,
            Err(_) => Err(DispatchError::TimedOut {
                action: label,
                secs: self.timeout.as_secs(),
            }),
        }
    }

    async fn forward(&self, action: &Action, label: &str) -> Result<String, DispatchError> {
        let c = &self.collaborators;
        match action {
            Action::AgentExecution { agent_name } => {
                c.agents.run(agent_name).await.map_err(|e| failed(label, e))
            }
            Action::WorkflowExecution { workflow_name } => {
                c.workflows.run(workflow_name).await.map_err(|e| failed(label, e))
            }
            Action::EmailSend { recipients, subject, user_id } => {
                let ok = c
                    .email
                    .send(user_id.as_deref(), recipients, subject)
                    .await
                    .map_err(|e| failed(label, e))?;
                accepted(label, ok, format!("Email sent to {} recipient(s)", recipients.len()))
            }
            Action::FileOperation { operation, file_path } => {
                let ok = c.files.apply(operation, file_path).await.map_err(|e| failed(label, e))?;
                accepted(label, ok, format!("{operation} applied to {file_path}"))
            }
            Action::CustomAction { action } => {
                let ok = c.custom.run(action).await.map_err(|e| failed(label, e))?;
                accepted(label, ok, format!("Custom action '{action}' done"))
            }
        }
    }
}

fn failed(label: &str, message: String) -> DispatchError {
    DispatchError::Failed {
        action: label.to_string(),
        message,
    }
}

fn accepted(label: &str, ok: bool, output: String) -> Result<String, DispatchError> {
    if ok {
        Ok(output)
    } else {
        Err(DispatchError::Rejected {
            action: label.to_string(),
        })
    }
}

/// Stand-in for every collaborator: log, wait, succeed.
#[derive(Debug, Clone, Default)]
pub struct SimulatedCollaborator {
    pub delay: Duration,
}

impl SimulatedCollaborator {
    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl AgentRunner for SimulatedCollaborator {
    async fn run(&self, agent_name: &str) -> Result<String, String> {
        tracing::info!("🤖 Running agent '{}'", agent_name);
        self.pause().await;
        Ok(format!("Agent '{agent_name}' executed"))
    }
}

#[async_trait]
impl WorkflowRunner for SimulatedCollaborator {
    async fn run(&self, workflow_name: &str) -> Result<String, String> {
        tracing::info!("🔄 Running workflow '{}'", workflow_name);
        self.pause().await;
        Ok(format!("Workflow '{workflow_name}' executed"))
    }
}

#[async_trait]
impl EmailSender for SimulatedCollaborator {
    async fn send(
        &self,
        user_id: Option<&str>,
        recipients: &[String],
        subject: &str,
    ) -> Result<bool, String> {
        tracing::info!(
            "📧 Sending '{}' to {} recipient(s) (user: {})",
            subject,
            recipients.len(),
            user_id.unwrap_or("-")
        );
        self.pause().await;
        Ok(true)
    }
}

#[async_trait]
impl FileOperator for SimulatedCollaborator {
    async fn apply(&self, operation: &str, path: &str) -> Result<bool, String> {
        tracing::info!("📁 File operation '{}' on '{}'", operation, path);
        self.pause().await;
        Ok(true)
    }
}

#[async_trait]
impl CustomActionRunner for SimulatedCollaborator {
    async fn run(&self, action: &str) -> Result<bool, String> {
        tracing::info!("⚙️ Custom action: {}", action);
        self.pause().await;
        Ok(true)
    }
}

/// Custom actions given as `http(s)://` URLs are POSTed; anything else fails.
pub struct WebhookActionRunner {
    client: reqwest::Client,
    timeout: Duration,
}

impl WebhookActionRunner {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl CustomActionRunner for WebhookActionRunner {
    async fn run(&self, action: &str) -> Result<bool, String> {
        if !(action.starts_with("http://") || action.starts_with("https://")) {
            return Err(format!("Not a webhook URL: {action}"));
        }
        tracing::info!("🌐 Firing webhook: {}", action);
        let resp = self
            .client
            .post(action)
            .json(&serde_json::json!({
                "source": "agentdesk-scheduler",
                "fired_at": chrono::Local::now().to_rfc3339(),
            }))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| format!("Webhook send failed: {e}"))?;

        if resp.status().is_success() {
            Ok(true)
        } else {
            tracing::warn!("⚠️ Webhook {} answered {}", action, resp.status());
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Refusing;

    #[async_trait]
    impl EmailSender for Refusing {
        async fn send(&self, _: Option<&str>, _: &[String], _: &str) -> Result<bool, String> {
            Ok(false)
        }
    }

    struct Broken;

    #[async_trait]
    impl AgentRunner for Broken {
        async fn run(&self, agent_name: &str) -> Result<String, String> {
            Err(format!("provider unreachable for {agent_name}"))
        }
    }

    struct Hanging;

    #[async_trait]
    impl WorkflowRunner for Hanging {
        async fn run(&self, _: &str) -> Result<String, String> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(String::new())
        }
    }

    fn dispatcher(collaborators: Collaborators) -> ActionDispatcher {
        ActionDispatcher::new(collaborators, Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_simulated_success() {
        let d = dispatcher(Collaborators::simulated(Duration::ZERO));
        let out = d
            .dispatch(&Action::AgentExecution { agent_name: "summarizer".into() })
            .await
            .unwrap();
        assert!(out.contains("summarizer"));
        let out = d
            .dispatch(&Action::EmailSend {
                recipients: vec!["a@example.com".into(), "b@example.com".into()],
                subject: "Weekly".into(),
                user_id: Some("u1".into()),
            })
            .await
            .unwrap();
        assert!(out.contains("2 recipient"));
    }

    #[tokio::test]
    async fn test_collaborator_error_and_rejection() {
        let mut c = Collaborators::simulated(Duration::ZERO);
        c.agents = Arc::new(Broken);
        c.email = Arc::new(Refusing);
        let d = dispatcher(c);

        let err = d
            .dispatch(&Action::AgentExecution { agent_name: "x".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Failed { ref message, .. } if message.contains("unreachable")));

        let err = d
            .dispatch(&Action::EmailSend {
                recipients: vec!["a@example.com".into()],
                subject: "s".into(),
                user_id: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err, DispatchError::Rejected { action: "email_send".into() });
    }

    #[tokio::test]
    async fn test_timeout_bounds_hung_collaborator() {
        let mut c = Collaborators::simulated(Duration::ZERO);
        c.workflows = Arc::new(Hanging);
        let err = dispatcher(c)
            .dispatch(&Action::WorkflowExecution { workflow_name: "nightly".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::TimedOut { .. }));
    }

    #[tokio::test]
    async fn test_webhook_runner_rejects_non_url() {
        let runner = WebhookActionRunner::new(Duration::from_secs(1));
        assert!(runner.run("reindex-search").await.is_err());
    }
}
