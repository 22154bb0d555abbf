//! Drives a task's steps against its session.
//!
//! One call claims the session, resolves which steps to run, runs them in
//! order and stops as soon as the caller has to act. Completion and every
//! failure tear the session down before the response is built.

#[cfg(test)]
mod tests;

use crate::challenge::{ChallengeArtifact, ChallengeStore, select_strategy};
use crate::config::{OrchestratorConfig, Tier};
use crate::error::{OrchestratorError, Result};
use crate::fields::FieldSet;
use crate::portals::{PortalPage, StepContext, StepEffect, run_step};
use crate::protocol::{ProtocolRegistry, Resolution, TaskProtocol, resolve_step};
use crate::response::{StepOutcome, StepResponse, translate};
use crate::session::{Session, SessionState, SessionStore};
use crate::sweeper::spawn_sweeper;
use crate::task::TaskType;
use portalflow_browser::CaptureRegion;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::MutexGuard;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One call from the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRequest {
    pub task: TaskType,
    pub session_id: Option<String>,
    /// Explicit step tag; inferred from the fields when absent.
    pub step: Option<String>,
    pub fields: FieldSet,
}

impl TaskRequest {
    pub fn new(task: TaskType) -> Self {
        Self {
            task,
            session_id: None,
            step: None,
            fields: FieldSet::new(),
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }

    pub fn with_field(mut self, name: &str, value: &str) -> Self {
        self.fields.insert(name, value);
        self
    }

    /// Parses `{ taskType?, sessionId?, step?, ...fields }`.
    ///
    /// A task type from the route wins; a body naming a different one is
    /// rejected.
    pub fn from_json(route_task: Option<TaskType>, body: Value) -> Result<Self> {
        let Value::Object(object) = body else {
            return Err(OrchestratorError::InputInvalid(
                "Request body must be a JSON object".to_string(),
            ));
        };

        let body_task = text_field(&object, "taskType")?
            .map(|name| name.parse::<TaskType>())
            .transpose()?;
        let task = match (route_task, body_task) {
            (Some(route), Some(body)) if route != body => {
                return Err(OrchestratorError::InputInvalid(format!(
                    "taskType '{}' does not match endpoint task '{}'",
                    body, route
                )));
            }
            (Some(task), _) | (None, Some(task)) => task,
            (None, None) => {
                return Err(OrchestratorError::InputInvalid(
                    "taskType is required".to_string(),
                ));
            }
        };

        Ok(Self {
            task,
            session_id: text_field(&object, "sessionId")?,
            step: text_field(&object, "step")?,
            fields: FieldSet::from_json(&object)?,
        })
    }
}

fn text_field(object: &Map<String, Value>, name: &str) -> Result<Option<String>> {
    match object.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => {
            let text = text.trim();
            Ok((!text.is_empty()).then(|| text.to_string()))
        }
        Some(_) => Err(OrchestratorError::InputInvalid(format!(
            "{} must be a string",
            name
        ))),
    }
}

pub struct Orchestrator {
    sessions: Arc<dyn SessionStore>,
    challenges: Arc<ChallengeStore>,
    protocols: ProtocolRegistry,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        challenges: Arc<ChallengeStore>,
        config: OrchestratorConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            sessions,
            challenges,
            protocols: ProtocolRegistry::builtin(),
            config,
        })
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    pub fn challenges(&self) -> &Arc<ChallengeStore> {
        &self.challenges
    }

    pub fn protocols(&self) -> &ProtocolRegistry {
        &self.protocols
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Starts the background TTL sweep with the configured interval.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        spawn_sweeper(
            self.sessions.clone(),
            self.challenges.clone(),
            self.config.sweep_interval,
            self.config.session_ttl,
        )
    }

    pub async fn execute(&self, request: TaskRequest) -> StepResponse {
        let task = request.task;
        let outcome = self.run(request).await;
        if let StepOutcome::Failed { error, .. } = &outcome {
            warn!(task = %task, kind = ?error.kind(), error = %error, "Task step failed");
        }
        translate(outcome, &self.challenges)
    }

    /// Drops a session on the caller's request. Returns whether it existed.
    pub async fn abandon(&self, session_id: &str) -> bool {
        self.challenges.discard(session_id);
        let removed = self.sessions.remove(session_id).await;
        if removed {
            info!(session_id, "Session abandoned");
        }
        removed
    }

    pub async fn run(&self, request: TaskRequest) -> StepOutcome {
        let protocol = self.protocols.get(request.task);

        let session = match &request.session_id {
            Some(id) => match self.sessions.get(id).await {
                Ok(session) => session,
                Err(err) => return StepOutcome::failed(err),
            },
            None => {
                // Bad input must not cost a browser.
                if let Err(err) =
                    resolve_step(protocol, None, &request.fields, request.step.as_deref())
                {
                    return StepOutcome::failed(err);
                }
                match self.sessions.create(request.task).await {
                    Ok(session) => session,
                    Err(err) => return StepOutcome::failed(err),
                }
            }
        };

        let mut state = match session.try_claim() {
            Ok(state) => state,
            Err(err) => return StepOutcome::failed(err),
        };
        // Lost a race against teardown.
        if state.page.is_closed() {
            return StepOutcome::failed(OrchestratorError::SessionExpiredOrNotFound(
                session.id.clone(),
            ));
        }
        session.touch();

        match self.drive(&session, &mut state, protocol, &request).await {
            Ok(outcome) => {
                if matches!(outcome, StepOutcome::Completed { .. }) {
                    info!(session_id = %session.id, task = %session.task, "Task completed");
                    self.teardown(&session, state).await;
                } else {
                    // Idle time counts from the end of the call.
                    session.touch();
                }
                outcome
            }
            Err(error) => {
                let diagnostic = self.diagnostic(&mut state).await;
                self.teardown(&session, state).await;
                StepOutcome::Failed { error, diagnostic }
            }
        }
    }

    async fn drive(
        &self,
        session: &Session,
        state: &mut SessionState,
        protocol: &TaskProtocol,
        request: &TaskRequest,
    ) -> Result<StepOutcome> {
        if session.task != request.task {
            return Err(OrchestratorError::InputInvalid(format!(
                "Session {} belongs to task '{}', not '{}'",
                session.id, session.task, request.task
            )));
        }

        let candidate = state.fields.overlay(&request.fields);
        let Resolution { next, target } = resolve_step(
            protocol,
            state.current_step(),
            &candidate,
            request.step.as_deref(),
        )?;
        state
            .fields
            .merge(&request.fields, &protocol.overwritable_between(next, target))?;
        debug!(session_id = %session.id, next, target, "Resolved steps");

        for (index, step) in protocol.steps.iter().enumerate().take(target + 1).skip(next) {
            info!(session_id = %session.id, task = %session.task, step = step.tag, "Running step");
            let effect = {
                let state = &mut *state;
                let mut ctx = StepContext {
                    step,
                    page: PortalPage::new(&mut *state.page, &self.config.timeouts),
                    fields: &state.fields,
                    urls: &self.config.portals,
                    strategy: select_strategy(&self.config.challenge, step.validation_global),
                };
                run_step(&mut ctx).await?
            };
            state.advance_to(index, step.tag);

            let produced_challenge = match effect {
                StepEffect::Completed(data) => {
                    return Ok(StepOutcome::Completed {
                        reached: step.reached,
                        data,
                        message: protocol.completion_message.to_string(),
                    });
                }
                StepEffect::Advanced { challenge: None } => false,
                StepEffect::Advanced {
                    challenge: Some(image),
                } => {
                    self.challenges
                        .put(ChallengeArtifact::png(&session.id, image, step.tag));
                    true
                }
            };

            let Some(following) = protocol.step(index + 1) else {
                return Ok(StepOutcome::Completed {
                    reached: step.reached,
                    data: Value::Null,
                    message: protocol.completion_message.to_string(),
                });
            };
            if step.pauses || produced_challenge || index == target {
                return Ok(StepOutcome::AwaitingInput {
                    session_id: session.id.clone(),
                    reached: step.reached,
                    required_fields: following.missing(state.fields.as_set()),
                    message: step.prompt.to_string(),
                });
            }
        }

        Err(OrchestratorError::InputInvalid(format!(
            "Task '{}' has no steps left to run",
            protocol.task
        )))
    }

    /// Full-page screenshot of wherever the page got stuck.
    async fn diagnostic(&self, state: &mut SessionState) -> Option<Vec<u8>> {
        if state.page.is_closed() {
            return None;
        }
        match state
            .page
            .screenshot(CaptureRegion::FullPage, self.config.timeouts.get(Tier::Quick))
            .await
        {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                debug!(error = %err, "Diagnostic screenshot unavailable");
                None
            }
        }
    }

    /// Closes the page while still holding the claim, then unregisters.
    async fn teardown(&self, session: &Session, mut state: MutexGuard<'_, SessionState>) {
        if let Err(err) = state.page.close().await {
            warn!(session_id = %session.id, error = %err, "Failed to close browser page");
        }
        self.challenges.discard(&session.id);
        drop(state);
        self.sessions.remove(&session.id).await;
    }
}
