//! Stateful orchestration of multi-step portal tasks.
//!
//! A task (vehicle search, passport application, E-ID update, ...) spans
//! several caller round trips. Between them the task lives in a session that
//! owns one browser page, the fields gathered so far and the position in the
//! task's step protocol.

pub mod challenge;
pub mod config;
pub mod error;
pub mod fields;
pub mod intent;
pub mod orchestrator;
pub mod portals;
pub mod protocol;
pub mod response;
pub mod session;
pub mod sweeper;
pub mod task;

#[cfg(any(test, feature = "test-utils"))]
pub mod testkit;

pub use challenge::{ChallengeArtifact, ChallengeStore, ChallengeStrategy};
pub use config::{ChallengePolicy, OrchestratorConfig, PortalUrls, Tier, Timeouts};
pub use error::{ErrorKind, OrchestratorError, Result};
pub use fields::{AccumulatedFields, FieldSet};
pub use intent::{GeminiClassifier, Intent, IntentClassifier, IntentError, UnconfiguredClassifier};
pub use orchestrator::{Orchestrator, TaskRequest};
pub use protocol::{ProtocolRegistry, StepDefinition, StepId, TaskProtocol};
pub use response::{StepOutcome, StepResponse};
pub use session::{InMemorySessionStore, Session, SessionStore};
pub use task::{Portal, TaskType};
