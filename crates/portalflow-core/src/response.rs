//! Caller-facing shape of every step result.

use crate::challenge::{ChallengeStore, data_uri};
use crate::error::{ErrorKind, OrchestratorError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a call ended, before translation.
#[derive(Debug)]
pub enum StepOutcome {
    /// The session survives and waits for the caller.
    AwaitingInput {
        session_id: String,
        reached: &'static str,
        required_fields: Vec<String>,
        message: String,
    },
    /// The task finished; the session is already gone.
    Completed {
        reached: &'static str,
        data: Value,
        message: String,
    },
    /// The call failed; any session it touched is already gone.
    Failed {
        error: OrchestratorError,
        diagnostic: Option<Vec<u8>>,
    },
}

impl StepOutcome {
    pub fn failed(error: OrchestratorError) -> Self {
        StepOutcome::Failed {
            error,
            diagnostic: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepResponse {
    pub success: bool,
    pub step: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_fields: Option<Vec<String>>,
    /// `data:image/png;base64,...`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic_image: Option<String>,
}

impl StepResponse {
    pub fn status_code(&self) -> u16 {
        self.error_kind.map_or(200, |kind| kind.http_status())
    }
}

/// Builds the response for `outcome`, handing over any pending challenge.
pub fn translate(outcome: StepOutcome, challenges: &ChallengeStore) -> StepResponse {
    match outcome {
        StepOutcome::AwaitingInput {
            session_id,
            reached,
            required_fields,
            message,
        } => {
            let challenge_image = challenges
                .take(&session_id)
                .map(|artifact| artifact.to_data_uri());
            StepResponse {
                success: true,
                step: reached.to_string(),
                session_id: Some(session_id),
                required_fields: (!required_fields.is_empty()).then_some(required_fields),
                challenge_image,
                data: None,
                message,
                error_kind: None,
                diagnostic_image: None,
            }
        }
        StepOutcome::Completed {
            reached,
            data,
            message,
        } => StepResponse {
            success: true,
            step: reached.to_string(),
            session_id: None,
            required_fields: None,
            challenge_image: None,
            data: (!data.is_null()).then_some(data),
            message,
            error_kind: None,
            diagnostic_image: None,
        },
        StepOutcome::Failed { error, diagnostic } => failure(&error, diagnostic),
    }
}

fn failure(error: &OrchestratorError, diagnostic: Option<Vec<u8>>) -> StepResponse {
    StepResponse {
        success: false,
        step: "failed".to_string(),
        session_id: None,
        required_fields: None,
        challenge_image: None,
        data: None,
        message: error.to_string(),
        error_kind: Some(error.kind()),
        diagnostic_image: diagnostic.map(|bytes| data_uri("image/png", &bytes)),
    }
}

/// For requests rejected before any session was touched.
impl From<OrchestratorError> for StepResponse {
    fn from(error: OrchestratorError) -> Self {
        failure(&error, None)
    }
}
