use crate::error::OrchestratorError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// External portal a task runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Portal {
    Vahan,
    Passport,
    Eid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Search,
    Register,
    Transfer,
    Update,
    PassportFresh,
    EidRegister,
    EidSearch,
    EidUpdate,
}

impl TaskType {
    pub const ALL: [TaskType; 8] = [
        TaskType::Search,
        TaskType::Register,
        TaskType::Transfer,
        TaskType::Update,
        TaskType::PassportFresh,
        TaskType::EidRegister,
        TaskType::EidSearch,
        TaskType::EidUpdate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Search => "search",
            TaskType::Register => "register",
            TaskType::Transfer => "transfer",
            TaskType::Update => "update",
            TaskType::PassportFresh => "passport_fresh",
            TaskType::EidRegister => "eid_register",
            TaskType::EidSearch => "eid_search",
            TaskType::EidUpdate => "eid_update",
        }
    }

    pub fn portal(&self) -> Portal {
        match self {
            TaskType::Search | TaskType::Register | TaskType::Transfer | TaskType::Update => {
                Portal::Vahan
            }
            TaskType::PassportFresh => Portal::Passport,
            TaskType::EidRegister | TaskType::EidSearch | TaskType::EidUpdate => Portal::Eid,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            TaskType::Search => "Look up vehicle details by registration number",
            TaskType::Register => "Register a new vehicle",
            TaskType::Transfer => "Transfer vehicle ownership",
            TaskType::Update => "Update vehicle owner contact details",
            TaskType::PassportFresh => "Apply for a fresh passport",
            TaskType::EidRegister => "Register a new E-ID",
            TaskType::EidSearch => "Search an existing E-ID",
            TaskType::EidUpdate => "Update E-ID holder details",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = OrchestratorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        TaskType::ALL
            .into_iter()
            .find(|task| task.as_str() == value)
            .ok_or_else(|| OrchestratorError::InputInvalid(format!("Invalid task type: {}", value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_serde_and_from_str() {
        for task in TaskType::ALL {
            let json = serde_json::to_value(task).unwrap();
            assert_eq!(json, serde_json::Value::String(task.as_str().to_string()));
            assert_eq!(task.as_str().parse::<TaskType>().unwrap(), task);
        }
    }

    #[test]
    fn unknown_task_is_input_invalid() {
        let err = "renew_licence".parse::<TaskType>().unwrap_err();
        assert!(matches!(err, OrchestratorError::InputInvalid(_)));
    }
}
