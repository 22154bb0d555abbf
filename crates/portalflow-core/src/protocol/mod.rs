//! Step protocols for every task type.
//!
//! A protocol is static configuration: an ordered list of [`StepDefinition`]s.
//! Which step runs next is decided by [`resolve_step`], a pure function over
//! the session position and the fields at hand.

mod resolver;

pub use resolver::{Resolution, resolve_step};

use crate::fields::FieldSet;
use crate::task::TaskType;
use serde::Serialize;
use std::collections::HashMap;

/// Every portal interaction the orchestrator knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    VahanSearchCaptcha,
    VahanSearchResult,
    VahanSendOtp,
    VahanVerifyOtp,
    VahanLocateVehicle,
    VahanConfirmVehicle,
    VahanRegisterVehicle,
    VahanTransferOwnership,
    VahanUpdateContacts,
    PassportLogin,
    PassportApplication,
    PassportSubmit,
    EidOpenRegister,
    EidRegisterForm,
    EidRegisterSubmit,
    EidOpenSearch,
    EidSearch,
    EidOpenUpdate,
    EidFindUser,
    EidEditFields,
    EidUpdateSubmit,
}

#[derive(Debug, Clone)]
pub struct StepDefinition {
    pub id: StepId,
    /// Name a caller may send as `step`.
    pub tag: &'static str,
    /// Label reported once the step succeeds.
    pub reached: &'static str,
    pub triggers: &'static [&'static str],
    /// At least one of these must be present when non-empty.
    pub any_of: &'static [&'static str],
    pub optional: &'static [&'static str],
    pub overwritable: &'static [&'static str],
    /// Always hand control back to the caller after this step.
    pub pauses: bool,
    /// Client-side global holding the expected challenge answer.
    pub validation_global: Option<&'static str>,
    pub prompt: &'static str,
}

impl StepDefinition {
    fn new(id: StepId, tag: &'static str, reached: &'static str) -> Self {
        Self {
            id,
            tag,
            reached,
            triggers: &[],
            any_of: &[],
            optional: &[],
            overwritable: &[],
            pauses: false,
            validation_global: None,
            prompt: "",
        }
    }

    fn triggers(mut self, fields: &'static [&'static str]) -> Self {
        self.triggers = fields;
        self
    }

    fn any_of(mut self, fields: &'static [&'static str]) -> Self {
        self.any_of = fields;
        self
    }

    fn optional(mut self, fields: &'static [&'static str]) -> Self {
        self.optional = fields;
        self
    }

    fn overwritable(mut self, fields: &'static [&'static str]) -> Self {
        self.overwritable = fields;
        self
    }

    fn pausing(mut self) -> Self {
        self.pauses = true;
        self
    }

    fn validated_by(mut self, global: &'static str) -> Self {
        self.validation_global = Some(global);
        self
    }

    fn prompt(mut self, prompt: &'static str) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn is_satisfied(&self, fields: &FieldSet) -> bool {
        self.missing(fields).is_empty()
    }

    /// Fields the caller still has to send before this step can run.
    pub fn missing(&self, fields: &FieldSet) -> Vec<String> {
        let mut missing: Vec<String> = self
            .triggers
            .iter()
            .filter(|name| !fields.contains(name))
            .map(|name| name.to_string())
            .collect();

        if !self.any_of.is_empty() && !self.any_of.iter().any(|name| fields.contains(name)) {
            missing.extend(self.any_of.iter().map(|name| name.to_string()));
        }
        missing
    }
}

#[derive(Debug, Clone)]
pub struct TaskProtocol {
    pub task: TaskType,
    pub steps: Vec<StepDefinition>,
    pub completion_message: &'static str,
}

impl TaskProtocol {
    pub fn position(&self, tag: &str) -> Option<usize> {
        self.steps.iter().position(|step| step.tag == tag)
    }

    pub fn step(&self, index: usize) -> Option<&StepDefinition> {
        self.steps.get(index)
    }

    /// Overwritable fields declared by steps `from..=to`.
    pub fn overwritable_between(&self, from: usize, to: usize) -> Vec<&'static str> {
        self.steps
            .iter()
            .take(to + 1)
            .skip(from)
            .flat_map(|step| step.overwritable.iter().copied())
            .collect()
    }
}

/// All built-in task protocols.
#[derive(Debug, Clone)]
pub struct ProtocolRegistry {
    protocols: HashMap<TaskType, TaskProtocol>,
}

impl Default for ProtocolRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

const VEHICLE_SEARCH: &[&str] = &["regNo", "state"];

impl ProtocolRegistry {
    pub fn builtin() -> Self {
        let protocols = TaskType::ALL
            .into_iter()
            .map(|task| (task, build_protocol(task)))
            .collect();
        Self { protocols }
    }

    pub fn get(&self, task: TaskType) -> &TaskProtocol {
        // Every TaskType is registered by `builtin`.
        &self.protocols[&task]
    }

    pub fn tasks(&self) -> Vec<TaskType> {
        TaskType::ALL
            .into_iter()
            .filter(|task| self.protocols.contains_key(task))
            .collect()
    }
}

fn send_otp() -> StepDefinition {
    StepDefinition::new(StepId::VahanSendOtp, "send_otp", "otp_sent")
        .triggers(&["email"])
        .pausing()
        .prompt("OTP sent to your email. Please provide the OTP.")
}

fn verify_otp() -> StepDefinition {
    StepDefinition::new(StepId::VahanVerifyOtp, "verify_otp", "logged_in")
        .triggers(&["otp"])
        .prompt("Login successful.")
}

fn locate_vehicle() -> StepDefinition {
    StepDefinition::new(StepId::VahanLocateVehicle, "request_captcha", "captcha_sent")
        .triggers(VEHICLE_SEARCH)
        .prompt("Please solve the search CAPTCHA.")
}

fn confirm_vehicle() -> StepDefinition {
    StepDefinition::new(StepId::VahanConfirmVehicle, "submit_captcha", "vehicle_found")
        .triggers(&["searchCaptcha"])
        .overwritable(&["searchCaptcha"])
        .prompt("Vehicle found.")
}

fn build_protocol(task: TaskType) -> TaskProtocol {
    match task {
        TaskType::Search => TaskProtocol {
            task,
            steps: vec![
                StepDefinition::new(StepId::VahanSearchCaptcha, "request_captcha", "captcha_sent")
                    .triggers(VEHICLE_SEARCH)
                    .prompt("Please solve the CAPTCHA to continue."),
                StepDefinition::new(StepId::VahanSearchResult, "submit_captcha", "completed")
                    .triggers(&["captcha"])
                    .overwritable(&["captcha"]),
            ],
            completion_message: "Vehicle details retrieved successfully",
        },
        TaskType::Register => TaskProtocol {
            task,
            steps: vec![
                send_otp(),
                verify_otp().prompt("Login successful. Please provide the vehicle details."),
                StepDefinition::new(StepId::VahanRegisterVehicle, "submit_form", "completed")
                    .triggers(&[
                        "ownerName",
                        "fatherName",
                        "mobile",
                        "address",
                        "vehicleClass",
                        "model",
                        "fuel",
                        "rto",
                    ])
                    .optional(&["color", "price"]),
            ],
            completion_message: "Vehicle registered successfully",
        },
        TaskType::Transfer => TaskProtocol {
            task,
            steps: vec![
                send_otp(),
                verify_otp().prompt("Login successful. Please provide the vehicle to transfer."),
                locate_vehicle(),
                confirm_vehicle().prompt("Vehicle found. Please provide the new owner details."),
                StepDefinition::new(StepId::VahanTransferOwnership, "submit_form", "completed")
                    .triggers(&[
                        "newOwnerName",
                        "newOwnerFather",
                        "newOwnerMobile",
                        "newOwnerEmail",
                        "newOwnerAddress",
                    ])
                    .optional(&["saleAmount"]),
            ],
            completion_message: "Ownership transferred successfully",
        },
        TaskType::Update => TaskProtocol {
            task,
            steps: vec![
                send_otp(),
                verify_otp().prompt("Login successful. Please provide the vehicle to update."),
                locate_vehicle(),
                confirm_vehicle().prompt("Vehicle found. Please provide the new contact details."),
                StepDefinition::new(StepId::VahanUpdateContacts, "submit_form", "completed")
                    .triggers(&["newAddress", "newMobile"]),
            ],
            completion_message: "Contact details updated successfully",
        },
        TaskType::PassportFresh => TaskProtocol {
            task,
            steps: vec![
                StepDefinition::new(StepId::PassportLogin, "login", "logged_in")
                    .triggers(&["loginName", "loginEmail", "loginPassword"])
                    .prompt("Login successful. Ready for form details."),
                StepDefinition::new(StepId::PassportApplication, "fill_form", "captcha_sent")
                    .triggers(&[
                        "serviceType",
                        "bookletType",
                        "givenName",
                        "surname",
                        "gender",
                        "dob",
                        "placeOfBirth",
                        "maritalStatus",
                        "employment",
                        "fatherGivenName",
                        "motherGivenName",
                        "houseNo",
                        "city",
                        "pincode",
                        "state",
                        "mobile",
                        "emergencyName",
                        "emergencyMobile",
                    ])
                    .prompt("Form filled. Please provide the CAPTCHA."),
                StepDefinition::new(StepId::PassportSubmit, "submit_captcha", "completed")
                    .triggers(&["captcha"])
                    .overwritable(&["captcha"])
                    .validated_by("captchaCode"),
            ],
            completion_message: "Passport application submitted successfully",
        },
        TaskType::EidRegister => TaskProtocol {
            task,
            steps: vec![
                StepDefinition::new(StepId::EidOpenRegister, "open", "ready_for_form")
                    .prompt("Ready for registration form details."),
                StepDefinition::new(StepId::EidRegisterForm, "fill_form", "captcha_sent")
                    .triggers(&["name", "dob", "gender", "phone", "address"])
                    .prompt("Form filled. Please provide the CAPTCHA."),
                StepDefinition::new(StepId::EidRegisterSubmit, "submit_captcha", "completed")
                    .triggers(&["captcha"])
                    .overwritable(&["captcha"]),
            ],
            completion_message: "E-ID registered successfully",
        },
        TaskType::EidSearch => TaskProtocol {
            task,
            steps: vec![
                StepDefinition::new(StepId::EidOpenSearch, "open", "ready_for_search")
                    .prompt("Ready to search. Please provide the E-ID number."),
                StepDefinition::new(StepId::EidSearch, "search", "completed").triggers(&["eId"]),
            ],
            completion_message: "E-ID search completed successfully",
        },
        TaskType::EidUpdate => TaskProtocol {
            task,
            steps: vec![
                StepDefinition::new(StepId::EidOpenUpdate, "open", "ready_for_find")
                    .prompt("Ready to find the E-ID holder. Please provide the E-ID number."),
                StepDefinition::new(StepId::EidFindUser, "find_user", "user_found")
                    .triggers(&["eId"])
                    .prompt("User found. Ready to edit details."),
                StepDefinition::new(StepId::EidEditFields, "edit_fields", "captcha_sent")
                    .any_of(&["name", "phone", "address"])
                    .prompt("Details edited. Please provide the CAPTCHA."),
                StepDefinition::new(StepId::EidUpdateSubmit, "submit_captcha", "completed")
                    .triggers(&["captcha"])
                    .overwritable(&["captcha"]),
            ],
            completion_message: "E-ID updated successfully",
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_task_has_a_protocol_ending_in_completed() {
        let registry = ProtocolRegistry::builtin();
        assert_eq!(registry.tasks().len(), TaskType::ALL.len());

        for task in TaskType::ALL {
            let protocol = registry.get(task);
            assert_eq!(protocol.task, task);
            let last = protocol.steps.last().unwrap();
            assert_eq!(last.reached, "completed", "{task} ends with {}", last.reached);
        }
    }

    #[test]
    fn tags_are_unique_within_a_protocol() {
        let registry = ProtocolRegistry::builtin();
        for task in TaskType::ALL {
            let protocol = registry.get(task);
            for (index, step) in protocol.steps.iter().enumerate() {
                assert_eq!(protocol.position(step.tag), Some(index));
            }
        }
    }

    #[test]
    fn any_of_reports_every_alternative() {
        let registry = ProtocolRegistry::builtin();
        let edit = &registry.get(TaskType::EidUpdate).steps[2];

        assert_eq!(edit.missing(&FieldSet::new()), vec!["name", "phone", "address"]);
        assert!(edit.is_satisfied(&FieldSet::new().with("phone", "9876543210")));
    }

    #[test]
    fn only_passport_submission_declares_validation_global() {
        let registry = ProtocolRegistry::builtin();
        let declared: Vec<StepId> = TaskType::ALL
            .into_iter()
            .flat_map(|task| registry.get(task).steps.clone())
            .filter(|step| step.validation_global.is_some())
            .map(|step| step.id)
            .collect();
        assert_eq!(declared, vec![StepId::PassportSubmit]);
    }
}
