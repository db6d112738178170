use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::RegistrationError;

/// Authenticated identity attached to every mutating request. Session
/// handling lives outside the engine; this is the opaque result of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub staff_id: String,
    pub role: StaffRole,
}

impl Caller {
    pub fn new(staff_id: impl Into<String>, role: StaffRole) -> Self {
        Self {
            staff_id: staff_id.into(),
            role,
        }
    }
}

/// Role ladder, least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaffRole {
    Applicant,
    Clerk,
    Officer,
    Supervisor,
}

impl StaffRole {
    pub const fn label(self) -> &'static str {
        match self {
            StaffRole::Applicant => "applicant",
            StaffRole::Clerk => "clerk",
            StaffRole::Officer => "officer",
            StaffRole::Supervisor => "supervisor",
        }
    }

    pub fn from_label(value: &str) -> Option<Self> {
        match value {
            "applicant" => Some(StaffRole::Applicant),
            "clerk" => Some(StaffRole::Clerk),
            "officer" => Some(StaffRole::Officer),
            "supervisor" => Some(StaffRole::Supervisor),
            _ => None,
        }
    }
}

impl fmt::Display for StaffRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Operation families the engine checks before mutating anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    SubmitApplication,
    AddNotes,
    ManageAppointments,
    CaptureBiometrics,
    VerifyBiometrics,
    ReviewApplications,
    ManageCredentials,
}

impl Permission {
    pub const fn label(self) -> &'static str {
        match self {
            Permission::SubmitApplication => "submit_application",
            Permission::AddNotes => "add_notes",
            Permission::ManageAppointments => "manage_appointments",
            Permission::CaptureBiometrics => "capture_biometrics",
            Permission::VerifyBiometrics => "verify_biometrics",
            Permission::ReviewApplications => "review_applications",
            Permission::ManageCredentials => "manage_credentials",
        }
    }

    /// Minimum role on the ladder that may exercise this permission.
    pub const fn required_role(self) -> StaffRole {
        match self {
            Permission::SubmitApplication => StaffRole::Applicant,
            Permission::AddNotes | Permission::ManageAppointments | Permission::CaptureBiometrics => {
                StaffRole::Clerk
            }
            Permission::VerifyBiometrics | Permission::ReviewApplications => StaffRole::Officer,
            Permission::ManageCredentials => StaffRole::Supervisor,
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// External authorization collaborator. The engine's contract is only that a
/// caller without the required permission is refused.
pub trait AccessPolicy: Send + Sync {
    fn authorize(&self, caller: &Caller, permission: Permission) -> Result<(), RegistrationError>;
}

/// Default policy: a role may do anything its rung or a lower rung requires.
#[derive(Debug, Default, Clone, Copy)]
pub struct RoleLadderPolicy;

impl AccessPolicy for RoleLadderPolicy {
    fn authorize(&self, caller: &Caller, permission: Permission) -> Result<(), RegistrationError> {
        if caller.role >= permission.required_role() {
            Ok(())
        } else {
            Err(RegistrationError::Authorization {
                staff_id: caller.staff_id.clone(),
                role: caller.role,
                permission,
            })
        }
    }
}
