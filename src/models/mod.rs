pub mod department;
pub mod issue;
pub mod team;
pub mod user;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

/// Roles a caller can hold. Stored and sent as snake_case strings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[serde(alias = "Admin")]
    Admin,
    #[serde(alias = "Department")]
    Department,
    #[serde(alias = "TeamLeader", alias = "team-leader")]
    TeamLeader,
    #[serde(alias = "Employee")]
    Employee,
    #[serde(alias = "Operator")]
    Operator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Department => "department",
            Role::TeamLeader => "team_leader",
            Role::Employee => "employee",
            Role::Operator => "operator",
        }
    }

    /// Roles that work issues raised by operators.
    pub const STAFF: &'static [Role] = &[
        Role::Admin,
        Role::Department,
        Role::TeamLeader,
        Role::Employee,
    ];

    /// Roles that coordinate staff.
    pub const SUPERVISORS: &'static [Role] = &[Role::Admin, Role::Department, Role::TeamLeader];
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex is valid"));

pub fn validate_email(email: &str) -> Result<(), ApiError> {
    if EMAIL.is_match(email) {
        Ok(())
    } else {
        Err(ApiError::bad_request(format!("Invalid email address: {}", email)))
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn require_non_empty(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        Err(ApiError::bad_request(format!("{} must not be empty", field)))
    } else {
        Ok(())
    }
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn now() -> DateTime<Utc> {
    Utc::now()
}
