use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Role;
use crate::repository::Entity;

/// A department account. Departments log in with their own credentials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Department {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub manager: String,
    #[serde(rename = "email_id")]
    pub email_id: String,
    pub password: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Department {
    const COLLECTION: &'static str = "departments";

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublicDepartment {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub manager: String,
    #[serde(rename = "email_id")]
    pub email_id: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Department> for PublicDepartment {
    fn from(department: Department) -> Self {
        PublicDepartment {
            id: department.id,
            name: department.name,
            manager: department.manager,
            email_id: department.email_id,
            role: department.role,
            created_at: department.created_at,
            updated_at: department.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateDepartmentRequest {
    pub name: String,
    pub manager: String,
    pub email_id: String,
    pub password: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateDepartmentRequest {
    pub name: Option<String>,
    pub manager: Option<String>,
    pub email_id: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DepartmentLogin {
    pub email_id: String,
    pub password: String,
}
