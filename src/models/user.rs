use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Role;
use crate::repository::Entity;

/// A user account as stored in the `users` collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    /// bcrypt hash
    pub password: String,
    pub role: Role,
    #[serde(default)]
    pub department: Option<String>,
    /// `_id` of the team the user belongs to
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub is_logged_in: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for User {
    const COLLECTION: &'static str = "users";

    fn id(&self) -> &str {
        &self.id
    }
}

/// What clients get to see of a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub department: Option<String>,
    pub team: Option<String>,
    pub is_logged_in: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        PublicUser {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
            department: user.department,
            team: user.team,
            is_logged_in: user.is_logged_in,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub department: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<Role>,
    pub department: Option<String>,
}
