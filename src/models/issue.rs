//! Issues, their archived versions and the lifecycle table that governs
//! status changes.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{new_id, now, require_non_empty};
use crate::error::ApiError;
use crate::repository::Entity;

pub const UNASSIGNED: &str = "Unassigned";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Status {
    #[serde(alias = "open", alias = "OPEN")]
    Open,
    #[serde(alias = "acknowledged")]
    Acknowledged,
    #[serde(
        rename = "In Progress",
        alias = "in-progress",
        alias = "in_progress",
        alias = "in progress",
        alias = "InProgress"
    )]
    InProgress,
    #[serde(alias = "escalated")]
    Escalated,
    #[serde(alias = "resolved")]
    Resolved,
    #[serde(alias = "completed")]
    Completed,
}

impl Status {
    pub const ALL: [Status; 6] = [
        Status::Open,
        Status::Acknowledged,
        Status::InProgress,
        Status::Escalated,
        Status::Resolved,
        Status::Completed,
    ];

    /// The canonical value written to the store.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Open => "Open",
            Status::Acknowledged => "Acknowledged",
            Status::InProgress => "In Progress",
            Status::Escalated => "Escalated",
            Status::Resolved => "Resolved",
            Status::Completed => "Completed",
        }
    }

    /// Path segment used by the list-by-status routes.
    pub fn slug(&self) -> &'static str {
        match self {
            Status::Open => "open",
            Status::Acknowledged => "acknowledged",
            Status::InProgress => "in-progress",
            Status::Escalated => "escalated",
            Status::Resolved => "resolved",
            Status::Completed => "completed",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Status> {
        Status::ALL.into_iter().find(|s| s.slug() == slug)
    }

    pub fn allowed_targets(&self) -> &'static [Status] {
        match self {
            Status::Open => &[
                Status::Acknowledged,
                Status::InProgress,
                Status::Escalated,
                Status::Resolved,
            ],
            Status::Acknowledged => &[Status::InProgress, Status::Escalated, Status::Resolved],
            Status::InProgress => &[Status::Escalated, Status::Resolved],
            Status::Escalated => &[
                Status::Escalated,
                Status::Acknowledged,
                Status::InProgress,
                Status::Resolved,
            ],
            Status::Resolved => &[Status::Completed, Status::Open],
            Status::Completed => &[],
        }
    }

    pub fn can_transition_to(&self, target: Status) -> bool {
        self.allowed_targets().contains(&target)
    }

    pub fn transition(self, target: Status) -> Result<Status, ApiError> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(ApiError::conflict(format!(
                "Cannot move issue from {} to {}",
                self, target
            )))
        }
    }

    /// No more work is expected once an issue is resolved or completed.
    pub fn is_closed(&self) -> bool {
        matches!(self, Status::Resolved | Status::Completed)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum Priority {
    #[serde(alias = "low")]
    Low,
    #[default]
    #[serde(alias = "medium")]
    Medium,
    #[serde(alias = "high")]
    High,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::Low, Priority::Medium, Priority::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub status: Status,
    #[serde(default)]
    pub resolution: String,
    /// `_id` of the reporting user
    pub reported_by: String,
    #[serde(default)]
    pub departments: Vec<String>,
    #[serde(rename = "machine_id", default)]
    pub machine_id: String,
    /// hours
    #[serde(default)]
    pub sla: f64,
    #[serde(default)]
    pub escalation_recipient: Option<String>,
    #[serde(default)]
    pub escalation_reason: Option<String>,
    /// Display name of the assignee.
    pub name: String,
    #[serde(default)]
    pub revision: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Issue {
    const COLLECTION: &'static str = "issues";

    fn id(&self) -> &str {
        &self.id
    }
}

/// A copy of an issue taken right before a full edit overwrote it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OldIssue {
    #[serde(rename = "_id")]
    pub id: String,
    pub original_issue_id: String,
    pub revision: i64,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub status: Status,
    pub departments: Vec<String>,
    pub resolution: String,
    #[serde(rename = "machine_id")]
    pub machine_id: String,
    pub sla: f64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub archived_at: DateTime<Utc>,
    pub archived_by: String,
}

impl Entity for OldIssue {
    const COLLECTION: &'static str = "old_issues";

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportIssueRequest {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub departments: Vec<String>,
    #[serde(rename = "machine_id", default)]
    pub machine_id: String,
    #[serde(default)]
    pub sla: f64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateIssueRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub status: Option<Status>,
    pub resolution: Option<String>,
    pub departments: Option<Vec<String>>,
    #[serde(rename = "machine_id")]
    pub machine_id: Option<String>,
    pub sla: Option<f64>,
    pub name: Option<String>,
}

impl UpdateIssueRequest {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.status.is_none()
            && self.resolution.is_none()
            && self.departments.is_none()
            && self.machine_id.is_none()
            && self.sla.is_none()
            && self.name.is_none()
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalateRequest {
    pub escalation_recipient: String,
    pub escalation_reason: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: Status,
    pub resolution: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AssignRequest {
    pub name: String,
}

/// Ten years, in hours.
pub const MAX_SLA_HOURS: f64 = 87_600.0;

fn validate_sla(sla: f64) -> Result<(), ApiError> {
    if sla.is_finite() && (0.0..=MAX_SLA_HOURS).contains(&sla) {
        Ok(())
    } else {
        Err(ApiError::bad_request(format!(
            "sla must be between 0 and {} hours",
            MAX_SLA_HOURS
        )))
    }
}

impl Issue {
    /// Builds a freshly reported issue. Lifecycle fields always start from
    /// their initial values.
    pub fn report(request: ReportIssueRequest, reported_by: &str) -> Result<Issue, ApiError> {
        require_non_empty("title", &request.title)?;
        require_non_empty("description", &request.description)?;
        validate_sla(request.sla)?;

        let created_at = now();
        Ok(Issue {
            id: new_id(),
            title: request.title.trim().to_string(),
            description: request.description,
            priority: request.priority,
            status: Status::Open,
            resolution: String::new(),
            reported_by: reported_by.to_string(),
            departments: request.departments,
            machine_id: request.machine_id,
            sla: request.sla,
            escalation_recipient: None,
            escalation_reason: None,
            name: UNASSIGNED.to_string(),
            revision: 0,
            created_at,
            updated_at: created_at,
        })
    }

    pub fn snapshot(&self, archived_by: &str) -> OldIssue {
        OldIssue {
            id: new_id(),
            original_issue_id: self.id.clone(),
            revision: self.revision,
            title: self.title.clone(),
            description: self.description.clone(),
            priority: self.priority,
            status: self.status,
            departments: self.departments.clone(),
            resolution: self.resolution.clone(),
            machine_id: self.machine_id.clone(),
            sla: self.sla,
            name: self.name.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            archived_at: now(),
            archived_by: archived_by.to_string(),
        }
    }

    /// Returns the edited version of this issue with the revision bumped.
    /// Nothing is changed if validation fails.
    pub fn edited(&self, change: UpdateIssueRequest) -> Result<Issue, ApiError> {
        if change.is_empty() {
            return Err(ApiError::bad_request("No fields to update"));
        }

        let mut next = self.clone();
        if let Some(title) = change.title {
            require_non_empty("title", &title)?;
            next.title = title.trim().to_string();
        }
        if let Some(description) = change.description {
            require_non_empty("description", &description)?;
            next.description = description;
        }
        if let Some(priority) = change.priority {
            next.priority = priority;
        }
        if let Some(resolution) = change.resolution {
            next.resolution = resolution;
        }
        if let Some(status) = change.status {
            if status != self.status {
                next.status = self.status.transition(status)?;
            }
        }
        if let Some(departments) = change.departments {
            next.departments = departments;
        }
        if let Some(machine_id) = change.machine_id {
            next.machine_id = machine_id;
        }
        if let Some(sla) = change.sla {
            validate_sla(sla)?;
            next.sla = sla;
        }
        if let Some(name) = change.name {
            next.name = if name.trim().is_empty() {
                UNASSIGNED.to_string()
            } else {
                name
            };
        }
        if next.status == Status::Resolved
            && self.status != Status::Resolved
            && next.resolution.trim().is_empty()
        {
            return Err(ApiError::bad_request("A resolution is required to resolve an issue"));
        }

        next.revision = self.revision + 1;
        next.updated_at = now();
        Ok(next)
    }

    /// `None` when the deadline falls outside the representable range.
    pub fn sla_deadline(&self) -> Option<DateTime<Utc>> {
        let window = Duration::try_milliseconds((self.sla * 3_600_000.0) as i64)?;
        self.created_at.checked_add_signed(window)
    }

    /// True when the issue is still being worked and its SLA has run out.
    /// Issues with a zero SLA carry no deadline.
    pub fn sla_breached(&self, at: DateTime<Utc>) -> bool {
        self.sla > 0.0
            && !self.status.is_closed()
            && self.sla_deadline().map_or(false, |deadline| deadline < at)
    }

    pub fn is_reported_by(&self, user_id: &str) -> bool {
        self.reported_by == user_id
    }
}
