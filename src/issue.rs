//! Issue endpoints. Full edits go through the [`IssueLedger`] so the archived
//! copy and the overwrite land together; status endpoints mutate in place with
//! an update conditional on the status that was read.
//!
//! [`IssueLedger`]: crate::repository::IssueLedger

use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use mongodb::bson::doc;
use serde::Serialize;
use serde_json::json;

use crate::app_state::AppState;
use crate::auth::Claims;
use crate::error::{ApiError, ApiResult};
use crate::models::{
    issue::{
        AssignRequest, EscalateRequest, Issue, ReportIssueRequest, Status, StatusUpdateRequest,
        UpdateIssueRequest,
    },
    now, require_non_empty, Role,
};
use crate::repository::{by_id, to_set};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusPatch {
    status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    resolution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    escalation_recipient: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    escalation_reason: Option<String>,
    updated_at: DateTime<Utc>,
}

impl StatusPatch {
    fn to(status: Status) -> Self {
        StatusPatch {
            status,
            resolution: None,
            escalation_recipient: None,
            escalation_reason: None,
            updated_at: now(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AssigneePatch {
    name: String,
    updated_at: DateTime<Utc>,
}

async fn load_issue(data: &AppState, issue_id: &str) -> ApiResult<Issue> {
    data.issues
        .find(by_id(issue_id))
        .await?
        .ok_or_else(|| ApiError::not_found("Issue not found"))
}

fn newest_first(mut issues: Vec<Issue>) -> Vec<Issue> {
    issues.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    issues
}

/// Staff may move any issue; an operator may only confirm completion of an
/// issue they reported.
fn authorize_status_change(claims: &Claims, issue: &Issue, target: Status) -> ApiResult<()> {
    let confirms_own = claims.role == Role::Operator
        && target == Status::Completed
        && issue.is_reported_by(&claims.sub);
    if claims.has_role(Role::STAFF) || confirms_own {
        Ok(())
    } else {
        Err(ApiError::forbidden(
            "Operators can only confirm completion of their own issues",
        ))
    }
}

/// Validates `issue.status -> patch.status` and writes the patch only if the
/// stored status is still the one that was validated.
async fn transition(data: &AppState, issue: &Issue, patch: StatusPatch) -> ApiResult<Issue> {
    issue.status.transition(patch.status)?;

    let filter = doc! { "_id": &issue.id, "status": issue.status.as_str() };
    match data.issues.update(filter, to_set(&patch)?).await? {
        Some(updated) => {
            debug!("Issue {} moved {} -> {}", issue.id, issue.status, updated.status);
            Ok(updated)
        }
        None => {
            warn!("Issue {} changed status during a {} transition", issue.id, patch.status);
            Err(ApiError::conflict("Issue was modified concurrently, reload and retry"))
        }
    }
}

// ─── QUERIES ───────────────────────────────────────────────────────────────────

// GET /api/issues
pub async fn list_issues(data: web::Data<AppState>, _claims: Claims) -> ApiResult<HttpResponse> {
    let issues = data.issues.find_many(doc! {}).await?;
    Ok(HttpResponse::Ok().json(newest_first(issues)))
}

// GET /api/issues/mine
pub async fn my_issues(data: web::Data<AppState>, claims: Claims) -> ApiResult<HttpResponse> {
    let issues = data
        .issues
        .find_many(doc! { "reportedBy": &claims.sub })
        .await?;
    Ok(HttpResponse::Ok().json(newest_first(issues)))
}

// GET /api/issues/department/{name}
pub async fn issues_for_department(
    data: web::Data<AppState>,
    _claims: Claims,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let issues = data
        .issues
        .find_many(doc! { "departments": path.into_inner() })
        .await?;
    Ok(HttpResponse::Ok().json(newest_first(issues)))
}

// GET /api/issues/{open|acknowledged|in-progress|escalated|resolved|completed}
pub async fn issues_by_status(
    data: web::Data<AppState>,
    _claims: Claims,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let status = Status::from_slug(&path.into_inner())
        .ok_or_else(|| ApiError::not_found("Unknown status"))?;
    let issues = data
        .issues
        .find_many(doc! { "status": status.as_str() })
        .await?;
    Ok(HttpResponse::Ok().json(newest_first(issues)))
}

// GET /api/issues/updated
// Issues that went through at least one full edit.
pub async fn updated_issues(
    data: web::Data<AppState>,
    _claims: Claims,
) -> ApiResult<HttpResponse> {
    let issues = data.issues.find_many(doc! { "revision": { "$gt": 0 } }).await?;
    Ok(HttpResponse::Ok().json(newest_first(issues)))
}

// GET /api/issues/old/{id}
pub async fn old_issues(
    data: web::Data<AppState>,
    _claims: Claims,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let issue_id = path.into_inner();
    let mut archived = data
        .old_issues
        .find_many(doc! { "originalIssueId": &issue_id })
        .await?;

    // Archive rows outlive a deleted issue, so only a wholly unknown id is missing.
    if archived.is_empty() && data.issues.find(by_id(&issue_id)).await?.is_none() {
        return Err(ApiError::not_found("Issue not found"));
    }

    archived.sort_by_key(|old| old.revision);
    Ok(HttpResponse::Ok().json(archived))
}

// GET /api/issues/{id}
pub async fn get_issue(
    data: web::Data<AppState>,
    _claims: Claims,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let issue = load_issue(&data, &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(issue))
}

// ─── MUTATIONS ─────────────────────────────────────────────────────────────────

// POST /api/issues
pub async fn report_issue(
    data: web::Data<AppState>,
    claims: Claims,
    request: web::Json<ReportIssueRequest>,
) -> ApiResult<HttpResponse> {
    let issue = Issue::report(request.into_inner(), &claims.sub)?;
    data.issues.insert(&issue).await?;

    info!(
        "{} reported issue {} ({}, machine {})",
        claims.email,
        issue.id,
        issue.priority.as_str(),
        issue.machine_id
    );
    Ok(HttpResponse::Created().json(issue))
}

// PUT /api/issues/{id}
pub async fn update_issue(
    data: web::Data<AppState>,
    claims: Claims,
    path: web::Path<String>,
    request: web::Json<UpdateIssueRequest>,
) -> ApiResult<HttpResponse> {
    let issue = load_issue(&data, &path.into_inner()).await?;
    if !claims.has_role(Role::SUPERVISORS) && !issue.is_reported_by(&claims.sub) {
        return Err(ApiError::forbidden(
            "Only supervisors or the reporter can edit this issue",
        ));
    }

    let request = request.into_inner();
    if let Some(target) = request.status.filter(|target| *target != issue.status) {
        authorize_status_change(&claims, &issue, target)?;
    }

    let edited = issue.edited(request)?;
    let snapshot = issue.snapshot(&claims.sub);
    if !data.ledger.archive_and_replace(&snapshot, &edited).await? {
        warn!("Issue {} was edited concurrently at revision {}", issue.id, issue.revision);
        return Err(ApiError::conflict("Issue was modified concurrently, reload and retry"));
    }

    info!("{} edited issue {} (revision {})", claims.email, edited.id, edited.revision);
    Ok(HttpResponse::Ok().json(edited))
}

// DELETE /api/issues/{id}
pub async fn delete_issue(
    data: web::Data<AppState>,
    claims: Claims,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    claims.require(&[Role::Admin])?;

    let issue = data
        .issues
        .delete(by_id(&path.into_inner()))
        .await?
        .ok_or_else(|| ApiError::not_found("Issue not found"))?;
    info!("{} deleted issue {}", claims.email, issue.id);
    Ok(HttpResponse::Ok().json(json!({ "message": "Issue deleted", "_id": issue.id })))
}

// PUT /api/issues/acknowledge/{id}
pub async fn acknowledge_issue(
    data: web::Data<AppState>,
    claims: Claims,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    claims.require(Role::SUPERVISORS)?;
    let issue = load_issue(&data, &path.into_inner()).await?;

    let issue = transition(&data, &issue, StatusPatch::to(Status::Acknowledged)).await?;
    info!("{} acknowledged issue {}", claims.email, issue.id);
    Ok(HttpResponse::Ok().json(issue))
}

// PUT /api/issues/read/{id}
pub async fn mark_as_read(
    data: web::Data<AppState>,
    claims: Claims,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    claims.require(Role::STAFF)?;
    let issue = load_issue(&data, &path.into_inner()).await?;

    let issue = transition(&data, &issue, StatusPatch::to(Status::InProgress)).await?;
    info!("{} started work on issue {}", claims.email, issue.id);
    Ok(HttpResponse::Ok().json(issue))
}

// PUT /api/issues/escalate/{id}
pub async fn escalate_issue(
    data: web::Data<AppState>,
    claims: Claims,
    path: web::Path<String>,
    request: web::Json<EscalateRequest>,
) -> ApiResult<HttpResponse> {
    claims.require(Role::STAFF)?;
    let request = request.into_inner();
    require_non_empty("escalationRecipient", &request.escalation_recipient)?;
    require_non_empty("escalationReason", &request.escalation_reason)?;
    let issue = load_issue(&data, &path.into_inner()).await?;

    let patch = StatusPatch {
        escalation_recipient: Some(request.escalation_recipient.trim().to_string()),
        escalation_reason: Some(request.escalation_reason),
        ..StatusPatch::to(Status::Escalated)
    };
    let issue = transition(&data, &issue, patch).await?;
    info!(
        "{} escalated issue {} to {}",
        claims.email,
        issue.id,
        issue.escalation_recipient.as_deref().unwrap_or_default()
    );
    Ok(HttpResponse::Ok().json(issue))
}

// PUT /api/issues/status/{id}
pub async fn update_issue_status(
    data: web::Data<AppState>,
    claims: Claims,
    path: web::Path<String>,
    request: web::Json<StatusUpdateRequest>,
) -> ApiResult<HttpResponse> {
    let request = request.into_inner();
    let issue = load_issue(&data, &path.into_inner()).await?;

    authorize_status_change(&claims, &issue, request.status)?;

    issue.status.transition(request.status)?;
    let resolution = request.resolution.filter(|r| !r.trim().is_empty());
    if request.status == Status::Resolved
        && resolution.is_none()
        && issue.resolution.trim().is_empty()
    {
        return Err(ApiError::bad_request(
            "A resolution is required to resolve an issue",
        ));
    }

    let patch = StatusPatch {
        resolution,
        ..StatusPatch::to(request.status)
    };
    let issue = transition(&data, &issue, patch).await?;
    info!("{} set issue {} to {}", claims.email, issue.id, issue.status);
    Ok(HttpResponse::Ok().json(issue))
}

// PUT /api/issues/assign/{id}
pub async fn assign_issue(
    data: web::Data<AppState>,
    claims: Claims,
    path: web::Path<String>,
    request: web::Json<AssignRequest>,
) -> ApiResult<HttpResponse> {
    claims.require(Role::SUPERVISORS)?;
    require_non_empty("name", &request.name)?;

    let patch = to_set(&AssigneePatch {
        name: request.name.trim().to_string(),
        updated_at: now(),
    })?;
    let issue = data
        .issues
        .update(by_id(&path.into_inner()), patch)
        .await?
        .ok_or_else(|| ApiError::not_found("Issue not found"))?;

    info!("{} assigned issue {} to {}", claims.email, issue.id, issue.name);
    Ok(HttpResponse::Ok().json(issue))
}
