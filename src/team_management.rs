// team_management.rs

use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use log::{debug, info};
use mongodb::bson::doc;
use serde::Serialize;
use serde_json::json;

use crate::app_state::AppState;
use crate::auth::Claims;
use crate::error::{ApiError, ApiResult};
use crate::models::{
    new_id, now, require_non_empty,
    team::{AddMemberRequest, AssignLeaderRequest, CreateTeamRequest, RemoveLeaderRequest, Team},
    user::User,
    Role,
};
use crate::repository::{by_id, to_set};

// ─── PATCHES ───────────────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TeamPatch<'a> {
    members: &'a [String],
    leader: Option<&'a str>,
    updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MembershipPatch<'a> {
    team: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<Role>,
    updated_at: DateTime<Utc>,
}

// ─── HELPERS ───────────────────────────────────────────────────────────────────

async fn load_team(data: &AppState, team_id: &str) -> ApiResult<Team> {
    data.teams
        .find(by_id(team_id))
        .await?
        .ok_or_else(|| ApiError::not_found("Team not found"))
}

async fn load_user(data: &AppState, user_id: &str) -> ApiResult<User> {
    data.users
        .find(by_id(user_id))
        .await?
        .ok_or_else(|| ApiError::not_found(format!("User {} not found", user_id)))
}

async fn save_team(data: &AppState, team: &Team) -> ApiResult<Team> {
    let set = to_set(&TeamPatch {
        members: &team.members,
        leader: team.leader.as_deref(),
        updated_at: now(),
    })?;
    data.teams
        .update(by_id(&team.id), set)
        .await?
        .ok_or_else(|| ApiError::not_found("Team not found"))
}

/// Points a user at `team` (or at no team), optionally changing their role.
async fn set_membership(
    data: &AppState,
    user_id: &str,
    team: Option<&str>,
    role: Option<Role>,
) -> ApiResult<()> {
    let set = to_set(&MembershipPatch {
        team,
        role,
        updated_at: now(),
    })?;
    data.users.update(by_id(user_id), set).await?;
    Ok(())
}

/// Takes `user` off the team they currently belong to, unless that team is
/// `next_team`. Returns whether they were leading it.
async fn leave_current_team(data: &AppState, user: &User, next_team: &str) -> ApiResult<bool> {
    let Some(current) = user.team.as_deref().filter(|team| *team != next_team) else {
        return Ok(false);
    };
    let Some(mut team) = data.teams.find(by_id(current)).await? else {
        return Ok(false);
    };

    let was_leader = team.is_led_by(&user.id);
    team.members.retain(|member| member != &user.id);
    if was_leader {
        team.leader = None;
    }
    save_team(data, &team).await?;
    debug!("Moved {} out of team {}", user.email, team.name);
    Ok(was_leader)
}

fn require_admin_or_leader(claims: &Claims, team: &Team) -> ApiResult<()> {
    if claims.role == Role::Admin || team.is_led_by(&claims.sub) {
        Ok(())
    } else {
        Err(ApiError::forbidden(
            "Only an administrator or the team leader can manage members",
        ))
    }
}

// ─── TEAMS ─────────────────────────────────────────────────────────────────────

// GET /api/teams
pub async fn list_teams(data: web::Data<AppState>, _claims: Claims) -> ApiResult<HttpResponse> {
    let mut teams = data.teams.find_many(doc! {}).await?;
    teams.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(HttpResponse::Ok().json(teams))
}

// POST /api/teams
// Every listed member must exist; each one is moved onto the new team.
pub async fn create_team(
    data: web::Data<AppState>,
    claims: Claims,
    request: web::Json<CreateTeamRequest>,
) -> ApiResult<HttpResponse> {
    claims.require(&[Role::Admin])?;
    let request = request.into_inner();
    require_non_empty("name", &request.name)?;

    let mut users: Vec<User> = Vec::with_capacity(request.members.len());
    for user_id in request.members {
        if !users.iter().any(|user| user.id == user_id) {
            users.push(load_user(&data, &user_id).await?);
        }
    }
    let members = users.iter().map(|user| user.id.clone()).collect();

    let created_at = now();
    let team = Team {
        id: new_id(),
        name: request.name.trim().to_string(),
        members,
        leader: None,
        created_at,
        updated_at: created_at,
    };
    data.teams.insert(&team).await?;
    for user in &users {
        let was_leader = leave_current_team(&data, user, &team.id).await?;
        set_membership(&data, &user.id, Some(&team.id), was_leader.then_some(Role::Employee))
            .await?;
    }

    info!("{} created team {} with {} members", claims.email, team.name, team.members.len());
    Ok(HttpResponse::Created().json(team))
}

// GET /api/teams/{id}
pub async fn get_team(
    data: web::Data<AppState>,
    _claims: Claims,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let team = load_team(&data, &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(team))
}

// DELETE /api/teams/{id}
pub async fn delete_team(
    data: web::Data<AppState>,
    claims: Claims,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    claims.require(&[Role::Admin])?;

    let team = data
        .teams
        .delete(by_id(&path.into_inner()))
        .await?
        .ok_or_else(|| ApiError::not_found("Team not found"))?;
    for user_id in &team.members {
        let role = team.is_led_by(user_id).then_some(Role::Employee);
        set_membership(&data, user_id, None, role).await?;
    }

    info!("{} deleted team {}", claims.email, team.name);
    Ok(HttpResponse::Ok().json(json!({ "message": "Team deleted", "_id": team.id })))
}

// ─── MEMBERS ───────────────────────────────────────────────────────────────────

// POST /api/teams/{id}/members
pub async fn add_member(
    data: web::Data<AppState>,
    claims: Claims,
    path: web::Path<String>,
    request: web::Json<AddMemberRequest>,
) -> ApiResult<HttpResponse> {
    let mut team = load_team(&data, &path.into_inner()).await?;
    require_admin_or_leader(&claims, &team)?;

    let user = load_user(&data, &request.user_id).await?;
    if team.members.contains(&user.id) {
        return Err(ApiError::conflict("User is already a member of this team"));
    }

    let was_leader = leave_current_team(&data, &user, &team.id).await?;
    team.members.push(user.id.clone());
    let team = save_team(&data, &team).await?;
    set_membership(&data, &user.id, Some(&team.id), was_leader.then_some(Role::Employee))
        .await?;

    debug!("Added {} to team {}", user.email, team.name);
    Ok(HttpResponse::Ok().json(team))
}

// DELETE /api/teams/{id}/members/{user_id}
// Removing the leader also clears the leader slot and demotes them.
pub async fn remove_member(
    data: web::Data<AppState>,
    claims: Claims,
    path: web::Path<(String, String)>,
) -> ApiResult<HttpResponse> {
    let (team_id, user_id) = path.into_inner();
    let mut team = load_team(&data, &team_id).await?;
    require_admin_or_leader(&claims, &team)?;

    if !team.members.contains(&user_id) {
        return Err(ApiError::not_found("User is not a member of this team"));
    }

    let was_leader = team.is_led_by(&user_id);
    team.members.retain(|member| member != &user_id);
    if was_leader {
        team.leader = None;
    }
    let team = save_team(&data, &team).await?;
    set_membership(&data, &user_id, None, was_leader.then_some(Role::Employee)).await?;

    debug!("Removed {} from team {}", user_id, team.name);
    Ok(HttpResponse::Ok().json(team))
}

// ─── LEADERS ───────────────────────────────────────────────────────────────────

// PUT /api/team-leader/assign
// The new leader joins the team if needed and is promoted; a replaced leader
// goes back to employee.
pub async fn assign_team_leader(
    data: web::Data<AppState>,
    claims: Claims,
    request: web::Json<AssignLeaderRequest>,
) -> ApiResult<HttpResponse> {
    let mut team = load_team(&data, &request.team_id).await?;
    let user = load_user(&data, &request.user_id).await?;
    leave_current_team(&data, &user, &team.id).await?;

    if let Some(previous) = team.leader.take() {
        if previous != user.id {
            set_membership(&data, &previous, Some(&team.id), Some(Role::Employee)).await?;
        }
    }
    if !team.members.contains(&user.id) {
        team.members.push(user.id.clone());
    }
    team.leader = Some(user.id.clone());

    let team = save_team(&data, &team).await?;
    set_membership(&data, &user.id, Some(&team.id), Some(Role::TeamLeader)).await?;

    info!("{} made {} leader of team {}", claims.email, user.email, team.name);
    Ok(HttpResponse::Ok().json(team))
}

// PUT /api/team-leader/remove
pub async fn remove_team_leader(
    data: web::Data<AppState>,
    claims: Claims,
    request: web::Json<RemoveLeaderRequest>,
) -> ApiResult<HttpResponse> {
    let mut team = load_team(&data, &request.team_id).await?;
    let leader = team
        .leader
        .take()
        .ok_or_else(|| ApiError::not_found("Team has no leader"))?;

    let team = save_team(&data, &team).await?;
    set_membership(&data, &leader, Some(&team.id), Some(Role::Employee)).await?;

    info!("{} removed leader {} from team {}", claims.email, leader, team.name);
    Ok(HttpResponse::Ok().json(team))
}
