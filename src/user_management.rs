use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use log::info;
use mongodb::bson::doc;
use serde::Serialize;
use serde_json::json;

use crate::app_state::AppState;
use crate::auth::{hash_password, Claims};
use crate::error::{ApiError, ApiResult};
use crate::models::{
    new_id, normalize_email, now, require_non_empty,
    user::{CreateUserRequest, PublicUser, UpdateUserRequest, User},
    validate_email, Role,
};
use crate::repository::{by_id, to_set};

/// Validates and stores a new account. Shared by registration and the admin
/// user endpoint.
pub async fn create_account(data: &AppState, request: CreateUserRequest) -> ApiResult<User> {
    require_non_empty("name", &request.name)?;
    let email = normalize_email(&request.email);
    validate_email(&email)?;

    if data.users.find(doc! { "email": &email }).await?.is_some() {
        return Err(ApiError::conflict("User already exists"));
    }

    let created_at = now();
    let user = User {
        id: new_id(),
        name: request.name.trim().to_string(),
        email,
        password: hash_password(&request.password, data.config.bcrypt_cost)?,
        role: request.role,
        department: request.department.filter(|d| !d.trim().is_empty()),
        team: None,
        is_logged_in: false,
        created_at,
        updated_at: created_at,
    };
    data.users.insert(&user).await?;
    Ok(user)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    department: Option<String>,
    updated_at: DateTime<Utc>,
}

/// GET /api/users
pub async fn list_users(data: web::Data<AppState>, claims: Claims) -> ApiResult<HttpResponse> {
    claims.require(Role::SUPERVISORS)?;

    let mut users = data.users.find_many(doc! {}).await?;
    users.sort_by(|a, b| a.name.cmp(&b.name));
    let users: Vec<PublicUser> = users.into_iter().map(PublicUser::from).collect();
    Ok(HttpResponse::Ok().json(users))
}

/// POST /api/users
pub async fn create_user(
    data: web::Data<AppState>,
    claims: Claims,
    request: web::Json<CreateUserRequest>,
) -> ApiResult<HttpResponse> {
    claims.require(&[Role::Admin])?;

    let user = create_account(&data, request.into_inner()).await?;
    info!("{} created user {} ({})", claims.email, user.email, user.role);
    Ok(HttpResponse::Created().json(PublicUser::from(user)))
}

/// GET /api/users/{id}
pub async fn get_user_by_id(
    data: web::Data<AppState>,
    _claims: Claims,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let user = data
        .users
        .find(by_id(&path.into_inner()))
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(HttpResponse::Ok().json(PublicUser::from(user)))
}

/// PUT /api/users/{id}
pub async fn update_user(
    data: web::Data<AppState>,
    claims: Claims,
    path: web::Path<String>,
    request: web::Json<UpdateUserRequest>,
) -> ApiResult<HttpResponse> {
    let user_id = path.into_inner();
    let request = request.into_inner();

    let is_admin = claims.role == Role::Admin;
    if !is_admin && claims.sub != user_id {
        return Err(ApiError::forbidden("Cannot modify another user's account"));
    }
    if !is_admin && request.role.is_some() {
        return Err(ApiError::forbidden("Only an administrator can change roles"));
    }

    let mut patch = UserPatch {
        name: None,
        email: None,
        password: None,
        role: request.role,
        department: request.department,
        updated_at: now(),
    };
    if let Some(name) = request.name {
        require_non_empty("name", &name)?;
        patch.name = Some(name.trim().to_string());
    }
    if let Some(email) = request.email {
        let email = normalize_email(&email);
        validate_email(&email)?;
        if let Some(other) = data.users.find(doc! { "email": &email }).await? {
            if other.id != user_id {
                return Err(ApiError::conflict("Email is already in use"));
            }
        }
        patch.email = Some(email);
    }
    if let Some(password) = request.password {
        patch.password = Some(hash_password(&password, data.config.bcrypt_cost)?);
    }

    let set = to_set(&patch)?;
    if set.len() == 1 {
        return Err(ApiError::bad_request("No fields to update"));
    }

    let user = data
        .users
        .update(by_id(&user_id), set)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    info!("{} updated user {}", claims.email, user.email);
    Ok(HttpResponse::Ok().json(PublicUser::from(user)))
}

/// DELETE /api/users/{id}
pub async fn delete_user(
    data: web::Data<AppState>,
    claims: Claims,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    claims.require(&[Role::Admin])?;

    let user = data
        .users
        .delete(by_id(&path.into_inner()))
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    info!("{} deleted user {}", claims.email, user.email);
    Ok(HttpResponse::Ok().json(json!({ "message": "User deleted", "_id": user.id })))
}
