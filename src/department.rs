use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use log::info;
use mongodb::bson::doc;
use serde::Serialize;
use serde_json::json;

use crate::app_state::AppState;
use crate::auth::{create_jwt, hash_password, verify_password, Claims};
use crate::error::{ApiError, ApiResult};
use crate::models::{
    department::{
        CreateDepartmentRequest, Department, DepartmentLogin, PublicDepartment,
        UpdateDepartmentRequest,
    },
    new_id, normalize_email, now, require_non_empty, validate_email, Role,
};
use crate::repository::{by_id, to_set};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DepartmentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    manager: Option<String>,
    #[serde(rename = "email_id", skip_serializing_if = "Option::is_none")]
    email_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<String>,
    updated_at: DateTime<Utc>,
}

// POST /api/department/login
pub async fn department_login(
    data: web::Data<AppState>,
    info: web::Json<DepartmentLogin>,
) -> ApiResult<HttpResponse> {
    let department = data
        .departments
        .find(doc! { "email_id": normalize_email(&info.email_id) })
        .await?
        .filter(|d| verify_password(&info.password, &d.password))
        .ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;

    let claims = Claims::for_department(&department, data.config.token_ttl_minutes);
    let token = create_jwt(&claims, &data.config.jwt_secret)?;
    info!("Department {} logged in", department.name);

    Ok(HttpResponse::Ok().json(json!({
        "token": token,
        "department": PublicDepartment::from(department),
    })))
}

// GET /api/department
pub async fn list_departments(
    data: web::Data<AppState>,
    _claims: Claims,
) -> ApiResult<HttpResponse> {
    let mut departments = data.departments.find_many(doc! {}).await?;
    departments.sort_by(|a, b| a.name.cmp(&b.name));
    let departments: Vec<PublicDepartment> =
        departments.into_iter().map(PublicDepartment::from).collect();
    Ok(HttpResponse::Ok().json(departments))
}

// POST /api/department
pub async fn create_department(
    data: web::Data<AppState>,
    claims: Claims,
    request: web::Json<CreateDepartmentRequest>,
) -> ApiResult<HttpResponse> {
    claims.require(&[Role::Admin])?;
    let request = request.into_inner();

    require_non_empty("name", &request.name)?;
    require_non_empty("manager", &request.manager)?;
    let email_id = normalize_email(&request.email_id);
    validate_email(&email_id)?;

    let name = request.name.trim().to_string();
    if data.departments.find(doc! { "name": &name }).await?.is_some() {
        return Err(ApiError::conflict("Department already exists"));
    }
    if data.departments.find(doc! { "email_id": &email_id }).await?.is_some() {
        return Err(ApiError::conflict("Department email is already in use"));
    }

    let created_at = now();
    let department = Department {
        id: new_id(),
        name,
        manager: request.manager.trim().to_string(),
        email_id,
        password: hash_password(&request.password, data.config.bcrypt_cost)?,
        role: Role::Department,
        created_at,
        updated_at: created_at,
    };
    data.departments.insert(&department).await?;
    info!("{} created department {}", claims.email, department.name);

    Ok(HttpResponse::Created().json(PublicDepartment::from(department)))
}

// GET /api/department/{id}
pub async fn get_department(
    data: web::Data<AppState>,
    _claims: Claims,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let department = data
        .departments
        .find(by_id(&path.into_inner()))
        .await?
        .ok_or_else(|| ApiError::not_found("Department not found"))?;
    Ok(HttpResponse::Ok().json(PublicDepartment::from(department)))
}

// PUT /api/department/{id}
pub async fn update_department(
    data: web::Data<AppState>,
    claims: Claims,
    path: web::Path<String>,
    request: web::Json<UpdateDepartmentRequest>,
) -> ApiResult<HttpResponse> {
    claims.require(&[Role::Admin])?;
    let department_id = path.into_inner();
    let request = request.into_inner();

    let mut patch = DepartmentPatch {
        name: None,
        manager: None,
        email_id: None,
        password: None,
        updated_at: now(),
    };
    if let Some(name) = request.name {
        require_non_empty("name", &name)?;
        patch.name = Some(name.trim().to_string());
    }
    if let Some(manager) = request.manager {
        require_non_empty("manager", &manager)?;
        patch.manager = Some(manager.trim().to_string());
    }
    if let Some(email_id) = request.email_id {
        let email_id = normalize_email(&email_id);
        validate_email(&email_id)?;
        if let Some(other) = data.departments.find(doc! { "email_id": &email_id }).await? {
            if other.id != department_id {
                return Err(ApiError::conflict("Department email is already in use"));
            }
        }
        patch.email_id = Some(email_id);
    }
    if let Some(password) = request.password {
        patch.password = Some(hash_password(&password, data.config.bcrypt_cost)?);
    }

    let set = to_set(&patch)?;
    if set.len() == 1 {
        return Err(ApiError::bad_request("No fields to update"));
    }

    let department = data
        .departments
        .update(by_id(&department_id), set)
        .await?
        .ok_or_else(|| ApiError::not_found("Department not found"))?;
    info!("{} updated department {}", claims.email, department.name);
    Ok(HttpResponse::Ok().json(PublicDepartment::from(department)))
}

// DELETE /api/department/{id}
pub async fn delete_department(
    data: web::Data<AppState>,
    claims: Claims,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    claims.require(&[Role::Admin])?;

    let department = data
        .departments
        .delete(by_id(&path.into_inner()))
        .await?
        .ok_or_else(|| ApiError::not_found("Department not found"))?;
    info!("{} deleted department {}", claims.email, department.name);
    Ok(HttpResponse::Ok().json(json!({ "message": "Department deleted", "_id": department.id })))
}

#[cfg(test)]
mod tests {
    use actix_web::{
        http::StatusCode,
        test::{call_service, init_service, read_body_json, TestRequest},
    };
    use serde_json::Value;

    use super::*;
    use crate::auth::validate_jwt;
    use crate::test_support::{bearer, seed_user, test_app, test_state, SECRET};

    fn quality() -> Value {
        json!({
            "name": "Quality",
            "manager": "Riya",
            "email_id": "quality@plant.example",
            "password": "qa-pass"
        })
    }

    #[actix_web::test]
    async fn admin_creates_department_that_can_log_in() {
        let state = test_state();
        let (_, admin) = seed_user(&state, "admin@plant.example", Role::Admin).await;
        let app = init_service(test_app(state)).await;

        let req = TestRequest::post()
            .uri("/api/department")
            .insert_header(bearer(&admin))
            .set_json(quality())
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let created: Value = read_body_json(resp).await;
        assert!(created.get("password").is_none());
        assert_eq!(created["role"], "department");

        let req = TestRequest::post()
            .uri("/api/department")
            .insert_header(bearer(&admin))
            .set_json(quality())
            .to_request();
        assert_eq!(call_service(&app, req).await.status(), StatusCode::CONFLICT);

        let req = TestRequest::post()
            .uri("/api/department/login")
            .set_json(json!({ "email_id": "quality@plant.example", "password": "qa-pass" }))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = read_body_json(resp).await;
        let claims = validate_jwt(body["token"].as_str().unwrap(), SECRET).unwrap();
        assert_eq!(claims.role, Role::Department);
        assert_eq!(claims.department.as_deref(), Some("Quality"));

        let req = TestRequest::post()
            .uri("/api/department/login")
            .set_json(json!({ "email_id": "quality@plant.example", "password": "wrong" }))
            .to_request();
        assert_eq!(call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn only_admins_change_departments() {
        let state = test_state();
        let (_, admin) = seed_user(&state, "admin@plant.example", Role::Admin).await;
        let (_, lead) = seed_user(&state, "lead@plant.example", Role::TeamLeader).await;
        let app = init_service(test_app(state.clone())).await;

        let req = TestRequest::post()
            .uri("/api/department")
            .insert_header(bearer(&lead))
            .set_json(quality())
            .to_request();
        assert_eq!(call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

        let req = TestRequest::post()
            .uri("/api/department")
            .insert_header(bearer(&admin))
            .set_json(quality())
            .to_request();
        let created: PublicDepartment = read_body_json(call_service(&app, req).await).await;

        let req = TestRequest::put()
            .uri(&format!("/api/department/{}", created.id))
            .insert_header(bearer(&admin))
            .set_json(json!({ "manager": "Noor" }))
            .to_request();
        let updated: PublicDepartment = read_body_json(call_service(&app, req).await).await;
        assert_eq!(updated.manager, "Noor");
        assert_eq!(updated.name, "Quality");

        let req = TestRequest::delete()
            .uri(&format!("/api/department/{}", created.id))
            .insert_header(bearer(&lead))
            .to_request();
        assert_eq!(call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

        let req = TestRequest::delete()
            .uri(&format!("/api/department/{}", created.id))
            .insert_header(bearer(&admin))
            .to_request();
        assert_eq!(call_service(&app, req).await.status(), StatusCode::OK);
        assert_eq!(state.departments.count(doc! {}).await.unwrap(), 0);
    }

    #[actix_web::test]
    async fn any_authenticated_caller_lists_departments() {
        let state = test_state();
        let (_, operator) = seed_user(&state, "op@plant.example", Role::Operator).await;
        let app = init_service(test_app(state)).await;

        let req = TestRequest::get()
            .uri("/api/department")
            .insert_header(bearer(&operator))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let departments: Vec<Value> = read_body_json(resp).await;
        assert!(departments.is_empty());

        let req = TestRequest::get().uri("/api/department").to_request();
        assert_eq!(call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
    }
}
