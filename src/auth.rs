use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{Payload, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderMap, AUTHORIZATION},
    web, Error, FromRequest, HttpMessage, HttpRequest, HttpResponse,
};
use bcrypt::{hash, verify};
use chrono::{Duration, Utc};
use futures_util::future::{ok, ready, Ready};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::{info, warn};
use mongodb::bson::doc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::app_state::AppState;
use crate::error::{ApiError, ApiResult};
use crate::models::{
    department::Department,
    normalize_email, now,
    user::{CreateUserRequest, PublicUser, User},
    Role,
};
use crate::repository::{by_id, to_set};
use crate::user_management::create_account;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: Role,
    pub name: String,
    #[serde(default)]
    pub department: Option<String>,
    pub iat: usize,
    pub exp: usize,
}

impl Claims {
    fn issue(
        sub: &str,
        email: &str,
        role: Role,
        name: &str,
        department: Option<String>,
        ttl_minutes: i64,
    ) -> Self {
        let issued = Utc::now();
        let expiration = issued + Duration::minutes(ttl_minutes);
        Claims {
            sub: sub.to_string(),
            email: email.to_string(),
            role,
            name: name.to_string(),
            department,
            iat: issued.timestamp() as usize,
            exp: expiration.timestamp() as usize,
        }
    }

    pub fn for_user(user: &User, ttl_minutes: i64) -> Self {
        Self::issue(
            &user.id,
            &user.email,
            user.role,
            &user.name,
            user.department.clone(),
            ttl_minutes,
        )
    }

    pub fn for_department(department: &Department, ttl_minutes: i64) -> Self {
        Self::issue(
            &department.id,
            &department.email_id,
            Role::Department,
            &department.name,
            Some(department.name.clone()),
            ttl_minutes,
        )
    }

    pub fn has_role(&self, roles: &[Role]) -> bool {
        roles.contains(&self.role)
    }

    pub fn require(&self, roles: &[Role]) -> ApiResult<()> {
        if self.has_role(roles) {
            Ok(())
        } else {
            Err(ApiError::forbidden(format!(
                "Role {} is not allowed to perform this action",
                self.role
            )))
        }
    }
}

impl FromRequest for Claims {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<Claims>()
                .cloned()
                .ok_or_else(|| ApiError::unauthorized("Unauthorized")),
        )
    }
}

// JWT Creation
pub fn create_jwt(claims: &Claims, secret: &str) -> ApiResult<String> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )
    .map_err(|e| ApiError::internal(format!("Failed to encode token: {}", e)))
}

// JWT Validation
pub fn validate_jwt(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

pub fn hash_password(password: &str, cost: u32) -> ApiResult<String> {
    if password.is_empty() {
        return Err(ApiError::bad_request("password must not be empty"));
    }
    Ok(hash(password, cost)?)
}

pub fn verify_password(password: &str, hashed: &str) -> bool {
    verify(password, hashed).unwrap_or(false)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn authenticate(req: &ServiceRequest, roles: Option<&[Role]>) -> ApiResult<Claims> {
    let token = bearer_token(req.headers())
        .ok_or_else(|| ApiError::unauthorized("Access denied. No token provided"))?;
    let state = req
        .app_data::<web::Data<AppState>>()
        .ok_or_else(|| ApiError::internal("Application state is not configured"))?;

    let claims = validate_jwt(token, &state.config.jwt_secret)
        .map_err(|e| ApiError::bad_request(format!("Invalid token: {}", e)))?;

    if let Some(roles) = roles {
        if !claims.has_role(roles) {
            return Err(ApiError::forbidden(format!(
                "Role {} is not allowed to access this resource",
                claims.role
            )));
        }
    }
    Ok(claims)
}

/// Bearer-token gate. Attaches the decoded [`Claims`] to the request, and
/// optionally restricts the wrapped routes to a set of roles.
#[derive(Debug, Clone, Default)]
pub struct Authentication {
    roles: Option<Rc<[Role]>>,
}

impl Authentication {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_roles(roles: &[Role]) -> Self {
        Self {
            roles: Some(Rc::from(roles)),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for Authentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = AuthMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddleware {
            service,
            roles: self.roles.clone(),
        })
    }
}

pub struct AuthMiddleware<S> {
    service: S,
    roles: Option<Rc<[Role]>>,
}

impl<S, B> Service<ServiceRequest> for AuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        match authenticate(&req, self.roles.as_deref()) {
            Ok(claims) => {
                req.extensions_mut().insert(claims);
                let fut = self.service.call(req);
                Box::pin(async move {
                    let res = fut.await?;
                    Ok(res.map_into_boxed_body())
                })
            }
            Err(err) => {
                warn!("Rejected {} {}: {}", req.method(), req.path(), err);
                let res = req.error_response(err);
                Box::pin(async move { Ok(res) })
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginInfo {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: PublicUser,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionPatch {
    is_logged_in: bool,
    updated_at: chrono::DateTime<Utc>,
}

/// POST /api/auth/register
pub async fn register(
    data: web::Data<AppState>,
    info: web::Json<CreateUserRequest>,
) -> ApiResult<HttpResponse> {
    let info = info.into_inner();
    if info.role == Role::Admin {
        let admins = data
            .users
            .count(doc! { "role": Role::Admin.as_str() })
            .await?;
        if admins > 0 {
            return Err(ApiError::forbidden(
                "Admin accounts can only be created by an administrator",
            ));
        }
    }

    let user = create_account(&data, info).await?;
    info!("Registered user {} as {}", user.email, user.role);
    Ok(HttpResponse::Created().json(PublicUser::from(user)))
}

/// POST /api/auth/login
pub async fn login(
    data: web::Data<AppState>,
    info: web::Json<LoginInfo>,
) -> ApiResult<HttpResponse> {
    let user = data
        .users
        .find(doc! { "email": normalize_email(&info.email) })
        .await?
        .filter(|user| verify_password(&info.password, &user.password))
        .ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;

    let patch = to_set(&SessionPatch {
        is_logged_in: true,
        updated_at: now(),
    })?;
    let user = data.users.update(by_id(&user.id), patch).await?.unwrap_or(user);

    let claims = Claims::for_user(&user, data.config.token_ttl_minutes);
    let token = create_jwt(&claims, &data.config.jwt_secret)?;
    info!("User {} logged in", user.email);

    Ok(HttpResponse::Ok().json(LoginResponse {
        token,
        user: user.into(),
    }))
}

/// POST /api/auth/logout
///
/// Only flips the `isLoggedIn` flag; the token stays valid until it expires.
pub async fn logout(data: web::Data<AppState>, claims: Claims) -> ApiResult<HttpResponse> {
    if claims.role != Role::Department {
        let patch = to_set(&SessionPatch {
            is_logged_in: false,
            updated_at: now(),
        })?;
        data.users.update(by_id(&claims.sub), patch).await?;
    }
    info!("{} logged out", claims.email);
    Ok(HttpResponse::Ok().json(json!({ "message": "Logged out" })))
}

/// GET /api/auth/getRole/{email}
pub async fn get_role(
    data: web::Data<AppState>,
    email: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let email = normalize_email(&email);
    if let Some(user) = data.users.find(doc! { "email": &email }).await? {
        return Ok(HttpResponse::Ok().json(json!({ "role": user.role })));
    }
    if let Some(department) = data.departments.find(doc! { "email_id": &email }).await? {
        return Ok(HttpResponse::Ok().json(json!({ "role": department.role })));
    }
    Err(ApiError::not_found("User not found"))
}

#[cfg(test)]
mod tests {
    use actix_web::{
        http::StatusCode,
        test::{self, call_service, init_service, read_body_json, TestRequest},
    };
    use serde_json::Value;

    use super::*;
    use crate::test_support::{seed_user, test_app, test_state, user_fixture, SECRET};

    #[test]
    fn jwt_round_trip_keeps_role() {
        let user = user_fixture("op@plant.example", Role::Operator);
        let claims = Claims::for_user(&user, 60);
        let token = create_jwt(&claims, SECRET).unwrap();
        let decoded = validate_jwt(&token, SECRET).unwrap();
        assert_eq!(decoded.role, Role::Operator);
        assert_eq!(decoded.sub, user.id);
        assert!(validate_jwt(&token, "other-secret").is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let user = user_fixture("op@plant.example", Role::Operator);
        let claims = Claims::for_user(&user, -10);
        let token = create_jwt(&claims, SECRET).unwrap();
        assert!(validate_jwt(&token, SECRET).is_err());
    }

    fn registration(email: &str, role: &str) -> Value {
        json!({
            "name": "Dana",
            "email": email,
            "password": "s3cret-pass",
            "role": role,
            "department": "Maintenance"
        })
    }

    #[actix_web::test]
    async fn duplicate_registration_conflicts_and_creates_nothing() {
        let state = test_state();
        let app = init_service(test_app(state.clone())).await;

        let req = TestRequest::post()
            .uri("/api/auth/register")
            .set_json(registration("dana@plant.example", "operator"))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let req = TestRequest::post()
            .uri("/api/auth/register")
            .set_json(registration("dana@plant.example", "employee"))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        assert_eq!(state.users.count(doc! {}).await.unwrap(), 1);
    }

    #[actix_web::test]
    async fn registration_rejects_unknown_role() {
        let state = test_state();
        let app = init_service(test_app(state.clone())).await;

        let req = TestRequest::post()
            .uri("/api/auth/register")
            .set_json(registration("dana@plant.example", "superuser"))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.users.count(doc! {}).await.unwrap(), 0);
    }

    #[actix_web::test]
    async fn only_the_first_admin_can_self_register() {
        let state = test_state();
        let app = init_service(test_app(state.clone())).await;

        let req = TestRequest::post()
            .uri("/api/auth/register")
            .set_json(registration("root@plant.example", "admin"))
            .to_request();
        assert_eq!(call_service(&app, req).await.status(), StatusCode::CREATED);

        let req = TestRequest::post()
            .uri("/api/auth/register")
            .set_json(registration("root2@plant.example", "admin"))
            .to_request();
        assert_eq!(call_service(&app, req).await.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn login_returns_token_with_stored_role() {
        let state = test_state();
        let (user, _) = seed_user(&state, "lead@plant.example", Role::TeamLeader).await;
        let app = init_service(test_app(state.clone())).await;

        let req = TestRequest::post()
            .uri("/api/auth/login")
            .set_json(json!({ "email": "lead@plant.example", "password": "password" }))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: LoginResponse = read_body_json(resp).await;
        let claims = validate_jwt(&body.token, SECRET).unwrap();
        assert_eq!(claims.role, Role::TeamLeader);
        assert_eq!(claims.sub, user.id);
        assert!(body.user.is_logged_in);
    }

    #[actix_web::test]
    async fn wrong_password_is_invalid_credentials() {
        let state = test_state();
        seed_user(&state, "lead@plant.example", Role::TeamLeader).await;
        let app = init_service(test_app(state)).await;

        let req = TestRequest::post()
            .uri("/api/auth/login")
            .set_json(json!({ "email": "lead@plant.example", "password": "nope" }))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: Value = read_body_json(resp).await;
        assert_eq!(body["message"], "Invalid credentials");
    }

    #[actix_web::test]
    async fn gate_distinguishes_missing_invalid_and_forbidden() {
        let state = test_state();
        let (_, operator_token) = seed_user(&state, "op@plant.example", Role::Operator).await;
        let app = init_service(test_app(state)).await;

        let req = TestRequest::get().uri("/api/issues").to_request();
        assert_eq!(call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

        let req = TestRequest::get()
            .uri("/api/issues")
            .insert_header(("Authorization", "Bearer not.a.token"))
            .to_request();
        assert_eq!(call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = TestRequest::get()
            .uri("/api/dashboard")
            .insert_header(("Authorization", format!("Bearer {}", operator_token)))
            .to_request();
        assert_eq!(call_service(&app, req).await.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn logout_clears_flag_and_get_role_finds_accounts() {
        let state = test_state();
        let (user, token) = seed_user(&state, "emp@plant.example", Role::Employee).await;
        state
            .users
            .update(by_id(&user.id), doc! { "isLoggedIn": true })
            .await
            .unwrap();
        let app = init_service(test_app(state.clone())).await;

        let req = TestRequest::post()
            .uri("/api/auth/logout")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        assert_eq!(call_service(&app, req).await.status(), StatusCode::OK);
        let stored = state.users.find(by_id(&user.id)).await.unwrap().unwrap();
        assert!(!stored.is_logged_in);

        let req = test::TestRequest::get()
            .uri("/api/auth/getRole/emp@plant.example")
            .to_request();
        let body: Value = read_body_json(call_service(&app, req).await).await;
        assert_eq!(body["role"], "employee");

        let req = test::TestRequest::get()
            .uri("/api/auth/getRole/ghost@plant.example")
            .to_request();
        assert_eq!(call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }
}
