//! Fixtures shared by handler tests. Everything runs against the in-memory
//! repositories.

use actix_web::{
    body::MessageBody,
    dev::{ServiceFactory, ServiceRequest, ServiceResponse},
    http::header::AUTHORIZATION,
    web, App, Error,
};

use crate::app_state::AppState;
use crate::auth::{create_jwt, Claims};
use crate::config::{Config, StorageBackend};
use crate::models::{new_id, now, user::User, Role};
use crate::routes;

pub const SECRET: &str = "test-secret";

pub fn test_config() -> Config {
    Config {
        storage: StorageBackend::Memory,
        mongo_uri: String::new(),
        database_name: "andon-test".to_string(),
        jwt_secret: SECRET.to_string(),
        token_ttl_minutes: 60,
        bcrypt_cost: 4,
        frontend_origin: "http://localhost:3000".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
    }
}

pub fn test_state() -> AppState {
    AppState::in_memory(test_config())
}

pub fn test_app(
    state: AppState,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl MessageBody>,
        Error = Error,
        InitError = (),
    >,
> {
    App::new()
        .app_data(web::Data::new(state))
        .configure(routes::configure)
}

/// A user whose password is `"password"`.
pub fn user_fixture(email: &str, role: Role) -> User {
    let created_at = now();
    User {
        id: new_id(),
        name: email.split('@').next().unwrap_or(email).to_string(),
        email: email.to_string(),
        password: bcrypt::hash("password", 4).unwrap(),
        role,
        department: Some("Maintenance".to_string()),
        team: None,
        is_logged_in: false,
        created_at,
        updated_at: created_at,
    }
}

/// Stores a fixture user and returns it with a valid token.
pub async fn seed_user(state: &AppState, email: &str, role: Role) -> (User, String) {
    let user = user_fixture(email, role);
    state.users.insert(&user).await.unwrap();
    let token = create_jwt(&Claims::for_user(&user, 60), SECRET).unwrap();
    (user, token)
}

pub fn bearer(token: &str) -> (actix_web::http::header::HeaderName, String) {
    (AUTHORIZATION, format!("Bearer {}", token))
}
