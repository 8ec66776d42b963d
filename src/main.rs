// src/main.rs

mod app_state;
mod auth;
mod config;
mod dashboard_data;
mod db;
mod department;
mod error;
mod issue;
mod models;
mod repository;
mod routes;
mod team_management;
mod user_management;
#[cfg(test)]
mod test_support;

use actix_cors::Cors;
use actix_web::{http, middleware::Logger, web, App, HttpServer};
use env_logger::Env;
use log::{info, warn};

use crate::app_state::AppState;
use crate::config::{Config, StorageBackend};
use crate::db::MongoDB;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = Config::from_env()?;
    let state = match config.storage {
        StorageBackend::Mongo => {
            let mongodb = MongoDB::init(&config.mongo_uri, &config.database_name).await?;
            AppState::mongo(&mongodb, config.clone()).await?
        }
        StorageBackend::Memory => {
            warn!("ANDON_STORAGE=memory: data lives in this process only");
            AppState::in_memory(config.clone())
        }
    };

    let frontend_origin = config.frontend_origin.clone();
    info!("Server running at http://{}", config.bind_addr);
    info!("Allowed CORS Origin: {}", frontend_origin);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&frontend_origin)
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                http::header::CONTENT_TYPE,
                http::header::ACCEPT,
                http::header::AUTHORIZATION,
            ])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .app_data(web::Data::new(state.clone()))
            .configure(routes::configure)
    })
    .bind(&config.bind_addr)?
    .run()
    .await
}
