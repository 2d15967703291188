use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod auth;
mod config;
mod error;
mod exchange;
mod rate_limit;
mod routes;
mod schemas;
mod split;
mod store;
mod validation;

use crate::{
    auth::TokenKeys, config::Config, rate_limit::RateLimits,
    routes::categories::seed_default_categories, validation::json_error_handler,
};

fn cors_for(origin: Option<&str>) -> Cors {
    let cors = match origin {
        Some(origin) => Cors::default().allowed_origin(origin),
        None => Cors::default().allow_any_origin(),
    };
    cors.allow_any_method().allow_any_header().max_age(3600)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Environment misconfigured: {err}");
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let db = match store::mongo::connect(&config.mongodb_uri, &config.database_name).await {
        Ok(db) => db,
        Err(err) => {
            error!("All MongoDB connection attempts failed: {err}");
            std::process::exit(1);
        }
    };
    if let Err(err) = store::mongo::ensure_indexes(&db).await {
        error!("Failed to create database indexes: {err}");
    }

    let stores = store::mongo::stores(&db);
    if let Err(err) = seed_default_categories(&stores).await {
        error!("Failed to create default categories: {err}");
    }

    let stores = web::Data::new(stores);
    let keys = web::Data::new(TokenKeys::new(&config.jwt_secret, config.token_ttl_secs));
    let limits = web::Data::new(RateLimits::default());
    let cors_origin = config.cors_origin.clone();

    info!("Binding to {}:{}", config.host, config.port);
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(cors_for(cors_origin.as_deref()))
            .app_data(stores.clone())
            .app_data(keys.clone())
            .app_data(limits.clone())
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .configure(routes::configure)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
