//! HTTP surface under `/api`. Each resource registers its own scope and
//! chooses whether a token is required there.

use actix_web::web;

use crate::auth::TokenService;
use crate::error::ApiError;
use crate::store::Store;

mod address;
mod auth;
mod cart;
mod category;
mod order;
mod product;
mod user;

fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .error_handler(|err, _req| ApiError::validation(format!("Invalid request body: {err}")).into())
}

fn path_config() -> web::PathConfig {
    web::PathConfig::default()
        .error_handler(|err, _req| ApiError::validation(format!("Invalid path: {err}")).into())
}

pub fn configure(cfg: &mut web::ServiceConfig, store: web::Data<dyn Store>, tokens: TokenService) {
    cfg.app_data(store)
        .app_data(web::Data::new(tokens.clone()))
        .app_data(json_config())
        .app_data(path_config())
        .service(
            web::scope("/api")
                .configure(|cfg| auth::configure(cfg, &tokens))
                .configure(|cfg| product::configure(cfg, &tokens))
                .configure(|cfg| category::configure(cfg, &tokens))
                .configure(|cfg| cart::configure(cfg, &tokens))
                .configure(|cfg| order::configure(cfg, &tokens))
                .configure(|cfg| user::configure(cfg, &tokens)),
        );
}
