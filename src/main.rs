use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use log::info;

use shopfront_api::auth::TokenService;
use shopfront_api::config::Config;
use shopfront_api::routes;
use shopfront_api::startup::{self, StartupError};
use shopfront_api::store::Store;

#[actix_web::main]
async fn main() -> Result<(), StartupError> {
    dotenv::dotenv().ok(); // Load environment variables from .env file
    env_logger::init();

    let config = Config::from_env()?;
    let store = startup::open_store(&config).await?;
    if let Some(seed) = &config.admin {
        startup::ensure_admin(store.as_ref(), seed).await?;
    }

    let store: web::Data<dyn Store> = web::Data::from(store);
    let tokens = TokenService::new(&config.jwt_secret);

    info!("Listening on {}", config.bind_address);
    HttpServer::new(move || {
        let store = store.clone();
        let tokens = tokens.clone();
        App::new()
            .wrap(Logger::default())
            .configure(move |cfg| routes::configure(cfg, store, tokens))
    })
    .bind(&config.bind_address)?
    .run()
    .await?;

    Ok(())
}
