use actix_web::{web, HttpResponse};

use crate::auth::{require_admin, Identity, TokenService};
use crate::error::ApiError;
use crate::middleware::AuthMiddleware;
use crate::models::CategoryInput;
use crate::store::Store;

pub fn configure(cfg: &mut web::ServiceConfig, tokens: &TokenService) {
    cfg.service(
        web::scope("/category")
            .wrap(AuthMiddleware::optional(tokens.clone()))
            .route("", web::get().to(get_categories))
            .route("", web::post().to(add_category)),
    );
}

async fn get_categories(store: web::Data<dyn Store>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(store.list_categories().await?))
}

async fn add_category(
    store: web::Data<dyn Store>,
    identity: Identity,
    data: web::Json<CategoryInput>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&identity)?;
    let name = data.name.trim();
    if name.is_empty() {
        return Err(ApiError::validation("Category name is required"));
    }
    let category = store.create_category(name.to_string()).await?;
    Ok(HttpResponse::Created().json(category))
}
