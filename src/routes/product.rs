use actix_web::{web, HttpResponse};
use log::info;
use rust_decimal::Decimal;

use crate::auth::{require_admin, Identity, TokenService};
use crate::error::ApiError;
use crate::middleware::AuthMiddleware;
use crate::models::ProductInput;
use crate::store::Store;

pub fn configure(cfg: &mut web::ServiceConfig, tokens: &TokenService) {
    cfg.service(
        web::scope("/product")
            .wrap(AuthMiddleware::optional(tokens.clone()))
            .route("", web::get().to(get_products))
            .route("", web::post().to(add_product))
            .route("/{product_id}", web::get().to(get_product))
            .route("/{product_id}", web::put().to(update_product))
            .route("/{product_id}", web::delete().to(delete_product)),
    );
}

async fn validate(store: &dyn Store, input: &ProductInput) -> Result<(), ApiError> {
    if input.name.trim().is_empty() {
        return Err(ApiError::validation("Product name is required"));
    }
    if input.price < Decimal::ZERO {
        return Err(ApiError::validation("Price must not be negative"));
    }
    if input.stock < 0 || input.sold_count < 0 {
        return Err(ApiError::validation("Stock must not be negative"));
    }
    if let Some(category_id) = input.category_id {
        if store.find_category(category_id).await?.is_none() {
            return Err(ApiError::validation("Category does not exist"));
        }
    }
    Ok(())
}

async fn get_products(store: web::Data<dyn Store>) -> Result<HttpResponse, ApiError> {
    let products = store.list_products().await?;
    Ok(HttpResponse::Ok().json(products))
}

async fn get_product(
    store: web::Data<dyn Store>,
    product_id: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let product = store
        .find_product(product_id.into_inner())
        .await?
        .filter(|p| !p.is_deleted)
        .ok_or_else(|| ApiError::not_found("Product not found"))?;
    Ok(HttpResponse::Ok().json(product))
}

async fn add_product(
    store: web::Data<dyn Store>,
    identity: Identity,
    data: web::Json<ProductInput>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&identity)?;
    validate(store.get_ref(), &data).await?;

    let product = store.create_product(data.into_inner()).await?;
    info!("Admin {} created product {}", identity.user_id, product.id);
    Ok(HttpResponse::Created().json(product))
}

async fn update_product(
    store: web::Data<dyn Store>,
    identity: Identity,
    product_id: web::Path<i64>,
    data: web::Json<ProductInput>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&identity)?;
    validate(store.get_ref(), &data).await?;

    let product_id = product_id.into_inner();
    // Deleted products stay deleted; a replacement cannot revive them.
    store
        .find_product(product_id)
        .await?
        .filter(|p| !p.is_deleted)
        .ok_or_else(|| ApiError::not_found("Product not found"))?;

    let mut input = data.into_inner();
    input.is_deleted = false;
    let product = store
        .update_product(product_id, input)
        .await?
        .ok_or_else(|| ApiError::not_found("Product not found"))?;
    Ok(HttpResponse::Ok().json(product))
}

async fn delete_product(
    store: web::Data<dyn Store>,
    identity: Identity,
    product_id: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&identity)?;

    let product = store
        .soft_delete_product(product_id.into_inner())
        .await?
        .ok_or_else(|| ApiError::not_found("Product not found"))?;
    info!("Admin {} deleted product {}", identity.user_id, product.id);
    Ok(HttpResponse::Ok().json(product))
}
