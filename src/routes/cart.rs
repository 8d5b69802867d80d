use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::auth::{Identity, TokenService};
use crate::cart;
use crate::error::ApiError;
use crate::middleware::AuthMiddleware;
use crate::models::{AddCartItemInput, QuantityInput};
use crate::store::Store;

pub fn configure(cfg: &mut web::ServiceConfig, tokens: &TokenService) {
    cfg.service(
        web::scope("/cart")
            .wrap(AuthMiddleware::required(tokens.clone()))
            .route("", web::get().to(get_cart))
            .route("", web::delete().to(clear_cart))
            .route("/items", web::get().to(get_items))
            .route("/items", web::post().to(add_item))
            .route("/items/{item_id}", web::put().to(update_item))
            .route("/items/{item_id}", web::delete().to(remove_item)),
    );
}

async fn get_cart(
    store: web::Data<dyn Store>,
    identity: Identity,
) -> Result<HttpResponse, ApiError> {
    let cart = cart::view_cart(store.get_ref(), identity).await?;
    Ok(HttpResponse::Ok().json(cart))
}

async fn clear_cart(
    store: web::Data<dyn Store>,
    identity: Identity,
) -> Result<HttpResponse, ApiError> {
    cart::clear_cart(store.get_ref(), identity).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Cart cleared successfully" })))
}

async fn get_items(
    store: web::Data<dyn Store>,
    identity: Identity,
) -> Result<HttpResponse, ApiError> {
    let items = cart::list_items(store.get_ref(), identity).await?;
    Ok(HttpResponse::Ok().json(items))
}

async fn add_item(
    store: web::Data<dyn Store>,
    identity: Identity,
    data: web::Json<AddCartItemInput>,
) -> Result<HttpResponse, ApiError> {
    let item = cart::add_item(store.get_ref(), identity, data.product_id, data.quantity).await?;
    Ok(HttpResponse::Ok().json(item))
}

async fn update_item(
    store: web::Data<dyn Store>,
    identity: Identity,
    item_id: web::Path<i64>,
    data: web::Json<QuantityInput>,
) -> Result<HttpResponse, ApiError> {
    let item =
        cart::update_item_quantity(store.get_ref(), identity, item_id.into_inner(), data.quantity)
            .await?;
    Ok(HttpResponse::Ok().json(item))
}

async fn remove_item(
    store: web::Data<dyn Store>,
    identity: Identity,
    item_id: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    cart::remove_item(store.get_ref(), identity, item_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Item removed from cart" })))
}
