use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::auth::{Identity, TokenService};
use crate::error::ApiError;
use crate::middleware::AuthMiddleware;
use crate::models::OrderStatusInput;
use crate::orders::{self, Removal};
use crate::store::Store;

pub fn configure(cfg: &mut web::ServiceConfig, tokens: &TokenService) {
    cfg.service(
        web::scope("/order")
            .wrap(AuthMiddleware::required(tokens.clone()))
            .route("", web::get().to(get_orders))
            .route("", web::post().to(create_order))
            .route("/{order_id}", web::get().to(get_order))
            .route("/{order_id}", web::put().to(update_order))
            .route("/{order_id}", web::delete().to(delete_order)),
    );
}

async fn get_orders(
    store: web::Data<dyn Store>,
    identity: Identity,
) -> Result<HttpResponse, ApiError> {
    let orders = orders::list_orders(store.get_ref(), identity).await?;
    Ok(HttpResponse::Ok().json(orders))
}

async fn create_order(
    store: web::Data<dyn Store>,
    identity: Identity,
) -> Result<HttpResponse, ApiError> {
    let order = orders::place_order(store.get_ref(), identity).await?;
    Ok(HttpResponse::Created().json(order))
}

async fn get_order(
    store: web::Data<dyn Store>,
    identity: Identity,
    order_id: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let order = orders::get_order(store.get_ref(), identity, order_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(order))
}

async fn update_order(
    store: web::Data<dyn Store>,
    identity: Identity,
    order_id: web::Path<i64>,
    data: web::Json<OrderStatusInput>,
) -> Result<HttpResponse, ApiError> {
    let order =
        orders::update_status(store.get_ref(), identity, order_id.into_inner(), &data.status)
            .await?;
    Ok(HttpResponse::Ok().json(order))
}

async fn delete_order(
    store: web::Data<dyn Store>,
    identity: Identity,
    order_id: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    match orders::cancel_or_delete(store.get_ref(), identity, order_id.into_inner()).await? {
        Removal::Deleted => {
            Ok(HttpResponse::Ok().json(json!({ "message": "Order deleted successfully" })))
        }
        Removal::Cancelled(order) => Ok(HttpResponse::Ok().json(json!({
            "message": "Order cancelled successfully",
            "order": order,
        }))),
    }
}
