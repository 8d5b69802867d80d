use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::auth::{require_owner_or_admin, Identity};
use crate::error::ApiError;
use crate::models::{Address, AddressChanges, AddressInput};
use crate::store::Store;

async fn ensure_user(store: &dyn Store, user_id: i64) -> Result<(), ApiError> {
    match store.find_user(user_id).await? {
        Some(_) => Ok(()),
        None => Err(ApiError::not_found("User not found")),
    }
}

/// The address must exist (404) and belong to the user in the path (400).
async fn owned_address(
    store: &dyn Store,
    user_id: i64,
    address_id: i64,
) -> Result<Address, ApiError> {
    let address = store
        .find_address(address_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Address not found"))?;
    if address.user_id != user_id {
        return Err(ApiError::validation("Address does not belong to this user"));
    }
    Ok(address)
}

pub async fn get_addresses(
    store: web::Data<dyn Store>,
    identity: Identity,
    user_id: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let user_id = user_id.into_inner();
    require_owner_or_admin(
        &identity,
        user_id,
        "Unauthorized - Cannot access other user addresses",
    )?;
    ensure_user(store.get_ref(), user_id).await?;

    let addresses = store.list_addresses(user_id).await?;
    Ok(HttpResponse::Ok().json(addresses))
}

pub async fn add_address(
    store: web::Data<dyn Store>,
    identity: Identity,
    user_id: web::Path<i64>,
    data: web::Json<AddressInput>,
) -> Result<HttpResponse, ApiError> {
    let user_id = user_id.into_inner();
    require_owner_or_admin(
        &identity,
        user_id,
        "Unauthorized - Cannot create address for other users",
    )?;

    let input = data.into_inner();
    let fields = [&input.address, &input.city, &input.state, &input.zip, &input.country];
    if fields.iter().any(|f| f.trim().is_empty()) {
        return Err(ApiError::validation("All address fields are required"));
    }
    ensure_user(store.get_ref(), user_id).await?;

    let address = store.create_address(user_id, input).await?;
    Ok(HttpResponse::Created().json(address))
}

pub async fn get_address(
    store: web::Data<dyn Store>,
    identity: Identity,
    path: web::Path<(i64, i64)>,
) -> Result<HttpResponse, ApiError> {
    let (user_id, address_id) = path.into_inner();
    require_owner_or_admin(
        &identity,
        user_id,
        "Unauthorized - Cannot access other user addresses",
    )?;

    let address = owned_address(store.get_ref(), user_id, address_id).await?;
    Ok(HttpResponse::Ok().json(address))
}

pub async fn update_address(
    store: web::Data<dyn Store>,
    identity: Identity,
    path: web::Path<(i64, i64)>,
    data: web::Json<AddressChanges>,
) -> Result<HttpResponse, ApiError> {
    let (user_id, address_id) = path.into_inner();
    require_owner_or_admin(
        &identity,
        user_id,
        "Unauthorized - Cannot update other user addresses",
    )?;
    owned_address(store.get_ref(), user_id, address_id).await?;

    let changes = data.into_inner().without_blanks();
    if changes.is_empty() {
        return Err(ApiError::validation("No valid fields to update"));
    }

    let address = store
        .update_address(address_id, changes)
        .await?
        .ok_or_else(|| ApiError::not_found("Address not found"))?;
    Ok(HttpResponse::Ok().json(address))
}

pub async fn delete_address(
    store: web::Data<dyn Store>,
    identity: Identity,
    path: web::Path<(i64, i64)>,
) -> Result<HttpResponse, ApiError> {
    let (user_id, address_id) = path.into_inner();
    require_owner_or_admin(
        &identity,
        user_id,
        "Unauthorized - Cannot delete other user addresses",
    )?;
    owned_address(store.get_ref(), user_id, address_id).await?;

    store.delete_address(address_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Address deleted successfully" })))
}
