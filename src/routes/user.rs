use actix_web::{web, HttpResponse};
use log::{error, info};
use serde_json::json;

use super::address;
use crate::auth::{password, require_admin, require_owner_or_admin, Identity, TokenService};
use crate::error::ApiError;
use crate::middleware::AuthMiddleware;
use crate::models::{ProfileInput, PublicUser, UserChanges};
use crate::store::Store;

pub fn configure(cfg: &mut web::ServiceConfig, tokens: &TokenService) {
    cfg.service(
        web::scope("/user")
            .wrap(AuthMiddleware::required(tokens.clone()))
            .route("/{user_id}", web::get().to(get_profile))
            .route("/{user_id}", web::put().to(update_profile))
            .route("/{user_id}", web::delete().to(delete_profile))
            .route("/{user_id}/addresses", web::get().to(address::get_addresses))
            .route("/{user_id}/addresses", web::post().to(address::add_address))
            .route(
                "/{user_id}/addresses/{address_id}",
                web::get().to(address::get_address),
            )
            .route(
                "/{user_id}/addresses/{address_id}",
                web::put().to(address::update_address),
            )
            .route(
                "/{user_id}/addresses/{address_id}",
                web::delete().to(address::delete_address),
            ),
    );
}

async fn get_profile(
    store: web::Data<dyn Store>,
    identity: Identity,
    user_id: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let user_id = user_id.into_inner();
    require_owner_or_admin(&identity, user_id, "Unauthorized")?;

    let user = store
        .find_user(user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(HttpResponse::Ok().json(PublicUser::from(&user)))
}

fn profile_changes(data: ProfileInput) -> Result<UserChanges, ApiError> {
    let non_blank = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

    let password_hash = match data.password.filter(|p| !p.is_empty()) {
        Some(plain) => Some(password::hash(&plain).map_err(|e| {
            error!("Failed to hash password: {}", e);
            ApiError::internal()
        })?),
        None => None,
    };

    let changes = UserChanges {
        email: non_blank(data.email),
        password_hash,
        first_name: non_blank(data.first_name),
        last_name: non_blank(data.last_name),
    };
    if changes.is_empty() {
        return Err(ApiError::validation("No valid fields to update"));
    }
    Ok(changes)
}

async fn update_profile(
    store: web::Data<dyn Store>,
    identity: Identity,
    user_id: web::Path<i64>,
    data: web::Json<ProfileInput>,
) -> Result<HttpResponse, ApiError> {
    let user_id = user_id.into_inner();
    require_owner_or_admin(&identity, user_id, "Unauthorized")?;

    let changes = profile_changes(data.into_inner())?;
    let user = store
        .update_user(user_id, changes)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(HttpResponse::Ok().json(PublicUser::from(&user)))
}

async fn delete_profile(
    store: web::Data<dyn Store>,
    identity: Identity,
    user_id: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let user_id = user_id.into_inner();
    require_admin(&identity)?;

    if !store.delete_user(user_id).await? {
        return Err(ApiError::not_found("User not found"));
    }
    info!("User {} deleted by {}", user_id, identity.user_id);
    Ok(HttpResponse::Ok().json(json!({ "message": "User deleted successfully" })))
}
