use actix_web::cookie::{Cookie, SameSite};
use actix_web::{web, HttpResponse};
use log::{error, info};
use serde_json::json;

use crate::auth::{password, Identity, TokenService};
use crate::error::ApiError;
use crate::middleware::AuthMiddleware;
use crate::models::{AuthResponse, LoginInput, NewUser, PublicUser, RegisterInput, Role};
use crate::store::Store;

pub fn configure(cfg: &mut web::ServiceConfig, tokens: &TokenService) {
    cfg.service(
        web::scope("/auth")
            .route("/register", web::post().to(register))
            .route("/login", web::post().to(login))
            .service(
                web::resource("/logout")
                    .wrap(AuthMiddleware::optional(tokens.clone()))
                    .route(web::post().to(logout))
                    .route(web::get().to(logout_with_get)),
            ),
    );
}

fn blank(value: &str) -> bool {
    value.trim().is_empty()
}

async fn register(
    store: web::Data<dyn Store>,
    input: web::Json<RegisterInput>,
) -> Result<HttpResponse, ApiError> {
    let input = input.into_inner();
    if blank(&input.email) || blank(&input.password) {
        return Err(ApiError::validation("Email and password are required"));
    }
    let email = input.email.trim().to_string();

    if store.find_user_by_email(&email).await?.is_some() {
        return Err(ApiError::Conflict("User already exists".to_string()));
    }

    let password_hash = password::hash(&input.password).map_err(|e| {
        error!("Password hashing failed: {}", e);
        ApiError::internal()
    })?;

    let user = store
        .create_user(NewUser {
            email,
            password_hash,
            role: Role::User,
            first_name: input.first_name,
            last_name: input.last_name,
        })
        .await?;
    info!("Registered user {}", user.id);

    Ok(HttpResponse::Created().json(json!({
        "user": PublicUser::from(&user),
        "success": true,
        "message": "Registration successful",
    })))
}

async fn login(
    store: web::Data<dyn Store>,
    tokens: web::Data<TokenService>,
    input: web::Json<LoginInput>,
) -> Result<HttpResponse, ApiError> {
    if blank(&input.email) || blank(&input.password) {
        return Err(ApiError::validation("Email and password are required"));
    }

    let user = store
        .find_user_by_email(input.email.trim())
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    if !password::verify(&user.password, &input.password) {
        info!("Rejected login for user {}", user.id);
        return Err(ApiError::Unauthenticated("Invalid password".to_string()));
    }

    let token = tokens.issue(user.id, user.role).map_err(|e| {
        error!("Failed to encode token: {}", e);
        ApiError::internal()
    })?;
    info!("User {} logged in", user.id);

    Ok(HttpResponse::Ok().json(AuthResponse {
        user: PublicUser::from(&user),
        token,
        success: true,
        message: "Login successful",
    }))
}

/// Tokens are not revoked server-side; logging out only tells the client
/// to forget its token and expires the cookie.
async fn logout(identity: Option<Identity>) -> HttpResponse {
    let message = match identity {
        Some(identity) => {
            info!("User {} logged out", identity.user_id);
            "Logout successful"
        }
        None => "Logout successful (token was invalid/expired)",
    };

    let mut cookie = Cookie::build("token", "")
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Strict)
        .finish();
    cookie.make_removal();

    HttpResponse::Ok().cookie(cookie).json(json!({
        "success": true,
        "message": message,
        "clearToken": true,
    }))
}

async fn logout_with_get() -> HttpResponse {
    HttpResponse::MethodNotAllowed().json(json!({
        "message": "Use POST method for logout",
        "success": false,
    }))
}
