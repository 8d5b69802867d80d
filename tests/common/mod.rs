//! Shared fixtures for the HTTP tests: an app over a fresh `MemoryStore`,
//! user/token helpers, and a `send` that also renders middleware errors.

#![allow(dead_code)]

use std::sync::Arc;

use actix_http::Request;
use actix_web::body::{to_bytes, MessageBody};
use actix_web::dev::{Service, ServiceResponse};
use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use rust_decimal::Decimal;
use serde_json::Value;

use shopfront_api::auth::TokenService;
use shopfront_api::models::{NewUser, Product, ProductInput, Role, User};
use shopfront_api::routes;
use shopfront_api::store::{MemoryStore, Store};

pub const SECRET: &str = "integration-test-secret";

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub tokens: TokenService,
}

impl Fixture {
    pub fn new() -> Self {
        Fixture {
            store: Arc::new(MemoryStore::new()),
            tokens: TokenService::new(SECRET),
        }
    }

    pub async fn app(
        &self,
    ) -> impl Service<Request, Response = ServiceResponse<impl MessageBody>, Error = actix_web::Error>
    {
        let store: Arc<dyn Store> = self.store.clone();
        let store = web::Data::from(store);
        let tokens = self.tokens.clone();
        test::init_service(App::new().configure(move |cfg| routes::configure(cfg, store, tokens)))
            .await
    }

    /// Stores a user directly; the password hash is a placeholder.
    pub async fn user(&self, email: &str, role: Role) -> (User, String) {
        let user = self
            .store
            .create_user(NewUser {
                email: email.to_string(),
                password_hash: "unused".to_string(),
                role,
                first_name: None,
                last_name: None,
            })
            .await
            .unwrap();
        let token = self.tokens.issue(user.id, user.role).unwrap();
        (user, token)
    }

    pub async fn product(&self, name: &str, price: Decimal) -> Product {
        self.store
            .create_product(ProductInput {
                category_id: None,
                name: name.to_string(),
                description: None,
                price,
                image_url: None,
                stock: 100,
                sold_count: 0,
                is_deleted: false,
            })
            .await
            .unwrap()
    }
}

pub fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {token}"))
}

pub fn money(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

/// Reads a JSON value holding a decimal, whether serialised as string or number.
pub fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().unwrap(),
        Value::Number(n) => n.to_string().parse().unwrap(),
        other => panic!("not a decimal: {other}"),
    }
}

/// Calls the app and returns status plus JSON body. Errors raised by the
/// auth middleware are rendered the way the server would render them.
pub async fn send<S, B>(app: &S, req: Request) -> (StatusCode, Value)
where
    S: Service<Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    let (status, body) = match test::try_call_service(app, req).await {
        Ok(resp) => {
            let status = resp.status();
            (status, test::read_body(resp).await)
        }
        Err(err) => {
            let resp = err.error_response();
            let status = resp.status();
            (status, to_bytes(resp.into_body()).await.unwrap())
        }
    };

    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}
