use actix_web::dev::Transform;
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::Error;
use actix_web::HttpMessage;
use actix_service::{forward_ready, Service};
use futures::future::{ok, LocalBoxFuture, Ready};
use log::debug;
use std::rc::Rc;

use crate::auth::{self, TokenService};
use crate::error::ApiError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    /// Reject the request unless it carries a valid token.
    Required,
    /// Attach the identity when present, let anonymous requests through.
    Optional,
}

// Middleware factory
pub struct AuthMiddleware {
    tokens: TokenService,
    mode: Mode,
}

impl AuthMiddleware {
    pub fn required(tokens: TokenService) -> Self {
        AuthMiddleware {
            tokens,
            mode: Mode::Required,
        }
    }

    pub fn optional(tokens: TokenService) -> Self {
        AuthMiddleware {
            tokens,
            mode: Mode::Optional,
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = AuthMiddlewareMiddleware<S>;
    type InitError = ();

    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddlewareMiddleware {
            service: Rc::new(service),
            tokens: self.tokens.clone(),
            mode: self.mode,
        })
    }
}

pub struct AuthMiddlewareMiddleware<S> {
    service: Rc<S>,
    tokens: TokenService,
    mode: Mode,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let outcome = auth::authenticate(req.request(), &self.tokens);
        let mode = self.mode;

        Box::pin(async move {
            match outcome {
                Ok(identity) => {
                    req.extensions_mut().insert(identity);
                    service.call(req).await
                }
                Err(err) if mode == Mode::Optional => {
                    debug!("Continuing anonymously on {}: {}", req.path(), err);
                    service.call(req).await
                }
                Err(err) => {
                    debug!("Rejected request to {}: {}", req.path(), err);
                    Err(ApiError::from(err).into())
                }
            }
        })
    }
}
