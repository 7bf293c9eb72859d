//! Caller identity resolution
//!
//! [`IdentityMiddleware`] asks an injected [`IdentityProvider`] to resolve the
//! bearer token on each request. A resolved caller is stored as [`UserId`] in
//! request extensions; unresolvable callers pass through as anonymous so that
//! handlers decide how to answer them. Handlers read the result through the
//! [`Caller`] extractor.

use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    Error, FromRequest, HttpMessage, HttpRequest,
};
use futures::future::LocalBoxFuture;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Shortest HS256 secret accepted
pub const MIN_SECRET_LEN: usize = 32;

/// Resolved caller identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserId(pub Uuid);

/// Resolves a bearer credential to a user, or `None` for anonymous
pub trait IdentityProvider: Send + Sync {
    fn resolve(&self, bearer_token: &str) -> Option<UserId>;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("JWT secret too short: need at least 32 bytes, got {0}")]
    SecretTooShort(usize),
}

/// JWT claims understood by [`JwtIdentityProvider`]
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID as UUID string)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    /// Issued at (Unix timestamp)
    pub iat: usize,
}

/// HS256 bearer-token identity provider
pub struct JwtIdentityProvider {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtIdentityProvider {
    pub fn new(secret: &str) -> Result<Self, IdentityError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(IdentityError::SecretTooShort(secret.len()));
        }

        Ok(Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        })
    }
}

impl IdentityProvider for JwtIdentityProvider {
    fn resolve(&self, bearer_token: &str) -> Option<UserId> {
        let token_data = decode::<Claims>(bearer_token, &self.decoding_key, &self.validation)
            .map_err(|e| tracing::debug!(error = %e, "JWT validation failed"))
            .ok()?;

        Uuid::parse_str(&token_data.claims.sub)
            .map_err(|e| tracing::debug!(error = %e, "JWT subject is not a UUID"))
            .ok()
            .map(UserId)
    }
}

/// Middleware that attaches the resolved [`UserId`] to each request
#[derive(Clone)]
pub struct IdentityMiddleware {
    provider: Arc<dyn IdentityProvider>,
}

impl IdentityMiddleware {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self { provider }
    }
}

impl<S, B> Transform<S, ServiceRequest> for IdentityMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = IdentityMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(IdentityMiddlewareService {
            service,
            provider: self.provider.clone(),
        }))
    }
}

pub struct IdentityMiddlewareService<S> {
    service: S,
    provider: Arc<dyn IdentityProvider>,
}

impl<S, B> Service<ServiceRequest> for IdentityMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let user_id = req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .and_then(|token| self.provider.resolve(token.trim()));

        if let Some(user_id) = user_id {
            req.extensions_mut().insert(user_id);
        }

        let fut = self.service.call(req);
        Box::pin(fut)
    }
}

/// The current caller: `Some` when the identity middleware resolved a user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller(pub Option<UserId>);

impl Caller {
    pub fn user_id(&self) -> Option<Uuid> {
        self.0.map(|id| id.0)
    }
}

impl FromRequest for Caller {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(Ok(Caller(req.extensions().get::<UserId>().copied())))
    }
}
