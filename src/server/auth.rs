//! Master-key authentication middleware
//!
//! Wraps the `/v1` scope only. When no master key is configured the
//! middleware passes everything through (unsafe mode). Key comparison is
//! constant-time.

use std::future::{ready, Future, Ready};
use std::pin::Pin;
use std::sync::Arc;

use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::AUTHORIZATION;
use subtle::ConstantTimeEq;

use crate::core::GatewayError;

/// Middleware factory holding the configured master key.
pub struct MasterKeyAuth {
    key: Option<Arc<String>>,
}

impl MasterKeyAuth {
    /// An empty key disables authentication.
    pub fn new(master_key: &str) -> Self {
        Self {
            key: if master_key.is_empty() {
                None
            } else {
                Some(Arc::new(master_key.to_string()))
            },
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for MasterKeyAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = actix_web::Error;
    type InitError = ();
    type Transform = MasterKeyAuthService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(MasterKeyAuthService {
            service,
            key: self.key.clone(),
        }))
    }
}

pub struct MasterKeyAuthService<S> {
    service: S,
    key: Option<Arc<String>>,
}

impl<S, B> Service<ServiceRequest> for MasterKeyAuthService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = actix_web::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let Some(key) = &self.key else {
            return Box::pin(self.service.call(req));
        };

        match validate_bearer(req.headers().get(AUTHORIZATION), key) {
            Ok(()) => Box::pin(self.service.call(req)),
            Err(err) => Box::pin(ready(Err(err.into()))),
        }
    }
}

fn validate_bearer(
    header: Option<&actix_web::http::header::HeaderValue>,
    key: &str,
) -> Result<(), GatewayError> {
    let Some(header) = header else {
        return Err(GatewayError::Authentication {
            provider: None,
            message: "missing authorization header".to_string(),
        });
    };

    let value = header.to_str().unwrap_or("");
    let Some(token) = value.strip_prefix("Bearer ") else {
        return Err(GatewayError::Authentication {
            provider: None,
            message: "invalid authorization header format, expected 'Bearer <token>'".to_string(),
        });
    };

    if bool::from(token.as_bytes().ct_eq(key.as_bytes())) {
        Ok(())
    } else {
        Err(GatewayError::Authentication {
            provider: None,
            message: "invalid master key".to_string(),
        })
    }
}
