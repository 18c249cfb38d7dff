use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::error::AppError;

/// Claims injected by the fronting identity gateway. This service trusts
/// the `x-auth-*` headers; token verification happens upstream.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: Uuid,
    pub role: Role,
    pub customer_id: Option<Uuid>,
    pub courier_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Customer,
    Courier,
    Admin,
}

impl Principal {
    pub fn require_customer(&self) -> Result<Uuid, AppError> {
        if self.role != Role::Customer {
            return Err(AppError::Forbidden("customer role required".to_string()));
        }
        self.customer_id
            .ok_or_else(|| AppError::Forbidden("customer_id missing from principal".to_string()))
    }

    pub fn require_courier(&self) -> Result<Uuid, AppError> {
        if self.role != Role::Courier {
            return Err(AppError::Forbidden("courier role required".to_string()));
        }
        self.courier_id
            .ok_or_else(|| AppError::Forbidden("courier_id missing from principal".to_string()))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = required_uuid(parts, "x-auth-user-id")?;
        let role = match required_str(parts, "x-auth-role")? {
            "customer" => Role::Customer,
            "courier" => Role::Courier,
            "admin" => Role::Admin,
            other => {
                return Err(AppError::Unauthenticated(format!("unknown role '{other}'")));
            }
        };

        Ok(Self {
            user_id,
            role,
            customer_id: optional_uuid(parts, "x-auth-customer-id")?,
            courier_id: optional_uuid(parts, "x-auth-courier-id")?,
        })
    }
}

fn required_str<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, AppError> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Unauthenticated(format!("missing {name} header")))
}

fn required_uuid(parts: &Parts, name: &str) -> Result<Uuid, AppError> {
    required_str(parts, name)?
        .parse()
        .map_err(|_| AppError::Unauthenticated(format!("malformed {name} header")))
}

fn optional_uuid(parts: &Parts, name: &str) -> Result<Option<Uuid>, AppError> {
    match parts.headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|raw| raw.parse().ok())
            .map(Some)
            .ok_or_else(|| AppError::Unauthenticated(format!("malformed {name} header"))),
    }
}
