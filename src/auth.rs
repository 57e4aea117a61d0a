use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Concierge,
    Operator,
    Driver,
    Admin,
}

/// Resolved caller identity. The identity provider itself is external;
/// upstream middleware is trusted to have verified these headers.
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
    pub tenant_id: Uuid,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

fn header_uuid(parts: &Parts, name: &str) -> Result<Uuid, AppError> {
    let raw = parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Validation(format!("missing {name} header")))?;

    raw.parse()
        .map_err(|_| AppError::Validation(format!("{name} is not a valid uuid")))
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let role = match parts
            .headers
            .get("x-user-role")
            .and_then(|value| value.to_str().ok())
        {
            Some("concierge") => Role::Concierge,
            Some("operator") => Role::Operator,
            Some("driver") => Role::Driver,
            Some("admin") => Role::Admin,
            Some(other) => {
                return Err(AppError::Validation(format!("unknown role: {other}")));
            }
            None => return Err(AppError::Validation("missing x-user-role header".to_string())),
        };

        Ok(Actor {
            user_id: header_uuid(parts, "x-user-id")?,
            role,
            tenant_id: header_uuid(parts, "x-tenant-id")?,
        })
    }
}
