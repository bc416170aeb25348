//! Caller identity.
//!
//! Tokens are verified upstream; by the time a request reaches the order
//! service the caller is reduced to an id and a role, which is passed
//! explicitly into every operation.

use std::fmt;
use std::str::FromStr;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const CALLER_ID_HEADER: &str = "x-caller-id";
pub const CALLER_ROLE_HEADER: &str = "x-caller-role";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Rider,
    Driver,
    Admin,
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "rider" => Ok(Role::Rider),
            "driver" => Ok(Role::Driver),
            "admin" => Ok(Role::Admin),
            other => Err(AppError::AccessDenied(format!("unknown role {other}"))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Rider => "rider",
            Role::Driver => "driver",
            Role::Admin => "admin",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub id: String,
    pub role: Role,
}

impl Caller {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    pub fn rider(id: impl Into<String>) -> Self {
        Self::new(id, Role::Rider)
    }

    pub fn driver(id: impl Into<String>) -> Self {
        Self::new(id, Role::Driver)
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self::new(id, Role::Admin)
    }

    pub fn require(&self, role: Role) -> Result<(), AppError> {
        if self.role == role {
            Ok(())
        } else {
            Err(AppError::AccessDenied(format!(
                "{} {} cannot perform a {role} operation",
                self.role, self.id
            )))
        }
    }

    pub fn require_any(&self, roles: &[Role]) -> Result<(), AppError> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            Err(AppError::AccessDenied(format!(
                "{} {} is not allowed here",
                self.role, self.id
            )))
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
        };

        let id = header(CALLER_ID_HEADER)
            .ok_or_else(|| AppError::AccessDenied("no caller in request".to_string()))?;
        let role = header(CALLER_ROLE_HEADER)
            .ok_or_else(|| AppError::AccessDenied("no caller role in request".to_string()))?
            .parse()?;

        Ok(Caller::new(id, role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parsing_is_case_insensitive() {
        assert_eq!("Driver".parse::<Role>().unwrap(), Role::Driver);
        assert!("pilot".parse::<Role>().is_err());
    }

    #[test]
    fn require_rejects_other_roles() {
        let rider = Caller::rider("r1");
        assert!(rider.require(Role::Rider).is_ok());
        assert!(matches!(
            rider.require(Role::Driver),
            Err(AppError::AccessDenied(_))
        ));
        assert!(rider.require_any(&[Role::Driver, Role::Admin]).is_err());
    }
}
