//! 身份上下文
//! Identity context
//!
//! 会话签发由上游网关负责，本服务完全信任网关注入的
//! `X-User-Id` / `X-User-Role` 头，不再重新推导身份。
//! Session issuance belongs to the upstream gateway; this service trusts the
//! `X-User-Id` / `X-User-Role` headers it injects and never re-derives identity.

use actix_web::{dev::Payload, FromRequest, HttpRequest};
use futures_util::future::{ready, Ready};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

pub const USER_ID_HEADER: &str = "X-User-Id";
pub const USER_ROLE_HEADER: &str = "X-User-Role";

/// 用户角色 / User role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Doctor,
    Nurse,
    Patient,
    Admin,
    Staff,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Doctor => "doctor",
            Role::Nurse => "nurse",
            Role::Patient => "patient",
            Role::Admin => "admin",
            Role::Staff => "staff",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "doctor" => Ok(Role::Doctor),
            "nurse" => Ok(Role::Nurse),
            "patient" => Ok(Role::Patient),
            "admin" => Ok(Role::Admin),
            "staff" => Ok(Role::Staff),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// 当前请求的用户 / The acting user of a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: String,
    pub role: Role,
}

impl CurrentUser {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self { id: id.into(), role }
    }

    pub fn is_doctor(&self) -> bool {
        self.role == Role::Doctor
    }

    fn from_headers(req: &HttpRequest) -> Result<Self, AppError> {
        let header = |name: &str| {
            req.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };
        let id = header(USER_ID_HEADER).ok_or_else(|| AppError::unauthenticated("missing user id"))?;
        let role = header(USER_ROLE_HEADER)
            .ok_or_else(|| AppError::unauthenticated("missing user role"))?
            .parse::<Role>()
            .map_err(AppError::unauthenticated)?;
        Ok(Self::new(id, role))
    }
}

impl FromRequest for CurrentUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Self::from_headers(req))
    }
}
