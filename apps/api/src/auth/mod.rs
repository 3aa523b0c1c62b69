//! Demo login for the AgriSense dashboards.
//!
//! Two fixed accounts pick which dashboard the client is sent to. There are
//! no sessions or tokens; this only routes a user to a role's landing page.

pub mod handlers;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Farmer,
}

impl Role {
    pub fn landing_page(&self) -> &'static str {
        match self {
            Role::Admin => "/admin/dashboard",
            Role::Farmer => "/dashboard",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Invalid email or password. Please try again.")]
    InvalidCredentials,
}

struct DemoAccount {
    email: &'static str,
    password: &'static str,
    role: Role,
}

const DEMO_ACCOUNTS: &[DemoAccount] = &[
    DemoAccount {
        email: "admin@gmail.com",
        password: "admin123",
        role: Role::Admin,
    },
    DemoAccount {
        email: "user@gmail.com",
        password: "user123",
        role: Role::Farmer,
    },
];

/// Matches the demo accounts exactly. Form rules are checked on the request
/// body before this is called.
pub fn authenticate(email: &str, password: &str) -> Result<Role, AuthError> {
    DEMO_ACCOUNTS
        .iter()
        .find(|a| a.email == email && a.password == password)
        .map(|a| a.role)
        .ok_or(AuthError::InvalidCredentials)
}
