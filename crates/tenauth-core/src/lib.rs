//! Core library for multi-tenant OAuth2 login: PKCE authorization,
//! code-for-cookie token exchange, tenant-mismatch recovery, and access to
//! the protected dashboard.

pub mod auth;
pub mod config;
pub mod dashboard;
