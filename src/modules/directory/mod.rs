/// 租户目录模块 / Tenant directory module
pub mod cache;
pub mod models;
pub mod service;

pub use service::{DirectoryError, TenantDirectory};
