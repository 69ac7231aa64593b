pub mod api;
#[path = "bootstrap/app_bootstrap.rs"]
pub mod app_bootstrap;
#[path = "bootstrap/route_registry.rs"]
pub mod route_registry;
pub mod comm;
pub mod conf;
pub mod error;
pub mod identity;
pub mod policy;
pub mod realtime;
pub mod state;
pub mod store;

// Modules
pub mod modules;

// Re-export bootstrap modules
pub use app_bootstrap::*;
pub use route_registry::*;
