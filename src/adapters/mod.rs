pub mod auth;
pub mod gateway;
pub mod http_client;
pub mod json_route_store;
pub mod listener_supervisor;
pub mod management;
pub mod middleware;
pub mod static_files;

/// Re-export commonly used types from adapters
pub use auth::AuthGate;
pub use gateway::gateway_router;
pub use http_client::HttpClientAdapter;
pub use json_route_store::JsonRouteStore;
pub use listener_supervisor::{ListenerSupervisor, SupervisorSettings};
pub use management::{ApiResult, ManagementContext, management_router};
pub use middleware::*;
pub use static_files::{StartTime, static_router};
