pub mod error;
pub mod proxy;
pub mod registry;
pub mod route;
pub mod state;
pub mod trust;

pub use error::{GatewayError, GatewayResult};
pub use proxy::ProxyHandler;
pub use registry::RouteRegistry;
pub use route::{ChangePortRequest, Route, RouteTarget};
pub use state::{GatewaySettings, GatewayState};
