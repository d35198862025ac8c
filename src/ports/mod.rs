pub mod http_client;
pub mod route_store;
pub mod token_verifier;

pub use http_client::{HttpClient, HttpClientError, HttpClientResult};
pub use route_store::{RouteStore, StoreError, StoreResult};
pub use token_verifier::TokenVerifier;
