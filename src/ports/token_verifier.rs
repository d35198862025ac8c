use async_trait::async_trait;

/// Decides whether a presented bearer token is acceptable.
///
/// Issuing tokens and distributing keys happen elsewhere; the gateway only
/// needs a yes/no answer at the point a non-local caller hits a guarded route.
#[async_trait]
pub trait TokenVerifier: Send + Sync + 'static {
    async fn verify(&self, token: &str) -> bool;
}
