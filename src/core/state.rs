//! Process-wide gateway settings with ordered change observers.
//!
//! The setters are the only mutation path. Each one records the new value,
//! then runs the observers registered for that field in registration order,
//! handing them the value being set. The first failing observer stops the
//! chain; its error is returned to the caller and the field is restored to
//! the value it had before the call. Side effects of observers that already
//! ran are left in place.
use std::{future::Future, path::PathBuf, sync::Arc};

use arc_swap::ArcSwap;
use futures_util::future::BoxFuture;
use tokio::sync::Mutex;

use crate::core::error::{GatewayError, GatewayResult};

/// A fallible callback receiving the new value of a field.
pub type Observer<T> = Arc<dyn Fn(T) -> BoxFuture<'static, eyre::Result<()>> + Send + Sync>;

/// Current values held by [`GatewayState`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewaySettings {
    /// Public listener port. Empty means "not assigned yet".
    pub gateway_port: String,
    pub runtime_path: PathBuf,
    pub www_path: PathBuf,
}

#[derive(Default)]
struct Observers {
    gateway_port: Vec<Observer<String>>,
    runtime_path: Vec<Observer<PathBuf>>,
    www_path: Vec<Observer<PathBuf>>,
}

/// Explicitly owned gateway configuration, shared by handle.
///
/// Setter calls are serialized. Observers must not call back into a setter
/// of the same state, since that would wait on the call that is running them.
pub struct GatewayState {
    settings: ArcSwap<GatewaySettings>,
    observers: Mutex<Observers>,
}

impl GatewayState {
    pub fn new(settings: GatewaySettings) -> Self {
        Self {
            settings: ArcSwap::from_pointee(settings),
            observers: Mutex::new(Observers::default()),
        }
    }

    pub fn snapshot(&self) -> Arc<GatewaySettings> {
        self.settings.load_full()
    }

    pub fn gateway_port(&self) -> String {
        self.settings.load().gateway_port.clone()
    }

    pub fn runtime_path(&self) -> PathBuf {
        self.settings.load().runtime_path.clone()
    }

    pub fn www_path(&self) -> PathBuf {
        self.settings.load().www_path.clone()
    }

    pub async fn on_gateway_port_change<F, Fut>(&self, observer: F)
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = eyre::Result<()>> + Send + 'static,
    {
        self.observers
            .lock()
            .await
            .gateway_port
            .push(boxed(observer));
    }

    pub async fn on_runtime_path_change<F, Fut>(&self, observer: F)
    where
        F: Fn(PathBuf) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = eyre::Result<()>> + Send + 'static,
    {
        self.observers
            .lock()
            .await
            .runtime_path
            .push(boxed(observer));
    }

    pub async fn on_www_path_change<F, Fut>(&self, observer: F)
    where
        F: Fn(PathBuf) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = eyre::Result<()>> + Send + 'static,
    {
        self.observers.lock().await.www_path.push(boxed(observer));
    }

    pub async fn set_gateway_port(&self, port: impl Into<String>) -> GatewayResult<()> {
        let port = port.into();
        let observers = self.observers.lock().await;
        tracing::info!(port = %port, "Gateway port change requested");
        self.apply(
            "gateway_port",
            &observers.gateway_port,
            port,
            |settings, value| settings.gateway_port = value,
        )
        .await
    }

    pub async fn set_runtime_path(&self, path: impl Into<PathBuf>) -> GatewayResult<()> {
        let path = path.into();
        let observers = self.observers.lock().await;
        tracing::info!(path = %path.display(), "Runtime path change requested");
        self.apply(
            "runtime_path",
            &observers.runtime_path,
            path,
            |settings, value| settings.runtime_path = value,
        )
        .await
    }

    pub async fn set_www_path(&self, path: impl Into<PathBuf>) -> GatewayResult<()> {
        let path = path.into();
        let observers = self.observers.lock().await;
        tracing::info!(path = %path.display(), "WWW path change requested");
        self.apply(
            "www_path",
            &observers.www_path,
            path,
            |settings, value| settings.www_path = value,
        )
        .await
    }

    /// Record `value`, run `observers`, restore the previous settings on failure.
    ///
    /// Callers hold the observer lock, which serializes every setter.
    async fn apply<T: Clone>(
        &self,
        field: &'static str,
        observers: &[Observer<T>],
        value: T,
        assign: impl FnOnce(&mut GatewaySettings, T),
    ) -> GatewayResult<()> {
        let previous = self.settings.load_full();
        let mut next = (*previous).clone();
        assign(&mut next, value.clone());
        self.settings.store(Arc::new(next));

        for (index, observer) in observers.iter().enumerate() {
            if let Err(cause) = observer(value.clone()).await {
                tracing::error!(
                    field,
                    observer = index,
                    error = %cause,
                    "Change observer failed, restoring previous value"
                );
                self.settings.store(previous);
                return Err(GatewayError::ObserverFailure { field, cause });
            }
        }

        Ok(())
    }
}

fn boxed<T, F, Fut>(observer: F) -> Observer<T>
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = eyre::Result<()>> + Send + 'static,
{
    Arc::new(move |value| Box::pin(observer(value)) as BoxFuture<'static, eyre::Result<()>>)
}
