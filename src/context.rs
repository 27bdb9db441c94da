//! Application bootstrap and the guarded process-wide context.
//!
//! An [`Application`] bundles the container, an application cache and the
//! configuration facade. It is installed once into an [`AppContext`];
//! reading the context before that fails with
//! [`DiError::NotInitialized`] rather than handing out a default.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde_json::Value;

use crate::cache::MemoStore;
use crate::config::{Config, ConfigLoader};
use crate::container::Container;
use crate::error::{DiError, DiResult};
use crate::key::ServiceId;
use crate::middleware::Middleware;

static GLOBAL: AppContext = AppContext::new();

/// A bootstrapped application.
///
/// The container has the application's [`Config`] and cache bound under
/// their types, so factories can resolve them like any other service.
#[derive(Debug, Clone)]
pub struct Application {
    container: Container,
    cache: MemoStore<String, Value>,
    config: Config,
}

impl Application {
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::default()
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Application-level memo store.
    pub fn cache(&self) -> &MemoStore<String, Value> {
        &self.cache
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Builder for [`Application`].
#[derive(Default)]
pub struct ApplicationBuilder {
    container: Option<Container>,
    loaders: Vec<Arc<dyn ConfigLoader>>,
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl ApplicationBuilder {
    /// Uses an existing container instead of a fresh one.
    pub fn container(mut self, container: Container) -> Self {
        self.container = Some(container);
        self
    }

    pub fn config_loader<L: ConfigLoader + 'static>(mut self, loader: L) -> Self {
        self.loaders.push(Arc::new(loader));
        self
    }

    /// Adds container middleware, outermost first.
    pub fn middleware<M: Middleware>(mut self, middleware: M) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    pub fn build(self) -> Application {
        let container = self.container.unwrap_or_default();
        for middleware in self.middlewares {
            container.use_shared(middleware);
        }

        let mut config = Config::new();
        for loader in self.loaders {
            config.add_loader(loader);
        }
        let cache = MemoStore::new();

        container
            .bind_instance(ServiceId::of::<Config>(), config.clone())
            .bind_instance(ServiceId::of::<MemoStore<String, Value>>(), cache.clone());

        tracing::debug!(
            bindings = container.len(),
            middlewares = container.middleware_count(),
            loaders = config.loader_count(),
            "application built"
        );

        Application {
            container,
            cache,
            config,
        }
    }
}

/// Write-once slot holding the running [`Application`].
#[derive(Debug)]
pub struct AppContext {
    app: OnceCell<Arc<Application>>,
}

impl AppContext {
    pub const fn new() -> Self {
        Self {
            app: OnceCell::new(),
        }
    }

    /// Installs `app`. Fails if an application is already installed.
    pub fn bootstrap(&self, app: Application) -> DiResult<Arc<Application>> {
        let app = Arc::new(app);
        self.app
            .set(Arc::clone(&app))
            .map_err(|_| DiError::AlreadyInitialized("application context"))?;
        tracing::info!("application context initialized");
        Ok(app)
    }

    /// The installed application.
    pub fn current(&self) -> DiResult<Arc<Application>> {
        self.app
            .get()
            .cloned()
            .ok_or(DiError::NotInitialized("application context"))
    }

    pub fn is_initialized(&self) -> bool {
        self.app.get().is_some()
    }
}

impl Default for AppContext {
    fn default() -> Self {
        Self::new()
    }
}

/// The process-wide context.
pub fn global() -> &'static AppContext {
    &GLOBAL
}

/// Shorthand for `global().current()`.
pub fn app() -> DiResult<Arc<Application>> {
    GLOBAL.current()
}
