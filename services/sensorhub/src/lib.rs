//! Sensorhub - role-gated dashboard service for the IoT sensor platform
//!
//! Talks to the platform's REST backend on behalf of signed-in users, keeps
//! polled snapshots of devices, sensors and users, and serves the dashboard
//! pages and JSON API.

pub mod access;
pub mod api;
pub mod cards;
pub mod config;
pub mod dashboard;
pub mod devices;
pub mod error;
pub mod io;
pub mod item;
pub mod nav;
pub mod notice;
pub mod poller;
pub mod sensors;
pub mod series;
pub mod session;
pub mod state;
pub mod table;
pub mod upload;
pub mod users;


pub use config::{load_config, Config};
pub use error::{Result, SensorhubError};

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::access::{default_tools, RoleResolver, RouteTable};
use crate::api::ApiClient;
use crate::config::IdentityConfig;
use crate::dashboard::DashboardState;
use crate::io::{HttpClient, ReqwestHttpClient};
use crate::poller::Poller;
use crate::session::{FileTokenProvider, MissingTokenProvider, StaticTokenProvider, TokenProvider};
use crate::state::StateHandle;
use crate::users::BackendRoleResolver;

/// Assembles a [`Sensorhub`] from configuration
pub struct SensorhubBuilder {
    config: Config,
    http: Option<Arc<dyn HttpClient>>,
    resolver: Option<Arc<dyn RoleResolver>>,
}

impl SensorhubBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            http: None,
            resolver: None,
        }
    }

    /// Use this HTTP client instead of reqwest
    pub fn with_http_client(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = Some(http);
        self
    }

    /// Resolve roles with this resolver instead of the backend's user records
    pub fn with_role_resolver(mut self, resolver: Arc<dyn RoleResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn build(self) -> Result<Sensorhub> {
        self.config.validate()?;
        let config = Arc::new(self.config);

        let http = match self.http {
            Some(http) => http,
            None => Arc::new(ReqwestHttpClient::with_timeout(config.api.request_timeout)?),
        };
        let api = ApiClient::new(Arc::clone(&config), http, poller_tokens(&config.identity));
        let resolver = self
            .resolver
            .unwrap_or_else(|| Arc::new(BackendRoleResolver::new(api.clone())));
        let routes = RouteTable::build(default_tools(), &config.dashboard.fallback_path);
        tracing::debug!(
            "Built {} routes under {}",
            routes.routes().len(),
            routes.root()
        );

        Ok(Sensorhub {
            state: state::new_state_handle(&config.notices),
            config,
            api,
            resolver,
            routes: Arc::new(routes),
            cancel: CancellationToken::new(),
        })
    }
}

fn poller_tokens(identity: &IdentityConfig) -> Arc<dyn TokenProvider> {
    if let Some(path) = &identity.id_token_file {
        tracing::debug!("Poller token read from {:?}", path);
        Arc::new(FileTokenProvider::new(path.clone()))
    } else if let Some(token) = &identity.id_token {
        Arc::new(StaticTokenProvider::new(token.clone()))
    } else {
        tracing::warn!("No identity token configured; background polling will fail");
        Arc::new(MissingTokenProvider)
    }
}

/// A configured service, ready to start
pub struct Sensorhub {
    config: Arc<Config>,
    api: ApiClient,
    resolver: Arc<dyn RoleResolver>,
    routes: Arc<RouteTable>,
    state: StateHandle,
    cancel: CancellationToken,
}

impl Sensorhub {
    pub fn state(&self) -> StateHandle {
        Arc::clone(&self.state)
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Token that stops the service when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The dashboard router, wired to this service's state
    pub fn router(&self) -> axum::Router {
        dashboard::build_router(DashboardState {
            state: Arc::clone(&self.state),
            routes: Arc::clone(&self.routes),
            resolver: Arc::clone(&self.resolver),
            api: self.api.clone(),
        })
    }

    /// Run until ctrl-c or cancellation
    pub async fn start(self) -> Result<()> {
        let cancel_for_signal = self.cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for ctrl-c: {}", e);
                return;
            }
            tracing::info!("Shutdown signal received");
            cancel_for_signal.cancel();
        });

        if self.config.dashboard.enabled {
            let dashboard_port = self.config.dashboard.port;
            let router = self.router();
            let cancel_for_dashboard = self.cancel.clone();

            tokio::spawn(async move {
                let addr = SocketAddr::from(([0, 0, 0, 0], dashboard_port));
                let listener = match tokio::net::TcpListener::bind(addr).await {
                    Ok(l) => l,
                    Err(e) => {
                        tracing::error!(
                            "Failed to bind dashboard to port {}: {}. Continuing without dashboard.",
                            dashboard_port,
                            e
                        );
                        return;
                    }
                };
                tracing::info!("Dashboard listening on http://{}", addr);

                axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        cancel_for_dashboard.cancelled().await;
                    })
                    .await
                    .ok();

                tracing::debug!("Dashboard stopped");
            });
        }

        let poller = Poller::new(
            self.api.clone(),
            &self.config.polling,
            Arc::clone(&self.state),
            self.cancel.clone(),
        );
        tracing::info!(
            "Sensorhub started, polling {:?} every {:?}",
            poller.resources(),
            self.config.polling.interval
        );

        // Blocks until cancelled
        poller.run().await;

        tracing::info!("Sensorhub stopped");
        Ok(())
    }
}
