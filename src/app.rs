use crate::{
    auditlog::{AuditLog, DbAuditLog},
    callflow::{CallFlow, CallbackUrls},
    config::Config,
    directory::{DbDirectory, Directory},
    handler::middleware::request_log::log_requests,
    models::create_db,
    notify::{NotificationManagerBuilder, NotificationSender},
};
use anyhow::Result;
use axum::{middleware, Router};
use sea_orm::DatabaseConnection;
use std::{net::SocketAddr, sync::Arc};
use tokio::{net::TcpListener, select};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::info;

pub struct AppStateInner {
    pub config: Arc<Config>,
    pub audit: Arc<dyn AuditLog>,
    pub directory: Arc<dyn Directory>,
    pub flow: CallFlow,
    pub notifier: NotificationSender,
    pub token: CancellationToken,
}

pub type AppState = Arc<AppStateInner>;

pub struct AppStateBuilder {
    pub config: Option<Config>,
    pub db: Option<DatabaseConnection>,
    pub audit: Option<Arc<dyn AuditLog>>,
    pub directory: Option<Arc<dyn Directory>>,
    pub notifier: Option<NotificationSender>,
    pub seed_source: Option<fn() -> u64>,
}

impl AppStateBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            db: None,
            audit: None,
            directory: None,
            notifier: None,
            seed_source: None,
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_db(mut self, db: DatabaseConnection) -> Self {
        self.db = Some(db);
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_directory(mut self, directory: Arc<dyn Directory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn with_notification_sender(mut self, sender: NotificationSender) -> Self {
        self.notifier = Some(sender);
        self
    }

    pub fn with_seed_source(mut self, seed_source: fn() -> u64) -> Self {
        self.seed_source = Some(seed_source);
        self
    }

    pub async fn build(self) -> Result<AppState> {
        let config = Arc::new(self.config.unwrap_or_default());
        let token = CancellationToken::new();

        let db = match self.db {
            Some(db) => db,
            None => create_db(&config.database_url).await?,
        };
        let audit = self
            .audit
            .unwrap_or_else(|| Arc::new(DbAuditLog::new(db.clone())));
        let directory = self
            .directory
            .unwrap_or_else(|| Arc::new(DbDirectory::new(db)));

        let notifier = match self.notifier {
            Some(sender) => sender,
            None => {
                let mut manager = NotificationManagerBuilder::new()
                    .with_cancel_token(token.child_token())
                    .with_config(config.notifier.clone())
                    .build();
                let sender = manager.sender.clone();
                tokio::spawn(async move {
                    manager.serve().await;
                });
                sender
            }
        };

        let mut flow = CallFlow::new(
            config.voice.clone(),
            CallbackUrls::new(&config.public_url),
        );
        if let Some(seed_source) = self.seed_source {
            flow = flow.with_seed_source(seed_source);
        }

        Ok(Arc::new(AppStateInner {
            config,
            audit,
            directory,
            flow,
            notifier,
            token,
        }))
    }
}

impl Default for AppStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
            axum::http::header::ORIGIN,
        ]);
    let skip_paths = Arc::new(state.config.skip_access_log_paths.clone());

    crate::handler::router()
        .with_state(state)
        .layer(cors)
        .layer(middleware::from_fn_with_state(skip_paths, log_requests))
}

pub async fn run(state: AppState, router: Router) -> Result<()> {
    let token = state.token.clone();
    let addr: SocketAddr = state.config.http_addr.parse()?;
    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind to {}: {}", addr, e);
            return Err(anyhow::anyhow!("Failed to bind to {}: {}", addr, e));
        }
    };
    info!("listening on {}, callbacks via {}", addr, state.config.public_url);

    let http_task = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    );

    select! {
        http_result = http_task => {
            match http_result {
                Ok(_) => info!("Server shut down gracefully"),
                Err(e) => {
                    tracing::error!("Server error: {}", e);
                    return Err(anyhow::anyhow!("Server error: {}", e));
                }
            }
        }
        _ = token.cancelled() => {
            info!("Application shutting down due to cancellation");
        }
    }
    token.cancel();
    Ok(())
}
