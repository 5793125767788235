use crate::database::Database;
use crate::repositories::{PgChannelStore, PgRequestLogSink};
use crate::router::router::create_app_router;
use fennel_core::client::{AdapterFactory, ClientFactory};
use fennel_core::config::loader::{get_config_path, load_config};
use fennel_core::config::model::Config;
use fennel_core::store::{ChannelStore, MemoryChannelStore};
use fennel_loadbalance::LoadBalanceService;
use fennel_relay::{FeedbackQueue, LoadBalancedHandler, RelayEngine, RequestLogSink, TracingLogSink};

use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// 应用状态，包含负载均衡服务
#[derive(Clone)]
pub struct AppState {
    pub load_balancer: Arc<LoadBalanceService>,
    pub handler: Arc<LoadBalancedHandler>,
    pub config: Arc<Config>,
    pub database: Option<Database>,
}

impl AppState {
    /// 从配置文件创建应用状态
    pub async fn new() -> Result<Self> {
        let config = load_config()?;
        info!("Configuration loaded successfully from: {}", get_config_path());
        Self::from_config(config).await
    }

    /// 按配置选择存储后端：配置了数据库地址时使用 PostgreSQL，否则使用内存存储
    pub async fn from_config(config: Config) -> Result<Self> {
        let adapters: Arc<dyn AdapterFactory> =
            Arc::new(ClientFactory::new(config.settings.relay.connect_timeout()));

        match config.settings.database.url.clone() {
            Some(url) => {
                let database = Database::new(&url, &config.settings.database).await?;
                database.run_migrations().await?;
                info!("Database connected and migrations applied");

                let store: Arc<dyn ChannelStore> = Arc::new(PgChannelStore::new(database.clone()));
                let log_sink: Arc<dyn RequestLogSink> =
                    Arc::new(PgRequestLogSink::new(database.clone()));
                Self::with_components(config, store, adapters, log_sink, Some(database)).await
            }
            None => {
                info!("No database configured, using in-memory channel store");
                Self::with_components(
                    config,
                    Arc::new(MemoryChannelStore::new()),
                    adapters,
                    Arc::new(TracingLogSink),
                    None,
                )
                .await
            }
        }
    }

    /// 用给定的存储、适配器工厂和日志落点组装应用
    pub async fn with_components(
        config: Config,
        store: Arc<dyn ChannelStore>,
        adapters: Arc<dyn AdapterFactory>,
        log_sink: Arc<dyn RequestLogSink>,
        database: Option<Database>,
    ) -> Result<Self> {
        let load_balancer = Arc::new(LoadBalanceService::new(&config, store, adapters.clone()).await?);

        load_balancer.start();

        let relay_settings = config.settings.relay.clone();
        let (feedback, _worker) = FeedbackQueue::spawn(
            load_balancer.balancer(),
            relay_settings.feedback_queue_capacity,
        );
        let engine = Arc::new(RelayEngine::new(
            load_balancer.balancer(),
            feedback,
            adapters,
            log_sink,
            relay_settings,
        ));
        let handler = Arc::new(LoadBalancedHandler::new(engine));

        Ok(Self {
            load_balancer,
            handler,
            config: Arc::new(config),
            database,
        })
    }

    /// 停止应用
    pub async fn shutdown(&self) {
        info!("Shutting down application...");
        self.load_balancer.stop().await;
        info!("Application shutdown complete");
    }
}

/// 创建应用路由
pub fn create_app(state: AppState) -> Router {
    create_app_router().with_state(state)
}

/// 启动应用服务器
pub async fn start_server() -> Result<()> {
    // 初始化日志 - 完全依赖RUST_LOG环境变量
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_file(true)
        .with_line_number(true)
        .init();

    info!("Starting Fennel API server...");
    info!("Configuration file: {}", get_config_path());

    let app_state = match AppState::new().await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize application: {:#}", e);
            return Err(e);
        }
    };

    let app = create_app(app_state.clone());

    let bind_addr = std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "127.0.0.1:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("Server listening on http://{}", addr);
    info!("Available endpoints:");
    info!("  GET  /                          - API information");
    info!("  GET  /health                    - Health check");
    info!("  GET  /v1/models                 - List models (OpenAI compatible)");
    info!("  POST /v1/chat/completions       - Chat completions");
    info!("  POST /v1/completions            - Text completions");
    info!("  POST /v1/embeddings             - Embeddings");
    info!("  POST /v1/audio/speech           - Text to speech");
    info!("  POST /v1/audio/transcriptions   - Audio transcription");
    info!("  POST /v1/audio/translations     - Audio translation");
    info!("  POST /v1/images/generations     - Image generation");
    info!("  POST /v1/images/edits           - Image edit");
    info!("  POST /v1/images/variations      - Image variation");

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install CTRL+C signal handler: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal);

    if let Err(e) = server.await {
        error!("Server error: {}", e);
        app_state.shutdown().await;
        return Err(e.into());
    }

    app_state.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::router::index;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum_test::TestServer;

    #[tokio::test]
    async fn test_index_endpoint() {
        let app = Router::new().route("/", get(index));
        let server = TestServer::new(app).unwrap();

        let response = server.get("/").await;
        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(response.text(), "Fennel - Load Balanced LLM Relay Gateway");
    }

    #[tokio::test]
    async fn test_memory_backend_without_database() {
        let mut config = Config::default();
        config.settings.health_check.enabled = false;
        let state = AppState::from_config(config).await.unwrap();
        assert!(state.database.is_none());
        assert!(state.load_balancer.balancer().channels().is_empty());
        state.shutdown().await;
    }
}
