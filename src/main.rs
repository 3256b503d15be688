use axum::{Router, routing::get, routing::post};
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use cited_chat::agent::QueryServiceClient;
use cited_chat::config::AppConfig;
use cited_chat::db::chat_repository::ChatRepository;
use cited_chat::db::message_repository::MessageRepository;
use cited_chat::errors::AppError;
use cited_chat::ingest::SessionRegistry;
use cited_chat::routes::api_routes::{
    ask_handler, create_chat_handler, delete_chat_handler, get_chat_handler, list_chats_handler,
    rename_chat_handler, replace_messages_handler,
};
use cited_chat::routes::ws_routes::ws_chat_handler;
use cited_chat::service::chat_service::ChatService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present (development convenience)
    dotenvy::dotenv().ok();

    // Initialise tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cited_chat=debug,tower_http=debug".into()),
        )
        .init();

    let config = AppConfig::from_env()?;

    // ── Database ──────────────────────────────────────────────────────────────
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .map_err(AppError::DatabaseConnectionFailed)?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("Database connection established and migrations applied");

    // ── Dependency wiring ─────────────────────────────────────────────────────
    let chat_repo = ChatRepository::new(pool.clone());
    let message_repo = MessageRepository::new(pool.clone());
    let agent = QueryServiceClient::new(&config.query_service_url);
    let sessions = SessionRegistry::new(config.ingest());
    let chat_service = ChatService::new(chat_repo, message_repo, agent, sessions);

    info!(
        "Answers stream from {} (chunk timeout {:?})",
        config.query_service_url, config.chunk_timeout
    );

    // ── Router ────────────────────────────────────────────────────────────────
    let app = Router::new()
        .route("/api/chats", get(list_chats_handler).post(create_chat_handler))
        .route(
            "/api/chats/{id}",
            get(get_chat_handler).patch(rename_chat_handler).delete(delete_chat_handler),
        )
        .route("/api/chats/{id}/messages", post(replace_messages_handler))
        .route("/api/chats/{id}/ask", post(ask_handler))
        .route("/ws/chat", get(ws_chat_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(chat_service);

    // ── Listen ────────────────────────────────────────────────────────────────
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{addr}/");

    axum::serve(listener, app).await?;
    Ok(())
}
