mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, patch, post},
};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use canvas_api::auth::{self, AppState, AppStateInner};
use canvas_api::export::{ChromiumRenderer, Exporter};
use canvas_api::file_store::FileStore;
use canvas_api::middleware::require_auth;
use canvas_api::{boards, cards, connections, emails, files, search, shares, tags};
use canvas_mail::{Ingestor, SmtpMailer};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "canvas=debug,canvas_api=debug,canvas_mail=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;
    if !config.has_usable_secret() {
        eprintln!("FATAL: CANVAS_JWT_SECRET is unset or still a placeholder.");
        eprintln!("       Set it in your .env file and restart.");
        std::process::exit(1);
    }
    if !config.imap.is_configured() {
        warn!("IMAP_HOST not set, mail polling is disabled");
    }
    if !config.smtp.is_configured() {
        warn!("SMTP_HOST not set, sending boards is disabled");
    }

    // Init database
    let db = Arc::new(canvas_db::Database::open(&config.db_path)?);

    let renderer = Arc::new(ChromiumRenderer::new(config.chromium.clone()));
    let state: AppState = Arc::new(AppStateInner {
        db: db.clone(),
        jwt_secret: config.jwt_secret.clone(),
        files: FileStore::new(config.upload_dir.clone()),
        ingestor: Ingestor::new(db, config.email_attach_dir.clone()),
        imap: config.imap.clone(),
        mailer: Arc::new(SmtpMailer::new(config.smtp.clone())),
        exporter: Exporter::new(renderer, config.export_dir.clone(), config.public_url.clone()),
    });

    // Routes
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/s/{share_id}", get(shares::get_public))
        .route("/s/{share_id}/data", get(shares::get_public_data))
        .with_state(state.clone());

    let protected_routes = Router::new()
        // Boards
        .route("/boards", get(boards::get_dashboard).post(boards::post_board))
        .route(
            "/boards/{board_id}",
            get(boards::get_board_handler)
                .patch(boards::patch_board)
                .delete(boards::remove_board),
        )
        .route("/boards/{board_id}/settings", post(boards::post_settings))
        .route("/boards/{board_id}/members", post(boards::post_member))
        .route("/boards/{board_id}/members/{user_id}", delete(boards::delete_member))
        // Cards
        .route("/boards/{board_id}/cards", get(cards::get_cards).post(cards::post_card))
        .route("/cards/{card_id}", patch(cards::patch_card).delete(cards::remove_card))
        // Files
        .route("/cards/{card_id}/files", post(files::upload_files))
        .route("/files/{file_id}", delete(files::remove_file))
        .route("/boards/{board_id}/images", get(files::get_images))
        // Tags
        .route("/cards/{card_id}/tags", post(tags::post_tag))
        .route("/cards/{card_id}/tags/{tag_id}", delete(tags::delete_tag))
        // Connections
        .route("/boards/{board_id}/connections", post(connections::post_connection))
        .route("/connections/{connection_id}", delete(connections::remove_connection))
        // Search
        .route("/search/tags", get(search::get_tag_search))
        .route("/boards/{board_id}/search", get(search::get_board_search))
        // Emails
        .route("/emails", get(emails::get_emails))
        .route("/emails/poll", post(emails::post_poll))
        .route("/emails/{email_id}", get(emails::get_email))
        .route("/emails/{email_id}/assign", post(emails::post_assign))
        .route("/emails/{email_id}/ignore", post(emails::post_ignore))
        // Shares and export
        .route("/boards/{board_id}/share", post(shares::post_share))
        .route("/shares/{share_id}/revoke", post(shares::post_revoke))
        .route(
            "/boards/{board_id}/export",
            get(shares::export_handler).post(shares::export_handler),
        )
        .route("/boards/{board_id}/send", post(shares::post_send))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .nest_service("/static/uploads", ServeDir::new(&config.upload_dir))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Canvas server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(e) => {
                warn!("failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
