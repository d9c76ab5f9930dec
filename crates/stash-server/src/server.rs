use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    auth::require_session,
    exposure,
    handlers::{
        check_auth, delete_file, delete_text, download_file, get_public_html, get_text, index,
        list_files, list_texts, login, save_text, upload_file, MAX_UPLOAD_BYTES,
    },
    session::{SessionRegistry, SESSION_TTL, SWEEP_INTERVAL},
    store::{FileStore, TextStore},
    AppState,
};

pub struct ServerConfig {
    pub host: String,
    /// Operator password; login is impossible without it, so `run` refuses
    /// to start when unset.
    pub password: Option<String>,
    pub data_dir: Option<PathBuf>,
    /// Where `fullchain.pem`/`privkey.pem` live (or get placed by certbot).
    pub ssl_dir: PathBuf,
    /// Domain + contact for certificate acquisition ($STASH_DOMAIN,
    /// $STASH_EMAIL). Both must be set for certbot to be attempted.
    pub domain: Option<String>,
    pub email: Option<String>,
    pub sweep_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("STASH_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            password: std::env::var("STASH_PASSWORD").ok(),
            data_dir: std::env::var("STASH_DATA_DIR").ok().map(PathBuf::from),
            ssl_dir: std::env::var("STASH_SSL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/ssl")),
            domain: std::env::var("STASH_DOMAIN").ok(),
            email: std::env::var("STASH_EMAIL").ok(),
            sweep_interval: SWEEP_INTERVAL,
        }
    }
}

/// Resolve the data directory holding the uploads and texts areas.
pub fn resolve_data_dir(data_dir: Option<&PathBuf>) -> Result<PathBuf> {
    match data_dir {
        Some(d) => {
            std::fs::create_dir_all(d).context("create data dir")?;
            Ok(d.clone())
        }
        None => crate::dirs::data_dir(),
    }
}

/// Build the full route table over `state`. Public routes first; everything
/// else sits behind the session middleware. `GET /txt/{name}` is public
/// because the handler itself decides between the open-text path and the
/// session-gated path.
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/", get(index))
        .route("/login", post(login))
        .route("/auth", get(check_auth))
        .route("/txt/{name}", get(get_text))
        .route("/h/{name}", get(get_public_html));

    let protected = Router::new()
        .route("/upload", post(upload_file))
        .route("/files", get(list_files))
        .route("/files/{name}", get(download_file).delete(delete_file))
        .route("/txt/{name}", post(save_text).delete(delete_text))
        .route("/txts", get(list_texts))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .with_state(state)
        // Above the app-level limit so oversized uploads reach the handler's
        // 400 path instead of dying in the transport as 413.
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + 1024 * 1024))
        .layer(TraceLayer::new_for_http())
}

pub async fn run(cfg: ServerConfig) -> Result<()> {
    let password = cfg
        .password
        .filter(|p| !p.is_empty())
        .context("STASH_PASSWORD environment variable is required")?;

    let data_dir = resolve_data_dir(cfg.data_dir.as_ref())?;
    info!(data_dir = %data_dir.display(), "using data directory");

    let files = FileStore::open(&data_dir.join("uploads")).context("open file store")?;
    let texts = TextStore::open(&data_dir.join("texts")).context("open text store")?;

    std::fs::create_dir_all(&cfg.ssl_dir).context("create ssl dir")?;
    let exposure =
        exposure::resolve(&cfg.ssl_dir, cfg.domain.as_deref(), cfg.email.as_deref()).await;

    let sessions = SessionRegistry::new(password, SESSION_TTL);
    let sweep = sessions.clone().spawn_sweep(cfg.sweep_interval);

    let state = AppState {
        files,
        texts,
        sessions,
        tls_enabled: exposure.tls_enabled(),
    };
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", cfg.host, exposure.port)
        .parse()
        .context("invalid host/port")?;
    info!(%addr, tls = exposure.tls_enabled(), "stash server listening");

    let served = match exposure.tls {
        Some(ref paths) => {
            let tls = RustlsConfig::from_pem_file(&paths.cert, &paths.key)
                .await
                .context("load TLS certificates")?;
            axum_server::bind_rustls(addr, tls)
                .serve(app.into_make_service_with_connect_info::<SocketAddr>())
                .await
        }
        None => {
            axum_server::bind(addr)
                .serve(app.into_make_service_with_connect_info::<SocketAddr>())
                .await
        }
    };

    // Serving only returns on failure; stop the sweep before reporting it.
    sweep.shutdown();
    served.context("server error")
}
