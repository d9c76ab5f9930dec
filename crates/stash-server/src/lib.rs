pub mod auth;
pub mod dirs;
pub mod exposure;
pub mod handlers;
pub mod sanitize;
pub mod server;
pub mod session;
pub mod store;

/// Shared application state threaded through axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub files: store::FileStore,
    pub texts: store::TextStore,
    pub sessions: session::SessionRegistry,
    /// Marks issued session cookies `Secure` when serving HTTPS.
    pub tls_enabled: bool,
}

pub use server::{resolve_data_dir, router, run, ServerConfig};
