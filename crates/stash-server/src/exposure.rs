//! Network exposure bootstrap: decide port and TLS before the listener
//! starts. Port 80 occupied means another server owns plain HTTP on this
//! host, so we retreat to 8081. Otherwise HTTPS on 443 when certificates
//! are present in the ssl dir or can be obtained via certbot, plain HTTP
//! on 80 as the last resort.

use std::net::TcpListener;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

pub const HTTP_PORT: u16 = 80;
pub const HTTPS_PORT: u16 = 443;
pub const FALLBACK_PORT: u16 = 8081;

const CERT_FILE: &str = "fullchain.pem";
const KEY_FILE: &str = "privkey.pem";

/// PEM pair handed to the TLS acceptor.
#[derive(Debug, Clone)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Outcome of the bootstrap: where to listen and whether to wrap in TLS.
/// `tls_enabled()` also drives the session cookie's `Secure` flag.
#[derive(Debug, Clone)]
pub struct Exposure {
    pub port: u16,
    pub tls: Option<TlsPaths>,
}

impl Exposure {
    pub fn tls_enabled(&self) -> bool {
        self.tls.is_some()
    }
}

fn port_80_available() -> bool {
    TcpListener::bind(("0.0.0.0", HTTP_PORT)).is_ok()
}

fn tls_paths(ssl_dir: &Path) -> TlsPaths {
    TlsPaths {
        cert: ssl_dir.join(CERT_FILE),
        key: ssl_dir.join(KEY_FILE),
    }
}

fn certs_present(paths: &TlsPaths) -> bool {
    paths.cert.exists() && paths.key.exists()
}

/// Run `certbot certonly --standalone` for `domain` and copy the issued PEM
/// pair into the ssl dir, where later startups will find it directly.
async fn obtain_certificates(ssl_dir: &Path, domain: &str, email: &str) -> Result<()> {
    let status = tokio::process::Command::new("certbot")
        .args([
            "certonly",
            "--standalone",
            "-d",
            domain,
            "--non-interactive",
            "--agree-tos",
            "-m",
            email,
        ])
        .status()
        .await
        .context("run certbot")?;
    if !status.success() {
        anyhow::bail!("certbot exited with {status}");
    }

    let live = Path::new("/etc/letsencrypt/live").join(domain);
    for file in [CERT_FILE, KEY_FILE] {
        let bytes = std::fs::read(live.join(file)).with_context(|| format!("read issued {file}"))?;
        std::fs::write(ssl_dir.join(file), bytes)
            .with_context(|| format!("copy {file} into ssl dir"))?;
    }
    Ok(())
}

/// Decide the exposure for this startup. Never fails: every path degrades
/// to plain HTTP rather than refusing to start.
pub async fn resolve(ssl_dir: &Path, domain: Option<&str>, email: Option<&str>) -> Exposure {
    if !port_80_available() {
        info!(port = FALLBACK_PORT, "port 80 is taken; serving plain HTTP on fallback port");
        return Exposure {
            port: FALLBACK_PORT,
            tls: None,
        };
    }

    let paths = tls_paths(ssl_dir);
    if certs_present(&paths) {
        info!(cert = %paths.cert.display(), "found existing certificates; serving HTTPS");
        return Exposure {
            port: HTTPS_PORT,
            tls: Some(paths),
        };
    }

    if let (Some(domain), Some(email)) = (domain, email) {
        match obtain_certificates(ssl_dir, domain, email).await {
            Ok(()) => {
                info!(domain, "obtained certificates; serving HTTPS");
                return Exposure {
                    port: HTTPS_PORT,
                    tls: Some(paths),
                };
            }
            Err(e) => {
                warn!(error = %e, domain, "certificate acquisition failed; serving plain HTTP");
            }
        }
    }

    Exposure {
        port: HTTP_PORT,
        tls: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn certs_present_requires_both_files() {
        let dir = tempdir().unwrap();
        let paths = tls_paths(dir.path());
        assert!(!certs_present(&paths));

        std::fs::write(dir.path().join(CERT_FILE), b"cert").unwrap();
        assert!(!certs_present(&paths));

        std::fs::write(dir.path().join(KEY_FILE), b"key").unwrap();
        assert!(certs_present(&paths));
    }

    #[test]
    fn tls_paths_point_into_the_ssl_dir() {
        let paths = tls_paths(Path::new("/ssl"));
        assert_eq!(paths.cert, Path::new("/ssl/fullchain.pem"));
        assert_eq!(paths.key, Path::new("/ssl/privkey.pem"));
    }
}
