use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::{Client, StatusCode};
use tracing_subscriber::EnvFilter;

// ── CLI definition ─────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "stash", about = "stash — self-hosted file and text drop", version)]
struct Cli {
    /// Stash server URL (default: http://localhost:8081 or $STASH_SERVER)
    #[arg(long, env = "STASH_SERVER", default_value = "http://localhost:8081")]
    server: String,

    /// Operator password for client commands ($STASH_PASSWORD)
    #[arg(long, env = "STASH_PASSWORD")]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the stash HTTP server
    Serve {
        /// Host to bind (default: $STASH_HOST or 0.0.0.0)
        #[arg(long, env = "STASH_HOST", default_value = "0.0.0.0")]
        host: String,
    },
    /// Upload a file
    Upload {
        /// Path of the file to upload
        path: PathBuf,
    },
    /// List uploaded files
    Files,
    /// Download a file
    Download {
        /// Stored file name
        name: String,
        /// Where to write it (default: the stored name in the current dir)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Delete an uploaded file
    Remove {
        /// Stored file name
        name: String,
    },
    /// Save a text entry from a file or stdin
    Save {
        /// Text entry name
        name: String,
        /// Mark the text publicly readable
        #[arg(long)]
        open: bool,
        /// Read content from this file instead of stdin
        #[arg(long, short)]
        file: Option<PathBuf>,
    },
    /// Print a text entry's content
    Show {
        /// Text entry name
        name: String,
    },
    /// List text entries with their visibility
    Texts,
    /// Delete a text entry
    RemoveText {
        /// Text entry name
        name: String,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("STASH_LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { host } => {
            let cfg = stash_server::ServerConfig {
                host,
                ..stash_server::ServerConfig::default()
            };
            stash_server::run(cfg).await
        }

        Commands::Upload { ref path } => {
            let session = Session::open(&cli).await?;
            cmd_upload(&session, path).await
        }

        Commands::Files => {
            let session = Session::open(&cli).await?;
            cmd_files(&session).await
        }

        Commands::Download {
            ref name,
            ref output,
        } => {
            let session = Session::open(&cli).await?;
            cmd_download(&session, name, output.clone()).await
        }

        Commands::Remove { ref name } => {
            let session = Session::open(&cli).await?;
            cmd_remove(&session, name).await
        }

        Commands::Save {
            ref name,
            open,
            ref file,
        } => {
            let session = Session::open(&cli).await?;
            cmd_save(&session, name, open, file.clone()).await
        }

        Commands::Show { ref name } => {
            let session = Session::open(&cli).await?;
            cmd_show(&session, name).await
        }

        Commands::Texts => {
            let session = Session::open(&cli).await?;
            cmd_texts(&session).await
        }

        Commands::RemoveText { ref name } => {
            let session = Session::open(&cli).await?;
            cmd_remove_text(&session, name).await
        }
    }
}

// ── Session client ────────────────────────────────────────────────────────────

/// A logged-in HTTP client. The server binds sessions to a client
/// fingerprint, so the User-Agent is pinned and the login cookie is replayed
/// on every request.
struct Session {
    client: Client,
    server: String,
    cookie: String,
}

impl Session {
    async fn open(cli: &Cli) -> Result<Self> {
        let password = cli
            .password
            .as_deref()
            .context("password required: pass --password or set STASH_PASSWORD")?;
        let server = cli.server.trim_end_matches('/').to_owned();

        let client = Client::builder()
            .user_agent(concat!("stash/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build http client")?;

        let resp = client
            .post(format!("{server}/login"))
            .json(&serde_json::json!({ "password": password }))
            .send()
            .await
            .with_context(|| format!("connect to {server}"))?;

        if resp.status() == StatusCode::UNAUTHORIZED {
            anyhow::bail!("login rejected: wrong password");
        }
        if !resp.status().is_success() {
            anyhow::bail!("login failed: {}", resp.status());
        }

        let cookie = resp
            .headers()
            .get(SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .context("server sent no session cookie")?
            .to_owned();

        Ok(Self {
            client,
            server,
            cookie,
        })
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{path}", self.server))
            .header(COOKIE, &self.cookie)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}{path}", self.server))
            .header(COOKIE, &self.cookie)
    }

    fn delete(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .delete(format!("{}{path}", self.server))
            .header(COOKIE, &self.cookie)
    }
}

fn check(resp: &reqwest::Response) -> Result<()> {
    if !resp.status().is_success() {
        anyhow::bail!("server answered {}", resp.status());
    }
    Ok(())
}

// ── Command implementations ───────────────────────────────────────────────────

async fn cmd_upload(session: &Session, path: &std::path::Path) -> Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("read {}", path.display()))?;
    let name = path
        .file_name()
        .context("path has no file name")?
        .to_string_lossy()
        .into_owned();

    let part = reqwest::multipart::Part::bytes(bytes).file_name(name.clone());
    let form = reqwest::multipart::Form::new().part("file", part);

    let resp = session.post("/upload").multipart(form).send().await?;
    if resp.status() == StatusCode::BAD_REQUEST {
        anyhow::bail!("upload rejected (empty or larger than 50 MiB)");
    }
    check(&resp)?;
    println!("uploaded {name}");
    Ok(())
}

async fn cmd_files(session: &Session) -> Result<()> {
    let resp = session.get("/files").send().await?;
    check(&resp)?;
    let files: Vec<serde_json::Value> = resp.json().await.context("parse file listing")?;
    for f in files {
        println!(
            "{}\t{}",
            f["name"].as_str().unwrap_or_default(),
            f["size"].as_u64().unwrap_or_default()
        );
    }
    Ok(())
}

async fn cmd_download(session: &Session, name: &str, output: Option<PathBuf>) -> Result<()> {
    let resp = session.get(&format!("/files/{name}")).send().await?;
    if resp.status() == StatusCode::NOT_FOUND {
        anyhow::bail!("no such file: {name}");
    }
    check(&resp)?;
    let bytes = resp.bytes().await?;

    let target = output.unwrap_or_else(|| PathBuf::from(name));
    tokio::fs::write(&target, &bytes)
        .await
        .with_context(|| format!("write {}", target.display()))?;
    println!("wrote {} ({} bytes)", target.display(), bytes.len());
    Ok(())
}

async fn cmd_remove(session: &Session, name: &str) -> Result<()> {
    let resp = session.delete(&format!("/files/{name}")).send().await?;
    check(&resp)?;
    println!("removed {name}");
    Ok(())
}

async fn cmd_save(session: &Session, name: &str, open: bool, file: Option<PathBuf>) -> Result<()> {
    let content = match file {
        Some(path) => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("read {}", path.display()))?,
        None => std::io::read_to_string(std::io::stdin()).context("read stdin")?,
    };

    let resp = session
        .post(&format!("/txt/{name}"))
        .json(&serde_json::json!({ "content": content, "open": open }))
        .send()
        .await?;
    check(&resp)?;
    println!("saved {name} ({})", if open { "public" } else { "private" });
    Ok(())
}

async fn cmd_show(session: &Session, name: &str) -> Result<()> {
    let resp = session.get(&format!("/txt/{name}")).send().await?;
    if resp.status() == StatusCode::NOT_FOUND {
        anyhow::bail!("no such text: {name}");
    }
    check(&resp)?;
    println!("{}", resp.text().await?);
    Ok(())
}

async fn cmd_texts(session: &Session) -> Result<()> {
    let resp = session.get("/txts").send().await?;
    check(&resp)?;
    let texts: Vec<serde_json::Value> = resp.json().await.context("parse text listing")?;
    for t in texts {
        let open = t["open"].as_u64().unwrap_or(0) != 0;
        println!(
            "{}\t{}",
            t["name"].as_str().unwrap_or_default(),
            if open { "public" } else { "private" }
        );
    }
    Ok(())
}

async fn cmd_remove_text(session: &Session, name: &str) -> Result<()> {
    let resp = session.delete(&format!("/txt/{name}")).send().await?;
    check(&resp)?;
    println!("removed {name}");
    Ok(())
}
