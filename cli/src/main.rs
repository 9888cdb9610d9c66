use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use flexport_core::auth::Credentials;
use flexport_core::backends::http::HttpBackend;
use flexport_core::config::ClientConfig;
use flexport_core::events::{Notice, NoticeReceiver};
use flexport_core::files::{human_readable_size, RemotePath};
use flexport_core::remote::{RemoteConnection, RemoteProtocol};
use flexport_core::session::UploadSession;
use flexport_core::transfer::{parse_links, LocalFile};
use flexport_core::SessionOrchestrator;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_CONFIG: &str = "flexport.json";

type Client = SessionOrchestrator<HttpBackend>;

fn print_usage() {
    eprintln!("Usage: flexport [--config FILE] [--user NAME] <command> [args]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  ls [PATH]                         List a directory (default: home)");
    eprintln!("  df                                Show storage usage");
    eprintln!("  sessions [--watch] [--all]        Show upload sessions");
    eprintln!("  upload DIR FILE...                Upload local files into DIR");
    eprintln!("  links DIR [LINK...]               Fetch links into DIR (stdin if none)");
    eprintln!("  remote-ls PROTO HOST USER [PATH]  List an FTP/SFTP server");
    eprintln!("  remote-get PROTO HOST USER DIR INTO NAME...");
    eprintln!("                                    Copy remote files into INTO");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config FILE  Client config (default: {DEFAULT_CONFIG})");
    eprintln!("  --user NAME    Login name (or FLEXPORT_USER)");
    eprintln!("  --version      Print version and exit");
    eprintln!("  --help         Print this help message");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  FLEXPORT_PASSWORD         Login password");
    eprintln!("  FLEXPORT_REMOTE_PASSWORD  Password for remote-ls / remote-get");
    eprintln!("  FLEXPORT_BASE_URL         Overrides baseUrl from the config");
    eprintln!("  RUST_LOG                  Log filter (default: info)");
}

#[derive(Debug, PartialEq)]
enum Command {
    List {
        path: String,
    },
    Space,
    Sessions {
        watch: bool,
        all: bool,
    },
    Upload {
        dir: String,
        files: Vec<PathBuf>,
    },
    Links {
        dir: String,
        links: Vec<String>,
    },
    RemoteList {
        protocol: RemoteProtocol,
        host: String,
        user: String,
        path: String,
    },
    RemoteGet {
        protocol: RemoteProtocol,
        host: String,
        user: String,
        dir: String,
        into: String,
        names: Vec<String>,
    },
}

#[derive(Debug, PartialEq)]
struct Options {
    config: PathBuf,
    user: Option<String>,
    command: Command,
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut config = PathBuf::from(DEFAULT_CONFIG);
    let mut user = None;
    let mut rest = args;

    loop {
        match rest.first().map(String::as_str) {
            Some("--config") => {
                let value = rest.get(1).ok_or("--config needs a value")?;
                config = PathBuf::from(value);
                rest = &rest[2..];
            }
            Some("--user") => {
                let value = rest.get(1).ok_or("--user needs a value")?;
                user = Some(value.clone());
                rest = &rest[2..];
            }
            _ => break,
        }
    }

    let (name, params) = rest.split_first().ok_or("Missing command")?;
    let command = match name.as_str() {
        "ls" => Command::List {
            path: params.first().cloned().unwrap_or_else(|| "/".to_string()),
        },
        "df" => Command::Space,
        "sessions" => {
            let mut watch = false;
            let mut all = false;
            for flag in params {
                match flag.as_str() {
                    "--watch" => watch = true,
                    "--all" => all = true,
                    other => return Err(format!("Unknown sessions flag: {other}")),
                }
            }
            Command::Sessions { watch, all }
        }
        "upload" => match params {
            [dir, files @ ..] if !files.is_empty() => Command::Upload {
                dir: dir.clone(),
                files: files.iter().map(PathBuf::from).collect(),
            },
            _ => return Err("upload needs a directory and at least one file".into()),
        },
        "links" => match params {
            [dir, links @ ..] => Command::Links {
                dir: dir.clone(),
                links: links.to_vec(),
            },
            [] => return Err("links needs a directory".into()),
        },
        "remote-ls" => match params {
            [protocol, host, user, path @ ..] if path.len() <= 1 => Command::RemoteList {
                protocol: protocol.parse()?,
                host: host.clone(),
                user: user.clone(),
                path: path.first().cloned().unwrap_or_else(|| "/".to_string()),
            },
            _ => return Err("remote-ls needs PROTO HOST USER [PATH]".into()),
        },
        "remote-get" => match params {
            [protocol, host, user, dir, into, names @ ..] if !names.is_empty() => {
                Command::RemoteGet {
                    protocol: protocol.parse()?,
                    host: host.clone(),
                    user: user.clone(),
                    dir: dir.clone(),
                    into: into.clone(),
                    names: names.to_vec(),
                }
            }
            _ => return Err("remote-get needs PROTO HOST USER DIR INTO NAME...".into()),
        },
        other => return Err(format!("Unknown command: {other}")),
    };

    Ok(Options {
        config,
        user,
        command,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        None => {
            print_usage();
            std::process::exit(1);
        }
        Some("--version") => {
            println!("flexport {}", VERSION);
            return Ok(());
        }
        Some("--help") => {
            print_usage();
            return Ok(());
        }
        Some(_) => {}
    }

    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(msg) => {
            eprintln!("{}", msg);
            print_usage();
            std::process::exit(1);
        }
    };

    // Logs go to stderr so listings on stdout stay pipeable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&options.config)?;
    info!("flexport {} using {}", VERSION, config.base_url());

    let backend = Arc::new(HttpBackend::new(&config).context("Failed to build HTTP client")?);
    let (client, notices) = SessionOrchestrator::new(backend, config);
    tokio::spawn(report_notices(notices));

    sign_in(&client, options.user).await?;
    run(&client, options.command).await
}

fn load_config(path: &Path) -> anyhow::Result<ClientConfig> {
    let mut config = ClientConfig::load_from(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    if let Ok(url) = std::env::var("FLEXPORT_BASE_URL") {
        config.base_url = url;
    }
    config.validate()?;
    Ok(config)
}

async fn sign_in(client: &Client, user: Option<String>) -> anyhow::Result<()> {
    if client.init().await? {
        return Ok(());
    }
    let username = match user.or_else(|| std::env::var("FLEXPORT_USER").ok()) {
        Some(username) => username,
        None => bail!("Not logged in: pass --user or set FLEXPORT_USER"),
    };
    let password =
        std::env::var("FLEXPORT_PASSWORD").context("FLEXPORT_PASSWORD is not set")?;
    client
        .login(Credentials::new(username, password))
        .await
        .context("Login failed")?;
    Ok(())
}

async fn report_notices(mut notices: NoticeReceiver) {
    while let Some(notice) = notices.recv().await {
        match notice {
            Notice::Info(msg) => info!("{}", msg),
            Notice::Error(msg) => warn!("{}", msg),
            Notice::SessionExpired => warn!("Login expired, please sign in again"),
        }
    }
}

async fn run(client: &Client, command: Command) -> anyhow::Result<()> {
    match command {
        Command::List { path } => {
            client.navigate_to(&RemotePath::normalize(&path)?).await?;
            print_listing(client);
        }
        Command::Space => {
            let usage = client.refresh_space_usage().await?;
            println!(
                "{} used of {} ({} free, {:.1}%)",
                human_readable_size(usage.used),
                human_readable_size(usage.total),
                human_readable_size(usage.available),
                usage.used_fraction() * 100.0
            );
        }
        Command::Sessions { watch, all } => {
            client.set_show_finished_sessions(all);
            show_sessions(client, watch).await?;
        }
        Command::Upload { dir, files } => {
            let dir = RemotePath::normalize(&dir)?;
            let mut local = Vec::with_capacity(files.len());
            for path in &files {
                let data = tokio::fs::read(path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                local.push(LocalFile::new(name, data));
            }
            let report = client
                .upload_files_to(&dir, local, |progress| {
                    info!(
                        "Uploaded {}/{} ({}%)",
                        progress.completed,
                        progress.total,
                        progress.percent()
                    );
                })
                .await?;
            for (name, reason) in &report.failed {
                eprintln!("{}: {}", name, reason);
            }
            let uploaded = report.into_result()?;
            println!("Uploaded {} file(s) to {}", uploaded.len(), dir);
        }
        Command::Links { dir, links } => {
            let links = if links.is_empty() {
                let text = std::io::read_to_string(std::io::stdin())
                    .context("Failed to read links from stdin")?;
                parse_links(&text)
            } else {
                links
            };
            client.navigate_to(&RemotePath::normalize(&dir)?).await?;
            let count = client.submit_links(&links).await?;
            println!("Submitted {} link(s)", count);
        }
        Command::RemoteList {
            protocol,
            host,
            user,
            path,
        } => {
            let browser = client.remote_browser(remote_connection(protocol, host, user));
            browser.load(&RemotePath::normalize(&path)?).await?;
            println!("{}", browser.current_path());
            for entry in browser.entries().iter() {
                let kind = if entry.is_directory { "d" } else { "-" };
                println!(
                    "{} {:>10} {:<20} {}",
                    kind,
                    human_readable_size(entry.size),
                    entry.modified_time.as_deref().unwrap_or(""),
                    entry.name
                );
            }
        }
        Command::RemoteGet {
            protocol,
            host,
            user,
            dir,
            into,
            names,
        } => {
            let browser = client.remote_browser(remote_connection(protocol, host, user));
            browser.load(&RemotePath::normalize(&dir)?).await?;
            for name in &names {
                if !browser.toggle_selection(name) {
                    bail!("{} is not a file in {}", name, dir);
                }
            }
            let report = client
                .download_remote_selected(&browser, Some(RemotePath::normalize(&into)?))
                .await?;
            for (name, reason) in &report.failed {
                eprintln!("{}: {}", name, reason);
            }
            let started = report.into_result()?;
            println!("Started {} transfer(s) into {}", started.len(), into);
        }
    }
    Ok(())
}

fn remote_connection(protocol: RemoteProtocol, host: String, user: String) -> RemoteConnection {
    let password = std::env::var("FLEXPORT_REMOTE_PASSWORD").unwrap_or_default();
    RemoteConnection::new(protocol, host, user, password)
}

fn print_listing(client: &Client) {
    let nav = client.navigation();
    println!("{}", nav.current_path);
    for entry in client.visible_entries() {
        let suffix = if entry.is_directory { "/" } else { "" };
        println!(
            "{} {:<8} {:<8} {:>10} {}{}",
            entry.permission_string(),
            entry.owner,
            entry.group,
            human_readable_size(entry.size),
            entry.name,
            suffix
        );
    }
    if let Some(usage) = client.space_usage() {
        println!(
            "{} of {} used",
            human_readable_size(usage.used),
            human_readable_size(usage.total)
        );
    }
}

fn print_sessions(sessions: &[UploadSession]) {
    if sessions.is_empty() {
        println!("No sessions");
        return;
    }
    for session in sessions {
        println!(
            "{:<12} {:<12} {:>3}% {} {}",
            session.id,
            session.status.as_str(),
            session.progress_percent,
            session.started_at,
            session.detail_text
        );
    }
}

/// Print sessions once the first poll lands; with `watch`, reprint on every
/// change until Ctrl-C.
async fn show_sessions(client: &Client, watch: bool) -> anyhow::Result<()> {
    let tick = Duration::from_millis(200);
    let first_poll_deadline = client.config().request_timeout();
    let mut shown = client.sessions();
    client.set_sessions_visible(true);

    let first = tokio::time::timeout(first_poll_deadline, async {
        loop {
            tokio::time::sleep(tick).await;
            let current = client.sessions();
            if !Arc::ptr_eq(&shown, &current) || !client.is_polling() {
                return current;
            }
        }
    })
    .await;
    shown = match first {
        Ok(sessions) => sessions,
        Err(_) => bail!("Timed out waiting for sessions"),
    };
    if !client.is_polling() {
        bail!("Session polling stopped");
    }
    print_sessions(&client.visible_sessions());

    if !watch {
        client.set_sessions_visible(false);
        return Ok(());
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tokio::time::sleep(tick) => {
                if !client.is_polling() {
                    bail!("Session polling stopped");
                }
                let current = client.sessions();
                if !Arc::ptr_eq(&shown, &current) {
                    println!();
                    print_sessions(&client.visible_sessions());
                    shown = current;
                }
            }
        }
    }
    client.set_sessions_visible(false);
    Ok(())
}
