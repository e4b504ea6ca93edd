//! Command-line entry point for the SnapFlow notification client.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;

use snapflow_notify::api::{HttpNotificationApi, NotificationApi};
use snapflow_notify::config::{self, ClientConfig};
use snapflow_notify::credentials::{CredentialStore, SessionCredentials};
use snapflow_notify::csrf::CsrfTokenProvider;
use snapflow_notify::notifier::{DesktopNotifier, PermissionStore, TerminalPrompt};
use snapflow_notify::page::{PageLayout, build_page};
use snapflow_notify::push::EventStreamConnector;
use snapflow_notify::{ClientEvent, Command, NotificationClient, NotificationId, logging};

const APP_NAME: &str = "snapflow-notify";

fn main() {
    if let Err(err) = logging::init() {
        eprintln!("Logging disabled: {err}");
    }
    if let Err(err) = try_main() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

#[derive(Debug, PartialEq, Eq)]
enum CliCommand {
    Watch,
    Count,
    MarkRead(NotificationId),
    Delete(NotificationId),
    MarkAllRead,
    Login { session: String, csrf: String },
    Logout,
}

#[derive(Debug, PartialEq, Eq)]
struct CliArgs {
    config_path: Option<PathBuf>,
    server_url: Option<String>,
    command: CliCommand,
}

fn try_main() -> Result<(), String> {
    let args = parse_args(std::env::args().skip(1).collect())?;
    let config = load_config(&args)?;
    match args.command {
        CliCommand::Watch => watch(config),
        CliCommand::Count => {
            let count = http_api(&config)?.unread_count().map_err(|err| err.to_string())?;
            println!("{count}");
            Ok(())
        }
        CliCommand::MarkRead(id) => {
            let outcome = http_api(&config)?.mark_read(id).map_err(|err| err.to_string())?;
            println!("Marked {id} as read; {} unread", outcome.unread_count);
            Ok(())
        }
        CliCommand::Delete(id) => {
            http_api(&config)?.delete(id).map_err(|err| err.to_string())?;
            println!("Deleted {id}");
            Ok(())
        }
        CliCommand::MarkAllRead => {
            http_api(&config)?.mark_all_read().map_err(|err| err.to_string())?;
            println!("Marked all notifications as read");
            Ok(())
        }
        CliCommand::Login { session, csrf } => {
            let store = CredentialStore::new().map_err(|err| err.to_string())?;
            store
                .set(&SessionCredentials {
                    session_id: session,
                    csrf_token: csrf,
                })
                .map_err(|err| err.to_string())?;
            println!("Session saved");
            Ok(())
        }
        CliCommand::Logout => {
            let store = CredentialStore::new().map_err(|err| err.to_string())?;
            store.delete().map_err(|err| err.to_string())?;
            println!("Session removed");
            Ok(())
        }
    }
}

fn load_config(args: &CliArgs) -> Result<ClientConfig, String> {
    let path = match &args.config_path {
        Some(path) => path.clone(),
        None => config::config_path().map_err(|err| err.to_string())?,
    };
    let mut config = config::load_from(&path).map_err(|err| err.to_string())?;
    if let Some(server_url) = &args.server_url {
        config.server_url = server_url.clone();
    }
    Ok(config)
}

fn stored_credentials() -> Option<SessionCredentials> {
    let store = match CredentialStore::new() {
        Ok(store) => store,
        Err(err) => {
            tracing::warn!("Credential store unavailable: {err}");
            return None;
        }
    };
    match store.get() {
        Ok(credentials) => credentials,
        Err(err) => {
            tracing::warn!("Failed to read stored session: {err}");
            None
        }
    }
}

fn http_api(config: &ClientConfig) -> Result<HttpNotificationApi<SessionCredentials>, String> {
    let credentials = stored_credentials()
        .ok_or_else(|| format!("No stored session; run `{APP_NAME} login` first"))?;
    Ok(api_for(config, &credentials))
}

fn api_for(config: &ClientConfig, credentials: &SessionCredentials) -> HttpNotificationApi<SessionCredentials> {
    HttpNotificationApi::new(config.clone(), credentials.clone())
        .with_cookie_header(credentials.cookie_header(&config.csrf_cookie_name))
}

fn watch(config: ClientConfig) -> Result<(), String> {
    let credentials = stored_credentials()
        .ok_or_else(|| format!("No stored session; run `{APP_NAME} login` first"))?;
    let unread_count = api_for(&config, &credentials).unread_count().unwrap_or_else(|err| {
        tracing::warn!("Initial unread count unavailable: {err}");
        0
    });
    let mut page = build_page(
        &config,
        &PageLayout {
            unread_count,
            csrf_token: credentials.csrf_token(),
            ..PageLayout::default()
        },
    )
    .map_err(|err| err.to_string())?;
    if let Some(token) = credentials.csrf_token() {
        page.set_cookie(&config.csrf_cookie_name, &token);
    }
    let api = HttpNotificationApi::for_page(config.clone(), &page)
        .with_cookie_header(credentials.cookie_header(&config.csrf_cookie_name));

    let permission = PermissionStore::in_app_dir().map_err(|err| err.to_string())?;
    let notifier = DesktopNotifier::new(config.notification_title.clone(), permission, TerminalPrompt);
    let connector = EventStreamConnector::new(Some(credentials.cookie_header(&config.csrf_cookie_name)));

    let (tx, rx) = mpsc::channel();
    let mut client = NotificationClient::new(config, api, notifier, page, tx.clone())
        .with_push_connector(Box::new(connector));
    client.initialize();
    spawn_stdin_reader(tx)?;

    println!("{} unread", client.unread_count());
    let mut last_count = client.unread_count();
    client.run(&rx, |client| {
        if client.unread_count() != last_count {
            last_count = client.unread_count();
            println!("{last_count} unread");
        }
    });
    Ok(())
}

/// Forward stdin lines to the client loop; EOF shuts the loop down.
fn spawn_stdin_reader(events: mpsc::Sender<ClientEvent>) -> Result<(), String> {
    thread::Builder::new()
        .name("stdin-commands".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<Command>() {
                    Ok(command) => {
                        if events.send(ClientEvent::Command(command)).is_err() {
                            return;
                        }
                    }
                    Err(err) => eprintln!("{err}"),
                }
            }
            let _ = events.send(ClientEvent::Shutdown);
        })
        .map(|_| ())
        .map_err(|err| format!("Failed to start stdin reader: {err}"))
}

fn parse_args(args: Vec<String>) -> Result<CliArgs, String> {
    if args.is_empty() || args.iter().any(|a| a == "-h" || a == "--help") {
        return Err(help_text());
    }
    let mut config_path = None;
    let mut server_url = None;
    let mut session = None;
    let mut csrf = None;
    let mut positional = Vec::new();

    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        match arg.as_str() {
            "--config" => {
                config_path = Some(PathBuf::from(next_value(&args, &mut i, "--config")?));
            }
            "--server" => {
                server_url = Some(next_value(&args, &mut i, "--server")?);
            }
            "--session" => {
                session = Some(next_value(&args, &mut i, "--session")?);
            }
            "--csrf" => {
                csrf = Some(next_value(&args, &mut i, "--csrf")?);
            }
            flag if flag.starts_with("--") => {
                return Err(format!("Unknown argument '{flag}'\n\n{}", help_text()));
            }
            value => positional.push(value.to_string()),
        }
        i += 1;
    }

    let mut positional = positional.into_iter();
    let verb = positional
        .next()
        .ok_or_else(|| format!("Missing command\n\n{}", help_text()))?;
    let mut id = || -> Result<NotificationId, String> {
        let raw = positional
            .next()
            .ok_or_else(|| format!("'{verb}' needs a notification id"))?;
        raw.parse()
            .map_err(|_| format!("Invalid notification id '{raw}'"))
    };
    let command = match verb.as_str() {
        "watch" => CliCommand::Watch,
        "count" => CliCommand::Count,
        "mark-read" => CliCommand::MarkRead(id()?),
        "delete" => CliCommand::Delete(id()?),
        "mark-all-read" => CliCommand::MarkAllRead,
        "login" => CliCommand::Login {
            session: session.ok_or_else(|| "Missing --session".to_string())?,
            csrf: csrf.ok_or_else(|| "Missing --csrf".to_string())?,
        },
        "logout" => CliCommand::Logout,
        other => return Err(format!("Unknown command '{other}'\n\n{}", help_text())),
    };
    Ok(CliArgs {
        config_path,
        server_url,
        command,
    })
}

fn next_value(args: &[String], i: &mut usize, name: &str) -> Result<String, String> {
    let next = args.get(*i + 1).ok_or_else(|| format!("Missing value for {name}"))?;
    *i += 1;
    Ok(next.clone())
}

fn help_text() -> String {
    format!(
        "Usage: {APP_NAME} [--config <path>] [--server <url>] <command>\n\n\
Commands:\n\
  watch                                 Keep the badge in sync; reads commands from stdin\n\
  count                                 Print the unread count\n\
  mark-read <id>                        Mark one notification as read\n\
  delete <id>                           Delete one notification\n\
  mark-all-read                         Mark every notification as read\n\
  login --session <id> --csrf <token>   Store session credentials\n\
  logout                                Forget stored credentials\n\n\
Watch-mode input:\n\
  read <id> | delete <id> | read-all | refresh | quit\n"
    )
}
