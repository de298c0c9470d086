// Framework bootstrap: tracing, config, loopback listener and command dispatch.

use crate::domain::errors::AuthError;
use crate::domain::ports::HostEnvironment;
use crate::frameworks::cli::{Cli, Command};
use crate::frameworks::config::{self, AppConfig, CALLBACK_PATH, PROVIDER_TIMEOUT};
use crate::interface_adapters::clients::{
    PortalClient, PortalClientError, ProviderClient, TokenExchangeSettings, UploadFile,
    mime_type_for_path,
};
use crate::interface_adapters::host::LoopbackHost;
use crate::interface_adapters::protocol::RegisterRequest;
use crate::interface_adapters::routes;
use crate::interface_adapters::state::{AppState, FileSessionStore, SystemClock};
use crate::use_cases::{HandshakeCoordinator, HandshakeSettings, ProviderSettings};

use std::error::Error;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

type Coordinator = HandshakeCoordinator<LoopbackHost, FileSessionStore, SystemClock>;

fn init_runtime() {
    // Load .env locally; safe to ignore when not present.
    let _ = dotenvy::dotenv();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    // Logs go to stderr so command output stays clean on stdout.
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .compact()
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%info, ?backtrace, "panic");
    }));
}

pub async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    init_runtime();
    let config = config::load()?;
    tracing::debug!(
        authorize_url = %config.authorize_url,
        callback_port = config.callback_port,
        session_file = %config.session_file.display(),
        "configuration loaded"
    );

    match cli.command {
        Command::SignIn => sign_in(&config).await,
        Command::SignOut => {
            offline_coordinator(&config).sign_out()?;
            println!("Signed out.");
            Ok(())
        }
        Command::Whoami => {
            match offline_coordinator(&config).current_identity() {
                Some(identity) => println!("{} <{}>", identity.name, identity.email),
                None => println!("Not signed in."),
            }
            Ok(())
        }
        Command::Register {
            email,
            name,
            password,
        } => register(&config, RegisterRequest {
            email,
            password,
            name,
        })
        .await,
        Command::Upload { files } => upload(&config, &files).await,
    }
}

fn origin_for(port: u16) -> String {
    format!("http://127.0.0.1:{port}")
}

fn redirect_uri(origin: &str) -> String {
    format!("{origin}{CALLBACK_PATH}")
}

// For commands that only touch the stored identity. They never open a window,
// so the provider registration is never sent anywhere.
fn offline_coordinator(config: &AppConfig) -> Coordinator {
    let host = LoopbackHost::new(origin_for(config.callback_port), config.browser.clone());
    let client_id = config.client_id.clone().unwrap_or_default();
    coordinator(config, host, client_id)
}

fn coordinator(config: &AppConfig, host: LoopbackHost, client_id: String) -> Coordinator {
    let provider = ProviderSettings {
        authorize_endpoint: config.authorize_url.clone(),
        client_id,
        redirect_uri: redirect_uri(&host.origin()),
        scopes: config.scopes.clone(),
    };
    HandshakeCoordinator::new(
        host,
        FileSessionStore::new(&config.session_file),
        SystemClock,
        HandshakeSettings::new(provider),
    )
}

async fn sign_in(config: &AppConfig) -> Result<(), Box<dyn Error>> {
    let client_id = config.require_client_id()?.to_string();
    let address = SocketAddr::from(([127, 0, 0, 1], config.callback_port));

    // Bind TCP listener with error handling
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .inspect_err(|e| {
            tracing::error!(%address, error = %e, "failed to bind");
        })?;
    let address = listener.local_addr()?;

    let origin = origin_for(address.port());
    let exchange = ProviderClient::new(
        TokenExchangeSettings {
            token_url: config.token_url.clone(),
            userinfo_url: config.userinfo_url.clone(),
            client_id: client_id.clone(),
            redirect_uri: redirect_uri(&origin),
            scopes: config.scopes.clone(),
        },
        PROVIDER_TIMEOUT,
    )?;
    let host = LoopbackHost::new(origin, config.browser.clone());
    let app = routes::app(AppState {
        host: host.clone(),
        exchange: Arc::new(exchange),
    });
    tracing::info!(%address, "listening for sign-in messages");

    // Serve app and report errors rather than panicking
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "server error");
        }
    });

    let coordinator = coordinator(config, host, client_id);
    let result = coordinator.sign_in().await;
    server.abort();

    match result {
        Ok(identity) => {
            println!("Signed in as {} <{}>", identity.name, identity.email);
            Ok(())
        }
        Err(err @ AuthError::PopupBlocked(_)) => {
            tracing::error!(error = %err, "check AUTH_BROWSER");
            Err(err.into())
        }
        Err(err) => {
            tracing::error!(error = %err, "sign-in failed");
            Err(err.into())
        }
    }
}

fn portal(config: &AppConfig) -> Result<PortalClient, Box<dyn Error>> {
    let client = PortalClient::new(config.api_url.clone(), config.api_timeout)?;
    tracing::debug!(
        api_url = %config.api_url,
        api_timeout_ms = config.api_timeout.as_millis(),
        "portal client configured"
    );
    Ok(client)
}

async fn register(config: &AppConfig, req: RegisterRequest) -> Result<(), Box<dyn Error>> {
    let response = portal(config)?
        .register(&req)
        .await
        .map_err(user_facing)?;

    let name = response
        .user
        .as_ref()
        .and_then(|user| user.get("name"))
        .and_then(|name| name.as_str())
        .unwrap_or(req.name.as_str());
    println!("Registered {name} <{}>", req.email);
    if let Some(token) = response.token {
        println!("token: {token}");
    }
    Ok(())
}

async fn upload(config: &AppConfig, paths: &[PathBuf]) -> Result<(), Box<dyn Error>> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        files.push(read_upload(path).await?);
    }

    let response = portal(config)?.upload(files).await.map_err(user_facing)?;
    if let Some(message) = response.message {
        println!("{message}");
    }
    for file in response.files.unwrap_or_default() {
        println!("{} ({}, {} bytes): {}", file.original_name, file.mimetype, file.size, file.url);
    }
    Ok(())
}

async fn read_upload(path: &Path) -> Result<UploadFile, String> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|err| format!("failed to read {}: {err}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    Ok(UploadFile {
        file_name,
        mime_type: mime_type_for_path(path).map(str::to_string),
        bytes,
    })
}

// Log the full error, hand the short one to the caller.
fn user_facing(err: PortalClientError) -> Box<dyn Error> {
    tracing::error!(error = %err, "portal request failed");
    err.user_message().into()
}
