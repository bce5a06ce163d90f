use std::fs;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{TcpListener, UnixListener, UnixStream};
use tokio::sync::broadcast;

use dockhand_core::{config::dockhand_root, Action, Config, ServiceName};
use dockhand_reconcile::{Controller, Job};

use crate::dispatch::DaemonState;
use crate::error::{io_err, DaemonError};
use crate::http::build_router;
use crate::paths::socket_path;
use crate::protocol::{DaemonRequest, DaemonResponse};

/// Webhook listener settings resolved from [`Config::http`].
#[derive(Debug, Clone)]
pub struct HttpListener {
    pub bind: String,
    pub token: Option<String>,
}

impl HttpListener {
    pub fn from_config(config: &Config) -> Option<Self> {
        config.http.enabled.then(|| Self {
            bind: config.http.bind.clone(),
            token: config.http.token.clone(),
        })
    }
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path, config: Config, log_json: bool) -> Result<(), DaemonError> {
    init_tracing(log_json);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf(), config))
}

/// Run the daemon with the git and compose collaborators from `config`.
pub async fn run(home: PathBuf, config: Config) -> Result<(), DaemonError> {
    let controller = Controller::from_config(&config, &home)?;
    tracing::info!(
        repository = %config.repository,
        branch = %config.branch,
        working_copy = %controller.working_copy().display(),
        "daemon starting",
    );
    let state = DaemonState::new(controller, config.admission);
    serve(home, state, HttpListener::from_config(&config)).await
}

/// Serve the control socket (and the webhook, when given) until `stop` or a
/// termination signal.
pub async fn serve(
    home: PathBuf,
    state: Arc<DaemonState>,
    http: Option<HttpListener>,
) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        let state = state.clone();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let result = socket_server_task(home, state, shutdown.clone(), shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let http_handle = {
        let shutdown = shutdown_tx.clone();
        let state = state.clone();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let result = match http {
                Some(listener) => http_task(listener, state, shutdown_rx).await,
                None => Ok(()),
            };
            if result.is_err() {
                let _ = shutdown.send(());
            }
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move { signal_task(shutdown, shutdown_rx).await })
    };

    let (socket_result, http_result, signal_result) =
        tokio::join!(socket_handle, http_handle, signal_handle);

    handle_join("socket_server", socket_result)?;
    handle_join("http_server", http_result)?;
    handle_join("signal_handler", signal_result)?;
    tracing::info!("daemon stopped");
    Ok(())
}

async fn signal_task(
    shutdown: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())
        .map_err(|err| DaemonError::Protocol(format!("SIGTERM handler failed: {err}")))?;
    tokio::select! {
        _ = shutdown_rx.recv() => Ok(()),
        _ = terminate.recv() => {
            tracing::info!("received SIGTERM, shutting down daemon");
            let _ = shutdown.send(());
            Ok(())
        }
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => {
                tracing::info!("received ctrl-c, shutting down daemon");
                let _ = shutdown.send(());
                Ok(())
            }
            Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
        },
    }
}

async fn http_task(
    listener: HttpListener,
    state: Arc<DaemonState>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let label = format!("http://{}", listener.bind);
    let tcp = TcpListener::bind(&listener.bind)
        .await
        .map_err(|e| io_err(&label, e))?;
    if listener.token.as_deref().map_or(true, str::is_empty) {
        tracing::warn!("webhook has no token configured; every request will be refused");
    }
    tracing::info!(bind = %listener.bind, "webhook listening");

    let app = build_router(state, listener.token);
    axum::serve(tcp, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await
        .map_err(|e| io_err(&label, e))
}

async fn socket_server_task(
    home: PathBuf,
    state: Arc<DaemonState>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let socket = socket_path(&home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "control socket listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let state = state.clone();
                let shutdown_tx = shutdown_tx.clone();
                let socket = socket.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, state, shutdown_tx, socket).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    state: Arc<DaemonState>,
    shutdown_tx: broadcast::Sender<()>,
    socket: PathBuf,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: DaemonRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let response = match request.cmd.as_str() {
            "status" => DaemonResponse::ok(state.status_payload(&socket).await),
            "stop" => {
                let _ = shutdown_tx.send(());
                DaemonResponse::ok(json!({ "stopping": true }))
            }
            "update" => run_job(&state, Job::Pass).await,
            cmd => match (direct_action(cmd), request.service.as_deref()) {
                (Some(action), Some(service)) if !service.is_empty() => {
                    let job = Job::Direct {
                        action,
                        service: ServiceName::from(service),
                    };
                    run_job(&state, job).await
                }
                (Some(_), _) => DaemonResponse::error(format!("'{cmd}' requires a service")),
                (None, _) => DaemonResponse::error(format!("unknown command '{cmd}'")),
            },
        };

        write_response(&mut writer, &response).await?;
        if request.cmd == "stop" {
            break;
        }
    }

    Ok(())
}

async fn run_job(state: &DaemonState, job: Job) -> DaemonResponse {
    match state.dispatch(job, "socket").await {
        Ok(outcome) => match serde_json::to_value(&outcome) {
            Ok(data) => DaemonResponse::ok(data),
            Err(err) => DaemonResponse::error(format!("failed to encode outcome: {err}")),
        },
        Err(err) => DaemonResponse::error(err.to_string()),
    }
}

fn direct_action(cmd: &str) -> Option<Action> {
    match cmd {
        "up" => Some(Action::Up),
        "down" => Some(Action::Down),
        "restart" => Some(Action::Restart),
        _ => None,
    }
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    let root = dockhand_root(home);
    if !root.exists() {
        fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let mut payload = serde_json::to_string(response)?;
    payload.push('\n');
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

/// `RUST_LOG` wins; otherwise `info`. JSON lines when `json` is set.
pub fn init_tracing(json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_target(false);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}
