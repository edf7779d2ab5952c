mod routes;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{crate_authors, crate_description, crate_version, Parser};
use fleetctl_engine::telemetry::LogFormat;
use fleetctl_engine::{telemetry, DeploymentController, Store};
use fleetctl_k8s_util::KubeOrchestrator;
use kube::config::{
    AuthInfo, Cluster, Context, Kubeconfig, KubeConfigOptions, NamedAuthInfo, NamedCluster,
    NamedContext,
};
use kube::Config;
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};

use routes::AppState;

#[derive(Parser, Debug)]
#[command(
    name = "fleetctl",
    about = crate_description!(),
    version = crate_version!(),
    author = crate_authors!("\n"),
)]
struct Args {
    /// Listen on the given address
    #[arg(long, default_value = ":8081", env)]
    host: String,

    /// Path to the YAML configuration file
    #[arg(long, env)]
    config: PathBuf,

    /// Set the logging level (panic|fatal|error|warn|info|debug)
    #[arg(long, default_value = "info", env)]
    log_level: String,

    /// Set the log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, env)]
    log_format: LogFormat,

    /// Orchestrator API host; when unset, falls back to `kube::Config::infer()`
    #[arg(long, env = "KUBE_HOST")]
    kube_host: Option<String>,

    /// Orchestrator API username
    #[arg(long, env = "KUBE_USER")]
    kube_user: Option<String>,

    /// Orchestrator API password
    #[arg(long, env = "KUBE_PASS")]
    kube_pass: Option<String>,

    /// Orchestrator API bearer token
    #[arg(long, env = "KUBE_TOKEN")]
    kube_token: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = telemetry::init(&args.log_level, args.log_format) {
        eprintln!("failed to initialize logging: {e}");
        std::process::exit(1);
    }

    if let Err(e) = run(args).await {
        tracing::error!("startup failed: {e:#}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let store = Arc::new(Store::load_from_path(&args.config)?);

    let kube_config = match args.kube_host {
        Some(host) => build_explicit_kubeconfig(host, args.kube_user, args.kube_pass, args.kube_token)
            .await?,
        None => Config::infer().await?,
    };
    let client = kube::Client::try_from(kube_config)?;
    let orchestrator = KubeOrchestrator::new(client);

    let controller = DeploymentController::new(orchestrator, store, args.config.clone());
    let state = AppState { controller };

    let app = routes::build_router(state);
    let bind_addr = normalize_host(&args.host);
    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "management surface listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Builds a `kube::Config` from discrete CLI flags by assembling a minimal in-memory
/// kubeconfig, since `kube::Config`'s own auth fields are private to the `kube` crate.
async fn build_explicit_kubeconfig(
    host: String,
    user: Option<String>,
    pass: Option<String>,
    token: Option<String>,
) -> anyhow::Result<Config> {
    const CLUSTER: &str = "fleetctl-cluster";
    const USER: &str = "fleetctl-user";
    const CONTEXT: &str = "fleetctl-context";

    let kubeconfig = Kubeconfig {
        clusters: vec![NamedCluster {
            name: CLUSTER.to_string(),
            cluster: Some(Cluster {
                server: Some(host),
                ..Default::default()
            }),
        }],
        auth_infos: vec![NamedAuthInfo {
            name: USER.to_string(),
            auth_info: Some(AuthInfo {
                username: user,
                password: pass.map(Into::into),
                token: token.map(Into::into),
                ..Default::default()
            }),
        }],
        contexts: vec![NamedContext {
            name: CONTEXT.to_string(),
            context: Some(Context {
                cluster: CLUSTER.to_string(),
                user: USER.to_string(),
                namespace: None,
                extensions: None,
            }),
        }],
        current_context: Some(CONTEXT.to_string()),
        ..Default::default()
    };

    Ok(Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?)
}

fn normalize_host(host: &str) -> String {
    if let Some(port) = host.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else {
        host.to_string()
    }
}

async fn shutdown_signal() {
    let mut sigterm =
        signal(SignalKind::terminate()).expect("failed to install SIGTERM signal handler");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigterm.recv() => {},
    }
}
