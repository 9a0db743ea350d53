//! Streamium - streaming controller endpoints over WebSockets and HTTP

use std::path::PathBuf;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::broadcast;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use uuid::Uuid;

use streamium::app::metrics;
use streamium::error::Result;
use streamium::flow::{self, Flow};
use streamium::{Config, ControllerDescriptor, MethodDescriptor, Registry, Server};

fn main() -> Result<()> {
    let args = Args::parse();

    if args.version {
        print_version();
        return Ok(());
    }

    if args.gen_config {
        println!(
            "{}",
            serde_json::to_string_pretty(&Config::example()).unwrap()
        );
        return Ok(());
    }

    // Load configuration first so the log level can come from it.
    let config = if let Some(path) = args.config {
        Config::load(&path)?
    } else {
        info!("No config file specified, using defaults");
        Config::default()
    };

    let log_level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .or_else(|| config.log.level.parse().ok())
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    info!("Streamium v{} starting...", env!("CARGO_PKG_VERSION"));

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config))?;

    info!("Goodbye!");
    Ok(())
}

async fn run(config: Config) -> Result<()> {
    let registry = demo_registry(&config.route_prefix)?;
    let server = Server::new(registry).with_backing(config.slot_backing);
    let cancel = server.cancellation();

    let (shutdown_tx, _) = broadcast::channel(1);
    let metrics_handle = match &config.metrics {
        Some(m) => {
            let addr = m
                .listen
                .parse()
                .map_err(|_| streamium::Error::Config(format!("Invalid metrics address: {}", m.listen)))?;
            let shutdown_rx = shutdown_tx.subscribe();
            Some(tokio::spawn(async move {
                metrics::start_metrics_server(addr, shutdown_rx).await;
            }))
        }
        None => None,
    };

    let listen = config.listen.clone();
    let server_handle = tokio::spawn(async move { server.run(&listen).await });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    cancel.cancel();
    let _ = shutdown_tx.send(());

    if let Ok(result) = server_handle.await {
        result?;
    }
    if let Some(handle) = metrics_handle {
        let _ = handle.await;
    }
    Ok(())
}

/// Demo controllers showing the three endpoint shapes.
fn demo_registry(route_prefix: &str) -> Result<Arc<Registry>> {
    let registry = Registry::builder()
        .route_prefix(route_prefix)
        .controller(
            ControllerDescriptor::new("echo", EchoController::default).route(
                MethodDescriptor::new("go")
                    .text("msg")
                    .handler(|_, call| Ok(flow::once(call.text("msg")))),
            ),
        )
        .controller(
            ControllerDescriptor::new("sum", SumController::default).route(
                MethodDescriptor::new("go")
                    .inbound("left")
                    .inbound("right")
                    .handler(|_, call| {
                        let left = call.inbound::<i64>("left");
                        let right = call.inbound::<i64>("right");
                        let merged = futures_util::stream::select(left, right);
                        let rolling = merged.scan(0i64, |acc, item| {
                            let next = item.map(|v| {
                                *acc += v;
                                *acc
                            });
                            futures_util::future::ready(Some(next))
                        });
                        Ok(Box::pin(rolling) as Flow<i64>)
                    }),
            ),
        )
        .controller(
            ControllerDescriptor::new("session", SessionController::default).route(
                MethodDescriptor::new("new")
                    .plain_http()
                    .handler(|_, _| Ok(flow::once(Uuid::new_v4().to_string()))),
            ),
        )
        .build()?;
    Ok(Arc::new(registry))
}

#[derive(Default)]
struct EchoController;

#[derive(Default)]
struct SumController;

#[derive(Default)]
struct SessionController;

/// Command line arguments
struct Args {
    config: Option<PathBuf>,
    gen_config: bool,
    version: bool,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let mut config = None;
        let mut gen_config = false;
        let mut version = false;

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "-c" | "--config" => {
                    if i + 1 < args.len() {
                        config = Some(PathBuf::from(&args[i + 1]));
                        i += 1;
                    }
                }
                "--gen-config" => gen_config = true,
                "-v" | "--version" => version = true,
                "-h" | "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                arg if !arg.starts_with('-') && config.is_none() => {
                    // Positional argument: treat as config file
                    config = Some(PathBuf::from(arg));
                }
                _ => {}
            }
            i += 1;
        }

        Self {
            config,
            gen_config,
            version,
        }
    }
}

fn print_help() {
    println!(
        r#"Streamium - streaming controller endpoints over WebSockets and HTTP

USAGE:
    streamium [OPTIONS]

OPTIONS:
    -c, --config <FILE>     Path to configuration file
    --gen-config            Print an example config
    -v, --version           Print version information
    -h, --help              Print help information

EXAMPLES:
    streamium -c config.json
    streamium --gen-config > config.json

DEMO ENDPOINTS:
    GET /echo/go?msg=hello   One-value echo (WebSocket or HTTP)
    GET /sum/go              Rolling sum of the 'left' and 'right' streams (WebSocket)
    GET /session/new         Fresh session id (plain HTTP, single value)
"#
    );
}

fn print_version() {
    println!("Streamium v{}", env!("CARGO_PKG_VERSION"));
    println!("Streaming controller endpoints over WebSockets and HTTP");
}
