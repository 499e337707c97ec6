use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cas")]
#[command(about = "Command as a service: run pre-declared commands over HTTP", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Write a sample route file if none exists.
    Init {
        /// Config file path (default: CAS_CONFIG_PATH or ./config.yml)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Serve the configured routes. Each route path accepts POST with optional JSON overrides.
    Serve {
        /// Config file path (default: CAS_CONFIG_PATH or ./config.yml)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Port to listen on
        #[arg(long, short, default_value_t = cas_gateway::config::DEFAULT_PORT)]
        port: u16,

        /// Bind address
        #[arg(long, short, default_value = cas_gateway::config::DEFAULT_BIND)]
        bind: String,

        /// Log destination: stdout, stderr, a file path, or "" to disable logging
        #[arg(long, short, value_name = "TARGET", default_value = "stdout")]
        log: String,
    },
}

/// Where log records go.
#[derive(Debug, PartialEq, Eq)]
enum LogTarget {
    Stdout,
    Stderr,
    File(PathBuf),
    Off,
}

impl LogTarget {
    fn parse(s: &str) -> Self {
        match s.trim() {
            "stdout" => LogTarget::Stdout,
            "stderr" => LogTarget::Stderr,
            "" => LogTarget::Off,
            path => LogTarget::File(PathBuf::from(path)),
        }
    }
}

fn init_logging(target: &LogTarget) -> anyhow::Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    match target {
        LogTarget::Stdout => {
            builder.target(env_logger::Target::Stdout);
        }
        LogTarget::Stderr => {
            builder.target(env_logger::Target::Stderr);
        }
        LogTarget::File(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }
        LogTarget::Off => {
            builder.filter_level(log::LevelFilter::Off);
        }
    }
    builder.init();
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("cas {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            init_logging(&LogTarget::Stderr).ok();
            if let Err(e) = run_init(config) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Serve {
            config,
            port,
            bind,
            log,
        }) => {
            if let Err(e) = init_logging(&LogTarget::parse(&log)) {
                eprintln!("{}", e);
                std::process::exit(1);
            }
            if let Err(e) = run_serve(config, port, bind).await {
                log::error!("gateway failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(cas_gateway::config::default_config_path);
    if cas_gateway::init::init_config(&path)? {
        println!("wrote sample routes to {}", path.display());
    } else {
        println!("{} already exists; left unchanged", path.display());
    }
    Ok(())
}

async fn run_serve(config_path: Option<PathBuf>, port: u16, bind: String) -> anyhow::Result<()> {
    let (routes, path) = cas_gateway::config::load_routes(config_path)?;
    log::info!("loaded {} route(s) from {}", routes.len(), path.display());
    let config = cas_gateway::config::Config {
        server: cas_gateway::config::ServerConfig { bind, port },
        routes,
    };
    cas_gateway::gateway::run_gateway(config).await
}
