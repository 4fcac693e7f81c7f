//! nbdeploy - Entry Point
//!
//! Deploys a notebook as a pipeline through the RPC bridge of its kernel.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use nbdeploy::app::options::AppOptions;
use nbdeploy::app::run::run;
use nbdeploy::deploy::fsm::AttemptPhase;
use nbdeploy::filesys::file::File;
use nbdeploy::logs::{init_logging, LogLevel, LogOptions};
use nbdeploy::models::deployment::DeploymentType;
use nbdeploy::report::present_unhandled;
use nbdeploy::storage::layout::StorageLayout;
use nbdeploy::storage::settings::Settings;
use nbdeploy::surface::terminal::TerminalSurface;
use nbdeploy::surface::Surface;
use nbdeploy::utils::version_info;

use tracing::{error, info, warn};

const USAGE: &str = "Usage: nbdeploy --notebook=<path.ipynb> [--type=compile|upload|run] \
[--debug] [--yes|--no] [--settings=<file>] [--jupyter-url=<url>] [--token=<token>] \
[--kernel=<name>] [--path=<server path>] [--log-level=<level>] [--json-logs] [--no-watch]";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Failed to print version: {e}"),
        }
        return;
    }
    if cli_args.contains_key("help") {
        println!("{}", USAGE);
        return;
    }

    let Some(notebook) = cli_args.get("notebook").cloned() else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };

    // Retrieve the settings file
    let layout = StorageLayout::default();
    let settings_file = match cli_args.get("settings") {
        Some(path) => File::new(PathBuf::from(path)),
        None => layout.settings_file(),
    };
    let (mut settings, settings_error) = if settings_file.exists().await {
        match settings_file.read_json::<Settings>().await {
            Ok(settings) => (settings, None),
            Err(e) => (Settings::default(), Some(e)),
        }
    } else {
        (Settings::default(), None)
    };
    apply_cli_overrides(&mut settings, &cli_args);

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        log_dir: settings.log_dir.as_ref().map(PathBuf::from),
        json_format: cli_args.contains_key("json-logs"),
        ..Default::default()
    };
    let log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };
    if let Some(e) = settings_error {
        warn!(
            "Unable to read settings file {}, using defaults: {}",
            settings_file.path().display(),
            e
        );
    }

    let surface: Arc<dyn Surface> = match assume_yes(&cli_args) {
        Some(answer) => Arc::new(TerminalSurface::with_assume_yes(answer)),
        None => Arc::new(TerminalSurface::new()),
    };

    let mut options = AppOptions::from_settings(&settings, PathBuf::from(&notebook));
    if let Some(path) = cli_args.get("path") {
        options.server_path = path.clone();
    }
    if let Some(deployment_type) = cli_args.get("type") {
        match deployment_type.parse::<DeploymentType>() {
            Ok(deployment_type) => options.deployment_type = deployment_type,
            Err(e) => {
                error!("{}", e);
                eprintln!("{}", USAGE);
                std::process::exit(2);
            }
        }
    }
    if cli_args.contains_key("debug") {
        options.debug = true;
    }
    if cli_args.contains_key("no-watch") {
        options.watch_runs = false;
    }

    info!("Running nbdeploy {} with options: {:?}", version.version, options);
    let exit_code = match run(options, surface.clone(), await_shutdown_signal()).await {
        Ok(AttemptPhase::Completed) => 0,
        Ok(phase) => {
            info!("Deployment ended {:?}", phase);
            1
        }
        Err(e) => {
            present_unhandled(surface.as_ref(), &anyhow::Error::new(e)).await;
            1
        }
    };

    // flush the log file before exiting
    drop(log_guard);
    std::process::exit(exit_code);
}

fn apply_cli_overrides(settings: &mut Settings, cli_args: &HashMap<String, String>) {
    if let Some(url) = cli_args.get("jupyter-url") {
        settings.jupyter.base_url = url.clone();
    }
    if let Some(token) = cli_args.get("token") {
        settings.jupyter.token = Some(token.clone());
    } else if let Ok(token) = env::var("JUPYTER_TOKEN") {
        settings.jupyter.token.get_or_insert(token);
    }
    if let Some(kernel) = cli_args.get("kernel") {
        settings.jupyter.kernel_name = kernel.clone();
    }
    if let Some(level) = cli_args.get("log-level") {
        match level.parse::<LogLevel>() {
            Ok(level) => settings.log_level = level,
            Err(e) => eprintln!("{e}"),
        }
    }
}

fn assume_yes(cli_args: &HashMap<String, String>) -> Option<bool> {
    if cli_args.contains_key("yes") {
        Some(true)
    } else if cli_args.contains_key("no") {
        Some(false)
    } else {
        None
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                return std::future::pending().await;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
            return std::future::pending().await;
        }
        info!("Ctrl+C received, shutting down...");
    }
}
