use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::sync::Arc;
use tokio::sync::mpsc;

use hotswap_bot::application::messaging::LocalEventSource;
use hotswap_bot::domain::traits::ConfigStore;
use hotswap_bot::infrastructure::adapters::console::{self, ConsoleAdapter, CONSOLE_USER};
use hotswap_bot::infrastructure::config::{Config, FileConfigStore};
use hotswap_bot::infrastructure::plugins::LibraryResolver;
use hotswap_bot::plugins::{builtin, CompositeResolver, PluginManager, PluginResolver};

#[derive(Parser)]
#[command(name = "hotswap-bot")]
#[command(about = "A chat bot host with hot-swappable plugins", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.yaml", global = true)]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the host with the console front end
    Run {
        /// Send console lines as messages in this group
        #[arg(long)]
        group: Option<String>,
    },
    /// Show version
    Version,
    /// Write a default config file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// List available and enabled plugins
    Plugins,
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { group } => run_host(cli.config, group),
        Commands::Version => {
            println!("hotswap-bot v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::InitConfig { force } => init_config(&cli.config, force),
        Commands::Plugins => list_plugins(&cli.config),
    };

    if let Err(e) = result {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

/// Built-in plugins first, then libraries from the plugin directory
fn build_resolver(library: LibraryResolver) -> Arc<dyn PluginResolver> {
    Arc::new(CompositeResolver::new(vec![
        Arc::new(builtin::resolver()),
        Arc::new(library),
    ]))
}

fn run_host(config_path: PathBuf, group: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(FileConfigStore::open(&config_path)?);
    let config = store.config();
    tracing::info!("Starting {}", config.bot.name);

    let console_user = config
        .owners
        .first()
        .cloned()
        .unwrap_or_else(|| CONSOLE_USER.to_string());
    if !store.is_admin(&console_user) {
        tracing::warn!(user = %console_user, "Console user is not an owner, admin commands are ignored");
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let (tx, rx) = mpsc::unbounded_channel();
        let source = Arc::new(LocalEventSource::new().with_forward(tx));
        let printer = console::spawn_printer(rx);

        let library = LibraryResolver::new(&config.paths.plugins);
        if let Err(e) = library.clean_shadow_dir() {
            tracing::warn!(error = %e, "Failed to remove old shadow copies");
        }
        let manager = PluginManager::new(source.clone(), build_resolver(library), store.clone());
        let report = manager.load_enabled().await;
        for (name, e) in &report.failed {
            tracing::warn!(plugin = %name, "Not loaded: {}", e);
        }
        tracing::info!("Plugin host ready with {} plugins", report.loaded.len());

        let mut adapter = ConsoleAdapter::new(source.clone()).with_user(console_user);
        if let Some(group) = group {
            adapter = adapter.with_group(group);
        }

        tokio::select! {
            _ = adapter.run_stdin() => {}
            _ = manager.wait_for_shutdown() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
            }
        }

        manager.shutdown().await;
        drop(adapter);
        drop(source);
        // Let the printer flush the last replies
        if tokio::time::timeout(Duration::from_millis(200), printer).await.is_err() {
            tracing::debug!("Action printer still running at exit");
        }
    });

    tracing::info!("Bye");
    Ok(())
}

fn init_config(path: &Path, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() && !force {
        return Err(format!("{} already exists, use --force to overwrite", path.display()).into());
    }
    let mut config = Config::default();
    config.owners.push(CONSOLE_USER.to_string());
    config.save(path)?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

fn list_plugins(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let store = FileConfigStore::open(config_path)?;
    let config = store.config();
    let enabled = store.enabled_plugins();

    let available = build_resolver(LibraryResolver::new(&config.paths.plugins)).available();

    println!("Plugins:");
    for name in &available {
        let mark = if enabled.contains(name) { "on " } else { "off" };
        println!("  [{}] {}", mark, name);
    }
    for name in enabled.iter().filter(|n| !available.contains(n)) {
        println!("  [missing] {}", name);
    }
    Ok(())
}
