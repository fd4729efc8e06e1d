use anyhow::{Context, Result};
use awsf::aws::AwsClients;
use awsf::resource::{self, AwsSource, Resource, ResourceIndex, Service};
use awsf::search::{self, Query};
use awsf::shell::{self, FzfOptions, FzfOutcome, ShellResult};
use awsf::{Aggregator, Config, IndexStore, StoreError};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use crossterm::style::Stylize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Fuzzy finder for AWS resources
#[derive(Parser, Debug)]
#[command(
    name = "awsf",
    version = awsf::VERSION,
    about,
    long_about = None,
    args_conflicts_with_subcommands = true
)]
struct Cli {
    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Index file to use instead of the configured location
    #[arg(long, global = true)]
    index: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    search: SearchArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rebuild the resource index from AWS
    Refresh {
        /// AWS region (overrides the config file)
        #[arg(long)]
        region: Option<String>,

        /// AWS profile (overrides the config file)
        #[arg(long)]
        profile: Option<String>,
    },
    /// Search the index and open the selected resource in the AWS console
    Search(SearchArgs),
    /// Print the index as matcher lines
    List {
        /// Only list resources of this service
        service: Option<Service>,
    },
    /// Show or change settings
    Settings {
        #[command(subcommand)]
        action: Option<SettingsAction>,
    },
}

#[derive(ClapArgs, Debug, Default)]
struct SearchArgs {
    /// Print the console URL instead of opening the browser
    #[arg(long)]
    print: bool,

    /// Optional service name followed by a text filter
    #[arg(value_name = "QUERY")]
    query: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    /// Show current settings
    Show,
    /// Enable services
    Enable {
        #[arg(required_unless_present = "all")]
        services: Vec<Service>,

        /// Enable every service
        #[arg(long, conflicts_with = "services")]
        all: bool,
    },
    /// Disable services
    Disable {
        #[arg(required = true)]
        services: Vec<Service>,
    },
    /// Set the AWS region
    Region { region: String },
    /// Set the AWS profile (omit to use the default credential chain)
    Profile { profile: Option<String> },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let tracing_level = level.to_tracing_level()?;

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file {}: {}", log_path.display(), e);
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("awsf {} started with log level: {:?}", awsf::VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("awsf").join("awsf.log");
    }
    fallback_dir().join("awsf.log")
}

fn fallback_dir() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(".awsf"),
        None => PathBuf::from("."),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let _log_guard = setup_logging(cli.log_level);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{:#}", err);
            eprintln!("{} {:#}", "❌ Error:".red(), err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Configuration errors are fatal before any network call
    resource::validate_registry().context("Invalid service registry")?;

    let config_path = cli
        .config
        .clone()
        .or_else(Config::default_path)
        .unwrap_or_else(|| fallback_dir().join("config.json"));
    let config = Config::load_from(&config_path)?;
    tracing::debug!("Loaded config from {:?}", config_path);

    let index_path = cli
        .index
        .clone()
        .or_else(|| config.index_path.clone())
        .or_else(IndexStore::default_path)
        .unwrap_or_else(|| fallback_dir().join("resources.json"));
    let store = IndexStore::new(index_path);

    match cli.command {
        Some(Command::Refresh { region, profile }) => {
            refresh(&config, &store, region.as_deref(), profile.as_deref()).await
        }
        Some(Command::Search(args)) => run_search(&config, &store, &args),
        Some(Command::List { service }) => list(&config, &store, service),
        Some(Command::Settings { action }) => settings(
            config,
            &config_path,
            &store,
            action.unwrap_or(SettingsAction::Show),
        ),
        None => run_search(&config, &store, &cli.search),
    }
}

// =============================================================================
// Refresh
// =============================================================================

async fn refresh(
    config: &Config,
    store: &IndexStore,
    region: Option<&str>,
    profile: Option<&str>,
) -> Result<()> {
    let service_config = config.service_config(region, profile)?;

    println!(
        "🔄 Refreshing {} service(s) in {}{}",
        service_config.enabled_services.len(),
        service_config.aws_region,
        service_config
            .aws_profile
            .as_deref()
            .map(|p| format!(" (profile {})", p))
            .unwrap_or_default()
    );

    let clients = AwsClients::new(
        &service_config.aws_region,
        service_config.aws_profile.as_deref(),
    )
    .await;

    match clients.caller_identity().await {
        Ok(identity) => println!(
            "👤 Account {} as {}",
            identity.account,
            identity.principal()
        ),
        Err(e) => {
            tracing::warn!("GetCallerIdentity failed: {}", e);
            println!("{} Could not resolve caller identity: {}", "⚠️".yellow(), e.user_message());
        }
    }

    let previous = match store.load() {
        Ok(index) => Some(index),
        Err(StoreError::NotFound(_)) => None,
        Err(e) => {
            tracing::warn!("Ignoring previous index: {}", e);
            None
        }
    };

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let aggregator = Aggregator::new(Arc::new(AwsSource::new(clients)));
    let index = aggregator
        .aggregate_with_cancel(&service_config, cancel.clone())
        .await;
    ctrl_c.abort();

    if cancel.is_cancelled() {
        println!("{} Refresh interrupted, keeping what was fetched", "⚠️".yellow());
    }

    store
        .save(&index)
        .with_context(|| format!("Failed to save index to {}", store.path().display()))?;

    print_refresh_summary(&index, previous.as_ref());
    Ok(())
}

fn print_refresh_summary(index: &ResourceIndex, previous: Option<&ResourceIndex>) {
    for (service, count) in index.counts_by_service() {
        println!("   {:<32} {}", service_label(service), count);
    }

    if let Some(previous) = previous {
        let diff = index.diff(previous);
        if !diff.is_empty() {
            println!(
                "   {} / {} since last refresh",
                format!("+{}", diff.added.len()).green(),
                format!("-{}", diff.removed.len()).red()
            );
        }
    }

    if index.partial {
        println!(
            "{} Partial index: {} failed",
            "⚠️".yellow(),
            index
                .failed_services
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    for warning in &index.warnings {
        println!("   {} {}", "•".yellow(), warning);
    }

    println!(
        "{} Indexed {} resource(s)",
        "✅".green(),
        index.resources.len()
    );
}

// =============================================================================
// Search
// =============================================================================

fn load_index(store: &IndexStore) -> Result<ResourceIndex> {
    match store.load() {
        Ok(index) => Ok(index),
        Err(StoreError::NotFound(path)) => Err(anyhow::anyhow!(
            "No resource index at {}. Run: awsf refresh",
            path.display()
        )),
        Err(e) => Err(e).context("Failed to load resource index (run `awsf refresh` to rebuild it)"),
    }
}

fn warn_about_index(config: &Config, index: &ResourceIndex) {
    if index.is_stale(chrono::Utc::now(), config.index_max_age()) {
        eprintln!(
            "{} Index is from {}. Run: awsf refresh",
            "⚠️".yellow(),
            index.generated_at.format("%Y-%m-%d %H:%M UTC")
        );
    }
    if index.partial {
        let failed: Vec<String> = index.failed_services.iter().map(|s| s.to_string()).collect();
        eprintln!(
            "{} Index is partial (failed: {})",
            "⚠️".yellow(),
            failed.join(", ")
        );
    }
}

/// False (after printing a hint) when the requested service is disabled
fn check_enabled(enabled: &[Service], service: Option<Service>) -> bool {
    match service {
        Some(service) if !enabled.contains(&service) => {
            println!(
                "{} {} is disabled. Enable it with: awsf settings enable {}",
                "⚠️".yellow(),
                service_label(service),
                service
            );
            false
        }
        _ => true,
    }
}

fn run_search(config: &Config, store: &IndexStore, args: &SearchArgs) -> Result<()> {
    let enabled = config.enabled()?;
    let index = load_index(store)?;
    warn_about_index(config, &index);

    let query = search::parse_query(&args.query);
    if !check_enabled(&enabled, query.service) {
        return Ok(());
    }

    let visible = search::visible_resources(&index, &enabled, query.service);
    if visible.is_empty() {
        println!("❌ No {}resources found", scope(&query));
        return Ok(());
    }

    let selected = match &query.text {
        None => pick(&index, &visible, &query)?,
        Some(text) => {
            let found: Vec<&Resource> = visible
                .iter()
                .copied()
                .filter(|r| search::matches(r, text))
                .collect();

            match found.as_slice() {
                [] => {
                    println!("❌ No {}resources found matching: '{}'", scope(&query), text);
                    let suggestions = search::suggestions(&visible, text);
                    if !suggestions.is_empty() {
                        println!("💡 Did you mean:");
                        for r in suggestions {
                            println!("   • {} ({})", r.name, search::service_display(r));
                        }
                    }
                    None
                }
                [only] => Some(*only),
                _ => pick(&index, &found, &query)?,
            }
        }
    };

    match selected {
        Some(resource) => open_resource(resource, &index, args.print),
        None => Ok(()),
    }
}

fn scope(query: &Query) -> String {
    query
        .service
        .map(|s| format!("{} ", service_label(s)))
        .unwrap_or_default()
}

/// Let the user choose among `candidates` with fzf
fn pick<'a>(
    index: &'a ResourceIndex,
    candidates: &[&Resource],
    query: &Query,
) -> Result<Option<&'a Resource>> {
    let lines = search::render_lines(candidates);
    let header = match &query.text {
        Some(_) => format!("🔍 Found {} {}matches - Select one", candidates.len(), scope(query)),
        None => format!("🔍 Search {}AWS resources", scope(query)),
    };
    let opts = FzfOptions::new(&header, "☁️ Search: ");

    match shell::run_fzf(&lines, &opts) {
        FzfOutcome::Selected(line) => Ok(search::resolve_selection(index, &line)),
        FzfOutcome::Cancelled => {
            println!("👋 Search cancelled");
            Ok(None)
        }
        FzfOutcome::Unavailable => {
            eprintln!("{} fzf not found, listing matches instead", "⚠️".yellow());
            for line in lines {
                println!("{}", line);
            }
            Ok(None)
        }
        FzfOutcome::Error(msg) => Err(anyhow::anyhow!(msg)),
    }
}

fn open_resource(resource: &Resource, index: &ResourceIndex, print_only: bool) -> Result<()> {
    let url = resource::resolve(resource, &index.source_region)?;

    if print_only {
        println!("{}", url);
        return Ok(());
    }

    match shell::open_browser(&url) {
        ShellResult::Success => println!(
            "🚀 Opening {} ({}) {} in AWS Console",
            resource.name.as_str().bold(),
            search::service_display(resource),
            resource.environment.indicator()
        ),
        ShellResult::Failed(code) => {
            tracing::warn!("Browser exited with code {}", code);
            println!("{}", url);
        }
        ShellResult::Error(msg) => {
            tracing::warn!("{}", msg);
            println!("{}", url);
        }
    }
    Ok(())
}

fn list(config: &Config, store: &IndexStore, service: Option<Service>) -> Result<()> {
    let enabled = config.enabled()?;
    if !check_enabled(&enabled, service) {
        return Ok(());
    }

    let index = load_index(store)?;
    let visible = search::visible_resources(&index, &enabled, service);
    for line in search::render_lines(&visible) {
        println!("{}", line);
    }
    Ok(())
}

// =============================================================================
// Settings
// =============================================================================

fn settings(
    mut config: Config,
    config_path: &std::path::Path,
    store: &IndexStore,
    action: SettingsAction,
) -> Result<()> {
    match action {
        SettingsAction::Show => {
            show_settings(&config, config_path, store);
            return Ok(());
        }
        SettingsAction::Enable { services, all } => {
            if all {
                config.enable_all();
                println!(
                    "{} Enabled all {} services",
                    "✅".green(),
                    Service::ALL.len()
                );
            }
            for service in services {
                config.enable(service);
                println!("{} Enabled {}", "✅".green(), service_label(service));
            }
        }
        SettingsAction::Disable { services } => {
            for service in services {
                config.disable(service)?;
                println!("{} Disabled {}", "❌".red(), service_label(service));
            }
        }
        SettingsAction::Region { region } => {
            config.set_region(&region)?;
            println!("🌍 Region set to {}", config.aws_region);
        }
        SettingsAction::Profile { profile } => {
            config.set_profile(profile.as_deref());
            match &config.aws_profile {
                Some(p) => println!("👤 Profile set to {}", p),
                None => println!("👤 Using the default credential chain"),
            }
        }
    }

    config.save_to(config_path)?;
    println!("💾 Settings saved to {}", config_path.display());
    Ok(())
}

fn show_settings(config: &Config, config_path: &std::path::Path, store: &IndexStore) {
    println!("{}", "🛠️  AWSF Settings".bold());
    println!("   Config:  {}", config_path.display());
    println!("   Index:   {}", store.path().display());
    println!("   Region:  {}", config.aws_region);
    println!(
        "   Profile: {}",
        config.aws_profile.as_deref().unwrap_or("(default chain)")
    );
    println!();

    for service in Service::ALL {
        let status = if config.is_enabled(service) {
            "✅"
        } else {
            "❌"
        };
        println!("   {} {}", status, service_label(service));
    }
    println!();

    match store.load() {
        Ok(index) => println!(
            "   Index has {} resource(s) from {}{}",
            index.resources.len(),
            index.generated_at.format("%Y-%m-%d %H:%M UTC"),
            if index.partial { " (partial)" } else { "" }
        ),
        Err(StoreError::NotFound(_)) => println!("   No index yet. Run: awsf refresh"),
        Err(e) => println!("   {} {}", "⚠️".yellow(), e),
    }
}

fn service_label(service: Service) -> String {
    match resource::get_service(service) {
        Some(def) => format!("{} {}", def.icon, def.display_name),
        None => service.to_string(),
    }
}
