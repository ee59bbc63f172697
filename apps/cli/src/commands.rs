//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use gatherer_harvester::{
    Harvester, IdentifierStrategy, ProviderProfile, archive_profile, linked_search_profile,
    manifest_profile, paged_catalog_profile,
};
use gatherer_shared::{
    AppConfig, ContentFormat, HarvestOptions, RecordId, init_config, load_config,
};
use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use tracing::info;
use url::Url;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Gatherer — pull original records out of provider APIs.
#[derive(Parser)]
#[command(
    name = "gatherer",
    version,
    about = "Harvest original metadata records from paged provider APIs.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Built-in provider shapes.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum Provider {
    /// Offset/limit search with a meta/files/marc download chain.
    Archive,
    /// Linked-data search with next-link pagination.
    Linked,
    /// Page-token catalog with a derived secondary fetch.
    Paged,
    /// Static collection manifest listing record URIs.
    Manifest,
    /// No pagination; identifiers come from a list file.
    Direct,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run a harvest and write each record to the output directory.
    Harvest {
        #[command(flatten)]
        source: SourceArgs,

        /// Directory to write records into.
        #[arg(short, long, default_value = "records")]
        out: PathBuf,
    },

    /// Report the provider's record count without harvesting.
    Count {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Fetch and print a single record by identifier.
    Record {
        #[command(flatten)]
        source: SourceArgs,

        /// The provider-local record identifier.
        id: String,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Arguments describing where and how to harvest. Shared by every
/// data-touching subcommand.
#[derive(clap::Args)]
pub(crate) struct SourceArgs {
    /// Provider shape.
    #[arg(short, long, value_enum)]
    pub provider: Provider,

    /// Root collection endpoint(s), walked in order. Not needed when an
    /// identifier-list file drives the harvest.
    #[arg(short, long = "uri")]
    pub uris: Vec<Url>,

    /// Harvest name; qualifies minted record identifiers. Defaults to the
    /// provider name.
    #[arg(short, long)]
    pub name: Option<String>,

    /// Batch width: number of concurrent fetches per batch. 0 means the
    /// configured default.
    #[arg(short, long, default_value = "0")]
    pub concurrency: usize,

    /// Stop after this many records. 0 means unlimited.
    #[arg(short, long, default_value = "0")]
    pub max_records: usize,

    /// Extra request header, as 'Name: value'. Repeatable.
    #[arg(long = "header")]
    pub headers: Vec<String>,

    /// Extra page query parameter, as 'key=value'. Repeatable.
    #[arg(long = "param")]
    pub params: Vec<String>,

    /// Identifier-list file (one identifier per line). Required for the
    /// direct provider, optional otherwise.
    #[arg(long)]
    pub id_list: Option<PathBuf>,

    /// Download base URI (archive provider).
    #[arg(long)]
    pub download_base: Option<String>,

    /// Page size for offset/limit pagination (archive provider).
    #[arg(long, default_value = "50")]
    pub page_size: usize,

    /// Regex an entry field must match to count as a record URI (linked
    /// provider).
    #[arg(long)]
    pub item_pattern: Option<String>,

    /// Field path holding the record's local identifier (linked provider).
    #[arg(long, default_value = "item/id")]
    pub id_field: String,

    /// Catalog API base URI (paged provider).
    #[arg(long)]
    pub api_base: Option<String>,

    /// Regex with one capture group extracting the identifier from a record
    /// URI (manifest provider).
    #[arg(long)]
    pub id_pattern: Option<String>,

    /// Per-record URI template with an {id} placeholder (direct provider).
    #[arg(long)]
    pub template: Option<String>,

    /// Record format for the direct provider: xml or json.
    #[arg(long, default_value = "xml")]
    pub format: String,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "gatherer=info",
        1 => "gatherer=debug",
        _ => "gatherer=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Harvest { source, out } => cmd_harvest(source, &out).await,
        Command::Count { source } => cmd_count(source).await,
        Command::Record { source, id } => cmd_record(source, &id).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Harvester construction
// ---------------------------------------------------------------------------

fn build_profile(args: &SourceArgs) -> Result<ProviderProfile> {
    match args.provider {
        Provider::Archive => {
            let base = args
                .download_base
                .as_deref()
                .ok_or_else(|| eyre!("the archive provider requires --download-base"))?;
            Ok(archive_profile(base, args.page_size))
        }
        Provider::Linked => {
            let pattern = args
                .item_pattern
                .as_deref()
                .ok_or_else(|| eyre!("the linked provider requires --item-pattern"))?;
            let re = Regex::new(pattern).map_err(|e| eyre!("invalid --item-pattern: {e}"))?;
            Ok(linked_search_profile(re, &args.id_field))
        }
        Provider::Paged => {
            let base = args
                .api_base
                .as_deref()
                .ok_or_else(|| eyre!("the paged provider requires --api-base"))?;
            Ok(paged_catalog_profile(base))
        }
        Provider::Manifest => {
            let pattern = args
                .id_pattern
                .as_deref()
                .ok_or_else(|| eyre!("the manifest provider requires --id-pattern"))?;
            let re = Regex::new(pattern).map_err(|e| eyre!("invalid --id-pattern: {e}"))?;
            Ok(manifest_profile(re))
        }
        Provider::Direct => {
            let template = args
                .template
                .as_deref()
                .ok_or_else(|| eyre!("the direct provider requires --template"))?;
            let format = match args.format.as_str() {
                "xml" => ContentFormat::Xml,
                "json" => ContentFormat::Json,
                other => return Err(eyre!("unknown format '{other}': expected 'xml' or 'json'")),
            };
            Ok(ProviderProfile::direct(
                "direct",
                format,
                template,
                IdentifierStrategy::FromSource,
            ))
        }
    }
}

fn build_harvester(args: SourceArgs) -> Result<(Harvester, AppConfig)> {
    let config = load_config()?;
    let profile = build_profile(&args)?;

    // List-only runs carry no root URI; the core validates that one of the
    // two sources is present.
    let options = HarvestOptions {
        name: args.name.unwrap_or_default(),
        uris: args.uris,
        concurrency: args.concurrency,
        max_records: args.max_records,
        headers: args
            .headers
            .iter()
            .map(|h| parse_header(h))
            .collect::<Result<_>>()?,
        params: args
            .params
            .iter()
            .map(|p| parse_param(p))
            .collect::<Result<_>>()?,
        id_list_path: args.id_list,
    }
    .with_defaults(&config.defaults);

    let harvester = Harvester::new(profile, options, &config.http)?;
    Ok((harvester, config))
}

fn parse_header(raw: &str) -> Result<(String, String)> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| eyre!("invalid header '{raw}': expected 'Name: value'"))?;
    Ok((name.trim().to_string(), value.trim().to_string()))
}

fn parse_param(raw: &str) -> Result<(String, String)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| eyre!("invalid parameter '{raw}': expected 'key=value'"))?;
    Ok((key.to_string(), value.to_string()))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_harvest(source: SourceArgs, out: &Path) -> Result<()> {
    let (harvester, _config) = build_harvester(source)?;
    std::fs::create_dir_all(out)?;

    info!(out = %out.display(), width = harvester.concurrency(), "starting harvest");

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));

    let mut stream = harvester.records()?;
    let mut written = 0usize;
    while let Some(record) = stream.next_record().await {
        let ext = if record.content_type == "application/json" {
            "json"
        } else {
            "xml"
        };
        let path = out.join(format!("{}.{ext}", sanitize(&record.id)));
        std::fs::write(&path, &record.content)?;
        written += 1;
        spinner.set_message(format!("Harvested [{written}] {}", record.id));
    }
    spinner.finish_and_clear();

    let report = stream.report();
    println!();
    println!("  Harvest complete!");
    println!("  Name:    {}", report.name);
    println!("  Session: {}", report.session);
    println!("  Emitted: {}", report.emitted);
    println!("  Dropped: {}", report.dropped);
    println!("  Path:    {}", out.display());
    println!("  Time:    {:.1}s", report.duration().as_secs_f64());
    println!();

    if !report.errors.is_empty() {
        println!("  Dropped records:");
        for (id, cause) in &report.errors {
            println!("    {id}: {cause}");
        }
        println!();
    }

    Ok(())
}

async fn cmd_count(source: SourceArgs) -> Result<()> {
    let (harvester, _config) = build_harvester(source)?;
    let total = harvester.count().await?;
    println!("{total}");
    Ok(())
}

async fn cmd_record(source: SourceArgs, id: &str) -> Result<()> {
    let (harvester, _config) = build_harvester(source)?;
    let record = harvester.get_record(&RecordId::new(id)).await?;
    info!(id = %record.id, "record fetched");
    println!("{}", record.content);
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

/// Make a record identifier safe to use as a file name.
fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
