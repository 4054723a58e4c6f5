mod display;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clusterkit_core::checks::{self, CheckReport};
use clusterkit_core::config::Config;
use clusterkit_core::discovery::hdp::{self, AmbariModule, HdpContext};
use clusterkit_core::discovery::{self, layout::BundleLayout, DiscoveryContext, Module, TimeWindow};
use clusterkit_core::hdfs::{tree::DEFAULT_MAX_DEPTH, HdfsReport};
use clusterkit_core::inventory::ambari::AmbariInventory;
use clusterkit_core::inventory::ansible::AnsibleInventory;
use clusterkit_core::inventory::cloudera::CmInventory;
use clusterkit_core::remote::{run_blocking, LocalShell};
use clusterkit_core::report::ReportBuilder;
use clusterkit_core::{config_push, hive_scan, smoke, AmbariClient, CmClient, SshShell, Workbook};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "clusterkit",
    version,
    about = "clusterkit — assessment, inventory and migration tooling for Hadoop clusters",
    long_about = "Inventory Cloudera Manager and Ambari clusters, run upgrade compatibility checks, \
                  build discovery bundles and turn them into reports."
)]
struct Cli {
    /// Configuration file (defaults to ./clusterkit.yml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Cloudera Manager URL (http[s]://host:port), overrides the config file
    #[arg(long, global = true)]
    cm_url: Option<String>,

    /// Ambari URL (http[s]://host:port), overrides the config file
    #[arg(long, global = true)]
    ambari_url: Option<String>,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum Manager {
    Cm,
    Ambari,
}

#[derive(Subcommand)]
enum Commands {
    /// Host and service inventory workbook of a CM or Ambari cluster
    Inventory {
        #[arg(value_enum)]
        manager: Manager,

        /// Directory the workbook is written to
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Upgrade compatibility checks of the base cluster (or the ECS hosts)
    Check {
        /// Run the Data Services (ECS) host checks instead
        #[arg(long)]
        ecs: bool,

        /// Directory the Version_Check workbook is written to
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Build a discovery bundle from Cloudera Manager
    Discover {
        /// Bundle directory prefix; a timestamp is appended
        #[arg(short, long)]
        output_dir: PathBuf,

        /// Extractor to run (all, cm_api, cm_metrics, diagnostic_bundle, hdfs_report,
        /// mapreduce_extractor, spark_extractor, tez_extractor, impala_profiles,
        /// hive_metastore, sentry_policies)
        #[arg(short, long, default_value = "all")]
        module: String,

        /// Days of metrics and workload history to collect
        #[arg(short, long)]
        time_range: Option<u32>,

        /// Export unredacted configuration values
        #[arg(long)]
        disable_redaction: bool,
    },

    /// Build a discovery bundle of an HDP cluster
    DiscoverAmbari {
        /// Bundle directory prefix; a timestamp is appended
        #[arg(short, long)]
        output_dir: PathBuf,

        /// Extractor to run (all, ambari_api, hive_metastore, extract_metrics,
        /// mapreduce_extractor, ranger_policy_extractor, hdfs_report)
        #[arg(short, long, default_value = "all")]
        module: String,

        /// Days of metrics to collect
        #[arg(short, long)]
        time_range: Option<u32>,
    },

    /// Build the discovery report workbook from a bundle
    Report {
        /// Discovery bundle directory
        #[arg(short, long)]
        bundle: PathBuf,

        /// Directory the workbook is written to
        #[arg(short, long)]
        output: PathBuf,

        /// Deepest directory level of the HDFS structure report
        #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
        hdfs_report_depth: usize,
    },

    /// Directory roll-up and modification-time report of an fsimage dump
    HdfsReport {
        /// `hdfs oiv -p Delimited` output (tab or comma separated)
        dump: PathBuf,

        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
        depth: usize,

        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Push service and role config group parameters from a cluster template
    PushConfig {
        /// JSON template with services[].serviceConfigs / roleConfigGroups
        template: PathBuf,

        /// Cluster name as known to Cloudera Manager
        #[arg(long)]
        cluster: String,

        /// Show the updates without sending them
        #[arg(long)]
        dry_run: bool,

        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Scan HQL and .properties files for Hive 3 conversion issues
    HiveScan {
        /// Directory scanned recursively
        #[arg(default_value = ".")]
        path: PathBuf,

        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        /// TOML file extending or replacing the built-in rules
        #[arg(long)]
        rules: Option<PathBuf>,

        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Service smoke tests from a gateway host (needs a Kerberos ticket)
    SmokeTest {
        /// CA bundle passed to impala-shell
        #[arg(long)]
        ca_cert: Option<String>,

        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Ansible inventory of the CM hosts grouped by role
    AnsibleInventory {
        /// Environment name from inventory.environments
        #[arg(short, long)]
        environment: Option<String>,

        /// Prefix every host with its cluster name
        #[arg(long)]
        with_cluster: bool,

        /// Output file (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "clusterkit", &mut std::io::stdout());
        return Ok(());
    }

    let mut config = Config::load(cli.config.as_deref())?;
    tracing::debug!(config = ?cli.config, "configuration loaded");
    if let Some(url) = cli.cm_url {
        config.cloudera_manager.url = Some(url);
    }
    if let Some(url) = cli.ambari_url {
        config.ambari.url = Some(url);
    }

    match cli.command {
        Commands::Inventory {
            manager,
            output_dir,
            format,
        } => cmd_inventory(&config, manager, &output_dir, format).await,
        Commands::Check {
            ecs,
            output_dir,
            format,
        } => cmd_check(&config, ecs, &output_dir, format).await,
        Commands::Discover {
            output_dir,
            module,
            time_range,
            disable_redaction,
        } => cmd_discover(&config, &output_dir, &module, time_range, disable_redaction).await,
        Commands::DiscoverAmbari {
            output_dir,
            module,
            time_range,
        } => cmd_discover_ambari(&config, &output_dir, &module, time_range).await,
        Commands::Report {
            bundle,
            output,
            hdfs_report_depth,
        } => cmd_report(&config, &bundle, &output, hdfs_report_depth),
        Commands::HdfsReport {
            dump,
            output_dir,
            depth,
            format,
        } => cmd_hdfs_report(&dump, &output_dir, depth, format),
        Commands::PushConfig {
            template,
            cluster,
            dry_run,
            format,
        } => cmd_push_config(&config, &template, &cluster, dry_run, format).await,
        Commands::HiveScan {
            path,
            output_dir,
            rules,
            format,
        } => cmd_hive_scan(&path, &output_dir, rules.as_deref(), format),
        Commands::SmokeTest { ca_cert, format } => cmd_smoke_test(&config, ca_cert, format).await,
        Commands::AnsibleInventory {
            environment,
            with_cluster,
            output,
        } => cmd_ansible_inventory(&mut config, environment.as_deref(), with_cluster, output.as_deref()).await,
        Commands::Completions { .. } => Ok(()),
    }
}

fn cm_client(config: &Config) -> Result<CmClient> {
    config.cm_url()?;
    CmClient::new(&config.cloudera_manager).context("Failed to create the Cloudera Manager client")
}

fn ambari_client(config: &Config) -> Result<AmbariClient> {
    config.ambari_url()?;
    AmbariClient::new(&config.ambari).context("Failed to create the Ambari client")
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn write_workbook(workbook: &Workbook, output_dir: &Path, format: Format) -> Result<()> {
    let path = workbook.write(output_dir)?;
    match format {
        Format::Json => print_json(workbook),
        Format::Text => {
            display::print_workbook_written(workbook, &path);
            Ok(())
        }
    }
}

async fn cmd_inventory(config: &Config, manager: Manager, output_dir: &Path, format: Format) -> Result<()> {
    let shell = SshShell::from_settings(&config.ssh);
    let workbook = match manager {
        Manager::Cm => {
            let inventory = CmInventory::fetch(&cm_client(config)?).await?;
            run_blocking(move || inventory.to_workbook(&shell)).await?
        }
        Manager::Ambari => {
            let inventory = AmbariInventory::fetch(&ambari_client(config)?).await?;
            run_blocking(move || inventory.to_workbook(&shell)).await?
        }
    };
    write_workbook(&workbook, output_dir, format)
}

async fn cmd_check(config: &Config, ecs: bool, output_dir: &Path, format: Format) -> Result<()> {
    let shell = SshShell::from_settings(&config.ssh);
    let report: CheckReport = if ecs {
        if config.ecs.hosts.is_empty() {
            anyhow::bail!("No ECS hosts configured. Set ecs.hosts in the config file");
        }
        let ecs = config.ecs.clone();
        run_blocking(move || checks::ecs::run(&ecs.hosts, ecs.db_host.as_deref(), &shell)).await?
    } else {
        checks::base::run(&cm_client(config)?, Arc::new(shell), &config.checks).await?
    };
    let workbook = report.to_workbook();
    let path = workbook.write(output_dir)?;
    match format {
        Format::Json => print_json(&report)?,
        Format::Text => {
            display::print_check_report(&report);
            display::print_workbook_written(&workbook, &path);
        }
    }
    if report.failed_count() > 0 {
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_discover(
    config: &Config,
    output_dir: &Path,
    module: &str,
    time_range: Option<u32>,
    disable_redaction: bool,
) -> Result<()> {
    let module: Module = module.parse()?;
    let cm_url = config.cm_url()?.to_string();
    let cm = cm_client(config)?;

    let mut settings = config.discovery.clone();
    if let Some(days) = time_range {
        settings.time_range_days = days;
    }
    if disable_redaction {
        settings.redact_sensitive = false;
    }
    let layout = BundleLayout::timestamped(output_dir, &chrono::Local::now());
    let ctx = DiscoveryContext {
        cm,
        window: TimeWindow::ending_at(chrono::Utc::now(), settings.time_range_days),
        layout: layout.clone(),
        settings,
    };
    let outcomes = discovery::build(ctx, module, &cm_url).await?;
    display::print_discovery_outcomes(&outcomes, layout.root());
    if outcomes.iter().any(|o| o.error.is_some()) {
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_discover_ambari(config: &Config, output_dir: &Path, module: &str, time_range: Option<u32>) -> Result<()> {
    let module: AmbariModule = module.parse()?;
    let days = time_range.unwrap_or(config.discovery.time_range_days);
    let layout = BundleLayout::timestamped(output_dir, &chrono::Local::now());
    let ctx = HdpContext {
        ambari: ambari_client(config)?,
        settings: config.ambari.clone(),
        layout: layout.clone(),
        window: TimeWindow::ending_at(chrono::Utc::now(), days),
    };
    let outcomes = hdp::build(ctx, module).await?;
    display::print_discovery_outcomes(&outcomes, layout.root());
    if outcomes.iter().any(|o| o.error.is_some()) {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_report(config: &Config, bundle: &Path, output: &Path, depth: usize) -> Result<()> {
    let builder = ReportBuilder::open(bundle)?
        .with_hdfs_depth(depth)
        .with_redaction(config.discovery.redact_sensitive);
    let workbook = builder.build()?;
    let path = workbook.write(output)?;
    display::print_workbook_written(&workbook, &path);
    Ok(())
}

fn cmd_hdfs_report(dump: &Path, output_dir: &Path, depth: usize, format: Format) -> Result<()> {
    let report = HdfsReport::from_file(dump, depth)?;
    let (structure, modtime) = report.write_csv(output_dir)?;
    match format {
        Format::Json => print_json(&report),
        Format::Text => {
            display::print_hdfs_report(&report, &structure, &modtime);
            Ok(())
        }
    }
}

async fn cmd_push_config(
    config: &Config,
    template: &Path,
    cluster: &str,
    dry_run: bool,
    format: Format,
) -> Result<()> {
    let updates = config_push::ConfigTemplate::from_file(template)?.updates();
    if updates.is_empty() {
        anyhow::bail!("No configuration values to push in '{}'", template.display());
    }
    let cm = cm_client(config)?;
    let results = config_push::push(&cm, cluster, updates, dry_run).await;
    match format {
        Format::Json => print_json(&results)?,
        Format::Text => display::print_push_results(&results, dry_run),
    }
    if results.iter().any(|r| !r.success) {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_hive_scan(path: &Path, output_dir: &Path, rules: Option<&Path>, format: Format) -> Result<()> {
    let rules = hive_scan::rules::load_rules(rules)?;
    let findings = hive_scan::scan_directory(path, &rules)?;
    let csv = hive_scan::write_findings(&findings, output_dir)?;
    match format {
        Format::Json => print_json(&findings),
        Format::Text => {
            display::print_hive_findings(&findings, &csv);
            Ok(())
        }
    }
}

async fn cmd_smoke_test(config: &Config, ca_cert: Option<String>, format: Format) -> Result<()> {
    let cm = cm_client(config)?;
    let options = smoke::SmokeOptions { ca_cert };
    let report = smoke::run(&cm, Arc::new(LocalShell), &options).await?;
    match format {
        Format::Json => print_json(&report)?,
        Format::Text => display::print_smoke_report(&report),
    }
    if report.failed_count() > 0 {
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_ansible_inventory(
    config: &mut Config,
    environment: Option<&str>,
    with_cluster: bool,
    output: Option<&Path>,
) -> Result<()> {
    if let Some(env) = environment {
        config.cloudera_manager.url = Some(config.inventory.cm_url(env)?);
    }
    let cm = cm_client(config)?;
    let cm_host = cm
        .server_url()
        .host_str()
        .context("Cloudera Manager URL has no host")?
        .to_string();
    let hosts = cm.read_hosts("full").await.context("Failed to read hosts")?;
    let clusters: BTreeMap<String, String> = cm
        .read_clusters("summary")
        .await
        .context("Failed to read clusters")?
        .into_iter()
        .map(|c| (c.name.clone(), c.label().to_string()))
        .collect();

    let inventory = AnsibleInventory {
        hosts: &hosts,
        cm_host: &cm_host,
        clusters: with_cluster.then_some(&clusters),
    };
    let text = inventory.render();
    match output {
        Some(path) => {
            std::fs::write(path, &text)
                .with_context(|| format!("Failed to write '{}'", path.display()))?;
            println!("Ansible inventory written to {}", path.display());
        }
        None => print!("{}", text),
    }
    Ok(())
}
