//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use buyergroup_core::{
    Narrator, Pipeline, ProgressReporter, TemplateNarrator, derive_parameters, resolve_keywords,
    write_bundle,
};
use buyergroup_providers::{Capability, Collaborators, FixtureProvider, HttpProvider};
use buyergroup_shared::{
    AppConfig, CallKind, CompanyFacts, DealContext, PipelineFailure, PipelineReport,
    PipelineSettings, Stage, expand_home, init_config, load_config, validate_api_key,
};
use buyergroup_storage::Storage;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// buyergroup: find the people who will decide a B2B deal.
#[derive(Parser)]
#[command(
    name = "buyergroup",
    version,
    about = "Discover, rank and validate the buyer group for a deal at a target company.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
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

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the full pipeline for a company.
    Run {
        /// Company name, domain, or social-profile URL.
        company: String,

        /// Deal description (TOML).
        #[arg(short, long)]
        deal: PathBuf,

        /// Serve provider data from a JSON fixture instead of the HTTP API.
        #[arg(long)]
        fixture: Option<PathBuf>,

        /// Bundle output directory (defaults to `defaults.output_dir`).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Persist the run to the history database.
        #[arg(long)]
        save: bool,

        /// Print the report as JSON instead of a summary.
        #[arg(long)]
        json: bool,

        /// Override `pipeline.concurrency`.
        #[arg(long)]
        concurrency: Option<usize>,

        /// Override `pipeline.page_ceiling`.
        #[arg(long)]
        page_ceiling: Option<u32>,
    },

    /// Show the search parameters a deal would use, without calling any provider.
    Plan {
        /// Deal description (TOML).
        #[arg(short, long)]
        deal: PathBuf,

        /// Known employee count of the target company.
        #[arg(long)]
        employees: Option<u64>,
    },

    /// List saved runs, newest first.
    History {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show one saved run.
    Show {
        /// Run ID as printed by `run` or `history`.
        run_id: String,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
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
        0 => "buyergroup=info",
        1 => "buyergroup=debug",
        _ => "buyergroup=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run {
            company,
            deal,
            fixture,
            out,
            save,
            json,
            concurrency,
            page_ceiling,
        } => {
            let opts = RunOptions {
                fixture,
                out,
                save,
                json,
                concurrency,
                page_ceiling,
            };
            cmd_run(&company, &deal, opts).await
        }
        Command::Plan { deal, employees } => cmd_plan(&deal, employees),
        Command::History { limit } => cmd_history(limit).await,
        Command::Show { run_id } => cmd_show(&run_id).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

struct RunOptions {
    fixture: Option<PathBuf>,
    out: Option<PathBuf>,
    save: bool,
    json: bool,
    concurrency: Option<usize>,
    page_ceiling: Option<u32>,
}

async fn cmd_run(company: &str, deal_path: &Path, opts: RunOptions) -> Result<()> {
    let config = load_config()?;
    let deal = load_deal(deal_path)?;

    let mut settings = PipelineSettings::from(&config);
    if let Some(c) = opts.concurrency {
        settings.concurrency = c.max(1);
    }
    if let Some(p) = opts.page_ceiling {
        settings.page_ceiling = p.clamp(1, buyergroup_shared::HARD_PAGE_CEILING);
    }

    let pipeline = build_pipeline(&config, settings, opts.fixture.as_deref())?;

    info!(company, deal = %deal_path.display(), band = %deal.band(), "starting run");

    let reporter = CliProgress::new(opts.json);
    let outcome = pipeline.run_with_progress(company, &deal, &reporter).await;
    reporter.finish();

    let storage = if opts.save {
        Some(Storage::open(&expand_home(&config.defaults.database_path)).await?)
    } else {
        None
    };

    match outcome {
        Ok(report) => {
            let narrative = TemplateNarrator.narrate(&report)?;
            let out_dir = opts
                .out
                .unwrap_or_else(|| expand_home(&config.defaults.output_dir));
            let bundle = write_bundle(&report, &narrative, &out_dir)?;

            if let Some(storage) = &storage {
                storage.save_report(&report).await?;
            }

            if opts.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_summary(&report, &bundle.path, storage.is_some());
            }
            Ok(())
        }
        Err(failure) => {
            if let Some(storage) = &storage {
                if let Err(e) = storage.save_failure(&failure).await {
                    warn!(error = %e, "could not save failed run");
                }
            }
            print_failure(&failure, opts.json)?;
            Err(eyre!("run {} failed at {}", failure.run_id, failure.stage))
        }
    }
}

fn load_deal(path: &Path) -> Result<DealContext> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| eyre!("cannot read deal file '{}': {e}", path.display()))?;
    Ok(DealContext::from_toml(&content)?)
}

fn build_pipeline(
    config: &AppConfig,
    settings: PipelineSettings,
    fixture: Option<&Path>,
) -> Result<Pipeline> {
    let (collaborators, capability) = match fixture {
        Some(path) => {
            info!(fixture = %path.display(), "using fixture provider");
            let provider = Arc::new(FixtureProvider::from_path(path)?);
            (
                Collaborators::from_provider(provider),
                Capability::anonymous(settings.concurrency),
            )
        }
        None => {
            let api_key = validate_api_key(config)?;
            let timeout = settings
                .resolve_timeout
                .max(settings.page_timeout)
                .max(settings.enrich_timeout);
            let provider = Arc::new(HttpProvider::new(&config.provider.base_url, timeout)?);
            (
                Collaborators::from_provider(provider),
                Capability::new(
                    Some(api_key),
                    config.provider.user_agent.clone(),
                    settings.concurrency,
                ),
            )
        }
    };
    Ok(Pipeline::new(collaborators, capability, settings))
}

fn print_summary(report: &PipelineReport, bundle: &Path, saved: bool) {
    let enriched = report.buyer_group.iter().filter(|m| m.is_enriched()).count();
    println!();
    println!("  Buyer group ready: {}", report.intelligence.name);
    println!("  Run:      {}", report.run_id);
    println!(
        "  Members:  {} ({} enriched)",
        report.buyer_group.len(),
        enriched
    );
    println!(
        "  Cohesion: {:.1} ({})",
        report.cohesion.score,
        report.cohesion.level.as_str()
    );
    println!("  Credits:  {}", report.costs.total());
    println!("  Bundle:   {}", bundle.display());
    if saved {
        println!("  Saved:    yes");
    }
    println!();
    for member in &report.buyer_group {
        let c = member.assignment.candidate();
        println!(
            "  {:>2}. {:<11} {} | {} | {}",
            member.rank,
            member.assignment.role.as_str(),
            c.name,
            c.title,
            c.department
        );
    }
    if !report.flags.is_empty() {
        println!();
        for flag in &report.flags {
            println!("  ! {flag}");
        }
    }
    println!();
}

fn print_failure(failure: &PipelineFailure, json: bool) -> Result<()> {
    if json {
        let value = serde_json::json!({
            "run_id": failure.run_id,
            "status": "FAILED",
            "stage": failure.stage,
            "last_completed": failure.last_completed,
            "cause": failure.cause.to_string(),
            "kind": failure.cause.kind(),
            "costs": failure.costs,
            "flags": failure.flags,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    eprintln!();
    eprintln!("  Run failed at {}", failure.stage);
    if let Some(last) = failure.last_completed {
        eprintln!("  Last completed: {last}");
    }
    eprintln!("  Cause:   {}", failure.cause);
    eprintln!(
        "  Credits: {} (resolve {}, discovery {}, enrichment {})",
        failure.costs.total(),
        failure.costs.total_for(CallKind::ContextResolution),
        failure.costs.total_for(CallKind::DiscoveryPage),
        failure.costs.total_for(CallKind::ProfileEnrichment),
    );
    for flag in &failure.flags {
        eprintln!("  ! {flag}");
    }
    eprintln!();
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new(hidden: bool) -> Self {
        if hidden {
            return Self {
                spinner: ProgressBar::hidden(),
            };
        }
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn stage(&self, stage: Stage) {
        self.spinner.set_message(stage_label(stage).to_string());
    }

    fn unit(&self, stage: Stage, current: usize, total: usize, detail: &str) {
        self.spinner.set_message(format!(
            "{} [{current}/{total}] {detail}",
            stage_label(stage)
        ));
    }

    fn done(&self, _report: &PipelineReport) {
        self.spinner.finish_and_clear();
    }
}

fn stage_label(stage: Stage) -> &'static str {
    match stage {
        Stage::Context => "Resolving company",
        Stage::Discovery => "Searching candidates",
        Stage::Scoring => "Scoring candidates",
        Stage::RoleAssignment => "Assigning roles",
        Stage::GroupSelection => "Selecting group",
        Stage::CoverageValidation => "Checking coverage",
        Stage::ProfileCollection => "Collecting profiles",
        Stage::CohesionValidation => "Evaluating cohesion",
        Stage::ReportReady => "Finishing",
    }
}

// ---------------------------------------------------------------------------
// plan
// ---------------------------------------------------------------------------

fn cmd_plan(deal_path: &Path, employees: Option<u64>) -> Result<()> {
    let config = load_config()?;
    let deal = load_deal(deal_path)?;
    deal.validate()?;
    let settings = PipelineSettings::from(&config);

    let facts = CompanyFacts {
        employee_count: employees,
        ..CompanyFacts::degraded("plan")
    };
    let params = derive_parameters(&facts, &deal, settings.page_ceiling);
    let keywords = resolve_keywords(&deal);

    println!();
    println!("  Deal band:    {}", params.band);
    println!("  Max pages:    {}", params.max_pages);
    println!(
        "  Target size:  {} (min {}, ideal {}, max {})",
        params.target_size, deal.sizing.min, deal.sizing.ideal, deal.sizing.max
    );
    println!(
        "  Max credits:  {}",
        settings.costs.context_resolution
            + u64::from(params.max_pages) * settings.costs.discovery_page
            + params.target_size as u64 * settings.costs.profile_enrichment
    );
    println!("  Preset:       {}", keywords.preset.unwrap_or("none"));
    println!("  Primary:      {}", keywords.primary.join(", "));
    println!("  Secondary:    {}", keywords.secondary.join(", "));
    println!("  Departments:  {}", keywords.relevant_departments.join(", "));
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// history / show
// ---------------------------------------------------------------------------

async fn open_history(config: &AppConfig) -> Result<Storage> {
    let path = expand_home(&config.defaults.database_path);
    Ok(Storage::open_readonly(&path).await?)
}

async fn cmd_history(limit: usize) -> Result<()> {
    let config = load_config()?;
    let storage = open_history(&config).await?;
    let runs = storage.list_runs(limit).await?;

    if runs.is_empty() {
        println!("No saved runs.");
        return Ok(());
    }

    println!();
    for run in &runs {
        let outcome = match (&run.cohesion_score, &run.failure_kind) {
            (Some(score), _) => format!("cohesion {score:.1}"),
            (None, Some(kind)) => format!("{kind} at {}", run.stage),
            (None, None) => run.stage.clone(),
        };
        println!(
            "  {}  {}  {:<9}  {:<24}  {:>2} members  {:>4} credits  {}",
            run.id,
            run.started_at.format("%Y-%m-%d %H:%M"),
            run.status,
            run.company.as_deref().unwrap_or(&run.identifier),
            run.member_count,
            run.total_cost,
            outcome
        );
    }
    println!();
    Ok(())
}

async fn cmd_show(run_id: &str) -> Result<()> {
    let config = load_config()?;
    let storage = open_history(&config).await?;
    let run = storage
        .get_run(run_id)
        .await?
        .ok_or_else(|| eyre!("no saved run with id '{run_id}'"))?;

    println!();
    println!("  Run:       {}", run.id);
    println!("  Company:   {}", run.company.as_deref().unwrap_or(&run.identifier));
    println!("  Status:    {} ({})", run.status, run.stage);
    if let Some(last) = &run.last_completed {
        println!("  Completed: {last}");
    }
    if let Some(message) = &run.failure_message {
        println!("  Cause:     {message}");
    }
    if let (Some(score), Some(level)) = (run.cohesion_score, &run.cohesion_level) {
        println!("  Cohesion:  {score:.1} ({level})");
    }
    println!(
        "  Started:   {}",
        run.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    );

    let members = storage.list_members(run_id).await?;
    if !members.is_empty() {
        println!();
        for m in &members {
            println!(
                "  {:>2}. {:<11} {} | {} | {} | influence {:.2}{}",
                m.rank,
                m.role,
                m.name,
                m.title,
                m.department,
                m.influence,
                if m.enriched { "" } else { " (preview)" }
            );
        }
    }

    let costs = storage.list_costs(run_id).await?;
    println!();
    println!(
        "  Credits: {} over {} calls ({} failed)",
        run.total_cost,
        costs.len(),
        costs.iter().filter(|c| !c.succeeded).count()
    );
    for flag in &run.flags {
        println!("  ! {flag}");
    }
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_flags_parse() {
        let cli = Cli::try_parse_from([
            "buyergroup",
            "-v",
            "run",
            "acme.io",
            "--deal",
            "deal.toml",
            "--fixture",
            "acme.json",
            "--save",
            "--concurrency",
            "2",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Command::Run {
                company,
                deal,
                fixture,
                save,
                json,
                concurrency,
                ..
            } => {
                assert_eq!(company, "acme.io");
                assert_eq!(deal, PathBuf::from("deal.toml"));
                assert_eq!(fixture, Some(PathBuf::from("acme.json")));
                assert!(save);
                assert!(!json);
                assert_eq!(concurrency, Some(2));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn run_requires_deal() {
        assert!(Cli::try_parse_from(["buyergroup", "run", "acme.io"]).is_err());
    }

    #[test]
    fn history_default_limit() {
        let cli = Cli::try_parse_from(["buyergroup", "history"]).unwrap();
        assert!(matches!(cli.command, Command::History { limit: 20 }));
    }

    #[test]
    fn stage_labels_cover_every_stage() {
        for stage in Stage::ORDER {
            assert!(!stage_label(stage).is_empty());
        }
    }
}
