use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use georisk_core::RiskMatrix;
use georisk_runtime::providers::OPENAI_API_KEY_ENV;
use georisk_runtime::sources::{
    AlphaVantageFxAdapter, SerpApiNewsAdapter, TavilyAdapter, YahooMarketAdapter,
    ALPHA_VANTAGE_API_KEY_ENV, SERPAPI_API_KEY_ENV, TAVILY_API_KEY_ENV,
};
use georisk_runtime::{
    CredentialBuilder, CredentialSet, LlmProvider, Orchestrator, ProviderRegistry, RunOutcome,
    RuntimeConfig, SourceAdapter,
};
use serde_json::Value as JsonValue;

mod cli;
mod output;

use cli::{Cli, Commands, ConvertArgs, RunArgs, ValidateArgs};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("georisk error: {error:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    // a missing .env is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose)?;

    match cli.command {
        Commands::Run(args) => run_pipeline(args).await,
        Commands::Validate(args) => validate(&args),
        Commands::Convert(args) => convert(&args),
    }
}

fn init_tracing(quiet: bool, verbose: bool) -> anyhow::Result<()> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("GEORISK_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}

fn load_matrix(path: Option<&Path>) -> anyhow::Result<RiskMatrix> {
    match path {
        Some(path) => RiskMatrix::from_file(path)
            .with_context(|| format!("failed to load risk matrix {}", path.display())),
        None => RiskMatrix::builtin().context("built-in risk matrix is invalid"),
    }
}

fn load_credentials(path: Option<&Path>) -> anyhow::Result<CredentialSet> {
    let document = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_yaml::from_str::<JsonValue>(&text)
                .with_context(|| format!("invalid credentials file {}", path.display()))?
        }
        None => JsonValue::Object(Default::default()),
    };

    CredentialBuilder::new()
        .require("openai_api_key", OPENAI_API_KEY_ENV, "OpenAI API key")
        .require("tavily_api_key", TAVILY_API_KEY_ENV, "Tavily API key")
        .require("serpapi_api_key", SERPAPI_API_KEY_ENV, "SerpAPI key")
        .optional(
            "alpha_vantage_api_key",
            ALPHA_VANTAGE_API_KEY_ENV,
            "Alpha Vantage API key",
        )
        .build(&document)
        .context("set the missing keys in the environment, a .env file, or --credentials")
}

fn build_provider(
    credentials: &mut CredentialSet,
    base_url: Option<&str>,
) -> anyhow::Result<Arc<dyn LlmProvider>> {
    let key = credentials.take("openai_api_key")?;
    let mut provider_config = serde_json::json!({ "api_key": key.expose() });
    if let Some(url) = base_url {
        provider_config["base_url"] = JsonValue::from(url);
    }

    let registry = ProviderRegistry::with_defaults();
    registry.validate("openai", &provider_config)?;
    Ok(registry.create("openai", &provider_config)?)
}

fn build_sources(
    credentials: &mut CredentialSet,
    config: &RuntimeConfig,
) -> anyhow::Result<Vec<Arc<dyn SourceAdapter>>> {
    let settings = &config.sources;
    let mut sources: Vec<Arc<dyn SourceAdapter>> = vec![
        Arc::new(TavilyAdapter::new(credentials.take("tavily_api_key")?, settings)?),
        Arc::new(SerpApiNewsAdapter::new(credentials.take("serpapi_api_key")?, settings)?),
        Arc::new(YahooMarketAdapter::new(settings)?),
    ];

    match credentials.take_optional("alpha_vantage_api_key") {
        Some(key) => sources.push(Arc::new(AlphaVantageFxAdapter::new(key, settings)?)),
        None => tracing::info!(
            env_var = ALPHA_VANTAGE_API_KEY_ENV,
            "Alpha Vantage key not set, skipping exchange rates"
        ),
    }

    Ok(sources)
}

async fn run_pipeline(args: RunArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => RuntimeConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => RuntimeConfig::default(),
    };
    if let Some(n) = args.max_in_flight {
        config.max_in_flight = n;
    }

    let full = load_matrix(args.matrix.as_deref())?;
    let matrix = if args.categories.is_empty() {
        full.clone()
    } else {
        full.select(&args.categories)?
    };

    // fail on every missing key before any network call
    let mut credentials = load_credentials(args.credentials.as_deref())?;
    let provider = build_provider(&mut credentials, args.base_url.as_deref())?;
    let sources = build_sources(&mut credentials, &config)?;

    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("failed to create {}", args.out_dir.display()))?;

    let orchestrator = Orchestrator::builder()
        .matrix(matrix)
        .provider(provider)
        .sources(sources)
        .config(config)
        .build()?;
    orchestrator
        .preflight()
        .await
        .context("check the OpenAI API key and --base-url")?;

    let cancel = orchestrator.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling remaining pairs");
            cancel.cancel();
        }
    });

    let outcome = orchestrator.run().await;
    let csv_path = write_outputs(&full, &outcome, &args.out_dir, args.json)?;

    print_summary(&outcome, &csv_path);
    Ok(())
}

fn write_outputs(
    full: &RiskMatrix,
    outcome: &RunOutcome,
    out_dir: &Path,
    json: bool,
) -> anyhow::Result<PathBuf> {
    let report = &outcome.report;
    let csv_path = out_dir.join(output::report_file_name(full, report, report.generated_at));
    output::write_csv(report.rows(), &csv_path)?;

    if json {
        output::write_json(report.rows(), &csv_path.with_extension("json"))?;
    }
    Ok(csv_path)
}

fn print_summary(outcome: &RunOutcome, csv_path: &Path) {
    let summary = outcome.report.summary();
    let usage = &outcome.usage;

    tracing::info!(
        total_tokens = usage.total_tokens,
        llm_calls = usage.llm_calls,
        estimated_cost = usage.estimated_cost,
        "AI usage"
    );

    println!("Report written to {}", csv_path.display());
    println!(
        "{} pairs: {} ok, {} partial evidence, {} failed",
        summary.total, summary.ok, summary.partial_evidence, summary.scoring_failed
    );
    if outcome.cancelled {
        println!("Run was cancelled; unfinished pairs are marked as cancelled.");
    }
}

fn validate(args: &ValidateArgs) -> anyhow::Result<()> {
    let matrix = load_matrix(args.matrix.as_deref())?;
    println!(
        "Matrix is valid: {} categories, {} pairs",
        matrix.categories().len(),
        matrix.pair_count()
    );
    Ok(())
}

fn convert(args: &ConvertArgs) -> anyhow::Result<()> {
    let out = output::convert(&args.csv, args.out.as_deref())?;
    println!("Wrote {}", out.display());
    Ok(())
}
