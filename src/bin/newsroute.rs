#![forbid(unsafe_code)]

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use newsroute_harness::bench::{self, BenchContext};
use newsroute_harness::gateway::{
    Attribution, OpenAiAdapter, PriceTable, ProviderGateway, TracingUsageSink,
};
use newsroute_harness::metrics::{
    render_batch_details, render_batch_table, render_comparison_table, render_detailed_breakdown,
    render_hybrid_report, render_router_report, render_sweep, JsonlResultSink,
};
use newsroute_harness::router::GatewayEmbedder;
use newsroute_harness::BenchConfig;

#[derive(Parser)]
#[command(
    name = "newsroute",
    version,
    about = "Compare LLM, semantic-router and hybrid news classification"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Debug-level logs (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify test articles with each configured model
    Baseline {
        /// Submit one bulk job per model instead of one call per article
        #[arg(long)]
        batch: bool,
    },
    /// Classify test articles with the semantic router alone
    Router,
    /// Router first, LLM fallback, fallback answers added as references
    Hybrid,
    /// Show how the distance threshold changes router matches
    Sweep,
}

fn setup_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let cfg = BenchConfig::from_env()?;
    let run_id = Uuid::new_v4();
    let attribution = Attribution::new("newsroute").with_run(run_id);
    tracing::info!(%run_id, "starting run");

    let adapter = OpenAiAdapter::with_config(
        cfg.require_api_key()?,
        cfg.base_url.as_str(),
        cfg.request_timeout,
        PriceTable::openai_sync(),
    )?;
    let usage = Arc::new(TracingUsageSink);

    let (sink, worker) = match &cfg.results_jsonl {
        Some(path) => {
            let (sink, worker) = JsonlResultSink::new(path)?;
            (Some(sink), Some(worker))
        }
        None => (None, None),
    };
    let mut ctx = BenchContext::new(&cfg, attribution.clone());
    if let Some(sink) = &sink {
        ctx = ctx.with_sink(sink);
    }

    match cli.command {
        Commands::Baseline { batch: false } => {
            let gateway = ProviderGateway::new(adapter, usage);
            let summaries = bench::run_baseline(&ctx, gateway).await?;
            println!("{}", render_comparison_table(&summaries));
            println!("{}", render_detailed_breakdown(&summaries));
        }
        Commands::Baseline { batch: true } => {
            let comparison = bench::run_baseline_batch(&ctx, adapter).await?;
            for (model, reason) in &comparison.failed {
                println!("{model}: FAILED ({reason})");
            }
            println!("{}", render_batch_table(&comparison.completed));
            println!("{}", render_batch_details(&comparison.completed));
        }
        Commands::Router => {
            let embedder = GatewayEmbedder::new(
                adapter,
                cfg.embed_model.as_str(),
                usage,
                attribution.clone(),
            );
            let summary = bench::run_router(&ctx, embedder).await?;
            println!(
                "{}",
                render_router_report(
                    &summary,
                    cfg.router.distance_threshold,
                    cfg.router.aggregation
                )
            );
        }
        Commands::Hybrid => {
            let embedder = GatewayEmbedder::new(
                adapter.clone(),
                cfg.embed_model.as_str(),
                Arc::clone(&usage),
                attribution.clone(),
            );
            let gateway = ProviderGateway::new(adapter, usage);
            let summary = bench::run_hybrid(&ctx, embedder, gateway).await?;
            println!("{}", render_hybrid_report(&summary));
        }
        Commands::Sweep => {
            let embedder = Arc::new(GatewayEmbedder::new(
                adapter,
                cfg.embed_model.as_str(),
                usage,
                attribution.clone(),
            ));
            let rows = bench::run_sweep(embedder).await?;
            println!("{}", render_sweep(&rows));
        }
    }

    drop(ctx);
    drop(sink);
    if let Some(worker) = worker {
        worker.join()?;
    }
    Ok(())
}
