use anyhow::Result;
use clap::{Parser, Subcommand};
use compras_sync::JobKind;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "compras-cli")]
#[command(about = "Ingests compras.gov.br open data into PostgreSQL")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one ingestion job to completion.
    Run {
        /// arp, arp-item, contratacoes, contratacao-itens or licitacao
        job: JobKind,
    },
    /// Apply pending migrations.
    Migrate,
    /// List the available jobs.
    Jobs,
}

fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging()?;

    match cli.command {
        Commands::Run { job } => {
            let summary = compras_sync::run_job_from_env(job).await?;
            println!(
                "{} complete: run_id={} mode={} pages={} raw_inserted={} upserts={} skipped={}",
                summary.job,
                summary.run_id,
                summary.mode,
                summary.totals.pages,
                summary.totals.raw_inserted,
                summary.totals.upserts,
                summary.totals.skipped
            );
        }
        Commands::Migrate => {
            compras_sync::migrate_from_env().await?;
            println!("migrations applied");
        }
        Commands::Jobs => {
            for kind in JobKind::ALL {
                println!("{:<18} {}", kind.as_str(), kind.description());
            }
        }
    }

    Ok(())
}
