mod analysis;
mod runs;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "reelscope-cli")]
#[command(about = "Reelscope analysis command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Run one analysis pass for a job
    Analyze {
        /// Job id to analyze
        #[arg(long)]
        job: i64,
        /// Maximum assets to analyze in this pass
        #[arg(long)]
        limit: Option<usize>,
        /// Let the pool provider fall back to degraded snapshots
        #[arg(long)]
        allow_degraded: bool,
        /// Print the pass outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// Repeat analysis passes for a job until its scope is covered
    Backfill {
        #[arg(long)]
        job: i64,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        max_cycles: Option<u32>,
        /// Stop once this fraction of eligible assets is analyzed (0.0-1.0)
        #[arg(long)]
        target_coverage: Option<f64>,
        #[arg(long)]
        json: bool,
    },
    /// Show analysis run history
    Runs {
        /// Filter to a single job
        #[arg(long)]
        job: Option<i64>,
        /// Only runs started at or after this RFC 3339 timestamp
        #[arg(long)]
        since: Option<DateTime<Utc>>,
        /// Only runs started before this RFC 3339 timestamp
        #[arg(long)]
        until: Option<DateTime<Utc>>,
        #[arg(long, default_value = "20")]
        limit: i64,
    },
    /// List the jobs the next scheduler cycle would visit
    EligibleJobs {
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check database connectivity
    Ping,
    /// Apply pending migrations
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("reelscope-cli ready; see --help for commands");
        return Ok(());
    };

    let config = reelscope_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let pool_config = reelscope_db::PoolConfig::from_app_config(&config);
    let pool = reelscope_db::connect_pool(&config.database_url, pool_config).await?;

    match command {
        Commands::Db { command } => match command {
            DbCommands::Ping => {
                reelscope_db::health_check(&pool).await?;
                println!("database ok");
            }
            DbCommands::Migrate => {
                reelscope_db::run_migrations(&pool).await?;
                println!("migrations applied");
            }
        },
        Commands::Analyze {
            job,
            limit,
            allow_degraded,
            json,
        } => {
            analysis::run_analyze(&pool, &config, job, limit, allow_degraded, json).await?;
        }
        Commands::Backfill {
            job,
            limit,
            max_cycles,
            target_coverage,
            json,
        } => {
            let overrides = analysis::BackfillOverrides {
                limit,
                max_cycles,
                target_coverage,
            };
            analysis::run_backfill(&pool, &config, job, overrides, json).await?;
        }
        Commands::Runs {
            job,
            since,
            until,
            limit,
        } => {
            runs::run_history(&pool, job, since, until, limit).await?;
        }
        Commands::EligibleJobs { limit } => {
            let limit = limit.unwrap_or(config.scheduler.max_jobs_per_cycle);
            runs::run_eligible_jobs(&pool, limit).await?;
        }
    }

    Ok(())
}
