use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use anomalyscope::config::{Config, LogFormat};
use anomalyscope::detect::{Scorer, ZScoreScorer};
use anomalyscope::pipeline::{self, ParamRequest, ResultsOutcome, RunReport, RunResult};
use anomalyscope::report::export::{self, EXPORT_FILE_NAME};

#[derive(Parser)]
#[command(
    name = "anomalyscope",
    about = "Interactive CSV outlier review powered by Isolation Forest",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web UI
    Serve {
        /// Bind address (overrides the config file)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Score a CSV file once and write the flagged rows
    Analyze {
        /// CSV file to analyse
        #[arg(long)]
        input: PathBuf,

        /// First feature (defaults to the first numeric column)
        #[arg(long)]
        feature_x: Option<String>,

        /// Second feature (defaults to the second numeric column)
        #[arg(long)]
        feature_y: Option<String>,

        /// Expected fraction of outliers, 0.01 to 0.20
        #[arg(long)]
        contamination: Option<f64>,

        /// Where to write the anomaly list
        #[arg(long, default_value = EXPORT_FILE_NAME)]
        output: PathBuf,

        /// Score with per-feature z-scores instead of the Isolation Forest
        #[arg(long)]
        zscore: bool,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    match config.logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::resolve(cli.config.as_deref())?;
    init_tracing(&config);

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            tracing::info!(bind = %config.server.bind, "starting anomalyscope server");
            anomalyscope::serve(config).await?;
        }
        Commands::Analyze {
            input,
            feature_x,
            feature_y,
            contamination,
            output,
            zscore,
            json,
        } => {
            let bytes = std::fs::read(&input)
                .with_context(|| format!("failed to read {}", input.display()))?;
            let request = ParamRequest {
                feature_x,
                feature_y,
                contamination,
            };
            let scorer: Box<dyn Scorer> = if zscore {
                Box::new(ZScoreScorer)
            } else {
                Box::new(config.model.build())
            };
            tracing::info!(input = %input.display(), scorer = scorer.name(), "analyzing file");

            let outcome = pipeline::run(&bytes, &request, scorer.as_ref());

            if let Ok(RunResult::Scored(scored)) = &outcome {
                match scored.outcome() {
                    ResultsOutcome::Anomalies { .. } => {
                        let csv = export::to_csv(&scored.anomalies())?;
                        std::fs::write(&output, csv)
                            .with_context(|| format!("failed to write {}", output.display()))?;
                    }
                    // A list left by an earlier run no longer describes this one.
                    ResultsOutcome::NoAnomalies if output.exists() => {
                        std::fs::remove_file(&output)
                            .with_context(|| format!("failed to remove stale {}", output.display()))?;
                        tracing::info!(output = %output.display(), "removed stale anomaly list");
                    }
                    ResultsOutcome::NoAnomalies => {}
                }
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&RunReport::from_outcome(&outcome))?);
            } else {
                print_summary(&outcome, &output);
            }

            match outcome {
                Err(e) => return Err(e.into()),
                Ok(RunResult::ValidationFailed { reason, .. }) => return Err(reason.into()),
                Ok(RunResult::Scored(_)) => {}
            }
        }
    }

    Ok(())
}

fn print_summary(outcome: &Result<RunResult, pipeline::PipelineError>, output: &std::path::Path) {
    match outcome {
        Err(e) => println!("{}", pipeline::error_message(e)),
        Ok(RunResult::ValidationFailed { reason, .. }) => println!("{}", reason),
        Ok(RunResult::Scored(scored)) => {
            let params = scored.params();
            println!("\n=== Anomaly Detection: {} vs {} ===", params.feature_x, params.feature_y);
            println!("Rows:          {}", scored.dataset().len());
            println!("Contamination: {:.2}", params.contamination);
            match scored.outcome() {
                ResultsOutcome::NoAnomalies => {
                    println!("\n{}", pipeline::NO_ANOMALIES_MESSAGE);
                    println!("No anomaly list written.");
                }
                ResultsOutcome::Anomalies { count } => {
                    println!("\nFound {} suspicious data points.", count);
                    let table = scored.anomalies();
                    println!("{}", table.columns().join(" | "));
                    for row in table.rows() {
                        println!("{}", row.join(" | "));
                    }
                    println!("\nAnomaly list written to {}", output.display());
                }
            }
            println!();
        }
    }
}
