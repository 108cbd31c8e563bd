use clap::Parser;
use course_evals::app::App;
use course_evals::cli::{Args, Command, TracingFormat};
use course_evals::config::Config;
use course_evals::logging::setup_logging;
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // Parse CLI arguments; usage errors exit here with status 2
    let args = Args::parse();

    // Config has to load before logging exists, so report failure on stderr
    let config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    setup_logging(&config, args.tracing);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        base_url = config.base_url,
        "starting course-evals"
    );

    let app = App::new(config);
    let result = match &args.command {
        Command::Crawl(crawl) => {
            // No bar under JSON logging; stderr stays line-delimited.
            let show_progress = args.tracing == TracingFormat::Pretty;
            app.crawl(crawl, show_progress).await.map(|report| {
                info!(failed_prefixes = report.failed_prefixes, "crawl finished");
            })
        }
        Command::Watch(watch) => {
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!(error = ?e, "Failed to listen for Ctrl-C");
                    std::future::pending::<()>().await;
                }
                info!("Received Ctrl-C, stopping");
            };
            app.watch(watch, shutdown).await
        }
        Command::Summarize(summarize) => app.summarize(summarize).map(|rows| {
            info!(rows, out = %summarize.out.display(), "summary written");
        }),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = ?e, "course-evals failed");
            ExitCode::FAILURE
        }
    }
}
