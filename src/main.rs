use std::path::PathBuf;
use std::process;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::LevelFilter;

use ranger::downloader::chunker::{ChunkerOptions, DEFAULT_BATCH_SIZE};
use ranger::downloader::{self, DownloadOptions, DEFAULT_SEGMENTS, DEFAULT_USER_AGENT};

#[derive(Parser)]
#[clap(about = "Download a file over HTTP using concurrent range requests")]
struct Args {
    #[clap(help = "URL of the resource to download")]
    url: String,
    #[clap(help = "Output file path")]
    output: PathBuf,
    #[clap(
        long,
        default_value_t = DEFAULT_SEGMENTS,
        value_parser = parse_positive,
        help = "Number of concurrent range requests"
    )]
    segments: usize,
    #[clap(long, help = "Delay in milliseconds between writes of queued chunks")]
    pause_ms: Option<u64>,
    #[clap(
        long,
        default_value_t = DEFAULT_BATCH_SIZE,
        value_parser = parse_positive,
        help = "Chunks written per drain iteration"
    )]
    batch_size: usize,
    #[clap(long, help = "Abort the download as soon as one range fails")]
    fail_fast: bool,
    #[clap(long, default_value = DEFAULT_USER_AGENT, help = "User agent sent with every request")]
    user_agent: String,
    #[clap(long, default_value_t = 10, help = "Connect timeout in seconds")]
    connect_timeout: u64,
    #[clap(long, help = "Hide the progress bar")]
    quiet: bool,
    #[clap(long, help = "Enable debug mode")]
    debug: bool,
}

fn parse_positive(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(err) => Err(err.to_string()),
    }
}

impl Args {
    fn download_options(&self) -> DownloadOptions {
        DownloadOptions {
            segments: self.segments,
            user_agent: self.user_agent.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout),
            chunker: ChunkerOptions {
                pause: self.pause_ms.map(Duration::from_millis),
                batch_size: self.batch_size,
                fail_fast: self.fail_fast,
            },
            show_progress: !self.quiet,
        }
    }
}

async fn run(args: &Args) -> Result<()> {
    let report = downloader::download_file(&args.url, &args.output, &args.download_options())
        .await
        .with_context(|| format!("Failed to download {}", args.url))?;

    if !report.save.failures.is_empty() {
        for failure in &report.save.failures {
            log::warn!("Range {} is missing: {}", failure.range, failure.error);
        }
        log::warn!(
            "{} of {} ranges failed, {} is incomplete",
            report.save.failures.len(),
            report.ranges.len(),
            args.output.display()
        );
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Usage errors exit with 1 like every other failure; help and version exit 0.
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) if err.use_stderr() => {
            err.print().ok();
            process::exit(1);
        }
        Err(err) => err.exit(),
    };

    let log_level = if args.debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::builder().filter_level(log_level).init();

    if let Err(err) = run(&args).await {
        log::error!("Error: {:#}", err);
        process::exit(1);
    }

    log::info!("File downloaded successfully!");
    Ok(())
}
