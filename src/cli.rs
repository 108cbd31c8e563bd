use crate::config::parse_duration;
use crate::crawler::prefix::PrefixFilter;
use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Crawl EvaluationKit course evaluations and turn the PDFs into CSV rows.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Log formatter to use
    #[arg(long, value_enum, default_value_t = TracingFormat::Pretty, global = true)]
    pub tracing: TracingFormat,

    /// Config file (defaults to `course-evals.toml` when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Walk the public report search and save report PDFs
    Crawl(CrawlArgs),
    /// Ingest PDFs from a directory into the CSV store until interrupted
    Watch(WatchArgs),
    /// Collapse question histograms into `_n` / `_mean` columns
    Summarize(SummarizeArgs),
}

#[derive(ClapArgs, Debug, Default)]
pub struct CrawlArgs {
    /// Actually download PDFs (omit for a dry run)
    #[arg(long)]
    pub live: bool,

    /// Seconds to sleep between search API pages
    #[arg(short, long, value_parser = parse_delay)]
    pub delay: Option<Duration>,

    /// Relative output folder (default: the configured watch dir)
    #[arg(short, long, value_name = "DIR")]
    pub out: Option<String>,

    /// Absolute output folder
    #[arg(long, value_name = "DIR", conflicts_with = "out", value_parser = parse_absolute)]
    pub abs_out: Option<PathBuf>,

    /// Restrict the crawl: AS | EN | AS.xxx | EN.xxx
    #[arg(long, value_parser = clap::value_parser!(PrefixFilter))]
    pub prefix: Option<PrefixFilter>,
}

#[derive(ClapArgs, Debug, Default)]
pub struct WatchArgs {
    /// Directory to poll for PDFs
    #[arg(long, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// CSV store to append rows to
    #[arg(long, value_name = "FILE")]
    pub csv: Option<PathBuf>,

    /// Polling interval, e.g. `5s` or `500ms`
    #[arg(long, value_parser = parse_duration)]
    pub interval: Option<Duration>,
}

#[derive(ClapArgs, Debug)]
pub struct SummarizeArgs {
    /// CSV store to read
    #[arg(long, value_name = "FILE")]
    pub csv: Option<PathBuf>,

    /// Summary CSV to write
    #[arg(long, value_name = "FILE", default_value = "course_stats_parsed.csv")]
    pub out: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TracingFormat {
    /// Human-readable compact lines
    Pretty,
    /// One JSON object per event
    Json,
}

/// Non-negative seconds (`0.4`), or a unit-suffixed duration (`400ms`).
fn parse_delay(text: &str) -> Result<Duration, String> {
    match text.trim().parse::<f64>() {
        Ok(secs) => Duration::try_from_secs_f64(secs)
            .map_err(|_| format!("delay must be a non-negative number of seconds (got {text:?})")),
        Err(_) => parse_duration(text),
    }
}

fn parse_absolute(text: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(text);
    if path.is_absolute() {
        Ok(path)
    } else {
        Err(format!("--abs-out must be an absolute path (got {text:?})"))
    }
}

/// Resolve the crawl output directory and create it.
///
/// `--abs-out` is used as given. `--out` has backslashes turned into slashes
/// and a leading `~` expanded, then is taken relative to the current directory.
pub fn resolve_output_dir(args: &CrawlArgs, default: &Path) -> Result<PathBuf> {
    let dir = match (&args.abs_out, &args.out) {
        (Some(abs), _) => abs.clone(),
        (None, Some(rel)) => {
            let cwd = std::env::current_dir().context("Failed to read current directory")?;
            cwd.join(expand_relative(rel))
        }
        (None, None) => default.to_path_buf(),
    };

    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    Ok(dir)
}

fn expand_relative(raw: &str) -> PathBuf {
    let normalized = raw.replace('\\', "/");
    match normalized.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => {
            match std::env::var_os("HOME") {
                Some(home) => PathBuf::from(home).join(rest.trim_start_matches('/')),
                None => PathBuf::from(normalized),
            }
        }
        _ => PathBuf::from(normalized),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    fn crawl(argv: &[&str]) -> Result<CrawlArgs, clap::Error> {
        let args = Args::try_parse_from(["course-evals", "crawl"].iter().chain(argv))?;
        match args.command {
            Command::Crawl(c) => Ok(c),
            other => panic!("expected crawl, got {other:?}"),
        }
    }

    #[test]
    fn test_crawl_defaults() {
        let args = crawl(&[]).unwrap();
        assert!(!args.live);
        assert_eq!(args.delay, None);
        assert_eq!(args.prefix, None);
    }

    #[test]
    fn test_crawl_flags() {
        let args = crawl(&["--live", "-d", "1.5", "-o", "out", "--prefix", " as.010 "]).unwrap();
        assert!(args.live);
        assert_eq!(args.delay, Some(Duration::from_millis(1500)));
        assert_eq!(args.out.as_deref(), Some("out"));
        assert_eq!(args.prefix, Some(PrefixFilter::Exact("AS.010".to_owned())));
    }

    #[test]
    fn test_delay_accepts_units() {
        let args = crawl(&["--delay", "250ms"]).unwrap();
        assert_eq!(args.delay, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_negative_delay_rejected() {
        let err = crawl(&["--delay=-1"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn test_invalid_prefix_is_usage_error() {
        let err = crawl(&["--prefix", "ME.530"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_out_and_abs_out_conflict() {
        let err = crawl(&["-o", "a", "--abs-out", "/tmp/b"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_abs_out_must_be_absolute() {
        let err = crawl(&["--abs-out", "relative/dir"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn test_expand_relative() {
        assert_eq!(expand_relative(r"pdfs\fall"), PathBuf::from("pdfs/fall"));
        assert_eq!(expand_relative("~user/x"), PathBuf::from("~user/x"));
        if let Some(home) = std::env::var_os("HOME") {
            assert_eq!(expand_relative("~/pdfs"), PathBuf::from(home).join("pdfs"));
        }
    }

    #[test]
    fn test_resolve_output_dir_creates_abs_out() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("nested/pdfs");
        let args = CrawlArgs {
            abs_out: Some(target.clone()),
            ..CrawlArgs::default()
        };

        let dir = resolve_output_dir(&args, Path::new("unused")).unwrap();
        assert_eq!(dir, target);
        assert!(target.is_dir());
    }

    #[test]
    fn test_watch_and_summarize_args() {
        let args = Args::try_parse_from([
            "course-evals", "--tracing", "json", "watch", "--dir", "in", "--interval", "2s",
        ])
        .unwrap();
        assert_eq!(args.tracing, TracingFormat::Json);
        let Command::Watch(watch) = args.command else {
            panic!("expected watch");
        };
        assert_eq!(watch.dir, Some(PathBuf::from("in")));
        assert_eq!(watch.interval, Some(Duration::from_secs(2)));

        let args = Args::try_parse_from(["course-evals", "summarize"]).unwrap();
        let Command::Summarize(summarize) = args.command else {
            panic!("expected summarize");
        };
        assert_eq!(summarize.out, PathBuf::from("course_stats_parsed.csv"));
    }
}
