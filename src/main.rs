//! Fetchtap CLI

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context};
use fetchtap::config::Config;
use fetchtap::network::{EntryPoint, FetchOptions, HyperFetch};
use fetchtap::recording::Recorder;
use fetchtap::storage::DirectorySink;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_OUT_DIR: &str = "captures";

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let command = &args[1];

    let result = match command.as_str() {
        "fetch" => run_fetch(&args[2..]),
        "check-config" => check_config(&args[2..]),
        _ => {
            eprintln!("Unknown command: {command}");
            eprintln!("Run 'fetchtap' for usage information.");
            process::exit(1);
        }
    };

    if let Err(e) = result {
        error!("{e:#}");
        process::exit(1);
    }
}

fn print_usage() {
    eprintln!("Fetchtap v{}", env!("CARGO_PKG_VERSION"));
    eprintln!();
    eprintln!("Usage: fetchtap <command> [options]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  fetch [--config FILE] [--out DIR] [--method M] <url>...");
    eprintln!("                 Fetch URLs through the recorder and export the captures");
    eprintln!("  check-config <file>");
    eprintln!("                 Validate a configuration file");
}

struct FetchArgs {
    config: Option<PathBuf>,
    out: Option<PathBuf>,
    method: String,
    urls: Vec<String>,
}

fn parse_fetch_args(args: &[String]) -> anyhow::Result<FetchArgs> {
    let mut parsed = FetchArgs {
        config: None,
        out: None,
        method: "GET".to_string(),
        urls: Vec::new(),
    };

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                parsed.config = Some(iter.next().context("--config needs a file")?.into());
            }
            "--out" => {
                parsed.out = Some(iter.next().context("--out needs a directory")?.into());
            }
            "--method" => {
                parsed.method = iter.next().context("--method needs a value")?.clone();
            }
            flag if flag.starts_with("--") => bail!("Unknown option: {flag}"),
            url => parsed.urls.push(url.to_string()),
        }
    }

    if parsed.urls.is_empty() {
        bail!("fetch needs at least one URL");
    }
    Ok(parsed)
}

fn run_fetch(args: &[String]) -> anyhow::Result<()> {
    let args = parse_fetch_args(args)?;

    let config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };

    let out_dir = args
        .out
        .clone()
        .or_else(|| config.export.dir.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUT_DIR));

    let runtime = tokio::runtime::Runtime::new().context("starting runtime")?;
    runtime.block_on(async move {
        let entry = Arc::new(EntryPoint::new(HyperFetch::new()));
        let sink = Arc::new(DirectorySink::new(&out_dir));
        let recorder = Recorder::new(&config, Arc::clone(&entry), sink)?;
        recorder.install();

        let supervisor = config
            .supervisor
            .enabled
            .then(|| recorder.supervisor(&config.supervisor).spawn());

        for url in &args.urls {
            let options = FetchOptions::new().method(args.method.clone());
            match entry.fetch(url.as_str(), options).await {
                Ok(response) => {
                    let status = response.status;
                    match response.body.collect_bytes().await {
                        Ok(body) => info!("{url}: {status} ({} bytes)", body.len()),
                        Err(e) => error!("{url}: {status}, body failed: {e}"),
                    }
                }
                Err(e) => error!("{url}: {e}"),
            }
        }

        recorder.settle().await;
        if let Some(supervisor) = supervisor {
            supervisor.shutdown().await;
        }

        println!("{}", serde_json::to_string_pretty(&recorder.get_stats())?);
        println!("{}", serde_json::to_string_pretty(&recorder.export_all())?);

        recorder.uninstall();
        anyhow::Ok(())
    })
}

fn check_config(args: &[String]) -> anyhow::Result<()> {
    let Some(path) = args.first() else {
        bail!("Usage: fetchtap check-config <file>");
    };

    let config = Config::from_file(path.as_ref())?;
    println!("Configuration OK");
    println!("  capture mode:   {}", config.capture.capture_mode);
    println!("  recording:      {}", config.capture.is_recording);
    println!("  max captures:   {}", config.capture.max_captures);
    println!("  file prefix:    {}", config.export.file_prefix);
    Ok(())
}
