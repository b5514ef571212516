mod cli;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use dirsize::crawler::{ListingCrawler, ListingReport};
use dirsize::format::SizeStyle;
use dirsize::task::SizeTask;
use dirsize::watch::ReportWatcher;
use dirsize::{AggregatorOptions, SizeAggregator, SizeReport, TraversalError};
use log::info;
use std::path::Path;
use std::time::Duration;

const WATCH_POLL: Duration = Duration::from_millis(250);

struct Printer {
    style: SizeStyle,
    json: bool,
}

impl Printer {
    fn total(&self, report: &SizeReport) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string(report)?);
            return Ok(());
        }
        println!("{}\t{}", self.style.render(report.total_bytes), report.path.display());
        for path in &report.unreadable {
            eprintln!("warning: counted as empty: {}", path.display());
        }
        Ok(())
    }

    fn listing(&self, report: &ListingReport) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string(report)?);
            return Ok(());
        }
        for child in &report.children {
            println!("{}\t{}", self.style.render(child.size), child.path.display());
        }
        println!("{}\t{}", self.style.render(report.total_bytes), report.path.display());
        Ok(())
    }

    fn failure(&self, err: &TraversalError) {
        eprintln!("error: {}", err);
    }
}

/// Measure one path and print it. Returns whether it succeeded.
fn measure(options: AggregatorOptions, children: bool, path: &Path, printer: &Printer) -> Result<bool> {
    let outcome = if children {
        ListingCrawler::new(options)
            .scan_children(path)
            .map(|report| printer.listing(&report))
    } else {
        SizeAggregator::new(options)
            .compute_size(path)
            .map(|report| printer.total(&report))
    };
    match outcome {
        Ok(printed) => printed.map(|_| true),
        Err(err) => {
            printer.failure(&err);
            Ok(false)
        }
    }
}

/// Size every path on its own worker, printing results in argument order.
fn run_totals(options: AggregatorOptions, cli: &Cli, printer: &Printer) -> Result<usize> {
    let aggregator = SizeAggregator::new(options);
    let tasks: Vec<SizeTask> = cli
        .paths
        .iter()
        .map(|path| SizeTask::spawn(aggregator, path))
        .collect();

    let mut failures = 0;
    for task in tasks {
        match task.wait() {
            Ok(report) => printer.total(&report)?,
            Err(err) => {
                printer.failure(&err);
                failures += 1;
            }
        }
    }
    Ok(failures)
}

fn run_listings(options: AggregatorOptions, cli: &Cli, printer: &Printer) -> Result<usize> {
    let mut failures = 0;
    for path in &cli.paths {
        if !measure(options, true, path, printer)? {
            failures += 1;
        }
    }
    Ok(failures)
}

fn watch_loop(options: AggregatorOptions, cli: &Cli, printer: &Printer) -> Result<()> {
    let mut watchers = Vec::new();
    for path in &cli.paths {
        match ReportWatcher::watch(path) {
            Ok(watcher) => watchers.push(watcher),
            Err(err) => eprintln!("error: cannot watch {}: {}", path.display(), err),
        }
    }
    if watchers.is_empty() {
        return Ok(());
    }

    info!("watching {} path(s) for changes", watchers.len());
    loop {
        for watcher in &mut watchers {
            if watcher.wait_stale(WATCH_POLL) {
                watcher.refresh();
                let path = watcher.path().to_path_buf();
                measure(options, cli.children, &path, printer)?;
            }
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let options = cli.options()?;
    let printer = Printer {
        style: if cli.human { SizeStyle::Human } else { SizeStyle::Bytes },
        json: cli.json,
    };

    let failures = if cli.children {
        run_listings(options, &cli, &printer)?
    } else {
        run_totals(options, &cli, &printer)?
    };

    if cli.watch {
        watch_loop(options, &cli, &printer)?;
    }

    if failures > 0 {
        std::process::exit(1);
    }
    Ok(())
}
