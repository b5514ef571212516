use anyhow::{Context, Result};
use clap::Parser;
use dirsize::AggregatorOptions;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dirsize", about = "Report the total size of files under directories")]
pub struct Cli {
    /// Directories to measure
    #[arg(default_value = ".")]
    pub paths: Vec<PathBuf>,

    /// Resolve symbolic links instead of skipping them
    #[arg(short = 'L', long)]
    pub follow_links: bool,

    /// Count unreadable subdirectories as empty instead of failing
    #[arg(short = 'k', long)]
    pub skip_unreadable: bool,

    /// Also list the size of every direct child
    #[arg(short, long)]
    pub children: bool,

    /// Print sizes in KB/MB/GB instead of bytes
    #[arg(short = 'H', long)]
    pub human: bool,

    /// Print reports as JSON
    #[arg(long, conflicts_with = "human")]
    pub json: bool,

    /// Keep running and print again whenever a tree changes
    #[arg(short, long)]
    pub watch: bool,

    /// JSON file with default aggregator options
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Options from the config file, with flags taking precedence.
    pub fn options(&self) -> Result<AggregatorOptions> {
        let mut options = match &self.config {
            Some(path) => AggregatorOptions::load(path)
                .with_context(|| format!("Could not load options from {}", path.display()))?,
            None => AggregatorOptions::default(),
        };
        if self.follow_links {
            options = options.follow_links(true);
        }
        if self.skip_unreadable {
            options = options.skip_unreadable(true);
        }
        Ok(options)
    }
}
