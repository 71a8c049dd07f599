use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "crawlbot", about = "Distributed web crawler with indexed full-text search")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Enqueue a crawl starting from a seed URL
    Crawl {
        /// Seed URL
        #[arg(short, long)]
        url: String,

        /// Maximum crawl depth
        #[arg(short, long, default_value = "3")]
        depth: u32,

        /// Politeness delay in seconds between requests to the same host
        #[arg(short, long, default_value = "1")]
        politeness: f64,
    },
    /// Search the full-text index
    Search {
        /// Query keywords
        #[arg(short = 'k', long)]
        keywords: String,

        /// Query mode: match, phrase, or boolean
        #[arg(short, long, default_value = "match")]
        mode: String,

        /// Max results
        #[arg(short = 'n', long, default_value = "10")]
        size: u32,
    },
    /// Show crawl and index status
    Status,
    /// Run the supervisor (heartbeat + stale task requeue) in the foreground
    Monitor,
    /// Run a crawl worker that consumes the broker's crawl queue
    Worker,
    /// Run the HTTP search surface
    Serve {
        /// Address to bind
        #[arg(short, long, default_value = "0.0.0.0:8080")]
        bind: String,
    },
}
