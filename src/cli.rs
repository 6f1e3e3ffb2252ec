use clap::{Parser, ValueEnum};

#[derive(Parser)]
#[command(name = "ma-tracer")]
#[command(about = "Detect Manifest Agent pods that claim the same stream")]
pub struct Cli {
    /// URL for the Kubernetes API server, e.g. http://127.0.0.1:8080
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    pub apiserver: String,

    /// Kubeconfig context to use instead of --apiserver
    #[arg(long)]
    pub context: Option<String>,

    /// Namespace of the endpoints object
    #[arg(short = 'n', long, default_value = "default")]
    pub namespace: String,

    /// Name of the endpoints object backing the Manifest Agents
    #[arg(short = 'e', long, default_value = "manifest-agent")]
    pub endpoints: String,

    /// Seconds between reconciliation passes
    #[arg(short = 'i', long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: u64,

    /// Also re-run whenever the endpoints object changes
    #[arg(long)]
    pub watch: bool,

    /// Run a single pass and exit
    #[arg(long, conflicts_with = "watch")]
    pub once: bool,

    /// Maximum number of status queries in flight
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    pub concurrency: u16,

    /// Seconds before a status query is abandoned
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..))]
    pub status_timeout: u64,

    /// Report format
    #[arg(short = 'o', long, value_enum, default_value_t = OutputFormat::Json)]
    pub output: OutputFormat,

    /// Enable debug logging
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Yaml,
}
