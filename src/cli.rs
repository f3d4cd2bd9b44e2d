use clap::Parser;

#[derive(clap::Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Authentication token sent as the Authorization header
    #[arg(long)]
    pub token: Option<String>,

    /// Enumeration mode
    #[arg(long, value_parser = ["auth", "unauth"], default_value = "unauth")]
    pub mode: String,

    /// Module to run, or `all`
    #[arg(long, value_parser = ["all", "asn", "dns", "services", "cdn", "servers"], default_value = "all")]
    pub module: String,

    /// Output file for results
    #[arg(short = 'o', long, default_value = "infra_enum_results.json")]
    pub output: String,

    /// Concurrent in-flight requests per module
    #[arg(short = 'w', long, default_value_t = 10_usize)]
    pub workers: usize,

    /// Delay between requests in milliseconds
    #[arg(long, default_value_t = 500_u64)]
    pub delay_ms: u64,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 10_u64)]
    pub timeout: u64,

    /// Attempts per target (default: 3, max: 10)
    #[arg(short = 'r', long, default_value_t = 3_u32)]
    pub retries: u32,

    /// Enable detailed debug logging
    #[arg(long, default_value_t = false)]
    pub debug: bool,

    /// Enable verbose logging
    #[arg(long, default_value_t = false)]
    pub verbose: bool,
}

pub fn parse_cli() -> Cli {
    Cli::parse()
}
