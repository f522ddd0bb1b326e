use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "sawdust-watcher")]
#[command(about = "Watch a work area for sawdust and sound an alarm when it piles up")]
pub struct CliArgs {
    /// Output path for logs, captured images and the scan history
    #[arg(long)]
    pub log: String,

    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Override monitoring setting from config
    #[arg(long)]
    pub monitor: Option<bool>,

    /// Run a single scan and exit
    #[arg(long)]
    pub once: bool,

    /// Show the effective configuration without touching hardware
    #[arg(long)]
    pub dry_run: bool,

    /// Use simulated GPIO regardless of the configured backend
    #[arg(long)]
    pub simulate: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_args() {
        let args = CliArgs::parse_from(["sawdust-watcher", "--log", "~/watch", "--once", "--monitor", "true"]);
        assert_eq!(args.log, "~/watch");
        assert_eq!(args.config, "config.toml");
        assert!(args.once);
        assert_eq!(args.monitor, Some(true));
        assert!(!args.simulate);
    }

    #[test]
    fn test_log_is_required() {
        assert!(CliArgs::try_parse_from(["sawdust-watcher"]).is_err());
    }
}
