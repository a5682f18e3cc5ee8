use clap::Args;

/// Lists stored browser sessions.
#[derive(Args, Debug, Clone)]
pub struct SessionsArgs {
    /// Remove sessions idle longer than the configured TTL first
    #[arg(long)]
    pub cleanup: bool,
}
