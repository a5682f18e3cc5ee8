use clap::Args;

/// Verifies the stored session and logs in when it has expired.
#[derive(Args, Debug, Clone)]
pub struct LoginArgs {
    /// Browser profile to check or establish
    #[arg(long, default_value = "default")]
    pub session: String,

    /// Override the configured headless mode
    #[arg(long)]
    pub headless: Option<bool>,
}
