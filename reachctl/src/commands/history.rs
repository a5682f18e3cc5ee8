use clap::Args;

/// Lists replies recorded in the ledger.
#[derive(Args, Debug, Clone)]
pub struct HistoryArgs {
    /// Only show replies made by this account
    #[arg(long)]
    pub account: Option<String>,

    /// Number of entries returned
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}
