use clap::{ArgGroup, Args, ValueEnum};
use reach_core::engage::{ActionPlan, EngageResult, SearchCriterion};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ActionArg {
    Favorite,
    Reply,
    Both,
}

impl From<ActionArg> for ActionPlan {
    fn from(value: ActionArg) -> Self {
        match value {
            ActionArg::Favorite => ActionPlan::Favorite,
            ActionArg::Reply => ActionPlan::Reply,
            ActionArg::Both => ActionPlan::Both,
        }
    }
}

/// Discovers items and engages with them until the target is reached.
#[derive(Args, Debug, Clone)]
#[command(group(ArgGroup::new("criterion").required(true).args(["tag", "query"])))]
pub struct RunArgs {
    /// Tag to search, with or without the leading '#'
    #[arg(long)]
    pub tag: Option<String>,

    /// Free-text search
    #[arg(short, long)]
    pub query: Option<String>,

    /// Action applied to each item
    #[arg(short, long, value_enum, default_value_t = ActionArg::Favorite)]
    pub action: ActionArg,

    /// Number of items that must succeed
    #[arg(short, long, default_value_t = 10)]
    pub target: usize,

    /// Use this reply text instead of generating one
    #[arg(long)]
    pub reply_text: Option<String>,

    /// Browser profile holding the logged-in session
    #[arg(long, default_value = "default")]
    pub session: String,

    /// Account name the reply ledger is keyed by (defaults to the username)
    #[arg(long)]
    pub account: Option<String>,

    /// Override the configured headless mode
    #[arg(long)]
    pub headless: Option<bool>,
}

impl RunArgs {
    pub fn criterion(&self) -> EngageResult<SearchCriterion> {
        match (&self.tag, &self.query) {
            (Some(tag), _) => SearchCriterion::tag(tag),
            (None, Some(query)) => SearchCriterion::text(query),
            (None, None) => SearchCriterion::text(""),
        }
    }
}
