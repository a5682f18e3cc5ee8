mod history;
mod login;
mod run;
mod sessions;

pub use history::HistoryArgs;
pub use login::LoginArgs;
pub use run::{ActionArg, RunArgs};
pub use sessions::SessionsArgs;
