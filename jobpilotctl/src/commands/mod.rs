mod apply;
mod history;
mod search;
mod session;

pub use apply::{ApplyArgs, PlatformArg};
pub use history::HistoryArgs;
pub use search::SearchArgs;
pub use session::{SessionArgs, SessionCommands};
