use clap::{Args, Subcommand};

use super::PlatformArg;

#[derive(Subcommand, Debug, Clone)]
pub enum SessionCommands {
    /// Shows the stored login session without cookie values
    Show(SessionArgs),
    /// Deletes the stored login session
    Clear(SessionArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SessionArgs {
    #[arg(long, value_enum)]
    pub platform: PlatformArg,
    #[arg(long = "user", value_name = "ID")]
    pub user_id: String,
}
