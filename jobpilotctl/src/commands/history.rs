use clap::Args;

/// Lists recorded application attempts, newest first.
#[derive(Args, Debug, Clone)]
pub struct HistoryArgs {
    #[arg(long = "user", value_name = "ID")]
    pub user_id: String,
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}
