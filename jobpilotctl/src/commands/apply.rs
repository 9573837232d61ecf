use clap::{ArgAction, Args, ValueEnum};
use jobpilot_core::{Credentials, Platform, SearchFilters};

/// Logs in, searches the platform and applies to what it finds.
#[derive(Args, Debug, Clone)]
pub struct ApplyArgs {
    /// Target platform
    #[arg(long, value_enum)]
    pub platform: PlatformArg,
    /// Local user identifier the session belongs to
    #[arg(long = "user", value_name = "ID")]
    pub user_id: String,
    /// Keyword to search for (repeat the flag for several)
    #[arg(short, long = "keyword", action = ArgAction::Append, value_name = "KEYWORD", required = true)]
    pub keywords: Vec<String>,
    /// City or region filter
    #[arg(short, long)]
    pub location: Option<String>,
    /// Maximum applications in this run
    #[arg(long = "max", default_value_t = 10)]
    pub max_count: usize,
    /// Salary band label as shown on the platform
    #[arg(long)]
    pub salary: Option<String>,
    /// Experience band label as shown on the platform
    #[arg(long)]
    pub experience: Option<String>,
    /// Phone number for SMS login (Boss直聘)
    #[arg(long)]
    pub phone: Option<String>,
    /// Account name for password login
    #[arg(long)]
    pub username: Option<String>,
    /// Account password for password login
    #[arg(long)]
    pub password: Option<String>,
}

impl ApplyArgs {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            user_id: self.user_id.clone(),
            phone: self.phone.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }

    /// The platform search page is asked for a few more jobs than will be
    /// applied to, since blacklisted ones are skipped.
    pub fn filters(&self) -> SearchFilters {
        SearchFilters {
            salary: self.salary.clone(),
            experience: self.experience.clone(),
            limit: self.max_count.saturating_mul(2).max(SearchFilters::default().limit),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PlatformArg {
    Boss,
    Zhilian,
    Linkedin,
}

impl From<PlatformArg> for Platform {
    fn from(value: PlatformArg) -> Self {
        match value {
            PlatformArg::Boss => Platform::Boss,
            PlatformArg::Zhilian => Platform::Zhilian,
            PlatformArg::Linkedin => Platform::LinkedIn,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_ask_for_spare_jobs() {
        let args = ApplyArgs {
            platform: PlatformArg::Boss,
            user_id: "u1".into(),
            keywords: vec!["Go".into()],
            location: None,
            max_count: 40,
            salary: Some("20-50K".into()),
            experience: None,
            phone: Some("13800000000".into()),
            username: None,
            password: None,
        };
        assert_eq!(args.filters().limit, 80);
        assert_eq!(args.credentials().phone.as_deref(), Some("13800000000"));
        assert_eq!(Platform::from(args.platform), Platform::Boss);
    }
}
