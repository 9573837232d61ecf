use clap::{ArgAction, Args};
use jobpilot_core::SearchRequest;

/// Searches every configured job source in priority order.
#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    /// Keyword to search for (repeat the flag for several)
    #[arg(short, long = "keyword", action = ArgAction::Append, value_name = "KEYWORD", required = true)]
    pub keywords: Vec<String>,
    /// Preferred city or region
    #[arg(short, long)]
    pub location: Option<String>,
    /// Maximum number of postings returned
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
    /// Never fall back to board search-entry links
    #[arg(long = "no-portal-fallback")]
    pub no_portal_fallback: bool,
}

impl SearchArgs {
    pub fn to_request(&self) -> SearchRequest {
        SearchRequest {
            keywords: self.keywords.clone(),
            location: self.location.clone(),
            limit: Some(self.limit),
            allow_portal_fallback: Some(!self.no_portal_fallback),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_fallback_opt_out() {
        let args = SearchArgs {
            keywords: vec!["Rust".into()],
            location: Some("深圳".into()),
            limit: 5,
            no_portal_fallback: true,
        };
        let request = args.to_request();
        assert_eq!(request.allow_portal_fallback, Some(false));
        assert_eq!(request.limit, Some(5));
    }
}
