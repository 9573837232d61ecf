use crate::config::ApplySection;
use crate::model::JobPosting;
use crate::search::platform::salary_upper_k;

/// Company/title blacklist plus the optional whitelist and salary floor
/// used on platform search results.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    company_blacklist: Vec<String>,
    title_blacklist: Vec<String>,
    company_whitelist: Vec<String>,
    min_salary_k: Option<u32>,
}

impl JobFilter {
    pub fn new(
        company_blacklist: Vec<String>,
        title_blacklist: Vec<String>,
        company_whitelist: Vec<String>,
        min_salary_k: Option<u32>,
    ) -> Self {
        Self {
            company_blacklist: lowered(company_blacklist),
            title_blacklist: lowered(title_blacklist),
            company_whitelist: lowered(company_whitelist),
            min_salary_k,
        }
    }

    pub fn from_config(config: &ApplySection) -> Self {
        Self::new(
            config.company_blacklist.clone(),
            config.title_blacklist.clone(),
            config.company_whitelist.clone(),
            config.min_salary_k,
        )
    }

    /// Substring match of company or title against the blacklists,
    /// ignoring case.
    pub fn is_blacklisted(&self, job: &JobPosting) -> bool {
        let company = job.company.to_lowercase();
        let title = job.title.to_lowercase();
        self.company_blacklist
            .iter()
            .any(|entry| company.contains(entry.as_str()))
            || self
                .title_blacklist
                .iter()
                .any(|entry| title.contains(entry.as_str()))
    }

    /// Whitelist and salary floor. Postings without a parseable salary pass.
    pub fn meets_preferences(&self, job: &JobPosting) -> bool {
        if !self.company_whitelist.is_empty() {
            let company = job.company.to_lowercase();
            if !self
                .company_whitelist
                .iter()
                .any(|entry| company.contains(entry.as_str()))
            {
                return false;
            }
        }
        match (self.min_salary_k, salary_upper_k(&job.salary)) {
            (Some(floor), Some(upper)) => upper >= floor,
            _ => true,
        }
    }

    pub fn retain(&self, jobs: Vec<JobPosting>) -> Vec<JobPosting> {
        jobs.into_iter()
            .filter(|job| !self.is_blacklisted(job) && self.meets_preferences(job))
            .collect()
    }
}

fn lowered(entries: Vec<String>) -> Vec<String> {
    entries
        .into_iter()
        .map(|entry| entry.trim().to_lowercase())
        .filter(|entry| !entry.is_empty())
        .collect()
}
