use std::sync::OnceLock;

use regex::Regex;
use url::Url;

/// Fragments that name a job board rather than an employer.
const BOARD_WORDS: [&str; 6] = ["直聘", "招聘", "猎聘", "前程无忧", "拉勾", "智联"];

/// Query parameter names boards use for a free-text search.
const SEARCH_PARAMS: [&str; 8] = ["q", "query", "kw", "key", "keyword", "keywords", "kd", "k"];

pub fn host_of(link: &str) -> Option<String> {
    Url::parse(link)
        .ok()
        .and_then(|url| url.host_str().map(|host| host.to_ascii_lowercase()))
}

/// Absolute http(s) URL with a host.
pub fn is_actionable_link(link: &str) -> bool {
    match Url::parse(link.trim()) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
        Err(_) => false,
    }
}

/// Display name of the site a link belongs to.
pub fn platform_from_link(link: &str) -> String {
    let host = host_of(link).unwrap_or_default();
    let name = if host.contains("zhipin.com") {
        "Boss直聘"
    } else if host.contains("liepin.com") {
        "猎聘"
    } else if host.contains("zhaopin.com") {
        "智联招聘"
    } else if host.contains("51job.com") {
        "前程无忧"
    } else if host.contains("lagou.com") {
        "拉勾"
    } else if host.contains("linkedin.com") {
        "LinkedIn"
    } else if host.is_empty() {
        "web"
    } else {
        return host;
    };
    name.to_string()
}

/// True when the link's host is one of `sites` or a subdomain of one.
pub fn is_board_link(link: &str, sites: &[String]) -> bool {
    let Some(host) = host_of(link) else {
        return false;
    };
    sites.iter().any(|site| {
        let site = site.trim().to_ascii_lowercase();
        !site.is_empty() && (host == site || host.ends_with(&format!(".{site}")))
    })
}

/// URL-shape heuristic: a parametrized search or listing endpoint on a job
/// board, as opposed to a single job-detail page.
pub fn is_search_entry_link(link: &str) -> bool {
    let Ok(url) = Url::parse(link.trim()) else {
        return false;
    };
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    let path = url.path().to_ascii_lowercase();
    let has_search_param = url
        .query_pairs()
        .any(|(key, _)| SEARCH_PARAMS.contains(&key.as_ref()));

    if host.ends_with("zhipin.com") {
        return path.starts_with("/web/geek/job") || path.starts_with("/zhaopin/");
    }
    if host.ends_with("liepin.com") {
        return path.starts_with("/zhaopin");
    }
    if host == "sou.zhaopin.com" {
        return true;
    }
    if host.ends_with("zhaopin.com") {
        return path.starts_with("/sou");
    }
    if host.ends_with("51job.com") {
        return host.starts_with("search.") || path.starts_with("/pc/search");
    }
    if host.ends_with("lagou.com") {
        return (path.starts_with("/wn/jobs") && has_search_param) || path.starts_with("/jobs/list_");
    }
    if host.ends_with("linkedin.com") {
        return path.starts_with("/jobs/search");
    }
    let trimmed = path.trim_end_matches('/');
    (trimmed.ends_with("/search") || trimmed.ends_with("/jobs")) && has_search_param
}

/// Best-effort employer name from a search-result title such as
/// `「Python招聘」_苏州鼎级招聘-BOSS直聘` or `Python开发 - 某某科技 - Boss直聘`.
pub fn infer_company_from_title(title: &str) -> String {
    let title = title.trim();
    if title.is_empty() {
        return String::new();
    }
    let is_separator = |c: char| matches!(c, '-' | '|' | '｜');

    if let Some((_, tail)) = title.split_once('_') {
        let head = tail.split(is_separator).next().unwrap_or_default();
        let candidate = strip_hiring_words(head);
        let len = candidate.chars().count();
        if (1..=24).contains(&len) && !candidate.contains("直聘") {
            return candidate;
        }
    }

    title
        .split(is_separator)
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .skip(1)
        .take(2)
        .find(|part| {
            !BOARD_WORDS.iter().any(|word| part.contains(word))
                && (1..=24).contains(&part.chars().count())
        })
        .map(strip_hiring_words)
        .unwrap_or_default()
}

fn strip_hiring_words(value: &str) -> String {
    value.replace("招聘", "").replace("诚聘", "").trim().to_string()
}

/// Upper bound in thousands from salary text like `15-25K` or `20K`.
pub fn salary_upper_k(salary: &str) -> Option<u32> {
    static SALARY: OnceLock<Regex> = OnceLock::new();
    let regex = SALARY.get_or_init(|| {
        Regex::new(r"(?i)(\d+)\s*(?:[-~至]\s*(\d+))?\s*k").expect("valid regex")
    });
    let captures = regex.captures(salary)?;
    let bound = captures.get(2).or_else(|| captures.get(1))?;
    bound.as_str().parse().ok()
}
