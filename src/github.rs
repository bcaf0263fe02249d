// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! GitHub issue search client.

use crate::dates::DateRange;
use crate::error::StatsError;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Deserialize;

const GITHUB_API_BASE: &str = "https://api.github.com";

/// The search API never returns more than this many results for one query.
const SEARCH_RESULT_CAP: u64 = 1000;

const PER_PAGE: usize = 100;

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    pub total_count: u64,
    #[serde(default)]
    pub incomplete_results: bool,
    pub items: Vec<Issue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub labels: Vec<Label>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Label {
    pub name: String,
}

impl Issue {
    pub fn label_names(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(|l| l.name.as_str())
    }
}

/// Which issues to search for.
#[derive(Debug, Clone)]
pub struct IssueQuery {
    pub repo: String,
    pub label: String,
}

impl IssueQuery {
    /// Search qualifiers for issues created within `window`.
    pub fn qualifiers(&self, window: DateRange) -> String {
        // `created:a..b` is inclusive at both ends.
        let last = window.end().pred_opt().unwrap_or(window.end());
        format!(
            "repo:{} is:issue label:{} created:{}..{}",
            self.repo,
            self.label,
            window.start(),
            last
        )
    }
}

/// One page of issue search results.
#[allow(async_fn_in_trait)]
pub trait SearchPages {
    async fn search_page(&self, q: &str, page: u64) -> Result<SearchResponse>;
}

/// What to do with a window after seeing the first page of its results.
#[derive(Debug, PartialEq, Eq)]
pub enum WindowPlan {
    /// Too many matches: search each half separately.
    Split(DateRange, DateRange),
    /// Page through the results. `truncated` is set when the window cannot
    /// be split any further and some matches will be missed.
    Fetch { truncated: bool },
}

pub fn plan_window(window: DateRange, total_count: u64) -> WindowPlan {
    if total_count <= SEARCH_RESULT_CAP {
        return WindowPlan::Fetch { truncated: false };
    }
    match window.bisect() {
        Some((earlier, later)) => WindowPlan::Split(earlier, later),
        None => WindowPlan::Fetch { truncated: true },
    }
}

/// The page to request after `page`, given how many items it held.
pub fn next_page(page: u64, items_on_page: usize) -> Option<u64> {
    let short = items_on_page < PER_PAGE;
    let at_cap = page * PER_PAGE as u64 >= SEARCH_RESULT_CAP;
    (!short && !at_cap).then_some(page + 1)
}

/// Query parameters for one search page. Results are sorted by creation
/// time so that pages do not shift between requests.
fn search_params(q: &str, page: u64) -> [(&'static str, String); 5] {
    [
        ("q", q.to_string()),
        ("per_page", PER_PAGE.to_string()),
        ("page", page.to_string()),
        ("sort", "created".to_string()),
        ("order", "asc".to_string()),
    ]
}

/// Fetch every issue matching `query` created in `window`.
///
/// Windows with more matches than a single search can return are split in
/// half until each part fits.
pub async fn search_issues<S: SearchPages>(
    pages: &S,
    query: &IssueQuery,
    window: DateRange,
) -> Result<Vec<Issue>> {
    let mut issues = Vec::new();
    let mut pending = vec![window];

    while let Some(window) = pending.pop() {
        if window.is_empty() {
            continue;
        }
        let q = query.qualifiers(window);
        let first = pages.search_page(&q, 1).await?;

        match plan_window(window, first.total_count) {
            WindowPlan::Split(earlier, later) => {
                tracing::debug!(%window, total = first.total_count, "splitting search window");
                pending.push(later);
                pending.push(earlier);
                continue;
            }
            WindowPlan::Fetch { truncated: true } => {
                tracing::warn!(
                    %window,
                    total = first.total_count,
                    "more issues on one day than a search can return, results truncated"
                );
            }
            WindowPlan::Fetch { truncated: false } => {}
        }

        let mut next = next_page(1, first.items.len());
        let mut found = first.items;
        while let Some(page) = next {
            let response = pages.search_page(&q, page).await?;
            next = next_page(page, response.items.len());
            found.extend(response.items);
        }

        tracing::debug!(%window, issues = found.len(), "searched window");
        issues.extend(found);
    }

    Ok(issues)
}

pub struct GithubClient {
    client: reqwest::Client,
    token: String,
}

impl GithubClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: token.into(),
        }
    }

    pub async fn search_issues(
        &self,
        query: &IssueQuery,
        window: DateRange,
    ) -> Result<Vec<Issue>> {
        search_issues(self, query, window).await
    }
}

impl SearchPages for GithubClient {
    async fn search_page(&self, q: &str, page: u64) -> Result<SearchResponse> {
        let url = format!("{}/search/issues", GITHUB_API_BASE);
        let response = self
            .client
            .get(&url)
            .query(&search_params(q, page))
            .header("User-Agent", "riot-stats-collector")
            .header("Accept", "application/vnd.github.v3+json")
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| StatsError::connection("GitHub API", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "GitHub search failed with status {} on page {} of '{}': {}",
                status,
                page,
                q,
                body
            );
        }

        let result: SearchResponse = response
            .json()
            .await
            .map_err(|e| StatsError::query(format!("parse search page {} of '{}'", page, q), e))?;

        if result.incomplete_results {
            tracing::warn!(query = q, page, "GitHub reported incomplete search results");
        }
        Ok(result)
    }
}
