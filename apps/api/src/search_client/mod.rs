/// Company lookup over the DuckDuckGo Instant Answer API.
///
/// Produces a short plain-text summary (abstract plus a handful of related
/// topics) for the research stage. An empty answer is `Ok(None)`, not an error.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::pipeline::ports::{InformationSource, ServiceError};

pub const DEFAULT_SEARCH_URL: &str = "https://api.duckduckgo.com/";
const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
const MAX_RELATED_TOPICS: usize = 5;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Search timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Search API returned status {0}")]
    Status(u16),

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl From<SearchError> for ServiceError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::Timeout(after) => ServiceError::Timeout(after),
            SearchError::Status(429) => {
                ServiceError::RateLimited("search API rate limit".to_string())
            }
            SearchError::Status(status) => ServiceError::Provider {
                message: format!("search API status {status}"),
                transient: status >= 500,
            },
            SearchError::Http(e) => ServiceError::Provider {
                message: e.to_string(),
                transient: true,
            },
            SearchError::Parse(e) => ServiceError::Provider {
                message: format!("malformed search response: {e}"),
                transient: false,
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstantAnswer {
    #[serde(default)]
    heading: String,
    #[serde(rename = "Abstract", default)]
    abstract_text: String,
    #[serde(default)]
    related_topics: Vec<RelatedTopic>,
}

/// Either a single topic or a named group of topics.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RelatedTopic {
    Topic {
        #[serde(rename = "Text")]
        text: String,
    },
    Group {
        #[serde(rename = "Topics")]
        topics: Vec<RelatedTopic>,
    },
}

fn collect_topics<'a>(topics: &'a [RelatedTopic], out: &mut Vec<&'a str>) {
    for topic in topics {
        if out.len() >= MAX_RELATED_TOPICS {
            return;
        }
        match topic {
            RelatedTopic::Topic { text } if !text.trim().is_empty() => out.push(text.trim()),
            RelatedTopic::Topic { .. } => {}
            RelatedTopic::Group { topics } => collect_topics(topics, out),
        }
    }
}

/// Turns an Instant Answer body into the summary handed to the research stage.
pub fn summarize_answer(body: &str) -> Result<Option<String>, SearchError> {
    let answer: InstantAnswer = serde_json::from_str(body)?;

    let mut lines = Vec::new();
    let abstract_text = answer.abstract_text.trim();
    if !abstract_text.is_empty() {
        let heading = answer.heading.trim();
        if heading.is_empty() {
            lines.push(abstract_text.to_string());
        } else {
            lines.push(format!("{heading}: {abstract_text}"));
        }
    }

    let mut topics = Vec::new();
    collect_topics(&answer.related_topics, &mut topics);
    lines.extend(topics.into_iter().map(|t| format!("- {t}")));

    if lines.is_empty() {
        Ok(None)
    } else {
        Ok(Some(lines.join("\n")))
    }
}

#[derive(Clone)]
pub struct SearchClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl SearchClient {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, SearchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    pub async fn search(&self, company_name: &str) -> Result<Option<String>, SearchError> {
        let query = format!("{company_name} company");
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("q", query.as_str()),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Status(status.as_u16()));
        }

        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        let summary = summarize_answer(&body)?;
        debug!(
            company = company_name,
            found = summary.is_some(),
            "Company lookup finished"
        );
        Ok(summary)
    }

    fn transport_error(&self, e: reqwest::Error) -> SearchError {
        if e.is_timeout() {
            SearchError::Timeout(self.timeout)
        } else {
            SearchError::Http(e)
        }
    }
}

#[async_trait]
impl InformationSource for SearchClient {
    async fn lookup(&self, company_name: &str) -> Result<Option<String>, ServiceError> {
        Ok(self.search(company_name).await?)
    }
}
