//! Remote tracker REST surface: endpoint URLs, request shapes and response parsing.

use crate::config::{JiraConfig, RetryConfig};
use crate::executor::{ApiRequest, Credentials};
use crate::payload::Payload;
use crate::types::Record;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON pointer to the plain text of an issue description
///
/// Descriptions are Atlassian documents; the text of the first text node of
/// the first paragraph is taken.
const DESCRIPTION_TEXT: &str = "/fields/description/content/0/content/0/text";

/// Endpoint URLs and authentication for one tracker
#[derive(Clone, Debug)]
pub struct Endpoints {
    base_url: String,
    credentials: Credentials,
}

impl Endpoints {
    /// Derive endpoints from connection settings
    pub fn new(config: &JiraConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials: Credentials::new(&config.email, &config.api_token),
        }
    }

    /// Paginated JQL search endpoint
    pub fn search_url(&self) -> String {
        format!("{}/rest/api/3/search/jql", self.base_url)
    }

    /// Bulk issue creation endpoint
    pub fn bulk_create_url(&self) -> String {
        format!("{}/rest/api/3/issue/bulk", self.base_url)
    }

    /// One page of the project's issues, oldest first, descriptions only
    pub fn search_request(
        &self,
        project_key: &str,
        page_size: usize,
        cursor: Option<&str>,
        retry: &RetryConfig,
    ) -> ApiRequest {
        let mut request = ApiRequest::get(self.search_url())
            .query("jql", project_jql(project_key))
            .query("maxResults", page_size.to_string())
            .query("fields", "description")
            .auth(self.credentials.clone())
            .max_attempts(retry.max_attempts)
            .timeout(retry.request_timeout);
        if let Some(token) = cursor {
            request = request.query("nextPageToken", token);
        }
        request
    }

    /// Create every payload of `batch` in a single call
    pub fn bulk_create_request(
        &self,
        batch: &[Payload],
        retry: &RetryConfig,
    ) -> crate::Result<ApiRequest> {
        let body = serde_json::to_value(BulkCreateBody {
            issue_updates: batch,
        })?;
        Ok(ApiRequest::post(self.bulk_create_url())
            .json(body)
            .auth(self.credentials.clone())
            .max_attempts(retry.max_attempts)
            .timeout(retry.write_timeout))
    }
}

/// JQL selecting a project's issues in creation order
pub fn project_jql(project_key: &str) -> String {
    format!("project = {project_key} ORDER BY created ASC")
}

#[derive(Serialize)]
struct BulkCreateBody<'a> {
    #[serde(rename = "issueUpdates")]
    issue_updates: &'a [Payload],
}

/// One page of search results
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SearchPage {
    /// Raw issue objects
    #[serde(default)]
    pub issues: Vec<Value>,

    /// Whether this is the final page
    #[serde(rename = "isLast", default)]
    pub is_last: Option<bool>,

    /// Token of the following page
    #[serde(rename = "nextPageToken", default)]
    pub next_page_token: Option<String>,
}

impl SearchPage {
    /// Decode a search response body
    pub fn from_value(body: Value) -> crate::Result<Self> {
        Ok(serde_json::from_value(body)?)
    }

    /// Records of this page in server order
    pub fn records(&self) -> Vec<Record> {
        self.issues.iter().map(extract_record).collect()
    }

    /// Whether the fetch should stop after this page
    ///
    /// Without an `isLast` flag the page is last when it names no next token.
    /// A page claiming more results but naming no token is also treated as
    /// last, since continuing without a token would restart from the beginning.
    pub fn is_final(&self) -> bool {
        match (self.is_last, &self.next_page_token) {
            (Some(true), _) => true,
            (_, None) => true,
            (_, Some(_)) => false,
        }
    }
}

/// Pull the description out of one issue, degrading to an empty string
pub fn extract_record(issue: &Value) -> Record {
    let description = issue
        .pointer(DESCRIPTION_TEXT)
        .and_then(Value::as_str)
        .unwrap_or_default();
    Record::new(description)
}
