use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use futures_util::future::try_join_all;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::instrument;

use super::http_curl::CurlAuth;
use super::http_curl::CurlClient;
use crate::issue::Issue;
use crate::issue::IssueSource;

const API_VERSION: &str = "7.0";

/// Largest id list the work item batch endpoint accepts.
const BATCH_SIZE: usize = 200;

const OPEN_WORK_ITEMS_QUERY: &str = "SELECT [System.Id] FROM WorkItems \
     WHERE [System.TeamProject] = @project \
     AND [System.State] NOT IN ('Closed', 'Done', 'Removed', 'Resolved') \
     ORDER BY [System.CreatedDate] ASC";

// -----------------------------------------------------------------------------
// Types

/// Client for Azure DevOps work items and repositories.
pub struct DevopsClient {
    org: String,
    project: String,
    repo: String,
    pat: String,
    http_client: CurlClient,
}

#[derive(Debug, Serialize)]
struct WiqlRequest<'a> {
    query: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WiqlResponse {
    work_items: Vec<WorkItemRef>,
}

#[derive(Debug, Deserialize)]
struct WorkItemRef {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct WorkItemBatch {
    value: Vec<WorkItem>,
}

#[derive(Debug, Deserialize)]
struct WorkItem {
    id: u64,
    fields: WorkItemFields,
}

#[derive(Debug, Deserialize)]
struct WorkItemFields {
    #[serde(rename = "System.Title")]
    title: String,
    #[serde(rename = "System.Description", default)]
    description: Option<String>,
}

// -----------------------------------------------------------------------------
// DevopsClient impl

impl DevopsClient {
    pub fn new(org: String, project: String, repo: String, pat: String, timeout: Duration) -> Self {
        let http_client = CurlClient::new(
            CurlAuth::Basic {
                user: String::new(),
                password: pat.clone(),
            },
            timeout,
        );
        Self {
            org,
            project,
            repo,
            pat,
            http_client,
        }
    }

    /// HTTPS clone URL with the personal access token embedded.
    pub fn clone_url(&self) -> String {
        format!(
            "https://{}@dev.azure.com/{}/{}/_git/{}",
            urlencoding::encode(&self.pat),
            self.org,
            self.project,
            self.repo
        )
    }

    pub fn secret(&self) -> &str {
        &self.pat
    }

    fn api_base(&self) -> String {
        format!("https://dev.azure.com/{}/{}/_apis/wit", self.org, self.project)
    }

    /// Work items that are not closed, oldest first.
    #[instrument(skip_all, fields(project = %self.project))]
    pub async fn list_open_issues(&self) -> Result<Vec<Issue>> {
        let url = format!("{}/wiql?api-version={API_VERSION}", self.api_base());
        let body = serde_json::to_string(&WiqlRequest {
            query: OPEN_WORK_ITEMS_QUERY,
        })?;
        let response = self.http_client.post_json(&url, &body).await?;
        let wiql: WiqlResponse =
            serde_json::from_str(&response).context("Failed to parse WIQL response")?;
        let ids: Vec<u64> = wiql.work_items.iter().map(|item| item.id).collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let batches = try_join_all(ids.chunks(BATCH_SIZE).map(|chunk| self.fetch_batch(chunk))).await?;
        let items = batches.into_iter().flatten().collect();
        let issues = order_by_ids(&ids, items);

        debug!("Found {} open work items", issues.len());
        Ok(issues)
    }

    async fn fetch_batch(&self, ids: &[u64]) -> Result<Vec<WorkItem>> {
        let ids = ids
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let url = format!(
            "{}/workitems?ids={ids}&fields=System.Title,System.Description&api-version={API_VERSION}",
            self.api_base()
        );
        let response = self.http_client.get(&url, "application/json").await?;
        let batch: WorkItemBatch =
            serde_json::from_str(&response).context("Failed to parse work items response")?;
        Ok(batch.value)
    }
}

impl IssueSource for DevopsClient {
    async fn list_open_issues(&self) -> Result<Vec<Issue>> {
        DevopsClient::list_open_issues(self).await
    }
}

/// Batch responses are not guaranteed to follow the query order.
fn order_by_ids(ids: &[u64], items: Vec<WorkItem>) -> Vec<Issue> {
    let mut by_id: HashMap<u64, WorkItem> = items.into_iter().map(|item| (item.id, item)).collect();
    ids.iter()
        .filter_map(|id| by_id.remove(id))
        .map(|item| Issue {
            id: item.id.to_string(),
            title: item.fields.title,
            body: item.fields.description.unwrap_or_default(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_items_follow_query_order() {
        let batch: WorkItemBatch = serde_json::from_str(
            r#"{"count": 2, "value": [
                {"id": 9, "fields": {"System.Title": "Later"}},
                {"id": 4, "fields": {"System.Title": "Earlier", "System.Description": "<p>Details</p>"}}
            ]}"#,
        )
        .unwrap();
        let issues = order_by_ids(&[4, 9, 11], batch.value);
        assert_eq!(
            issues,
            [
                Issue::new("4", "Earlier", "<p>Details</p>"),
                Issue::new("9", "Later", "")
            ]
        );
    }

    #[test]
    fn test_wiql_response_shape() {
        let wiql: WiqlResponse = serde_json::from_str(
            r#"{"queryType": "flat", "workItems": [{"id": 1, "url": "u"}, {"id": 2, "url": "v"}]}"#,
        )
        .unwrap();
        assert_eq!(wiql.work_items.iter().map(|w| w.id).collect::<Vec<_>>(), [1, 2]);
    }

    #[test]
    fn test_clone_url() {
        let client = DevopsClient::new(
            "acme".into(),
            "Widgets".into(),
            "widgets-web".into(),
            "pat123".into(),
            Duration::from_secs(5),
        );
        assert_eq!(
            client.clone_url(),
            "https://pat123@dev.azure.com/acme/Widgets/_git/widgets-web"
        );
    }
}
