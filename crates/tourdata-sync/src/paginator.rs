//! Paged retrieval from the tourism portal
//!
//! Pages are requested strictly one after another with a fixed pause in
//! between. Paging stops on the first of: an HTTP or parse failure, an
//! empty page, the reported total being reached, or the page cap. A failure
//! never discards the items collected before it; the caller decides whether
//! a partial result is usable.

use crate::config::ApiConfig;
use crate::envelope::{is_blank, normalize_item_list};
use crate::error::{Result, SyncError};
use crate::source::RegionSplit;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Query parameters of one request, ordered by name
pub type QueryParams = BTreeMap<String, String>;

/// Result code of an accepted request
const RESULT_CODE_OK: &str = "0000";

/// Items collected by one paged fetch
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub items: Vec<Value>,
    /// Pages that returned a usable response
    pub pages: u32,
    /// Failure that ended paging early, if any
    pub error: Option<SyncError>,
}

impl FetchOutcome {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// Convert into the item list, failing if paging stopped on an error
    pub fn into_result(self) -> Result<Vec<Value>> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.items),
        }
    }
}

/// A region whose paging stopped on an error
#[derive(Debug)]
pub struct RegionFailure {
    pub region: String,
    pub error: SyncError,
}

/// Items collected across all regions of a split
#[derive(Debug, Default)]
pub struct RegionalOutcome {
    pub items: Vec<Value>,
    pub regions: usize,
    pub failures: Vec<RegionFailure>,
}

impl RegionalOutcome {
    /// True when no region produced a usable response
    pub fn all_failed(&self) -> bool {
        self.regions > 0 && self.failures.len() == self.regions
    }
}

/// One decoded page
#[derive(Debug, PartialEq)]
struct Page {
    total_count: u64,
    /// `None` when the body carries no `items` at all
    items: Option<Vec<Value>>,
}

/// Sequential page fetcher
#[derive(Debug, Clone)]
pub struct Paginator {
    client: Client,
    rows_per_page: u32,
    max_pages: u32,
    page_delay: Duration,
}

impl Paginator {
    pub fn new(client: Client, rows_per_page: u32, max_pages: u32, page_delay: Duration) -> Self {
        Self {
            client,
            rows_per_page,
            max_pages,
            page_delay,
        }
    }

    /// Build a paginator with its own HTTP client
    pub fn from_config(api: &ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(api.timeout_secs))
            .user_agent(concat!("tourdata-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self::new(
            client,
            api.rows_per_page,
            api.max_pages,
            Duration::from_millis(api.page_delay_ms),
        ))
    }

    /// Fetch every page of `base_url` + `path`
    pub async fn fetch_all(&self, base_url: &str, path: &str, params: &QueryParams) -> FetchOutcome {
        self.paginate(base_url, path, params, false).await
    }

    /// Fetch every page once per region code of `split`.
    ///
    /// A failing region ends only that region's paging.
    pub async fn fetch_by_region(
        &self,
        base_url: &str,
        path: &str,
        params: &QueryParams,
        split: &RegionSplit,
    ) -> RegionalOutcome {
        let mut outcome = RegionalOutcome {
            regions: split.codes.len(),
            ..Default::default()
        };

        for code in split.codes {
            let mut region_params = params.clone();
            region_params.insert(split.param.to_string(), (*code).to_string());

            let fetched = self.paginate(base_url, path, &region_params, true).await;
            info!(region = code, items = fetched.items.len(), "Region fetched");

            outcome.items.extend(fetched.items);
            if let Some(error) = fetched.error {
                warn!(region = code, error = %error, "Region paging stopped early");
                outcome.failures.push(RegionFailure {
                    region: (*code).to_string(),
                    error,
                });
            }
        }

        info!(
            items = outcome.items.len(),
            failed_regions = outcome.failures.len(),
            "All regions fetched"
        );
        outcome
    }

    async fn paginate(
        &self,
        base_url: &str,
        path: &str,
        params: &QueryParams,
        single_page_shortcut: bool,
    ) -> FetchOutcome {
        let url = format!("{}{}", base_url.trim_end_matches('/'), path);
        let mut outcome = FetchOutcome::default();
        let mut page_no = 1u32;

        while page_no <= self.max_pages {
            let mut page_params = params.clone();
            page_params.insert("pageNo".to_string(), page_no.to_string());

            let page = match self.fetch_page(&url, &page_params, page_no).await {
                Ok(page) => page,
                Err(error) => {
                    warn!(
                        page = page_no,
                        collected = outcome.items.len(),
                        error = %error,
                        "Paging stopped on error"
                    );
                    outcome.error = Some(error);
                    return outcome;
                },
            };
            outcome.pages += 1;

            let Some(items) = page.items else {
                debug!(page = page_no, "No items in response");
                break;
            };
            if items.is_empty() {
                debug!(page = page_no, "Empty page");
                break;
            }

            let received = items.len();
            outcome.items.extend(items);
            debug!(
                page = page_no,
                received,
                collected = outcome.items.len(),
                total = page.total_count,
                "Page fetched"
            );

            if single_page_shortcut
                && page_no == 1
                && page.total_count <= u64::from(self.rows_per_page)
            {
                break;
            }
            if outcome.items.len() as u64 >= page.total_count {
                break;
            }

            page_no += 1;
            if page_no > self.max_pages {
                warn!(
                    max_pages = self.max_pages,
                    collected = outcome.items.len(),
                    "Page cap reached"
                );
                break;
            }
            tokio::time::sleep(self.page_delay).await;
        }

        outcome
    }

    async fn fetch_page(&self, url: &str, params: &QueryParams, page: u32) -> Result<Page> {
        let response = self
            .client
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|source| SyncError::Transport { page, source })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(SyncError::HttpStatus {
                status: status.as_u16(),
                page,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|source| SyncError::Transport { page, source })?;
        let doc: Value = serde_json::from_str(&body).map_err(|e| SyncError::Parse {
            page,
            message: e.to_string(),
        })?;

        parse_page(&doc, page)
    }
}

/// Decode one portal response document
fn parse_page(doc: &Value, page: u32) -> Result<Page> {
    let response = doc
        .as_object()
        .and_then(|root| root.get("response"))
        .ok_or_else(|| SyncError::Parse {
            page,
            message: "missing 'response' envelope".to_string(),
        })?;

    if let Some(code) = response.pointer("/header/resultCode").and_then(Value::as_str) {
        if code != RESULT_CODE_OK {
            let message = response
                .pointer("/header/resultMsg")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            return Err(SyncError::UpstreamRejected {
                page,
                code: code.to_string(),
                message,
            });
        }
    }

    let Some(body) = response.get("body").filter(|body| body.is_object()) else {
        return Ok(Page {
            total_count: 0,
            items: None,
        });
    };

    let total_count = body.get("totalCount").map(count_of).unwrap_or(0);
    let items = match body.get("items") {
        None => None,
        Some(items) if is_blank(items) => None,
        Some(Value::Object(map)) => Some(
            map.get("item")
                .cloned()
                .map(normalize_item_list)
                .unwrap_or_default(),
        ),
        Some(other) => Some(normalize_item_list(other.clone())),
    };

    Ok(Page { total_count, items })
}

/// `totalCount` arrives as a number or a numeric string
fn count_of(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n.as_u64().unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_parse_page_with_items() {
        let doc = json!({
            "response": {
                "header": {"resultCode": "0000", "resultMsg": "OK"},
                "body": {"items": {"item": [{"contentid": "1"}, {"contentid": "2"}]}, "totalCount": 250}
            }
        });
        let page = parse_page(&doc, 1).unwrap();
        assert_eq!(page.total_count, 250);
        assert_eq!(page.items.unwrap().len(), 2);
    }

    #[test]
    fn test_parse_page_single_item_and_string_count() {
        let doc = json!({
            "response": {"body": {"items": {"item": {"contentid": "1"}}, "totalCount": "1"}}
        });
        let page = parse_page(&doc, 1).unwrap();
        assert_eq!(page.total_count, 1);
        assert_eq!(page.items, Some(vec![json!({"contentid": "1"})]));
    }

    #[test]
    fn test_parse_page_without_items() {
        let empty_string = json!({"response": {"body": {"items": "", "totalCount": 0}}});
        assert_eq!(parse_page(&empty_string, 3).unwrap().items, None);

        let empty_item = json!({"response": {"body": {"items": {"item": []}, "totalCount": 5}}});
        assert_eq!(parse_page(&empty_item, 3).unwrap().items, Some(vec![]));

        let no_body = json!({"response": {"header": {"resultCode": "0000"}}});
        assert_eq!(parse_page(&no_body, 1).unwrap().items, None);
    }

    #[test]
    fn test_parse_page_rejections() {
        let rejected = json!({
            "response": {"header": {"resultCode": "30", "resultMsg": "SERVICE KEY IS NOT REGISTERED ERROR."}}
        });
        let err = parse_page(&rejected, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.to_string().contains("page 1"));
        assert!(err.to_string().contains("SERVICE KEY"));

        let err = parse_page(&json!([1, 2]), 4).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert_eq!(err.page(), Some(4));
    }

    #[test]
    fn test_regional_all_failed() {
        let mut outcome = RegionalOutcome {
            regions: 2,
            ..Default::default()
        };
        assert!(!outcome.all_failed());
        for region in ["47111", "47113"] {
            outcome.failures.push(RegionFailure {
                region: region.to_string(),
                error: SyncError::HttpStatus {
                    status: 500,
                    page: 1,
                },
            });
        }
        assert!(outcome.all_failed());
        assert!(!RegionalOutcome::default().all_failed());
    }
}
