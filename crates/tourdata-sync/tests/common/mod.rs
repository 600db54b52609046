//! Shared fixtures for tourdata-sync integration tests
//!
//! Portal responses are served by `wiremock`; storage is the in-memory
//! record store.

#![allow(dead_code)]

use serde_json::{json, Value};
use std::path::Path;
use tourdata_sync::SyncConfig;

/// One portal page in the standard `response.header/body` envelope
pub fn page(items: Vec<Value>, total_count: usize) -> Value {
    json!({
        "response": {
            "header": {"resultCode": "0000", "resultMsg": "OK"},
            "body": {
                "items": {"item": items},
                "numOfRows": 100,
                "pageNo": 1,
                "totalCount": total_count
            }
        }
    })
}

/// A page whose body carries no items (the portal sends an empty string)
pub fn empty_page() -> Value {
    json!({
        "response": {
            "header": {"resultCode": "0000", "resultMsg": "OK"},
            "body": {"items": "", "numOfRows": 100, "pageNo": 1, "totalCount": 0}
        }
    })
}

/// A rejected request, e.g. an unregistered service key
pub fn rejected(code: &str, message: &str) -> Value {
    json!({
        "response": {
            "header": {"resultCode": code, "resultMsg": message}
        }
    })
}

/// Eco-tourism items with ids `from..to`
pub fn greentour_items(from: usize, to: usize) -> Vec<Value> {
    (from..to)
        .map(|i| {
            json!({
                "contentid": i.to_string(),
                "areacode": "35",
                "title": format!("Site {}", i),
                "addr": "경상북도",
            })
        })
        .collect()
}

/// One hub attraction as the portal returns it
pub fn base_tour_item(code: &str, month: &str, district: &str) -> Value {
    json!({
        "hubTatsCd": code,
        "baseYm": month,
        "areaCd": "47",
        "areaNm": "경상북도",
        "signguCd": district,
        "hubTatsNm": format!("Hub {}", code),
        "hubRank": "3",
        "mapX": "128.59",
        "mapY": "35.87",
    })
}

/// Configuration pointing every source at `base_url`, without page delay
pub fn test_config(base_url: &str, data_dir: &Path) -> SyncConfig {
    let mut config = SyncConfig::default().with_base_url(base_url);
    config.api.service_key = "test-service-key".to_string();
    config.api.page_delay_ms = 0;
    config.output.data_dir = data_dir.to_path_buf();
    config
}
