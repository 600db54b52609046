//! Response envelope handling
//!
//! The portal wraps item lists in one of two document shapes. Both upstream
//! pages and the documents the pipeline assembles from them go through here.

use serde_json::{Map, Value};

/// Document shape of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeShape {
    /// `{"response": {"body": {"items": {"item": [...]}, "totalCount": n}}}`
    ResponseBody,
    /// `{"totalCount": n, "items": [...]}` plus request filters
    Flat,
}

impl EnvelopeShape {
    /// Build a document around `items`.
    ///
    /// `filters` are copied to the top level of flat documents and ignored
    /// otherwise.
    pub fn wrap(self, items: Vec<Value>, filters: &[(&str, &str)]) -> Value {
        let total = items.len();
        match self {
            EnvelopeShape::ResponseBody => serde_json::json!({
                "response": {
                    "body": {
                        "items": { "item": items },
                        "totalCount": total,
                    }
                }
            }),
            EnvelopeShape::Flat => {
                let mut doc = Map::new();
                for (key, value) in filters {
                    doc.insert((*key).to_string(), Value::String((*value).to_string()));
                }
                doc.insert("totalCount".to_string(), Value::from(total));
                doc.insert("items".to_string(), Value::Array(items));
                Value::Object(doc)
            },
        }
    }

    /// Pull the item list out of a document of this shape.
    ///
    /// A missing list yields no items. A lone object is a one-item list.
    pub fn extract(self, doc: &Value) -> Vec<Value> {
        match self {
            EnvelopeShape::ResponseBody => doc
                .pointer("/response/body/items/item")
                .cloned()
                .map(normalize_item_list)
                .unwrap_or_default(),
            EnvelopeShape::Flat => match doc.get("items") {
                Some(Value::Array(items)) => items.clone(),
                _ => Vec::new(),
            },
        }
    }
}

/// Coerce the portal's `item` field into a list.
///
/// The portal returns a bare object when a page holds a single item and an
/// empty string when it holds none.
pub fn normalize_item_list(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        other if is_blank(&other) => Vec::new(),
        other => vec![other],
    }
}

/// Whether `value` counts as "no data" in an upstream payload
pub(crate) fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_item_list() {
        assert_eq!(normalize_item_list(json!([{"a": 1}, {"a": 2}])).len(), 2);
        assert_eq!(normalize_item_list(json!({"a": 1})), vec![json!({"a": 1})]);
        assert!(normalize_item_list(json!("")).is_empty());
        assert!(normalize_item_list(Value::Null).is_empty());
    }

    #[test]
    fn test_extract_response_body() {
        let doc = json!({
            "response": {"body": {"items": {"item": [{"contentid": "1"}, {"contentid": "2"}]}}}
        });
        assert_eq!(EnvelopeShape::ResponseBody.extract(&doc).len(), 2);

        let single = json!({"response": {"body": {"items": {"item": {"contentid": "1"}}}}});
        assert_eq!(
            EnvelopeShape::ResponseBody.extract(&single),
            vec![json!({"contentid": "1"})]
        );

        let empty = json!({"response": {"body": {"items": ""}}});
        assert!(EnvelopeShape::ResponseBody.extract(&empty).is_empty());
    }

    #[test]
    fn test_extract_flat() {
        let doc = json!({"areaCd": "47", "totalCount": 1, "items": [{"hubTatsCd": "A"}]});
        assert_eq!(EnvelopeShape::Flat.extract(&doc).len(), 1);
        assert!(EnvelopeShape::Flat.extract(&json!({"items": {"hubTatsCd": "A"}})).is_empty());
    }

    #[test]
    fn test_wrap_then_extract() {
        let items = vec![json!({"hubTatsCd": "A"}), json!({"hubTatsCd": "B"})];

        let flat = EnvelopeShape::Flat.wrap(items.clone(), &[("areaCd", "47")]);
        assert_eq!(flat["areaCd"], "47");
        assert_eq!(flat["totalCount"], 2);
        assert_eq!(EnvelopeShape::Flat.extract(&flat), items);

        let nested = EnvelopeShape::ResponseBody.wrap(items.clone(), &[("areaCd", "47")]);
        assert!(nested.get("areaCd").is_none());
        assert_eq!(nested["response"]["body"]["totalCount"], 2);
        assert_eq!(EnvelopeShape::ResponseBody.extract(&nested), items);
    }

    #[test]
    fn test_is_blank() {
        assert!(is_blank(&json!({})));
        assert!(is_blank(&json!(0)));
        assert!(!is_blank(&json!({"item": []})));
        assert!(!is_blank(&json!("x")));
    }
}
