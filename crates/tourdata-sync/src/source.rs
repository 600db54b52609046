//! Catalog of upstream sources and their endpoints
//!
//! Each [`SourceType`] is one service of the public tourism portal. The
//! catalog fixes its endpoints, target table, natural key and document
//! shape; [`SourceConfig`] binds those to runtime settings.

use crate::config::SyncConfig;
use crate::envelope::EnvelopeShape;
use crate::error::{Result, SyncError};
use crate::paginator::QueryParams;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// One upstream tourism service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceType {
    /// Eco-tourism sites
    #[serde(rename = "greentour")]
    GreenTour,
    /// Accessible travel information
    #[serde(rename = "barrier_free")]
    BarrierFree,
    /// Hub attractions of local governments
    #[serde(rename = "base_tour")]
    BaseTour,
}

/// A callable endpoint of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    /// Menu key, unique per source ("1", "2", ...)
    pub id: &'static str,
    pub description: &'static str,
    /// Path appended to the source's base URL
    pub path: &'static str,
    /// Fixed query parameters for this endpoint
    pub params: &'static [(&'static str, &'static str)],
}

impl Endpoint {
    /// Path without the leading slash, e.g. "areaBasedList1"
    pub fn name(&self) -> &'static str {
        self.path.trim_start_matches('/')
    }

    /// Listing endpoints feed the areabased tables; the rest are archived raw
    pub fn is_listing(&self) -> bool {
        self.name().starts_with("areaBasedList")
    }
}

/// Column(s) forming a record's natural key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryKey {
    Single(&'static str),
    Composite(&'static [&'static str]),
}

impl PrimaryKey {
    pub fn columns(&self) -> &[&'static str] {
        match self {
            PrimaryKey::Single(column) => std::slice::from_ref(column),
            PrimaryKey::Composite(columns) => columns,
        }
    }

    /// Render the key from column values.
    ///
    /// Composite parts are joined with `_`; a missing part renders as "".
    pub fn key_value<F>(&self, lookup: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        self.columns()
            .iter()
            .map(|column| lookup(column).unwrap_or_default())
            .collect::<Vec<_>>()
            .join("_")
    }
}

/// Per-region fan-out of a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionSplit {
    /// Query parameter carrying the region code
    pub param: &'static str,
    pub codes: &'static [&'static str],
}

const LISTING_PARAMS: &[(&str, &str)] = &[("arrange", "C"), ("areaCode", "35")];

const GREENTOUR_ENDPOINTS: &[Endpoint] = &[
    Endpoint {
        id: "1",
        description: "Area code lookup",
        path: "/areaCode1",
        params: &[],
    },
    Endpoint {
        id: "2",
        description: "Eco-tourism sites by area",
        path: "/areaBasedList1",
        params: LISTING_PARAMS,
    },
    Endpoint {
        id: "3",
        description: "Eco-tourism sync listing",
        path: "/areaBasedSyncList1",
        params: LISTING_PARAMS,
    },
];

const BARRIER_FREE_ENDPOINTS: &[Endpoint] = &[
    Endpoint {
        id: "1",
        description: "Area code lookup",
        path: "/areaCode2",
        params: &[],
    },
    Endpoint {
        id: "2",
        description: "Service category codes",
        path: "/categoryCode2",
        params: &[],
    },
    Endpoint {
        id: "3",
        description: "Classification system codes",
        path: "/lclsSystmCode2",
        params: &[("arrange", "C"), ("areaCode", "35"), ("lclsSystmListYn", "Y")],
    },
    Endpoint {
        id: "4",
        description: "Legal district codes",
        path: "/ldongCode2",
        params: &[("lDongRegnCd", "35"), ("lDongListYn", "Y")],
    },
    Endpoint {
        id: "5",
        description: "Accessible travel sites by area",
        path: "/areaBasedList2",
        params: LISTING_PARAMS,
    },
    Endpoint {
        id: "6",
        description: "Accessible travel sync listing",
        path: "/areaBasedSyncList2",
        params: LISTING_PARAMS,
    },
];

const BASE_TOUR_ENDPOINTS: &[Endpoint] = &[Endpoint {
    id: "1",
    description: "Hub attractions by area",
    path: "/areaBasedList1",
    params: &[],
}];

/// District codes of Gyeongsangbuk-do
const GYEONGBUK_SIGNGU_CODES: &[&str] = &[
    "47111", "47113", "47130", "47150", "47170", "47190", "47210", "47230", "47250", "47280",
    "47290", "47730", "47750", "47760", "47770", "47820", "47830", "47840", "47850", "47900",
    "47920", "47930", "47940",
];

impl SourceType {
    pub const ALL: [SourceType; 3] = [
        SourceType::GreenTour,
        SourceType::BarrierFree,
        SourceType::BaseTour,
    ];

    /// Tag used in audit rows and file names
    pub fn api_type(self) -> &'static str {
        match self {
            SourceType::GreenTour => "greentour",
            SourceType::BarrierFree => "barrier_free",
            SourceType::BaseTour => "base_tour",
        }
    }

    /// Menu key used on the command line
    pub fn menu_key(self) -> &'static str {
        match self {
            SourceType::GreenTour => "1",
            SourceType::BarrierFree => "2",
            SourceType::BaseTour => "3",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            SourceType::GreenTour => "Eco-tourism information",
            SourceType::BarrierFree => "Accessible travel information",
            SourceType::BaseTour => "Local government hub attractions",
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            SourceType::GreenTour => "https://apis.data.go.kr/B551011/GreenTourService1",
            SourceType::BarrierFree => "https://apis.data.go.kr/B551011/KorWithService2",
            SourceType::BaseTour => "https://apis.data.go.kr/B551011/LocgoHubTarService1",
        }
    }

    /// `MobileApp` query parameter
    pub fn app_name(self) -> &'static str {
        match self {
            SourceType::GreenTour => "MyEcotourApp",
            SourceType::BarrierFree => "BarrierFreeApp",
            SourceType::BaseTour => "MyBaseTourApp",
        }
    }

    /// Table holding this source's listing records
    pub fn table_name(self) -> &'static str {
        match self {
            SourceType::GreenTour => "greentour_areabased",
            SourceType::BarrierFree => "barrier_free_areabased",
            SourceType::BaseTour => "base_tour_areabased",
        }
    }

    pub fn primary_key(self) -> PrimaryKey {
        match self {
            SourceType::GreenTour | SourceType::BarrierFree => PrimaryKey::Single("contentid"),
            SourceType::BaseTour => PrimaryKey::Composite(&["hubtatscode", "baseym"]),
        }
    }

    pub fn envelope(self) -> EnvelopeShape {
        match self {
            SourceType::GreenTour | SourceType::BarrierFree => EnvelopeShape::ResponseBody,
            SourceType::BaseTour => EnvelopeShape::Flat,
        }
    }

    /// Region fan-out, for sources paged per district
    pub fn region_split(self) -> Option<RegionSplit> {
        match self {
            SourceType::BaseTour => Some(RegionSplit {
                param: "signguCd",
                codes: GYEONGBUK_SIGNGU_CODES,
            }),
            _ => None,
        }
    }

    pub fn endpoints(self) -> &'static [Endpoint] {
        match self {
            SourceType::GreenTour => GREENTOUR_ENDPOINTS,
            SourceType::BarrierFree => BARRIER_FREE_ENDPOINTS,
            SourceType::BaseTour => BASE_TOUR_ENDPOINTS,
        }
    }

    /// Look up an endpoint by menu key
    pub fn endpoint(self, id: &str) -> Result<&'static Endpoint> {
        self.endpoints()
            .iter()
            .find(|endpoint| endpoint.id == id)
            .ok_or_else(|| {
                SyncError::config(format!("Unknown endpoint '{}' for {}", id, self.api_type()))
            })
    }

    /// The listing endpoint reconciled by a full sync
    pub fn listing_endpoint(self) -> &'static Endpoint {
        match self {
            SourceType::GreenTour => &GREENTOUR_ENDPOINTS[1],
            SourceType::BarrierFree => &BARRIER_FREE_ENDPOINTS[4],
            SourceType::BaseTour => &BASE_TOUR_ENDPOINTS[0],
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_type())
    }
}

impl FromStr for SourceType {
    type Err = SyncError;

    /// Accepts the menu key ("1") or the tag ("greentour")
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        SourceType::ALL
            .into_iter()
            .find(|source| source.menu_key() == s || source.api_type().eq_ignore_ascii_case(s))
            .ok_or_else(|| SyncError::config(format!("Unknown API type: {}", s)))
    }
}

/// A source bound to runtime settings
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub source: SourceType,
    pub base_url: String,
    common_params: QueryParams,
    /// Top-level filters echoed into flat documents
    filters: Vec<(&'static str, String)>,
}

impl SourceConfig {
    pub fn resolve(source: SourceType, config: &SyncConfig) -> Self {
        let mut common_params = QueryParams::new();
        common_params.insert("serviceKey".to_string(), config.api.service_key.clone());
        common_params.insert("MobileApp".to_string(), source.app_name().to_string());
        common_params.insert("MobileOS".to_string(), config.api.mobile_os.clone());
        common_params.insert("numOfRows".to_string(), config.api.rows_per_page.to_string());
        common_params.insert("_type".to_string(), "json".to_string());

        let mut filters = Vec::new();
        if source == SourceType::BaseTour {
            common_params.insert("baseYm".to_string(), config.base_tour.base_ym.clone());
            common_params.insert("areaCd".to_string(), config.base_tour.area_cd.clone());
            filters.push(("areaCd", config.base_tour.area_cd.clone()));
        }

        Self {
            source,
            base_url: config.sources.for_source(source).to_string(),
            common_params,
            filters,
        }
    }

    pub fn api_type(&self) -> &'static str {
        self.source.api_type()
    }

    pub fn endpoint(&self, id: &str) -> Result<&'static Endpoint> {
        self.source.endpoint(id)
    }

    /// Query parameters for every page of `endpoint`, `pageNo` excluded
    pub fn query_params(&self, endpoint: &Endpoint) -> QueryParams {
        let mut params = self.common_params.clone();
        for (key, value) in endpoint.params {
            params.insert((*key).to_string(), (*value).to_string());
        }
        params
    }

    /// Assemble the run document from all fetched items
    pub fn wrap_document(&self, items: Vec<Value>) -> Value {
        let filters: Vec<(&str, &str)> = self
            .filters
            .iter()
            .map(|(key, value)| (*key, value.as_str()))
            .collect();
        self.source.envelope().wrap(items, &filters)
    }

    /// Items of a run document
    pub fn extract_items(&self, document: &Value) -> Vec<Value> {
        self.source.envelope().extract(document)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_source() {
        assert_eq!("1".parse::<SourceType>().unwrap(), SourceType::GreenTour);
        assert_eq!("barrier_free".parse::<SourceType>().unwrap(), SourceType::BarrierFree);
        assert_eq!(" 3 ".parse::<SourceType>().unwrap(), SourceType::BaseTour);
        assert!("4".parse::<SourceType>().is_err());
    }

    #[test]
    fn test_unknown_endpoint_is_config_error() {
        let err = SourceType::GreenTour.endpoint("9").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }

    #[test]
    fn test_listing_endpoints() {
        assert_eq!(SourceType::GreenTour.listing_endpoint().name(), "areaBasedList1");
        assert_eq!(SourceType::BarrierFree.listing_endpoint().name(), "areaBasedList2");
        assert_eq!(SourceType::BaseTour.listing_endpoint().id, "1");
        for source in SourceType::ALL {
            assert!(source.listing_endpoint().is_listing());
        }
        assert!(!SourceType::GreenTour.endpoint("3").unwrap().is_listing());
        assert!(!SourceType::BarrierFree.endpoint("1").unwrap().is_listing());
    }

    #[test]
    fn test_key_value() {
        let key = SourceType::BaseTour.primary_key();
        let value = key.key_value(|column| match column {
            "hubtatscode" => Some("A".to_string()),
            "baseym" => Some("202503".to_string()),
            _ => None,
        });
        assert_eq!(value, "A_202503");

        let partial = key.key_value(|column| (column == "hubtatscode").then(|| "A".to_string()));
        assert_eq!(partial, "A_");

        let single = SourceType::GreenTour.primary_key();
        assert_eq!(single.key_value(|_| Some("126508".to_string())), "126508");
        assert_eq!(single.columns(), &["contentid"]);
    }

    #[test]
    fn test_query_params() {
        let mut config = SyncConfig::default();
        config.api.service_key = "secret".to_string();

        let greentour = SourceConfig::resolve(SourceType::GreenTour, &config);
        let params = greentour.query_params(greentour.endpoint("2").unwrap());
        assert_eq!(params["serviceKey"], "secret");
        assert_eq!(params["MobileApp"], "MyEcotourApp");
        assert_eq!(params["MobileOS"], "ETC");
        assert_eq!(params["numOfRows"], "100");
        assert_eq!(params["_type"], "json");
        assert_eq!(params["arrange"], "C");
        assert_eq!(params["areaCode"], "35");
        assert!(!params.contains_key("pageNo"));

        let base_tour = SourceConfig::resolve(SourceType::BaseTour, &config);
        let params = base_tour.query_params(base_tour.endpoint("1").unwrap());
        assert_eq!(params["baseYm"], "202503");
        assert_eq!(params["areaCd"], "47");
    }

    #[test]
    fn test_base_tour_document_carries_area() {
        let config = SyncConfig::default();
        let base_tour = SourceConfig::resolve(SourceType::BaseTour, &config);
        let doc = base_tour.wrap_document(vec![json!({"hubTatsCd": "A"})]);
        assert_eq!(doc, json!({"areaCd": "47", "totalCount": 1, "items": [{"hubTatsCd": "A"}]}));
        assert_eq!(base_tour.extract_items(&doc).len(), 1);
    }
}
