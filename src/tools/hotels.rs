use regex::Regex;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::LazyLock;
use tracing::debug;

use crate::config::SearchConfig;
use crate::llm::types::{ToolDef, ToolFunctionDef};
use crate::tools::params::{self, count, parse_date, required_text, text_list};
use crate::tools::serpapi::{Query, SerpApiClient};
use crate::tools::{ToolFailure, ToolOutcome, interpret_results};

pub const TOOL_NAME: &str = "hotels_finder";
pub const NO_HOTELS: &str =
    "No hotels were found for the specified criteria. Please try different dates or locations.";

/// Highest rating first.
pub const DEFAULT_SORT: &str = "8";
/// Upper bound on properties returned, whatever the config asks for.
pub const MAX_HOTELS: usize = 5;
const SORT_KEYS: [&str; 3] = ["3", "8", "13"];

static HOTEL_CLASS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[1-5](,[1-5])*$").unwrap());

pub fn tool_def() -> ToolDef {
    ToolDef {
        kind: "function".into(),
        function: ToolFunctionDef {
            name: TOOL_NAME.into(),
            description: "Find hotels using the Google Hotels engine. Returns up to five properties with rates, ratings, amenities and links, or a message explaining why none were found.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "q": {"type": "string", "description": "Location of the hotel (e.g., \"Miami Beach, Florida\")"},
                    "check_in_date": {"type": "string", "description": "Check-in date. The format is YYYY-MM-DD. e.g. 2025-11-20"},
                    "check_out_date": {"type": "string", "description": "Check-out date. The format is YYYY-MM-DD. e.g. 2025-11-25"},
                    "sort_by": {"type": "string", "description": "Sorting of results: \"3\" lowest price, \"8\" highest rating, \"13\" most reviewed. Default is \"8\"."},
                    "adults": {"type": "integer", "description": "Number of adults. Default to 1."},
                    "children": {"type": "integer", "description": "Number of children. Default to 0."},
                    "rooms": {"type": "integer", "description": "Number of rooms. Default to 1."},
                    "hotel_class": {"type": "string", "description": "Filter by hotel class (e.g., \"2,3,4\" for 2, 3, and 4-star hotels)."}
                },
                "required": ["q", "check_in_date", "check_out_date"]
            }),
        },
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawHotelsParams {
    q: String,
    check_in_date: String,
    check_out_date: String,
    #[serde(default, deserialize_with = "text_list")]
    sort_by: Option<String>,
    #[serde(default, deserialize_with = "count")]
    adults: Option<u32>,
    #[serde(default, deserialize_with = "count")]
    children: Option<u32>,
    #[serde(default, deserialize_with = "count")]
    rooms: Option<u32>,
    #[serde(default, deserialize_with = "text_list")]
    hotel_class: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HotelsParams {
    pub q: String,
    pub check_in_date: String,
    pub check_out_date: String,
    pub sort_by: String,
    pub adults: u32,
    pub children: u32,
    pub rooms: u32,
    pub hotel_class: Option<String>,
}

impl HotelsParams {
    pub fn from_args(args: &Value) -> Result<Self, ToolFailure> {
        let raw: RawHotelsParams = params::decode(TOOL_NAME, args)?;
        Self::validate(raw).map_err(|reason| params::invalid(TOOL_NAME, reason))
    }

    fn validate(raw: RawHotelsParams) -> Result<Self, String> {
        let q = required_text("q", &raw.q)?;
        let check_in = parse_date("check_in_date", &raw.check_in_date)?;
        let check_out = parse_date("check_out_date", &raw.check_out_date)?;
        if check_out <= check_in {
            return Err("check_out_date must be after check_in_date".into());
        }

        let sort_by = raw.sort_by.unwrap_or_else(|| DEFAULT_SORT.to_string());
        if !SORT_KEYS.contains(&sort_by.as_str()) {
            return Err(format!(
                "sort_by must be one of {}, got {sort_by:?}",
                SORT_KEYS.join(", ")
            ));
        }

        let hotel_class = raw.hotel_class.map(|c| c.replace(' ', ""));
        if let Some(class) = &hotel_class
            && !HOTEL_CLASS.is_match(class)
        {
            return Err(format!(
                "hotel_class must be a comma separated list of star ratings 1-5, got {class:?}"
            ));
        }

        let adults = raw.adults.unwrap_or(1);
        if adults == 0 {
            return Err("at least one adult is required".into());
        }
        let rooms = raw.rooms.unwrap_or(1);
        if rooms == 0 {
            return Err("at least one room is required".into());
        }

        Ok(Self {
            q,
            check_in_date: check_in.format("%Y-%m-%d").to_string(),
            check_out_date: check_out.format("%Y-%m-%d").to_string(),
            sort_by,
            adults,
            children: raw.children.unwrap_or(0),
            rooms,
            hotel_class,
        })
    }

    pub fn to_query(&self, cfg: &SearchConfig) -> Query {
        let mut q: Query = vec![
            ("engine", "google_hotels".into()),
            ("hl", cfg.language.clone()),
            ("gl", cfg.hotels_country.clone()),
            ("q", self.q.clone()),
            ("check_in_date", self.check_in_date.clone()),
            ("check_out_date", self.check_out_date.clone()),
            ("currency", cfg.hotels_currency.clone()),
            ("adults", self.adults.to_string()),
            ("children", self.children.to_string()),
            ("rooms", self.rooms.to_string()),
            ("sort_by", self.sort_by.clone()),
        ];
        if let Some(class) = &self.hotel_class {
            q.push(("hotel_class", class.clone()));
        }
        q
    }
}

pub async fn hotels_finder(client: &SerpApiClient, args: &Value) -> ToolOutcome {
    let params = match HotelsParams::from_args(args) {
        Ok(p) => p,
        Err(failure) => return failure.into(),
    };
    debug!(?params, "hotels_finder");
    match client.search(params.to_query(&client.cfg)).await {
        Ok(payload) => interpret_results(
            &payload,
            "properties",
            client.cfg.max_hotels.min(MAX_HOTELS),
            NO_HOTELS,
        ),
        Err(failure) => failure.into(),
    }
}
