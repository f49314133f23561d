use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::config::SearchConfig;
use crate::llm::types::{ToolDef, ToolFunctionDef};
use crate::tools::params::{self, airport_code, count, parse_date};
use crate::tools::serpapi::{Query, SerpApiClient};
use crate::tools::{ToolFailure, ToolOutcome, interpret_results};

pub const TOOL_NAME: &str = "flights_finder";
pub const NO_FLIGHTS: &str =
    "No flights were found for the specified criteria. Please try different dates or airports.";

pub fn tool_def() -> ToolDef {
    ToolDef {
        kind: "function".into(),
        function: ToolFunctionDef {
            name: TOOL_NAME.into(),
            description: "Find flights using the Google Flights engine. Returns the best matching itineraries with airlines, times, durations and prices, or a message explaining why none were found.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "departure_airport": {"type": "string", "description": "Departure airport code (IATA), e.g. JFK"},
                    "arrival_airport": {"type": "string", "description": "Arrival airport code (IATA), e.g. LAX"},
                    "outbound_date": {"type": "string", "description": "Outbound date in YYYY-MM-DD format, e.g. 2024-06-22"},
                    "return_date": {"type": "string", "description": "Return date in YYYY-MM-DD format, e.g. 2024-06-28. Omit for a one-way trip."},
                    "adults": {"type": "integer", "description": "Number of adults. Default to 1."},
                    "children": {"type": "integer", "description": "Number of children. Default to 0."},
                    "infants_in_seat": {"type": "integer", "description": "Number of infants in seat. Default to 0."},
                    "infants_on_lap": {"type": "integer", "description": "Number of infants on lap. Default to 0."}
                },
                "required": ["departure_airport", "arrival_airport", "outbound_date"]
            }),
        },
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawFlightsParams {
    departure_airport: String,
    arrival_airport: String,
    outbound_date: String,
    #[serde(default)]
    return_date: Option<String>,
    #[serde(default, deserialize_with = "count")]
    adults: Option<u32>,
    #[serde(default, deserialize_with = "count")]
    children: Option<u32>,
    #[serde(default, deserialize_with = "count")]
    infants_in_seat: Option<u32>,
    #[serde(default, deserialize_with = "count")]
    infants_on_lap: Option<u32>,
}

/// Validated flight search request.
#[derive(Debug, Clone, PartialEq)]
pub struct FlightsParams {
    pub departure_airport: String,
    pub arrival_airport: String,
    pub outbound_date: String,
    pub return_date: Option<String>,
    pub adults: u32,
    pub children: u32,
    pub infants_in_seat: u32,
    pub infants_on_lap: u32,
}

impl FlightsParams {
    pub fn from_args(args: &Value) -> Result<Self, ToolFailure> {
        let raw: RawFlightsParams = params::decode(TOOL_NAME, args)?;
        Self::validate(raw).map_err(|reason| params::invalid(TOOL_NAME, reason))
    }

    fn validate(raw: RawFlightsParams) -> Result<Self, String> {
        let departure_airport = airport_code("departure_airport", &raw.departure_airport)?;
        let arrival_airport = airport_code("arrival_airport", &raw.arrival_airport)?;
        if departure_airport == arrival_airport {
            return Err("departure_airport and arrival_airport must differ".into());
        }

        let outbound = parse_date("outbound_date", &raw.outbound_date)?;
        let return_date = match raw.return_date.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(s) => {
                let ret = parse_date("return_date", s)?;
                if ret < outbound {
                    return Err("return_date must not be before outbound_date".into());
                }
                Some(ret.format("%Y-%m-%d").to_string())
            }
        };

        let adults = raw.adults.unwrap_or(1);
        if adults == 0 {
            return Err("at least one adult must travel".into());
        }
        let infants_on_lap = raw.infants_on_lap.unwrap_or(0);
        if infants_on_lap > adults {
            return Err("each infant on lap needs an accompanying adult".into());
        }

        Ok(Self {
            departure_airport,
            arrival_airport,
            outbound_date: outbound.format("%Y-%m-%d").to_string(),
            return_date,
            adults,
            children: raw.children.unwrap_or(0),
            infants_in_seat: raw.infants_in_seat.unwrap_or(0),
            infants_on_lap,
        })
    }

    pub fn to_query(&self, cfg: &SearchConfig) -> Query {
        let mut q: Query = vec![
            ("engine", "google_flights".into()),
            ("hl", cfg.language.clone()),
            ("gl", cfg.flights_country.clone()),
            ("departure_id", self.departure_airport.clone()),
            ("arrival_id", self.arrival_airport.clone()),
            ("outbound_date", self.outbound_date.clone()),
        ];
        match &self.return_date {
            Some(date) => q.push(("return_date", date.clone())),
            // 2 = one-way; the provider defaults to round trip
            None => q.push(("type", "2".into())),
        }
        q.extend([
            ("currency", cfg.flights_currency.clone()),
            ("adults", self.adults.to_string()),
            ("children", self.children.to_string()),
            ("infants_in_seat", self.infants_in_seat.to_string()),
            ("infants_on_lap", self.infants_on_lap.to_string()),
            ("stops", "1".into()),
        ]);
        q
    }
}

pub async fn flights_finder(client: &SerpApiClient, args: &Value) -> ToolOutcome {
    let params = match FlightsParams::from_args(args) {
        Ok(p) => p,
        Err(failure) => return failure.into(),
    };
    debug!(?params, "flights_finder");
    match client.search(params.to_query(&client.cfg)).await {
        Ok(payload) => interpret_results(
            &payload,
            "best_flights",
            client.cfg.max_flights,
            NO_FLIGHTS,
        ),
        Err(failure) => failure.into(),
    }
}
