pub mod flights;
pub mod hotels;
mod outcome;
pub(crate) mod params;
pub mod serpapi;

use serde_json::Value;
use tracing::debug;

use crate::llm::types::ToolDef;

pub use outcome::{ToolFailure, ToolOutcome, interpret_results};
pub use serpapi::SerpApiClient;

/// The tools the model may call. Names outside this set are answered with
/// `ToolFailure::UnknownTool`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    FlightSearch,
    HotelSearch,
}

impl ToolKind {
    pub const ALL: [ToolKind; 2] = [ToolKind::FlightSearch, ToolKind::HotelSearch];

    pub fn name(self) -> &'static str {
        match self {
            ToolKind::FlightSearch => flights::TOOL_NAME,
            ToolKind::HotelSearch => hotels::TOOL_NAME,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    pub fn tool_def(self) -> ToolDef {
        match self {
            ToolKind::FlightSearch => flights::tool_def(),
            ToolKind::HotelSearch => hotels::tool_def(),
        }
    }
}

pub fn default_tools_def() -> Vec<ToolDef> {
    ToolKind::ALL.into_iter().map(ToolKind::tool_def).collect()
}

/// Registry mapping each `ToolKind` to its handler.
#[derive(Debug, Clone)]
pub struct TravelTools {
    search: SerpApiClient,
}

impl TravelTools {
    pub fn new(search: SerpApiClient) -> Self {
        Self { search }
    }

    pub fn definitions(&self) -> Vec<ToolDef> {
        default_tools_def()
    }

    pub async fn invoke(&self, kind: ToolKind, args: &Value) -> ToolOutcome {
        debug!(tool = kind.name(), "invoking tool");
        match kind {
            ToolKind::FlightSearch => flights::flights_finder(&self.search, args).await,
            ToolKind::HotelSearch => hotels::hotels_finder(&self.search, args).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_kind() {
        assert_eq!(ToolKind::from_name("flights_finder"), Some(ToolKind::FlightSearch));
        assert_eq!(ToolKind::from_name("hotels_finder"), Some(ToolKind::HotelSearch));
        assert_eq!(ToolKind::from_name("car_rental"), None);
    }

    #[test]
    fn definitions_declare_both_tools() {
        let defs = default_tools_def();
        let names: Vec<_> = defs.iter().map(|d| d.function.name.as_str()).collect();
        assert_eq!(names, vec!["flights_finder", "hotels_finder"]);
        for d in &defs {
            assert_eq!(d.kind, "function");
            assert_eq!(d.function.parameters["type"], "object");
        }
    }
}
