//! End-to-end scenarios for the simulation harness.

use serde::Serialize;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioId {
    /// A registered vehicle passes a camera amid background traffic
    WatchlistHit,

    /// Plate matches a watchlist entry but the make does not
    MakeMismatch,

    /// Violation vehicle among officers at varying range and heading
    Intercept,

    /// One vehicle crosses several cameras inside the session window
    CrossCamera,

    /// Two sightings separated by more than the session window
    WindowLapse,

    /// Broken channels are evicted while healthy ones keep receiving
    ChannelChurn,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::WatchlistHit,
            ScenarioId::MakeMismatch,
            ScenarioId::Intercept,
            ScenarioId::CrossCamera,
            ScenarioId::WindowLapse,
            ScenarioId::ChannelChurn,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::WatchlistHit => "watchlist_hit",
            ScenarioId::MakeMismatch => "make_mismatch",
            ScenarioId::Intercept => "intercept",
            ScenarioId::CrossCamera => "cross_camera",
            ScenarioId::WindowLapse => "window_lapse",
            ScenarioId::ChannelChurn => "channel_churn",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::WatchlistHit => "Stolen vehicle seen once among 20 background vehicles",
            ScenarioId::MakeMismatch => "Watchlisted plate on a different make, expect silence",
            ScenarioId::Intercept => "Officers at 80 m, 300 m on/off axis and 600 m",
            ScenarioId::CrossCamera => "Vehicle crosses 3 cameras and returns, path grows each time",
            ScenarioId::WindowLapse => "Second sighting 31 min later opens a new session",
            ScenarioId::ChannelChurn => "Dead dashboard and officer channels are evicted",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "watchlist_hit" | "watchlist" => Ok(ScenarioId::WatchlistHit),
            "make_mismatch" | "mismatch" => Ok(ScenarioId::MakeMismatch),
            "intercept" => Ok(ScenarioId::Intercept),
            "cross_camera" | "reid" => Ok(ScenarioId::CrossCamera),
            "window_lapse" => Ok(ScenarioId::WindowLapse),
            "channel_churn" | "churn" => Ok(ScenarioId::ChannelChurn),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
