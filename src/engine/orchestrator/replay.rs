//! Newline-delimited JSON replay input.
//!
//! Each line is one event, tagged by `type`:
//!
//! ```text
//! {"type":"bar","snapshot":{...},"views":[...],"strategy":{"deterministic":"iron_condor"}}
//! {"type":"trade_close","symbol":"SPY","strategy_id":"iron_condor",...}
//! ```

use serde::{Deserialize, Serialize};

use crate::engine::learning::TradeClose;
use crate::errors::Error;
use crate::prelude::Result;
use crate::types::{AgentView, ChainSnapshot};

use super::cycle::StrategyChoice;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplayEvent {
    /// One bar of chain data plus any external views
    Bar {
        snapshot: ChainSnapshot,
        #[serde(default)]
        views: Vec<AgentView>,
        #[serde(default)]
        strategy: Option<StrategyChoice>,
    },
    /// Realized outcome of an earlier decision
    TradeClose(TradeClose),
}

impl ReplayEvent {
    /// Parse one line. Blank lines and `#` comments yield `Ok(None)`.
    pub fn parse_line(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        serde_json::from_str(line)
            .map(Some)
            .map_err(|e| Error::SnapshotDecode(e.to_string()))
    }
}
