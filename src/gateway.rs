//! Static payment-gateway directory.
//!
//! Maps a gateway identifier to its window-opening strategy and descriptive
//! metadata. Pure lookup, no state.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How a gateway's authentication surface is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WindowType {
    /// Vendor SDK invoked inline; no new window.
    Script,
    /// New top-level window at a gateway-provided URL.
    Redirect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub window_type: WindowType,
    /// SDK script location for script-strategy gateways.
    pub script_url: Option<&'static str>,
    pub description: &'static str,
}

pub const GATEWAYS: &[GatewayInfo] = &[
    GatewayInfo {
        id: "PG_A",
        name: "PG A",
        window_type: WindowType::Script,
        script_url: Some("https://pg-a.example.com/sdk.js"),
        description: "inline JavaScript SDK",
    },
    GatewayInfo {
        id: "PG_B",
        name: "PG B",
        window_type: WindowType::Redirect,
        script_url: None,
        description: "URL redirect",
    },
];

pub fn find(gateway_id: &str) -> Option<&'static GatewayInfo> {
    GATEWAYS.iter().find(|g| g.id == gateway_id)
}

/// Display name for a gateway, falling back to the raw id.
pub fn display_name(gateway_id: &str) -> &str {
    find(gateway_id).map_or(gateway_id, |g| g.name)
}
