//! Connection-name routing to feed handlers.

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

/// The closed set of feed handler families.
///
/// Connections are routed by name prefix: `fan_studio_*`, `p2p_*`,
/// `wolfx_*` and `global_quake*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    FanStudio,
    P2p,
    Wolfx,
    GlobalQuake,
}

impl HandlerKind {
    pub const ALL: [HandlerKind; 4] = [
        HandlerKind::FanStudio,
        HandlerKind::P2p,
        HandlerKind::Wolfx,
        HandlerKind::GlobalQuake,
    ];

    pub fn prefix(&self) -> &'static str {
        match self {
            HandlerKind::FanStudio => "fan_studio_",
            HandlerKind::P2p => "p2p_",
            HandlerKind::Wolfx => "wolfx_",
            HandlerKind::GlobalQuake => "global_quake",
        }
    }

    /// Resolve a connection name by longest matching prefix.
    pub fn resolve(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .filter(|kind| name.starts_with(kind.prefix()))
            .max_by_key(|kind| kind.prefix().len())
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HandlerKind::FanStudio => "fan_studio",
            HandlerKind::P2p => "p2p",
            HandlerKind::Wolfx => "wolfx",
            HandlerKind::GlobalQuake => "global_quake",
        };
        f.write_str(s)
    }
}

/// How a payload reached the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    WebSocket,
    HttpPoll,
}

/// Where an inbound payload came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageOrigin {
    pub connection: String,
    pub kind: HandlerKind,
    pub uri: String,
    pub transport: Transport,
}

/// Receives raw payloads for one handler family.
///
/// Calls for one connection are sequential and in arrival order.
#[async_trait]
pub trait FeedHandler: Send + Sync {
    async fn handle(&self, origin: &MessageOrigin, payload: &str);
}
