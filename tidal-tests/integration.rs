//! Integration tests for Tidal
//!
//! These tests drive the simulators through their public entry points:
//! topology building and routing, both fluid models, request parsing and the
//! ns-3 bridge against fake launchers.

#[path = "integration/multi_flow.rs"]
mod multi_flow;
#[path = "integration/ns3_bridge.rs"]
mod ns3_bridge;
#[path = "integration/properties.rs"]
mod properties;
#[path = "integration/routing.rs"]
mod routing;
#[path = "integration/single_flow.rs"]
mod single_flow;
