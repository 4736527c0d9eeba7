//! Gateway: HTTP surface for the connector.
//!
//! `POST /api/messages` receives activities and runs a turn; `GET /api/notify` sends the
//! proactive notification to every known conversation; `GET /` is a health probe.

mod server;

pub use server::{build_state, router, run_gateway, GatewayState, NOTIFY_ACK_HTML};
