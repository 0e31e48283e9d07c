/// User agent sent on every request to the control plane and to envd.
pub const USER_AGENT: &str = concat!("e2b-rust-sdk/", env!("CARGO_PKG_VERSION"));

// Header names are kept lowercase; HTTP treats them case-insensitively and
// `HeaderMap` requires lowercase statics.

/// Header carrying the envd access token (`X-Access-Token`).
pub const HEADER_ACCESS_TOKEN: &str = "x-access-token";

/// Header carrying the traffic access token for secured sandboxes
/// (`E2B-Traffic-Access-Token`).
pub const HEADER_TRAFFIC_TOKEN: &str = "e2b-traffic-access-token";

/// Header asking envd to ping idle streams so intermediaries keep them open
/// (`Keepalive-Ping-Interval`).
pub const KEEPALIVE_PING_HEADER: &str = "keepalive-ping-interval";

/// Keepalive ping interval communicated on streaming requests, in seconds.
pub const KEEPALIVE_PING_INTERVAL_SEC: u32 = 50;
