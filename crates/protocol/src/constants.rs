use std::time::Duration;

/// How often to send WebSocket protocol pings.
pub const WS_PING_PERIOD: Duration = Duration::from_secs(5);

/// Read deadline: if *nothing* arrives within this window (no pong, no
/// channel payload), the connection is considered dead and is closed,
/// which hands control to the reconnection policy.
pub const WS_READ_DEADLINE: Duration = Duration::from_secs(60);

/// Maximum inbound message size in bytes (1 MiB). Metric payloads are
/// small; anything larger is a misbehaving producer.
pub const WS_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Time to wait for a registration acknowledgement before retrying.
pub const REGISTRATION_ACK_TIMEOUT: Duration = Duration::from_secs(20);

/// Base delay before re-sending an unacknowledged registration.
pub const REGISTRATION_RETRY_BASE: Duration = Duration::from_millis(3000);

/// Upper bound of the uniform jitter added to [`REGISTRATION_RETRY_BASE`],
/// so many channels re-registering after a reconnect spread out instead of
/// retrying in lockstep.
pub const REGISTRATION_RETRY_JITTER: Duration = Duration::from_millis(2000);

/// Default initial reconnection delay.
pub const DEFAULT_INITIAL_RECONNECT_DELAY: Duration = Duration::from_millis(5000);

/// Default reconnection delay cap.
pub const DEFAULT_MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

/// Attempt number past which the reconnection delay saturates at the cap.
/// Attempts themselves never stop.
pub const DEFAULT_RECONNECT_ATTEMPT_CEILING: u32 = 5;

/// Delay before the mock source acknowledges a registration.
pub const MOCK_ACK_DELAY: Duration = Duration::from_millis(100);

/// Delay before the mock source emits the first payload for a channel.
pub const MOCK_FIRST_PAYLOAD_DELAY: Duration = Duration::from_millis(500);

/// Default cadence for periodic mock payloads.
pub const MOCK_DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Cadence for mock health snapshots.
pub const MOCK_HEALTH_INTERVAL: Duration = Duration::from_secs(10);

/// Tag value (in `action` or `type`) marking a registration acknowledgement.
pub const REGISTRATION_ACK_TAG: &str = "registration-ack";

/// Tag value marking a pong reply.
pub const PONG_TAG: &str = "pong";

/// Named channels the backend is known to produce.
pub mod channels {
    pub const METRICS: &str = "metrics";
    pub const HEALTH_METRICS: &str = "health-metrics";
    pub const PERFORMANCE_METRICS: &str = "performance-metrics";
    pub const DATABASE: &str = "database";
    pub const GRAPHQL: &str = "graphql";
    pub const SECTION_COLORS: &str = "section-colors";
    pub const METRIC_LEGEND: &str = "metric-legend";
    pub const LOGS: &str = "logs";
    pub const SYSTEM_STATUS: &str = "system-status";

    /// All known channels, in dashboard display order.
    pub const ALL: [&str; 9] = [
        METRICS,
        HEALTH_METRICS,
        PERFORMANCE_METRICS,
        DATABASE,
        GRAPHQL,
        SECTION_COLORS,
        METRIC_LEGEND,
        LOGS,
        SYSTEM_STATUS,
    ];
}

/// Dashboard section keys. A bare object carrying one of these as a field
/// is treated as a section-color map by the channel router's legacy
/// shape sniffer.
pub const SECTION_KEYS: [&str; 6] = [
    "dashboard",
    "health",
    "metrics",
    "performance",
    "database",
    "graphql",
];
