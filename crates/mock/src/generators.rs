//! Per-channel synthetic payload generators.
//!
//! Each known channel gets realistic-shaped random values within bounded
//! ranges, matching what the live backend produces for that channel.
//! Unknown channels have no generator; callers treat that as a non-fatal
//! gap.

use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use serde_json::{Value, json};

use pulseboard_protocol::constants::{MOCK_DEFAULT_INTERVAL, MOCK_HEALTH_INTERVAL, channels};

/// Emission cadence for a channel.
pub fn cadence(channel: &str) -> Duration {
    match channel {
        channels::HEALTH_METRICS => MOCK_HEALTH_INTERVAL,
        _ => MOCK_DEFAULT_INTERVAL,
    }
}

/// Whether a generator exists for this channel.
pub fn supported(channel: &str) -> bool {
    channels::ALL.contains(&channel)
}

/// Builds one synthetic payload for a channel, or `None` when no
/// generator exists for it.
pub fn generate(channel: &str) -> Option<Value> {
    let mut rng = rand::thread_rng();
    match channel {
        channels::METRICS => Some(metrics(&mut rng)),
        channels::PERFORMANCE_METRICS => Some(performance_metrics(&mut rng)),
        channels::HEALTH_METRICS => Some(health_metrics(&mut rng)),
        channels::DATABASE => Some(database(&mut rng)),
        channels::GRAPHQL => Some(graphql(&mut rng)),
        channels::SECTION_COLORS => Some(section_colors()),
        channels::METRIC_LEGEND => Some(metric_legend()),
        channels::LOGS => Some(log_entry(&mut rng)),
        channels::SYSTEM_STATUS => Some(system_status(&mut rng)),
        _ => None,
    }
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn stamp() -> i64 {
    Utc::now().timestamp_millis()
}

fn metrics(rng: &mut impl Rng) -> Value {
    json!([
        {
            "id": format!("api-{}", stamp()),
            "name": "API Calls",
            "value": rng.gen_range(0..1000),
            "unit": "calls/min",
            "timestamp": now(),
            "source": "Mock API",
            "type": "api",
            "isMock": true
        },
        {
            "id": format!("err-{}", stamp()),
            "name": "Error Rate",
            "value": rng.gen_range(0.0..5.0),
            "unit": "%",
            "timestamp": now(),
            "source": "Mock Error Tracking",
            "type": "errors",
            "isMock": true
        }
    ])
}

fn performance_metrics(rng: &mut impl Rng) -> Value {
    json!([
        {
            "id": format!("cpu-{}", stamp()),
            "name": "CPU Usage",
            "value": rng.gen_range(0..100),
            "unit": "%",
            "timestamp": now(),
            "source": "Mock Server",
            "type": "cpu",
            "color": "#FF5722",
            "isMock": true
        },
        {
            "id": format!("memory-{}", stamp()),
            "name": "Memory Usage",
            "value": rng.gen_range(0..16000),
            "unit": "MB",
            "timestamp": now(),
            "source": "Mock Server",
            "type": "memory",
            "color": "#2196F3",
            "isMock": true
        },
        {
            "id": format!("latency-{}", stamp()),
            "name": "Response Time",
            "value": rng.gen_range(0..200),
            "unit": "ms",
            "timestamp": now(),
            "source": "Mock Server",
            "type": "latency",
            "color": "#795548",
            "isMock": true
        },
        {
            "id": format!("throughput-{}", stamp()),
            "name": "Request Throughput",
            "value": rng.gen_range(0..150),
            "unit": "rps",
            "timestamp": now(),
            "source": "Mock Server",
            "type": "throughput",
            "color": "#009688",
            "isMock": true
        }
    ])
}

fn health_metrics(rng: &mut impl Rng) -> Value {
    let worker2_status = if rng.gen_bool(0.3) { "warning" } else { "healthy" };
    let messaging_status = if rng.gen_bool(0.2) { "error" } else { "healthy" };
    json!({
        "isMock": true,
        "servers": [
            { "name": "API Server", "status": "healthy", "uptime": "14d 7h",
              "load": rng.gen_range(0..100) },
            { "name": "Worker Node 1", "status": "healthy", "uptime": "7d 12h",
              "load": rng.gen_range(0..100) },
            { "name": "Worker Node 2", "status": worker2_status, "uptime": "3d 9h",
              "load": rng.gen_range(0..100) }
        ],
        "databases": [
            { "name": "Primary DB", "status": "healthy",
              "connections": rng.gen_range(0..50),
              "latency": format!("{}ms", rng.gen_range(0..20)) },
            { "name": "Analytics DB", "status": "healthy",
              "connections": rng.gen_range(0..20),
              "latency": format!("{}ms", rng.gen_range(0..30)) }
        ],
        "services": [
            { "name": "Authentication", "status": "healthy",
              "requests": rng.gen_range(0..2000), "errorRate": rng.gen_range(0.0..0.1) },
            { "name": "Storage", "status": "healthy",
              "requests": rng.gen_range(0..10000), "errorRate": 0.0 },
            { "name": "Messaging", "status": messaging_status,
              "requests": rng.gen_range(0..1000), "errorRate": rng.gen_range(0.0..5.0) }
        ]
    })
}

fn database(rng: &mut impl Rng) -> Value {
    let failed = rng.gen_bool(0.2);
    json!({
        "isMock": true,
        "connections": rng.gen_range(0..100),
        "activeQueries": rng.gen_range(0..50),
        "queryHistory": [
            {
                "type": "query",
                "message": format!("SELECT * FROM users LIMIT {}", rng.gen_range(1..20)),
                "timestamp": now(),
                "operation": "SELECT",
                "collection": "users"
            },
            {
                "type": if failed { "error" } else { "query" },
                "message": if failed { "Failed to connect to database" } else { "INSERT INTO logs" },
                "timestamp": now(),
                "operation": if failed { "ERROR" } else { "INSERT" },
                "collection": if failed { Value::Null } else { json!("logs") }
            }
        ]
    })
}

fn graphql(rng: &mut impl Rng) -> Value {
    let mutation_failed = rng.gen_bool(0.2);
    json!({
        "isMock": true,
        "queries": [
            {
                "name": "GetUserProfile",
                "status": "success",
                "timestamp": now(),
                "duration": rng.gen_range(0..100)
            },
            {
                "name": "UpdateUserPreferences",
                "status": if mutation_failed { "error" } else { "success" },
                "timestamp": now(),
                "duration": rng.gen_range(100..300)
            }
        ],
        "performance": {
            "averageResponseTime": rng.gen_range(20..120),
            "maxResponseTime": rng.gen_range(100..600),
            "requestsPerMinute": rng.gen_range(0..60)
        }
    })
}

fn section_colors() -> Value {
    json!({
        "isMock": true,
        "dashboard": "#3F51B5",
        "health": "#00BCD4",
        "metrics": "#4CAF50",
        "performance": "#FF5722",
        "database": "#9C27B0",
        "graphql": "#FF9800"
    })
}

fn metric_legend() -> Value {
    json!([
        { "name": "CPU Usage", "color": "#FF5722", "description": "Processor utilization", "isMock": true },
        { "name": "Memory", "color": "#2196F3", "description": "RAM usage", "isMock": true },
        { "name": "Disk IO", "color": "#4CAF50", "description": "Disk read/write operations", "isMock": true },
        { "name": "Network", "color": "#9C27B0", "description": "Network traffic", "isMock": true },
        { "name": "Requests", "color": "#FFC107", "description": "HTTP/API requests", "isMock": true },
        { "name": "Latency", "color": "#795548", "description": "Response time", "isMock": true },
        { "name": "Errors", "color": "#F44336", "description": "Error count", "isMock": true },
        { "name": "Throughput", "color": "#009688", "description": "Requests per second", "isMock": true },
        { "name": "Connections", "color": "#3F51B5", "description": "Active connections", "isMock": true }
    ])
}

fn log_entry(rng: &mut impl Rng) -> Value {
    const LEVELS: [&str; 4] = ["info", "warning", "error", "debug"];
    const SOURCES: [&str; 4] = [
        "API:SystemMonitor",
        "API:Database",
        "API:Authentication",
        "API:WebServer",
    ];
    const MESSAGES: [&str; 7] = [
        "Request processed successfully",
        "Database query completed",
        "Authentication attempt",
        "File not found",
        "Permission denied",
        "User session expired",
        "Configuration loaded",
    ];
    json!({
        "timestamp": now(),
        "level": LEVELS[rng.gen_range(0..LEVELS.len())],
        "source": SOURCES[rng.gen_range(0..SOURCES.len())],
        "message": MESSAGES[rng.gen_range(0..MESSAGES.len())],
        "isMock": true
    })
}

fn system_status(rng: &mut impl Rng) -> Value {
    json!({
        "isMock": true,
        "cpu": rng.gen_range(0..100),
        "memory": rng.gen_range(0..100),
        "disk": rng.gen_range(0..100),
        "network": rng.gen_range(0..100),
        "uptime": format!("{}d {}h", rng.gen_range(0..30), rng.gen_range(0..24)),
        "activeConnections": rng.gen_range(0..500)
    })
}
