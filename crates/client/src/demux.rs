//! Channel demultiplexer.
//!
//! The backend multiplexes every logical stream over one socket, and its
//! envelope shape has drifted across backend generations. The router
//! absorbs that drift: each subscriber sees a uniform per-channel
//! sequence of payloads, extracted by an ordered list of matchers.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use pulseboard_protocol::constants::{SECTION_KEYS, channels};

/// The ordered matching rules. First match wins; a message matching no
/// rule for a channel is simply not delivered there. One message may
/// match several channels independently (fan-out, not exclusive routing).
const MATCH_ORDER: [Matcher; 7] = [
    Matcher::Tag,
    Matcher::ChannelField,
    Matcher::StreamField,
    Matcher::KeyedField,
    Matcher::HealthShape,
    Matcher::SectionColorsShape,
    Matcher::PerformanceArray,
];

/// A predicate+extractor pair for one envelope shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Matcher {
    /// `type` or `action` equals the channel name; payload is the message
    /// with both tag keys stripped.
    Tag,
    /// `channel` field equals the name and `data` is present; payload is
    /// `data`. Producers using the `channel` envelope always ship `data`.
    ChannelField,
    /// `stream` field equals the name; payload is `data` when present,
    /// else the whole message.
    StreamField,
    /// The message owns a field named exactly like the channel; payload is
    /// that field. Origin: the first backend generation emitted
    /// `{<channel>: payload}` with no other tag. Compatibility shim.
    KeyedField,
    /// A `health-metrics` subscription also accepts any object carrying a
    /// `servers` field. Origin: untagged health broadcasts. Shim.
    HealthShape,
    /// A `section-colors` subscription also accepts any object carrying a
    /// known dashboard section key. Origin: untagged theme pushes. Shim.
    SectionColorsShape,
    /// A `performance-metrics` subscription also accepts a bare array.
    /// Origin: the gateway broadcasts the metrics array without an
    /// envelope. Shim.
    PerformanceArray,
}

impl Matcher {
    fn extract(self, channel: &str, msg: &Value) -> Option<Value> {
        match self {
            Matcher::Tag => {
                let map = msg.as_object()?;
                let tag_hit = [map.get("type"), map.get("action")]
                    .into_iter()
                    .flatten()
                    .any(|tag| tag.as_str() == Some(channel));
                if !tag_hit {
                    return None;
                }
                let mut stripped = map.clone();
                stripped.remove("type");
                stripped.remove("action");
                Some(Value::Object(stripped))
            }
            Matcher::ChannelField => {
                let map = msg.as_object()?;
                if map.get("channel").and_then(Value::as_str) != Some(channel) {
                    return None;
                }
                map.get("data").cloned()
            }
            Matcher::StreamField => {
                let map = msg.as_object()?;
                if map.get("stream").and_then(Value::as_str) != Some(channel) {
                    return None;
                }
                Some(map.get("data").cloned().unwrap_or_else(|| msg.clone()))
            }
            Matcher::KeyedField => msg.as_object()?.get(channel).cloned(),
            Matcher::HealthShape => {
                if channel == channels::HEALTH_METRICS
                    && msg.as_object()?.contains_key("servers")
                {
                    Some(msg.clone())
                } else {
                    None
                }
            }
            Matcher::SectionColorsShape => {
                let map = msg.as_object()?;
                if channel == channels::SECTION_COLORS
                    && SECTION_KEYS.iter().any(|key| map.contains_key(*key))
                {
                    Some(msg.clone())
                } else {
                    None
                }
            }
            Matcher::PerformanceArray => {
                if channel == channels::PERFORMANCE_METRICS && msg.is_array() {
                    Some(msg.clone())
                } else {
                    None
                }
            }
        }
    }
}

/// Applies the matching rules in order for one channel. Returns the
/// extracted payload, or `None` when the message is not for that
/// channel.
pub fn route_to_channel(channel: &str, msg: &Value) -> Option<Value> {
    MATCH_ORDER.iter().find_map(|m| m.extract(channel, msg))
}

/// Fans inbound data out to channel subscribers.
#[derive(Clone)]
pub struct ChannelRouter {
    bus: broadcast::Sender<Arc<Value>>,
    cancel: CancellationToken,
}

impl ChannelRouter {
    pub(crate) fn new(capacity: usize, cancel: CancellationToken) -> Self {
        let (bus, _) = broadcast::channel(capacity);
        Self { bus, cancel }
    }

    /// Publishes one inbound message to all subscribers.
    pub(crate) fn publish(&self, msg: Value) {
        // Err just means nobody is subscribed right now.
        let _ = self.bus.send(Arc::new(msg));
    }

    /// Opens an independent live view of one channel. No replay: only
    /// messages published after this call are seen. Dropping the
    /// subscription unsubscribes.
    pub fn subscribe(&self, channel: &str) -> ChannelSubscription {
        ChannelSubscription {
            channel: channel.to_owned(),
            rx: self.bus.subscribe(),
            cancel: self.cancel.clone(),
        }
    }
}

/// A live, filtered view of one channel.
pub struct ChannelSubscription {
    channel: String,
    rx: broadcast::Receiver<Arc<Value>>,
    cancel: CancellationToken,
}

impl ChannelSubscription {
    /// The next payload for this channel, or `None` once the client has
    /// shut down. A subscriber that falls behind the bus capacity loses
    /// the oldest messages (warned, never an error).
    pub async fn recv(&mut self) -> Option<Value> {
        loop {
            let msg = tokio::select! {
                _ = self.cancel.cancelled() => return None,
                msg = self.rx.recv() => msg,
            };
            match msg {
                Ok(msg) => {
                    if let Some(payload) = route_to_channel(&self.channel, &msg) {
                        return Some(payload);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(channel = %self.channel, skipped, "subscriber lagging, oldest messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    // --- matching rules ---

    #[test]
    fn tag_match_strips_tag_keys() {
        let msg = json!({"type": "system-status", "cpu": 40, "memory": 60});
        let payload = route_to_channel("system-status", &msg).unwrap();
        assert_eq!(payload["cpu"], 40);
        assert!(payload.get("type").is_none());

        let msg = json!({"action": "system-status", "cpu": 10});
        assert!(route_to_channel("system-status", &msg).is_some());
    }

    #[test]
    fn channel_field_extracts_data() {
        let msg = json!({"channel": "metrics", "data": [{"name": "CPU"}]});
        let payload = route_to_channel("metrics", &msg).unwrap();
        assert_eq!(payload[0]["name"], "CPU");
    }

    #[test]
    fn channel_field_without_data_does_not_match() {
        let msg = json!({"channel": "metrics"});
        assert!(route_to_channel("metrics", &msg).is_none());
    }

    #[test]
    fn stream_field_prefers_data_falls_back_to_whole() {
        let with_data = json!({"stream": "graphql", "data": {"queries": []}});
        let payload = route_to_channel("graphql", &with_data).unwrap();
        assert!(payload["queries"].is_array());

        let without_data = json!({"stream": "graphql", "queries": []});
        let payload = route_to_channel("graphql", &without_data).unwrap();
        assert_eq!(payload["stream"], "graphql");
    }

    #[test]
    fn keyed_field_matches_legacy_envelope() {
        let msg = json!({"database": {"connections": 12}});
        let payload = route_to_channel("database", &msg).unwrap();
        assert_eq!(payload["connections"], 12);
    }

    #[test]
    fn health_shape_sniffer() {
        let msg = json!({"servers": [{"name": "API Server"}], "databases": []});
        let payload = route_to_channel("health-metrics", &msg).unwrap();
        assert!(payload["servers"].is_array());

        // The sniffer is channel-specific.
        assert!(route_to_channel("metrics", &msg).is_none());
    }

    #[test]
    fn section_colors_sniffer() {
        let msg = json!({"health": "#00BCD4", "performance": "#FF5722"});
        assert!(route_to_channel("section-colors", &msg).is_some());
        assert!(route_to_channel("metric-legend", &msg).is_none());
    }

    #[test]
    fn bare_array_matches_performance_only() {
        let msg = json!([{"name": "CPU Usage", "value": 40}]);
        let payload = route_to_channel("performance-metrics", &msg).unwrap();
        assert!(payload.is_array());
        assert!(route_to_channel("metrics", &msg).is_none());
    }

    #[test]
    fn unroutable_message_matches_nothing() {
        let msg = json!({"unrelated": true});
        for channel in channels::ALL {
            assert!(
                route_to_channel(channel, &msg).is_none(),
                "{channel} must not match"
            );
        }
    }

    #[test]
    fn one_message_can_fan_out_to_many_channels() {
        // A health payload that is also keyed by channel name.
        let msg = json!({"health-metrics": {"x": 1}, "servers": []});
        assert!(route_to_channel("health-metrics", &msg).is_some());
        // And the keyed-field rule fires before the sniffer.
        assert_eq!(
            route_to_channel("health-metrics", &msg).unwrap(),
            json!({"x": 1})
        );
    }

    #[test]
    fn rule_order_tag_beats_channel_field() {
        let msg = json!({"type": "logs", "channel": "logs", "data": {"level": "info"}});
        let payload = route_to_channel("logs", &msg).unwrap();
        // Tag rule fired: payload is the stripped message, not `data`.
        assert!(payload.get("channel").is_some());
    }

    // --- router ---

    #[tokio::test]
    async fn subscribers_get_matching_messages_only() {
        let router = ChannelRouter::new(16, CancellationToken::new());
        let mut metrics = router.subscribe("metrics");
        let mut health = router.subscribe("health-metrics");

        router.publish(json!({"channel": "metrics", "data": [1, 2]}));
        router.publish(json!({"servers": []}));

        assert_eq!(metrics.recv().await.unwrap(), json!([1, 2]));
        let payload = health.recv().await.unwrap();
        assert!(payload["servers"].is_array());
    }

    #[tokio::test]
    async fn subscription_is_live_not_replayed() {
        let router = ChannelRouter::new(16, CancellationToken::new());
        router.publish(json!({"channel": "metrics", "data": "early"}));

        let mut sub = router.subscribe("metrics");
        router.publish(json!({"channel": "metrics", "data": "late"}));
        assert_eq!(sub.recv().await.unwrap(), json!("late"));
    }

    #[tokio::test]
    async fn fan_out_is_independent_per_subscriber() {
        let router = ChannelRouter::new(16, CancellationToken::new());
        let mut a = router.subscribe("logs");
        let mut b = router.subscribe("logs");

        router.publish(json!({"channel": "logs", "data": {"level": "warn"}}));

        assert_eq!(a.recv().await.unwrap()["level"], "warn");
        assert_eq!(b.recv().await.unwrap()["level"], "warn");
    }

    #[tokio::test]
    async fn recv_ends_when_router_dropped() {
        let router = ChannelRouter::new(16, CancellationToken::new());
        let mut sub = router.subscribe("metrics");
        drop(router);
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn delivery_preserves_transport_order() {
        let router = ChannelRouter::new(64, CancellationToken::new());
        let mut sub = router.subscribe("logs");
        for i in 0..10 {
            router.publish(json!({"channel": "logs", "data": i}));
        }
        for i in 0..10 {
            assert_eq!(sub.recv().await.unwrap(), json!(i));
        }
    }
}
