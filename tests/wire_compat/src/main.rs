fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use pulseboard_client::route_to_channel;
    use pulseboard_protocol::{ClientRequest, ServerMessage};

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        let path = fixtures_dir().join(name);
        let data = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        serde_json::from_str(&data)
            .unwrap_or_else(|e| panic!("failed to parse fixture {}: {e}", path.display()))
    }

    /// Deserializes a fixture into a Rust type, re-serializes it, and
    /// compares the JSON values (order-independent comparison).
    fn roundtrip_test<T>(name: &str)
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));

        assert_eq!(
            fixture, reserialized,
            "roundtrip mismatch for {name}:\n  wire: {fixture}\n  rust: {reserialized}"
        );
    }

    // --- client request shapes ---

    #[test]
    fn fixture_register_request() {
        roundtrip_test::<ClientRequest>("register_request.json");
    }

    #[test]
    fn fixture_subscribe_request() {
        roundtrip_test::<ClientRequest>("subscribe_request.json");
    }

    #[test]
    fn fixture_ping_request() {
        roundtrip_test::<ClientRequest>("ping_request.json");
    }

    // --- server message classification ---

    #[test]
    fn fixture_ack_tagged_by_action() {
        let msg = ServerMessage::classify(load_fixture("ack_action.json"));
        match msg {
            ServerMessage::RegistrationAck(ack) => {
                assert_eq!(ack.stream, "metrics");
                assert!(ack.success);
                assert_eq!(ack.request_id, "metrics-reg-1700000000000-421");
            }
            other => panic!("expected ack, got {other:?}"),
        }
    }

    #[test]
    fn fixture_ack_tagged_by_type() {
        let msg = ServerMessage::classify(load_fixture("ack_type.json"));
        match msg {
            ServerMessage::RegistrationAck(ack) => {
                assert_eq!(ack.stream, "health-metrics");
                assert!(ack.message.is_none());
            }
            other => panic!("expected ack, got {other:?}"),
        }
    }

    #[test]
    fn fixture_pong() {
        let msg = ServerMessage::classify(load_fixture("pong.json"));
        match msg {
            ServerMessage::Pong(pong) => {
                assert_eq!(
                    pong.request_id.as_deref(),
                    Some("5f3a0f5e-1111-2222-3333-444455556666")
                );
                assert!(pong.timestamp.is_some());
            }
            other => panic!("expected pong, got {other:?}"),
        }
    }

    // --- channel payload routing, one test per historical shape ---

    #[test]
    fn fixture_channel_data_envelope() {
        let fixture = load_fixture("channel_data.json");
        assert!(matches!(
            ServerMessage::classify(fixture.clone()),
            ServerMessage::Data(_)
        ));

        let payload = route_to_channel("metrics", &fixture).expect("routes to metrics");
        assert_eq!(payload[0]["name"], "API Calls");
        assert!(route_to_channel("database", &fixture).is_none());
    }

    #[test]
    fn fixture_stream_data_envelope() {
        let fixture = load_fixture("stream_data.json");
        let payload = route_to_channel("graphql", &fixture).expect("routes to graphql");
        assert!(payload["queries"].is_array());
    }

    #[test]
    fn fixture_keyed_by_channel_envelope() {
        let fixture = load_fixture("keyed_by_channel.json");
        let payload = route_to_channel("database", &fixture).expect("routes to database");
        assert_eq!(payload["connections"], 24);
    }

    #[test]
    fn fixture_bare_performance_array() {
        let fixture = load_fixture("bare_performance_array.json");
        let payload =
            route_to_channel("performance-metrics", &fixture).expect("routes to performance");
        assert_eq!(payload.as_array().unwrap().len(), 2);

        // Bare arrays belong to performance-metrics alone.
        assert!(route_to_channel("metrics", &fixture).is_none());
        assert!(route_to_channel("health-metrics", &fixture).is_none());
    }

    #[test]
    fn fixture_untagged_health_snapshot() {
        let fixture = load_fixture("untagged_health.json");
        let payload =
            route_to_channel("health-metrics", &fixture).expect("shape-sniffed to health");
        assert_eq!(payload["servers"][0]["name"], "API Server");
    }

    #[test]
    fn fixture_untagged_section_colors() {
        let fixture = load_fixture("untagged_section_colors.json");
        let payload =
            route_to_channel("section-colors", &fixture).expect("shape-sniffed to colors");
        assert_eq!(payload["health"], "#00BCD4");

        // The color map must not leak into metric channels.
        assert!(route_to_channel("health-metrics", &fixture).is_none());
    }

    /// Every server-side fixture classifies to something routable or a
    /// correlated core message; nothing is Unknown.
    #[test]
    fn no_server_fixture_is_unroutable() {
        for name in [
            "ack_action.json",
            "ack_type.json",
            "pong.json",
            "channel_data.json",
            "stream_data.json",
            "keyed_by_channel.json",
            "bare_performance_array.json",
            "untagged_health.json",
            "untagged_section_colors.json",
        ] {
            let msg = ServerMessage::classify(load_fixture(name));
            assert!(
                !matches!(msg, ServerMessage::Unknown(_)),
                "{name} classified as Unknown"
            );
        }
    }
}
