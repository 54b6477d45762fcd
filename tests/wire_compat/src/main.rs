fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use chrono::{DateTime, Utc};
    use fleetops_protocol::frames::{InboundEvent, OutboundMessage, decode_frame};
    use fleetops_protocol::types::{ActiveShift, Coordinates, UserLocation};

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    fn read_fixture(name: &str) -> String {
        let path = fixtures_dir().join(name);
        fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        serde_json::from_str(&read_fixture(name))
            .unwrap_or_else(|e| panic!("failed to parse fixture {name}: {e}"))
    }

    /// Normalizes JSON values so that integer-valued floats compare equal.
    ///
    /// The backend may send `2` where Rust writes `2.0`.
    fn normalize_value(v: &serde_json::Value) -> serde_json::Value {
        match v {
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) => serde_json::json!(f),
                None => v.clone(),
            },
            serde_json::Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), normalize_value(v)))
                    .collect(),
            ),
            serde_json::Value::Array(arr) => {
                serde_json::Value::Array(arr.iter().map(normalize_value).collect())
            }
            _ => v.clone(),
        }
    }

    /// Compares an encoded frame against a fixture (order-independent,
    /// float-normalized).
    fn assert_matches_fixture(encoded: &str, name: &str) {
        let fixture = load_fixture(name);
        let actual: serde_json::Value = serde_json::from_str(encoded)
            .unwrap_or_else(|e| panic!("encoder produced invalid JSON for {name}: {e}"));
        assert_eq!(
            normalize_value(&fixture),
            normalize_value(&actual),
            "wire mismatch for {name}:\n  expected: {fixture}\n  actual:   {actual}"
        );
    }

    /// Deserializes a fixture, re-serializes it, and compares the JSON values.
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
            normalize_value(&fixture),
            normalize_value(&reserialized),
            "roundtrip mismatch for {name}:\n  backend: {fixture}\n  rust:    {reserialized}"
        );
    }

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s)
            .unwrap()
            .with_timezone(&Utc)
    }

    // --- Outbound frames ---

    #[test]
    fn fixture_location_frame() {
        let msg = OutboundMessage::location(
            Coordinates::new(41.3874, 2.1686),
            ts("2024-05-01T08:30:00Z"),
        );
        assert_matches_fixture(&msg.encode().unwrap(), "location_frame.json");
    }

    #[test]
    fn fixture_ping_frame() {
        assert_matches_fixture(
            &OutboundMessage::HeartbeatPing.encode().unwrap(),
            "ping_frame.json",
        );
    }

    // --- Inbound frames ---

    #[test]
    fn fixture_online_users_frame() {
        let event = decode_frame(&read_fixture("online_users_frame.json")).unwrap();
        let InboundEvent::PresenceUpdate(users) = event else {
            panic!("expected presence update, got {event:?}");
        };
        let names: Vec<&str> = users.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["ana.garcia", "joan.puig"]);
    }

    #[test]
    fn fixture_active_shifts_frame() {
        let event = decode_frame(&read_fixture("active_shifts_frame.json")).unwrap();
        let InboundEvent::ShiftUpdate(shifts) = event else {
            panic!("expected shift update, got {event:?}");
        };
        assert_eq!(shifts.len(), 2);
        assert_eq!(shifts[0].id, 1042);
        assert_eq!(shifts[0].started_at, Some(ts("2024-05-01T07:00:00Z")));
        assert_eq!(shifts[1].id, 1043);
        assert_eq!(shifts[1].started_at, None);
    }

    #[test]
    fn fixture_pong_frame() {
        assert_eq!(
            decode_frame(&read_fixture("pong_frame.json")).unwrap(),
            InboundEvent::Heartbeat
        );
    }

    // --- Record types ---

    #[test]
    fn fixture_user_location() {
        roundtrip_test::<UserLocation>("user_location.json");
    }

    #[test]
    fn fixture_active_shift() {
        roundtrip_test::<ActiveShift>("active_shift.json");
    }

    #[test]
    fn encoded_location_decodes_back() {
        let msg = OutboundMessage::location(
            Coordinates::new(-33.8688, 151.2093),
            ts("2024-05-01T09:00:00Z"),
        );
        let parsed: OutboundMessage = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(parsed, msg);
    }
}
