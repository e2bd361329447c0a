fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use galileo_protocol::{CompletionAck, ErrorRecord, Handshake, ServerSignal};

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    fn load_text(name: &str) -> String {
        let path = fixtures_dir().join(name);
        fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        serde_json::from_str(&load_text(name))
            .unwrap_or_else(|e| panic!("failed to parse fixture {name}: {e}"))
    }

    /// Deserializes a fixture into a Rust type, re-serializes it, and compares
    /// the JSON values (order-independent).
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
            "roundtrip mismatch for {name}:\n  fixture: {fixture}\n  Rust:    {reserialized}"
        );
    }

    fn decode_fixture(name: &str) -> ServerSignal {
        ServerSignal::decode(&load_text(name))
            .unwrap_or_else(|e| panic!("failed to decode {name}: {e}"))
    }

    // --- Outbound messages ---

    #[test]
    fn fixture_handshake() {
        roundtrip_test::<Handshake>("handshake.json");

        let hs = Handshake {
            name: "holiday.mp4".into(),
            size: 1_048_576,
        };
        let encoded: serde_json::Value = serde_json::from_str(&hs.to_json().unwrap()).unwrap();
        assert_eq!(encoded, load_fixture("handshake.json"));
    }

    #[test]
    fn fixture_completion_ack() {
        roundtrip_test::<CompletionAck>("completion_ack.json");

        let encoded: serde_json::Value =
            serde_json::from_str(&CompletionAck::default().to_json().unwrap()).unwrap();
        assert_eq!(encoded, load_fixture("completion_ack.json"));
    }

    // --- Inbound signals ---

    #[test]
    fn fixture_ready() {
        assert_eq!(
            decode_fixture("ready.json"),
            ServerSignal::Ready { chunk_size: None }
        );
    }

    #[test]
    fn fixture_ready_chunksize() {
        assert_eq!(
            decode_fixture("ready_chunksize.json"),
            ServerSignal::Ready {
                chunk_size: Some(65_536)
            }
        );
    }

    #[test]
    fn fixture_ready_zero_chunksize_uses_default() {
        assert_eq!(
            decode_fixture("ready_zero_chunksize.json"),
            ServerSignal::Ready { chunk_size: None }
        );
    }

    #[test]
    fn fixture_error_fatal() {
        let fixture = load_fixture("error_fatal.json");
        match decode_fixture("error_fatal.json") {
            ServerSignal::Error(rec) => {
                assert_eq!(rec.message, "Disk full");
                assert!(rec.fatal);
                assert_eq!(rec.raw, fixture);
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn fixture_error_nonfatal() {
        match decode_fixture("error_nonfatal.json") {
            ServerSignal::Error(rec) => {
                assert_eq!(rec.message, "Checksum mismatch, resending");
                assert!(!rec.fatal);
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn fixture_close() {
        assert_eq!(decode_fixture("close.json"), ServerSignal::Close);
    }

    #[test]
    fn fixture_close_takes_precedence() {
        assert_eq!(decode_fixture("close_with_error.json"), ServerSignal::Close);
    }

    #[test]
    fn fixture_unknown_is_preserved() {
        let fixture = load_fixture("unknown.json");
        assert_eq!(
            decode_fixture("unknown.json"),
            ServerSignal::Unknown(fixture)
        );
    }

    #[test]
    fn local_error_record_matches_server_shape() {
        let rec = ErrorRecord::local("connection failed", true);
        let from_server = ErrorRecord::from_payload(rec.raw.clone());
        assert_eq!(from_server, rec);
    }
}
