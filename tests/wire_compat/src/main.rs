fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use peerdrop_protocol::messages::{
        AnswerForward, AnswerRequest, IceCandidateForward, IceCandidateRequest, OfferForward,
        OfferRequest, PeersUpdate, Welcome,
    };
    use peerdrop_protocol::{Message, MessageType};

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

    /// Deserializes a fixture into a Rust type, re-serializes it, and compares
    /// the JSON values (key order independent).
    fn roundtrip_test<T>(name: &str) -> T
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
            "roundtrip mismatch for {name}:\n  wire: {fixture}\n  Rust: {reserialized}"
        );
        parsed
    }

    #[test]
    fn fixture_message_envelope() {
        let fixture = load_fixture("message_envelope.json");
        let msg: Message = serde_json::from_value(fixture.clone()).unwrap();
        assert_eq!(msg.msg_type, MessageType::PeersUpdate);

        let update: PeersUpdate = msg.parse_payload().unwrap().unwrap();
        assert_eq!(update.peers.len(), 2);

        let reserialized: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(fixture, reserialized);
    }

    #[test]
    fn fixture_offer_request() {
        let offer: OfferRequest = roundtrip_test("offer_request.json");
        assert_eq!(offer.sender, "3f1c9a2e");
        assert_eq!(offer.receiver.as_deref(), Some("b07d44c1"));
        assert_eq!(offer.sdp["type"], "offer");
    }

    #[test]
    fn fixture_offer_forward() {
        let offer: OfferForward = roundtrip_test("offer_forward.json");
        assert_eq!(offer.sender, "3f1c9a2e");
    }

    #[test]
    fn fixture_answer_request() {
        let answer: AnswerRequest = roundtrip_test("answer_request.json");
        assert_eq!(answer.receiver.as_deref(), Some("3f1c9a2e"));
    }

    #[test]
    fn fixture_answer_forward() {
        let answer: AnswerForward = roundtrip_test("answer_forward.json");
        assert_eq!(answer.sender, "b07d44c1");
        assert_eq!(answer.sdp["type"], "answer");
    }

    #[test]
    fn fixture_ice_candidate_request() {
        let req: IceCandidateRequest = roundtrip_test("ice_candidate_request.json");
        assert_eq!(req.candidate["sdpMLineIndex"], 0);
        assert_eq!(req.candidate["usernameFragment"], "Xk2p");
    }

    #[test]
    fn fixture_ice_candidate_forward() {
        let fwd: IceCandidateForward = roundtrip_test("ice_candidate_forward.json");
        assert_eq!(fwd.sender, "3f1c9a2e");
    }

    #[test]
    fn fixture_peers_update() {
        let update: PeersUpdate = roundtrip_test("peers_update.json");
        assert_eq!(update.peers, vec!["3f1c9a2e", "b07d44c1"]);
    }

    #[test]
    fn fixture_welcome() {
        let welcome: Welcome = roundtrip_test("welcome.json");
        assert_eq!(welcome.peer_id, "3f1c9a2e");
    }

    #[test]
    fn message_types_use_wire_names() {
        let names = [
            (MessageType::Welcome, "welcome"),
            (MessageType::PeersUpdate, "peers-update"),
            (MessageType::Offer, "offer"),
            (MessageType::Answer, "answer"),
            (MessageType::IceCandidate, "ice-candidate"),
        ];
        for (msg_type, wire) in names {
            assert_eq!(serde_json::to_value(&msg_type).unwrap(), wire);
        }
    }

    #[test]
    fn candidate_request_without_receiver_parses() {
        // Early candidates from browser clients arrive with no receiver at all.
        let json = r#"{"candidate":{"candidate":"candidate:1 1 udp 1 10.0.0.1 9 typ host"}}"#;
        let req: IceCandidateRequest = serde_json::from_str(json).unwrap();
        assert!(req.receiver.is_none());
    }
}
