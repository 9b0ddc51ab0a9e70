//! JOIN reply numerics: topic (or its absence), NAMES, and end-of-names.

mod common;

use common::client::TestClient;
use common::server::TestServer;

#[tokio::test]
async fn join_new_schema_channel_yields_synthesized_topic_and_names() {
    let server = TestServer::spawn("root").await;

    let mut alice = TestClient::connect(server.addr, "alice").await.unwrap();
    alice.register("acme").await.unwrap();

    alice.join("#users").await.unwrap();
    let replies = alice.recv_until(|r| r.is_numeric(366)).await.unwrap();

    assert!(replies.iter().any(|r| r.command == "JOIN"), "missing own JOIN echo");
    // A freshly created channel has no topic, but the mocked aggregate call
    // succeeds, so the schema's record metadata is synthesized as the topic
    // (RPL_TOPIC, 332) rather than falling back to RPL_NOTOPIC (331).
    let topic = replies
        .iter()
        .find(|r| r.is_numeric(332))
        .expect("expected RPL_TOPIC (332) synthesized from schema metadata");
    assert_eq!(topic.params, vec!["alice".to_string(), "#users".to_string()]);
    assert!(topic.trailing.as_deref().unwrap_or("").contains("0 records"));
    let names = replies
        .iter()
        .find(|r| r.is_numeric(353))
        .expect("missing RPL_NAMREPLY (353)");
    assert!(names.trailing.as_deref().unwrap_or("").contains("alice"));
    assert!(replies.iter().any(|r| r.is_numeric(366)), "missing RPL_ENDOFNAMES (366)");
}

#[tokio::test]
async fn second_joiner_sees_first_joiners_op_prefix() {
    // "read" access only grants operator to the first member of a channel;
    // later joiners at the same access level hold no role.
    let server = TestServer::spawn("read").await;

    let mut alice = TestClient::connect(server.addr, "alice").await.unwrap();
    alice.register("acme").await.unwrap();
    alice.join("#users").await.unwrap();
    alice.recv_until(|r| r.is_numeric(366)).await.unwrap();

    let mut bob = TestClient::connect(server.addr, "bob").await.unwrap();
    bob.register("acme").await.unwrap();
    bob.join("#users").await.unwrap();
    let replies = bob.recv_until(|r| r.is_numeric(366)).await.unwrap();

    let names = replies
        .iter()
        .find(|r| r.is_numeric(353))
        .expect("missing RPL_NAMREPLY");
    let line = names.trailing.clone().unwrap_or_default();
    assert!(line.contains("@alice"), "first joiner should hold @ as channel operator: {line}");
    assert!(line.contains("bob"));
    assert!(!line.contains("@bob"), "second joiner at read access should hold no role: {line}");
}
