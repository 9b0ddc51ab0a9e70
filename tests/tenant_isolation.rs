//! Tenant isolation: users in different tenants never see each other, even
//! when they pick the same nickname and channel name.

mod common;

use common::server::TestServer;
use common::client::TestClient;

#[tokio::test]
async fn same_nick_in_different_tenants_does_not_collide() {
    let server = TestServer::spawn("root").await;

    let mut acme_alice = TestClient::connect(server.addr, "alice").await.unwrap();
    acme_alice.register("acme").await.expect("acme alice registers");

    let mut globex_alice = TestClient::connect(server.addr, "alice").await.unwrap();
    globex_alice
        .register("globex")
        .await
        .expect("globex alice registers with the same nick");
}

#[tokio::test]
async fn channel_membership_does_not_cross_tenants() {
    let server = TestServer::spawn("root").await;

    let mut acme_alice = TestClient::connect(server.addr, "alice").await.unwrap();
    acme_alice.register("acme").await.unwrap();
    let mut globex_bob = TestClient::connect(server.addr, "bob").await.unwrap();
    globex_bob.register("globex").await.unwrap();

    acme_alice.join("#users").await.unwrap();
    acme_alice
        .recv_until(|r| r.is_numeric(366))
        .await
        .expect("alice sees her own JOIN numerics");

    globex_bob.join("#users").await.unwrap();
    let bob_names = globex_bob
        .recv_until(|r| r.is_numeric(366))
        .await
        .expect("bob sees his own JOIN numerics");

    // Bob's NAMES reply for #users in globex must not list alice, who is in acme.
    let names_line = bob_names
        .iter()
        .find(|r| r.is_numeric(353))
        .and_then(|r| r.trailing.clone())
        .unwrap_or_default();
    assert!(!names_line.contains("alice"));
    assert!(names_line.contains("bob"));
}

#[tokio::test]
async fn privmsg_does_not_cross_tenants_without_addressing() {
    let server = TestServer::spawn("root").await;

    let mut acme_alice = TestClient::connect(server.addr, "alice").await.unwrap();
    acme_alice.register("acme").await.unwrap();
    let mut globex_alice = TestClient::connect(server.addr, "alice").await.unwrap();
    globex_alice.register("globex").await.unwrap();

    acme_alice.join("#users").await.unwrap();
    acme_alice.recv_until(|r| r.is_numeric(366)).await.unwrap();
    globex_alice.join("#users").await.unwrap();
    globex_alice.recv_until(|r| r.is_numeric(366)).await.unwrap();

    acme_alice.privmsg("#users", "hello from acme").await.unwrap();

    // Globex's alice, in a same-named but distinct channel, must never
    // receive acme's broadcast.
    let got_bleed = globex_alice
        .recv_timeout(std::time::Duration::from_millis(200))
        .await
        .map(|r| r.command == "PRIVMSG")
        .unwrap_or(false);
    assert!(!got_bleed, "PRIVMSG leaked across tenant boundary");
}
