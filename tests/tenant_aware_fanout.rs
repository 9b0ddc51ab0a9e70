//! `tenant-aware` capability: lifecycle notifications and cross-tenant
//! `#channel@tenant`-addressed PRIVMSG fan-out.

mod common;

use common::client::TestClient;
use common::server::TestServer;

#[tokio::test]
async fn tenantjoin_fires_for_a_brand_new_tenant_once_capability_enabled() {
    let server = TestServer::spawn("root").await;

    let mut watcher = TestClient::connect(server.addr, "watcher").await.unwrap();
    watcher.register("acme").await.unwrap();
    watcher.cap_req("tenant-aware").await.unwrap();
    watcher.recv_until(|r| r.command == "CAP").await.unwrap();
    // CAP REQ ack also triggers a TENANTS snapshot line for tenants that
    // already existed (acme, since watcher just registered into it).
    watcher.recv_until(|r| r.command == "TENANTS").await.unwrap();

    let mut newcomer = TestClient::connect(server.addr, "newcomer").await.unwrap();
    newcomer.register("globex").await.unwrap();

    let replies = watcher
        .recv_until(|r| r.command == "TENANTJOIN")
        .await
        .expect("watcher should observe the new tenant's TENANTJOIN");
    let tenantjoin = replies.last().unwrap();
    assert_eq!(tenantjoin.trailing.as_deref(), None);
    assert_eq!(tenantjoin.params, vec!["globex".to_string()]);
}

#[tokio::test]
async fn explicit_tenant_addressed_privmsg_crosses_tenants() {
    let server = TestServer::spawn("root").await;

    let mut acme_alice = TestClient::connect(server.addr, "alice").await.unwrap();
    acme_alice.register("acme").await.unwrap();
    acme_alice.join("#users").await.unwrap();
    acme_alice.recv_until(|r| r.is_numeric(366)).await.unwrap();

    let mut globex_bob = TestClient::connect(server.addr, "bob").await.unwrap();
    globex_bob.register("globex").await.unwrap();
    globex_bob.cap_req("tenant-aware").await.unwrap();
    globex_bob.recv_until(|r| r.command == "CAP").await.unwrap();
    globex_bob.recv_until(|r| r.command == "TENANTS").await.unwrap();

    acme_alice
        .privmsg("#users@acme", "cross-tenant ping")
        .await
        .unwrap();

    let replies = globex_bob
        .recv_until(|r| r.command == "PRIVMSG")
        .await
        .expect("tenant-aware watcher should see the tagged fan-out");
    let privmsg = replies.last().unwrap();
    assert_eq!(privmsg.params, vec!["#users@acme".to_string()]);
    assert_eq!(privmsg.trailing.as_deref(), Some("cross-tenant ping"));
}
