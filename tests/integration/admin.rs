//! Admin surface: proxy introspection and operator overrides.

use serde_json::{json, Value};

use crate::{light_client_config, start_gateway, Upstream};

async fn get_json(url: &str) -> Value {
    reqwest::get(url).await.unwrap().json().await.unwrap()
}

#[tokio::test]
async fn proxy_status_reflects_mode_and_serving_set() {
    let upstream = Upstream::start("a").await.unwrap();
    let gateway = start_gateway(light_client_config(), vec![upstream.peer("127.0.0.1")])
        .await
        .unwrap();

    let status = get_json(&gateway.admin("/proxy")).await;
    assert_eq!(status["light_client"], true);
    assert_eq!(status["active"], true);
    assert_eq!(status["serving_set"], json!([]));

    // One forwarded request publishes a serving set.
    reqwest::get(gateway.api("requestType=getBlock"))
        .await
        .unwrap();
    let status = get_json(&gateway.admin("/proxy")).await;
    assert_eq!(status["serving_set"], json!(["127.0.0.1"]));
    assert_eq!(status["main_peer_announced_address"], "127.0.0.1");
}

#[tokio::test]
async fn forced_peer_routes_every_request() {
    let upstream_a = Upstream::start("a").await.unwrap();
    let upstream_b = Upstream::start("b").await.unwrap();
    let gateway = start_gateway(
        light_client_config(),
        vec![upstream_a.peer("127.0.0.1"), upstream_b.peer("localhost")],
    )
    .await
    .unwrap();

    let resp: Value = reqwest::Client::new()
        .post(gateway.admin("/proxy/forced-peer"))
        .json(&json!({ "host": "localhost" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resp["host"], "localhost");

    for _ in 0..5 {
        let body = get_json(&gateway.api("requestType=getBlock")).await;
        assert_eq!(body["upstream"], "b");
    }
    assert_eq!(upstream_a.hits(), 0);
    assert_eq!(upstream_b.hits(), 5);

    let resp = reqwest::Client::new()
        .delete(gateway.admin("/proxy/forced-peer"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert!(gateway.state.selector.forced_peer().is_none());
}

#[tokio::test]
async fn forcing_an_unknown_peer_is_refused() {
    let gateway = start_gateway(light_client_config(), vec![]).await.unwrap();

    let resp = reqwest::Client::new()
        .post(gateway.admin("/proxy/forced-peer"))
        .json(&json!({ "host": "203.0.113.99" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn downloading_toggle_switches_proxy_mode() {
    let upstream = Upstream::start("a").await.unwrap();
    let gateway = start_gateway(
        crest_core::config::CrestConfig::default(),
        vec![upstream.peer("127.0.0.1")],
    )
    .await
    .unwrap();

    let resp: Value = reqwest::Client::new()
        .post(gateway.admin("/node/downloading"))
        .json(&json!({ "downloading": true }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resp["proxy_active"], true);

    let body = get_json(&gateway.api("requestType=getBlock")).await;
    assert_eq!(body["upstream"], "a");

    reqwest::Client::new()
        .post(gateway.admin("/node/downloading"))
        .json(&json!({ "downloading": false }))
        .send()
        .await
        .unwrap();

    let body = get_json(&gateway.api("requestType=getBlock")).await;
    assert_eq!(body["errorCode"], 23);
    assert_eq!(upstream.hits(), 1);
}

#[tokio::test]
async fn peer_listing_reports_health_and_blacklist() {
    let upstream = Upstream::start("a").await.unwrap();
    let gateway = start_gateway(light_client_config(), vec![upstream.peer("127.0.0.1")])
        .await
        .unwrap();

    let body = get_json(&gateway.admin("/peers")).await;
    let peers = body["peers"].as_array().unwrap();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0]["host"], "127.0.0.1");
    assert_eq!(peers[0]["connectable"], true);
    assert_eq!(peers[0]["blacklisted"], false);

    gateway
        .state
        .selector
        .blacklist_host("127.0.0.1", crest_core::node::epoch_secs());
    let body = get_json(&gateway.admin("/peers")).await;
    assert_eq!(body["peers"][0]["blacklisted"], true);
}
