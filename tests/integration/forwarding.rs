//! Forwarding behavior: serving-peer selection, local fallbacks,
//! transport failures, and the streaming body scan.

use bytes::Bytes;
use serde_json::Value;

use crest_core::node::epoch_secs;

use crate::{dead_peer, light_client_config, start_gateway, Upstream};

async fn get_json(url: &str) -> (reqwest::StatusCode, Value) {
    let resp = reqwest::get(url).await.unwrap();
    let status = resp.status();
    (status, resp.json().await.unwrap())
}

#[tokio::test]
async fn forwards_to_serving_peer_and_preserves_response() {
    let upstream = Upstream::start("a").await.unwrap();
    let gateway = start_gateway(light_client_config(), vec![upstream.peer("127.0.0.1")])
        .await
        .unwrap();

    let resp = reqwest::get(gateway.api("requestType=getBlock&height=12"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers().get("x-served-by").unwrap(), "a");

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["upstream"], "a");
    // The original query string travels verbatim.
    assert_eq!(body["query"], "requestType=getBlock&height=12");
    assert_eq!(upstream.hits(), 1);
}

#[tokio::test]
async fn full_node_forwards_only_while_downloading() {
    let upstream = Upstream::start("a").await.unwrap();
    let gateway = start_gateway(
        crest_core::config::CrestConfig::default(),
        vec![upstream.peer("127.0.0.1")],
    )
    .await
    .unwrap();

    // Chain current: answered locally, no remote call.
    let (_, body) = get_json(&gateway.api("requestType=getBlock&height=12")).await;
    assert_eq!(body["errorCode"], 23);
    assert_eq!(upstream.hits(), 0);

    // Catching up: the same request goes remote.
    gateway.state.node.set_downloading(true);
    let (_, body) = get_json(&gateway.api("requestType=getBlock&height=12")).await;
    assert_eq!(body["upstream"], "a");
    assert_eq!(upstream.hits(), 1);
}

#[tokio::test]
async fn status_requests_always_answered_locally() {
    let upstream = Upstream::start("a").await.unwrap();
    let gateway = start_gateway(light_client_config(), vec![upstream.peer("127.0.0.1")])
        .await
        .unwrap();

    for request_type in ["getBlockchainStatus", "getState"] {
        let (status, body) = get_json(&gateway.api(&format!("requestType={request_type}"))).await;
        assert_eq!(status, 200);
        assert_eq!(body["application"], "Crest", "{request_type}");
    }
    assert_eq!(upstream.hits(), 0);
}

#[tokio::test]
async fn full_client_and_tagged_requests_never_forwarded() {
    let upstream = Upstream::start("a").await.unwrap();
    let gateway = start_gateway(light_client_config(), vec![upstream.peer("127.0.0.1")])
        .await
        .unwrap();

    // Full-client-only.
    let (_, body) = get_json(&gateway.api("requestType=getForging")).await;
    assert!(body["generators"].is_array());

    // Debug tag.
    let (_, body) = get_json(&gateway.api("requestType=dumpState")).await;
    assert_eq!(body["knownPeers"], 1);

    // Network tag.
    let (_, body) = get_json(&gateway.api("requestType=getPeers")).await;
    assert!(body["peers"].is_array());

    assert_eq!(upstream.hits(), 0);
}

#[tokio::test]
async fn light_client_without_peers_gets_dedicated_error() {
    let gateway = start_gateway(light_client_config(), vec![]).await.unwrap();

    let (status, body) = get_json(&gateway.api("requestType=getBlock")).await;
    assert_eq!(status, 200);
    assert_eq!(body["errorCode"], 21);
}

#[tokio::test]
async fn full_node_without_peers_falls_back_locally() {
    let gateway = start_gateway(crest_core::config::CrestConfig::default(), vec![])
        .await
        .unwrap();
    gateway.state.node.set_downloading(true);

    let (_, body) = get_json(&gateway.api("requestType=getBlock")).await;
    assert_eq!(body["errorCode"], 23);
}

#[tokio::test]
async fn transport_failure_blacklists_peer() {
    let peer = dead_peer("127.0.0.1");
    let host = peer.host.clone();
    let gateway = start_gateway(light_client_config(), vec![peer]).await.unwrap();

    let (status, body) = get_json(&gateway.api("requestType=getBlock")).await;
    assert_eq!(status, 502);
    assert_eq!(body["errorCode"], 22);

    assert!(gateway.state.selector.is_blacklisted(&host, epoch_secs()));
    // The snapshot containing the failed host is gone.
    assert!(gateway.state.selector.serving_set().is_none());

    // With the only peer blacklisted, the next request finds nothing.
    let (_, body) = get_json(&gateway.api("requestType=getBlock")).await;
    assert_eq!(body["errorCode"], 21);
}

#[tokio::test]
async fn exceeding_idle_timeout_counts_as_transport_failure() {
    let upstream = Upstream::start("slowpoke").await.unwrap();
    let mut peer = upstream.peer("127.0.0.1");
    // 6s hint minus the 5s margin bounds the exchange to 1s; the
    // upstream takes 3s when asked to be slow.
    peer.api_idle_timeout_ms = 6_000;
    let host = peer.host.clone();
    let gateway = start_gateway(light_client_config(), vec![peer]).await.unwrap();

    let (status, body) = get_json(&gateway.api("requestType=getBlock&slow=1")).await;
    assert_eq!(status, 502);
    assert_eq!(body["errorCode"], 22);
    assert!(gateway.state.selector.is_blacklisted(&host, epoch_secs()));
}

#[tokio::test]
async fn secret_in_body_aborts_forward_mid_stream() {
    let upstream = Upstream::start("a").await.unwrap();
    let gateway = start_gateway(light_client_config(), vec![upstream.peer("127.0.0.1")])
        .await
        .unwrap();

    let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
        Ok(Bytes::from_static(b"deadline=1440&amount=5")),
        Ok(Bytes::from_static(b"&secretPhrase=correct horse battery")),
        Ok(Bytes::from_static(b"&broadcast=true")),
    ];
    let resp = reqwest::Client::new()
        .post(gateway.api("requestType=broadcastTransaction"))
        .header("content-type", "application/x-www-form-urlencoded")
        .body(reqwest::Body::wrap_stream(futures::stream::iter(chunks)))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["errorCode"], 18);

    // The upstream never saw the body complete.
    assert_eq!(upstream.completed_bodies(), 0);
}

#[tokio::test]
async fn shared_key_in_body_maps_to_its_own_error() {
    let upstream = Upstream::start("a").await.unwrap();
    let gateway = start_gateway(light_client_config(), vec![upstream.peer("127.0.0.1")])
        .await
        .unwrap();

    let resp = reqwest::Client::new()
        .post(gateway.api("requestType=broadcastTransaction"))
        .header("content-type", "application/x-www-form-urlencoded")
        .body("sharedKey=deadbeef")
        .send()
        .await
        .unwrap();

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["errorCode"], 20);
    assert_eq!(upstream.completed_bodies(), 0);
}

#[tokio::test]
async fn clean_body_reaches_the_peer_whole() {
    let upstream = Upstream::start("a").await.unwrap();
    let gateway = start_gateway(light_client_config(), vec![upstream.peer("127.0.0.1")])
        .await
        .unwrap();

    let resp = reqwest::Client::new()
        .post(gateway.api("requestType=broadcastTransaction"))
        .header("content-type", "application/x-www-form-urlencoded")
        .body("transactionBytes=00112233&deadline=1440")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["upstream"], "a");
    assert_eq!(upstream.completed_bodies(), 1);
}

#[tokio::test]
async fn multipart_bodies_are_not_scanned() {
    let upstream = Upstream::start("a").await.unwrap();
    let gateway = start_gateway(light_client_config(), vec![upstream.peer("127.0.0.1")])
        .await
        .unwrap();

    // A file upload whose content happens to contain a marker; scanning
    // it would be a false positive.
    let body = "--b\r\ncontent-disposition: form-data; name=\"file\"\r\n\r\nsecretPhrase=not a real one\r\n--b--\r\n";
    let resp = reqwest::Client::new()
        .post(gateway.api("requestType=broadcastTransaction"))
        .header("content-type", "multipart/form-data; boundary=b")
        .body(body)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["upstream"], "a");
    assert_eq!(upstream.completed_bodies(), 1);
}

#[tokio::test]
async fn forced_server_url_bypasses_peer_selection() {
    let upstream = Upstream::start("forced").await.unwrap();
    let mut config = light_client_config();
    config.proxy.forced_server_url = format!("http://{}/api", upstream.addr);

    // No peers at all; the forced URL is the only route out.
    let gateway = start_gateway(config, vec![]).await.unwrap();

    let (status, body) = get_json(&gateway.api("requestType=getBlock")).await;
    assert_eq!(status, 200);
    assert_eq!(body["upstream"], "forced");
    assert_eq!(upstream.hits(), 1);
}
