mod common;

use jojq_core::listener;

#[tokio::test]
async fn captures_plain_json_response() {
    let upstream = common::spawn_fixed_response_upstream(Box::leak(
        common::json_response(r#"{"hello":"world"}"#).into_boxed_slice(),
    ))
    .await;

    let ctx = common::test_ctx(common::test_config());

    let proxy_listener = listener::bind_tcp("127.0.0.1:0").await.unwrap();
    let proxy_addr = proxy_listener.local_addr().unwrap();

    let accept_ctx = ctx.clone();
    tokio::spawn(async move {
        let (stream, peer) = listener::accept_stream(&proxy_listener).await.unwrap();
        jojq::net::acceptor::handle_connection(stream, peer, accept_ctx).await;
    });

    let request = format!(
        "GET http://{upstream}/data HTTP/1.1\r\nHost: {upstream}\r\nConnection: close\r\n\r\n"
    );
    let response = common::send_and_read(proxy_addr, request.as_bytes()).await;
    let response = String::from_utf8_lossy(&response);
    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains(r#"{"hello":"world"}"#));

    assert_eq!(ctx.captures.len(), 1);
    let record = ctx.captures.get(1).unwrap();
    assert_eq!(record.response.body, serde_json::json!({"hello": "world"}));
    assert_eq!(record.request.method, "GET");
}

#[tokio::test]
async fn upstream_connect_failure_yields_502() {
    let dead_upstream = common::unreachable_addr().await;
    let ctx = common::test_ctx(common::test_config());

    let proxy_listener = listener::bind_tcp("127.0.0.1:0").await.unwrap();
    let proxy_addr = proxy_listener.local_addr().unwrap();

    let accept_ctx = ctx.clone();
    tokio::spawn(async move {
        let (stream, peer) = listener::accept_stream(&proxy_listener).await.unwrap();
        jojq::net::acceptor::handle_connection(stream, peer, accept_ctx).await;
    });

    let request = format!(
        "GET http://{dead_upstream}/ HTTP/1.1\r\nHost: {dead_upstream}\r\nConnection: close\r\n\r\n"
    );
    let response = common::send_and_read(proxy_addr, request.as_bytes()).await;
    let response = String::from_utf8_lossy(&response);
    assert!(response.starts_with("HTTP/1.1 502"));
    assert_eq!(ctx.captures.len(), 0);
}

#[tokio::test]
async fn oversize_response_is_forwarded_but_not_captured() {
    let big_body = "a".repeat(256);
    let json_body = format!(r#"{{"pad":"{big_body}"}}"#);
    let upstream = common::spawn_fixed_response_upstream(Box::leak(
        common::json_response(&json_body).into_boxed_slice(),
    ))
    .await;

    let mut config = common::test_config();
    config.max_body_bytes = 16;
    let ctx = common::test_ctx(config);

    let proxy_listener = listener::bind_tcp("127.0.0.1:0").await.unwrap();
    let proxy_addr = proxy_listener.local_addr().unwrap();

    let accept_ctx = ctx.clone();
    tokio::spawn(async move {
        let (stream, peer) = listener::accept_stream(&proxy_listener).await.unwrap();
        jojq::net::acceptor::handle_connection(stream, peer, accept_ctx).await;
    });

    let request = format!(
        "GET http://{upstream}/data HTTP/1.1\r\nHost: {upstream}\r\nConnection: close\r\n\r\n"
    );
    let response = common::send_and_read(proxy_addr, request.as_bytes()).await;
    let response = String::from_utf8_lossy(&response);
    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains(&big_body));

    assert_eq!(ctx.captures.len(), 0);
}
