mod common;

use jojq_core::listener;

/// Drives 150 requests through a proxy configured with a 100-record
/// buffer and checks the buffer holds exactly the last 100 ordinals.
#[tokio::test]
async fn buffer_holds_only_the_most_recent_max_captures() {
    let upstream = common::spawn_fixed_response_upstream(Box::leak(
        common::json_response(r#"{"n":1}"#).into_boxed_slice(),
    ))
    .await;

    let mut config = common::test_config();
    config.max_captures = 100;
    let ctx = common::test_ctx(config);

    for _ in 0..150 {
        let proxy_listener = listener::bind_tcp("127.0.0.1:0").await.unwrap();
        let proxy_addr = proxy_listener.local_addr().unwrap();

        let accept_ctx = ctx.clone();
        let accept_task = tokio::spawn(async move {
            let (stream, peer) = listener::accept_stream(&proxy_listener).await.unwrap();
            jojq::net::acceptor::handle_connection(stream, peer, accept_ctx).await;
        });

        let request = format!(
            "GET http://{upstream}/data HTTP/1.1\r\nHost: {upstream}\r\nConnection: close\r\n\r\n"
        );
        let _ = common::send_and_read(proxy_addr, request.as_bytes()).await;
        accept_task.await.unwrap();
    }

    assert_eq!(ctx.captures.len(), 100);
    let records = ctx.captures.list();
    let first_ordinal = records.first().unwrap().ordinal;
    let last_ordinal = records.last().unwrap().ordinal;
    assert_eq!(first_ordinal, 1);
    assert_eq!(last_ordinal, 100);
}
