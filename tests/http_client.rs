use std::time::Duration;

use axum::Router;
use axum::routing::get;
use playvault::client::{ApiClient, ClientError, Connectivity};
use playvault::config::ClientConfig;

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });
    format!("http://{addr}")
}

fn client(base_url: &str, timeout_secs: u64) -> ApiClient {
    let mut config = ClientConfig::new(base_url);
    config.request_timeout_secs = timeout_secs;
    ApiClient::new(&config, Connectivity::default()).expect("build client")
}

#[tokio::test]
async fn silent_server_times_out() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let holder = tokio::spawn(async move {
        let mut open = Vec::new();
        loop {
            if let Ok((socket, _)) = listener.accept().await {
                open.push(socket);
            }
        }
    });

    let api = client(&format!("http://{addr}"), 1);
    let result = tokio::time::timeout(Duration::from_secs(10), api.get_playground("h1"))
        .await
        .expect("request must not hang");
    assert!(matches!(result, Err(ClientError::Timeout)), "{result:?}");

    holder.abort();
}

#[tokio::test]
async fn malformed_envelope_is_a_decode_error() {
    let router = Router::new()
        .route(
            "/api/playgrounds/{hash}",
            get(|| async { r#"{"data": {"unexpected": 1}, "error": null}"# }),
        )
        .route(
            "/api/playgrounds/{hash}/commits",
            get(|| async { "not json at all" }),
        );
    let base_url = serve(router).await;
    let api = client(&base_url, 5);

    let detail = api.get_playground("h1").await;
    assert!(matches!(detail, Err(ClientError::Decode(_))), "{detail:?}");

    let commits = api.list_commits("h1").await;
    assert!(matches!(commits, Err(ClientError::Decode(_))), "{commits:?}");
}

#[tokio::test]
async fn empty_envelope_is_a_decode_error() {
    let router = Router::new().route(
        "/api/playgrounds/{hash}",
        get(|| async { r#"{"data": null, "error": null}"# }),
    );
    let base_url = serve(router).await;
    let api = client(&base_url, 5);

    assert!(matches!(
        api.get_playground("h1").await,
        Err(ClientError::Decode(_))
    ));
}
