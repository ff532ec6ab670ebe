//! Probe behavior against live mock backends, exercised through the
//! check routes.

use axum::http::StatusCode;
use serde_json::Value;

mod common;

use common::{
    client, spawn_app, start_mock_backend, start_mock_mysql, start_mock_redis, test_settings,
};
use healthgate::checker::CheckSettings;

fn mysql_settings() -> CheckSettings {
    CheckSettings {
        mysql_username: Some("monitor".to_string()),
        mysql_password: Some("password".to_string()),
        ..test_settings()
    }
}

#[tokio::test]
async fn test_tcp_accepting_port_passes() {
    let app = spawn_app(test_settings(), false).await;
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let res = client()
        .get(app.url(&format!("/tcp/widget/{port}")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.text().await.unwrap().starts_with("Connected in"));

    app.shutdown.trigger();
}

#[tokio::test]
async fn test_tcp_refused_port_fails() {
    let app = spawn_app(test_settings(), false).await;
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let res = client()
        .get(app.url(&format!("/tcp/widget/{port}")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(res.text().await.unwrap().starts_with("Unexpected error"));

    app.shutdown.trigger();
}

#[tokio::test]
async fn test_mysql_handshake_ok() {
    let app = spawn_app(mysql_settings(), false).await;
    let mysql = start_mock_mysql(true).await;

    let res = client()
        .get(app.url(&format!("/mysql/widget/{}", mysql.port())))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "MySQL connect response: OK");

    app.shutdown.trigger();
}

#[tokio::test]
async fn test_mysql_access_denied() {
    let app = spawn_app(mysql_settings(), false).await;
    let mysql = start_mock_mysql(false).await;

    let res = client()
        .get(app.url(&format!("/mysql/widget/{}", mysql.port())))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        res.text().await.unwrap(),
        "MySQL sez error 1045 (28000): Access denied for user"
    );

    app.shutdown.trigger();
}

#[tokio::test]
async fn test_mysql_without_credentials() {
    let app = spawn_app(test_settings(), false).await;

    let res = client()
        .get(app.url("/mysql/widget/1"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        res.text().await.unwrap(),
        "No MySQL username or password configured"
    );

    app.shutdown.trigger();
}

#[tokio::test]
async fn test_mysql_refused_port_fails() {
    let app = spawn_app(mysql_settings(), false).await;
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let res = client()
        .get(app.url(&format!("/mysql/widget/{port}")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(res.text().await.unwrap().starts_with("Unexpected error"));

    app.shutdown.trigger();
}

#[tokio::test]
async fn test_redis_ping_pong() {
    let app = spawn_app(test_settings(), false).await;
    let redis = start_mock_redis("+PONG\r\n", "").await;

    let res = client()
        .get(app.url(&format!("/redis/widget/{}", redis.port())))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "Sent PING, got back +PONG");

    app.shutdown.trigger();
}

#[tokio::test]
async fn test_redis_unexpected_ping_reply() {
    let app = spawn_app(test_settings(), false).await;
    let redis = start_mock_redis("-ERR unknown command\r\n", "").await;

    let res = client()
        .get(app.url(&format!("/redis/widget/{}", redis.port())))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        res.text().await.unwrap(),
        "Sent PING, got back -ERR unknown command"
    );

    app.shutdown.trigger();
}

#[tokio::test]
async fn test_sentinel_uses_the_ping_probe() {
    let app = spawn_app(test_settings(), false).await;
    let redis = start_mock_redis("+PONG\r\n", "").await;

    let res = client()
        .get(app.url(&format!("/sentinel/widget/{}", redis.port())))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    app.shutdown.trigger();
}

#[tokio::test]
async fn test_redis_info_returns_the_parsed_map() {
    let app = spawn_app(test_settings(), false).await;
    let info = "# Server\r\nredis_version:6.2.5\r\nconnected_clients:1\r\n# Keyspace\r\ndb0:keys=1\r\n";
    let redis = start_mock_redis("", info).await;

    let res = client()
        .get(app.url(&format!("/redis-info/widget/{}", redis.port())))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let map: Value = res.json().await.unwrap();
    assert_eq!(map["redis_version"], "6.2.5");
    assert_eq!(map["connected_clients"], "1");

    app.shutdown.trigger();
}

#[tokio::test]
async fn test_redis_info_without_version_fails() {
    let app = spawn_app(test_settings(), false).await;
    let redis = start_mock_redis("", "connected_clients:1\r\n").await;

    let res = client()
        .get(app.url(&format!("/redis-info/widget/{}", redis.port())))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(res.text().await.unwrap().starts_with("Sent INFO, got back"));

    app.shutdown.trigger();
}

#[tokio::test]
async fn test_redis_info_match_path() {
    let app = spawn_app(test_settings(), false).await;
    let info = "redis_version:6.2.5\r\nrole:master\r\n# Keyspace\r\n";
    let redis = start_mock_redis("", info).await;

    let res = client()
        .get(app.url(&format!("/redis-info/widget/{}/match?role=master", redis.port())))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.text().await.unwrap(),
        "Match found: field role, value master"
    );

    let res = client()
        .get(app.url(&format!("/redis-info/widget/{}/match?role=slave", redis.port())))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.text().await.unwrap(), "No matching field found");

    app.shutdown.trigger();
}

#[tokio::test]
async fn test_redis_info_match_without_query_returns_the_map() {
    let app = spawn_app(test_settings(), false).await;
    let info = "redis_version:6.2.5\r\nrole:master\r\n# Keyspace\r\n";
    let redis = start_mock_redis("", info).await;

    let res = client()
        .get(app.url(&format!("/redis-info/widget/{}/match", redis.port())))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let map: Value = res.json().await.unwrap();
    assert_eq!(map["redis_version"], "6.2.5");
    assert_eq!(map["role"], "master");

    app.shutdown.trigger();
}

#[tokio::test]
async fn test_sentinel_info_publishes_the_master_address() {
    let app = spawn_app(test_settings(), false).await;
    let info = "redis_version:3.0.6\r\nmaster0:name=mymaster,status=ok,address=10.1.2.3:6379,slaves=2,sentinels=3\r\n";
    let redis = start_mock_redis("", info).await;

    let res = client()
        .get(app.url(&format!("/sentinel-info/widget/{}", redis.port())))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let map: Value = res.json().await.unwrap();
    assert_eq!(map["redis_master"], "10.1.2.3:6379");

    app.shutdown.trigger();
}

fn csv_row(pxname: &str, status: &str) -> String {
    let filler = ["0"; 15].join(",");
    format!("{pxname},BACKEND,{filler},{status}")
}

#[tokio::test]
async fn test_haproxy_backend_up() {
    let app = spawn_app(test_settings(), false).await;
    let stats = format!(
        "# pxname,svname\n{}\n{}\n",
        csv_row("other", "UP"),
        csv_row("widget", "UP")
    );
    let (backend, _) = start_mock_backend(200, stats).await;

    let res = client()
        .get(app.url(&format!("/haproxy/widget/{}", backend.port())))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "widget is UP");

    app.shutdown.trigger();
}

#[tokio::test]
async fn test_haproxy_backend_down() {
    let app = spawn_app(test_settings(), false).await;
    let (backend, _) = start_mock_backend(200, csv_row("widget", "DOWN")).await;

    let res = client()
        .get(app.url(&format!("/haproxy/widget/{}", backend.port())))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.text().await.unwrap(), "widget is DOWN");

    app.shutdown.trigger();
}

#[tokio::test]
async fn test_haproxy_backend_missing() {
    let app = spawn_app(test_settings(), false).await;
    let (backend, _) = start_mock_backend(200, csv_row("other", "UP")).await;

    let res = client()
        .get(app.url(&format!("/haproxy/widget/{}", backend.port())))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.text().await.unwrap(), "widget is not found");

    app.shutdown.trigger();
}

#[tokio::test]
async fn test_haproxy_stats_error_passes_through() {
    let app = spawn_app(test_settings(), false).await;
    let (backend, _) = start_mock_backend(503, "stats unavailable").await;

    let res = client()
        .get(app.url(&format!("/haproxy/widget/{}", backend.port())))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(res.text().await.unwrap(), "stats unavailable");

    app.shutdown.trigger();
}
