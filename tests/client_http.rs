use alepe_mcp::config::Settings;
use alepe_mcp::http::AlepeClient;
use alepe_mcp::types::{Filters, HealthStatus, Payload};
use httpmock::{Method::GET, MockServer};
use std::time::Duration;

fn client_for(base_url: &str, overrides: &[(&str, &str)]) -> AlepeClient {
    let base = base_url.to_string();
    let overrides: Vec<(String, String)> = overrides
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let settings = Settings::from_lookup(move |key| {
        if key == "BASE_URL" {
            return Some(base.clone());
        }
        overrides
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    })
    .unwrap();
    AlepeClient::new(settings).unwrap()
}

#[tokio::test]
async fn json_success_counts_records() {
    let server = MockServer::start_async().await;
    let body = serde_json::json!([
        {"nome": "Deputada A", "partido": "PSB"},
        {"nome": "Deputado B", "partido": "PSB"},
        {"nome": "Deputado C", "partido": "PSB"}
    ]);
    let m = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/parlamentares")
                .query_param("formato", "json")
                .query_param("partido", "PSB")
                .header("accept", "application/json")
                .header_exists("user-agent");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(body);
        })
        .await;

    let client = client_for(&server.base_url(), &[]);
    let filters = Filters::from([("partido".to_string(), "PSB".to_string())]);
    let env = client.request("parlamentares", "json", filters).await;

    assert!(env.is_success(), "{:?}", env);
    let data = env.data().unwrap();
    let meta = env.metadata().unwrap();
    assert_eq!(meta.total_records, data.record_count());
    assert_eq!(meta.total_records, 3);
    assert_eq!(meta.endpoint, "parlamentares");
    assert_eq!(meta.filters.get("partido").map(String::as_str), Some("PSB"));

    let json = serde_json::to_value(&env).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["metadata"]["total_registros"], 3);
    assert_eq!(json["metadata"]["formato"], "json");
    assert!(json.get("error").is_none());
    assert_eq!(m.hits_async().await, 1);
}

#[tokio::test]
async fn csv_success_counts_lines_minus_header() {
    let server = MockServer::start_async().await;
    let mut body = String::from("matricula;nome;cargo\n");
    for i in 0..10 {
        body.push_str(&format!("{};Servidor {};Analista\n", 1000 + i, i));
    }
    let m = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/servidores")
                .query_param("formato", "csv")
                .header("accept", "text/csv, text/plain;q=0.9");
            then.status(200)
                .header("content-type", "text/csv; charset=utf-8")
                .body(body.clone());
        })
        .await;

    let client = client_for(&server.base_url(), &[]);
    let env = client.request("servidores", "csv", Filters::new()).await;

    assert!(env.is_success(), "{:?}", env);
    assert_eq!(env.metadata().unwrap().total_records, 10);
    assert!(matches!(env.data(), Some(Payload::Text(t)) if t.starts_with("matricula;")));
    assert_eq!(m.hits_async().await, 1);
}

#[tokio::test]
async fn client_error_is_not_retried() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(GET).path("/contratos");
            then.status(404)
                .header("content-type", "application/json")
                .json_body(serde_json::json!({"mensagem": "recurso não encontrado"}));
        })
        .await;

    let client = client_for(&server.base_url(), &[("RETRY_DELAY", "0")]);
    let env = client.request("contratos", "json", Filters::new()).await;

    let err = env.error().unwrap();
    assert_eq!(err.kind, "remote_client_error");
    assert_eq!(err.status, Some(404));
    assert_eq!(err.attempts, Some(1));
    assert!(err.message.contains("recurso não encontrado"), "{}", err.message);
    assert_eq!(m.hits_async().await, 1);
    assert!(env.data().is_none() && env.metadata().is_none());
}

#[tokio::test]
async fn server_error_exhausts_retry_budget() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(GET).path("/licitacoes");
            then.status(500).body("");
        })
        .await;

    let client = client_for(
        &server.base_url(),
        &[("MAX_RETRIES", "2"), ("RETRY_DELAY", "0")],
    );
    let env = client.request("licitacoes", "json", Filters::new()).await;

    let err = env.error().unwrap();
    assert_eq!(err.kind, "remote_server_error");
    assert_eq!(err.status, Some(500));
    assert_eq!(err.attempts, Some(3));
    assert_eq!(m.hits_async().await, 3);
    // Retries spend permits too.
    assert_eq!(client.rate_limiter().admitted_in_window(), 3);
}

#[tokio::test]
async fn unreachable_host_is_a_network_error() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let client = client_for(
        &format!("http://127.0.0.1:{}", port),
        &[("MAX_RETRIES", "1"), ("RETRY_DELAY", "0")],
    );
    let env = client.request("cargos", "json", Filters::new()).await;

    let err = env.error().unwrap();
    assert_eq!(err.kind, "network_error");
    assert_eq!(err.attempts, Some(2));
    assert_eq!(err.status, None);
}

#[tokio::test]
async fn slow_response_times_out() {
    let server = MockServer::start_async().await;
    let _m = server
        .mock_async(|when, then| {
            when.method(GET).path("/lotacoes");
            then.status(200)
                .delay(Duration::from_secs(3))
                .json_body(serde_json::json!([]));
        })
        .await;

    let client = client_for(
        &server.base_url(),
        &[("TIMEOUT", "0.2"), ("MAX_RETRIES", "0")],
    );
    let env = client.request("lotacoes", "json", Filters::new()).await;

    let err = env.error().unwrap();
    assert_eq!(err.kind, "timeout");
    assert_eq!(err.attempts, Some(1));
}

#[tokio::test]
async fn timed_out_attempts_are_retried() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(GET).path("/lotacoes");
            then.status(200)
                .delay(Duration::from_secs(3))
                .json_body(serde_json::json!([]));
        })
        .await;

    let client = client_for(
        &server.base_url(),
        &[("TIMEOUT", "0.2"), ("MAX_RETRIES", "1"), ("RETRY_DELAY", "0")],
    );
    let env = client.request("lotacoes", "json", Filters::new()).await;

    let err = env.error().unwrap();
    assert_eq!(err.kind, "timeout");
    assert_eq!(err.attempts, Some(2));
    assert_eq!(m.hits_async().await, 2);
}

#[tokio::test]
async fn client_error_after_server_errors_reports_all_attempts() {
    let server = MockServer::start_async().await;
    let mut unavailable = server
        .mock_async(|when, then| {
            when.method(GET).path("/contratos");
            then.status(503).body("");
        })
        .await;

    let client = client_for(
        &server.base_url(),
        &[("MAX_RETRIES", "3"), ("RETRY_DELAY", "1")],
    );
    // Swap the 503 for a 404 while the client backs off after attempt 1.
    let swap = async {
        while unavailable.hits_async().await < 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        unavailable.delete_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/contratos");
                then.status(404).body("");
            })
            .await
    };
    let (env, not_found) = tokio::join!(client.request("contratos", "json", Filters::new()), swap);

    let err = env.error().unwrap();
    assert_eq!(err.kind, "remote_client_error");
    assert_eq!(err.status, Some(404));
    assert_eq!(err.attempts, Some(2));
    assert_eq!(not_found.hits_async().await, 1);
}

#[tokio::test]
async fn body_not_matching_format_is_a_decode_error() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(GET).path("/remuneracao");
            then.status(200)
                .header("content-type", "text/html")
                .body("<html>manutenção</html>");
        })
        .await;

    let client = client_for(&server.base_url(), &[("RETRY_DELAY", "0")]);
    let env = client.request("remuneracao", "json", Filters::new()).await;

    assert_eq!(env.error().unwrap().kind, "decode_error");
    assert_eq!(m.hits_async().await, 1);
}

#[tokio::test]
async fn bad_format_or_endpoint_fails_before_any_request() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.any_request();
            then.status(200).json_body(serde_json::json!([]));
        })
        .await;

    let client = client_for(&server.base_url(), &[]);
    let env = client.request("parlamentares", "xml", Filters::new()).await;
    assert_eq!(env.error().unwrap().kind, "validation_error");
    let env = client.request("deputados", "json", Filters::new()).await;
    assert_eq!(env.error().unwrap().kind, "validation_error");

    assert_eq!(m.hits_async().await, 0);
    assert_eq!(client.rate_limiter().admitted_in_window(), 0);
}

#[tokio::test]
async fn concurrent_requests_share_one_client() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(GET).path("/cargos");
            then.status(200).json_body(serde_json::json!([{"cargo": "Assessor"}]));
        })
        .await;

    let client = client_for(&server.base_url(), &[("RATE_LIMIT_REQUESTS", "100")]);
    let calls = (0..8).map(|_| client.request("cargos", "json", Filters::new()));
    let results = futures::future::join_all(calls).await;

    assert!(results.iter().all(|env| env.is_success()));
    assert_eq!(m.hits_async().await, 8);
    assert_eq!(client.rate_limiter().admitted_in_window(), 8);
}

#[tokio::test]
async fn health_check_reports_latency_and_status() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/parlamentares")
                .query_param("formato", "json");
            then.status(200).json_body(serde_json::json!([]));
        })
        .await;

    let client = client_for(&server.base_url(), &[]);
    for _ in 0..2 {
        let report = client.health_check().await;
        assert_eq!(report.status, HealthStatus::Healthy);
        assert!(report.reachable);
        assert!(report.latency_seconds >= 0.0);
        assert_eq!(report.http_status, Some(200));
        assert_eq!(report.available_endpoints.len(), 7);
    }
    assert_eq!(m.hits_async().await, 2);
}

#[tokio::test]
async fn health_check_fails_fast_when_budget_is_spent() {
    let server = MockServer::start_async().await;
    let cargos = server
        .mock_async(|when, then| {
            when.method(GET).path("/cargos");
            then.status(200).json_body(serde_json::json!([]));
        })
        .await;
    let parlamentares = server
        .mock_async(|when, then| {
            when.method(GET).path("/parlamentares");
            then.status(200).json_body(serde_json::json!([]));
        })
        .await;

    let client = client_for(&server.base_url(), &[("RATE_LIMIT_REQUESTS", "1")]);
    assert!(client.request("cargos", "json", Filters::new()).await.is_success());

    let report = tokio::time::timeout(Duration::from_secs(3), client.health_check())
        .await
        .expect("health check must not wait for the rate limiter");
    assert_eq!(report.status, HealthStatus::Unhealthy);
    assert!(!report.reachable);
    assert!(report.error.as_deref().unwrap().contains("rate limited"));
    assert_eq!(cargos.hits_async().await, 1);
    assert_eq!(parlamentares.hits_async().await, 0);
    assert_eq!(client.rate_limiter().admitted_in_window(), 1);
}

#[tokio::test]
async fn health_check_makes_a_single_attempt() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(GET).path("/parlamentares");
            then.status(503).body("");
        })
        .await;

    let client = client_for(
        &server.base_url(),
        &[("MAX_RETRIES", "3"), ("RETRY_DELAY", "0")],
    );
    let report = client.health_check().await;

    assert!(!report.is_healthy());
    assert!(report.reachable);
    assert_eq!(report.http_status, Some(503));
    assert!(report.error.is_some());
    assert_eq!(m.hits_async().await, 1);
}
