//! Single-fetch endpoint tests against a live server.

use axum::http::{header, StatusCode};

use canopy::codec::{self, Decoded, Entry, PayloadKind, Value};

mod common;

async fn fetch_routes(res: reqwest::Response) -> (StatusCode, reqwest::header::HeaderMap, Decoded) {
    let status = res.status();
    let headers = res.headers().clone();
    let body = res.bytes().await.unwrap();
    let decoded = codec::decode_response(status, &headers, &body, PayloadKind::Loaders).unwrap();
    (status, headers, decoded)
}

fn routes(decoded: Decoded) -> std::collections::BTreeMap<String, Entry> {
    match decoded {
        Decoded::Routes(routes) => routes,
        other => panic!("expected route entries, got {:?}", other),
    }
}

#[tokio::test]
async fn test_loads_every_matched_route() {
    let server = common::start_server(common::test_config()).await;
    let res = common::http_client()
        .get(server.url("/page.data"))
        .send()
        .await
        .expect("server unreachable");

    let (status, headers, decoded) = fetch_routes(res).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .contains("v=1"));
    let routes = routes(decoded);
    assert_eq!(routes["root"], Entry::Data(Value::from("ROOT")));
    assert_eq!(routes["routes/page"], Entry::Data(Value::from("PAGE")));
}

#[tokio::test]
async fn test_root_data_addresses_index() {
    let server = common::start_server(common::test_config()).await;
    let res = common::http_client()
        .get(server.url("/_root.data"))
        .send()
        .await
        .unwrap();
    let (status, _, decoded) = fetch_routes(res).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(routes(decoded).keys().collect::<Vec<_>>(), ["root"]);
}

#[tokio::test]
async fn test_redirect_short_circuits_descendants() {
    let server = common::start_server(common::test_config()).await;
    let res = common::http_client()
        .get(server.url("/away/child.data"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert!(res.headers().get(header::LOCATION).is_none());
    assert_eq!(res.headers()[codec::X_REMIX_REDIRECT], "/page");
    assert_eq!(res.headers()[codec::X_REMIX_STATUS], "302");
    assert_eq!(res.headers()[codec::X_REMIX_REVALIDATE], "yes");
    assert_eq!(server.calls.count("loader:routes/away.child"), 0);
}

#[tokio::test]
async fn test_routes_param_scopes_loaders() {
    let server = common::start_server(common::test_config()).await;
    let res = common::http_client()
        .get(server.url("/page.data?_routes=routes/page"))
        .send()
        .await
        .unwrap();

    let (_, _, decoded) = fetch_routes(res).await;
    let routes = routes(decoded);
    assert_eq!(routes.len(), 1);
    assert!(routes.contains_key("routes/page"));
    assert_eq!(server.calls.count("loader:root"), 0);
    assert_eq!(server.calls.count("loader:routes/page"), 1);
}

#[tokio::test]
async fn test_headers_function_runs_on_get_only() {
    let server = common::start_server(common::test_config()).await;
    let client = common::http_client();

    let get = client.get(server.url("/headers.data")).send().await.unwrap();
    assert_eq!(get.status(), StatusCode::OK);
    assert_eq!(get.headers()["x-headers-fn"], "yes");
    assert_eq!(get.headers()[header::CACHE_CONTROL], "max-age=300");

    let post = client
        .post(server.url("/headers.data"))
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body("")
        .send()
        .await
        .unwrap();
    assert_eq!(post.status(), StatusCode::OK);
    assert!(post.headers().get("x-headers-fn").is_none());
    assert_eq!(post.headers()["x-action"], "1");

    let status = post.status();
    let headers = post.headers().clone();
    let body = post.bytes().await.unwrap();
    let decoded = codec::decode_response(status, &headers, &body, PayloadKind::Action).unwrap();
    assert!(matches!(decoded, Decoded::Action(Entry::Data(Value::String(ref s))) if s == "SAVED"));
}

#[tokio::test]
async fn test_thrown_response_keeps_its_headers() {
    let server = common::start_server(common::test_config()).await;
    let res = common::http_client()
        .get(server.url("/headers.data?error"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(res.headers()["x-loader-error"], "true");
    assert!(res.headers().get("x-headers-fn").is_none());

    let (_, _, decoded) = fetch_routes(res).await;
    let routes = routes(decoded);
    assert!(matches!(routes["routes/headers"], Entry::Error(_)));
    assert_eq!(routes["root"], Entry::Data(Value::from("ROOT")));
}

#[tokio::test]
async fn test_mutation_runs_action_only() {
    let server = common::start_server(common::test_config()).await;
    let res = common::http_client()
        .post(server.url("/form.data"))
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body("name=ada")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(server.calls.all(), ["action:routes/form"]);
}

#[tokio::test]
async fn test_thrown_response_is_reported_at_thrower() {
    let server = common::start_server(common::test_config()).await;
    let res = common::http_client()
        .get(server.url("/missing.data"))
        .send()
        .await
        .unwrap();

    let (status, _, decoded) = fetch_routes(res).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let routes = routes(decoded);
    assert_eq!(routes["root"], Entry::Data(Value::from("ROOT")));
    let error = routes["routes/missing"].error().expect("error entry");
    assert_eq!(error.get("status"), Some(&Value::Number(404.0)));
    assert_eq!(error.get("data"), Some(&Value::from("no such thing")));
}

#[tokio::test]
async fn test_production_errors_are_sanitized() {
    let server = common::start_server(common::test_config()).await;
    let res = common::http_client()
        .get(server.url("/boom.data"))
        .send()
        .await
        .unwrap();

    let (status, _, decoded) = fetch_routes(res).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    match routes(decoded).remove("routes/boom") {
        Some(Entry::Error(Value::Error(error))) => {
            assert_eq!(error.message(), "Unexpected Server Error");
        }
        other => panic!("expected an error entry, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unmatched_url_is_404_at_root() {
    let server = common::start_server(common::test_config()).await;
    let res = common::http_client()
        .get(server.url("/nowhere/at/all.data"))
        .send()
        .await
        .unwrap();

    let (status, _, decoded) = fetch_routes(res).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let routes = routes(decoded);
    assert_eq!(routes.len(), 1);
    assert!(routes["root"].error().is_some());
    assert!(server.calls.all().is_empty());
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let server = common::start_server(common::test_config()).await;
    let res = common::http_client()
        .get(server.url("/page.data"))
        .header("x-request-id", "req-123")
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["x-request-id"], "req-123");
}
