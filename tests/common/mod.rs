//! Shared utilities for integration tests: a recording test application
//! and a server running it on an ephemeral port.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use futures_util::stream::{self, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use canopy::build::{EntryModule, ServerBuild};
use canopy::codec::{ErrorValue, Value};
use canopy::config::{ServerConfig, ServerMode};
use canopy::response::{redirect, DataResponse, Returned, Thrown};
use canopy::routing::{RouteModule, RouteRecord};
use canopy::{HttpServer, Shutdown};

/// Records every route function call, in order.
#[derive(Debug, Default)]
pub struct Calls(Mutex<Vec<String>>);

impl Calls {
    pub fn record(&self, call: impl Into<String>) {
        self.0.lock().unwrap().push(call.into());
    }

    pub fn all(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|c| *c == call).count()
    }
}

fn loader_returning(calls: &Arc<Calls>, id: &'static str, data: &'static str) -> RouteModule {
    let calls = calls.clone();
    RouteModule::new().loader(move |_| {
        calls.record(format!("loader:{}", id));
        async move { Ok(Returned::Data(Value::from(data))) }
    })
}

/// ```text
/// root                          loader "ROOT"
/// ├── routes/page   /page       loader "PAGE"
/// ├── routes/away   /away       loader throws redirect /page (with cookie)
/// │   └── routes/away.child  /away/child   loader
/// ├── routes/form   /form       loader "FORM", action "ACTED"
/// ├── routes/reject /reject     loader, action returns 400
/// ├── routes/explode /explode   loader, action throws an error
/// ├── routes/headers /headers   loader + action with headers, headers fn,
///                               loader throws a 400 with headers on `?error`
/// ├── routes/fine   /fine       loader, action echoing `revalidate`, shouldRevalidate
///                               reading it back from the action result
/// ├── routes/slow   /slow       loader tagged by `?from`, action sleeping 300ms
/// ├── routes/missing /missing   loader throws 404
/// ├── routes/boom   /boom       loader throws an error
/// └── routes/client /client     loader + client loader
/// ```
pub fn test_build(calls: &Arc<Calls>) -> ServerBuild {
    let action_calls = calls.clone();
    let child_calls = calls.clone();
    let reject_calls = calls.clone();
    let explode_calls = calls.clone();
    let client_calls = calls.clone();
    let fine_calls = calls.clone();
    let slow_loader_calls = calls.clone();
    let slow_action_calls = calls.clone();

    let routes = vec![
        RouteRecord::new("root")
            .path("")
            .module(loader_returning(calls, "root", "ROOT").error_boundary()),
        RouteRecord::new("routes/page")
            .parent("root")
            .path("page")
            .module(loader_returning(calls, "routes/page", "PAGE")),
        RouteRecord::new("routes/away").parent("root").path("away").module(
            RouteModule::new().loader(|_| async {
                Err(Thrown::Response(
                    redirect("/page").header(header::SET_COOKIE, "seen=1; Path=/"),
                ))
            }),
        ),
        RouteRecord::new("routes/away.child").parent("routes/away").path("child").module(
            RouteModule::new().loader(move |_| {
                child_calls.record("loader:routes/away.child");
                async { Ok(Returned::Data(Value::from("CHILD"))) }
            }),
        ),
        RouteRecord::new("routes/form").parent("root").path("form").module(
            loader_returning(calls, "routes/form", "FORM").action(move |args| {
                action_calls.record("action:routes/form");
                let name = args.request().form_value("name").unwrap_or_default();
                async move { Ok(Returned::Data(Value::from(format!("ACTED {}", name)))) }
            }),
        ),
        RouteRecord::new("routes/reject").parent("root").path("reject").module(
            loader_returning(calls, "routes/reject", "REJECT").action(move |_| {
                reject_calls.record("action:routes/reject");
                async {
                    Ok(Returned::Response(
                        DataResponse::new(StatusCode::BAD_REQUEST).with_body("invalid"),
                    ))
                }
            }),
        ),
        RouteRecord::new("routes/explode").parent("root").path("explode").module(
            loader_returning(calls, "routes/explode", "EXPLODE").action(move |_| {
                explode_calls.record("action:routes/explode");
                async { Err(Thrown::Error(ErrorValue::new("action exploded"))) }
            }),
        ),
        RouteRecord::new("routes/headers").parent("root").path("headers").module(
            RouteModule::new()
                .loader(|args| {
                    let error = args.request().has_search_param("error");
                    async move {
                        if error {
                            return Err(Thrown::Response(
                                DataResponse::new(StatusCode::BAD_REQUEST)
                                    .header(header::HeaderName::from_static("x-loader-error"), "true"),
                            ));
                        }
                        Ok(Returned::Response(
                            DataResponse::json("LOADED").header(header::CACHE_CONTROL, "max-age=300"),
                        ))
                    }
                })
                .action(|_| async {
                    Ok(Returned::Response(
                        DataResponse::json("SAVED").header(header::HeaderName::from_static("x-action"), "1"),
                    ))
                })
                .headers(|args| {
                    let mut headers = HeaderMap::new();
                    headers.insert("x-headers-fn", HeaderValue::from_static("yes"));
                    if let Some(value) = args.loader_headers().get(header::CACHE_CONTROL) {
                        headers.insert(header::CACHE_CONTROL, value.clone());
                    }
                    headers
                }),
        ),
        RouteRecord::new("routes/fine").parent("root").path("fine").module(
            loader_returning(calls, "routes/fine", "FINE")
                .action(move |args| {
                    fine_calls.record("action:routes/fine");
                    let revalidate = args.request().form_value("revalidate").as_deref() == Some("yes");
                    async move { Ok(Returned::Data(Value::object([("revalidate", Value::Bool(revalidate))]))) }
                })
                .should_revalidate(|args| {
                    args.action_result
                        .as_ref()
                        .and_then(|result| result.get("revalidate"))
                        .and_then(Value::as_bool)
                        .unwrap_or(args.default_should_revalidate)
                }),
        ),
        RouteRecord::new("routes/slow").parent("root").path("slow").module(
            RouteModule::new()
                .loader(move |args| {
                    let from = args
                        .request()
                        .url()
                        .query_pairs()
                        .find(|(k, _)| k == "from")
                        .map(|(_, v)| v.into_owned())
                        .unwrap_or_default();
                    slow_loader_calls.record(format!("loader:routes/slow:{}", from));
                    async { Ok(Returned::Data(Value::from("SLOW"))) }
                })
                .action(move |_| {
                    let calls = slow_action_calls.clone();
                    calls.record("action:routes/slow:start");
                    async move {
                        tokio::time::sleep(Duration::from_millis(300)).await;
                        calls.record("action:routes/slow:done");
                        Ok(Returned::Data(Value::from("SLOWLY")))
                    }
                }),
        ),
        RouteRecord::new("routes/missing").parent("root").path("missing").module(
            RouteModule::new().loader(|_| async {
                Err(Thrown::Response(
                    DataResponse::new(StatusCode::NOT_FOUND).with_body("no such thing"),
                ))
            }),
        ),
        RouteRecord::new("routes/boom").parent("root").path("boom").module(
            RouteModule::new()
                .loader(|_| async { Err(Thrown::Error(ErrorValue::new("secret database failure"))) }),
        ),
        RouteRecord::new("routes/client").parent("root").path("client").module(
            loader_returning(calls, "routes/client", "SERVER").client_loader(move |args| {
                client_calls.record("clientLoader:routes/client");
                let server_loader = args.server_loader().clone();
                async move {
                    match server_loader.call().await? {
                        Returned::Data(Value::String(s)) => {
                            Ok(Returned::Data(Value::from(format!("CLIENT+{}", s))))
                        }
                        other => Ok(other),
                    }
                }
            }),
        ),
    ];

    let entry = EntryModule::new()
        .render(|cx| async move {
            let ids: Vec<String> = cx.matches.iter().map(|m| m.id.clone()).collect();
            Ok(format!(
                "<html><body data-matches=\"{}\"><script>{}</script></body></html>",
                ids.join(" "),
                cx.server_handoff.unwrap_or_default()
            ))
        })
        .render_to_stream(|value| {
            let text = value.to_plain_json().to_string();
            stream::iter([Ok(Bytes::from(text))]).boxed()
        });

    ServerBuild::new(routes, entry)
}

/// Config for a test server: ephemeral port, single fetch on.
pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.mode = ServerMode::Production;
    config.future.v3_single_fetch = true;
    config.timeouts.shutdown_grace_secs = 1;
    config
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub calls: Arc<Calls>,
    pub shutdown: Shutdown,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start the test application with `config` on an ephemeral port.
pub async fn start_server(config: ServerConfig) -> TestServer {
    let calls = Arc::new(Calls::default());
    let build = test_build(&calls).configured(&config);

    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let (_, config_updates) = mpsc::unbounded_channel();

    let server = HttpServer::new(config, build.into());
    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });

    TestServer {
        addr,
        calls,
        shutdown,
    }
}

/// A client that does not follow redirects.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .build()
        .unwrap()
}
