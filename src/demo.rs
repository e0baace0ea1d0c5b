//! Built-in demo application served by the `canopy` binary.
//!
//! ```text
//! root                 /            loader, meta, links, error boundary
//! ├── routes/_index    / (index)    loader
//! ├── routes/posts     /posts       loader, headers
//! │   └── routes/posts.$id  /posts/:id   loader (404 for unknown ids)
//! ├── routes/login     /login       action (redirect + cookie, 400 on empty name)
//! ├── routes/old       /old         loader throws a redirect to /posts
//! └── routes/boom      /boom        loader throws an error
//! ```

use std::collections::BTreeMap;

use axum::body::Bytes;
use axum::http::{header, HeaderMap, StatusCode};
use futures_util::stream::{self, StreamExt};

use crate::args::{LinkDescriptor, MetaDescriptor};
use crate::build::{DocumentContext, EntryModule, ServerBuild};
use crate::codec::{ErrorValue, Value};
use crate::response::{redirect, DataResponse, Returned, Thrown};
use crate::routing::{RouteModule, RouteRecord};

const POSTS: &[(&str, &str)] = &[
    ("hello", "Hello, canopy"),
    ("routing", "Nested routing in practice"),
];

/// The demo route tree.
pub fn routes() -> Vec<RouteRecord> {
    vec![
        RouteRecord::new("root").path("").module(
            RouteModule::new()
                .loader(|_| async {
                    Ok(Returned::Data(Value::object([("app", Value::from("canopy"))])))
                })
                .meta(|args| {
                    let app = args.data().get("app").and_then(Value::as_str).unwrap_or("app");
                    vec![MetaDescriptor::from([("title".to_string(), app.to_string())])]
                })
                .links(|_| vec![LinkDescriptor::stylesheet("/styles/app.css")])
                .error_boundary(),
        ),
        RouteRecord::new("routes/_index").parent("root").index().module(
            RouteModule::new().loader(|_| async { Ok(Returned::Data(Value::from("Welcome"))) }),
        ),
        RouteRecord::new("routes/posts").parent("root").path("posts").module(
            RouteModule::new()
                .loader(|_| async {
                    let titles = POSTS.iter().map(|(_, title)| Value::from(*title)).collect::<Vec<_>>();
                    Ok(Returned::Response(
                        DataResponse::json(titles).header(header::CACHE_CONTROL, "max-age=60"),
                    ))
                })
                .headers(|args| {
                    let mut headers = HeaderMap::new();
                    if let Some(value) = args.loader_headers().get(header::CACHE_CONTROL) {
                        headers.insert(header::CACHE_CONTROL, value.clone());
                    }
                    headers
                }),
        ),
        RouteRecord::new("routes/posts.$id").parent("routes/posts").path(":id").module(
            RouteModule::new()
                .loader(|args| {
                    let id = args.params().get("id").cloned().unwrap_or_default();
                    async move {
                        match POSTS.iter().find(|(slug, _)| *slug == id) {
                            Some((slug, title)) => Ok(Returned::Data(Value::object([
                                ("slug", Value::from(*slug)),
                                ("title", Value::from(*title)),
                            ]))),
                            None => Err(Thrown::Response(
                                DataResponse::new(StatusCode::NOT_FOUND).with_body(format!("No post \"{}\"", id)),
                            )),
                        }
                    }
                })
                .meta(|args| {
                    let title = args.data().get("title").and_then(Value::as_str).unwrap_or("Post");
                    vec![MetaDescriptor::from([("title".to_string(), title.to_string())])]
                }),
        ),
        RouteRecord::new("routes/login").parent("root").path("login").module(
            RouteModule::new().action(|args| {
                let name = args.request().form_value("name").unwrap_or_default();
                async move {
                    if name.trim().is_empty() {
                        return Ok(Returned::Response(
                            DataResponse::new(StatusCode::BAD_REQUEST).with_body(Value::object([(
                                "error",
                                Value::from("Name is required"),
                            )])),
                        ));
                    }
                    Ok(Returned::Response(
                        redirect("/").header(header::SET_COOKIE, &format!("user={}; Path=/", name)),
                    ))
                }
            }),
        ),
        RouteRecord::new("routes/old").parent("root").path("old").module(
            RouteModule::new().loader(|_| async { Err(Thrown::Response(redirect("/posts"))) }),
        ),
        RouteRecord::new("routes/boom").parent("root").path("boom").module(
            RouteModule::new()
                .loader(|_| async { Err(Thrown::Error(ErrorValue::new("The demo route failed"))) }),
        ),
    ]
}

/// Entry module rendering plain HTML around the hydration payload.
pub fn entry() -> EntryModule {
    EntryModule::new()
        .render(|cx| async move { Ok(render_document(&cx)) })
        .render_to_stream(|value| {
            let chunk = serde_json::to_vec(&value.to_plain_json())
                .map(Bytes::from)
                .map_err(std::io::Error::from);
            stream::iter([chunk]).boxed()
        })
        .handle_error(|error, cx| {
            tracing::error!(
                url = %cx.request.url(),
                error = %error.message(),
                "Demo route failed"
            );
        })
}

pub fn build() -> ServerBuild {
    ServerBuild::new(routes(), entry())
}

fn render_document(cx: &DocumentContext) -> String {
    let mut head = String::new();
    for meta in &cx.meta {
        if let Some(title) = meta.get("title") {
            head.push_str(&format!("<title>{}</title>", escape_text(title)));
        }
    }
    for link in &cx.links {
        head.push_str(&format!(
            "<link rel=\"{}\" href=\"{}\">",
            escape_text(&link.rel),
            escape_text(&link.href)
        ));
    }

    let mut body = String::new();
    for m in &cx.matches {
        match &m.error {
            Some(error) => body.push_str(&format!(
                "<section data-route=\"{}\" data-error>{}</section>",
                escape_text(&m.id),
                escape_text(&describe(error))
            )),
            None => body.push_str(&format!(
                "<section data-route=\"{}\">{}</section>",
                escape_text(&m.id),
                escape_text(&m.data.to_plain_json().to_string())
            )),
        }
    }
    if let Some(handoff) = &cx.server_handoff {
        body.push_str(&format!("<script>window.__remixContext = {};</script>", handoff));
    }

    format!("<!DOCTYPE html><html><head>{}</head><body>{}</body></html>", head, body)
}

fn describe(error: &Value) -> String {
    match error {
        Value::Error(e) => e.message().to_string(),
        other => {
            let status = other.get("status").and_then(Value::as_f64).unwrap_or(500.0);
            let data = other.get("data").map(Value::to_plain_json).unwrap_or_default();
            format!("{} {}", status as u16, data)
        }
    }
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::RouteTree;

    #[test]
    fn test_demo_tree_is_valid() {
        let tree = RouteTree::new(routes()).unwrap();
        let ids: Vec<_> = tree.matches("/posts/hello").unwrap().iter().map(|m| m.id().to_string()).collect();
        assert_eq!(ids, ["root", "routes/posts", "routes/posts.$id"]);
    }

    #[test]
    fn test_render_escapes_route_text() {
        let cx = DocumentContext {
            url: url::Url::parse("http://x/").unwrap(),
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            server_handoff: None,
            state: Default::default(),
            matches: vec![],
            meta: vec![BTreeMap::from([("title".to_string(), "<x>".to_string())])],
            links: vec![],
            future: Default::default(),
            is_spa_mode: false,
        };
        assert!(render_document(&cx).contains("<title>&lt;x&gt;</title>"));
    }
}
