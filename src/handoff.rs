//! Server hand-off: the hydration payload inlined into a document.
//!
//! The string is JSON made safe for a `<script>` element. It is omitted
//! entirely when any route's top-level loader or action data is a server
//! component marker; those payloads are streamed separately.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value as Json};

use crate::codec::{self, CodecError, Value};
use crate::config::FutureConfig;

/// Router state the client needs to hydrate without refetching.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HydrationState {
    pub loader_data: BTreeMap<String, Value>,
    pub action_data: Option<BTreeMap<String, Value>>,
    pub errors: Option<BTreeMap<String, Value>>,
}

impl HydrationState {
    fn has_server_component(&self) -> bool {
        let in_map = |map: &BTreeMap<String, Value>| map.values().any(Value::is_server_component);
        in_map(&self.loader_data) || self.action_data.as_ref().is_some_and(in_map)
    }
}

#[derive(Debug, Clone)]
pub struct ServerHandoff<'a> {
    pub state: &'a HydrationState,
    pub critical_css: Option<&'a str>,
    pub url: &'a str,
    pub future: &'a FutureConfig,
    pub is_spa_mode: bool,
}

/// Serialize and escape the hand-off. `Ok(None)` when server component data
/// is present.
pub fn create_server_handoff_string(handoff: &ServerHandoff<'_>) -> Result<Option<String>, CodecError> {
    if handoff.state.has_server_component() {
        return Ok(None);
    }

    let mut state = Map::new();
    state.insert("loaderData".into(), encode_map(&handoff.state.loader_data)?);
    state.insert("actionData".into(), encode_optional(handoff.state.action_data.as_ref())?);
    state.insert("errors".into(), encode_optional(handoff.state.errors.as_ref())?);

    let mut payload = Map::new();
    payload.insert("state".into(), Json::Object(state));
    if let Some(css) = handoff.critical_css {
        payload.insert("criticalCss".into(), Json::String(css.to_string()));
    }
    payload.insert("url".into(), Json::String(handoff.url.to_string()));
    payload.insert("future".into(), serde_json::to_value(handoff.future)?);
    payload.insert("isSpaMode".into(), json!(handoff.is_spa_mode));

    let text = serde_json::to_string(&Json::Object(payload))?;
    Ok(Some(escape_html(&text)))
}

fn encode_map(map: &BTreeMap<String, Value>) -> Result<Json, CodecError> {
    let mut out = Map::new();
    for (id, value) in map {
        out.insert(id.clone(), codec::encode_value(value)?);
    }
    Ok(Json::Object(out))
}

fn encode_optional(map: Option<&BTreeMap<String, Value>>) -> Result<Json, CodecError> {
    map.map_or(Ok(Json::Null), encode_map)
}

/// Escape the characters that could end a `<script>` element or break a
/// JavaScript string literal.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("\\u0026"),
            '>' => out.push_str("\\u003e"),
            '<' => out.push_str("\\u003c"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html("</script><b>&\u{2028}"),
            "\\u003c/script\\u003e\\u003cb\\u003e\\u0026\\u2028"
        );
    }

    #[test]
    fn test_handoff_shape() {
        let mut state = HydrationState::default();
        state.loader_data.insert("root".into(), Value::from("<b>ROOT</b>"));
        let future = FutureConfig {
            v3_single_fetch: true,
            ..FutureConfig::default()
        };
        let text = create_server_handoff_string(&ServerHandoff {
            state: &state,
            critical_css: None,
            url: "/",
            future: &future,
            is_spa_mode: false,
        })
        .unwrap()
        .unwrap();

        assert!(!text.contains('<'));
        let parsed: Json = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["state"]["loaderData"]["root"], "<b>ROOT</b>");
        assert_eq!(parsed["state"]["actionData"], Json::Null);
        assert_eq!(parsed["future"]["v3_singleFetch"], true);
        assert_eq!(parsed["isSpaMode"], false);
        assert!(parsed.get("criticalCss").is_none());
    }

    #[test]
    fn test_server_component_data_omits_handoff() {
        let mut state = HydrationState::default();
        state
            .loader_data
            .insert("routes/rsc".into(), Value::ServerComponent("tree".into()));
        let future = FutureConfig::default();
        let handoff = ServerHandoff {
            state: &state,
            critical_css: Some("body{}"),
            url: "/rsc",
            future: &future,
            is_spa_mode: false,
        };
        assert_eq!(create_server_handoff_string(&handoff).unwrap(), None);
    }
}
