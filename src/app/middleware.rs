//! Middleware entry
//!
//! The single decision point in front of the drivers: match the request
//! path against the registry, bind the scalar map from the query string
//! and (when declared) the request body, and pick the WebSocket or HTTP
//! driver based on the upgrade headers. Unmatched paths are yielded back
//! to the host so the next handler in its chain can run.

use std::sync::Arc;

use crate::common::{Scalars, BODY_KEY};
use crate::registry::{Registry, Route};

/// Parsed head of one HTTP request, as handed in by the host.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: String,
    /// Request target: absolute path plus optional query string.
    pub target: String,
    /// Header name/value pairs; names are lowercased by the host parser.
    pub headers: Vec<(String, String)>,
}

impl RequestHead {
    /// The absolute path, without the query string.
    pub fn path(&self) -> &str {
        match self.target.find('?') {
            Some(q) => &self.target[..q],
            None => &self.target,
        }
    }

    /// The raw query string, without the leading `?`.
    pub fn query(&self) -> &str {
        match self.target.find('?') {
            Some(q) => &self.target[q + 1..],
            None => "",
        }
    }

    /// First header value for `name` (lowercase).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn content_length(&self) -> usize {
        self.header("content-length")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    /// WebSocket upgrade: `Connection: Upgrade` and `Upgrade: websocket`
    /// must both be present (token scan, case-insensitive values).
    pub fn is_websocket_upgrade(&self) -> bool {
        let connection_upgrade = self
            .header("connection")
            .map(|v| {
                v.split(',')
                    .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
            })
            .unwrap_or(false);
        let upgrade_websocket = self
            .header("upgrade")
            .map(|v| v.trim().eq_ignore_ascii_case("websocket"))
            .unwrap_or(false);
        connection_upgrade && upgrade_websocket
    }

    /// Scalar map from the query string: each key at most once, first
    /// value wins, URL-decoded, names case-preserving.
    pub fn query_scalars(&self) -> Scalars {
        let mut scalars = Scalars::new();
        for (key, value) in url::form_urlencoded::parse(self.query().as_bytes()) {
            scalars.entry(key.into_owned()).or_insert_with(|| value.into_owned());
        }
        scalars
    }
}

/// How a matched (or unmatched) request should proceed.
pub enum Dispatch {
    /// Drive as a bidirectional WebSocket connection.
    WebSocket(Arc<Route>),
    /// Drive as a chunked plain-HTTP response.
    Http(Arc<Route>),
    /// Not ours: yield to the next handler in the host chain.
    NotMatched,
}

/// Stateless dispatch decision over a shared registry.
pub struct Middleware {
    registry: Arc<Registry>,
}

impl Middleware {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Classify one request. Exact path match only.
    pub fn classify(&self, head: &RequestHead) -> Dispatch {
        let Some(route) = self.registry.route(head.path()) else {
            return Dispatch::NotMatched;
        };
        if head.is_websocket_upgrade() {
            Dispatch::WebSocket(Arc::clone(route))
        } else {
            Dispatch::Http(Arc::clone(route))
        }
    }

    /// Build the scalar map for one request: query values plus, when the
    /// route declares a body parameter, the body text under `$body`.
    pub fn bind_scalars(head: &RequestHead, body: Option<String>) -> Scalars {
        let mut scalars = head.query_scalars();
        if let Some(body) = body {
            scalars.insert(BODY_KEY.to_string(), body);
        }
        scalars
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow;
    use crate::registry::{ControllerDescriptor, MethodDescriptor};

    #[derive(Default)]
    struct Echo;

    fn middleware() -> Middleware {
        let registry = Registry::builder()
            .controller(
                ControllerDescriptor::new("echo", Echo::default).route(
                    MethodDescriptor::new("go")
                        .text("msg")
                        .handler(|_, call| Ok(flow::once(call.text("msg")))),
                ),
            )
            .build()
            .unwrap();
        Middleware::new(Arc::new(registry))
    }

    fn head(target: &str, headers: &[(&str, &str)]) -> RequestHead {
        RequestHead {
            method: "GET".into(),
            target: target.into(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_exact_match_routes_http() {
        let mw = middleware();
        assert!(matches!(
            mw.classify(&head("/echo/go?msg=hi", &[])),
            Dispatch::Http(_)
        ));
        assert!(matches!(
            mw.classify(&head("/echo/go/extra", &[])),
            Dispatch::NotMatched
        ));
        assert!(matches!(
            mw.classify(&head("/other", &[])),
            Dispatch::NotMatched
        ));
    }

    #[test]
    fn test_upgrade_detection() {
        let mw = middleware();
        let upgraded = head(
            "/echo/go",
            &[("connection", "keep-alive, Upgrade"), ("upgrade", "WebSocket")],
        );
        assert!(matches!(mw.classify(&upgraded), Dispatch::WebSocket(_)));

        let plain = head("/echo/go", &[("connection", "keep-alive")]);
        assert!(matches!(mw.classify(&plain), Dispatch::Http(_)));
    }

    #[test]
    fn test_query_first_value_wins_and_decodes() {
        let h = head("/echo/go?msg=hello%20world&msg=second&Case=kept", &[]);
        let scalars = h.query_scalars();
        assert_eq!(scalars.get("msg").unwrap(), "hello world");
        assert_eq!(scalars.get("Case").unwrap(), "kept");
        assert!(scalars.get("case").is_none());
    }

    #[test]
    fn test_body_lands_under_body_key() {
        let h = head("/echo/go?msg=x", &[]);
        let scalars = Middleware::bind_scalars(&h, Some("{\"a\":1}".into()));
        assert_eq!(scalars.get("msg").unwrap(), "x");
        assert_eq!(scalars.get(BODY_KEY).unwrap(), "{\"a\":1}");
    }
}
