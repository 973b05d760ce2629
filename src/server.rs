//! HTTP transport.
//!
//! Routes `POST /{service}/services/{endpoint}` to the dispatcher. Protocol
//! outcomes, faults included, are always `200 OK`; only requests that cannot
//! be parsed at all are rejected at the HTTP level.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use tracing::{debug, error, info, warn};

use crate::dispatch::Dispatcher;
use crate::envelope::Document;
use crate::error::{Result, SoapError};

/// Services the console talks to.
pub const SERVICES: [&str; 3] = ["ecs", "ias", "cas"];

const XML_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

/// Action named by a `SOAPAction` header value such as
/// `"urn:ecs.wsapi.broadon.com/ListETickets"`.
pub fn parse_soap_action(header_value: &str) -> Option<String> {
    let value = header_value.trim().trim_matches('"');
    let action = value.rsplit('/').next().unwrap_or(value).trim();
    if action.is_empty() {
        None
    } else {
        Some(action.to_string())
    }
}

/// Resolve the action from the header, falling back to the first `Body`
/// child with any `Request` suffix removed.
pub fn resolve_action(headers: &HeaderMap, body: &[u8]) -> Result<String> {
    if let Some(action) = headers
        .get("soapaction")
        .and_then(|v| v.to_str().ok())
        .and_then(parse_soap_action)
    {
        return Ok(action);
    }

    let document = Document::parse(body)?;
    let operation = document
        .operation()
        .ok_or_else(|| SoapError::Parse("no operation element in Body".to_string()))?;
    Ok(operation
        .strip_suffix("Request")
        .unwrap_or(operation)
        .to_string())
}

pub fn router(dispatcher: Arc<Dispatcher>, max_body_size: usize) -> Router {
    Router::new()
        .route("/{service}/services/{endpoint}", post(handle_soap))
        .layer(DefaultBodyLimit::max(max_body_size))
        .with_state(dispatcher)
}

async fn handle_soap(
    State(dispatcher): State<Arc<Dispatcher>>,
    Path((service, endpoint)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !SERVICES.contains(&service.as_str()) {
        debug!(service = %service, "Unknown service");
        return StatusCode::NOT_FOUND.into_response();
    }

    let action = match resolve_action(&headers, &body) {
        Ok(action) => action,
        Err(e) => {
            warn!(service = %service, error = %e, "Could not determine action");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    debug!(service = %service, endpoint = %endpoint, action = %action, "SOAP request");

    let result = tokio::task::spawn_blocking(move || dispatcher.handle(&service, &action, &body)).await;

    match result {
        Ok(Ok(xml)) => ([(header::CONTENT_TYPE, XML_CONTENT_TYPE)], xml).into_response(),
        Ok(Err(e @ SoapError::Parse(_))) => {
            warn!(error = %e, "Rejected unparseable request");
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
        Ok(Err(e)) => {
            error!(error = %e, "Failed to build response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(e) => {
            error!(error = %e, "Request task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Serve until `shutdown` resolves.
pub async fn run_server(
    addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    max_body_size: usize,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = router(dispatcher, max_body_size);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::ShopContext;
    use crate::envelope::tests::ECS_REQUEST;
    use crate::store::MemoryStore;
    use crate::ticket::tests::encoder;
    use axum::http::HeaderValue;

    fn dispatcher() -> Arc<Dispatcher> {
        Arc::new(Dispatcher::with_shop_actions(ShopContext {
            encoder: Arc::new(encoder()),
            store: Arc::new(MemoryStore::new()),
            whitelist: None,
            base_url: "shop.example.com".to_string(),
        }))
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_parse_soap_action() {
        assert_eq!(
            parse_soap_action("\"urn:ecs.wsapi.broadon.com/ListETickets\""),
            Some("ListETickets".to_string())
        );
        assert_eq!(parse_soap_action("  GetChallenge "), Some("GetChallenge".to_string()));
        assert_eq!(parse_soap_action("\"\""), None);
        assert_eq!(parse_soap_action("urn:ecs/"), None);
    }

    #[test]
    fn test_resolve_action_falls_back_to_body() {
        let headers = HeaderMap::new();
        assert_eq!(resolve_action(&headers, ECS_REQUEST.as_bytes()).unwrap(), "ListETickets");

        let body = br#"<Envelope><Body><GetChallengeRequest><Version>1</Version></GetChallengeRequest></Body></Envelope>"#;
        assert_eq!(resolve_action(&headers, body).unwrap(), "GetChallenge");

        let mut headers = HeaderMap::new();
        headers.insert("soapaction", HeaderValue::from_static("\"urn:ecs.wsapi.broadon.com/GetECConfig\""));
        assert_eq!(resolve_action(&headers, b"").unwrap(), "GetECConfig");
    }

    #[tokio::test]
    async fn test_handle_soap_success() {
        let response = handle_soap(
            State(dispatcher()),
            Path(("ecs".to_string(), "ECommerceSOAP".to_string())),
            HeaderMap::new(),
            Bytes::from_static(ECS_REQUEST.as_bytes()),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            XML_CONTENT_TYPE
        );
        let xml = body_text(response).await;
        assert!(xml.contains("<ListETicketsResponse xmlns=\"urn:ecs.wsapi.broadon.com\">"));
    }

    #[tokio::test]
    async fn test_handle_soap_fault_is_still_ok() {
        let mut headers = HeaderMap::new();
        headers.insert("soapaction", HeaderValue::from_static("urn:ecs.wsapi.broadon.com/Bogus"));
        let response = handle_soap(
            State(dispatcher()),
            Path(("ecs".to_string(), "ECommerceSOAP".to_string())),
            headers,
            Bytes::from_static(ECS_REQUEST.as_bytes()),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("<ErrorCode>1</ErrorCode>"));
    }

    #[tokio::test]
    async fn test_handle_soap_rejects_garbage() {
        let response = handle_soap(
            State(dispatcher()),
            Path(("ias".to_string(), "IdentityAuthenticationSOAP".to_string())),
            HeaderMap::new(),
            Bytes::from_static(b"<oops"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = handle_soap(
            State(dispatcher()),
            Path(("nus".to_string(), "NetUpdateSOAP".to_string())),
            HeaderMap::new(),
            Bytes::from_static(ECS_REQUEST.as_bytes()),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
