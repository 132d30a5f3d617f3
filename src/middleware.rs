use axum::extract::{ConnectInfo, Request};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use std::net::SocketAddr;
use tracing::info;
use uuid::Uuid;

/// Address of the caller, used as the default limiting key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddr(pub String);

#[derive(Debug, Clone, Copy)]
pub struct RequestId(pub Uuid);

/// Tags each request with an id and the caller address, and logs it.
pub async fn logging_middleware(mut request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = Uuid::new_v4();
    let client_addr = {
        let connect_info = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0);
        client_addr(request.headers(), connect_info)
    };

    info!(
        target: "limit_req::middleware",
        request_id = %request_id,
        method = %method,
        uri = %uri,
        client_addr = %client_addr,
        "Incoming request"
    );

    request.extensions_mut().insert(RequestId(request_id));
    request.extensions_mut().insert(ClientAddr(client_addr));

    let response = next.run(request).await;

    let status = response.status();
    info!(
        target: "limit_req::middleware",
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = %status,
        "Request completed"
    );

    response
}

/// Caller address used as the default key. Forwarding headers are trusted
/// as-is, so the service must sit behind a proxy that overwrites them.
pub fn client_addr(headers: &HeaderMap, connect_info: Option<SocketAddr>) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            if let Some(first_ip) = forwarded_str.split(',').next() {
                let first_ip = first_ip.trim();
                if !first_ip.is_empty() {
                    return first_ip.to_string();
                }
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            return ip_str.trim().to_string();
        }
    }

    match connect_info {
        Some(addr) => addr.ip().to_string(),
        None => "unknown".to_string(),
    }
}
