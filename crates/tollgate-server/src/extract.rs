//! Request extractors: caller identity and client origin.

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header::{AUTHORIZATION, USER_AGENT};
use axum::http::request::Parts;
use tollgate_core::error::TollgateError;
use tollgate_core::invoker::ModelInvoker;
use tollgate_core::models::auth_context::AuthContext;
use tollgate_core::models::session::ClientOrigin;

use crate::backend::Backend;
use crate::error::ApiError;
use crate::state::AppState;

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn extract_bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Client address and signature. The socket peer is the address unless it
/// is a trusted proxy, in which case `X-Forwarded-For` is walked from the
/// right and the first hop that is not itself a trusted proxy wins.
pub fn client_origin(parts: &Parts, trusted_proxies: &[IpAddr]) -> ClientOrigin {
    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let ip_address = match peer {
        Some(peer) if trusted_proxies.contains(&peer) => {
            Some(forwarded_client(parts, trusted_proxies).unwrap_or(peer))
        }
        other => other,
    }
    .map(|ip| ip.to_string());
    let user_agent = parts
        .headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    ClientOrigin {
        ip_address,
        user_agent,
    }
}

/// Rightmost `X-Forwarded-For` hop that is not a trusted proxy. A header
/// with any unparseable hop is ignored.
fn forwarded_client(parts: &Parts, trusted_proxies: &[IpAddr]) -> Option<IpAddr> {
    let hops = parts
        .headers
        .get_all("x-forwarded-for")
        .iter()
        .map(|v| v.to_str().ok())
        .collect::<Option<Vec<_>>>()?
        .into_iter()
        .flat_map(|v| v.split(','))
        .map(|hop| hop.trim().parse::<IpAddr>().ok())
        .collect::<Option<Vec<_>>>()?;
    hops.iter()
        .rev()
        .find(|ip| !trusted_proxies.contains(ip))
        .or(hops.first())
        .copied()
}

/// Where the request came from. Never rejects.
#[derive(Debug, Clone)]
pub struct Origin(pub ClientOrigin);

impl<B, I> FromRequestParts<Arc<AppState<B, I>>> for Origin
where
    B: Backend,
    I: ModelInvoker + 'static,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<B, I>>,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self(client_origin(parts, &state.trusted_proxies)))
    }
}

/// An authenticated caller: a verified access token or API key.
#[derive(Debug, Clone)]
pub struct Caller {
    pub context: AuthContext,
    pub origin: ClientOrigin,
}

impl<B, I> FromRequestParts<Arc<AppState<B, I>>> for Caller
where
    B: Backend,
    I: ModelInvoker + 'static,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<B, I>>,
    ) -> Result<Self, Self::Rejection> {
        let credential = extract_bearer_token(parts)
            .ok_or_else(|| TollgateError::invalid_token("missing bearer credential"))?;
        let context = state.auth.authenticate(credential).await?;
        Ok(Self {
            context,
            origin: client_origin(parts, &state.trusted_proxies),
        })
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn bearer_token_is_extracted() {
        let p = parts(&[("authorization", "Bearer abc.def")]);
        assert_eq!(extract_bearer_token(&p), Some("abc.def"));
        let p = parts(&[("authorization", "bearer tg_123")]);
        assert_eq!(extract_bearer_token(&p), Some("tg_123"));
    }

    #[test]
    fn other_schemes_are_ignored() {
        assert_eq!(extract_bearer_token(&parts(&[("authorization", "Basic Zm9v")])), None);
        assert_eq!(extract_bearer_token(&parts(&[("authorization", "Bearer ")])), None);
        assert_eq!(extract_bearer_token(&parts(&[])), None);
    }

    const PROXY: [u8; 4] = [10, 0, 0, 1];

    fn from_peer(mut p: Parts, peer: [u8; 4]) -> Parts {
        p.extensions.insert(ConnectInfo(SocketAddr::from((peer, 4000))));
        p
    }

    #[test]
    fn forwarded_header_from_untrusted_peer_is_ignored() {
        let p = from_peer(
            parts(&[("x-forwarded-for", "203.0.113.9"), ("user-agent", "cli/1.0")]),
            [198, 51, 100, 7],
        );
        let origin = client_origin(&p, &[IpAddr::from(PROXY)]);
        assert_eq!(origin.ip_address.as_deref(), Some("198.51.100.7"));
        assert_eq!(origin.user_agent.as_deref(), Some("cli/1.0"));

        let origin = client_origin(&p, &[]);
        assert_eq!(origin.ip_address.as_deref(), Some("198.51.100.7"));
    }

    #[test]
    fn trusted_proxy_reports_the_nearest_untrusted_hop() {
        let trusted = [IpAddr::from(PROXY), IpAddr::from([10, 0, 0, 2])];
        let p = from_peer(
            parts(&[("x-forwarded-for", "192.0.2.66, 203.0.113.9, 10.0.0.2")]),
            PROXY,
        );
        let origin = client_origin(&p, &trusted);
        assert_eq!(origin.ip_address.as_deref(), Some("203.0.113.9"));

        let p = from_peer(parts(&[("x-forwarded-for", "10.0.0.2")]), PROXY);
        assert_eq!(client_origin(&p, &trusted).ip_address.as_deref(), Some("10.0.0.2"));
    }

    #[test]
    fn trusted_proxy_without_usable_header_falls_back_to_peer() {
        let trusted = [IpAddr::from(PROXY)];
        let p = from_peer(parts(&[]), PROXY);
        assert_eq!(client_origin(&p, &trusted).ip_address.as_deref(), Some("10.0.0.1"));

        let p = from_peer(parts(&[("x-forwarded-for", "not-an-ip, 203.0.113.9")]), PROXY);
        assert_eq!(client_origin(&p, &trusted).ip_address.as_deref(), Some("10.0.0.1"));

        assert_eq!(client_origin(&parts(&[]), &trusted).ip_address, None);
    }
}
