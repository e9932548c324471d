//! Request path routing
//!
//! The same endpoints are mounted under every scope prefix:
//!
//! | Prefix                 | Scope   |
//! |------------------------|---------|
//! | `` and `/api/public`   | Public  |
//! | `/api/share`           | Share   |
//! | `/api/private`         | Private |

/// Which hub a request is served by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// The shared public hub, no credentials
    Public,
    /// The shared hub behind basic auth
    Share,
    /// One hub per authenticated user
    Private,
}

impl Scope {
    pub fn requires_auth(self) -> bool {
        !matches!(self, Scope::Public)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Public => "public",
            Scope::Share => "share",
            Scope::Private => "private",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// `GET /`
    Index,
    /// `GET /metrics`
    Metrics,
    /// `GET` drains, `POST` publishes
    Http,
    /// Hub snapshot
    Status,
    /// WebSocket upgrade
    Ws,
}

impl Endpoint {
    pub fn as_str(self) -> &'static str {
        match self {
            Endpoint::Index => "index",
            Endpoint::Metrics => "metrics",
            Endpoint::Http => "http",
            Endpoint::Status => "status",
            Endpoint::Ws => "ws",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub scope: Scope,
    pub endpoint: Endpoint,
}

const PREFIXES: [(&str, Scope); 3] = [
    ("/api/public", Scope::Public),
    ("/api/share", Scope::Share),
    ("/api/private", Scope::Private),
];

/// Resolve a request path (without query string)
pub fn parse_route(path: &str) -> Option<Route> {
    match path {
        "/" | "" => {
            return Some(Route {
                scope: Scope::Public,
                endpoint: Endpoint::Index,
            })
        }
        "/metrics" => {
            return Some(Route {
                scope: Scope::Public,
                endpoint: Endpoint::Metrics,
            })
        }
        _ => {}
    }

    let path = path.strip_suffix('/').unwrap_or(path);
    let (scope, rest) = PREFIXES
        .iter()
        .find_map(|(prefix, scope)| {
            path.strip_prefix(prefix)
                .filter(|rest| rest.starts_with('/'))
                .map(|rest| (*scope, rest))
        })
        .unwrap_or((Scope::Public, path));

    let endpoint = match rest {
        "/http" => Endpoint::Http,
        "/status" => Endpoint::Status,
        "/ws" => Endpoint::Ws,
        _ => return None,
    };
    Some(Route { scope, endpoint })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(scope: Scope, endpoint: Endpoint) -> Option<Route> {
        Some(Route { scope, endpoint })
    }

    #[test]
    fn test_root_paths() {
        assert_eq!(parse_route("/"), route(Scope::Public, Endpoint::Index));
        assert_eq!(
            parse_route("/metrics"),
            route(Scope::Public, Endpoint::Metrics)
        );
        assert_eq!(parse_route("/http"), route(Scope::Public, Endpoint::Http));
        assert_eq!(parse_route("/ws"), route(Scope::Public, Endpoint::Ws));
    }

    #[test]
    fn test_scoped_paths() {
        assert_eq!(
            parse_route("/api/public/status"),
            route(Scope::Public, Endpoint::Status)
        );
        assert_eq!(
            parse_route("/api/share/http"),
            route(Scope::Share, Endpoint::Http)
        );
        assert_eq!(
            parse_route("/api/private/ws/"),
            route(Scope::Private, Endpoint::Ws)
        );
    }

    #[test]
    fn test_unknown_paths() {
        assert_eq!(parse_route("/api/private"), None);
        assert_eq!(parse_route("/api/privatehttp"), None);
        assert_eq!(parse_route("/api/other/http"), None);
        assert_eq!(parse_route("/api/share/metrics"), None);
        assert_eq!(parse_route("/nope"), None);
    }

    #[test]
    fn test_scope_auth() {
        assert!(!Scope::Public.requires_auth());
        assert!(Scope::Share.requires_auth());
        assert!(Scope::Private.requires_auth());
    }
}
