use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::error::{GatewayError, GatewayResult};

/// A path prefix and the upstream it is proxied to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Route {
    pub path: String,
    pub target: String,
}

impl Route {
    pub fn new(path: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            target: target.into(),
        }
    }

    /// Check the route shape and parse its target.
    pub fn validate(&self) -> GatewayResult<RouteTarget> {
        if self.path.is_empty() {
            return Err(GatewayError::InvalidRoute(
                "route path must not be empty".to_string(),
            ));
        }
        self.target.parse()
    }
}

/// Body of `PUT /v1/gateway/port`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangePortRequest {
    pub port: String,
}

/// A validated upstream URL: absolute, http or https, with a host.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteTarget {
    url: Url,
}

impl RouteTarget {
    pub fn new(target: &str) -> GatewayResult<Self> {
        let invalid = |reason: String| GatewayError::InvalidTarget {
            target: target.to_string(),
            reason,
        };

        let url = Url::parse(target).map_err(|e| invalid(e.to_string()))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!(
                "scheme must be http or https, got '{}'",
                url.scheme()
            )));
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(invalid("missing host".to_string()));
        }

        Ok(Self { url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn is_secure(&self) -> bool {
        self.url.scheme() == "https"
    }

    /// `scheme://host[:port]` of the target.
    pub fn origin(&self) -> String {
        match self.url.port() {
            Some(port) => format!(
                "{}://{}:{}",
                self.url.scheme(),
                self.url.host_str().unwrap_or_default(),
                port
            ),
            None => format!(
                "{}://{}",
                self.url.scheme(),
                self.url.host_str().unwrap_or_default()
            ),
        }
    }

    /// Build the upstream path-and-query for an incoming request.
    ///
    /// The target path and request path are joined with exactly one slash;
    /// a target query and a request query are joined with `&`.
    pub fn join_path_and_query(&self, path: &str, query: Option<&str>) -> String {
        let mut joined = join_single_slash(self.url.path(), path);
        if joined.is_empty() {
            joined.push('/');
        }

        let base_query = self.url.query().filter(|q| !q.is_empty());
        let query = match (base_query, query.filter(|q| !q.is_empty())) {
            (Some(a), Some(b)) => Some(format!("{a}&{b}")),
            (Some(a), None) => Some(a.to_string()),
            (None, Some(b)) => Some(b.to_string()),
            (None, None) => None,
        };

        match query {
            Some(q) => format!("{joined}?{q}"),
            None => joined,
        }
    }
}

fn join_single_slash(a: &str, b: &str) -> String {
    match (a.ends_with('/'), b.starts_with('/')) {
        (true, true) => format!("{a}{}", &b[1..]),
        (false, false) if !b.is_empty() => format!("{a}/{b}"),
        _ => format!("{a}{b}"),
    }
}

impl FromStr for RouteTarget {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RouteTarget::new(s)
    }
}

impl fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}
