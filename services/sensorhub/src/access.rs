//! Role-gated dashboard tools and the routes derived from them
//!
//! A [`Tool`] is a statically declared dashboard section with the set of
//! access levels allowed to open it. [`RouteTable::build`] turns the tool
//! list into routes under the dashboard root, and [`Route::guard`] decides
//! at navigation time whether the caller may enter. The caller's role is
//! resolved on every guard call and never cached, and any failure to
//! resolve it denies access.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::session::Session;

/// Role label controlling which tools a user may open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessLevel {
    #[serde(rename = "*")]
    All,
    #[serde(rename = "member")]
    Member,
    #[serde(rename = "researcher")]
    Researcher,
    #[serde(rename = "admin")]
    Admin,
    #[serde(rename = "sponsor")]
    Sponsor,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::All => "*",
            AccessLevel::Member => "member",
            AccessLevel::Researcher => "researcher",
            AccessLevel::Admin => "admin",
            AccessLevel::Sponsor => "sponsor",
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized access level '{0}'")]
pub struct UnknownAccessLevel(pub String);

impl FromStr for AccessLevel {
    type Err = UnknownAccessLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "*" => Ok(AccessLevel::All),
            "member" => Ok(AccessLevel::Member),
            "researcher" => Ok(AccessLevel::Researcher),
            "admin" => Ok(AccessLevel::Admin),
            "sponsor" => Ok(AccessLevel::Sponsor),
            other => Err(UnknownAccessLevel(other.to_string())),
        }
    }
}

/// Which handler renders a tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Profile,
    Sensors,
    Devices,
    Permissions,
}

/// A named, access-controlled section of the dashboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tool {
    pub name: &'static str,
    pub icon: &'static str,
    pub path: &'static str,
    pub kind: ToolKind,
    pub access_levels: &'static [AccessLevel],
    pub has_children: bool,
}

impl Tool {
    /// True if a caller at `level` may open this tool
    pub fn permits(&self, level: AccessLevel) -> bool {
        self.access_levels.contains(&AccessLevel::All) || self.access_levels.contains(&level)
    }
}

const TOOLS: &[Tool] = &[
    Tool {
        name: "Profile",
        icon: "account_box",
        path: "profile",
        kind: ToolKind::Profile,
        access_levels: &[AccessLevel::All],
        has_children: false,
    },
    Tool {
        name: "Sensors",
        icon: "sensors",
        path: "sensors",
        kind: ToolKind::Sensors,
        access_levels: &[AccessLevel::Admin, AccessLevel::Researcher],
        has_children: true,
    },
    Tool {
        name: "IoT Devices",
        icon: "devices",
        path: "devices",
        kind: ToolKind::Devices,
        access_levels: &[AccessLevel::Admin, AccessLevel::Researcher],
        has_children: false,
    },
    Tool {
        name: "Permissions",
        icon: "lock",
        path: "permissions",
        kind: ToolKind::Permissions,
        access_levels: &[AccessLevel::Admin],
        has_children: false,
    },
];

/// The dashboard's tool list
pub fn default_tools() -> &'static [Tool] {
    TOOLS
}

/// Tools a caller at `level` should see in navigation
pub fn visible_tools(tools: &[Tool], level: AccessLevel) -> Vec<&Tool> {
    tools.iter().filter(|tool| tool.permits(level)).collect()
}

/// Outcome of an authorization check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Redirect(String),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Decide whether `level` may open `tool`; `None` means the role is unknown
pub fn authorize(tool: &Tool, level: Option<AccessLevel>, fallback: &str) -> Decision {
    match level {
        Some(level) if tool.permits(level) => Decision::Allow,
        _ => Decision::Redirect(fallback.to_string()),
    }
}

/// Resolves a caller's role label, typically by asking the backend
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait RoleResolver: Send + Sync {
    async fn resolve(&self, session: &Session) -> crate::Result<String>;
}

/// Resolve the caller's access level, failing closed
pub async fn resolve_level(
    session: Option<&Session>,
    resolver: &dyn RoleResolver,
) -> Option<AccessLevel> {
    let Some(session) = session else {
        tracing::debug!("No session; treating role as unresolved");
        return None;
    };
    let role = match resolver.resolve(session).await {
        Ok(role) => role,
        Err(e) => {
            tracing::warn!("Failed to resolve role for '{}': {}", session.user_id, e);
            return None;
        }
    };
    match role.parse::<AccessLevel>() {
        Ok(level) => Some(level),
        Err(e) => {
            tracing::warn!("User '{}': {}", session.user_id, e);
            None
        }
    }
}

/// A route derived from one tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub pattern: String,
    pub tool: Tool,
    prefix: String,
    fallback: String,
}

impl Route {
    /// True if `path` belongs to this route
    pub fn matches(&self, path: &str) -> bool {
        let path = normalize(path);
        if path == self.prefix {
            return true;
        }
        self.tool.has_children
            && path
                .strip_prefix(self.prefix.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    }

    /// The path this route is entered through
    pub fn href(&self) -> &str {
        &self.prefix
    }

    /// Evaluate access for the caller, re-resolving the role each time
    pub async fn guard(&self, session: Option<&Session>, resolver: &dyn RoleResolver) -> Decision {
        let level = resolve_level(session, resolver).await;
        self.decide(level)
    }

    /// Evaluate access for an already resolved level
    pub fn decide(&self, level: Option<AccessLevel>) -> Decision {
        let decision = authorize(&self.tool, level, &self.fallback);
        tracing::debug!(
            "Guard '{}' for {:?}: {:?}",
            self.tool.name,
            level.map(|l| l.as_str()),
            decision
        );
        decision
    }
}

/// Routes for every tool, rooted at the dashboard path
#[derive(Debug, Clone)]
pub struct RouteTable {
    root: String,
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn build(tools: &[Tool], root: &str) -> Self {
        let root = normalize(root).to_string();
        let routes = tools
            .iter()
            .map(|tool| {
                let prefix = format!("{}/{}", root, tool.path.trim_matches('/'));
                let pattern = if tool.has_children {
                    format!("{}/*", prefix)
                } else {
                    prefix.clone()
                };
                Route {
                    pattern,
                    tool: tool.clone(),
                    prefix,
                    fallback: root.clone(),
                }
            })
            .collect();
        Self { root, routes }
    }

    /// The dashboard root, which is also where denied navigation lands
    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn match_path(&self, path: &str) -> Option<&Route> {
        self.routes.iter().find(|route| route.matches(path))
    }

    pub fn route_for(&self, kind: ToolKind) -> Option<&Route> {
        self.routes.iter().find(|route| route.tool.kind == kind)
    }
}

fn normalize(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}
