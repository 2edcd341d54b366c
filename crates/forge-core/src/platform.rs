//! Platform reference profiles (`[platforms]` table)
//!
//! A profile is what the generator is told about a well-known API before it
//! writes a line: base URL, OAuth endpoints, scopes, a few endpoints and the
//! published rate limits. Built-in profiles cover GitHub, Gmail, Slack,
//! Notion and Twitter; configuration may add to or replace them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One documented API endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// HTTP method, upper case
    pub method: String,
    /// Path relative to the base URL; `{name}` marks a path parameter
    pub path: String,
    /// What the endpoint does
    #[serde(default)]
    pub description: String,
}

impl Endpoint {
    /// Create endpoint
    #[must_use]
    pub fn new(
        method: impl Into<String>,
        path: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            method: method.into().to_ascii_uppercase(),
            path: path.into(),
            description: description.into(),
        }
    }

    /// Tool name suggested for this endpoint
    ///
    /// Path parameters are dropped, then the verb comes from the method:
    /// `GET /user` is `get_user`, `GET /user/repos` is `list_repos`,
    /// `POST` is `create_`, `PUT`/`PATCH` are `update_`, `DELETE` is `delete_`.
    #[must_use]
    pub fn tool_name(&self) -> String {
        let parts: Vec<String> = self
            .path
            .split('/')
            .filter(|part| !part.is_empty() && !part.starts_with('{'))
            .map(|part| part.replace(['.', '-'], "_").to_ascii_lowercase())
            .collect();
        let last = parts.last().map_or("resource", String::as_str);

        match self.method.to_ascii_uppercase().as_str() {
            "GET" if parts.len() == 1 => format!("get_{last}"),
            "GET" => format!("list_{last}"),
            "POST" => format!("create_{last}"),
            "PUT" | "PATCH" => format!("update_{last}"),
            "DELETE" => format!("delete_{last}"),
            other => format!("{}_{last}", other.to_ascii_lowercase()),
        }
    }
}

/// What is known about one target platform
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformProfile {
    /// API base URL
    pub base_url: String,
    /// OAuth authorization URL
    pub oauth_url: String,
    /// OAuth token exchange URL
    pub token_url: String,
    /// OAuth scopes to request
    pub scopes: Vec<String>,
    /// Developer documentation
    pub documentation: String,
    /// Representative endpoints
    pub endpoints: Vec<Endpoint>,
    /// Published limits, e.g. `requests_per_hour = 5000`
    pub rate_limits: BTreeMap<String, u64>,
}

impl PlatformProfile {
    /// Tool names for every endpoint, without duplicates, in endpoint order
    #[must_use]
    pub fn recommended_tools(&self) -> Vec<String> {
        let mut tools: Vec<String> = Vec::with_capacity(self.endpoints.len());
        for name in self.endpoints.iter().map(Endpoint::tool_name) {
            if !tools.contains(&name) {
                tools.push(name);
            }
        }
        tools
    }
}

/// Profiles keyed by lower-case target id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, PlatformProfile>",
    into = "BTreeMap<String, PlatformProfile>"
)]
pub struct PlatformCatalog {
    profiles: BTreeMap<String, PlatformProfile>,
}

impl From<BTreeMap<String, PlatformProfile>> for PlatformCatalog {
    fn from(profiles: BTreeMap<String, PlatformProfile>) -> Self {
        profiles
            .into_iter()
            .fold(Self::empty(), |catalog, (name, profile)| {
                catalog.with_profile(name, profile)
            })
    }
}

impl From<PlatformCatalog> for BTreeMap<String, PlatformProfile> {
    fn from(catalog: PlatformCatalog) -> Self {
        catalog.profiles
    }
}

impl Default for PlatformCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PlatformCatalog {
    /// Catalog without any profile
    #[must_use]
    pub fn empty() -> Self {
        Self {
            profiles: BTreeMap::new(),
        }
    }

    /// Built-in profiles
    #[must_use]
    pub fn builtin() -> Self {
        let mut catalog = Self::empty();
        for (name, profile) in builtin_profiles() {
            catalog = catalog.with_profile(name, profile);
        }
        catalog
    }

    /// Add or replace the profile for `name`
    #[must_use]
    pub fn with_profile(mut self, name: impl AsRef<str>, profile: PlatformProfile) -> Self {
        self.profiles
            .insert(name.as_ref().to_ascii_lowercase(), profile);
        self
    }

    /// Merge `other` over this catalog; its profiles win
    #[must_use]
    pub fn merged(mut self, other: Self) -> Self {
        for (name, profile) in other.profiles {
            self.profiles.insert(name, profile);
        }
        self
    }

    /// Profile for `target_id`, ignoring case
    #[must_use]
    pub fn lookup(&self, target_id: &str) -> Option<&PlatformProfile> {
        self.profiles.get(&target_id.to_ascii_lowercase())
    }

    /// Known platform names
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    /// Number of profiles
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// No profiles at all
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn limits(items: &[(&str, u64)]) -> BTreeMap<String, u64> {
    items.iter().map(|(k, v)| ((*k).to_string(), *v)).collect()
}

fn builtin_profiles() -> Vec<(&'static str, PlatformProfile)> {
    vec![
        (
            "github",
            PlatformProfile {
                base_url: "https://api.github.com".into(),
                oauth_url: "https://github.com/login/oauth/authorize".into(),
                token_url: "https://github.com/login/oauth/access_token".into(),
                scopes: strings(&["repo", "user", "gist"]),
                documentation: "https://docs.github.com/en/rest".into(),
                endpoints: vec![
                    Endpoint::new("GET", "/user", "Get authenticated user information"),
                    Endpoint::new("GET", "/user/repos", "List user repositories"),
                    Endpoint::new("POST", "/user/repos", "Create a new repository"),
                    Endpoint::new("GET", "/repos/{owner}/{repo}/issues", "List repository issues"),
                    Endpoint::new("POST", "/repos/{owner}/{repo}/issues", "Create a new issue"),
                ],
                rate_limits: limits(&[("requests_per_hour", 5000), ("requests_per_minute", 60)]),
            },
        ),
        (
            "gmail",
            PlatformProfile {
                base_url: "https://gmail.googleapis.com".into(),
                oauth_url: "https://accounts.google.com/o/oauth2/v2/auth".into(),
                token_url: "https://oauth2.googleapis.com/token".into(),
                scopes: strings(&[
                    "https://www.googleapis.com/auth/gmail.readonly",
                    "https://www.googleapis.com/auth/gmail.send",
                ]),
                documentation: "https://developers.google.com/gmail/api".into(),
                endpoints: vec![
                    Endpoint::new("GET", "/gmail/v1/users/me/profile", "Get user profile"),
                    Endpoint::new("GET", "/gmail/v1/users/me/messages", "List messages"),
                    Endpoint::new("POST", "/gmail/v1/users/me/messages/send", "Send a message"),
                ],
                rate_limits: limits(&[
                    ("quota_units_per_day", 1_000_000_000),
                    ("quota_units_per_second", 250),
                ]),
            },
        ),
        (
            "slack",
            PlatformProfile {
                base_url: "https://slack.com/api".into(),
                oauth_url: "https://slack.com/oauth/v2/authorize".into(),
                token_url: "https://slack.com/api/oauth.v2.access".into(),
                scopes: strings(&["channels:read", "chat:write", "users:read"]),
                documentation: "https://api.slack.com".into(),
                endpoints: vec![
                    Endpoint::new("GET", "/auth.test", "Test authentication"),
                    Endpoint::new("GET", "/conversations.list", "List channels"),
                    Endpoint::new("POST", "/chat.postMessage", "Send a message"),
                ],
                rate_limits: limits(&[("requests_per_minute", 50), ("burst", 100)]),
            },
        ),
        (
            "notion",
            PlatformProfile {
                base_url: "https://api.notion.com/v1".into(),
                oauth_url: "https://api.notion.com/v1/oauth/authorize".into(),
                token_url: "https://api.notion.com/v1/oauth/token".into(),
                scopes: strings(&["read", "write"]),
                documentation: "https://developers.notion.com".into(),
                endpoints: vec![
                    Endpoint::new("GET", "/users/me", "Get the bot user"),
                    Endpoint::new("POST", "/search", "Search pages and databases"),
                    Endpoint::new("POST", "/pages", "Create a page"),
                ],
                rate_limits: limits(&[("requests_per_second", 3), ("requests_per_minute", 100)]),
            },
        ),
        (
            "twitter",
            PlatformProfile {
                base_url: "https://api.twitter.com/2".into(),
                oauth_url: "https://twitter.com/i/oauth2/authorize".into(),
                token_url: "https://api.twitter.com/2/oauth2/token".into(),
                scopes: strings(&["tweet.read", "tweet.write", "users.read"]),
                documentation: "https://developer.twitter.com/en/docs/twitter-api".into(),
                endpoints: vec![
                    Endpoint::new("GET", "/users/me", "Get the authenticated user"),
                    Endpoint::new("POST", "/tweets", "Post a tweet"),
                ],
                rate_limits: limits(&[
                    ("requests_per_15min", 300),
                    ("tweets_per_day", 500_000),
                ]),
            },
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_names_follow_method_and_path() {
        let cases = [
            ("GET", "/user", "get_user"),
            ("GET", "/user/repos", "list_repos"),
            ("POST", "/repos/{owner}/{repo}/issues", "create_issues"),
            ("PATCH", "/repos/{owner}/{repo}", "update_repos"),
            ("delete", "/gists/{id}", "delete_gists"),
            ("POST", "/chat.postMessage", "create_chat_postmessage"),
        ];
        for (method, path, expected) in cases {
            assert_eq!(Endpoint::new(method, path, "").tool_name(), expected, "{method} {path}");
        }
    }

    #[test]
    fn builtin_catalog_covers_common_platforms() {
        let catalog = PlatformCatalog::default();
        for name in ["github", "gmail", "slack", "notion", "twitter"] {
            let profile = catalog.lookup(name).unwrap();
            assert!(profile.oauth_url.starts_with("https://"), "{name}");
            assert!(!profile.scopes.is_empty(), "{name}");
            assert!(!profile.rate_limits.is_empty(), "{name}");
        }
        assert!(catalog.lookup("GitHub").is_some());
        assert!(catalog.lookup("jira").is_none());
    }

    #[test]
    fn github_tools_are_deduplicated() {
        let catalog = PlatformCatalog::builtin();
        let github = catalog.lookup("github").unwrap();
        assert_eq!(
            github.recommended_tools(),
            vec!["get_user", "list_repos", "create_repos", "list_issues", "create_issues"]
        );
    }

    #[test]
    fn toml_profiles_merge_over_builtin() {
        #[derive(Deserialize)]
        struct Wrapper {
            platforms: PlatformCatalog,
        }

        let parsed: Wrapper = toml::from_str(
            r#"
            [platforms.Jira]
            base_url = "https://example.atlassian.net/rest/api/3"
            scopes = ["read:jira-work"]
            endpoints = [{ method = "get", path = "/myself" }]

            [platforms.github]
            base_url = "https://github.example.com/api/v3"
            "#,
        )
        .unwrap();

        let catalog = PlatformCatalog::builtin().merged(parsed.platforms);
        let jira = catalog.lookup("jira").unwrap();
        assert_eq!(jira.recommended_tools(), vec!["get_myself"]);
        assert_eq!(jira.endpoints[0].method, "get");

        let github = catalog.lookup("github").unwrap();
        assert_eq!(github.base_url, "https://github.example.com/api/v3");
        assert!(github.endpoints.is_empty());
        assert_eq!(catalog.len(), 6);
    }
}
