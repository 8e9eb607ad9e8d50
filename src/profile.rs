//! Profiles and the role-based authorization model.
//!
//! A [`Profile`] bundles the routes and firewall rules a client gets with the
//! roles that may obtain it. Authorization is computed per request into an
//! [`Authorization`] value; the shared [`ProfileCatalog`] is never mutated
//! after construction.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Write as _;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{PortalError, Result};

/// A route pushed to the client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Route {
    /// Network address, e.g. `10.0.0.0`.
    #[serde(rename = "route", default)]
    pub network: String,
    #[serde(default)]
    pub netmask: String,
}

/// A firewall rule applied to the client's traffic.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FirewallRule {
    #[serde(rename = "dest")]
    pub destination: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default = "FirewallRule::default_protocol")]
    pub protocol: String,
    pub action: String,
}

impl FirewallRule {
    fn default_protocol() -> String {
        "all".to_string()
    }
}

/// A named bundle of network entitlements and the roles allowed to obtain it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Profile {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Maximum session length, e.g. `8h` or `1h30m`.
    #[serde(rename = "max-session")]
    pub max_session: String,
    /// Roles allowed to obtain this profile.
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub routes: Vec<Route>,
    #[serde(default)]
    pub rules: Vec<FirewallRule>,
}

impl Profile {
    /// Parses [`Profile::max_session`].
    ///
    /// Certificate validity has one second resolution, so unparsable
    /// durations and durations under a second are rejected.
    pub fn max_session_duration(&self) -> Result<Duration> {
        let duration = humantime::parse_duration(self.max_session.trim()).map_err(|e| {
            PortalError::InvalidDuration(format!(
                "profile {}: max-session {:?}: {e}",
                self.name, self.max_session
            ))
        })?;
        if duration < Duration::from_secs(1) {
            return Err(PortalError::InvalidDuration(format!(
                "profile {}: max-session must be at least one second",
                self.name
            )));
        }
        Ok(duration)
    }

    /// Whether any of `claimed` is among this profile's roles.
    ///
    /// A profile without roles authorizes nobody.
    pub fn authorizes(&self, claimed: &ClaimedRoles) -> bool {
        self.roles.iter().any(|role| claimed.contains(role))
    }

    /// OpenVPN `push "route ..."` directives, one line per route.
    pub fn route_directives(&self) -> String {
        self.routes.iter().fold(String::new(), |mut out, route| {
            let _ = writeln!(out, "push \"route {} {}\"", route.network, route.netmask);
            out
        })
    }

    /// A bash script appending this profile's rules to `${CHAIN_NAME}`.
    pub fn firewall_script(&self) -> String {
        let mut script = String::from(
            "#!/usr/bin/env bash\n\
             set -e\n\
             if [[ -z \"${CHAIN_NAME}\" ]]; then\n\
             \techo \"you have not specified a CHAIN_NAME to add the rules\"\n\
             \texit 1\n\
             fi\n",
        );
        for rule in &self.rules {
            let _ = write!(
                script,
                "iptables -A ${{CHAIN_NAME}} -p {} --destination {}",
                rule.protocol, rule.destination
            );
            if let Some(port) = rule.port {
                let _ = write!(script, " --dport {port}");
            }
            let _ = writeln!(script, " -j {}", rule.action);
        }
        script
    }
}

/// The set of roles asserted for the current request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimedRoles(BTreeSet<String>);

impl ClaimedRoles {
    /// Parses a comma separated role header. Items are trimmed and empty
    /// items dropped.
    pub fn parse(header: &str) -> Self {
        header
            .split(',')
            .map(str::trim)
            .filter(|role| !role.is_empty())
            .collect()
    }

    pub fn contains(&self, role: &str) -> bool {
        self.0.contains(role)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for ClaimedRoles {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Per-request authorization outcome for every profile in a catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Authorization(BTreeMap<String, bool>);

impl Authorization {
    /// Whether `profile` was authorized. Unknown profiles are not.
    pub fn is_permitted(&self, profile: &str) -> bool {
        self.0.get(profile).copied().unwrap_or(false)
    }

    /// Names of the authorized profiles.
    pub fn permitted(&self) -> impl Iterator<Item = &str> + '_ {
        self.0
            .iter()
            .filter(|(_, permitted)| **permitted)
            .map(|(name, _)| name.as_str())
    }
}

/// The profiles configured for the portal, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct ProfileCatalog {
    profiles: Vec<Profile>,
    index: HashMap<String, usize>,
}

impl ProfileCatalog {
    /// Builds a catalog. When several profiles share a name the last one
    /// wins; it keeps the position of the first.
    pub fn new(profiles: impl IntoIterator<Item = Profile>) -> Self {
        let mut catalog = Self::default();
        for profile in profiles {
            match catalog.index.get(&profile.name) {
                Some(&position) => {
                    warn!(
                        profile = %profile.name,
                        "Duplicate profile name in configuration, using the last definition"
                    );
                    catalog.profiles[position] = profile;
                }
                None => {
                    catalog
                        .index
                        .insert(profile.name.clone(), catalog.profiles.len());
                    catalog.profiles.push(profile);
                }
            }
        }
        catalog
    }

    /// Profiles in configuration order.
    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn lookup_profile(&self, name: &str) -> Result<&Profile> {
        self.index
            .get(name)
            .map(|&position| &self.profiles[position])
            .ok_or_else(|| PortalError::ProfileNotFound(name.to_string()))
    }

    /// Decides, for every profile, whether `claimed` entitles the caller to it.
    pub fn resolve_authorization(&self, claimed: &ClaimedRoles) -> Authorization {
        Authorization(
            self.profiles
                .iter()
                .map(|profile| (profile.name.clone(), profile.authorizes(claimed)))
                .collect(),
        )
    }

    /// The single gate in front of issuance: the profile must exist and
    /// `claimed` must share a role with it.
    pub fn check_authorized(&self, profile_name: &str, claimed: &ClaimedRoles) -> Result<&Profile> {
        let profile = self.lookup_profile(profile_name)?;
        if !profile.authorizes(claimed) {
            debug!(profile = profile_name, "Claimed roles do not grant profile");
            return Err(PortalError::NotAuthorized(profile_name.to_string()));
        }
        Ok(profile)
    }
}
