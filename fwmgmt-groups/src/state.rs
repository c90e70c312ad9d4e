//! Local resource state.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ReconcileError, Result};
use crate::payload::GroupSnapshot;

/// Object types a network-member resource may add to a group.
pub const NETWORK_OBJECT_TYPES: &[&str] = &[
    "host",
    "network",
    "address-range",
    "multicast-address-range",
    "group",
    "group-with-exclusion",
    "dns-domain",
    "dynamic-object",
    "security-zone",
    "wildcard",
    "updatable-object",
    "checkpoint-host",
    "simple-gateway",
    "simple-cluster",
];

/// Shape of a membership resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    /// One member object, referenced by name.
    Member,
    /// One network object member.
    NetworkMember,
    /// The full member set of a group.
    MemberSet,
}

impl ResourceKind {
    pub fn is_single(self) -> bool {
        !matches!(self, ResourceKind::MemberSet)
    }

    /// Whether an object of `object_type` may be a member of this kind.
    pub fn accepts(self, object_type: &str) -> bool {
        match self {
            ResourceKind::NetworkMember => NETWORK_OBJECT_TYPES.contains(&object_type),
            _ => true,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::Member => "member",
            ResourceKind::NetworkMember => "network-member",
            ResourceKind::MemberSet => "member-set",
        };
        f.write_str(s)
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "member" => Ok(ResourceKind::Member),
            "network-member" => Ok(ResourceKind::NetworkMember),
            "member-set" => Ok(ResourceKind::MemberSet),
            other => Err(format!(
                "unknown resource kind '{}' (expected member, network-member or member-set)",
                other
            )),
        }
    }
}

/// Member field of a resource: one name, or a set of names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Members {
    One(String),
    Set(BTreeSet<String>),
}

impl Members {
    pub fn set<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Members::Set(names.into_iter().map(Into::into).collect())
    }

    /// Names as a set; a single empty name yields an empty set.
    pub fn names(&self) -> BTreeSet<String> {
        match self {
            Members::One(name) if name.is_empty() => BTreeSet::new(),
            Members::One(name) => BTreeSet::from([name.clone()]),
            Members::Set(names) => names.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Members::One(name) => name.is_empty(),
            Members::Set(names) => names.is_empty(),
        }
    }
}

/// Group attributes tracked by member-set resources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
}

impl GroupDetails {
    pub fn is_empty(&self) -> bool {
        self.comments.is_none() && self.color.is_none() && self.tags.is_empty()
    }
}

impl From<&GroupSnapshot> for GroupDetails {
    fn from(group: &GroupSnapshot) -> Self {
        Self {
            comments: group.comments.clone(),
            color: group.color.clone(),
            tags: group.tag_names(),
        }
    }
}

/// Desired or observed state of one membership resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipState {
    /// Group name.
    pub group: String,
    pub members: Members,
    #[serde(default, skip_serializing_if = "GroupDetails::is_empty")]
    pub details: GroupDetails,
}

impl MembershipState {
    pub fn single(group: impl Into<String>, member: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            members: Members::One(member.into()),
            details: GroupDetails::default(),
        }
    }

    pub fn set<I, S>(group: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            group: group.into(),
            members: Members::set(members),
            details: GroupDetails::default(),
        }
    }

    pub fn with_details(mut self, details: GroupDetails) -> Self {
        self.details = details;
        self
    }

    /// Check that the state has the shape `kind` expects.
    pub fn validate(&self, kind: ResourceKind) -> Result<()> {
        if self.group.trim().is_empty() {
            return Err(ReconcileError::InvalidState(
                "group name is required".to_string(),
            ));
        }

        match (&self.members, kind.is_single()) {
            (Members::One(name), true) => {
                if name.trim().is_empty() {
                    return Err(ReconcileError::InvalidState(
                        "member name is required".to_string(),
                    ));
                }
                if !self.details.is_empty() {
                    return Err(ReconcileError::InvalidState(format!(
                        "{} resources do not manage comments, color or tags",
                        kind
                    )));
                }
            }
            (Members::Set(names), false) => {
                if names.iter().any(|n| n.trim().is_empty()) {
                    return Err(ReconcileError::InvalidState(
                        "member names must not be empty".to_string(),
                    ));
                }
            }
            (Members::Set(_), true) => {
                return Err(ReconcileError::InvalidState(format!(
                    "{} resources take exactly one member",
                    kind
                )));
            }
            (Members::One(_), false) => {
                return Err(ReconcileError::InvalidState(
                    "member-set resources take a set of members".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Flags attached to every `set-group` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_warnings: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_errors: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in [
            ResourceKind::Member,
            ResourceKind::NetworkMember,
            ResourceKind::MemberSet,
        ] {
            assert_eq!(kind.to_string().parse::<ResourceKind>().unwrap(), kind);
        }
        assert!("group".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn test_network_member_accepts_only_network_objects() {
        assert!(ResourceKind::NetworkMember.accepts("host"));
        assert!(ResourceKind::NetworkMember.accepts("address-range"));
        assert!(!ResourceKind::NetworkMember.accepts("service-tcp"));
        assert!(ResourceKind::Member.accepts("service-tcp"));
    }

    #[test]
    fn test_validate_single_member() {
        assert!(MembershipState::single("G1", "M1").validate(ResourceKind::Member).is_ok());
        assert!(MembershipState::single("", "M1").validate(ResourceKind::Member).is_err());
        assert!(MembershipState::single("G1", " ").validate(ResourceKind::Member).is_err());
        assert!(
            MembershipState::set("G1", ["M1"])
                .validate(ResourceKind::NetworkMember)
                .is_err()
        );

        let with_tags = MembershipState::single("G1", "M1").with_details(GroupDetails {
            tags: BTreeSet::from(["prod".to_string()]),
            ..Default::default()
        });
        assert!(with_tags.validate(ResourceKind::Member).is_err());
    }

    #[test]
    fn test_validate_member_set() {
        assert!(MembershipState::set("G1", ["A", "B"]).validate(ResourceKind::MemberSet).is_ok());
        assert!(
            MembershipState::set("G1", Vec::<String>::new())
                .validate(ResourceKind::MemberSet)
                .is_ok()
        );
        assert!(MembershipState::set("G1", [""]).validate(ResourceKind::MemberSet).is_err());
        assert!(MembershipState::single("G1", "A").validate(ResourceKind::MemberSet).is_err());
    }

    #[test]
    fn test_state_json_shapes() {
        let single: MembershipState =
            serde_json::from_str(r#"{"group":"G1","members":"M1"}"#).unwrap();
        assert_eq!(single, MembershipState::single("G1", "M1"));

        let set: MembershipState =
            serde_json::from_str(r#"{"group":"G1","members":["B","A"]}"#).unwrap();
        assert_eq!(set.members.names().len(), 2);
    }
}
