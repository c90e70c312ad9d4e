//! Composite resource identifiers.
//!
//! The identifier is the only durable link between local state and the remote
//! objects. Its wire form is `<groupUid>/<memberUid>` for single-member
//! resources and `<groupUid>/network_object_members` for member-set resources.
//! The variant carries the resource shape, so the placeholder suffix never
//! leaks into code that needs a real member uid.

use std::fmt;

use crate::error::{ReconcileError, Result};
use crate::state::ResourceKind;

/// Separator between the identifier segments.
pub const SEPARATOR: char = '/';

/// Fixed second segment of member-set identifiers.
pub const MEMBER_SET_SUFFIX: &str = "network_object_members";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceId {
    /// One group/member relation.
    Member { group_uid: String, member_uid: String },
    /// The whole member set of a group.
    MemberSet { group_uid: String },
}

impl ResourceId {
    pub fn member(group_uid: &str, member_uid: &str) -> Result<Self> {
        check_segment(group_uid, "group uid")?;
        check_segment(member_uid, "member uid")?;
        if member_uid == MEMBER_SET_SUFFIX {
            return Err(ReconcileError::InvalidIdentifier {
                id: format!("{}{}{}", group_uid, SEPARATOR, member_uid),
                reason: "member uid collides with the member-set suffix".to_string(),
            });
        }
        Ok(ResourceId::Member {
            group_uid: group_uid.to_string(),
            member_uid: member_uid.to_string(),
        })
    }

    pub fn member_set(group_uid: &str) -> Result<Self> {
        check_segment(group_uid, "group uid")?;
        Ok(ResourceId::MemberSet {
            group_uid: group_uid.to_string(),
        })
    }

    /// Parse a stored or imported identifier for a resource of `kind`.
    pub fn parse(raw: &str, kind: ResourceKind) -> Result<Self> {
        let invalid = |reason: &str| ReconcileError::InvalidIdentifier {
            id: raw.to_string(),
            reason: reason.to_string(),
        };

        let (group_uid, rest) = raw
            .split_once(SEPARATOR)
            .ok_or_else(|| invalid("expected <group-uid>/<member-uid>"))?;
        if group_uid.is_empty() {
            return Err(invalid("empty group uid"));
        }
        if rest.is_empty() {
            return Err(invalid("empty member segment"));
        }
        if rest.contains(SEPARATOR) {
            return Err(invalid("more than one separator"));
        }

        match kind {
            ResourceKind::MemberSet if rest == MEMBER_SET_SUFFIX => Ok(ResourceId::MemberSet {
                group_uid: group_uid.to_string(),
            }),
            ResourceKind::MemberSet => Err(invalid("expected <group-uid>/network_object_members")),
            ResourceKind::Member | ResourceKind::NetworkMember if rest == MEMBER_SET_SUFFIX => {
                Err(invalid("identifier belongs to a member-set resource"))
            }
            ResourceKind::Member | ResourceKind::NetworkMember => Ok(ResourceId::Member {
                group_uid: group_uid.to_string(),
                member_uid: rest.to_string(),
            }),
        }
    }

    pub fn group_uid(&self) -> &str {
        match self {
            ResourceId::Member { group_uid, .. } | ResourceId::MemberSet { group_uid } => group_uid,
        }
    }

    /// Whether this identifier can belong to a resource of `kind`.
    pub fn fits(&self, kind: ResourceKind) -> bool {
        match self {
            ResourceId::Member { .. } => kind.is_single(),
            ResourceId::MemberSet { .. } => !kind.is_single(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceId::Member {
                group_uid,
                member_uid,
            } => write!(f, "{}{}{}", group_uid, SEPARATOR, member_uid),
            ResourceId::MemberSet { group_uid } => {
                write!(f, "{}{}{}", group_uid, SEPARATOR, MEMBER_SET_SUFFIX)
            }
        }
    }
}

fn check_segment(value: &str, what: &str) -> Result<()> {
    if value.is_empty() {
        return Err(ReconcileError::InvalidIdentifier {
            id: value.to_string(),
            reason: format!("empty {}", what),
        });
    }
    if value.contains(SEPARATOR) {
        return Err(ReconcileError::InvalidIdentifier {
            id: value.to_string(),
            reason: format!("{} must not contain '{}'", what, SEPARATOR),
        });
    }
    Ok(())
}
