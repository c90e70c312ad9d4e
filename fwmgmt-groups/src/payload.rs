//! Typed request and response bodies for the group commands.
//!
//! Responses are decoded with serde; a missing or mistyped `uid`/`name` fails
//! the decode instead of surfacing later as a bad field value.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::state::RequestOptions;

// =============================================================================
// Requests
// =============================================================================

/// Change to a list-valued field (`members`, `tags`).
///
/// The API has no "set to empty" primitive: clearing a list is expressed as a
/// removal of every previously held value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ListUpdate {
    Replace(Vec<String>),
    Add { add: Vec<String> },
    Remove { remove: Vec<String> },
}

impl ListUpdate {
    /// Update that turns `old` into `new`.
    pub fn transition(old: &BTreeSet<String>, new: &BTreeSet<String>) -> Self {
        if new.is_empty() {
            ListUpdate::Remove {
                remove: old.iter().cloned().collect(),
            }
        } else {
            ListUpdate::Replace(new.iter().cloned().collect())
        }
    }
}

/// Body of `set-group`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SetGroupRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub members: Option<ListUpdate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<ListUpdate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore_warnings: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore_errors: Option<bool>,
}

impl SetGroupRequest {
    /// Request addressing the group by uid.
    pub fn by_uid(uid: impl Into<String>) -> Self {
        Self {
            uid: Some(uid.into()),
            ..Default::default()
        }
    }

    /// Request addressing the group by name.
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_options(mut self, options: &RequestOptions) -> Self {
        self.ignore_warnings = options.ignore_warnings;
        self.ignore_errors = options.ignore_errors;
        self
    }
}

/// Body of `show-group`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowGroupRequest {
    pub uid: String,
}

/// Body of `delete-group`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteGroupRequest {
    pub uid: String,
}

// =============================================================================
// Responses
// =============================================================================

/// Reference to a group member as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRef {
    pub uid: String,
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
}

/// Tag attached to a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRef {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
    pub name: String,
}

/// Full group object as returned by `set-group` and `show-group`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSnapshot {
    pub uid: String,
    pub name: String,
    #[serde(default)]
    pub members: Vec<MemberRef>,
    #[serde(default)]
    pub tags: Vec<TagRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl GroupSnapshot {
    pub fn member_by_name(&self, name: &str) -> Option<&MemberRef> {
        self.members.iter().find(|m| m.name == name)
    }

    pub fn member_by_uid(&self, uid: &str) -> Option<&MemberRef> {
        self.members.iter().find(|m| m.uid == uid)
    }

    pub fn member_names(&self) -> BTreeSet<String> {
        self.members.iter().map(|m| m.name.clone()).collect()
    }

    pub fn tag_names(&self) -> BTreeSet<String> {
        self.tags.iter().map(|t| t.name.clone()).collect()
    }
}

/// Error body returned alongside a non-success status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiFailure {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
}
