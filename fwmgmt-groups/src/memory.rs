//! In-memory group store.
//!
//! Mirrors the `set-group` / `show-group` / `delete-group` semantics of the
//! management API closely enough to drive the reconciler without a server.
//! Every call is recorded, and failures can be queued for the next call.

use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::payload::{GroupSnapshot, ListUpdate, MemberRef, SetGroupRequest, TagRef};
use crate::store::{GroupStore, StoreError};

/// A call received by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    SetGroup(SetGroupRequest),
    ShowGroup(String),
    DeleteGroup(String),
}

impl StoreCall {
    pub fn is_mutating(&self) -> bool {
        !matches!(self, StoreCall::ShowGroup(_))
    }
}

#[derive(Default)]
struct Inner {
    /// Objects that can be referenced as members.
    objects: Vec<MemberRef>,
    groups: BTreeMap<String, GroupSnapshot>,
    calls: Vec<StoreCall>,
    failures: VecDeque<StoreError>,
}

impl Inner {
    fn resolve_object(&self, key: &str) -> Option<MemberRef> {
        self.objects
            .iter()
            .find(|o| o.name == key || o.uid == key)
            .cloned()
    }

    fn find_group(&self, request: &SetGroupRequest) -> Result<String, StoreError> {
        let found = match (&request.uid, &request.name) {
            (Some(uid), _) => self.groups.get(uid).map(|g| g.uid.clone()),
            (None, Some(name)) => self
                .groups
                .values()
                .find(|g| &g.name == name)
                .map(|g| g.uid.clone()),
            (None, None) => {
                return Err(StoreError::Rejected {
                    code: Some("generic_err_missing_required_parameters".to_string()),
                    message: "Missing parameter: [uid or name]".to_string(),
                });
            }
        };
        let key = request.uid.as_deref().or(request.name.as_deref()).unwrap_or_default();
        found.ok_or_else(|| StoreError::not_found(format!("Requested object [{}] not found", key)))
    }

    fn apply_members(&self, group: &mut GroupSnapshot, update: &ListUpdate) -> Result<(), StoreError> {
        let resolve = |key: &String| {
            self.resolve_object(key).ok_or_else(|| StoreError::Rejected {
                code: Some("generic_err_invalid_parameter".to_string()),
                message: format!("Requested object [{}] not found", key),
            })
        };

        match update {
            ListUpdate::Replace(keys) => {
                let mut members = Vec::new();
                for key in keys {
                    let member = resolve(key)?;
                    if !members.iter().any(|m: &MemberRef| m.uid == member.uid) {
                        members.push(member);
                    }
                }
                group.members = members;
            }
            ListUpdate::Add { add } => {
                for key in add {
                    let member = resolve(key)?;
                    if group.member_by_uid(&member.uid).is_none() {
                        group.members.push(member);
                    }
                }
            }
            ListUpdate::Remove { remove } => {
                group
                    .members
                    .retain(|m| !remove.iter().any(|key| *key == m.name || *key == m.uid));
            }
        }
        Ok(())
    }

    fn set_group(&mut self, request: &SetGroupRequest) -> Result<GroupSnapshot, StoreError> {
        let uid = self.find_group(request)?;
        let mut group = self
            .groups
            .get(&uid)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("Requested object [{}] not found", uid)))?;

        if let Some(new_name) = &request.new_name {
            if self.groups.values().any(|g| g.uid != uid && &g.name == new_name) {
                return Err(StoreError::Rejected {
                    code: Some("err_validation_failed".to_string()),
                    message: format!("More than one object named '{}' exists.", new_name),
                });
            }
            group.name = new_name.clone();
        }
        if let Some(update) = &request.members {
            self.apply_members(&mut group, update)?;
        }
        if let Some(update) = &request.tags {
            apply_tags(&mut group, update);
        }
        if let Some(comments) = &request.comments {
            group.comments = Some(comments.clone());
        }
        if let Some(color) = &request.color {
            group.color = Some(color.clone());
        }

        self.groups.insert(uid, group.clone());
        Ok(group)
    }
}

fn apply_tags(group: &mut GroupSnapshot, update: &ListUpdate) {
    let tag = |name: &String| TagRef {
        uid: String::new(),
        name: name.clone(),
    };
    match update {
        ListUpdate::Replace(names) => {
            group.tags = names.iter().map(tag).collect();
        }
        ListUpdate::Add { add } => {
            for name in add {
                if !group.tags.iter().any(|t| &t.name == name) {
                    group.tags.push(tag(name));
                }
            }
        }
        ListUpdate::Remove { remove } => {
            group.tags.retain(|t| !remove.contains(&t.name));
        }
    }
}

/// In-memory [`GroupStore`].
#[derive(Default)]
pub struct MemoryGroupStore {
    inner: Mutex<Inner>,
}

impl MemoryGroupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an object that groups may reference.
    pub async fn add_object(&self, uid: &str, name: &str, object_type: Option<&str>) {
        let mut inner = self.inner.lock().await;
        inner.objects.push(MemberRef {
            uid: uid.to_string(),
            name: name.to_string(),
            object_type: object_type.map(str::to_string),
        });
    }

    /// Create a group holding the named objects.
    pub async fn add_group(&self, uid: &str, name: &str, members: &[&str]) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let mut group = GroupSnapshot {
            uid: uid.to_string(),
            name: name.to_string(),
            members: Vec::new(),
            tags: Vec::new(),
            comments: None,
            color: None,
        };
        let keys = members.iter().map(|m| m.to_string()).collect();
        inner.apply_members(&mut group, &ListUpdate::Replace(keys))?;
        inner.groups.insert(uid.to_string(), group);
        Ok(())
    }

    pub async fn group(&self, uid: &str) -> Option<GroupSnapshot> {
        self.inner.lock().await.groups.get(uid).cloned()
    }

    /// Every call received so far, oldest first.
    pub async fn calls(&self) -> Vec<StoreCall> {
        self.inner.lock().await.calls.clone()
    }

    pub async fn mutating_calls(&self) -> Vec<StoreCall> {
        self.calls().await.into_iter().filter(StoreCall::is_mutating).collect()
    }

    pub async fn clear_calls(&self) {
        self.inner.lock().await.calls.clear();
    }

    /// Make the next call fail with `err` without touching any group.
    pub async fn fail_next(&self, err: StoreError) {
        self.inner.lock().await.failures.push_back(err);
    }
}

#[async_trait]
impl GroupStore for MemoryGroupStore {
    async fn upsert_group(&self, request: &SetGroupRequest) -> Result<GroupSnapshot, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.calls.push(StoreCall::SetGroup(request.clone()));
        if let Some(err) = inner.failures.pop_front() {
            return Err(err);
        }
        inner.set_group(request)
    }

    async fn fetch_group(&self, uid: &str) -> Result<GroupSnapshot, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.calls.push(StoreCall::ShowGroup(uid.to_string()));
        if let Some(err) = inner.failures.pop_front() {
            return Err(err);
        }
        inner
            .groups
            .get(uid)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("Requested object [{}] not found", uid)))
    }

    async fn delete_group(&self, uid: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.calls.push(StoreCall::DeleteGroup(uid.to_string()));
        if let Some(err) = inner.failures.pop_front() {
            return Err(err);
        }
        inner
            .groups
            .remove(uid)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(format!("Requested object [{}] not found", uid)))
    }
}
