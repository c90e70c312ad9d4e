//! Membership reconciler.
//!
//! One parameterized algorithm serves all three resource shapes. Single-member
//! resources resolve the member uid from the `set-group` response; member-set
//! resources track the whole member list of a group.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::{ReconcileError, Result};
use crate::ident::ResourceId;
use crate::payload::{GroupSnapshot, ListUpdate, MemberRef, SetGroupRequest};
use crate::state::{GroupDetails, Members, MembershipState, RequestOptions, ResourceKind};
use crate::store::{GroupStore, StoreError};

/// Result of a lifecycle operation that ends by reading remote state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The resource exists; persist `id` and `state`.
    Present {
        id: ResourceId,
        state: MembershipState,
    },
    /// The group is gone remotely; clear the stored identifier.
    Absent,
}

impl Outcome {
    pub fn id(&self) -> Option<&ResourceId> {
        match self {
            Outcome::Present { id, .. } => Some(id),
            Outcome::Absent => None,
        }
    }

    pub fn state(&self) -> Option<&MembershipState> {
        match self {
            Outcome::Present { state, .. } => Some(state),
            Outcome::Absent => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Outcome::Absent)
    }
}

/// Lifecycle calls issued by the host that manages declarative state.
#[async_trait]
pub trait ResourceLifecycle: Send + Sync {
    /// Make the desired relation exist remotely.
    async fn create(&self, desired: &MembershipState) -> Result<Outcome>;

    /// Refresh local state from the remote group.
    async fn read(&self, id: &ResourceId) -> Result<Outcome>;

    /// Move from `old` to `new`; may hand back a different identifier.
    async fn update(
        &self,
        id: &ResourceId,
        old: &MembershipState,
        new: &MembershipState,
    ) -> Result<Outcome>;

    /// Remove the relation. `state` is the last persisted local state.
    async fn delete(&self, id: &ResourceId, state: &MembershipState) -> Result<()>;

    /// Adopt an existing relation from its identifier string.
    async fn import(&self, raw_id: &str) -> Result<Outcome>;
}

/// Fields that differ between two states of the same kind.
///
/// An unset comment or color in the new state leaves the remote value alone.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Changes {
    group: bool,
    members: bool,
    comments: bool,
    color: bool,
    tags: bool,
}

impl Changes {
    fn between(old: &MembershipState, new: &MembershipState) -> Self {
        Self {
            group: old.group != new.group,
            members: old.members.names() != new.members.names(),
            comments: scalar_changed(&old.details.comments, &new.details.comments),
            color: scalar_changed(&old.details.color, &new.details.color),
            tags: old.details.tags != new.details.tags,
        }
    }

    fn is_empty(&self) -> bool {
        *self == Changes::default()
    }
}

fn scalar_changed(old: &Option<String>, new: &Option<String>) -> bool {
    new.is_some() && old != new
}

/// Reconciler for one resource kind over a [`GroupStore`].
pub struct MembershipReconciler<S> {
    store: S,
    kind: ResourceKind,
    options: RequestOptions,
}

impl<S: GroupStore> MembershipReconciler<S> {
    pub fn new(store: S, kind: ResourceKind) -> Self {
        Self {
            store,
            kind,
            options: RequestOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn check_id(&self, id: &ResourceId) -> Result<()> {
        if id.fits(self.kind) {
            Ok(())
        } else {
            Err(ReconcileError::InvalidIdentifier {
                id: id.to_string(),
                reason: format!("not an identifier of a {} resource", self.kind),
            })
        }
    }

    async fn set_group(
        &self,
        request: SetGroupRequest,
    ) -> std::result::Result<GroupSnapshot, StoreError> {
        let request = request.with_options(&self.options);
        debug!(request = ?request, "set-group");
        self.store.upsert_group(&request).await
    }

    /// Request that adds the desired members to the named group.
    fn create_request(&self, desired: &MembershipState) -> SetGroupRequest {
        let mut request = SetGroupRequest::by_name(desired.group.clone());
        match &desired.members {
            Members::One(name) => {
                request.members = Some(ListUpdate::Add {
                    add: vec![name.clone()],
                });
            }
            Members::Set(names) => {
                request.members = Some(ListUpdate::Replace(names.iter().cloned().collect()));
                if !desired.details.tags.is_empty() {
                    request.tags = Some(ListUpdate::Replace(
                        desired.details.tags.iter().cloned().collect(),
                    ));
                }
                request.comments = desired.details.comments.clone();
                request.color = desired.details.color.clone();
            }
        }
        request
    }

    /// Find the member the create call just added.
    ///
    /// The response lists every member of the group, so the match is by name.
    /// A member missing from the response stays in the group with no
    /// identifier pointing at it.
    fn resolve_new_member<'a>(
        &self,
        group: &'a GroupSnapshot,
        name: &str,
    ) -> Result<&'a MemberRef> {
        group
            .member_by_name(name)
            .ok_or_else(|| ReconcileError::AmbiguousOrMissingMember {
                group: group.name.clone(),
                member: name.to_string(),
            })
    }

    /// Identifier for a freshly added member, or an error once a member of
    /// the wrong type has been taken out of the group again.
    async fn accept_new_member(
        &self,
        group: &GroupSnapshot,
        member: &MemberRef,
    ) -> Result<ResourceId> {
        let Some(object_type) = member
            .object_type
            .as_deref()
            .filter(|t| !self.kind.accepts(t))
        else {
            return ResourceId::member(&group.uid, &member.uid);
        };

        warn!(
            group = %group.name,
            member = %member.name,
            object_type,
            "Added member is not a network object, removing it again"
        );
        if let Err(e) = self.remove_members(&group.uid, vec![member.uid.clone()]).await {
            warn!(error = %e, member = %member.name, "Failed to remove rejected member");
        }
        Err(ReconcileError::NotANetworkObject {
            member: member.name.clone(),
            object_type: object_type.to_string(),
        })
    }

    fn observed_state(&self, id: &ResourceId, group: &GroupSnapshot) -> MembershipState {
        match id {
            ResourceId::Member { member_uid, .. } => {
                // Empty when the member was removed from the group elsewhere.
                let member = group
                    .member_by_uid(member_uid)
                    .map(|m| m.name.clone())
                    .unwrap_or_default();
                MembershipState::single(group.name.clone(), member)
            }
            ResourceId::MemberSet { .. } => MembershipState {
                group: group.name.clone(),
                members: Members::Set(group.member_names()),
                details: GroupDetails::from(group),
            },
        }
    }

    /// Request carrying every member-set field that changed.
    fn member_set_update(
        &self,
        old: &MembershipState,
        new: &MembershipState,
        changes: Changes,
    ) -> SetGroupRequest {
        let mut request = SetGroupRequest::by_name(old.group.clone());
        if changes.group {
            request.new_name = Some(new.group.clone());
        }
        if changes.members {
            request.members = Some(ListUpdate::transition(
                &old.members.names(),
                &new.members.names(),
            ));
        }
        if changes.tags {
            request.tags = Some(ListUpdate::transition(&old.details.tags, &new.details.tags));
        }
        if changes.comments {
            request.comments = new.details.comments.clone();
        }
        if changes.color {
            request.color = new.details.color.clone();
        }
        request
    }

    async fn rename_group(
        &self,
        old_name: &str,
        new_name: &str,
    ) -> std::result::Result<GroupSnapshot, StoreError> {
        let mut request = SetGroupRequest::by_name(old_name);
        request.new_name = Some(new_name.to_string());
        self.set_group(request).await
    }

    async fn remove_members(
        &self,
        group_uid: &str,
        members: Vec<String>,
    ) -> std::result::Result<GroupSnapshot, StoreError> {
        let mut request = SetGroupRequest::by_uid(group_uid);
        request.members = Some(ListUpdate::Remove { remove: members });
        self.set_group(request).await
    }
}

#[async_trait]
impl<S: GroupStore> ResourceLifecycle for MembershipReconciler<S> {
    async fn create(&self, desired: &MembershipState) -> Result<Outcome> {
        desired.validate(self.kind)?;
        if desired.members.is_empty() {
            return Err(ReconcileError::InvalidState(
                "at least one member is required".to_string(),
            ));
        }
        info!(kind = %self.kind, group = %desired.group, "Creating group membership");

        let group = self.set_group(self.create_request(desired)).await?;

        let id = match &desired.members {
            Members::One(name) => {
                let member = self.resolve_new_member(&group, name)?;
                self.accept_new_member(&group, member).await?
            }
            Members::Set(_) => ResourceId::member_set(&group.uid)?,
        };
        info!(%id, group = %group.name, "Group membership created");

        match self.read(&id).await {
            Ok(Outcome::Absent) => {
                warn!(%id, "Group disappeared right after create");
                Ok(Outcome::Absent)
            }
            Ok(present) => Ok(present),
            Err(e) => Err(ReconcileError::ReadAfterCreate {
                id,
                source: Box::new(e),
            }),
        }
    }

    async fn read(&self, id: &ResourceId) -> Result<Outcome> {
        self.check_id(id)?;
        debug!(%id, "Reading group membership");

        let group = match self.store.fetch_group(id.group_uid()).await {
            Ok(group) => group,
            Err(e) if e.is_object_not_found() => {
                warn!(%id, "Group no longer exists, dropping resource from state");
                return Ok(Outcome::Absent);
            }
            Err(e) => return Err(e.into()),
        };

        let state = self.observed_state(id, &group);
        if state.members.is_empty() && self.kind.is_single() {
            warn!(%id, group = %group.name, "Member is no longer part of the group");
        }

        Ok(Outcome::Present {
            id: id.clone(),
            state,
        })
    }

    async fn update(
        &self,
        id: &ResourceId,
        old: &MembershipState,
        new: &MembershipState,
    ) -> Result<Outcome> {
        self.check_id(id)?;
        new.validate(self.kind)?;

        let changes = Changes::between(old, new);
        if changes.is_empty() {
            debug!(%id, "No membership changes, refreshing");
            return self.read(id).await;
        }
        info!(%id, changes = ?changes, "Updating group membership");

        match id {
            ResourceId::Member {
                group_uid,
                member_uid,
            } if changes.members => {
                // Replace the relation: rename the group so the create below
                // finds it, drop the old member, then add the new one.
                if changes.group {
                    self.rename_group(&old.group, &new.group).await?;
                }
                self.remove_members(group_uid, vec![member_uid.clone()]).await?;
                info!(%id, "Old membership removed, creating replacement");
                self.create(new).await
            }
            ResourceId::Member { .. } => {
                self.rename_group(&old.group, &new.group).await?;
                self.read(id).await
            }
            ResourceId::MemberSet { .. } => {
                self.set_group(self.member_set_update(old, new, changes)).await?;
                self.read(id).await
            }
        }
    }

    async fn delete(&self, id: &ResourceId, state: &MembershipState) -> Result<()> {
        self.check_id(id)?;

        let remove: Vec<String> = match id {
            ResourceId::Member { member_uid, .. } => vec![member_uid.clone()],
            ResourceId::MemberSet { .. } => state.members.names().into_iter().collect(),
        };
        if remove.is_empty() {
            info!(%id, "No members tracked, nothing to remove");
            return Ok(());
        }
        info!(%id, count = remove.len(), "Removing group membership");

        match self.remove_members(id.group_uid(), remove).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_object_not_found() => {
                info!(%id, "Group already gone, treating membership as deleted");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn import(&self, raw_id: &str) -> Result<Outcome> {
        let id = ResourceId::parse(raw_id, self.kind)?;
        info!(%id, kind = %self.kind, "Importing group membership");
        self.read(&id).await
    }
}

