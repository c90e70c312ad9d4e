//! Group membership reconciliation for a firewall management web API.
//!
//! A membership resource links a group to one member object (by name or as a
//! network object) or to a whole set of members. The [`MembershipReconciler`]
//! converges the remote group towards the desired local state and derives the
//! composite identifier that ties the two together.

pub mod client;
pub mod error;
pub mod ident;
pub mod memory;
pub mod payload;
pub mod reconciler;
pub mod state;
pub mod store;

pub use client::{ClientConfig, MgmtClient};
pub use error::{ReconcileError, Result};
pub use ident::ResourceId;
pub use memory::MemoryGroupStore;
pub use reconciler::{MembershipReconciler, Outcome, ResourceLifecycle};
pub use state::{GroupDetails, Members, MembershipState, RequestOptions, ResourceKind};
pub use store::{GroupStore, StoreError};
