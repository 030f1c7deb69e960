// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Domain types: operator inputs and resource identities.

pub mod options;
pub mod relation;
pub mod resource;

pub use options::Options;
pub use relation::RelationData;
pub use resource::{
    ApplyWave, ManagedObject, ObservedResource, Owner, ResourceDescriptor, ResourceId, ResourceKind,
};
