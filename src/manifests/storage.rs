// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! CSIDriver registration and the StorageClass users bind claims to.

use super::object_meta;
use crate::types::{ApplyWave, ManagedObject, Owner, ResourceDescriptor};
use k8s_openapi::api::storage::v1::{CSIDriver, CSIDriverSpec, StorageClass};

pub fn csi_driver(owner: &Owner, driver_name: &str) -> ResourceDescriptor {
    let driver = CSIDriver {
        metadata: object_meta(owner, driver_name, None),
        spec: CSIDriverSpec {
            attach_required: Some(false),
            pod_info_on_mount: Some(true),
            storage_capacity: Some(true),
            volume_lifecycle_modes: Some(vec!["Persistent".to_string()]),
            ..Default::default()
        },
    };
    ResourceDescriptor::new(ManagedObject::CsiDriver(driver), ApplyWave::Identity)
}

pub fn storage_class(
    owner: &Owner,
    name: &str,
    driver_name: &str,
    reclaim_policy: &str,
) -> ResourceDescriptor {
    let class = StorageClass {
        metadata: object_meta(owner, name, None),
        provisioner: driver_name.to_string(),
        reclaim_policy: Some(reclaim_policy.to_string()),
        volume_binding_mode: Some("WaitForFirstConsumer".to_string()),
        allow_volume_expansion: Some(true),
        ..Default::default()
    };
    ResourceDescriptor::new(ManagedObject::StorageClass(class), ApplyWave::Identity)
}
