// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// The operator name used as field manager
pub const OPERATOR_NAME: &str = "rawfile-localpv-operator";

/// Kubernetes label keys stamped on every managed resource
pub mod labels {
    /// Value is the application name of the operator that owns the resource
    pub const MANAGED_BY: &str = "app.kubernetes.io/managed-by";
    pub const PART_OF: &str = "app.kubernetes.io/part-of";
    pub const MANIFEST: &str = "rawfile-localpv.io/manifest";

    pub const PART_OF_VALUE: &str = "rawfile-localpv";
    pub const MANIFEST_VALUE: &str = "rawfile-local-pv";
}

/// Upstream names of the provisioner's resources
pub mod upstream {
    pub const DRIVER_NAME: &str = "rawfile.csi.openebs.io";
    pub const SERVICE_ACCOUNT: &str = "rawfile-csi-driver";
    pub const PROVISIONER_ROLE: &str = "rawfile-csi-provisioner";
    pub const RESIZER_ROLE: &str = "rawfile-csi-resizer";
    pub const NODE_DAEMONSET: &str = "rawfile-csi-node";
    pub const CONTROLLER_STATEFULSET: &str = "rawfile-csi-controller";

    pub const DEFAULT_IMAGE: &str = "ghcr.io/canonical/rawfile-localpv:0.8.2";
    pub const REGISTRAR_IMAGE: &str = "registry.k8s.io/sig-storage/csi-node-driver-registrar:v2.10.1";
    pub const PROVISIONER_IMAGE: &str = "registry.k8s.io/sig-storage/csi-provisioner:v4.0.1";
    pub const RESIZER_IMAGE: &str = "registry.k8s.io/sig-storage/csi-resizer:v1.10.1";

    pub const DEFAULT_KUBELET_ROOT: &str = "/var/lib/kubelet";
}

/// Keys of the inputs and status ConfigMaps
pub mod configmap {
    pub const CONFIG_KEY: &str = "config.yaml";
    pub const RELATION_KEY: &str = "relation.yaml";

    pub const STATUS_KEY: &str = "status";
    pub const MESSAGE_KEY: &str = "message";
    pub const REVISION_KEY: &str = "revision";
    pub const LAST_APPLIED_KEY: &str = "lastAppliedRevision";
    pub const VERSION_KEY: &str = "version";
    /// Set once every owned resource was removed; survives operator restarts
    pub const REMOVED_KEY: &str = "removed";
}

/// Relation data keys understood by the operator
pub mod relation {
    pub const KUBELET_ROOT_DIR: &str = "kubelet-root-dir";
}

/// Controller timing defaults
pub mod timing {
    /// Periodic resync interval in seconds
    pub const RESYNC_INTERVAL_SECS: u64 = 300;
    /// Delay before retrying a pass that ended blocked on a retryable failure
    pub const RETRY_INTERVAL_SECS: u64 = 30;
}
