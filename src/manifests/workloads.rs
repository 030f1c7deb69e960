// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Node plugin DaemonSet and controller plugin StatefulSet.

use super::object_meta;
use crate::constants::upstream;
use crate::types::{ApplyWave, ManagedObject, Owner, ResourceDescriptor};
use k8s_openapi::api::apps::v1::{DaemonSet, DaemonSetSpec, StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    Container, EmptyDirVolumeSource, EnvVar, EnvVarSource, HostPathVolumeSource, ObjectFieldSelector,
    PodSpec, PodTemplateSpec, SecurityContext, Toleration, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::ObjectMeta;
use std::collections::BTreeMap;

const CSI_SOCKET_DIR: &str = "/csi";
const CSI_ENDPOINT: &str = "unix:///csi/csi.sock";

/// Values the workloads are rendered from, already validated
pub struct WorkloadParams<'a> {
    pub namespace: &'a str,
    pub driver_name: &'a str,
    pub image: &'a str,
    pub storage_root: &'a str,
    pub kubelet_root: &'a str,
    pub node_selector: Option<BTreeMap<String, String>>,
}

/// Per-application plugin directory under the kubelet root
fn plugin_dir(kubelet_root: &str, app: &str) -> String {
    format!("{}/plugins/{}-rawfile-csi", kubelet_root, app)
}

fn selector_labels(owner: &Owner, component: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app.kubernetes.io/name".to_string(), "rawfile-csi".to_string()),
        ("app.kubernetes.io/instance".to_string(), owner.app().to_string()),
        ("component".to_string(), component.to_string()),
    ])
}

fn pod_template(owner: &Owner, component: &str, spec: PodSpec) -> PodTemplateSpec {
    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(selector_labels(owner, component)),
            ..Default::default()
        }),
        spec: Some(spec),
    }
}

fn env(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}

fn env_from_field(name: &str, field_path: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                field_path: field_path.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn mount(name: &str, path: &str) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: path.to_string(),
        ..Default::default()
    }
}

fn host_path(name: &str, path: &str, type_: &str) -> Volume {
    Volume {
        name: name.to_string(),
        host_path: Some(HostPathVolumeSource {
            path: path.to_string(),
            type_: Some(type_.to_string()),
        }),
        ..Default::default()
    }
}

fn args(values: &[&str]) -> Option<Vec<String>> {
    Some(values.iter().map(|a| a.to_string()).collect())
}

fn csi_driver_container(params: &WorkloadParams<'_>, arguments: &[&str], mounts: Vec<VolumeMount>) -> Container {
    Container {
        name: "csi-driver".to_string(),
        image: Some(params.image.to_string()),
        args: args(arguments),
        env: Some(vec![
            env("PROVISIONER_NAME", params.driver_name),
            env("CSI_ENDPOINT", CSI_ENDPOINT),
            env_from_field("NODE_ID", "spec.nodeName"),
        ]),
        security_context: Some(SecurityContext {
            privileged: Some(true),
            ..Default::default()
        }),
        volume_mounts: Some(mounts),
        ..Default::default()
    }
}

pub fn node_daemonset(owner: &Owner, params: &WorkloadParams<'_>) -> ResourceDescriptor {
    let plugin_dir = plugin_dir(params.kubelet_root, owner.app());
    let registration_socket = format!("{}/csi.sock", plugin_dir);

    let driver = csi_driver_container(
        params,
        &["csi-driver"],
        vec![
            mount("socket-dir", CSI_SOCKET_DIR),
            VolumeMount {
                mount_propagation: Some("Bidirectional".to_string()),
                ..mount("mountpoint-dir", params.kubelet_root)
            },
            mount("data-dir", "/data"),
        ],
    );

    let registrar = Container {
        name: "node-driver-registrar".to_string(),
        image: Some(upstream::REGISTRAR_IMAGE.to_string()),
        args: args(&[
            "--csi-address=$(ADDRESS)",
            "--kubelet-registration-path=$(DRIVER_REG_SOCK_PATH)",
            "--health-port=9809",
        ]),
        env: Some(vec![
            env("ADDRESS", "/csi/csi.sock"),
            env("DRIVER_REG_SOCK_PATH", &registration_socket),
        ]),
        volume_mounts: Some(vec![
            mount("socket-dir", CSI_SOCKET_DIR),
            mount("registration-dir", "/registration"),
        ]),
        ..Default::default()
    };

    let pod_spec = PodSpec {
        service_account_name: Some(upstream::SERVICE_ACCOUNT.to_string()),
        priority_class_name: Some("system-node-critical".to_string()),
        node_selector: params.node_selector.clone(),
        tolerations: Some(vec![Toleration {
            operator: Some("Exists".to_string()),
            ..Default::default()
        }]),
        containers: vec![driver, registrar],
        volumes: Some(vec![
            host_path(
                "registration-dir",
                &format!("{}/plugins_registry", params.kubelet_root),
                "Directory",
            ),
            host_path("socket-dir", &plugin_dir, "DirectoryOrCreate"),
            host_path("mountpoint-dir", params.kubelet_root, "DirectoryOrCreate"),
            host_path("data-dir", params.storage_root, "DirectoryOrCreate"),
        ]),
        ..Default::default()
    };

    let daemonset = DaemonSet {
        metadata: object_meta(owner, upstream::NODE_DAEMONSET, Some(params.namespace)),
        spec: Some(DaemonSetSpec {
            selector: LabelSelector {
                match_labels: Some(selector_labels(owner, "node")),
                ..Default::default()
            },
            template: pod_template(owner, "node", pod_spec),
            ..Default::default()
        }),
        ..Default::default()
    };
    ResourceDescriptor::new(ManagedObject::DaemonSet(daemonset), ApplyWave::Workload)
}

pub fn controller_statefulset(owner: &Owner, params: &WorkloadParams<'_>) -> ResourceDescriptor {
    let driver = csi_driver_container(
        params,
        &["csi-driver", "--disable-metrics"],
        vec![mount("socket-dir", CSI_SOCKET_DIR)],
    );

    let sidecar = |name: &str, image: &str, extra: &[&str]| Container {
        name: name.to_string(),
        image: Some(image.to_string()),
        args: Some(
            std::iter::once("--csi-address=$(ADDRESS)")
                .chain(extra.iter().copied())
                .map(|a| a.to_string())
                .collect(),
        ),
        env: Some(vec![env("ADDRESS", "/csi/csi.sock")]),
        volume_mounts: Some(vec![mount("socket-dir", CSI_SOCKET_DIR)]),
        ..Default::default()
    };

    let pod_spec = PodSpec {
        service_account_name: Some(upstream::SERVICE_ACCOUNT.to_string()),
        priority_class_name: Some("system-cluster-critical".to_string()),
        containers: vec![
            driver,
            sidecar(
                "external-provisioner",
                upstream::PROVISIONER_IMAGE,
                &["--feature-gates=Topology=true", "--strict-topology", "--timeout=120s"],
            ),
            sidecar(
                "external-resizer",
                upstream::RESIZER_IMAGE,
                &["--handle-volume-inuse-error=false"],
            ),
        ],
        volumes: Some(vec![Volume {
            name: "socket-dir".to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        }]),
        ..Default::default()
    };

    let statefulset = StatefulSet {
        metadata: object_meta(owner, upstream::CONTROLLER_STATEFULSET, Some(params.namespace)),
        spec: Some(StatefulSetSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(selector_labels(owner, "controller")),
                ..Default::default()
            },
            template: pod_template(owner, "controller", pod_spec),
            ..Default::default()
        }),
        ..Default::default()
    };
    ResourceDescriptor::new(ManagedObject::StatefulSet(statefulset), ApplyWave::Workload)
}
