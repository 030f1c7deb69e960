// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes adapters: cluster client, inputs, status and watchers.

pub mod client;
pub mod inputs;
pub mod status;
pub mod watch;

pub use client::{ClusterClient, KubeClusterClient};
pub use inputs::ConfigMapInputSource;
pub use status::ConfigMapStatusSink;
pub use watch::{InputsWatcher, ResourceWatcher};
