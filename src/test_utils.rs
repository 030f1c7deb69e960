// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Test utilities: a mock HTTP service for the kube client and an in-memory cluster.

use crate::error::ClientError;
use crate::kubernetes::ClusterClient;
use crate::types::{ObservedResource, ResourceDescriptor, ResourceId, ResourceKind};
use async_trait::async_trait;
use http::{Request, Response};
use kube::client::Body;
use kube::Client;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tower::Service;

/// A mock HTTP service that returns predefined responses based on request paths.
#[derive(Clone)]
pub struct MockService {
    responses: Arc<Mutex<HashMap<(String, String), (u16, String)>>>,
    requests: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockService {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn on(self, method: &str, path: &str, status: u16, body: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert((method.to_string(), path.to_string()), (status, body.to_string()));
        self
    }

    /// Add a response for GET requests matching the path
    pub fn on_get(self, path: &str, status: u16, body: &str) -> Self {
        self.on("GET", path, status, body)
    }

    pub fn on_post(self, path: &str, status: u16, body: &str) -> Self {
        self.on("POST", path, status, body)
    }

    pub fn on_patch(self, path: &str, status: u16, body: &str) -> Self {
        self.on("PATCH", path, status, body)
    }

    pub fn on_delete(self, path: &str, status: u16, body: &str) -> Self {
        self.on("DELETE", path, status, body)
    }

    /// Method and path of every request seen so far
    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().unwrap().clone()
    }

    /// Build a kube Client from this mock service
    pub fn into_client(self) -> Client {
        Client::new(self, "https://kubernetes.default.svc")
    }

    fn find_response(&self, method: &str, path: &str) -> Option<(u16, String)> {
        let responses = self.responses.lock().unwrap();

        if let Some(resp) = responses.get(&(method.to_string(), path.to_string())) {
            return Some(resp.clone());
        }

        // Prefix match for paths like /api/v1/namespaces/foo
        for ((m, p), resp) in responses.iter() {
            if m == method && path.starts_with(p) {
                return Some(resp.clone());
            }
        }

        None
    }
}

impl Default for MockService {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<Request<Body>> for MockService {
    type Response = Response<Body>;
    type Error = tower::BoxError;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let method = req.method().to_string();
        let path = req.uri().path().to_string();
        self.requests.lock().unwrap().push((method.clone(), path.clone()));

        let (status, body) = self
            .find_response(&method, &path)
            .unwrap_or_else(|| (404, not_found_json("resource", &path)));

        Box::pin(async move {
            Ok(Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(body.into_bytes()))
                .unwrap())
        })
    }
}

/// Create a 404 not found response
pub fn not_found_json(resource: &str, name: &str) -> String {
    status_json(404, "NotFound", &format!("{} \"{}\" not found", resource, name))
}

/// Create a failure Status response
pub fn status_json(code: u16, reason: &str, message: &str) -> String {
    json!({
        "kind": "Status",
        "apiVersion": "v1",
        "status": "Failure",
        "message": message,
        "reason": reason,
        "code": code
    })
    .to_string()
}

/// ConfigMap response body
pub fn configmap_json(namespace: &str, name: &str, data: &[(&str, &str)]) -> String {
    let data: BTreeMap<&str, &str> = data.iter().copied().collect();
    json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "resourceVersion": "1"
        },
        "data": data
    })
    .to_string()
}

/// Cluster API operations recorded by `FakeCluster`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Get,
    Create,
    Patch,
    Delete,
}

#[derive(Default)]
struct FakeState {
    objects: BTreeMap<ResourceId, Value>,
    next_version: u64,
    failures: Vec<(Op, ResourceId, ClientError, bool)>,
    calls: Vec<(Op, ResourceId)>,
    rollouts_paused: bool,
}

impl FakeState {
    fn bump(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }

    fn store(&mut self, id: ResourceId, mut body: Value) {
        let version = self.bump();
        if let Some(meta) = body.get_mut("metadata").and_then(Value::as_object_mut) {
            meta.insert("resourceVersion".to_string(), Value::String(version));
            meta.entry("uid")
                .or_insert_with(|| Value::String(format!("uid-{}", id.name)));
        }
        if !self.rollouts_paused {
            complete_rollout(&id, &mut body);
        }
        self.objects.insert(id, body);
    }

    fn injected(&mut self, op: Op, id: &ResourceId) -> Option<ClientError> {
        let pos = self
            .failures
            .iter()
            .position(|(o, i, _, _)| *o == op && i == id)?;
        let (_, _, err, sticky) = &self.failures[pos];
        let err = err.clone();
        if !sticky {
            self.failures.remove(pos);
        }
        Some(err)
    }

    fn namespace_exists(&self, id: &ResourceId) -> bool {
        match &id.namespace {
            Some(ns) => self
                .objects
                .contains_key(&ResourceId::cluster(ResourceKind::Namespace, ns)),
            None => true,
        }
    }

    fn current_version(&self, id: &ResourceId) -> Result<String, ClientError> {
        let obj = self
            .objects
            .get(id)
            .ok_or_else(|| ClientError::NotFound(id.to_string()))?;
        Ok(obj["metadata"]["resourceVersion"]
            .as_str()
            .unwrap_or_default()
            .to_string())
    }
}

/// Mark a stored workload as fully rolled out, as its controller would
fn complete_rollout(id: &ResourceId, body: &mut Value) {
    match id.kind {
        ResourceKind::DaemonSet => {
            body["status"] = json!({"desiredNumberScheduled": 1, "numberReady": 1, "updatedNumberScheduled": 1});
        }
        ResourceKind::StatefulSet => {
            let replicas = body["spec"]["replicas"].as_i64().unwrap_or(1);
            body["status"] = json!({"replicas": replicas, "readyReplicas": replicas, "updatedReplicas": replicas});
        }
        _ => {}
    }
}

/// RFC 7386 JSON merge patch
pub fn merge_patch(target: &mut Value, patch: &Value) {
    match patch {
        Value::Object(fields) => {
            if !target.is_object() {
                *target = Value::Object(Default::default());
            }
            if let Some(obj) = target.as_object_mut() {
                for (key, value) in fields {
                    if value.is_null() {
                        obj.remove(key);
                    } else {
                        merge_patch(obj.entry(key.clone()).or_insert(Value::Null), value);
                    }
                }
            }
        }
        other => *target = other.clone(),
    }
}

/// In-memory `ClusterClient` with resource versions, label selection and failure injection.
///
/// Seeded with the `default` and `kube-system` namespaces.
pub struct FakeCluster {
    state: Mutex<FakeState>,
}

impl FakeCluster {
    pub fn new() -> Self {
        let cluster = Self {
            state: Mutex::new(FakeState::default()),
        };
        cluster.add_namespace("default");
        cluster.add_namespace("kube-system");
        cluster
    }

    pub fn add_namespace(&self, name: &str) {
        let id = ResourceId::cluster(ResourceKind::Namespace, name);
        self.insert(&id, json!({"apiVersion": "v1", "kind": "Namespace", "metadata": {"name": name}}));
    }

    /// Store a raw object, assigning it a fresh resource version
    pub fn insert(&self, id: &ResourceId, body: Value) {
        self.state.lock().unwrap().store(id.clone(), body);
    }

    /// Store the manifest of a descriptor, as if created by an earlier pass
    pub fn insert_descriptor(&self, descriptor: &ResourceDescriptor) {
        self.insert(&descriptor.id, descriptor.manifest().unwrap());
    }

    pub fn object(&self, id: &ResourceId) -> Option<Value> {
        self.state.lock().unwrap().objects.get(id).cloned()
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.object(id).is_some()
    }

    /// Identities of every stored object of a kind
    pub fn ids(&self, kind: ResourceKind) -> Vec<ResourceId> {
        let state = self.state.lock().unwrap();
        state.objects.keys().filter(|id| id.kind == kind).cloned().collect()
    }

    /// Fail the next `op` on `id` with `err`
    pub fn fail_once(&self, op: Op, id: &ResourceId, err: ClientError) {
        self.state.lock().unwrap().failures.push((op, id.clone(), err, false));
    }

    /// Fail every `op` on `id` with `err`
    pub fn fail_always(&self, op: Op, id: &ResourceId, err: ClientError) {
        self.state.lock().unwrap().failures.push((op, id.clone(), err, true));
    }

    /// Stop workloads from becoming ready when they are stored
    pub fn pause_rollouts(&self) {
        self.state.lock().unwrap().rollouts_paused = true;
    }

    /// Mark a stored workload as rolled out
    pub fn finish_rollout(&self, id: &ResourceId) {
        let mut state = self.state.lock().unwrap();
        if let Some(body) = state.objects.get_mut(id) {
            complete_rollout(id, body);
        }
    }

    pub fn calls(&self) -> Vec<(Op, ResourceId)> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Recorded calls excluding reads
    pub fn mutations(&self) -> Vec<(Op, ResourceId)> {
        self.calls().into_iter().filter(|(op, _)| *op != Op::Get).collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    fn enter(&self, op: Op, id: &ResourceId) -> Result<std::sync::MutexGuard<'_, FakeState>, ClientError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push((op, id.clone()));
        match state.injected(op, id) {
            Some(err) => Err(err),
            None => Ok(state),
        }
    }
}

impl Default for FakeCluster {
    fn default() -> Self {
        Self::new()
    }
}

fn matches_selector(body: &Value, selector: &str) -> bool {
    let labels = &body["metadata"]["labels"];
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((key, value)) => labels[key].as_str() == Some(value),
            None => !labels[term].is_null(),
        })
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn get(&self, id: &ResourceId) -> Result<Option<ObservedResource>, ClientError> {
        let state = self.enter(Op::Get, id)?;
        Ok(state
            .objects
            .get(id)
            .map(|body| ObservedResource::from_value(id.clone(), body.clone())))
    }

    async fn list(&self, kind: ResourceKind, selector: &str) -> Result<Vec<ObservedResource>, ClientError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .objects
            .iter()
            .filter(|(id, body)| id.kind == kind && matches_selector(body, selector))
            .map(|(id, body)| ObservedResource::from_value(id.clone(), body.clone()))
            .collect())
    }

    async fn create(&self, descriptor: &ResourceDescriptor) -> Result<(), ClientError> {
        let id = &descriptor.id;
        let mut state = self.enter(Op::Create, id)?;
        if state.objects.contains_key(id) {
            return Err(ClientError::AlreadyExists(id.to_string()));
        }
        if !state.namespace_exists(id) {
            return Err(ClientError::NotFound(format!(
                "namespaces \"{}\" not found",
                id.namespace.clone().unwrap_or_default()
            )));
        }
        let mut body = descriptor.manifest()?;
        body["metadata"]["creationTimestamp"] = json!("2026-01-01T00:00:00Z");
        state.store(id.clone(), body);
        Ok(())
    }

    async fn patch(&self, id: &ResourceId, delta: &Value, expected_version: &str) -> Result<(), ClientError> {
        let mut state = self.enter(Op::Patch, id)?;
        let current = state.current_version(id)?;
        if !expected_version.is_empty() && current != expected_version {
            return Err(ClientError::Conflict(format!(
                "{} has resourceVersion {}, expected {}",
                id, current, expected_version
            )));
        }
        let mut body = state.objects.get(id).cloned().unwrap_or_default();
        merge_patch(&mut body, delta);
        state.store(id.clone(), body);
        Ok(())
    }

    async fn delete(&self, id: &ResourceId, expected_version: &str) -> Result<(), ClientError> {
        let mut state = self.enter(Op::Delete, id)?;
        let current = state.current_version(id)?;
        if !expected_version.is_empty() && current != expected_version {
            return Err(ClientError::Conflict(format!("{} was modified", id)));
        }
        state.objects.remove(id);
        Ok(())
    }

    async fn create_namespace(&self, name: &str) -> Result<(), ClientError> {
        let id = ResourceId::cluster(ResourceKind::Namespace, name);
        let mut state = self.enter(Op::Create, &id)?;
        if state.objects.contains_key(&id) {
            return Err(ClientError::AlreadyExists(id.to_string()));
        }
        state.store(
            id,
            json!({"apiVersion": "v1", "kind": "Namespace", "metadata": {"name": name}}),
        );
        Ok(())
    }
}
