// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! The reconciliation pass: gather, plan, observe, diff, apply, resolve.

use super::comparator::{diff, Action};
use super::rollout::{self, short_version};
use super::status::{ReconciliationOutcome, Status, StatusReporter};
use crate::error::{ClientError, OperatorError, Result};
use crate::kubernetes::ClusterClient;
use crate::manifests::{build_desired_state, DesiredState};
use crate::types::{
    ApplyWave, ObservedResource, Options, Owner, RelationData, ResourceId, ResourceKind,
};
use async_trait::async_trait;
use futures::future::join_all;
#[cfg(test)]
use mockall::automock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Why a pass was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    ConfigChanged,
    RelationChanged,
    Upgrade,
    PeriodicResync,
    ResourceChangedExternally,
    LeadershipChanged,
    /// The application is being removed; tear everything down
    Remove,
}

impl Trigger {
    /// Triggers not caused by an input change
    pub fn is_automatic(&self) -> bool {
        matches!(self, Trigger::PeriodicResync | Trigger::ResourceChangedExternally)
    }
}

/// Current operator inputs
#[cfg_attr(test, automock)]
#[async_trait]
pub trait InputSource: Send + Sync {
    async fn configuration(&self) -> Result<Options>;
    async fn relation_data(&self) -> Result<RelationData>;
}

/// Action computed for one identity, with the token it was computed against
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedAction {
    pub id: ResourceId,
    pub wave: ApplyWave,
    pub action: Action,
    pub resource_version: String,
}

#[derive(Debug, Clone)]
pub struct PassReport {
    pub trigger: Trigger,
    pub outcome: ReconciliationOutcome,
    pub plan: Vec<PlannedAction>,
}

#[derive(Debug, Clone)]
pub enum PassResult {
    Completed(PassReport),
    /// Abandoned before any mutation because a newer trigger is pending
    Superseded,
    /// Not run: the previous pass failed permanently for the same revision
    Held(ReconciliationOutcome),
}

/// Fetch every desired identity and every identity carrying the owner label
pub(crate) async fn observe(
    client: &dyn ClusterClient,
    owner: &Owner,
    desired: &DesiredState,
) -> std::result::Result<BTreeMap<ResourceId, ObservedResource>, ClientError> {
    let selector = owner.selector();
    let gets = join_all(desired.descriptors().map(|d| client.get(&d.id)));
    let lists = join_all(ResourceKind::MANAGED.iter().map(|kind| client.list(*kind, &selector)));
    let (gets, lists) = futures::join!(gets, lists);

    let mut observed = BTreeMap::new();
    for listed in lists {
        for resource in listed? {
            observed.insert(resource.id.clone(), resource);
        }
    }
    for resource in gets.into_iter().collect::<std::result::Result<Vec<_>, _>>()?.into_iter().flatten() {
        observed.insert(resource.id.clone(), resource);
    }
    Ok(observed)
}

/// Compute the action for every desired or observed identity
pub(crate) fn plan_actions(
    owner: &Owner,
    desired: &DesiredState,
    observed: &BTreeMap<ResourceId, ObservedResource>,
) -> Result<Vec<PlannedAction>> {
    let mut ids: Vec<&ResourceId> = desired.descriptors().map(|d| &d.id).collect();
    ids.extend(observed.keys().filter(|id| !desired.contains(id)));

    ids.into_iter()
        .map(|id| -> Result<PlannedAction> {
            let current = observed.get(id);
            let wanted = desired.get(id);
            Ok(PlannedAction {
                id: id.clone(),
                wave: wanted.map_or(id.kind.default_wave(), |d| d.wave),
                action: diff(current, wanted, owner)?,
                resource_version: current.map(|o| o.resource_version.clone()).unwrap_or_default(),
            })
        })
        .collect()
}

/// Issue one planned mutation
async fn execute(
    client: &dyn ClusterClient,
    desired: &DesiredState,
    planned: &PlannedAction,
) -> std::result::Result<(), ClientError> {
    match &planned.action {
        Action::Create => match desired.get(&planned.id) {
            Some(descriptor) => client.create(descriptor).await,
            None => Ok(()),
        },
        Action::Patch { fields, delta } => {
            debug!("Patching {} fields: {}", planned.id, fields.join(", "));
            client.patch(&planned.id, delta, &planned.resource_version).await
        }
        Action::Delete => client.delete(&planned.id, &planned.resource_version).await,
        Action::NoOp | Action::Collision => Ok(()),
    }
}

/// Run the actions of each wave concurrently, in the given wave order, stopping at the first failing wave
pub(crate) async fn apply_waves<I>(
    client: &dyn ClusterClient,
    desired: &DesiredState,
    actions: &[&PlannedAction],
    waves: I,
) -> Vec<(ResourceId, ClientError)>
where
    I: IntoIterator<Item = ApplyWave>,
{
    for wave in waves {
        let batch: Vec<&PlannedAction> = actions.iter().copied().filter(|p| p.wave == wave).collect();
        if batch.is_empty() {
            continue;
        }
        debug!("Applying {} action(s) in wave {:?}", batch.len(), wave);

        let results = join_all(batch.iter().map(|p| execute(client, desired, p))).await;
        let failures: Vec<(ResourceId, ClientError)> = batch
            .iter()
            .zip(results)
            .filter_map(|(p, r)| r.err().map(|e| (p.id.clone(), e)))
            .collect();

        for (id, err) in &failures {
            warn!("Failed to {} {}: {}", action_verb(actions, id), id, err);
        }
        if !failures.is_empty() {
            return failures;
        }
        for p in &batch {
            info!("{} {}", past_tense(&p.action), p.id);
        }
    }
    Vec::new()
}

fn action_verb(actions: &[&PlannedAction], id: &ResourceId) -> &'static str {
    actions
        .iter()
        .find(|p| &p.id == id)
        .map_or("apply", |p| p.action.name())
}

fn past_tense(action: &Action) -> &'static str {
    match action {
        Action::Create => "Created",
        Action::Patch { .. } => "Patched",
        Action::Delete => "Deleted",
        _ => "Unchanged",
    }
}

fn describe_failures(failures: &[(ResourceId, ClientError)]) -> String {
    failures
        .iter()
        .map(|(id, err)| format!("{}: {}", id, err))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Map apply failures to a terminal outcome
fn resolve_failures(failures: &[(ResourceId, ClientError)]) -> ReconciliationOutcome {
    let rejected: Vec<(ResourceId, ClientError)> = failures
        .iter()
        .filter(|(_, e)| !e.is_retryable())
        .cloned()
        .collect();

    if !rejected.is_empty() {
        ReconciliationOutcome::error(format!(
            "Failed to apply {}",
            describe_failures(&rejected)
        ))
    } else {
        ReconciliationOutcome::blocked(
            format!(
                "Failed to apply {} resource(s), will retry: {}",
                failures.len(),
                describe_failures(failures)
            ),
            true,
        )
    }
}

/// Drives the cluster towards the desired state, one serialized pass at a time
pub struct Reconciler {
    client: Arc<dyn ClusterClient>,
    inputs: Arc<dyn InputSource>,
    reporter: StatusReporter,
    owner: Owner,
    last_outcome: Option<ReconciliationOutcome>,
    last_applied: Option<String>,
}

impl Reconciler {
    pub fn new(
        client: Arc<dyn ClusterClient>,
        inputs: Arc<dyn InputSource>,
        reporter: StatusReporter,
        owner: Owner,
    ) -> Self {
        Self {
            client,
            inputs,
            reporter,
            owner,
            last_outcome: None,
            last_applied: None,
        }
    }

    pub fn last_outcome(&self) -> Option<&ReconciliationOutcome> {
        self.last_outcome.as_ref()
    }

    /// Read inputs and build the desired state
    async fn plan(&self) -> Result<(Options, DesiredState)> {
        let options = self.inputs.configuration().await?;
        let relation = self.inputs.relation_data().await?;
        let desired = build_desired_state(&self.owner, &options, &relation)?;
        Ok((options, desired))
    }

    /// Run one pass. `superseded` is polled once, right before the first mutation.
    #[instrument(skip(self, superseded), fields(app = %self.owner.app()))]
    pub async fn run_pass(
        &mut self,
        trigger: Trigger,
        superseded: &(dyn Fn() -> bool + Send + Sync),
    ) -> PassResult {
        info!("Starting reconciliation pass");
        let result = self.pass(trigger, superseded).await;

        match &result {
            PassResult::Completed(report) => {
                if report.outcome.last_applied_revision.is_some() {
                    self.last_applied = report.outcome.last_applied_revision.clone();
                }
                self.reporter.report(&report.outcome).await;
                self.last_outcome = Some(report.outcome.clone());
            }
            PassResult::Superseded => info!("Pass superseded by a newer trigger"),
            PassResult::Held(outcome) => {
                debug!("Holding previous outcome until inputs change: {}", outcome)
            }
        }
        result
    }

    async fn pass(
        &self,
        trigger: Trigger,
        superseded: &(dyn Fn() -> bool + Send + Sync),
    ) -> PassResult {
        let completed = |outcome: ReconciliationOutcome, plan: Vec<PlannedAction>| {
            PassResult::Completed(PassReport {
                trigger,
                outcome,
                plan,
            })
        };

        let (options, desired) = match self.plan().await {
            Ok(planned) => planned,
            Err(e) => {
                let outcome = ReconciliationOutcome::blocked(e.to_string(), e.is_retryable())
                    .with_last_applied(self.last_applied.clone());
                return completed(outcome, Vec::new());
            }
        };
        let revision = desired.revision().to_string();
        let finish = |outcome: ReconciliationOutcome| {
            outcome
                .with_revision(&revision)
                .with_last_applied(self.last_applied.clone())
        };

        if let Some(previous) = &self.last_outcome {
            if previous.status == Status::Error
                && previous.revision.as_deref() == Some(revision.as_str())
                && trigger.is_automatic()
            {
                return PassResult::Held(previous.clone());
            }
        }

        // Namespace validity was checked while planning
        let namespace = options.namespace.as_str();
        let namespace_id = ResourceId::cluster(ResourceKind::Namespace, namespace);
        let (observed, namespace_state) = futures::join!(
            observe(self.client.as_ref(), &self.owner, &desired),
            self.client.get(&namespace_id)
        );
        let (observed, namespace_present) = match (observed, namespace_state) {
            (Ok(observed), Ok(ns)) => (observed, ns.is_some()),
            (Err(e), _) | (_, Err(e)) => {
                let outcome = ReconciliationOutcome::blocked(
                    format!("Unable to read cluster state: {}", e),
                    e.is_retryable(),
                );
                return completed(finish(outcome), Vec::new());
            }
        };

        let plan = match plan_actions(&self.owner, &desired, &observed) {
            Ok(plan) => plan,
            Err(e) => return completed(finish(ReconciliationOutcome::error(e.to_string())), Vec::new()),
        };

        let collisions: Vec<String> = plan
            .iter()
            .filter(|p| p.action == Action::Collision)
            .map(|p| p.id.to_string())
            .collect();
        if !collisions.is_empty() {
            let outcome = ReconciliationOutcome::blocked(
                format!(
                    "{} Kubernetes resource collision(s): {}",
                    collisions.len(),
                    collisions.join(", ")
                ),
                false,
            );
            return completed(finish(outcome), plan);
        }

        if !namespace_present && !options.create_namespace {
            let outcome =
                ReconciliationOutcome::blocked(format!("Missing namespace '{}'", namespace), false);
            return completed(finish(outcome), plan);
        }

        let mutating = !namespace_present || plan.iter().any(|p| p.action.is_mutation());
        if mutating && superseded() {
            return PassResult::Superseded;
        }

        let failures = self.apply(&desired, &plan, namespace, !namespace_present).await;
        if !failures.is_empty() {
            return completed(finish(resolve_failures(&failures)), plan);
        }

        let applied = Some(revision.clone());
        let outcome = match rollout::workloads(self.client.as_ref(), &desired).await {
            Ok(workloads) => {
                let pending: Vec<String> = workloads
                    .iter()
                    .filter_map(|w| w.pending.as_ref().map(|reason| format!("{} {}", w.id, reason)))
                    .collect();
                if pending.is_empty() {
                    ReconciliationOutcome::ready(&revision).with_version(short_version(options.image.trim()))
                } else {
                    ReconciliationOutcome::blocked(format!("Waiting for {}", pending.join(", ")), true)
                        .with_revision(&revision)
                        .with_last_applied(applied)
                }
            }
            Err(e) => ReconciliationOutcome::blocked(
                format!("Unable to read workload status: {}", e),
                e.is_retryable(),
            )
            .with_revision(&revision)
            .with_last_applied(applied),
        };
        completed(outcome, plan)
    }

    /// Create the namespace if needed, then creates and patches per wave, then deletes
    async fn apply(
        &self,
        desired: &DesiredState,
        plan: &[PlannedAction],
        namespace: &str,
        create_namespace: bool,
    ) -> Vec<(ResourceId, ClientError)> {
        let client = self.client.as_ref();

        if create_namespace {
            match client.create_namespace(namespace).await {
                Ok(()) => info!("Created namespace {}", namespace),
                Err(ClientError::AlreadyExists(_)) => debug!("Namespace {} already exists", namespace),
                Err(e) => {
                    warn!("Failed to create namespace {}: {}", namespace, e);
                    return vec![(ResourceId::cluster(ResourceKind::Namespace, namespace), e)];
                }
            }
        }

        let upserts: Vec<&PlannedAction> = plan
            .iter()
            .filter(|p| matches!(p.action, Action::Create | Action::Patch { .. }))
            .collect();
        let failures = apply_waves(client, desired, &upserts, ApplyWave::ORDER).await;
        if !failures.is_empty() {
            return failures;
        }

        let deletes: Vec<&PlannedAction> = plan.iter().filter(|p| p.action == Action::Delete).collect();
        apply_waves(client, desired, &deletes, ApplyWave::ORDER.into_iter().rev()).await
    }

    /// Delete every owned resource and stop managing the provisioner
    #[instrument(skip(self), fields(app = %self.owner.app()))]
    pub async fn run_teardown(&mut self) -> ReconciliationOutcome {
        info!("Removing all managed resources");
        let outcome = match self.teardown().await {
            Ok(()) => ReconciliationOutcome::removed(),
            Err(e) => ReconciliationOutcome::blocked(
                format!("Failed to remove Kubernetes resources: {}", e),
                e.is_retryable(),
            ),
        };
        self.reporter.report(&outcome).await;
        self.last_outcome = Some(outcome.clone());
        outcome
    }

    async fn teardown(&self) -> Result<()> {
        let client = self.client.as_ref();
        let selector = self.owner.selector();
        let lists = join_all(ResourceKind::MANAGED.iter().map(|kind| client.list(*kind, &selector))).await;

        let mut plan = Vec::new();
        for listed in lists {
            for resource in listed? {
                plan.push(PlannedAction {
                    wave: resource.id.kind.default_wave(),
                    id: resource.id.clone(),
                    action: Action::Delete,
                    resource_version: resource.resource_version.clone(),
                });
            }
        }

        let empty = DesiredState::default();
        let deletes: Vec<&PlannedAction> = plan.iter().collect();
        // Already gone counts as deleted, so later waves still run
        for wave in ApplyWave::ORDER.into_iter().rev() {
            let failure = apply_waves(client, &empty, &deletes, [wave])
                .await
                .into_iter()
                .find(|(_, e)| !matches!(e, ClientError::NotFound(_)));

            if let Some((id, err)) = failure {
                warn!("Teardown stopped at {}", id);
                return Err(OperatorError::Client(err));
            }
        }
        Ok(())
    }
}
