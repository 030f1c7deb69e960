// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! One-shot operator actions on the managed resource set.

use super::comparator::Action;
use super::reconciler::{apply_waves, observe, plan_actions, PlannedAction};
use crate::error::{OperatorError, Result};
use crate::kubernetes::ClusterClient;
use crate::manifests::DesiredState;
use crate::types::{ApplyWave, Owner, ResourceId};
use std::fmt;
use tracing::info;

/// How the cluster compares to the desired state, per identity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceAnalysis {
    pub correct: Vec<ResourceId>,
    pub drifted: Vec<ResourceId>,
    pub missing: Vec<ResourceId>,
    /// Owned but no longer desired
    pub extra: Vec<ResourceId>,
    /// Desired identities held by resources this operator does not own
    pub conflicting: Vec<ResourceId>,
    plan: Vec<PlannedAction>,
}

impl ResourceAnalysis {
    fn from_plan(plan: Vec<PlannedAction>) -> Self {
        let mut analysis = Self::default();
        for p in &plan {
            let bucket = match p.action {
                Action::NoOp => &mut analysis.correct,
                Action::Patch { .. } => &mut analysis.drifted,
                Action::Create => &mut analysis.missing,
                Action::Delete => &mut analysis.extra,
                Action::Collision => &mut analysis.conflicting,
            };
            bucket.push(p.id.clone());
        }
        analysis.plan = plan;
        analysis
    }

    fn actions(&self, matching: impl Fn(&Action) -> bool) -> Vec<&PlannedAction> {
        self.plan.iter().filter(|p| matching(&p.action)).collect()
    }
}

impl fmt::Display for ResourceAnalysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sections = [
            ("Correct", &self.correct),
            ("Drifted", &self.drifted),
            ("Missing", &self.missing),
            ("Extra", &self.extra),
            ("Conflicting", &self.conflicting),
        ];
        for (title, ids) in sections {
            writeln!(f, "{} ({}):", title, ids.len())?;
            for id in ids {
                writeln!(f, "  {}", id)?;
            }
        }
        Ok(())
    }
}

pub async fn analyze(client: &dyn ClusterClient, owner: &Owner, desired: &DesiredState) -> Result<ResourceAnalysis> {
    let observed = observe(client, owner, desired).await?;
    Ok(ResourceAnalysis::from_plan(plan_actions(owner, desired, &observed)?))
}

fn into_result(failures: Vec<(ResourceId, crate::error::ClientError)>) -> Result<()> {
    match failures.into_iter().next() {
        None => Ok(()),
        Some((_, err)) => Err(OperatorError::Client(err)),
    }
}

/// Delete owned resources that are no longer desired. Returns what was removed.
pub async fn scrub(client: &dyn ClusterClient, owner: &Owner, desired: &DesiredState) -> Result<Vec<ResourceId>> {
    let analysis = analyze(client, owner, desired).await?;
    let deletes = analysis.actions(|a| *a == Action::Delete);

    into_result(apply_waves(client, desired, &deletes, ApplyWave::ORDER.into_iter().rev()).await)?;
    info!("Scrubbed {} resource(s)", analysis.extra.len());
    Ok(analysis.extra)
}

/// Create desired resources that are absent, leaving drifted ones alone
pub async fn sync_missing(
    client: &dyn ClusterClient,
    owner: &Owner,
    desired: &DesiredState,
) -> Result<Vec<ResourceId>> {
    let analysis = analyze(client, owner, desired).await?;
    let creates = analysis.actions(|a| *a == Action::Create);

    into_result(apply_waves(client, desired, &creates, ApplyWave::ORDER).await)?;
    info!("Created {} missing resource(s)", analysis.missing.len());
    Ok(analysis.missing)
}
