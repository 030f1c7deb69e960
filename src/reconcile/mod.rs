// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

pub mod actions;
pub mod comparator;
pub mod reconciler;
pub mod rollout;
pub mod status;

pub use actions::ResourceAnalysis;
pub use comparator::{diff, Action};
pub use reconciler::{InputSource, PassReport, PassResult, PlannedAction, Reconciler, Trigger};
pub use rollout::WorkloadStatus;
pub use status::{ReconciliationOutcome, Status, StatusReporter, StatusSink};
