// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Trigger handling and pass scheduling.

pub mod manager;

pub use manager::{resync, Controller, ControllerHandle, Dispatch};
