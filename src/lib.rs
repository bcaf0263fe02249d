// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Daily business metrics for Riot: signups by platform and issue churn.

pub mod aggregate;
pub mod churn;
pub mod classify;
pub mod commands;
pub mod config;
pub mod dates;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod github;
pub mod query;
pub mod signups;
pub mod synapse;
