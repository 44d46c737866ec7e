// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Activity notifications.
//!
//! The engine reports noteworthy events (blocks, approvals, payments, ...) to
//! an [`ActivitySink`]. Recording is fire-and-forget: a sink cannot fail an
//! operation.

use chrono::{DateTime, Utc};
use crossbeam::queue::SegQueue;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityKind {
    OutletRegistered,
    OutletBlocked,
    OutletUnblocked,
    CreditCharged,
    CreditWarning,
    PaymentReceived,
    InvoiceCreated,
    InvoiceApproved,
    InvoiceRejected,
    DistributionCreated,
    DistributionAdvanced,
    DistributionDeleted,
    StockRestocked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
}

/// Consumer of activity events.
pub trait ActivitySink: Send + Sync {
    fn record(&self, activity: Activity);
}

/// Writes activities as structured log events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingActivitySink;

impl ActivitySink for TracingActivitySink {
    fn record(&self, activity: Activity) {
        info!(
            kind = ?activity.kind,
            actor = %activity.actor,
            at = %activity.timestamp,
            "{}",
            activity.description
        );
    }
}

/// Lock-free in-memory activity feed.
///
/// Activities are kept in arrival order until [`drain`](Self::drain)ed.
#[derive(Debug, Default)]
pub struct ActivityFeed {
    activities: SegQueue<Activity>,
}

impl ActivityFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }

    /// Removes and returns every queued activity, oldest first.
    pub fn drain(&self) -> Vec<Activity> {
        let mut drained = Vec::with_capacity(self.activities.len());
        while let Some(activity) = self.activities.pop() {
            drained.push(activity);
        }
        drained
    }
}

impl ActivitySink for ActivityFeed {
    fn record(&self, activity: Activity) {
        self.activities.push(activity);
    }
}
