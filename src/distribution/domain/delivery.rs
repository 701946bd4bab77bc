//! Shared delivery state machine for the distribution ledgers.

use crate::pipeline::domain::ConfigHash;
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::Serialize;
use std::fmt::Debug;

/// Status set of one distribution ledger.
///
/// Every ledger has the same shape: an idle state, one in-flight state
/// entered when the server sends the offer, and two terminal outcomes.
pub trait LedgerStatus: Copy + Eq + Debug + Send + Sync + 'static {
    /// Nothing has been offered yet.
    const IDLE: Self;
    /// The offer was sent and the agent is working on it.
    const IN_FLIGHT: Self;
    /// The agent reports success.
    const DONE: Self;
    /// The agent reports failure.
    const FAILED: Self;
}

/// Effect of applying an agent report to a [`Delivery`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeliveryReport<S> {
    /// The status moved.
    Changed {
        /// Status before the report.
        from: S,
    },
    /// The report repeated what was already recorded.
    Unchanged,
    /// The report named another offer, or would have regressed a
    /// successful delivery.
    Ignored,
}

/// Delivery progress of one offered item to one agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery<S: LedgerStatus> {
    status: S,
    hash: Option<ConfigHash>,
    message: Option<String>,
    updated_at: DateTime<Utc>,
}

impl<S: LedgerStatus> Delivery<S> {
    /// Creates an idle delivery.
    #[must_use]
    pub fn idle(clock: &impl Clock) -> Self {
        Self {
            status: S::IDLE,
            hash: None,
            message: None,
            updated_at: clock.utc(),
        }
    }

    /// Reconstructs a delivery from storage.
    #[must_use]
    pub const fn from_parts(
        status: S,
        hash: Option<ConfigHash>,
        message: Option<String>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            status,
            hash,
            message,
            updated_at,
        }
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> S {
        self.status
    }

    /// Hash of the offer the status refers to.
    #[must_use]
    pub const fn hash(&self) -> Option<ConfigHash> {
        self.hash
    }

    /// Agent-supplied detail.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Time of the last change.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Moves to the in-flight state for the offer with `hash`.
    ///
    /// Returns `false` when that offer was already sent, whatever its
    /// outcome, so a failed offer is not resent until it changes.
    pub fn offer(&mut self, hash: ConfigHash, clock: &impl Clock) -> bool {
        if self.hash == Some(hash) && self.status != S::IDLE {
            return false;
        }
        self.status = S::IN_FLIGHT;
        self.hash = Some(hash);
        self.message = None;
        self.updated_at = clock.utc();
        true
    }

    /// Applies a status reported by the agent.
    ///
    /// Reports about a different offer are ignored, as is anything other
    /// than success once success was recorded for the current offer.
    pub fn record_report(
        &mut self,
        reported: S,
        hash: Option<ConfigHash>,
        message: Option<String>,
        clock: &impl Clock,
    ) -> DeliveryReport<S> {
        if reported == S::IDLE {
            return DeliveryReport::Ignored;
        }
        if matches!((self.hash, hash), (Some(current), Some(named)) if current != named) {
            return DeliveryReport::Ignored;
        }
        if self.status == S::DONE && reported != S::DONE {
            return DeliveryReport::Ignored;
        }
        if self.status == reported && self.message == message {
            return DeliveryReport::Unchanged;
        }
        let from = self.status;
        self.status = reported;
        self.message = message;
        if self.hash.is_none() {
            self.hash = hash;
        }
        self.updated_at = clock.utc();
        DeliveryReport::Changed { from }
    }
}
