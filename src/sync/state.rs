//! Single-pass guard for the sync engine.

use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum SyncPhase {
    Idle = 0,
    Fetching = 1,
    Persisting = 2,
    Reconciling = 3,
}

impl SyncPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Fetching,
            2 => Self::Persisting,
            3 => Self::Reconciling,
            _ => Self::Idle,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Persisting => "persisting",
            Self::Reconciling => "reconciling",
        }
    }
}

/// `Idle → Fetching → Persisting → Reconciling → Idle`.
///
/// Only a caller that wins the `Idle → Fetching` compare-and-swap runs a pass;
/// everyone else is told to skip.
#[derive(Debug, Default)]
pub struct SyncGate {
    phase: AtomicU8,
}

impl SyncGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> SyncPhase {
        SyncPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn try_begin(&self) -> Option<PassGuard<'_>> {
        self.phase
            .compare_exchange(
                SyncPhase::Idle as u8,
                SyncPhase::Fetching as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .ok()
            .map(|_| PassGuard { gate: self })
    }
}

/// Held for the duration of a pass; returns the gate to `Idle` when dropped,
/// whether the pass succeeded or not.
#[derive(Debug)]
pub struct PassGuard<'a> {
    gate: &'a SyncGate,
}

impl PassGuard<'_> {
    pub fn advance(&self, phase: SyncPhase) {
        tracing::debug!(phase = phase.as_str(), "Sync phase");
        self.gate.phase.store(phase as u8, Ordering::Release);
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.gate
            .phase
            .store(SyncPhase::Idle as u8, Ordering::Release);
    }
}
