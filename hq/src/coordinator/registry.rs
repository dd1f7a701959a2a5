//! Known-turret set
//!
//! Keyed by the identity each turret picks for itself. At most one entry per
//! identity, kept in first-seen order. Entries are never removed: a turret
//! that disconnects stays listed.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::protocol::{Registration, TurretStatus};

/// Phase in which a turret was first seen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Barrier,
    Run,
}

/// One known turret
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turret {
    pub identity: String,
    pub name: String,
    pub status: TurretStatus,
    pub first_seen: Phase,
    pub registered_at: DateTime<Utc>,
}

impl fmt::Display for Turret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.name, self.identity, self.status)
    }
}

/// What happened to a registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registered {
    /// New identity, appended
    Added,
    /// Known identity, status changed
    Updated,
    /// Known identity, nothing to change
    Unchanged,
}

#[derive(Debug, Default)]
pub struct TurretRegistry {
    turrets: Vec<Turret>,
    index: HashMap<String, usize>,
}

impl TurretRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.turrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turrets.is_empty()
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.index.contains_key(identity)
    }

    pub fn get(&self, identity: &str) -> Option<&Turret> {
        self.index.get(identity).map(|&i| &self.turrets[i])
    }

    /// Known turrets in first-seen order
    pub fn turrets(&self) -> &[Turret] {
        &self.turrets
    }

    fn append(&mut self, registration: Registration, phase: Phase) {
        info!(
            turret = %registration.turret,
            uuid = %registration.uuid,
            status = %registration.status,
            ?phase,
            "Turret registered"
        );
        self.index.insert(registration.uuid.clone(), self.turrets.len());
        self.turrets.push(Turret {
            identity: registration.uuid,
            name: registration.turret,
            status: registration.status,
            first_seen: phase,
            registered_at: Utc::now(),
        });
    }

    /// Barrier-phase registration: first sighting wins, repeats are ignored
    pub fn register(&mut self, registration: Registration) -> Registered {
        if self.contains(&registration.uuid) {
            debug!(uuid = %registration.uuid, "TurretRegistry::register: duplicate ignored");
            return Registered::Unchanged;
        }
        self.append(registration, Phase::Barrier);
        Registered::Added
    }

    /// Run-phase status report: update a known turret in place, or add a late arrival
    pub fn observe_status(&mut self, registration: Registration) -> Registered {
        match self.index.get(&registration.uuid) {
            Some(&i) => {
                let turret = &mut self.turrets[i];
                if turret.status == registration.status {
                    return Registered::Unchanged;
                }
                debug!(
                    uuid = %registration.uuid,
                    from = %turret.status,
                    to = %registration.status,
                    "TurretRegistry::observe_status: status changed"
                );
                turret.status = registration.status;
                Registered::Updated
            }
            None => {
                self.append(registration, Phase::Run);
                Registered::Added
            }
        }
    }
}
