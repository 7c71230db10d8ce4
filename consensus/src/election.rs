//! Election state machine: promotes an audit server when a federated leader faults.
//!
//! One `ElectionState` exists per directory-block height. It owns the ordered
//! federated list, the sorted audit list, the registered signing keys, the
//! fault-report accumulators and heartbeat bookkeeping.
//!
//! Phases:
//! - `Stable`: no outstanding fault reports.
//! - `FaultPending`: at least one federated server has reports against it.
//! - `Promoting`: reports against a server reached the quorum. The lists are
//!   unchanged until the winning audit server closes the faulted minute
//!   itself ([`ElectionState::promote`]); if the faulted server closes it
//!   first, the reports are void ([`ElectionState::clear_faults`]). Either
//!   way the swap happens at a minute boundary every node orders the same.

use crate::ConsensusError;
use fedchain_blocks::AdminBlockEntry;
use fedchain_crypto::identity_of;
use fedchain_types::{Hash, MinuteNumber, PublicKey, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

/// How many corroborating reports promote an audit server.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultQuorum {
    /// Strict majority of the federated servers: `N/2 + 1`.
    #[default]
    FederatedMajority,
    /// Strict majority of federated and audit servers together.
    TotalMajority,
}

impl FaultQuorum {
    /// Reports needed against one server. Only the other federated servers
    /// can report, so the requirement is capped at `federated - 1`.
    pub fn required(&self, federated: usize, audit: usize) -> usize {
        let majority = match self {
            Self::FederatedMajority => federated / 2 + 1,
            Self::TotalMajority => (federated + audit) / 2 + 1,
        };
        majority.min(federated.saturating_sub(1)).max(1)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElectionPhase {
    Stable,
    FaultPending,
    Promoting,
}

/// Result of feeding one fault report to the election.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FaultOutcome {
    /// Self-report; never counted.
    Ignored,
    /// Counted (or already counted) but below the quorum.
    Pending {
        faulted: Hash,
        reports: usize,
        needed: usize,
    },
    /// Quorum reached but no audit server is available to take over.
    NoCandidate { faulted: Hash },
    /// Quorum reached; `candidate` may now close `minute` in place of `faulted`.
    QuorumReached {
        faulted: Hash,
        candidate: Hash,
        minute: MinuteNumber,
    },
    /// `promoted` replaced `faulted` at `position` of the federated list.
    Promoted {
        faulted: Hash,
        promoted: Hash,
        position: usize,
        db_height: u32,
        minute: MinuteNumber,
    },
}

impl FaultOutcome {
    /// The admin entry recording a promotion, if one happened.
    pub fn admin_entry(&self) -> Option<AdminBlockEntry> {
        match self {
            Self::Promoted {
                faulted,
                promoted,
                db_height,
                minute,
                ..
            } => Some(AdminBlockEntry::ServerFault {
                faulted: *faulted,
                promoted: *promoted,
                db_height: *db_height,
                minute: *minute,
            }),
            _ => None,
        }
    }
}

/// Reports against one federated server for one minute.
#[derive(Clone, Debug)]
struct FaultTally {
    minute: MinuteNumber,
    reporters: BTreeSet<Hash>,
}

#[derive(Clone, Debug)]
pub struct ElectionState {
    db_height: u32,
    federated: Vec<Hash>,
    /// Sorted ascending; the first entry wins a promotion.
    audit: Vec<Hash>,
    keys: BTreeMap<Hash, PublicKey>,
    faults: BTreeMap<Hash, FaultTally>,
    last_heartbeat: BTreeMap<Hash, Timestamp>,
    phase: ElectionPhase,
    quorum: FaultQuorum,
}

impl ElectionState {
    /// Build the election for `db_height` from the server public keys.
    /// Federated order is kept as given; the audit list is sorted.
    pub fn new(
        db_height: u32,
        federated: &[PublicKey],
        audit: &[PublicKey],
        quorum: FaultQuorum,
    ) -> Result<Self, ConsensusError> {
        let mut state = Self {
            db_height,
            federated: Vec::with_capacity(federated.len()),
            audit: Vec::with_capacity(audit.len()),
            keys: BTreeMap::new(),
            faults: BTreeMap::new(),
            last_heartbeat: BTreeMap::new(),
            phase: ElectionPhase::Stable,
            quorum,
        };
        for key in federated {
            let identity = identity_of(key);
            if state.is_listed(&identity) {
                return Err(ConsensusError::AlreadyListed(identity));
            }
            state.federated.push(identity);
            state.keys.insert(identity, *key);
        }
        for key in audit {
            let identity = identity_of(key);
            if state.is_listed(&identity) {
                return Err(ConsensusError::AlreadyListed(identity));
            }
            state.insert_audit(identity);
            state.keys.insert(identity, *key);
        }
        Ok(state)
    }

    pub fn db_height(&self) -> u32 {
        self.db_height
    }

    pub fn phase(&self) -> ElectionPhase {
        self.phase
    }

    pub fn quorum(&self) -> FaultQuorum {
        self.quorum
    }

    pub fn federated(&self) -> &[Hash] {
        &self.federated
    }

    pub fn audit(&self) -> &[Hash] {
        &self.audit
    }

    pub fn is_federated(&self, identity: &Hash) -> bool {
        self.federated.contains(identity)
    }

    pub fn is_audit(&self, identity: &Hash) -> bool {
        self.audit.binary_search(identity).is_ok()
    }

    fn is_listed(&self, identity: &Hash) -> bool {
        self.is_federated(identity) || self.is_audit(identity)
    }

    /// Position of `identity` in the federated list.
    pub fn server_index(&self, identity: &Hash) -> Option<usize> {
        self.federated.iter().position(|id| id == identity)
    }

    /// The federated server in charge of `minute` at this height:
    /// `federated[(minute + height) mod N]`.
    pub fn leader_for(&self, minute: MinuteNumber) -> Option<Hash> {
        let n = self.federated.len() as u64;
        if n == 0 {
            return None;
        }
        let index = (minute as u64 + self.db_height as u64) % n;
        self.federated.get(index as usize).copied()
    }

    pub fn key_for(&self, identity: &Hash) -> Option<&PublicKey> {
        self.keys.get(identity)
    }

    /// Identity of a registered signing key.
    pub fn identity_for_key(&self, key: &PublicKey) -> Option<Hash> {
        let identity = identity_of(key);
        (self.keys.get(&identity) == Some(key)).then_some(identity)
    }

    pub fn register_key(&mut self, identity: Hash, key: PublicKey) {
        self.keys.insert(identity, key);
    }

    /// Reporters accumulated against `faulted`.
    pub fn reporters(&self, faulted: &Hash) -> Option<&BTreeSet<Hash>> {
        self.faults.get(faulted).map(|t| &t.reporters)
    }

    fn required(&self) -> usize {
        self.quorum.required(self.federated.len(), self.audit.len())
    }

    /// Feed one fault report.
    ///
    /// Rules:
    /// - Reports for another height, from non-federated servers, or against a
    ///   server not in charge of `minute` are rejected.
    /// - Self-reports are ignored.
    /// - Repeated reports from the same reporter count once.
    /// - A report for a different minute than the tally's restarts the tally.
    /// - Reaching the quorum names the lowest-hash audit server as the
    ///   takeover candidate. The lists do not change here.
    pub fn report_fault(
        &mut self,
        db_height: u32,
        minute: MinuteNumber,
        faulted: Hash,
        reporter: Hash,
    ) -> Result<FaultOutcome, ConsensusError> {
        if db_height != self.db_height {
            return Err(ConsensusError::WrongHeight {
                current: self.db_height,
                got: db_height,
            });
        }
        if !self.is_federated(&reporter) {
            return Err(ConsensusError::NotFederated(reporter));
        }
        if reporter == faulted {
            return Ok(FaultOutcome::Ignored);
        }
        if self.leader_for(minute) != Some(faulted) {
            return Err(ConsensusError::NotInCharge { faulted, minute });
        }

        let tally = self.faults.entry(faulted).or_insert_with(|| FaultTally {
            minute,
            reporters: BTreeSet::new(),
        });
        if tally.minute != minute {
            tally.minute = minute;
            tally.reporters.clear();
        }
        tally.reporters.insert(reporter);
        let reports = tally.reporters.len();
        let needed = self.required();
        self.settle_phase();

        if reports < needed {
            return Ok(FaultOutcome::Pending {
                faulted,
                reports,
                needed,
            });
        }
        let Some(&candidate) = self.audit.first() else {
            return Ok(FaultOutcome::NoCandidate { faulted });
        };
        info!(
            height = self.db_height,
            minute,
            faulted = %faulted.short(),
            candidate = %candidate.short(),
            "fault quorum reached"
        );
        Ok(FaultOutcome::QuorumReached {
            faulted,
            candidate,
            minute,
        })
    }

    /// The audit server entitled to close `minute` in place of `faulted`,
    /// if reports against `faulted` for that minute reached the quorum.
    pub fn takeover_candidate(&self, minute: MinuteNumber, faulted: &Hash) -> Option<Hash> {
        let tally = self.faults.get(faulted)?;
        if tally.minute != minute
            || tally.reporters.len() < self.required()
            || self.leader_for(minute) != Some(*faulted)
        {
            return None;
        }
        self.audit.first().copied()
    }

    /// Swap `promoted` in for `faulted`. Called when `promoted` closes
    /// `minute` as the takeover candidate.
    pub fn promote(
        &mut self,
        minute: MinuteNumber,
        faulted: Hash,
        promoted: Hash,
    ) -> Result<FaultOutcome, ConsensusError> {
        if self.takeover_candidate(minute, &faulted) != Some(promoted) {
            return Err(ConsensusError::NoFaultQuorum { faulted, minute });
        }
        let position = self.swap(faulted, promoted);
        info!(
            height = self.db_height,
            minute,
            faulted = %faulted.short(),
            promoted = %promoted.short(),
            position,
            "audit server promoted"
        );
        Ok(FaultOutcome::Promoted {
            faulted,
            promoted,
            position,
            db_height: self.db_height,
            minute,
        })
    }

    /// `identity` closed a minute it was in charge of, so reports against it
    /// are void. Returns whether any were outstanding.
    pub fn clear_faults(&mut self, identity: &Hash) -> bool {
        let cleared = self.faults.remove(identity).is_some();
        if cleared {
            self.settle_phase();
        }
        cleared
    }

    fn settle_phase(&mut self) {
        let required = self.required();
        self.phase = if self.faults.is_empty() {
            ElectionPhase::Stable
        } else if !self.audit.is_empty()
            && self.faults.values().any(|t| t.reporters.len() >= required)
        {
            ElectionPhase::Promoting
        } else {
            ElectionPhase::FaultPending
        };
    }

    /// Replace `faulted` by `promoted` in the federated list and settle the phase.
    /// Returns the federated position.
    fn swap(&mut self, faulted: Hash, promoted: Hash) -> usize {
        self.audit.retain(|id| id != &promoted);
        let position = match self.server_index(&faulted) {
            Some(position) => {
                self.federated[position] = promoted;
                position
            }
            None => {
                self.federated.push(promoted);
                self.federated.len() - 1
            }
        };
        self.insert_audit(faulted);
        self.faults.remove(&faulted);
        self.settle_phase();
        position
    }

    fn insert_audit(&mut self, identity: Hash) {
        if let Err(at) = self.audit.binary_search(&identity) {
            self.audit.insert(at, identity);
        }
    }

    /// Note a heartbeat from a listed server. Unknown identities are ignored.
    pub fn record_heartbeat(&mut self, identity: Hash, now: Timestamp) -> bool {
        if !self.is_listed(&identity) {
            return false;
        }
        let entry = self.last_heartbeat.entry(identity).or_insert(now);
        if *entry < now {
            *entry = now;
        }
        true
    }

    pub fn last_heartbeat(&self, identity: &Hash) -> Option<Timestamp> {
        self.last_heartbeat.get(identity).copied()
    }

    /// Start the silence clock at `now` for every federated server not heard
    /// from yet, so one that is down from start-up still times out.
    pub fn seed_heartbeats(&mut self, now: Timestamp) {
        for identity in &self.federated {
            self.last_heartbeat.entry(*identity).or_insert(now);
        }
    }

    /// Federated servers whose last heartbeat is older than `timeout_millis`.
    /// Servers with no record at all (not seeded yet) are not reported.
    pub fn timed_out(&self, now: Timestamp, timeout_millis: u64) -> Vec<Hash> {
        self.federated
            .iter()
            .filter(|id| {
                self.last_heartbeat
                    .get(id)
                    .is_some_and(|seen| seen.elapsed_since(now) > timeout_millis)
            })
            .copied()
            .collect()
    }

    /// The election for the following height, seeded from this height's
    /// final ordering. Fault accumulators do not carry over.
    pub fn next_height(&self) -> Self {
        Self {
            db_height: self.db_height.saturating_add(1),
            federated: self.federated.clone(),
            audit: self.audit.clone(),
            keys: self.keys.clone(),
            faults: BTreeMap::new(),
            last_heartbeat: self.last_heartbeat.clone(),
            phase: ElectionPhase::Stable,
            quorum: self.quorum,
        }
    }

    /// Apply an admin entry of a sealed height. Entries already reflected in
    /// the lists (a promotion this node performed live) are no-ops.
    pub fn apply_admin_entry(&mut self, entry: &AdminBlockEntry) {
        match entry {
            AdminBlockEntry::EndOfMinute { .. } => {}
            AdminBlockEntry::AddFederatedServer { identity, .. } => {
                self.audit.retain(|id| id != identity);
                if !self.is_federated(identity) {
                    self.federated.push(*identity);
                }
            }
            AdminBlockEntry::AddAuditServer { identity, .. } => {
                self.federated.retain(|id| id != identity);
                self.insert_audit(*identity);
            }
            AdminBlockEntry::RemoveFederatedServer { identity, .. } => {
                self.federated.retain(|id| id != identity);
                self.faults.remove(identity);
            }
            AdminBlockEntry::AddServerSigningKey {
                identity,
                public_key,
                ..
            } => {
                self.register_key(*identity, *public_key);
            }
            AdminBlockEntry::ServerFault {
                faulted, promoted, ..
            } => {
                if self.is_federated(faulted) && !self.is_federated(promoted) {
                    self.swap(*faulted, *promoted);
                }
            }
        }
    }
}
