//! The synchronous core of a node.
//!
//! `NodeState` owns the process lists, election, replay filter, holding map
//! and DBState pipeline of one node. The async loop in [`crate::node`] feeds
//! it one message or timer tick at a time; nothing here blocks or locks.
//!
//! Every message goes through the same three steps:
//! 1. replay filter: duplicates and stale timestamps are dropped;
//! 2. validation: `Invalid` is dropped, `Indeterminate` is held and retried
//!    after every state change, `Valid` is executed;
//! 3. execution: checks run before the first mutation, so a failed execution
//!    leaves the state as it was.
//!
//! Messages this node produces (acknowledgements, end-of-minutes, heartbeats,
//! fault reports) are queued in the outbox for the network and run through
//! the same validation and execution locally.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use fedchain_blocks::{AdminBlock, DirectoryBlock, EntryCreditBlock, FactoidBlock};
use fedchain_consensus::{
    ConsensusError, DBStatePipeline, ElectionState, EmptyLedger, FaultOutcome, ProcessLists,
    ReplayFilter, SubLedger,
};
use fedchain_crypto::identity_of;
use fedchain_messages::{
    Acknowledgement, DBStateMessage, EndOfMinute, FaultReport, HeartBeat, Message,
    SignedPayload,
};
use fedchain_protocol::decode_exact;
use fedchain_store::BlockStore;
use fedchain_types::{
    BlockKind, Hash, KeyPair, MinuteNumber, NetworkId, NodeMode, PublicKey, Timestamp,
    LAST_MINUTE,
};
use tracing::{debug, error, info, warn};

use crate::holding::HoldingMap;
use crate::tracing_spans::{height_span, message_span, timer_span};
use crate::{NodeConfig, NodeError, NodeMetrics};

/// Result of validating a message against the current state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i8)]
pub enum Validity {
    Invalid = -1,
    /// Cannot be decided yet; the message is held.
    Indeterminate = 0,
    Valid = 1,
}

/// What happened to one processed message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Replayed,
    Invalid,
    Held,
    Executed,
    /// Execution was rejected; state is unchanged.
    Failed,
}

fn invalid(reason: &'static str) -> Validity {
    debug!(reason, "message invalid");
    Validity::Invalid
}

/// Compare a message's height against the working height.
fn height_check(got: u32, current: u32) -> Option<Validity> {
    match got.cmp(&current) {
        Ordering::Less => Some(invalid("height already passed")),
        Ordering::Greater => Some(Validity::Indeterminate),
        Ordering::Equal => None,
    }
}

pub struct NodeState {
    mode: NodeMode,
    network: NetworkId,
    key: KeyPair,
    identity: Hash,
    heartbeat_timeout_ms: u64,
    process_lists: ProcessLists,
    election: ElectionState,
    replay: ReplayFilter,
    pipeline: DBStatePipeline,
    holding: HoldingMap,
    /// Acknowledgements by the hash of the message they order.
    acks: HashMap<Hash, Acknowledgement>,
    /// (height, minute, leader) already reported by this node.
    faults_sent: HashSet<(u32, MinuteNumber, Hash)>,
    /// Timestamp of the final end-of-minute while the height awaits sealing.
    pending_seal: Option<Timestamp>,
    store: Arc<dyn BlockStore>,
    ledger: Box<dyn SubLedger>,
    outbox: Vec<Message>,
    metrics: Arc<NodeMetrics>,
}

impl NodeState {
    /// Build the state from configuration and whatever `store` already holds.
    ///
    /// Saved heights are loaded into the pipeline and their admin entries
    /// replayed into the election, so a restarted node resumes at the first
    /// unsaved height with the server lists it left with.
    pub fn new(
        config: &NodeConfig,
        store: Arc<dyn BlockStore>,
        metrics: Arc<NodeMetrics>,
    ) -> Result<Self, NodeError> {
        config.validate()?;
        let key = config.keypair()?;
        let identity = identity_of(&key.public);

        let mut pipeline = DBStatePipeline::new(config.dbstate_retain);
        pipeline.load_from_store(store.as_ref())?;
        let height = pipeline.next_height();

        let genesis = ElectionState::new(
            0,
            &config.federated_keys()?,
            &config.audit_keys()?,
            config.fault_quorum,
        )?;
        let election = restore_election(store.as_ref(), genesis, height)?;
        metrics.current_height.set(i64::from(height));

        info!(
            identity = %identity.short(),
            mode = config.node_mode.as_str(),
            network = config.network.as_str(),
            height,
            federated = election.federated().len(),
            audit = election.audit().len(),
            "node state ready"
        );

        Ok(Self {
            mode: config.node_mode,
            network: config.network,
            key,
            identity,
            heartbeat_timeout_ms: config.heartbeat_timeout_millis(),
            process_lists: ProcessLists::new(height),
            election,
            replay: ReplayFilter::new(config.replay_window_secs),
            pipeline,
            holding: HoldingMap::new(config.holding_capacity),
            acks: HashMap::new(),
            faults_sent: HashSet::new(),
            pending_seal: None,
            store,
            ledger: Box::new(EmptyLedger),
            outbox: Vec::new(),
            metrics,
        })
    }

    /// Replace the sub-ledger that closes factoid and entry-credit blocks.
    pub fn with_ledger(mut self, ledger: Box<dyn SubLedger>) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn identity(&self) -> Hash {
        self.identity
    }

    pub fn public_key(&self) -> PublicKey {
        self.key.public
    }

    pub fn mode(&self) -> NodeMode {
        self.mode
    }

    pub fn network(&self) -> NetworkId {
        self.network
    }

    /// The height being built.
    pub fn db_height(&self) -> u32 {
        self.process_lists.current().db_height()
    }

    pub fn process_lists(&self) -> &ProcessLists {
        &self.process_lists
    }

    pub fn election(&self) -> &ElectionState {
        &self.election
    }

    pub fn pipeline(&self) -> &DBStatePipeline {
        &self.pipeline
    }

    pub fn holding_len(&self) -> usize {
        self.holding.len()
    }

    pub fn metrics(&self) -> &NodeMetrics {
        &self.metrics
    }

    /// Messages produced since the last call, in emission order.
    pub fn take_outbox(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.outbox)
    }

    /// Whether this node orders messages for `minute` of the working height.
    pub fn leads(&self, minute: MinuteNumber) -> bool {
        self.mode.can_lead() && self.election.leader_for(minute) == Some(self.identity)
    }

    fn is_server(&self, identity: &Hash) -> bool {
        self.election.is_federated(identity) || self.election.is_audit(identity)
    }

    /// A saved or assembled height packaged for a node that is catching up.
    pub fn dbstate_message(&self, height: u32, now: Timestamp) -> Option<DBStateMessage> {
        self.pipeline.get(height).map(|state| DBStateMessage {
            timestamp: now,
            directory: state.directory.clone(),
            admin: state.admin.clone(),
            factoid: state.factoid.clone(),
            entry_credit: state.entry_credit.clone(),
        })
    }

    /// Write every unsaved DBState. Called on shutdown.
    pub fn flush(&mut self) -> Result<usize, NodeError> {
        let written = self.pipeline.persist(self.store.as_ref())?;
        self.metrics.heights_saved.inc_by(written as u64);
        Ok(written)
    }

    // ── Inbound ─────────────────────────────────────────────────────────

    /// Process one message taken off the inbound queue.
    ///
    /// Only fatal errors are returned; every other rejection is logged,
    /// counted and reported through the [`Outcome`].
    pub fn process(&mut self, message: Message, now: Timestamp) -> Result<Outcome, NodeError> {
        self.metrics.messages_received.inc();
        let hash = match message.hash() {
            Ok(hash) => hash,
            Err(e) => {
                warn!(error = %e, "message cannot be hashed");
                self.metrics.messages_invalid.inc();
                return Ok(Outcome::Invalid);
            }
        };
        let _span = message_span(message.message_type(), &hash).entered();

        if !self.replay.observe(hash, message.timestamp(), now) {
            debug!("replay rejected");
            self.metrics.replay_rejected.inc();
            return Ok(Outcome::Replayed);
        }

        // Requests must reach the leader; anyone else passes them on.
        if matches!(message, Message::RequestBlock(_)) && !self.leads_open_minute() {
            self.outbox.push(message.clone());
        }

        let outcome = self.dispatch(hash, message, now)?;
        if outcome == Outcome::Executed {
            self.retry_holding(now)?;
        }
        Ok(outcome)
    }

    fn leads_open_minute(&self) -> bool {
        self.process_lists
            .current()
            .open_minute()
            .is_some_and(|minute| self.leads(minute))
    }

    fn dispatch(&mut self, hash: Hash, message: Message, now: Timestamp) -> Result<Outcome, NodeError> {
        match self.validate(&hash, &message) {
            Validity::Invalid => {
                self.metrics.messages_invalid.inc();
                Ok(Outcome::Invalid)
            }
            Validity::Indeterminate => {
                if self.holding.insert(hash, message, now) {
                    debug!("message held");
                    self.metrics.messages_held.inc();
                    self.metrics.holding_size.set(self.holding.len() as i64);
                    Ok(Outcome::Held)
                } else {
                    warn!(held = self.holding.len(), "holding map full, message dropped");
                    self.metrics.messages_invalid.inc();
                    Ok(Outcome::Invalid)
                }
            }
            Validity::Valid => self.run(hash, message, now),
        }
    }

    fn run(&mut self, hash: Hash, message: Message, now: Timestamp) -> Result<Outcome, NodeError> {
        let msg_type = message.message_type();
        match self.execute(hash, message, now) {
            Ok(()) => {
                self.metrics.messages_executed.inc();
                Ok(Outcome::Executed)
            }
            Err(e) if e.is_fatal() => {
                error!(%msg_type, error = %e, "fatal error, node stopping");
                Err(e)
            }
            Err(e) => {
                warn!(%msg_type, error = %e, "execution rejected");
                self.metrics.execution_errors.inc();
                Ok(Outcome::Failed)
            }
        }
    }

    /// Re-validate held messages until a full pass executes nothing.
    fn retry_holding(&mut self, now: Timestamp) -> Result<(), NodeError> {
        loop {
            let mut progressed = false;
            for held in self.holding.take_all() {
                match self.validate(&held.hash, &held.message) {
                    Validity::Valid => {
                        progressed = true;
                        self.run(held.hash, held.message, now)?;
                    }
                    Validity::Indeterminate => self.holding.restore(held),
                    Validity::Invalid => self.metrics.messages_invalid.inc(),
                }
            }
            if !progressed {
                break;
            }
        }
        self.metrics.holding_size.set(self.holding.len() as i64);
        Ok(())
    }

    // ── Validation ──────────────────────────────────────────────────────

    pub fn validate(&self, hash: &Hash, message: &Message) -> Validity {
        match message {
            Message::RequestBlock(_) => self.validate_request(hash),
            Message::Acknowledgement(ack) => self.validate_ack(ack),
            Message::EndOfMinute(eom) => self.validate_end_of_minute(eom),
            Message::FaultReport(report) => self.validate_fault(report),
            Message::HeartBeat(hb) => self.validate_heartbeat(hb),
            Message::DBState(state) => self.validate_dbstate(state),
        }
    }

    fn validate_request(&self, hash: &Hash) -> Validity {
        let pl = self.process_lists.current();
        if pl.contains(hash) {
            return invalid("already ordered");
        }
        let Some(open) = pl.open_minute() else {
            return Validity::Indeterminate;
        };
        let Some(ack) = self.acks.get(hash) else {
            return if self.leads(open) {
                Validity::Valid
            } else {
                Validity::Indeterminate
            };
        };
        if let Some(v) = height_check(ack.db_height, pl.db_height()) {
            return v;
        }
        let position = ack.position as usize;
        match (ack.minute.cmp(&open), position.cmp(&pl.message_count(open))) {
            (Ordering::Less, _) => invalid("acknowledged into a closed minute"),
            (Ordering::Greater, _) | (Ordering::Equal, Ordering::Greater) => {
                Validity::Indeterminate
            }
            (Ordering::Equal, Ordering::Less) => invalid("acknowledged position already taken"),
            (Ordering::Equal, Ordering::Equal) => Validity::Valid,
        }
    }

    /// `Valid` if `signer` leads `minute`, `Indeterminate` if it is another
    /// listed server (a promotion may still be on its way).
    fn check_leader(&self, signer: &PublicKey, minute: MinuteNumber) -> Validity {
        let Some(identity) = self.election.identity_for_key(signer) else {
            return invalid("unknown signer");
        };
        if self.election.leader_for(minute) == Some(identity) {
            Validity::Valid
        } else if self.is_server(&identity) {
            Validity::Indeterminate
        } else {
            invalid("signer is not a server")
        }
    }

    fn validate_ack(&self, ack: &Acknowledgement) -> Validity {
        let pl = self.process_lists.current();
        if let Some(v) = height_check(ack.db_height, pl.db_height()) {
            return v;
        }
        if pl.is_minute_closed(ack.minute) {
            return invalid("acknowledgement for a closed minute");
        }
        if !ack.verify() {
            return invalid("bad acknowledgement signature");
        }
        self.check_leader(&ack.signer, ack.minute)
    }

    fn validate_end_of_minute(&self, eom: &EndOfMinute) -> Validity {
        let pl = self.process_lists.current();
        if let Some(v) = height_check(eom.db_height, pl.db_height()) {
            return v;
        }
        let Some(open) = pl.open_minute() else {
            return invalid("every minute already closed");
        };
        match eom.minute.cmp(&open) {
            Ordering::Less => return invalid("minute already closed"),
            Ordering::Greater => return Validity::Indeterminate,
            Ordering::Equal => {}
        }
        if !eom.verify() {
            return invalid("bad end-of-minute signature");
        }
        match self.check_leader(&eom.signer, eom.minute) {
            Validity::Valid => {}
            _ if self.takeover_of(eom).is_some() => {}
            other => return other,
        }
        match (eom.message_count as usize).cmp(&pl.message_count(eom.minute)) {
            Ordering::Greater => Validity::Indeterminate,
            Ordering::Less => invalid("leader counted fewer messages than ordered"),
            Ordering::Equal => Validity::Valid,
        }
    }

    /// The faulted leader whose minute `eom` closes, when its signer is the
    /// audit server entitled to take that minute over.
    fn takeover_of(&self, eom: &EndOfMinute) -> Option<Hash> {
        let signer = self.election.identity_for_key(&eom.signer)?;
        let leader = self.election.leader_for(eom.minute)?;
        (leader != signer && self.election.takeover_candidate(eom.minute, &leader) == Some(signer))
            .then_some(leader)
    }

    fn validate_fault(&self, report: &FaultReport) -> Validity {
        let pl = self.process_lists.current();
        if let Some(v) = height_check(report.db_height, pl.db_height()) {
            return v;
        }
        if !report.verify() {
            return invalid("bad fault report signature");
        }
        if self.election.identity_for_key(&report.signer) != Some(report.reporter) {
            return invalid("fault report not signed by its reporter");
        }
        let Some(open) = pl.open_minute() else {
            return invalid("every minute already closed");
        };
        match report.minute.cmp(&open) {
            Ordering::Less => invalid("fault report for a closed minute"),
            Ordering::Greater => Validity::Indeterminate,
            Ordering::Equal if self.election.leader_for(open) != Some(report.faulted) => {
                invalid("reported server is not in charge")
            }
            Ordering::Equal => Validity::Valid,
        }
    }

    fn validate_heartbeat(&self, hb: &HeartBeat) -> Validity {
        if !hb.verify() {
            return invalid("bad heartbeat signature");
        }
        if self.election.identity_for_key(&hb.signer) != Some(hb.identity) {
            return invalid("heartbeat not signed by its server");
        }
        Validity::Valid
    }

    fn validate_dbstate(&self, state: &DBStateMessage) -> Validity {
        if state.directory.header.network_number != self.network.number() {
            return invalid("DBState from another network");
        }
        let height = state.directory.db_height();
        if state.admin.db_height() != height
            || state.factoid.db_height != height
            || state.entry_credit.db_height != height
        {
            return invalid("DBState sub-blocks disagree on height");
        }
        match height.cmp(&self.pipeline.next_height()) {
            Ordering::Less => invalid("DBState height already saved"),
            Ordering::Greater => Validity::Indeterminate,
            Ordering::Equal => Validity::Valid,
        }
    }

    // ── Execution ───────────────────────────────────────────────────────

    fn execute(&mut self, hash: Hash, message: Message, now: Timestamp) -> Result<(), NodeError> {
        match message {
            Message::RequestBlock(_) => self.execute_request(hash, message, now),
            Message::Acknowledgement(ack) => {
                debug!(
                    minute = ack.minute,
                    position = ack.position,
                    "acknowledgement stored"
                );
                self.acks.insert(ack.message_hash, ack);
                Ok(())
            }
            Message::EndOfMinute(eom) => self.execute_end_of_minute(&eom),
            Message::FaultReport(report) => self.execute_fault(&report),
            Message::HeartBeat(hb) => {
                self.election.record_heartbeat(hb.identity, now);
                Ok(())
            }
            Message::DBState(state) => {
                let DBStateMessage {
                    directory,
                    admin,
                    factoid,
                    entry_credit,
                    ..
                } = state;
                info!(height = directory.db_height(), "adopting DBState");
                self.commit_height(directory, admin, factoid, entry_credit)
            }
        }
    }

    fn execute_request(&mut self, hash: Hash, message: Message, now: Timestamp) -> Result<(), NodeError> {
        // Follower: the acknowledgement fixes the position.
        if let Some(ack) = self.acks.get(&hash) {
            let minute = ack.minute;
            let position = self.process_lists.current_mut().add_message(minute, message)?;
            self.acks.remove(&hash);
            debug!(minute, position, "request ordered by acknowledgement");
            return Ok(());
        }

        // Leader: order it, acknowledge it, pass both on.
        let pl = self.process_lists.current_mut();
        let Some(minute) = pl.open_minute() else {
            return Err(ConsensusError::HeightSealed(pl.db_height()).into());
        };
        pl.check_open(minute)?;
        let mut ack = Acknowledgement::new(
            now,
            pl.db_height(),
            minute,
            pl.message_count(minute) as u32,
            hash,
            pl.serial_hash_with(&hash),
        );
        ack.sign(&self.key)?;
        let ack = Message::Acknowledgement(ack);
        let ack_hash = ack.hash()?;

        let position = pl.add_message(minute, message.clone())?;
        if !self.replay.observe(ack_hash, now, now) {
            debug!(ack = %ack_hash.short(), "acknowledgement already seen");
        }
        self.outbox.push(message);
        self.outbox.push(ack);
        debug!(minute, position, "request ordered");
        Ok(())
    }

    fn execute_end_of_minute(&mut self, eom: &EndOfMinute) -> Result<(), NodeError> {
        match self.takeover_of(eom) {
            Some(faulted) => {
                let promoted = self
                    .election
                    .identity_for_key(&eom.signer)
                    .ok_or(ConsensusError::NoFaultQuorum {
                        faulted,
                        minute: eom.minute,
                    })?;
                self.process_lists.current_mut().check_open(eom.minute)?;
                let outcome = self.election.promote(eom.minute, faulted, promoted)?;
                if let Some(entry) = outcome.admin_entry() {
                    self.process_lists.current_mut().add_admin_entry(entry)?;
                }
                self.metrics.promotions.inc();
            }
            None => {
                if let Some(leader) = self.election.leader_for(eom.minute) {
                    if self.election.clear_faults(&leader) {
                        debug!(leader = %leader.short(), "leader closed its minute, fault reports void");
                    }
                }
            }
        }

        let pl = self.process_lists.current_mut();
        pl.close_minute(eom.minute)?;
        self.metrics.minutes_closed.inc();
        info!(
            height = pl.db_height(),
            minute = eom.minute,
            messages = eom.message_count,
            "minute closed"
        );
        if eom.minute == LAST_MINUTE {
            self.pending_seal = Some(eom.timestamp);
            if let Err(e) = self.finish_height() {
                if e.is_fatal() {
                    return Err(e);
                }
                warn!(error = %e, "height not finished, retrying on next tick");
                self.metrics.execution_errors.inc();
            }
        }
        Ok(())
    }

    fn execute_fault(&mut self, report: &FaultReport) -> Result<(), NodeError> {
        let outcome = self.election.report_fault(
            report.db_height,
            report.minute,
            report.faulted,
            report.reporter,
        )?;
        match outcome {
            FaultOutcome::QuorumReached {
                faulted, candidate, ..
            } => debug!(
                faulted = %faulted.short(),
                candidate = %candidate.short(),
                "fault quorum reached, waiting for takeover"
            ),
            // Promotions only happen when the candidate closes the minute.
            FaultOutcome::Promoted { .. } => {}
            FaultOutcome::Pending {
                faulted,
                reports,
                needed,
            } => debug!(faulted = %faulted.short(), reports, needed, "fault report counted"),
            FaultOutcome::NoCandidate { faulted } => {
                warn!(faulted = %faulted.short(), "fault quorum reached but no audit server to promote")
            }
            FaultOutcome::Ignored => debug!("self-report ignored"),
        }
        Ok(())
    }

    /// Seal the working height and commit its blocks. The directory block
    /// takes the final end-of-minute's timestamp so every node builds the
    /// same one.
    fn finish_height(&mut self) -> Result<(), NodeError> {
        let Some(timestamp) = self.pending_seal else {
            return Ok(());
        };
        let pl = self.process_lists.current_mut();
        let height = pl.db_height();
        let _span = height_span(height).entered();
        // A retry finds the list already sealed by the failed attempt.
        let entries = if pl.is_sealed() {
            pl.admin_entries().to_vec()
        } else {
            pl.seal()?
        };

        let (prev_admin, prev_factoid, prev_entry_credit) = match self.pipeline.latest() {
            Some(prev) => (
                prev.admin.hash()?,
                prev.factoid.key_mr()?,
                prev.entry_credit.key_mr()?,
            ),
            None => (Hash::ZERO, Hash::ZERO, Hash::ZERO),
        };
        let admin = AdminBlock::new(prev_admin, height, entries);
        let factoid = self.ledger.close_factoid_block(height, prev_factoid);
        let entry_credit = self.ledger.close_entry_credit_block(height, prev_entry_credit);
        let directory = DirectoryBlock::build(
            self.network,
            self.pipeline.last_key_mr(),
            timestamp,
            height,
            admin.hash()?,
            entry_credit.key_mr()?,
            factoid.key_mr()?,
        );
        self.commit_height(directory, admin, factoid, entry_credit)
    }

    /// Assemble and persist a height, then move every component to the next.
    fn commit_height(
        &mut self,
        directory: DirectoryBlock,
        admin: AdminBlock,
        factoid: FactoidBlock,
        entry_credit: EntryCreditBlock,
    ) -> Result<(), NodeError> {
        let height = directory.db_height();
        let entries = admin.entries.clone();

        self.pipeline.submit_directory(directory)?;
        self.pipeline.submit_admin(admin)?;
        self.pipeline.submit_factoid(factoid)?;
        self.pipeline.submit_entry_credit(entry_credit)?;
        let key_mr = self.pipeline.assemble(height, self.store.as_ref())?.key_mr;

        match self.pipeline.persist(self.store.as_ref()) {
            Ok(written) => self.metrics.heights_saved.inc_by(written as u64),
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => warn!(height, error = %e, "DBState not persisted, will retry"),
        }

        let current = self.process_lists.current_mut();
        let finished =
            current.db_height() == height && (current.is_sealed() || current.seal().is_ok());
        if finished {
            self.process_lists.advance();
        } else {
            self.process_lists.reset(height.saturating_add(1));
        }
        for entry in &entries {
            self.election.apply_admin_entry(entry);
        }
        self.election = self.election.next_height();
        self.pending_seal = None;
        self.acks.retain(|_, ack| ack.db_height > height);
        self.faults_sent.retain(|(h, _, _)| *h > height);
        self.metrics.current_height.set(i64::from(height) + 1);

        info!(height, key_mr = %key_mr.short(), entries = entries.len(), "height complete");
        Ok(())
    }

    // ── Timer ───────────────────────────────────────────────────────────

    /// One timer tick: housekeeping, then the server duties of a
    /// leader-capable node (heartbeat, end-of-minute, fault reports).
    pub fn on_timer(&mut self, now: Timestamp) -> Result<(), NodeError> {
        let _span = timer_span(now).entered();

        self.replay.prune(now);
        let expired = self.holding.clear_expired(now, self.replay.window_millis());
        if expired > 0 {
            debug!(expired, "held messages expired");
            self.metrics.messages_invalid.inc_by(expired as u64);
        }

        if self.pending_seal.is_some() {
            if let Err(e) = self.finish_height() {
                if e.is_fatal() {
                    return Err(e);
                }
                warn!(error = %e, "height still not finished");
            }
        }

        if self.mode.can_lead() && self.is_server(&self.identity) {
            self.election.seed_heartbeats(now);
            self.emit_heartbeat(now)?;
            if let Some(open) = self.process_lists.current().open_minute() {
                match self.election.leader_for(open) {
                    Some(leader) if leader == self.identity => {
                        let index = self.election.server_index(&self.identity).unwrap_or_default();
                        self.emit_end_of_minute(open, index, now)?;
                    }
                    Some(leader)
                        if self.election.takeover_candidate(open, &leader) == Some(self.identity) =>
                    {
                        let index = self.election.server_index(&leader).unwrap_or_default();
                        warn!(leader = %leader.short(), minute = open, "taking over minute of faulted leader");
                        self.emit_end_of_minute(open, index, now)?;
                    }
                    Some(leader) => self.report_if_silent(open, leader, now)?,
                    None => {}
                }
            }
        }

        self.retry_holding(now)
    }

    /// Queue a message of our own and run it locally.
    fn emit(&mut self, message: Message, now: Timestamp) -> Result<Outcome, NodeError> {
        let hash = message.hash()?;
        if !self.replay.observe(hash, message.timestamp(), now) {
            debug!(msg_type = %message.message_type(), "own message already seen, not sent");
            self.metrics.replay_rejected.inc();
            return Ok(Outcome::Replayed);
        }
        self.outbox.push(message.clone());
        let outcome = self.dispatch(hash, message, now)?;
        if outcome == Outcome::Executed {
            self.retry_holding(now)?;
        }
        Ok(outcome)
    }

    fn emit_heartbeat(&mut self, now: Timestamp) -> Result<(), NodeError> {
        let mut hb = HeartBeat::new(now, self.db_height(), self.identity, self.pipeline.last_key_mr());
        hb.sign(&self.key)?;
        self.emit(Message::HeartBeat(hb), now)?;
        Ok(())
    }

    fn emit_end_of_minute(
        &mut self,
        minute: MinuteNumber,
        server_index: usize,
        now: Timestamp,
    ) -> Result<(), NodeError> {
        let pl = self.process_lists.current();
        let mut eom = EndOfMinute::new(
            now,
            minute,
            pl.db_height(),
            server_index as u32,
            pl.message_count(minute) as u32,
        );
        eom.sign(&self.key)?;
        self.emit(Message::EndOfMinute(eom), now)?;
        Ok(())
    }

    /// Report `leader` once per minute if its heartbeats stopped.
    fn report_if_silent(&mut self, minute: MinuteNumber, leader: Hash, now: Timestamp) -> Result<(), NodeError> {
        if !self.election.is_federated(&self.identity)
            || !self
                .election
                .timed_out(now, self.heartbeat_timeout_ms)
                .contains(&leader)
        {
            return Ok(());
        }
        let height = self.db_height();
        if !self.faults_sent.insert((height, minute, leader)) {
            return Ok(());
        }
        warn!(leader = %leader.short(), height, minute, "leader silent, reporting fault");
        let mut report = FaultReport::new(now, height, minute, leader, self.identity);
        report.sign(&self.key)?;
        self.emit(Message::FaultReport(report), now)?;
        Ok(())
    }
}

/// Replay the admin entries of every saved height below `next_height`.
fn restore_election(
    store: &dyn BlockStore,
    mut election: ElectionState,
    next_height: u32,
) -> Result<ElectionState, NodeError> {
    for height in 0..next_height {
        let bytes = store
            .get_block_by_height(BlockKind::Admin, height)?
            .ok_or(ConsensusError::IncompleteSubBlocks {
                height,
                missing: vec![BlockKind::Admin],
            })?;
        let admin: AdminBlock = decode_exact(&bytes)?;
        for entry in &admin.entries {
            election.apply_admin_entry(entry);
        }
        election = election.next_height();
    }
    Ok(election)
}
