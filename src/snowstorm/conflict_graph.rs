//! The directed conflict graph at the heart of the engine.

use super::conflict_set::ConflictSet;
use super::snowstorm_utils::BoundedHashSet;
use super::tx::{InputId, Tx, TxId, TxStatus};
use super::{Error, Result};

use crate::bag::Bag;
use crate::params::{Context, Parameters};

use crate::colored::Colorize;
use tracing::{debug, info};

use std::collections::{hash_map::Entry, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

/// Max number of accepted transaction ids retained for gossip.
const ACCEPTED_HISTORY_CAP: usize = 3000;

/// Poll bookkeeping for one processing transaction.
struct TxState {
    tx: Arc<dyn Tx>,
    /// The inputs the transaction consumes, as registered.
    inputs: Vec<InputId>,
    /// Cumulative polls won.
    bias: u64,
    /// Consecutive polls won without a gap.
    confidence: u64,
    /// Poll round of the last win.
    last_poll: u64,
    /// Met its confidence threshold, waiting on dependencies.
    pending_accept: bool,
}

/// A conflict graph over transactions contending for spent inputs.
///
/// Transactions are registered with [ConflictGraph::add] and polls with
/// [ConflictGraph::record_poll]; the graph drives each transaction's
/// [accept](Tx::accept) or [reject](Tx::reject) finalizer exactly once.
/// All operations run to completion on the caller's thread; drivers that
/// share a graph must serialize access (see [Snowstorm](super::Snowstorm)).
pub struct ConflictGraph {
    ctx: Context,
    params: Parameters,
    /// Per-input conflict sets.
    inputs: HashMap<InputId, ConflictSet>,
    // Maintains conflict set insertion order for diagnostics.
    input_order: Vec<InputId>,
    /// Processing transactions.
    txs: HashMap<TxId, TxState>,
    // Maintains transaction insertion order for acceptance and diagnostics.
    tx_order: Vec<TxId>,
    /// For each transaction, the registered transactions depending on it.
    dependents: HashMap<TxId, Vec<TxId>>,
    /// Uncontested transactions. Membership never regrows: a transaction
    /// that has ever conflicted stays rogue even if its rivals die.
    virtuous: HashSet<TxId>,
    /// The virtuous transactions still requiring polls.
    virtuous_voting: HashSet<TxId>,
    /// Transactions preferred in every conflict set they belong to.
    preferences: HashSet<TxId>,
    /// Global poll round, incremented on every [ConflictGraph::record_poll].
    poll_number: u64,
    /// Recently accepted transactions, traversed by gossip.
    accepted: BoundedHashSet<TxId>,
    num_accepted: u64,
    num_rejected: u64,
    shut_down: bool,
}

impl ConflictGraph {
    pub fn new(ctx: Context, params: Parameters) -> Result<Self> {
        if !params.is_valid() {
            return Err(Error::InvalidParameters);
        }
        info!(
            "[{}] new conflict graph for chain {} with k = {}, alpha = {}, beta1 = {}, beta2 = {}",
            "snowstorm".cyan(),
            ctx.chain_id,
            params.k,
            params.alpha,
            params.beta_virtuous,
            params.beta_rogue
        );
        Ok(ConflictGraph {
            ctx,
            params,
            inputs: HashMap::default(),
            input_order: vec![],
            txs: HashMap::default(),
            tx_order: vec![],
            dependents: HashMap::default(),
            virtuous: HashSet::new(),
            virtuous_voting: HashSet::new(),
            preferences: HashSet::new(),
            poll_number: 0,
            accepted: BoundedHashSet::new(ACCEPTED_HISTORY_CAP),
            num_accepted: 0,
            num_rejected: 0,
            shut_down: false,
        })
    }

    pub fn parameters(&self) -> Parameters {
        self.params
    }

    pub fn context(&self) -> Context {
        self.ctx
    }

    /// Whether the graph has seen this transaction. Decided transactions
    /// count as issued even if they were never registered here.
    pub fn issued(&self, tx: &dyn Tx) -> bool {
        if tx.status() != TxStatus::Processing {
            return true;
        }
        self.txs.contains_key(&tx.id())
    }

    /// Register a new transaction.
    ///
    /// A transaction with no inputs and no unaccepted dependencies is
    /// vacuously accepted on the spot and never registered. Re-submitting
    /// an issued transaction is a no-op returning `Ok(false)`.
    pub fn add(&mut self, tx: Arc<dyn Tx>) -> Result<bool> {
        self.ensure_live()?;
        if self.issued(tx.as_ref()) {
            debug!("[{}] already issued {}", "snowstorm".cyan(), tx.id());
            return Ok(false);
        }

        let id = tx.id();
        let mut tx_inputs = tx.inputs();
        {
            // A transaction does not conflict with itself.
            let mut seen = HashSet::new();
            tx_inputs.retain(|input| seen.insert(*input));
        }
        let deps = tx.dependencies();

        // Nothing to contend for and nothing to wait on.
        if tx_inputs.is_empty() && deps.iter().all(|d| d.status() == TxStatus::Accepted) {
            tx.accept();
            self.accepted.insert(id);
            self.num_accepted += 1;
            info!("[{}] vacuously accepted {}", "snowstorm".cyan(), id);
            return Ok(true);
        }

        // Join the conflict set of every consumed input, creating singleton
        // sets as needed. Joining an occupied set turns the whole set rogue.
        let mut virtuous = true;
        let mut newly_rogue = vec![];
        for input in tx_inputs.iter() {
            match self.inputs.entry(*input) {
                Entry::Occupied(mut o) => {
                    let cs = o.get_mut();
                    newly_rogue.extend(cs.members().iter().cloned());
                    cs.add_member(id);
                    virtuous = false;
                }
                Entry::Vacant(v) => {
                    v.insert(ConflictSet::new(id));
                    self.input_order.push(*input);
                }
            }
        }
        for rogue in newly_rogue {
            self.virtuous.remove(&rogue);
            self.virtuous_voting.remove(&rogue);
        }

        for dep in deps.iter() {
            if dep.status() == TxStatus::Processing {
                self.dependents.entry(dep.id()).or_insert_with(Vec::new).push(id);
            }
        }

        self.txs.insert(
            id,
            TxState {
                tx,
                inputs: tx_inputs,
                bias: 0,
                confidence: 0,
                last_poll: 0,
                pending_accept: false,
            },
        );
        self.tx_order.push(id);
        if virtuous {
            self.virtuous.insert(id);
            self.virtuous_voting.insert(id);
        }
        debug!(
            "[{}] added {} ({})",
            "snowstorm".cyan(),
            id,
            if virtuous { "virtuous" } else { "rogue" }
        );

        // A dependency may have been decided against this transaction
        // before it arrived.
        if deps.iter().any(|d| d.status() == TxStatus::Rejected) {
            self.reject_tx(id);
        }

        self.recompute_preferences();
        Ok(true)
    }

    /// Whether adding this transaction leaves every one of its conflict
    /// sets uncontested. For a registered transaction this reports the
    /// rogue classification instead, which never regrows.
    pub fn is_virtuous(&self, tx: &dyn Tx) -> bool {
        let id = tx.id();
        if self.txs.contains_key(&id) {
            return self.virtuous.contains(&id);
        }
        for input in tx.inputs().iter() {
            if let Some(cs) = self.inputs.get(input) {
                if cs.members().iter().any(|m| *m != id) {
                    return false;
                }
            }
        }
        true
    }

    /// The registered transactions conflicting with `tx`. May be queried
    /// for transactions that were never registered.
    pub fn conflicts(&self, tx: &dyn Tx) -> HashSet<TxId> {
        let id = tx.id();
        let mut conflicts = HashSet::new();
        for input in tx.inputs().iter() {
            if let Some(cs) = self.inputs.get(input) {
                for member in cs.members() {
                    if *member != id {
                        conflicts.insert(*member);
                    }
                }
            }
        }
        conflicts
    }

    /// Whether a registered transaction is the preferred member of every
    /// conflict set it belongs to.
    pub fn is_preferred(&self, id: &TxId) -> Result<bool> {
        match self.txs.get(id) {
            Some(state) => Ok(state
                .inputs
                .iter()
                .all(|input| self.inputs.get(input).map_or(true, |cs| cs.is_preferred(*id)))),
            None => Err(Error::UnknownTx(*id)),
        }
    }

    /// Snapshot of the virtuous transactions.
    pub fn virtuous(&self) -> HashSet<TxId> {
        self.virtuous.clone()
    }

    /// Snapshot of the transactions preferred in every conflict set they
    /// belong to.
    pub fn preferences(&self) -> HashSet<TxId> {
        self.preferences.clone()
    }

    /// Score one round of sampled votes.
    ///
    /// Ids tallying at least `alpha` votes win the round for their conflict
    /// sets; everyone else sees a failed round and loses its confidence
    /// streak. Votes for ids the graph is not processing are ignored, as
    /// are votes naming two rivals of the same set in one round.
    pub fn record_poll(&mut self, mut votes: Bag) -> Result<()> {
        self.ensure_live()?;
        self.poll_number += 1;
        votes.set_threshold(self.params.alpha);
        let mut winners: Vec<TxId> =
            votes.threshold().into_iter().filter(|id| self.txs.contains_key(id)).collect();
        debug!("[{}] poll {} winners {:?}", "snowstorm".cyan(), self.poll_number, winners);

        // An honest poll cannot prefer two members of one conflict set at
        // the same round. If one does anyway, void those votes so every
        // affected member sees a failed round.
        let winner_set: HashSet<TxId> = winners.iter().cloned().collect();
        let mut void: HashSet<TxId> = HashSet::new();
        for id in winners.iter() {
            let state = match self.txs.get(id) {
                Some(state) => state,
                None => continue,
            };
            for input in state.inputs.iter() {
                if let Some(cs) = self.inputs.get(input) {
                    let contested: Vec<TxId> = cs
                        .members()
                        .iter()
                        .filter(|m| winner_set.contains(*m))
                        .cloned()
                        .collect();
                    if contested.len() > 1 {
                        void.extend(contested);
                    }
                }
            }
        }
        if !void.is_empty() {
            info!(
                "[{}] poll {} votes two rivals of one conflict set, voiding {:?}",
                "snowstorm".cyan(),
                self.poll_number,
                void
            );
            winners.retain(|id| !void.contains(id));
        }

        // Bump the winners' counters before any preference moves.
        for id in winners.iter() {
            if let Some(state) = self.txs.get_mut(id) {
                state.bias += 1;
                state.confidence = if state.last_poll + 1 == self.poll_number {
                    state.confidence + 1
                } else {
                    1
                };
                state.last_poll = self.poll_number;
            }
        }

        // Re-point each winner's conflict sets once its bias overtakes the
        // incumbent's.
        for id in winners.iter() {
            let (bias, tx_inputs) = match self.txs.get(id) {
                Some(state) => (state.bias, state.inputs.clone()),
                None => continue,
            };
            for input in tx_inputs.iter() {
                let pref = match self.inputs.get(input) {
                    Some(cs) => {
                        if cs.is_preferred(*id) {
                            continue;
                        }
                        cs.pref()
                    }
                    None => continue,
                };
                let pref_bias = self.txs.get(&pref).map_or(0, |state| state.bias);
                if bias > pref_bias {
                    if let Some(cs) = self.inputs.get_mut(input) {
                        cs.set_pref(*id);
                    }
                }
            }
        }

        // Everyone that missed this round loses its streak.
        let poll_number = self.poll_number;
        for state in self.txs.values_mut() {
            if state.last_poll != poll_number {
                state.confidence = 0;
            }
        }

        self.sweep_accepts();
        self.recompute_preferences();
        Ok(())
    }

    /// Whether no processing transactions remain registered.
    pub fn finalized(&self) -> bool {
        self.txs.is_empty()
    }

    /// Whether polling may pause: no virtuous transaction is awaiting
    /// votes, so only contested work remains.
    pub fn quiesce(&self) -> bool {
        self.virtuous_voting.is_empty()
    }

    /// Recently accepted transactions, for gossip traversal.
    pub fn accepted_frontier(&self) -> HashSet<TxId> {
        self.accepted.iter().cloned().collect()
    }

    pub fn is_accepted(&self, id: &TxId) -> bool {
        self.accepted.contains(id)
    }

    pub fn num_processing(&self) -> usize {
        self.txs.len()
    }

    pub fn num_accepted(&self) -> u64 {
        self.num_accepted
    }

    pub fn num_rejected(&self) -> u64 {
        self.num_rejected
    }

    /// Drop all state and refuse further work.
    pub fn shutdown(&mut self) {
        self.inputs.clear();
        self.input_order.clear();
        self.txs.clear();
        self.tx_order.clear();
        self.dependents.clear();
        self.virtuous.clear();
        self.virtuous_voting.clear();
        self.preferences.clear();
        self.accepted.clear();
        self.shut_down = true;
        info!("[{}] shut down", "snowstorm".cyan());
    }

    fn ensure_live(&self) -> Result<()> {
        if self.shut_down {
            Err(Error::EngineShutDown)
        } else {
            Ok(())
        }
    }

    /// The confidence a transaction must reach before acceptance.
    fn beta(&self, id: &TxId) -> u64 {
        if self.virtuous.contains(id) {
            self.params.beta_virtuous
        } else {
            self.params.beta_rogue
        }
    }

    /// Whether a transaction has met its confidence threshold while being
    /// preferred in every conflict set it belongs to.
    fn threshold_met(&self, id: &TxId) -> bool {
        let state = match self.txs.get(id) {
            Some(state) => state,
            None => return false,
        };
        state.confidence >= self.beta(id)
            && state
                .inputs
                .iter()
                .all(|input| self.inputs.get(input).map_or(true, |cs| cs.is_preferred(*id)))
    }

    /// Accept every transaction whose threshold is met, in insertion
    /// order, cascading until a fixed point. Transactions meeting their
    /// threshold with unaccepted dependencies are parked and land when the
    /// last dependency does.
    fn sweep_accepts(&mut self) {
        loop {
            let mut progressed = false;
            for id in self.tx_order.clone() {
                let parked = match self.txs.get(&id) {
                    Some(state) => state.pending_accept,
                    None => continue,
                };
                if parked || !self.threshold_met(&id) {
                    continue;
                }
                let deps_accepted = match self.txs.get(&id) {
                    Some(state) => {
                        state.tx.dependencies().iter().all(|d| d.status() == TxStatus::Accepted)
                    }
                    None => continue,
                };
                if deps_accepted {
                    self.accept_tx(id);
                } else {
                    if let Some(state) = self.txs.get_mut(&id) {
                        state.pending_accept = true;
                    }
                    // No further polls needed, only the dependencies.
                    self.virtuous_voting.remove(&id);
                    info!("[{}] {} waiting on dependencies", "snowstorm".cyan(), id);
                }
                progressed = true;
            }
            if !progressed {
                break;
            }
        }
    }

    /// Accept a transaction, rejecting the rivals in every conflict set it
    /// occupied and landing any parked dependent this unblocks.
    fn accept_tx(&mut self, id: TxId) {
        let mut accept_q: VecDeque<TxId> = VecDeque::new();
        accept_q.push_back(id);
        while let Some(id) = accept_q.pop_front() {
            let state = match self.txs.remove(&id) {
                Some(state) => state,
                None => continue,
            };
            self.tx_order.retain(|t| t != &id);
            self.virtuous.remove(&id);
            self.virtuous_voting.remove(&id);

            state.tx.accept();
            self.accepted.insert(id);
            self.num_accepted += 1;
            info!("[{}] accepted {}", "snowstorm".cyan(), id);

            // The rivals in every set this transaction occupied are dead.
            let mut reject_q: VecDeque<TxId> = VecDeque::new();
            for input in state.inputs.iter() {
                if let Some(cs) = self.inputs.remove(input) {
                    self.input_order.retain(|i| i != input);
                    for member in cs.members() {
                        if *member != id {
                            reject_q.push_back(*member);
                        }
                    }
                }
            }
            self.reject_all(reject_q);

            // A dependent parked on this acceptance may be able to land.
            if let Some(dependents) = self.dependents.remove(&id) {
                for dependent in dependents {
                    if let Some(state) = self.txs.get(&dependent) {
                        if state.pending_accept
                            && state
                                .tx
                                .dependencies()
                                .iter()
                                .all(|d| d.status() == TxStatus::Accepted)
                        {
                            accept_q.push_back(dependent);
                        }
                    }
                }
            }
        }
    }

    fn reject_tx(&mut self, id: TxId) {
        let mut q = VecDeque::new();
        q.push_back(id);
        self.reject_all(q);
    }

    /// Reject a batch of transactions, removing them from their remaining
    /// conflict sets and cascading to everything that depends on them.
    fn reject_all(&mut self, mut q: VecDeque<TxId>) {
        while let Some(id) = q.pop_front() {
            let state = match self.txs.remove(&id) {
                Some(state) => state,
                None => continue,
            };
            self.tx_order.retain(|t| t != &id);
            self.virtuous.remove(&id);
            self.virtuous_voting.remove(&id);

            state.tx.reject();
            self.num_rejected += 1;
            info!("[{}] rejected {}", "snowstorm".cyan(), id);

            for input in state.inputs.iter() {
                let emptied = match self.inputs.get_mut(input) {
                    Some(cs) => {
                        let pref_removed = cs.remove_member(&id);
                        if cs.is_empty() {
                            true
                        } else {
                            if pref_removed {
                                // Promote the strongest survivor, first
                                // inserted winning ties.
                                let members = cs.members().to_vec();
                                let mut next = members[0];
                                let mut next_bias =
                                    self.txs.get(&next).map_or(0, |state| state.bias);
                                for member in members.iter().skip(1) {
                                    let bias =
                                        self.txs.get(member).map_or(0, |state| state.bias);
                                    if bias > next_bias {
                                        next = *member;
                                        next_bias = bias;
                                    }
                                }
                                cs.set_pref(next);
                            }
                            false
                        }
                    }
                    None => false,
                };
                if emptied {
                    self.inputs.remove(input);
                    self.input_order.retain(|i| i != input);
                }
            }

            // Anything depending on a rejected transaction dies with it.
            if let Some(dependents) = self.dependents.remove(&id) {
                for dependent in dependents {
                    if self.txs.contains_key(&dependent) {
                        q.push_back(dependent);
                    }
                }
            }
        }
    }

    fn recompute_preferences(&mut self) {
        let mut prefs = HashSet::new();
        for input in self.input_order.iter() {
            let cs = match self.inputs.get(input) {
                Some(cs) => cs,
                None => continue,
            };
            let pref = cs.pref();
            if prefs.contains(&pref) {
                continue;
            }
            let preferred_everywhere = match self.txs.get(&pref) {
                Some(state) => state
                    .inputs
                    .iter()
                    .all(|i| self.inputs.get(i).map_or(true, |cs| cs.is_preferred(pref))),
                None => false,
            };
            if preferred_everywhere {
                prefs.insert(pref);
            }
        }
        self.preferences = prefs;
    }
}

impl fmt::Display for ConflictGraph {
    /// Stable diagnostic: one line per distinct contending transaction, in
    /// conflict set insertion order, then member insertion order.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.inputs.is_empty() {
            return write!(f, "CG()");
        }
        write!(f, "CG(\n")?;
        let mut i = 0;
        let mut seen: HashSet<TxId> = HashSet::new();
        for input in self.input_order.iter() {
            let cs = match self.inputs.get(input) {
                Some(cs) => cs,
                None => continue,
            };
            for member in cs.members() {
                if !seen.insert(*member) {
                    continue;
                }
                if let Some(state) = self.txs.get(member) {
                    write!(
                        f,
                        "    Choice[{}] = ID: {:>50} Confidence: {} Bias: {}\n",
                        i,
                        member.to_string(),
                        state.confidence,
                        state.bias
                    )?;
                    i += 1;
                }
            }
        }
        write!(f, ")")
    }
}
