//! The driver surface over one conflict graph.
//!
//! [Snowstorm] wraps a [ConflictGraph] in an actor so that the external
//! driver layers (message router, poll scheduler, gossip loop) interact with
//! the single-threaded engine through one serializing mailbox: transactions
//! in, polls in, preferences out. The actor performs no networking of its
//! own; sampling validators and collecting their votes into a [Bag] is the
//! caller's job.

use super::conflict_graph::ConflictGraph;
use super::tx::{Tx, TxId};
use super::Result;

use crate::bag::Bag;
use crate::params::{Context as ChainContext, Parameters};

use crate::colored::Colorize;
use tracing::{debug, error, info};

use actix::{Actor, Context, Handler};
use actix_derive::{Message, MessageResponse};

use std::collections::HashSet;
use std::sync::Arc;

pub struct Snowstorm {
    graph: ConflictGraph,
}

impl Snowstorm {
    pub fn new(ctx: ChainContext, params: Parameters) -> Result<Self> {
        Ok(Snowstorm { graph: ConflictGraph::new(ctx, params)? })
    }
}

impl Actor for Snowstorm {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Context<Self>) {
        debug!("started snowstorm");
    }
}

/// Submit a transaction for processing.
///
/// Answers `Ok(true)` if the transaction was newly taken on, `Ok(false)` if
/// it was already issued.
#[derive(Clone, Message)]
#[rtype(result = "Result<bool>")]
pub struct SubmitTx {
    pub tx: Arc<dyn Tx>,
}

impl Handler<SubmitTx> for Snowstorm {
    type Result = Result<bool>;

    fn handle(&mut self, msg: SubmitTx, _ctx: &mut Context<Self>) -> Self::Result {
        let tx_id = msg.tx.id();
        match self.graph.add(msg.tx) {
            Ok(is_new) => Ok(is_new),
            Err(e) => {
                error!("[{}] couldn't submit {}: {}", "snowstorm".cyan(), tx_id, e);
                Err(e)
            }
        }
    }
}

/// Record the tallied outcome of one poll round.
#[derive(Debug, Clone, Serialize, Deserialize, Message)]
#[rtype(result = "Result<()>")]
pub struct RecordPoll {
    pub votes: Bag,
}

impl Handler<RecordPoll> for Snowstorm {
    type Result = Result<()>;

    fn handle(&mut self, msg: RecordPoll, _ctx: &mut Context<Self>) -> Self::Result {
        match self.graph.record_poll(msg.votes) {
            Ok(()) => Ok(()),
            Err(e) => {
                error!("[{}] couldn't record poll: {}", "snowstorm".cyan(), e);
                Err(e)
            }
        }
    }
}

/// Submit a queried transaction and answer whether it is preferred in every
/// conflict set it belongs to. This is the outcome bit a validator returns
/// when sampled about a transaction.
#[derive(Clone, Message)]
#[rtype(result = "QueryTxAck")]
pub struct QueryTx {
    pub tx: Arc<dyn Tx>,
}

/// Response for [QueryTx]
#[derive(Debug, Clone, Serialize, Deserialize, MessageResponse)]
pub struct QueryTxAck {
    pub tx_id: TxId,
    /// true if this transaction is strongly preferred by the graph
    pub outcome: bool,
}

impl Handler<QueryTx> for Snowstorm {
    type Result = QueryTxAck;

    fn handle(&mut self, msg: QueryTx, _ctx: &mut Context<Self>) -> Self::Result {
        let tx_id = msg.tx.id();
        info!("[{}] received query for transaction {}", "snowstorm".cyan(), tx_id);
        if let Err(e) = self.graph.add(msg.tx) {
            error!("[{}] couldn't process queried {}: {}", "snowstorm".cyan(), tx_id, e);
            return QueryTxAck { tx_id, outcome: false };
        }
        // The transaction may have been decided before or during the add.
        let outcome = self.graph.is_accepted(&tx_id)
            || self.graph.is_preferred(&tx_id).unwrap_or(false);
        QueryTxAck { tx_id, outcome }
    }
}

/// Snapshot of the transactions preferred in every conflict set they belong
/// to.
#[derive(Debug, Clone, Serialize, Deserialize, Message)]
#[rtype(result = "Preferences")]
pub struct GetPreferences;

#[derive(Debug, Clone, Serialize, Deserialize, MessageResponse)]
pub struct Preferences {
    pub ids: HashSet<TxId>,
}

impl Handler<GetPreferences> for Snowstorm {
    type Result = Preferences;

    fn handle(&mut self, _msg: GetPreferences, _ctx: &mut Context<Self>) -> Self::Result {
        Preferences { ids: self.graph.preferences() }
    }
}

/// Snapshot of the uncontested transactions.
#[derive(Debug, Clone, Serialize, Deserialize, Message)]
#[rtype(result = "VirtuousTxs")]
pub struct GetVirtuous;

#[derive(Debug, Clone, Serialize, Deserialize, MessageResponse)]
pub struct VirtuousTxs {
    pub ids: HashSet<TxId>,
}

impl Handler<GetVirtuous> for Snowstorm {
    type Result = VirtuousTxs;

    fn handle(&mut self, _msg: GetVirtuous, _ctx: &mut Context<Self>) -> Self::Result {
        VirtuousTxs { ids: self.graph.virtuous() }
    }
}

/// Whether polling may pause because only contested work remains.
#[derive(Debug, Clone, Serialize, Deserialize, Message)]
#[rtype(result = "bool")]
pub struct IsQuiescent;

impl Handler<IsQuiescent> for Snowstorm {
    type Result = bool;

    fn handle(&mut self, _msg: IsQuiescent, _ctx: &mut Context<Self>) -> Self::Result {
        self.graph.quiesce()
    }
}

/// Whether no processing transactions remain.
#[derive(Debug, Clone, Serialize, Deserialize, Message)]
#[rtype(result = "bool")]
pub struct IsFinalized;

impl Handler<IsFinalized> for Snowstorm {
    type Result = bool;

    fn handle(&mut self, _msg: IsFinalized, _ctx: &mut Context<Self>) -> Self::Result {
        self.graph.finalized()
    }
}

/// Get the recently accepted transactions for gossip. Read-only.
#[derive(Debug, Clone, Serialize, Deserialize, Message)]
#[rtype(result = "AcceptedFrontier")]
pub struct GetAcceptedFrontier;

/// A response to [GetAcceptedFrontier] with the accepted transaction ids
#[derive(Debug, Clone, Serialize, Deserialize, MessageResponse)]
pub struct AcceptedFrontier {
    pub frontier: HashSet<TxId>,
}

impl Handler<GetAcceptedFrontier> for Snowstorm {
    type Result = AcceptedFrontier;

    fn handle(&mut self, _msg: GetAcceptedFrontier, _ctx: &mut Context<Self>) -> Self::Result {
        AcceptedFrontier { frontier: self.graph.accepted_frontier() }
    }
}

/// Get as much of the graph's state as possible
#[derive(Debug, Clone, Serialize, Deserialize, Message)]
#[rtype(result = "Status")]
pub struct GetStatus;

#[derive(Debug, Clone, Serialize, Deserialize, MessageResponse)]
pub struct Status {
    pub params: Parameters,
    pub num_processing: usize,
    pub num_accepted: u64,
    pub num_rejected: u64,
    pub finalized: bool,
    pub quiescent: bool,
}

impl Handler<GetStatus> for Snowstorm {
    type Result = Status;

    fn handle(&mut self, _msg: GetStatus, _ctx: &mut Context<Self>) -> Self::Result {
        Status {
            params: self.graph.parameters(),
            num_processing: self.graph.num_processing(),
            num_accepted: self.graph.num_accepted(),
            num_rejected: self.graph.num_rejected(),
            finalized: self.graph.finalized(),
            quiescent: self.graph.quiesce(),
        }
    }
}

/// Free the graph and refuse further work. The actor stays responsive so
/// that late queries are answered with an error instead of a dead mailbox.
#[derive(Debug, Clone, Serialize, Deserialize, Message)]
#[rtype(result = "()")]
pub struct Shutdown;

impl Handler<Shutdown> for Snowstorm {
    type Result = ();

    fn handle(&mut self, _msg: Shutdown, _ctx: &mut Context<Self>) -> Self::Result {
        self.graph.shutdown();
    }
}
