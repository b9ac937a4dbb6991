//! The opaque transaction interface consumed by the conflict graph.

use crate::zfx_id::Id;

use std::sync::Arc;

/// Identifies a transaction.
pub type TxId = Id;

/// Identifies an input resource consumed by a transaction.
pub type InputId = Id;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum TxStatus {
    Processing,
    Accepted,
    Rejected,
}

impl std::fmt::Display for TxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            TxStatus::Processing => write!(f, "Processing"),
            TxStatus::Accepted => write!(f, "Accepted"),
            TxStatus::Rejected => write!(f, "Rejected"),
        }
    }
}

/// A transaction as seen by the conflict graph.
///
/// The graph treats transactions as opaque labelled objects: it reads the
/// id, the consumed inputs and the dependency list, and finalizes the
/// transaction through [Tx::accept] or [Tx::reject]. Both finalizers are
/// invoked at most once, and [Tx::accept] only after every dependency has
/// been accepted.
///
/// Handles are shared between the driver and the graph, so implementations
/// keep their status behind interior mutability.
pub trait Tx: Send + Sync {
    fn id(&self) -> TxId;

    /// The input resources this transaction consumes. Two transactions
    /// conflict iff their inputs intersect.
    fn inputs(&self) -> Vec<InputId>;

    /// Transactions which must be accepted before this one.
    fn dependencies(&self) -> Vec<Arc<dyn Tx>>;

    fn status(&self) -> TxStatus;

    /// Finalize as accepted. Terminal.
    fn accept(&self);

    /// Finalize as rejected. Terminal.
    fn reject(&self);
}

#[cfg(test)]
pub mod testing {
    use super::*;

    use std::sync::Mutex;

    /// Minimal [Tx] used to drive the graph in tests.
    ///
    /// The finalizers assert the graph's side of the contract: a status is
    /// decided at most once, and acceptance never runs ahead of the
    /// transaction's dependencies.
    pub struct TestTx {
        id: TxId,
        inputs: Vec<InputId>,
        deps: Vec<Arc<dyn Tx>>,
        status: Mutex<TxStatus>,
    }

    impl TestTx {
        pub fn new(id: TxId, inputs: Vec<InputId>) -> Arc<Self> {
            TestTx::with_deps(id, inputs, vec![])
        }

        pub fn with_deps(id: TxId, inputs: Vec<InputId>, deps: Vec<Arc<dyn Tx>>) -> Arc<Self> {
            Arc::new(TestTx { id, inputs, deps, status: Mutex::new(TxStatus::Processing) })
        }
    }

    impl Tx for TestTx {
        fn id(&self) -> TxId {
            self.id
        }

        fn inputs(&self) -> Vec<InputId> {
            self.inputs.clone()
        }

        fn dependencies(&self) -> Vec<Arc<dyn Tx>> {
            self.deps.clone()
        }

        fn status(&self) -> TxStatus {
            *self.status.lock().unwrap()
        }

        fn accept(&self) {
            for dep in self.deps.iter() {
                assert_eq!(dep.status(), TxStatus::Accepted, "accepted ahead of a dependency");
            }
            let mut status = self.status.lock().unwrap();
            assert_eq!(*status, TxStatus::Processing, "finalized twice");
            *status = TxStatus::Accepted;
        }

        fn reject(&self) {
            let mut status = self.status.lock().unwrap();
            assert_eq!(*status, TxStatus::Processing, "finalized twice");
            *status = TxStatus::Rejected;
        }
    }
}
