use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use zfx_snowstorm::bag::Bag;
use zfx_snowstorm::params::{Context, Parameters};
use zfx_snowstorm::snowstorm::tx::{InputId, Tx, TxId, TxStatus};
use zfx_snowstorm::snowstorm::ConflictGraph;
use zfx_snowstorm::zfx_id::Id;

use std::sync::{Arc, Mutex};

struct BenchTx {
    id: TxId,
    inputs: Vec<InputId>,
    status: Mutex<TxStatus>,
}

impl BenchTx {
    fn new(id: TxId, inputs: Vec<InputId>) -> Arc<Self> {
        Arc::new(BenchTx { id, inputs, status: Mutex::new(TxStatus::Processing) })
    }
}

impl Tx for BenchTx {
    fn id(&self) -> TxId {
        self.id
    }

    fn inputs(&self) -> Vec<InputId> {
        self.inputs.clone()
    }

    fn dependencies(&self) -> Vec<Arc<dyn Tx>> {
        vec![]
    }

    fn status(&self) -> TxStatus {
        *self.status.lock().unwrap()
    }

    fn accept(&self) {
        *self.status.lock().unwrap() = TxStatus::Accepted;
    }

    fn reject(&self) {
        *self.status.lock().unwrap() = TxStatus::Rejected;
    }
}

fn new_graph() -> ConflictGraph {
    let ctx = Context::new(Id::one(), Id::two());
    ConflictGraph::new(ctx, Parameters::new(3, 2, 2, 4)).unwrap()
}

/// `n` transactions where every consecutive pair contends for one input.
fn create_txs(n: usize) -> Vec<Arc<BenchTx>> {
    let mut txs = vec![];
    for i in 0..n as u64 {
        let tx_id = Id::max().hash_prefix(i);
        let inputs = vec![Id::zero().hash_prefix(i), Id::zero().hash_prefix(i + 1)];
        txs.push(BenchTx::new(tx_id, inputs));
    }
    txs
}

pub fn run_conflict_graph_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("conflict_graph_benchmark");
    let iterations = vec![100, 1000, 10000];

    for n in iterations.iter() {
        group.throughput(Throughput::Elements(*n as u64));
        group.bench_with_input(BenchmarkId::new("add", n), n, |b, &n| {
            let txs = create_txs(n);
            b.iter(|| {
                let mut graph = new_graph();
                for tx in txs.iter() {
                    let fresh: Arc<dyn Tx> =
                        BenchTx::new(tx.id, tx.inputs.clone());
                    graph.add(fresh).unwrap();
                }
            })
        });
    }

    for n in iterations.iter() {
        group.throughput(Throughput::Elements(*n as u64));
        group.bench_with_input(BenchmarkId::new("record_poll", n), n, |b, &n| {
            b.iter(|| {
                let mut graph = new_graph();
                for tx in create_txs(n) {
                    graph.add(tx as Arc<dyn Tx>).unwrap();
                }
                // Walk the chain of conflicts, accepting every other
                // transaction.
                for i in (0..n as u64).step_by(2) {
                    let mut votes = Bag::new();
                    votes.add_count(Id::max().hash_prefix(i), 2);
                    graph.record_poll(votes.clone()).unwrap();
                    graph.record_poll(votes.clone()).unwrap();
                    graph.record_poll(votes.clone()).unwrap();
                    graph.record_poll(votes).unwrap();
                }
            })
        });
    }

    group.finish();
}

criterion_group!(benches, run_conflict_graph_benchmark);
criterion_main!(benches);
