use core_affinity::{get_core_ids, set_for_current};
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::debug;
use std::cell;
use std::sync::Arc;
use std::thread;
use crate::error::{Error, Result};
use crate::message::ChannelTransport;

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Worker {
    handle: Option<thread::JoinHandle<()>>,
    sender: Option<Sender<Job>>,
}

/// A minimal thread pool with core affinity. Jobs go to the workers
/// round-robin and must be `'static`.
///
pub struct ThreadPool {
    workers: Vec<Worker>,
    current_worker_id: cell::Cell<usize>,
}

impl ThreadPool {
    /// Create a new thread pool with the given number of threads. When the
    /// system reports its cores, workers are pinned to them cyclically, so
    /// that more workers than cores share them.
    ///
    pub fn new(num_threads: usize) -> Self {
        let core_ids = get_core_ids().unwrap_or_default();

        let workers = (0..num_threads.max(1))
            .map(|n| {
                let core_id = if core_ids.is_empty() { None } else { Some(core_ids[n % core_ids.len()]) };
                let (sender, receiver): (Sender<Job>, Receiver<Job>) = unbounded();
                let handle = thread::spawn(move || {
                    if let Some(core_id) = core_id {
                        set_for_current(core_id);
                    }
                    for job in receiver {
                        job()
                    }
                });
                Worker {
                    handle: Some(handle),
                    sender: Some(sender),
                }
            })
            .collect();

        ThreadPool {
            workers,
            current_worker_id: cell::Cell::new(0),
        }
    }

    /// Return the number of worker threads in the pool.
    ///
    pub fn num_threads(&self) -> usize {
        self.workers.len()
    }

    /// Spawn a new job into the pool. Job submissions go cyclically to the
    /// workers: if worker `n` gets this job, then worker `(n + 1) %
    /// num_workers` gets the next one.
    ///
    pub fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.spawn_on(None, job)
    }

    /// Spawn a job onto the worker thread with the given index, if it is
    /// `Some`. The current worker index is not incremented. If the worker
    /// index is `None`, then the job is run on the current worker index,
    /// which is then incremented.
    ///
    pub fn spawn_on<F>(&self, worker_id: Option<usize>, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let worker_id = if let Some(worker_id) = worker_id {
            worker_id
        } else {
            let worker_id = self.current_worker_id.get();
            self.current_worker_id
                .set((worker_id + 1) % self.num_threads());
            worker_id
        };
        if let Some(sender) = &self.workers[worker_id % self.num_threads()].sender {
            // A worker only hangs up when its thread died with a panicking
            // job; the job is then dropped, as it would have been lost.
            let _ = sender.send(Box::new(job));
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.sender.take();

        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}




/// Run `job` once per rank of a group of `num_ranks` connected
/// [`ChannelTransport`]s, each rank on its own worker thread, and return
/// the results in rank order. Ranks poll one another, so every rank gets a
/// thread of its own.
///
pub fn run_ranks<F, R>(num_ranks: usize, job: F) -> Result<Vec<R>>
where
    F: Fn(ChannelTransport) -> R + Send + Sync + 'static,
    R: Send + 'static,
{
    let pool = ThreadPool::new(num_ranks);
    let job = Arc::new(job);
    let (sender, receiver) = unbounded();

    for transport in ChannelTransport::group(num_ranks) {
        let job = job.clone();
        let sender = sender.clone();

        pool.spawn(move || {
            let rank = crate::message::Transport::rank(&transport);
            let _ = sender.send((rank, job(transport)));
        });
    }
    drop(sender);

    let mut results: Vec<Option<R>> = (0..num_ranks).map(|_| None).collect();

    for (rank, result) in receiver {
        debug!("rank {} finished", rank);
        results[rank] = Some(result);
    }
    results
        .into_iter()
        .enumerate()
        .map(|(rank, r)| r.ok_or_else(|| Error::Transport(format!("rank {} did not finish", rank))))
        .collect()
}




// ============================================================================
#[cfg(test)]
mod test {

    use crate::message::Transport;
    use super::*;

    #[test]
    fn pool_runs_every_job() {
        let (sender, receiver) = unbounded();
        {
            let pool = ThreadPool::new(3);
            assert_eq!(pool.num_threads(), 3);

            for n in 0..10 {
                let sender = sender.clone();
                pool.spawn(move || sender.send(n).unwrap());
            }
        }
        drop(sender);
        let mut received: Vec<_> = receiver.iter().collect();
        received.sort_unstable();
        assert_eq!(received, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn ranks_exchange_messages() {
        let sums = run_ranks(3, |mut transport| {
            let rank = transport.rank();
            let size = transport.size();

            for dest in (0..size).filter(|d| *d != rank) {
                transport.isend(dest, 7, &[rank as f64]).unwrap();
            }
            let mut sum = 0.0;
            let mut pending: Vec<_> = (0..size).filter(|s| *s != rank).collect();

            while !pending.is_empty() {
                let mut waiting = Vec::new();

                for source in pending {
                    match transport.try_recv(source, 7).unwrap() {
                        Some(message) => sum += message[0],
                        None => waiting.push(source),
                    }
                }
                pending = waiting;
            }
            sum
        })
        .unwrap();

        assert_eq!(sums, vec![3.0, 2.0, 1.0]);
    }
}
