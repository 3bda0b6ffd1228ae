//! The boundary exchange between neighboring blocks. Every kind of data
//! that crosses block boundaries (cell-centered ghost zones, face fluxes at
//! level jumps, particles) implements [`BoundaryExchangeable`], whose
//! operations are run as tasks:
//!
//! 1. `start_receiving` arms every receive buffer (`Waiting`).
//! 2. `send` packs the data each neighbor needs and hands it off, either to
//!    the transport or, for a neighbor on this process, straight into the
//!    neighbor's receive buffer (which then becomes `Arrived`).
//! 3. `receive` polls for missing messages. It returns
//!    `TaskStatus::Incomplete` until every buffer of the partition has
//!    arrived, and is safe to call any number of times.
//! 4. `set_boundaries` unpacks every arrived buffer (`Completed`).
//! 5. `clear_boundary` waits for outstanding sends and resets the buffers
//!    for the next phase.
//!
//! All operations act on the blocks of one [`Partition`].

pub mod buffer;
pub mod cell_centered;
pub mod flux_correction;
pub mod indices;
pub mod swarm;

pub use buffer::{BoundaryBuffer, BoundaryData, RecvState, SendState};
pub use cell_centered::CellCenteredExchange;
pub use flux_correction::FluxCorrection;
pub use swarm::SwarmExchange;

use std::cell::RefCell;
use log::error;
use crate::error::Result;
use crate::mesh::{Mesh, Partition};
use crate::tasks::{TaskID, TaskList, TaskStatus};




/// The receive-side flag of a boundary buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoundaryStatus {
    Waiting,
    Arrived,
    Completed,
}

/// Which buffers a phase of communication involves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoundaryCommSubset {
    /// Ghost zones only, as when initializing the mesh.
    MeshInit,
    /// Ghost zones and flux corrections, as in a time step.
    All,
}




/// The operations of the boundary exchange protocol, implemented per kind
/// of exchanged data.
pub trait BoundaryExchangeable {
    /// Arm the receive buffers of every block in the partition. Fails if a
    /// buffer still holds data that has not been unpacked.
    fn start_receiving(&self, mesh: &mut Mesh, part: &Partition, phase: BoundaryCommSubset) -> Result<()>;

    /// Pack and hand off the data for every neighbor not yet served in this
    /// phase. Returns `Incomplete` if a neighbor on this process has not
    /// armed its buffer yet.
    fn send(&self, mesh: &mut Mesh, part: &Partition) -> Result<TaskStatus>;

    /// Poll for messages. Returns `Complete` once every buffer of the
    /// partition has arrived.
    fn receive(&self, mesh: &mut Mesh, part: &Partition) -> Result<TaskStatus>;

    /// Unpack every arrived buffer.
    fn set_boundaries(&self, mesh: &mut Mesh, part: &Partition) -> Result<()>;

    /// Return true if `receive` already unpacks each buffer as it arrives,
    /// so that `set_boundaries` has nothing to do. [`add_exchange_tasks`]
    /// adds no set task for such an exchange.
    fn sets_on_receive(&self) -> bool {
        false
    }

    /// Wait on outstanding sends and return every armed buffer to
    /// `Waiting`.
    fn clear_boundary(&self, mesh: &mut Mesh, part: &Partition, phase: BoundaryCommSubset) -> Result<()>;
}




/// Turn the result of a boundary operation into the status of the task
/// running it. Errors are logged and fail the task.
pub fn task_status(result: Result<TaskStatus>) -> TaskStatus {
    match result {
        Ok(status) => status,
        Err(e) => {
            error!("{}", e);
            TaskStatus::Fail
        }
    }
}

/// Like [`task_status`], for operations that complete in one call.
pub fn task_done(result: Result<()>) -> TaskStatus {
    task_status(result.map(|_| TaskStatus::Complete))
}




/// Add the send, receive and set tasks of one exchange to the list of a
/// partition, all waiting on `dep`. Returns the token of the set task, or
/// of send and receive together if the exchange sets on receive. Arming the buffers must happen in an earlier task or region, since a
/// neighbor's send writes into them.
pub fn add_exchange_tasks<'a, B>(
    list: &mut TaskList<'a>,
    dep: TaskID,
    mesh: &'a RefCell<Mesh>,
    part: &'a Partition,
    exchange: &'a B) -> Result<TaskID>
where
    B: BoundaryExchangeable,
{
    let send = list.add_named_task("send boundary buffers", dep.clone(), move || {
        task_status(exchange.send(&mut mesh.borrow_mut(), part))
    })?;
    let recv = list.add_named_task("receive boundary buffers", dep, move || {
        task_status(exchange.receive(&mut mesh.borrow_mut(), part))
    })?;
    if exchange.sets_on_receive() {
        return Ok(&send | &recv);
    }
    list.add_named_task("set boundaries", &send | &recv, move || {
        task_done(exchange.set_boundaries(&mut mesh.borrow_mut(), part))
    })
}




// ============================================================================
#[cfg(test)]
mod test {

    use crate::mesh::fixtures::two_level_mesh;
    use super::*;

    #[test]
    fn flux_correction_adds_no_set_task() {
        let mesh = RefCell::new(two_level_mesh());
        let parts = mesh.borrow().partitions(1);

        let mut ghosts = TaskList::new();
        add_exchange_tasks(&mut ghosts, TaskID::none(), &mesh, &parts[0], &CellCenteredExchange).unwrap();
        assert_eq!(ghosts.len(), 3);

        let mut fluxes = TaskList::new();
        let done = add_exchange_tasks(&mut fluxes, TaskID::none(), &mesh, &parts[0], &FluxCorrection).unwrap();
        assert_eq!(fluxes.len(), 2);
        assert_eq!(done.iter().collect::<Vec<_>>(), vec![0, 1]);
    }
}
