use std::sync::Arc;
use log::{debug, warn};
use crate::error::{Error, Result};
use crate::field::{CellVariable, VarHandle};
use crate::index_space::IndexShape;
use crate::kernel::ExecSpace;
use crate::mesh::{Mesh, MeshBlock, Partition};
use crate::message::{boundary_tag, Channel};
use crate::refinement::restrict;
use crate::tasks::TaskStatus;
use super::buffer::{pack, unpack, RecvState, SendState};
use super::indices::{load_region, set_region, Region, Target};
use super::{BoundaryCommSubset, BoundaryExchangeable, FluxCorrection};




/// Index regions for the exchange with one neighbor.
#[derive(Clone, Copy, Debug)]
pub(crate) struct BufferInfo {
    pub load: Region,
    pub set: Region,
}

/// Exchange metadata of one block: the fields that fill ghost zones, with
/// their component counts, and the regions for each of its neighbors (in
/// the order of `MeshBlock::neighbors`). Rebuilt when the block's
/// neighbors or the registered fields change.
#[derive(Clone, Debug)]
pub(crate) struct BufferCache {
    pub fields: Vec<(VarHandle, usize)>,
    pub infos: Vec<BufferInfo>,
}

impl BufferCache {
    fn build(block: &MeshBlock) -> Self {
        let fields = block
            .data
            .vars()
            .filter(|(_, v)| v.metadata.fill_ghost)
            .map(|(h, v)| (h, v.num_components()))
            .collect();
        let infos = block
            .neighbors
            .iter()
            .map(|nb| BufferInfo {
                load: load_region(&block.cellbounds, &block.c_cellbounds, nb, block.loc.level),
                set: set_region(&block.cellbounds, &block.c_cellbounds, nb, &block.loc),
            })
            .collect();
        debug!("block {}: exchange metadata for {} neighbor(s)", block.gid, block.neighbors.len());
        Self { fields, infos }
    }
}

/// Return the exchange metadata of a block, building it if needed. The
/// returned handle shares the block's copy.
pub(crate) fn cached(block: &mut MeshBlock) -> Arc<BufferCache> {
    match &block.cache {
        Some(cache) => cache.clone(),
        None => {
            let cache = Arc::new(BufferCache::build(block));
            block.cache = Some(cache.clone());
            cache
        }
    }
}




/// The ghost-zone exchange of every cell-centered field flagged to fill
/// ghosts. On multi-level meshes data sent to a coarser neighbor is first
/// restricted into the coarse buffer, and data from a coarser neighbor is
/// set into the coarse buffer, to be prolongated with
/// [`crate::refinement::prolongate_boundaries`].
#[derive(Clone, Copy, Debug, Default)]
pub struct CellCenteredExchange;

impl BoundaryExchangeable for CellCenteredExchange {
    fn start_receiving(&self, mesh: &mut Mesh, part: &Partition, phase: BoundaryCommSubset) -> Result<()> {
        for &lid in &part.lids {
            let block = &mut mesh.blocks[lid];
            let cache = cached(block);

            for &(var, nv) in &cache.fields {
                for (nb, info) in block.neighbors.iter().zip(&cache.infos) {
                    let buf = block.ghost[var.index()].buffer_mut(nb.bufid);

                    if buf.recv_state == RecvState::Arrived {
                        return Err(Error::protocol(block.gid, format!(
                            "re-arming buffer {} of field {} before its data was set", nb.bufid, var.index())));
                    }
                    buf.recv.resize(nv * info.set.cells.len(), 0.0);
                    buf.recv_len = 0;
                    buf.recv_state = RecvState::Waiting;
                }
            }
        }
        if phase == BoundaryCommSubset::All {
            FluxCorrection.start_receiving(mesh, part, phase)?;
        }
        Ok(())
    }

    fn send(&self, mesh: &mut Mesh, part: &Partition) -> Result<TaskStatus> {
        let rank = mesh.rank();
        let Mesh { blocks, transport, exec, .. } = mesh;
        let mut complete = true;

        for &lid in &part.lids {
            let cache = cached(&mut blocks[lid]);

            for &(var, nv) in &cache.fields {
                for (n, info) in cache.infos.iter().enumerate() {
                    let nb = blocks[lid].neighbors[n].clone();
                    let gid = blocks[lid].gid;

                    if blocks[lid].ghost[var.index()].buffer(nb.bufid).send_state.is_sent() {
                        continue;
                    }
                    let local = nb.rank == rank;

                    if local {
                        match blocks[nb.lid].ghost[var.index()].buffer(nb.targetid).recv_state {
                            RecvState::Waiting => {}
                            RecvState::Arrived => {
                                return Err(Error::protocol(gid, format!(
                                    "block {} still holds unset data in buffer {}", nb.gid, nb.targetid)));
                            }
                            RecvState::Idle | RecvState::Completed => {
                                complete = false;
                                continue;
                            }
                        }
                    }

                    let MeshBlock { data, cellbounds, c_cellbounds, ghost, .. } = &mut blocks[lid];
                    let mut send = std::mem::take(&mut ghost[var.index()].buffer_mut(nb.bufid).send);
                    send.resize(nv * info.load.cells.len(), 0.0);
                    load(exec, gid, data.get_mut(var), (&*cellbounds, &*c_cellbounds), info, nv, &mut send)?;

                    let state = if local {
                        let target = blocks[nb.lid].ghost[var.index()].buffer_mut(nb.targetid);

                        if target.store(&send) {
                            warn!("block {}: receive buffer {} of field {} reallocated", nb.gid, nb.targetid, var.index());
                        }
                        SendState::Completed
                    } else {
                        let tag = boundary_tag(nb.lid, nb.targetid, var.index(), Channel::Ghost);
                        SendState::InFlight(transport.isend(nb.rank, tag, &send)?)
                    };
                    let buf = blocks[lid].ghost[var.index()].buffer_mut(nb.bufid);
                    buf.send = send;
                    buf.send_state = state;
                }
            }
        }
        exec.fence();
        Ok(if complete { TaskStatus::Complete } else { TaskStatus::Incomplete })
    }

    fn receive(&self, mesh: &mut Mesh, part: &Partition) -> Result<TaskStatus> {
        let rank = mesh.rank();
        let Mesh { blocks, transport, .. } = mesh;
        let mut complete = true;

        for &lid in &part.lids {
            let block = &mut blocks[lid];
            let cache = cached(block);

            for &(var, _) in &cache.fields {
                for nb in &block.neighbors {
                    let buf = block.ghost[var.index()].buffer_mut(nb.bufid);

                    match buf.recv_state {
                        RecvState::Idle => {
                            return Err(Error::protocol(block.gid, format!(
                                "receive on buffer {} of field {}, which was never armed", nb.bufid, var.index())));
                        }
                        RecvState::Arrived | RecvState::Completed => {}
                        RecvState::Waiting if nb.rank == rank => complete = false,
                        RecvState::Waiting => {
                            let tag = boundary_tag(block.lid, nb.bufid, var.index(), Channel::Ghost);

                            match transport.try_recv(nb.rank, tag)? {
                                Some(message) => {
                                    if buf.store(&message) {
                                        warn!("block {}: receive buffer {} of field {} reallocated", block.gid, nb.bufid, var.index());
                                    }
                                }
                                None => complete = false,
                            }
                        }
                    }
                }
            }
        }
        Ok(if complete { TaskStatus::Complete } else { TaskStatus::Incomplete })
    }

    fn set_boundaries(&self, mesh: &mut Mesh, part: &Partition) -> Result<()> {
        let Mesh { blocks, exec, .. } = mesh;

        for &lid in &part.lids {
            let block = &mut blocks[lid];
            let cache = cached(block);
            let MeshBlock { gid, neighbors, ghost, data, .. } = block;

            for &(var, nv) in &cache.fields {
                for (nb, info) in neighbors.iter().zip(&cache.infos) {
                    let buf = ghost[var.index()].buffer_mut(nb.bufid);

                    if buf.recv_state != RecvState::Arrived {
                        continue;
                    }
                    if buf.recv_len != nv * info.set.cells.len() {
                        return Err(Error::protocol(*gid, format!(
                            "buffer {} of field {} holds {} values, expected {}",
                            nb.bufid, var.index(), buf.recv_len, nv * info.set.cells.len())));
                    }
                    let variable = data.get_mut(var);
                    let dst = match info.set.target {
                        Target::Fine => &mut variable.data,
                        Target::Coarse => variable
                            .coarse
                            .as_mut()
                            .ok_or_else(|| Error::protocol(*gid, "coarse buffer missing on a single-level mesh"))?,
                    };
                    unpack(exec, buf.received(), &info.set.cells, nv, dst);
                    buf.recv_state = RecvState::Completed;
                }
            }
        }
        exec.fence();
        Ok(())
    }

    fn clear_boundary(&self, mesh: &mut Mesh, part: &Partition, phase: BoundaryCommSubset) -> Result<()> {
        {
            let Mesh { blocks, transport, .. } = &mut *mesh;

            for &lid in &part.lids {
                let block = &mut blocks[lid];
                let cache = cached(block);

                for &(var, _) in &cache.fields {
                    for nb in &block.neighbors {
                        let buf = block.ghost[var.index()].buffer_mut(nb.bufid);

                        if let SendState::InFlight(request) = buf.send_state {
                            transport.wait(request)?;
                        }
                        buf.send_state = SendState::Idle;

                        if buf.recv_state != RecvState::Idle {
                            buf.recv_state = RecvState::Waiting;
                            buf.recv_len = 0;
                        }
                    }
                }
            }
        }
        if phase == BoundaryCommSubset::All {
            FluxCorrection.clear_boundary(mesh, part, phase)?;
        }
        Ok(())
    }
}




/// Fill `send` with the data for one neighbor, restricting into the coarse
/// buffer first when the neighbor is coarser.
fn load(
    exec: &ExecSpace,
    gid: usize,
    variable: &mut CellVariable,
    shapes: (&IndexShape, &IndexShape),
    info: &BufferInfo,
    nv: usize,
    send: &mut [f64]) -> Result<()>
{
    match info.load.target {
        Target::Fine => pack(exec, &variable.data, &info.load.cells, nv, send),
        Target::Coarse => {
            let CellVariable { data, coarse, .. } = variable;
            let coarse = coarse
                .as_mut()
                .ok_or_else(|| Error::protocol(gid, "coarse buffer missing on a single-level mesh"))?;
            restrict(exec, data, shapes.0, coarse, shapes.1, &info.load.cells, nv);
            pack(exec, coarse, &info.load.cells, nv, send);
        }
    }
    Ok(())
}
