use log::{debug, warn};
use crate::array::ParArray4;
use crate::error::{Error, Result};
use crate::field::{CellVariable, VarHandle};
use crate::index_space::{Axis, IndexDomain, IndexRange, IndexShape};
use crate::mesh::{Mesh, MeshBlock, Partition};
use crate::message::{boundary_tag, Channel};
use crate::neighbor::{BoundaryFace, LevelRelation, NeighborBlock};
use crate::tasks::TaskStatus;
use super::buffer::{RecvState, SendState};
use super::{BoundaryCommSubset, BoundaryExchangeable};




/// The flux-correction channel. At a face where a block meets finer
/// neighbors, the coarse block's flux is replaced by the average of the
/// finer neighbors' fluxes through the same face, so that what leaves one
/// side enters the other. Fine blocks send, coarse blocks receive; `receive`
/// writes each correction as soon as it arrives and `set_boundaries` has
/// nothing left to do.
#[derive(Clone, Copy, Debug, Default)]
pub struct FluxCorrection;




fn flux_fields(block: &MeshBlock) -> Vec<(VarHandle, usize)> {
    block
        .data
        .vars()
        .filter(|(_, v)| v.metadata.with_fluxes)
        .map(|(h, v)| (h, v.num_components()))
        .collect()
}

fn face_of(nb: &NeighborBlock, level: i32, relation: LevelRelation) -> Option<BoundaryFace> {
    if nb.relation(level) == relation {
        nb.fid
    } else {
        None
    }
}

/// The two axes along a face normal to `axis`, in `i, j, k` order.
fn tangential(axis: Axis) -> [Axis; 2] {
    match axis {
        Axis::I => [Axis::J, Axis::K],
        Axis::J => [Axis::I, Axis::K],
        Axis::K => [Axis::I, Axis::J],
    }
}

/// Number of coarse faces along a tangential axis.
fn coarse_count(shape: &IndexShape, axis: Axis) -> usize {
    if shape.is_active(axis) {
        shape.nx(axis) / 2
    } else {
        1
    }
}

/// Index of the flux array on the given face of the interior.
fn face_index(shape: &IndexShape, face: BoundaryFace) -> i64 {
    let axis = face.axis();
    shape.bounds(axis, IndexDomain::Interior).s + (shape.nx(axis) * face.side()) as i64
}

fn flux_array<'a>(var: &'a mut CellVariable, gid: usize, axis: Axis) -> Result<&'a mut ParArray4> {
    let label = var.label.clone();
    var.flux_mut(axis)
        .ok_or_else(|| Error::protocol(gid, format!("field '{}' has no flux along {:?}", label, axis)))
}

fn message_len(shape: &IndexShape, face: BoundaryFace, nv: usize) -> usize {
    let [ta, tb] = tangential(face.axis());
    nv * coarse_count(shape, ta) * coarse_count(shape, tb)
}

/// Return the `(k, j, i)` index of a face, given the face index along the
/// normal and the indexes along the tangential axes.
fn face_point(normal: Axis, n: i64, ta: i64, tb: i64) -> (i64, i64, i64) {
    match normal {
        Axis::I => (tb, ta, n),
        Axis::J => (tb, n, ta),
        Axis::K => (n, tb, ta),
    }
}




/// Average the fluxes through the fine faces covering each coarse face of
/// `face`, in the order `ta` fastest, then `tb`, then the component.
fn restrict_face(flux: &ParArray4, shape: &IndexShape, face: BoundaryFace, nv: usize, out: &mut [f64]) {
    let normal = face.axis();
    let [ta, tb] = tangential(normal);
    let (na, nb) = (coarse_count(shape, ta), coarse_count(shape, tb));
    let (ra, rb) = (if shape.is_active(ta) { 2 } else { 1 }, if shape.is_active(tb) { 2 } else { 1 });
    let sa = shape.bounds(ta, IndexDomain::Interior).s;
    let sb = shape.bounds(tb, IndexDomain::Interior).s;
    let n = face_index(shape, face);
    let weight = 1.0 / (ra * rb) as f64;

    for v in 0..nv {
        for cb in 0..nb as i64 {
            for ca in 0..na as i64 {
                let mut sum = 0.0;

                for db in 0..rb {
                    for da in 0..ra {
                        let (k, j, i) = face_point(normal, n, sa + ra * ca + da, sb + rb * cb + db);
                        sum += flux.get(v, k, j, i);
                    }
                }
                out[ca as usize + na * (cb as usize + nb * v)] = sum * weight;
            }
        }
    }
}

/// Overwrite the fluxes through the part of `face` covered by the finer
/// neighbor `nb` with the received values.
fn apply_correction(flux: &mut ParArray4, shape: &IndexShape, face: BoundaryFace, nb: &NeighborBlock, nv: usize, data: &[f64]) {
    let normal = face.axis();
    let [ta, tb] = tangential(normal);
    let half = |axis: Axis| {
        let b = shape.bounds(axis, IndexDomain::Interior);

        if !shape.is_active(axis) {
            b
        } else if nb.ni.fine_index(axis) == 1 {
            IndexRange::new(b.s + b.len() as i64 / 2, b.e)
        } else {
            IndexRange::new(b.s, b.e - b.len() as i64 / 2)
        }
    };
    let (ra, rb) = (half(ta), half(tb));
    let n = face_index(shape, face);
    let mut p = 0;

    for v in 0..nv {
        for b in rb.iter() {
            for a in ra.iter() {
                let (k, j, i) = face_point(normal, n, a, b);
                flux.set(v, k, j, i, data[p]);
                p += 1;
            }
        }
    }
}




// ============================================================================
impl BoundaryExchangeable for FluxCorrection {
    fn start_receiving(&self, mesh: &mut Mesh, part: &Partition, _phase: BoundaryCommSubset) -> Result<()> {
        for &lid in &part.lids {
            let block = &mut mesh.blocks[lid];
            let level = block.loc.level;

            for (var, nv) in flux_fields(block) {
                for nb in &block.neighbors {
                    if let Some(face) = face_of(nb, level, LevelRelation::Finer) {
                        let len = message_len(&block.cellbounds, face, nv);
                        let buf = block.flux[var.index()].buffer_mut(nb.bufid);

                        if buf.recv_state == RecvState::Arrived {
                            return Err(Error::protocol(block.gid, format!(
                                "re-arming flux buffer {} before the correction was applied", nb.bufid)));
                        }
                        buf.recv.resize(len, 0.0);
                        buf.recv_len = 0;
                        buf.recv_state = RecvState::Waiting;
                    }
                }
            }
        }
        Ok(())
    }

    fn send(&self, mesh: &mut Mesh, part: &Partition) -> Result<TaskStatus> {
        let rank = mesh.rank();
        let Mesh { blocks, transport, .. } = mesh;
        let mut complete = true;

        for &lid in &part.lids {
            let level = blocks[lid].loc.level;
            let gid = blocks[lid].gid;

            for (var, nv) in flux_fields(&blocks[lid]) {
                for n in 0..blocks[lid].neighbors.len() {
                    let nb = blocks[lid].neighbors[n].clone();
                    let face = match face_of(&nb, level, LevelRelation::Coarser) {
                        Some(face) => face,
                        None => continue,
                    };
                    if blocks[lid].flux[var.index()].buffer(nb.bufid).send_state.is_sent() {
                        continue;
                    }
                    let local = nb.rank == rank;

                    if local {
                        match blocks[nb.lid].flux[var.index()].buffer(nb.targetid).recv_state {
                            RecvState::Waiting => {}
                            RecvState::Arrived => {
                                return Err(Error::protocol(gid, format!(
                                    "block {} has not applied the last flux correction", nb.gid)));
                            }
                            RecvState::Idle | RecvState::Completed => {
                                complete = false;
                                continue;
                            }
                        }
                    }

                    let MeshBlock { data, cellbounds, flux, .. } = &mut blocks[lid];
                    let mut send = std::mem::take(&mut flux[var.index()].buffer_mut(nb.bufid).send);
                    send.resize(message_len(cellbounds, face, nv), 0.0);
                    restrict_face(flux_array(data.get_mut(var), gid, face.axis())?, cellbounds, face, nv, &mut send);

                    let state = if local {
                        let target = blocks[nb.lid].flux[var.index()].buffer_mut(nb.targetid);

                        if target.store(&send) {
                            warn!("block {}: flux buffer {} reallocated", nb.gid, nb.targetid);
                        }
                        SendState::Completed
                    } else {
                        let tag = boundary_tag(nb.lid, nb.targetid, var.index(), Channel::FluxCorrection);
                        SendState::InFlight(transport.isend(nb.rank, tag, &send)?)
                    };
                    debug!("block {}: flux correction for field {} sent to block {}", gid, var.index(), nb.gid);

                    let buf = blocks[lid].flux[var.index()].buffer_mut(nb.bufid);
                    buf.send = send;
                    buf.send_state = state;
                }
            }
        }
        Ok(if complete { TaskStatus::Complete } else { TaskStatus::Incomplete })
    }

    fn receive(&self, mesh: &mut Mesh, part: &Partition) -> Result<TaskStatus> {
        let rank = mesh.rank();
        let Mesh { blocks, transport, .. } = mesh;
        let mut complete = true;

        for &lid in &part.lids {
            let fields = flux_fields(&blocks[lid]);
            let MeshBlock { gid, lid: my_lid, loc, cellbounds, neighbors, data, flux, .. } = &mut blocks[lid];

            for (var, nv) in fields {
                for nb in neighbors.iter() {
                    let face = match face_of(nb, loc.level, LevelRelation::Finer) {
                        Some(face) => face,
                        None => continue,
                    };
                    let buf = flux[var.index()].buffer_mut(nb.bufid);

                    match buf.recv_state {
                        RecvState::Idle => {
                            return Err(Error::protocol(*gid, format!(
                                "receive on flux buffer {}, which was never armed", nb.bufid)));
                        }
                        RecvState::Completed => continue,
                        RecvState::Arrived => {}
                        RecvState::Waiting if nb.rank == rank => {
                            complete = false;
                            continue;
                        }
                        RecvState::Waiting => {
                            let tag = boundary_tag(*my_lid, nb.bufid, var.index(), Channel::FluxCorrection);

                            match transport.try_recv(nb.rank, tag)? {
                                Some(message) => {
                                    if buf.store(&message) {
                                        warn!("block {}: flux buffer {} reallocated", gid, nb.bufid);
                                    }
                                }
                                None => {
                                    complete = false;
                                    continue;
                                }
                            }
                        }
                    }

                    let expected = message_len(cellbounds, face, nv);

                    if buf.recv_len != expected {
                        return Err(Error::protocol(*gid, format!(
                            "flux buffer {} holds {} values, expected {}", nb.bufid, buf.recv_len, expected)));
                    }
                    let target = flux_array(data.get_mut(var), *gid, face.axis())?;
                    apply_correction(target, cellbounds, face, nb, nv, buf.received());
                    buf.recv_state = RecvState::Completed;
                }
            }
        }
        Ok(if complete { TaskStatus::Complete } else { TaskStatus::Incomplete })
    }

    fn set_boundaries(&self, _mesh: &mut Mesh, _part: &Partition) -> Result<()> {
        Ok(())
    }

    fn sets_on_receive(&self) -> bool {
        true
    }

    fn clear_boundary(&self, mesh: &mut Mesh, part: &Partition, _phase: BoundaryCommSubset) -> Result<()> {
        let Mesh { blocks, transport, .. } = mesh;

        for &lid in &part.lids {
            let block = &mut blocks[lid];

            for (var, _) in flux_fields(block) {
                for nb in &block.neighbors {
                    let buf = block.flux[var.index()].buffer_mut(nb.bufid);

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
        Ok(())
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use crate::field::{FieldSpec, Metadata};
    use crate::mesh::fixtures::{cube_mesh, split_two_level_mesh, two_level_mesh};
    use crate::message::Transport;
    use crate::neighbor::LogicalLocation;
    use crate::thread_pool::run_ranks;
    use super::*;

    fn conserved(mesh: &mut Mesh) -> VarHandle {
        mesh.add_field(FieldSpec {
            label: "u".to_string(),
            components: 1,
            metadata: Metadata { fill_ghost: true, with_fluxes: true },
        })
        .unwrap()
    }

    #[test]
    fn coarse_face_flux_is_replaced_by_the_fine_average() {
        let mut mesh = two_level_mesh();
        let u = conserved(&mut mesh);
        striped_fine_flux(&mut mesh, u);
        let part = mesh.partitions(1).remove(0);

        FluxCorrection.start_receiving(&mut mesh, &part, BoundaryCommSubset::All).unwrap();
        assert_eq!(FluxCorrection.send(&mut mesh, &part).unwrap(), TaskStatus::Complete);
        assert_eq!(FluxCorrection.receive(&mut mesh, &part).unwrap(), TaskStatus::Complete);

        let coarse = mesh.find_local(&LogicalLocation::new(0, [0, 0, 0])).unwrap();
        let flux = coarse.data.get(u).flux(Axis::I).unwrap();

        for j in 2..6 {
            // Both faces of the coarse block meet finer blocks, across the
            // periodic boundary on the left.
            assert_eq!(flux.get(0, 0, j, 2), 3.0);
            assert_eq!(flux.get(0, 0, j, 6), 3.0);
            assert_eq!(flux.get(0, 0, j, 4), 0.0);
        }
    }

    /// Give the fine blocks a flux through x faces of 2 on even rows and 4
    /// on odd ones.
    fn striped_fine_flux(mesh: &mut Mesh, u: VarHandle) {
        for block in mesh.blocks.iter_mut().filter(|b| b.level() == 1) {
            let flux = block.data.get_mut(u).flux_mut(Axis::I).unwrap();
            let [_, _, nj, ni] = flux.dims();

            for j in 0..nj as i64 {
                for i in 0..ni as i64 {
                    flux.set(0, 0, j, i, if j % 2 == 0 { 2.0 } else { 4.0 });
                }
            }
        }
    }

    #[test]
    fn corrections_cross_rank_boundaries() {
        let faces = run_ranks(2, |transport| {
            let mut mesh = split_two_level_mesh(Box::new(transport));
            let u = conserved(&mut mesh);
            striped_fine_flux(&mut mesh, u);
            let part = mesh.partitions(1).remove(0);

            FluxCorrection.start_receiving(&mut mesh, &part, BoundaryCommSubset::All).unwrap();
            assert_eq!(FluxCorrection.send(&mut mesh, &part).unwrap(), TaskStatus::Complete);

            while FluxCorrection.receive(&mut mesh, &part).unwrap() != TaskStatus::Complete {}
            FluxCorrection.clear_boundary(&mut mesh, &part, BoundaryCommSubset::All).unwrap();

            match mesh.find_local(&LogicalLocation::new(0, [0, 0, 0])) {
                Some(coarse) => {
                    let flux = coarse.data.get(u).flux(Axis::I).unwrap();
                    (2..6).flat_map(|j| vec![flux.get(0, 0, j, 2), flux.get(0, 0, j, 6)]).collect()
                }
                None => Vec::new(),
            }
        })
        .unwrap();

        assert_eq!(faces[0], vec![3.0; 8]);
        assert!(faces[1].is_empty());
    }

    #[test]
    fn short_correction_from_another_rank_is_an_error() {
        let results = run_ranks(2, |transport| {
            let rank = transport.rank();
            let mut mesh = split_two_level_mesh(Box::new(transport));

            if rank == 1 {
                // Send a truncated correction from a fine block to the
                // coarse one.
                let fine = mesh.find_local(&LogicalLocation::new(1, [2, 0, 0])).unwrap();
                let nb = fine
                    .neighbors
                    .iter()
                    .find(|nb| nb.fid.is_some() && nb.relation(1) == LevelRelation::Coarser)
                    .unwrap();
                let tag = boundary_tag(nb.lid, nb.targetid, 0, Channel::FluxCorrection);
                mesh.transport.isend(0, tag, &[1.0]).unwrap();
                return true;
            }
            conserved(&mut mesh);
            let part = mesh.partitions(1).remove(0);
            FluxCorrection.start_receiving(&mut mesh, &part, BoundaryCommSubset::All).unwrap();

            loop {
                match FluxCorrection.receive(&mut mesh, &part) {
                    Ok(TaskStatus::Incomplete) => continue,
                    Ok(_) => return false,
                    Err(e) => return matches!(e, Error::Protocol { .. }),
                }
            }
        })
        .unwrap();

        assert_eq!(results, vec![true, true]);
    }

    #[test]
    fn fine_quadrants_correct_a_coarse_face_in_3d() {
        let mut mesh = cube_mesh();
        let u = conserved(&mut mesh);

        for block in mesh.blocks.iter_mut().filter(|b| b.level() == 1) {
            let value = 1.0 + 10.0 * block.loc.parity(Axis::J) as f64 + 100.0 * block.loc.parity(Axis::K) as f64;
            block.data.get_mut(u).flux_mut(Axis::I).unwrap().fill(value);
        }
        let part = mesh.partitions(1).remove(0);

        FluxCorrection.start_receiving(&mut mesh, &part, BoundaryCommSubset::All).unwrap();
        assert_eq!(FluxCorrection.send(&mut mesh, &part).unwrap(), TaskStatus::Complete);
        assert_eq!(FluxCorrection.receive(&mut mesh, &part).unwrap(), TaskStatus::Complete);

        // The root block below the refined one along x meets its four
        // lower-x children through its upper x face.
        let coarse = mesh.find_local(&LogicalLocation::new(0, [0, 1, 1])).unwrap();
        let flux = coarse.data.get(u).flux(Axis::I).unwrap();

        for k in 2..6 {
            for j in 2..6 {
                let expected = 1.0 + if j >= 4 { 10.0 } else { 0.0 } + if k >= 4 { 100.0 } else { 0.0 };
                assert_eq!(flux.get(0, k, j, 6), expected, "face ({}, {})", j, k);
                assert_eq!(flux.get(0, k, j, 2), 0.0);
            }
        }
    }

    #[test]
    fn cleared_buffers_can_be_armed_again() {
        let mut mesh = two_level_mesh();
        let u = conserved(&mut mesh);
        let part = mesh.partitions(1).remove(0);

        for _ in 0..2 {
            FluxCorrection.start_receiving(&mut mesh, &part, BoundaryCommSubset::All).unwrap();
            FluxCorrection.send(&mut mesh, &part).unwrap();
            FluxCorrection.receive(&mut mesh, &part).unwrap();
            FluxCorrection.clear_boundary(&mut mesh, &part, BoundaryCommSubset::All).unwrap();
        }
        let coarse = &mesh.blocks[0];

        let armed = coarse
            .neighbors
            .iter()
            .filter(|nb| nb.fid.is_some() && nb.relation(0) == LevelRelation::Finer);

        for nb in armed {
            let buf = coarse.flux_buffers(u).buffer(nb.bufid);
            assert_eq!(buf.recv_state(), RecvState::Waiting);
            assert_eq!(buf.send_state(), SendState::Idle);
        }
    }

    #[test]
    fn unapplied_correction_cannot_be_rearmed() {
        let mut mesh = two_level_mesh();
        conserved(&mut mesh);
        let part = mesh.partitions(1).remove(0);

        FluxCorrection.start_receiving(&mut mesh, &part, BoundaryCommSubset::All).unwrap();
        FluxCorrection.send(&mut mesh, &part).unwrap();
        assert!(FluxCorrection.start_receiving(&mut mesh, &part, BoundaryCommSubset::All).is_err());
    }
}
