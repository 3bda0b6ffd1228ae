use log::{debug, warn};
use crate::error::{Error, Result};
use crate::field::{Particle, Swarm, SwarmHandle};
use crate::index_space::Axis;
use crate::mesh::{Mesh, MeshBlock, Partition};
use crate::message::{boundary_tag, Channel};
use crate::tasks::TaskStatus;
use super::buffer::{RecvState, SendState};
use super::{BoundaryCommSubset, BoundaryExchangeable};




/**
 * The exchange of one particle swarm. A particle that has left its block's
 * extent is sent to the neighbor whose extent contains its position, after
 * the periodic wrap; particles leaving through a non-periodic domain
 * boundary are dropped. Every neighbor receives one message per phase, of
 * any length including zero.
 */
#[derive(Clone, Copy, Debug)]
pub struct SwarmExchange {
    pub swarm: SwarmHandle,
}




fn contains(extent: &[[f64; 2]; 3], x: &[f64; 3], active: [bool; 3]) -> bool {
    (0..3).all(|n| !active[n] || (extent[n][0] <= x[n] && x[n] < extent[n][1]))
}

/// Offset of a position from an extent, in `{-1, 0, 1}` per axis.
fn offset(extent: &[[f64; 2]; 3], x: &[f64; 3], active: [bool; 3]) -> [i32; 3] {
    let mut ox = [0; 3];

    for n in (0..3).filter(|n| active[*n]) {
        if x[n] < extent[n][0] {
            ox[n] = -1;
        } else if x[n] >= extent[n][1] {
            ox[n] = 1;
        }
    }
    ox
}




// ============================================================================
impl SwarmExchange {


    fn index(&self) -> usize {
        self.swarm.index()
    }


    fn already_sent(&self, block: &MeshBlock) -> bool {
        !block.neighbors.is_empty() && block
            .neighbors
            .iter()
            .all(|nb| block.particles[self.index()].buffer(nb.bufid).send_state.is_sent())
    }


    fn targets_armed(&self, mesh: &Mesh, lid: usize) -> bool {
        let rank = mesh.rank();

        mesh.blocks[lid]
            .neighbors
            .iter()
            .filter(|nb| nb.rank == rank)
            .all(|nb| mesh.blocks[nb.lid].particles[self.index()].buffer(nb.targetid).is_armed())
    }


    /**
     * Remove the particles that have left a block and sort them by the
     * neighbor they go to, in the order of the block's neighbors.
     */
    fn route(&self, mesh: &mut Mesh, lid: usize) -> Result<Vec<Vec<Particle>>> {
        let active = [
            true,
            mesh.blocks[lid].cellbounds.is_active(Axis::J),
            mesh.blocks[lid].cellbounds.is_active(Axis::K),
        ];
        let particles = std::mem::take(&mut mesh.blocks[lid].data.swarm_mut(self.swarm).particles);
        let block = &mesh.blocks[lid];
        let extent = mesh.block_extent(&block.loc);
        let mut outgoing = vec![Vec::new(); block.neighbors.len()];
        let mut staying = Vec::with_capacity(particles.len());
        let mut dropped = 0;

        for mut p in particles {
            let ox = offset(&extent, &p.x, active);

            if ox == [0, 0, 0] {
                staying.push(p);
                continue;
            }
            if block.nblevel.get(ox).is_none() {
                dropped += 1;
                continue;
            }
            p.x = mesh.wrap_position(p.x);

            let n = block
                .neighbors
                .iter()
                .position(|nb| contains(&mesh.block_extent(&nb.loc), &p.x, active))
                .ok_or_else(|| Error::protocol(block.gid, format!(
                    "particle at {:?} is outside every neighbor", p.x)))?;
            outgoing[n].push(p);
        }
        if dropped > 0 {
            debug!("block {}: {} particle(s) left the domain", block.gid, dropped);
        }
        mesh.blocks[lid].data.swarm_mut(self.swarm).particles = staying;
        Ok(outgoing)
    }
}




// ============================================================================
impl BoundaryExchangeable for SwarmExchange {
    fn start_receiving(&self, mesh: &mut Mesh, part: &Partition, _phase: BoundaryCommSubset) -> Result<()> {
        for &lid in &part.lids {
            let block = &mut mesh.blocks[lid];

            for nb in &block.neighbors {
                let buf = block.particles[self.index()].buffer_mut(nb.bufid);

                if buf.recv_state == RecvState::Arrived {
                    return Err(Error::protocol(block.gid, format!(
                        "re-arming particle buffer {} before its particles were added", nb.bufid)));
                }
                buf.recv_len = 0;
                buf.recv_state = RecvState::Waiting;
            }
        }
        Ok(())
    }

    fn send(&self, mesh: &mut Mesh, part: &Partition) -> Result<TaskStatus> {
        let rank = mesh.rank();
        let mut complete = true;

        for &lid in &part.lids {
            if self.already_sent(&mesh.blocks[lid]) {
                continue;
            }
            if !self.targets_armed(mesh, lid) {
                complete = false;
                continue;
            }
            let outgoing = self.route(mesh, lid)?;
            let gid = mesh.blocks[lid].gid;

            for (n, particles) in outgoing.into_iter().enumerate() {
                let nb = mesh.blocks[lid].neighbors[n].clone();
                let mut send = std::mem::take(&mut mesh.blocks[lid].particles[self.index()].buffer_mut(nb.bufid).send);
                Swarm::flatten(&particles, &mut send);

                let state = if nb.rank == rank {
                    let target = mesh.blocks[nb.lid].particles[self.index()].buffer_mut(nb.targetid);

                    if target.store(&send) {
                        warn!("block {}: particle buffer {} reallocated", nb.gid, nb.targetid);
                    }
                    SendState::Completed
                } else {
                    let tag = boundary_tag(nb.lid, nb.targetid, self.index(), Channel::Swarm);
                    SendState::InFlight(mesh.transport.isend(nb.rank, tag, &send)?)
                };
                if !particles.is_empty() {
                    debug!("block {}: {} particle(s) sent to block {}", gid, particles.len(), nb.gid);
                }
                let buf = mesh.blocks[lid].particles[self.index()].buffer_mut(nb.bufid);
                buf.send = send;
                buf.send_state = state;
            }
        }
        Ok(if complete { TaskStatus::Complete } else { TaskStatus::Incomplete })
    }

    fn receive(&self, mesh: &mut Mesh, part: &Partition) -> Result<TaskStatus> {
        let rank = mesh.rank();
        let Mesh { blocks, transport, .. } = mesh;
        let mut complete = true;

        for &lid in &part.lids {
            let block = &mut blocks[lid];

            for nb in &block.neighbors {
                let buf = block.particles[self.index()].buffer_mut(nb.bufid);

                match buf.recv_state {
                    RecvState::Idle => {
                        return Err(Error::protocol(block.gid, format!(
                            "receive on particle buffer {}, which was never armed", nb.bufid)));
                    }
                    RecvState::Arrived | RecvState::Completed => {}
                    RecvState::Waiting if nb.rank == rank => complete = false,
                    RecvState::Waiting => {
                        let tag = boundary_tag(block.lid, nb.bufid, self.index(), Channel::Swarm);

                        match transport.try_recv(nb.rank, tag)? {
                            Some(message) => {
                                if buf.store(&message) {
                                    warn!("block {}: particle buffer {} reallocated", block.gid, nb.bufid);
                                }
                            }
                            None => complete = false,
                        }
                    }
                }
            }
        }
        Ok(if complete { TaskStatus::Complete } else { TaskStatus::Incomplete })
    }

    fn set_boundaries(&self, mesh: &mut Mesh, part: &Partition) -> Result<()> {
        for &lid in &part.lids {
            let MeshBlock { gid, neighbors, data, particles, .. } = &mut mesh.blocks[lid];
            let swarm = data.swarm_mut(self.swarm);

            for nb in neighbors.iter() {
                let buf = particles[self.index()].buffer_mut(nb.bufid);

                if buf.recv_state != RecvState::Arrived {
                    continue;
                }
                if buf.recv_len % swarm.stride() != 0 {
                    return Err(Error::protocol(*gid, format!(
                        "particle buffer {} holds {} values, not a multiple of {}", nb.bufid, buf.recv_len, swarm.stride())));
                }
                swarm.extend_from_flat(buf.received());
                buf.recv_state = RecvState::Completed;
            }
        }
        Ok(())
    }

    fn clear_boundary(&self, mesh: &mut Mesh, part: &Partition, _phase: BoundaryCommSubset) -> Result<()> {
        let Mesh { blocks, transport, .. } = mesh;

        for &lid in &part.lids {
            let block = &mut blocks[lid];

            for nb in &block.neighbors {
                let buf = block.particles[self.index()].buffer_mut(nb.bufid);

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
        Ok(())
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use crate::mesh::fixtures::line_mesh;
    use crate::message::{SerialTransport, Transport};
    use crate::thread_pool::run_ranks;
    use super::*;

    fn exchange(mesh: &mut Mesh, swarm: &SwarmExchange) {
        let part = mesh.partitions(1).remove(0);
        swarm.start_receiving(mesh, &part, BoundaryCommSubset::All).unwrap();
        assert_eq!(swarm.send(mesh, &part).unwrap(), TaskStatus::Complete);
        assert_eq!(swarm.receive(mesh, &part).unwrap(), TaskStatus::Complete);
        swarm.set_boundaries(mesh, &part).unwrap();
        swarm.clear_boundary(mesh, &part, BoundaryCommSubset::All).unwrap();
    }

    fn particle(x: f64) -> Particle {
        Particle { x: [x, 0.5, 0.5], data: vec![x * 10.0] }
    }

    #[test]
    fn particles_move_to_the_block_containing_them() {
        let mut mesh = line_mesh(Box::new(SerialTransport));
        let swarm = SwarmExchange { swarm: mesh.add_swarm("tracers", 1) };

        // The blocks span [0, 0.5) and [0.5, 1) along x.
        mesh.blocks[0].data.swarm_mut(swarm.swarm).particles = vec![particle(0.25), particle(0.75)];
        exchange(&mut mesh, &swarm);

        assert_eq!(mesh.blocks[0].data.swarm(swarm.swarm).particles, vec![particle(0.25)]);
        assert_eq!(mesh.blocks[1].data.swarm(swarm.swarm).particles, vec![particle(0.75)]);
    }

    #[test]
    fn particles_leaving_the_domain_are_dropped() {
        let mut mesh = line_mesh(Box::new(SerialTransport));
        let swarm = SwarmExchange { swarm: mesh.add_swarm("tracers", 1) };

        mesh.blocks[1].data.swarm_mut(swarm.swarm).particles = vec![particle(1.25)];
        exchange(&mut mesh, &swarm);

        assert!(mesh.blocks.iter().all(|b| b.data.swarm(swarm.swarm).particles.is_empty()));
    }

    /// Run one exchange over a mesh whose neighbors may be on other ranks,
    /// polling until every message has arrived.
    fn exchange_across_ranks(mesh: &mut Mesh, swarm: &SwarmExchange) -> Result<()> {
        let part = mesh.partitions(1).remove(0);
        swarm.start_receiving(mesh, &part, BoundaryCommSubset::All)?;

        while swarm.send(mesh, &part)? != TaskStatus::Complete {}
        while swarm.receive(mesh, &part)? != TaskStatus::Complete {}

        swarm.set_boundaries(mesh, &part)?;
        swarm.clear_boundary(mesh, &part, BoundaryCommSubset::All)
    }

    #[test]
    fn particles_cross_rank_boundaries() {
        let kept = run_ranks(2, |transport| {
            let rank = transport.rank();
            let mut mesh = line_mesh(Box::new(transport));
            let swarm = SwarmExchange { swarm: mesh.add_swarm("tracers", 1) };

            // Each rank owns one block; each sends one particle across.
            mesh.blocks[0].data.swarm_mut(swarm.swarm).particles = match rank {
                0 => vec![particle(0.25), particle(0.75)],
                _ => vec![particle(0.625), particle(0.125)],
            };
            exchange_across_ranks(&mut mesh, &swarm).unwrap();
            mesh.blocks[0].data.swarm(swarm.swarm).particles.clone()
        })
        .unwrap();

        assert_eq!(kept[0], vec![particle(0.25), particle(0.125)]);
        assert_eq!(kept[1], vec![particle(0.625), particle(0.75)]);
    }

    #[test]
    fn ragged_particle_message_from_another_rank_is_an_error() {
        let results = run_ranks(2, |transport| {
            let rank = transport.rank();
            let mut mesh = line_mesh(Box::new(transport));
            let swarm = SwarmExchange { swarm: mesh.add_swarm("tracers", 1) };

            if rank == 1 {
                // Five values are not a whole number of particles.
                let nb = &mesh.blocks[0].neighbors[0];
                let tag = boundary_tag(nb.lid, nb.targetid, swarm.swarm.index(), Channel::Swarm);
                mesh.transport.isend(nb.rank, tag, &[0.0; 5]).unwrap();
                return true;
            }
            matches!(exchange_across_ranks(&mut mesh, &swarm), Err(Error::Protocol { .. }))
        })
        .unwrap();

        assert_eq!(results, vec![true, true]);
    }

    #[test]
    fn send_waits_for_local_neighbors_to_arm() {
        let mut mesh = line_mesh(Box::new(SerialTransport));
        let swarm = SwarmExchange { swarm: mesh.add_swarm("tracers", 1) };
        let parts = mesh.partitions(2);

        mesh.blocks[0].data.swarm_mut(swarm.swarm).particles = vec![particle(0.75)];
        swarm.start_receiving(&mut mesh, &parts[0], BoundaryCommSubset::All).unwrap();

        assert_eq!(swarm.send(&mut mesh, &parts[0]).unwrap(), TaskStatus::Incomplete);
        assert_eq!(mesh.blocks[0].data.swarm(swarm.swarm).particles.len(), 1);

        swarm.start_receiving(&mut mesh, &parts[1], BoundaryCommSubset::All).unwrap();
        assert_eq!(swarm.send(&mut mesh, &parts[0]).unwrap(), TaskStatus::Complete);
        assert!(mesh.blocks[0].data.swarm(swarm.swarm).particles.is_empty());
    }
}
