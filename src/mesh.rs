use std::collections::HashMap;
use std::sync::Arc;
use log::{debug, info};
use crate::bvals::buffer::BoundaryData;
use crate::bvals::cell_centered::BufferCache;
use crate::config::MeshConfig;
use crate::coordinates::UniformCartesian;
use crate::error::{Error, Result};
use crate::field::{BlockData, CellVariable, FieldSpec, Swarm, SwarmHandle, VarHandle};
use crate::index_space::{Axis, IndexShape};
use crate::kernel::ExecSpace;
use crate::message::Transport;
use crate::neighbor::{
    buffer_id,
    fine_indexes,
    BoundaryFace,
    LogicalLocation,
    NeighborBlock,
    NeighborIndexes,
    NeighborLevels,
};




/**
 * A block of the mesh owned by this process: its place in the hierarchy,
 * its geometry, the blocks around it, and the data it carries.
 */
pub struct MeshBlock {
    pub gid: usize,
    pub lid: usize,
    pub loc: LogicalLocation,
    pub cellbounds: IndexShape,
    pub c_cellbounds: IndexShape,
    pub coords: UniformCartesian,
    pub neighbors: Vec<NeighborBlock>,
    pub nblevel: NeighborLevels,
    pub data: BlockData,
    pub(crate) ghost: Vec<BoundaryData>,
    pub(crate) flux: Vec<BoundaryData>,
    pub(crate) particles: Vec<BoundaryData>,
    pub(crate) cache: Option<Arc<BufferCache>>,
}

impl MeshBlock {
    pub fn level(&self) -> i32 {
        self.loc.level
    }

    /// Return the ghost-exchange buffers of a field.
    pub fn ghost_buffers(&self, var: VarHandle) -> &BoundaryData {
        &self.ghost[var.index()]
    }

    /// Return the flux-correction buffers of a field.
    pub fn flux_buffers(&self, var: VarHandle) -> &BoundaryData {
        &self.flux[var.index()]
    }

    /// Return the particle buffers of a swarm.
    pub fn swarm_buffers(&self, swarm: SwarmHandle) -> &BoundaryData {
        &self.particles[swarm.index()]
    }
}




/**
 * A subset of this process's blocks, processed by one task list.
 */
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Partition {
    pub id: usize,
    pub lids: Vec<usize>,
}




/**
 * The block-structured mesh as seen from one process. Every process knows
 * the location and owner of every block; it stores only its own blocks,
 * indexed by their local id. Blocks are identified globally by their index
 * in the list of locations the mesh was built from.
 */
pub struct Mesh {
    config: MeshConfig,
    shape: IndexShape,
    coarse_shape: IndexShape,
    locations: Vec<LogicalLocation>,
    ranks: Vec<usize>,
    lids: Vec<usize>,
    lookup: HashMap<LogicalLocation, usize>,
    multilevel: bool,
    fields: Vec<FieldSpec>,
    swarms: Vec<(String, usize)>,
    pub blocks: Vec<MeshBlock>,
    pub(crate) transport: Box<dyn Transport>,
    pub(crate) exec: ExecSpace,
}




// ============================================================================
impl Mesh {


    /**
     * Create a mesh of the root blocks only.
     */
    pub fn uniform(config: MeshConfig, transport: Box<dyn Transport>) -> Result<Self> {
        let locations = root_locations(&config);
        Self::new(config, locations, transport)
    }


    /**
     * Create a mesh from a list of block locations, assigning contiguous
     * runs of blocks to the ranks of the transport.
     */
    pub fn new(config: MeshConfig, locations: Vec<LogicalLocation>, transport: Box<dyn Transport>) -> Result<Self> {
        let size = transport.size();
        let count = locations.len();
        let ranks = (0..count).map(|n| n * size / count.max(1)).collect();
        Self::with_ranks(config, locations, ranks, transport)
    }


    /**
     * Create a mesh from a list of block locations and the rank owning each
     * block. The locations must tile the domain without overlapping, and
     * blocks sharing a face, edge or corner may differ by at most one level.
     */
    pub fn with_ranks(
        config: MeshConfig,
        locations: Vec<LogicalLocation>,
        ranks: Vec<usize>,
        transport: Box<dyn Transport>) -> Result<Self>
    {
        if ranks.len() != locations.len() {
            return Err(Error::Config(format!("{} ranks given for {} blocks", ranks.len(), locations.len())));
        }
        if let Some(r) = ranks.iter().find(|r| **r >= transport.size()) {
            return Err(Error::Config(format!("rank {} is outside a group of {}", r, transport.size())));
        }
        let shape = IndexShape::new(config.block_size, config.nghost);
        let lookup = check_tiling(&config, &shape, &locations)?;
        let max_level = locations.iter().map(|l| l.level).max().unwrap_or(0);
        config.validate(max_level as usize + 1)?;

        let coarse_shape = shape.coarsened(config.coarse_nghost());

        let mut counters = vec![0; transport.size()];
        let lids: Vec<usize> = ranks
            .iter()
            .map(|r| {
                counters[*r] += 1;
                counters[*r] - 1
            })
            .collect();

        let mut mesh = Self {
            exec: ExecSpace::new(config.min_parallel_rows),
            config,
            shape,
            coarse_shape,
            locations,
            ranks,
            lids,
            lookup,
            multilevel: max_level > 0,
            fields: Vec::new(),
            swarms: Vec::new(),
            blocks: Vec::new(),
            transport,
        };

        let rank = mesh.transport.rank();
        let mut blocks = Vec::new();

        for gid in (0..mesh.locations.len()).filter(|g| mesh.ranks[*g] == rank) {
            let loc = mesh.locations[gid];
            let (neighbors, nblevel) = mesh.find_neighbors(&loc)?;

            blocks.push(MeshBlock {
                gid,
                lid: mesh.lids[gid],
                loc,
                cellbounds: mesh.shape.clone(),
                c_cellbounds: mesh.coarse_shape.clone(),
                coords: UniformCartesian::new(mesh.block_extent(&loc), &mesh.shape),
                neighbors,
                nblevel,
                data: BlockData::default(),
                ghost: Vec::new(),
                flux: Vec::new(),
                particles: Vec::new(),
                cache: None,
            });
        }
        mesh.blocks = blocks;

        info!("rank {}: {} of {} blocks on {} level(s)", rank, mesh.blocks.len(), mesh.locations.len(), max_level + 1);
        Ok(mesh)
    }


    pub fn config(&self) -> &MeshConfig {
        &self.config
    }


    pub fn rank(&self) -> usize {
        self.transport.rank()
    }


    /**
     * Return whether blocks at more than one refinement level exist, so
     * that level-jump relations may occur.
     */
    pub fn is_multilevel(&self) -> bool {
        self.multilevel
    }


    pub fn num_global_blocks(&self) -> usize {
        self.locations.len()
    }


    pub fn location(&self, gid: usize) -> LogicalLocation {
        self.locations[gid]
    }


    pub fn exec(&self) -> &ExecSpace {
        &self.exec
    }


    pub fn fields(&self) -> impl Iterator<Item = (VarHandle, &FieldSpec)> {
        self.fields.iter().enumerate().map(|(n, f)| (VarHandle(n), f))
    }


    /**
     * Register a cell-centered field, allocating it on every local block.
     * Cached exchange metadata is invalidated.
     */
    pub fn add_field(&mut self, spec: FieldSpec) -> Result<VarHandle> {
        if self.fields.iter().any(|f| f.label == spec.label) {
            return Err(Error::Config(format!("field '{}' is already registered", spec.label)));
        }
        if spec.components == 0 {
            return Err(Error::Config(format!("field '{}' has no components", spec.label)));
        }
        let multilevel = self.multilevel;

        for block in &mut self.blocks {
            let coarse = if multilevel { Some(&block.c_cellbounds) } else { None };
            let var = CellVariable::allocate(&spec, &block.cellbounds, coarse);
            block.data.vars.push(var);
            block.ghost.push(BoundaryData::default());
            block.flux.push(BoundaryData::default());
            block.cache = None;
        }
        debug!("registered field '{}' with {} component(s)", spec.label, spec.components);
        self.fields.push(spec);
        Ok(VarHandle(self.fields.len() - 1))
    }


    /**
     * Register a particle swarm carrying `num_reals` attributes per
     * particle.
     */
    pub fn add_swarm(&mut self, label: &str, num_reals: usize) -> SwarmHandle {
        for block in &mut self.blocks {
            block.data.swarms.push(Swarm::new(label, num_reals));
            block.particles.push(BoundaryData::default());
        }
        self.swarms.push((label.to_string(), num_reals));
        SwarmHandle(self.swarms.len() - 1)
    }


    /**
     * Split the local blocks into at most `n` partitions of contiguous
     * local ids, of sizes differing by at most one.
     */
    pub fn partitions(&self, n: usize) -> Vec<Partition> {
        let count = self.blocks.len();
        let n = n.max(1).min(count.max(1));

        (0..n)
            .map(|p| Partition {
                id: p,
                lids: (p * count / n..(p + 1) * count / n).collect(),
            })
            .collect()
    }


    /**
     * Return the local block at the given location, if this process owns
     * it.
     */
    pub fn find_local(&self, loc: &LogicalLocation) -> Option<&MeshBlock> {
        let gid = *self.lookup.get(loc)?;

        if self.ranks[gid] == self.rank() {
            self.blocks.get(self.lids[gid])
        } else {
            None
        }
    }


    /**
     * Return the local block at the given location, if this process owns
     * it.
     */
    pub fn find_local_mut(&mut self, loc: &LogicalLocation) -> Option<&mut MeshBlock> {
        let gid = *self.lookup.get(loc)?;

        if self.ranks[gid] == self.rank() {
            self.blocks.get_mut(self.lids[gid])
        } else {
            None
        }
    }


    /**
     * Return the physical extent of the block at the given location.
     */
    pub fn block_extent(&self, loc: &LogicalLocation) -> [[f64; 2]; 3] {
        let mut extent = self.config.domain;

        for axis in Axis::ALL.iter().filter(|a| self.shape.is_active(**a)) {
            let n = axis.index();
            let [x0, x1] = self.config.domain[n];
            let nrb = (self.config.root_blocks[n] as i64) << loc.level;
            let dx = (x1 - x0) / nrb as f64;
            extent[n] = [x0 + dx * loc.lx[n] as f64, x0 + dx * (loc.lx[n] + 1) as f64];
        }
        extent
    }


    /**
     * Map a position onto the domain by applying the periodic wrap on
     * periodic axes.
     */
    pub fn wrap_position(&self, mut x: [f64; 3]) -> [f64; 3] {
        for n in 0..3 {
            let [x0, x1] = self.config.domain[n];

            if self.config.periodic[n] {
                x[n] = x0 + (x[n] - x0).rem_euclid(x1 - x0);
            }
        }
        x
    }


    fn active(&self) -> [bool; 3] {
        [true, self.shape.is_active(Axis::J), self.shape.is_active(Axis::K)]
    }


    fn neighbor_block(&self, gid: usize, ni: NeighborIndexes, targetid: usize) -> NeighborBlock {
        NeighborBlock {
            rank: self.ranks[gid],
            level: self.locations[gid].level,
            gid,
            lid: self.lids[gid],
            loc: self.locations[gid],
            bufid: ni.buffer_id(),
            targetid,
            fid: BoundaryFace::from_offset(ni.ox),
            ni,
        }
    }


    /**
     * Find the blocks adjoining the block at `loc` in every direction. At
     * each offset the neighbor may be at the same level, a set of finer
     * blocks (one or two, or four for a face in 3-D), or a coarser block.
     * A coarser block is listed only at offsets that cross its boundary
     * along every nonzero axis; at other offsets it is the same block as
     * at a face or edge offset and is already listed there.
     */
    fn find_neighbors(&self, loc: &LogicalLocation) -> Result<(Vec<NeighborBlock>, NeighborLevels)> {
        let active = self.active();
        let span = |a: usize| if active[a] { -1..=1 } else { 0..=0 };
        let mut neighbors = Vec::new();
        let mut nblevel = NeighborLevels::default();

        nblevel.set([0, 0, 0], Some(loc.level));

        for o2 in span(2) {
            for o1 in span(1) {
                for o0 in span(0) {
                    let ox = [o0, o1, o2];

                    if ox == [0, 0, 0] {
                        continue;
                    }
                    let target = match self.offset_location(loc, ox) {
                        Some(t) => t,
                        None => {
                            nblevel.set(ox, None);
                            continue;
                        }
                    };
                    let reverse = [-ox[0], -ox[1], -ox[2]];

                    if let Some(&gid) = self.lookup.get(&target) {
                        nblevel.set(ox, Some(loc.level));
                        let ni = NeighborIndexes::new(ox, 0, 0);
                        neighbors.push(self.neighbor_block(gid, ni, buffer_id(reverse, 0, 0)));
                        continue;
                    }

                    let children = facing_children(&target, ox, active);

                    if self.lookup.contains_key(&children[0]) {
                        nblevel.set(ox, Some(loc.level + 1));

                        for child in &children {
                            let gid = *self.lookup.get(child).ok_or_else(|| {
                                Error::Topology(format!("block {:?} is only partly refined", target))
                            })?;
                            let (fi1, fi2) = fine_indexes(ox, child);
                            let ni = NeighborIndexes::new(ox, fi1, fi2);
                            neighbors.push(self.neighbor_block(gid, ni, buffer_id(reverse, 0, 0)));
                        }
                        continue;
                    }

                    if loc.level > 0 {
                        if let Some(&gid) = self.lookup.get(&target.parent()) {
                            nblevel.set(ox, Some(loc.level - 1));

                            let crosses = (0..3).all(|a| {
                                let o = ox[a] as i64;
                                o == 0 || (loc.lx[a] + o) >> 1 != loc.lx[a] >> 1
                            });
                            if crosses {
                                let (fi1, fi2) = fine_indexes(reverse, loc);
                                let ni = NeighborIndexes::new(ox, 0, 0);
                                neighbors.push(self.neighbor_block(gid, ni, buffer_id(reverse, fi1, fi2)));
                            }
                            continue;
                        }
                    }
                    return Err(Error::Topology(format!(
                        "block {:?} has no neighbor at offset {:?} within one level", loc, ox)));
                }
            }
        }
        neighbors.sort_by_key(|nb| nb.ni.connect);
        Ok((neighbors, nblevel))
    }


    /**
     * Return the same-level location at offset `ox` from `loc`, applying
     * the periodic wrap, or `None` if the offset leaves a non-periodic
     * domain.
     */
    fn offset_location(&self, loc: &LogicalLocation, ox: [i32; 3]) -> Option<LogicalLocation> {
        let mut lx = loc.lx;

        for a in 0..3 {
            let nrb = (self.config.root_blocks[a] as i64) << loc.level;
            let x = loc.lx[a] + ox[a] as i64;

            lx[a] = if x >= 0 && x < nrb {
                x
            } else if self.config.periodic[a] {
                x.rem_euclid(nrb)
            } else {
                return None;
            };
        }
        Some(LogicalLocation::new(loc.level, lx))
    }
}




/**
 * Return the children of `target` that touch a block at offset `ox` from
 * it: the lower child along axes where `ox` is positive, the upper child
 * where it is negative, and both along other active axes.
 */
fn facing_children(target: &LogicalLocation, ox: [i32; 3], active: [bool; 3]) -> Vec<LogicalLocation> {
    let subs = |a: usize| -> Vec<i64> {
        match ox[a] {
            1 => vec![0],
            -1 => vec![1],
            _ if active[a] => vec![0, 1],
            _ => vec![0],
        }
    };
    let mut children = Vec::new();

    for c in subs(2) {
        for b in subs(1) {
            for a in subs(0) {
                children.push(target.child([a, b, c]))
            }
        }
    }
    children
}




/**
 * Return the locations of the root blocks, `i` varying fastest.
 */
pub fn root_locations(config: &MeshConfig) -> Vec<LogicalLocation> {
    let [n0, n1, n2] = config.root_blocks;
    let mut locations = Vec::new();

    for k in 0..n2 as i64 {
        for j in 0..n1 as i64 {
            for i in 0..n0 as i64 {
                locations.push(LogicalLocation::new(0, [i, j, k]))
            }
        }
    }
    locations
}




/**
 * Replace the block at `target` with its children, which take its place
 * in the list.
 */
pub fn refine_locations(config: &MeshConfig, locations: &[LogicalLocation], target: &LogicalLocation) -> Result<Vec<LogicalLocation>> {
    let shape = IndexShape::new(config.block_size, config.nghost);
    let active = [true, shape.is_active(Axis::J), shape.is_active(Axis::K)];
    let position = locations
        .iter()
        .position(|l| l == target)
        .ok_or_else(|| Error::Topology(format!("no block at {:?} to refine", target)))?;

    let mut result = locations[..position].to_vec();
    result.extend(target.children(active));
    result.extend_from_slice(&locations[position + 1..]);
    Ok(result)
}




/**
 * Check that the blocks tile the domain: every location lies in the
 * domain, none is repeated or contains another, and together they cover
 * the volume of the root blocks. Returns the map from location to global
 * id.
 */
fn check_tiling(config: &MeshConfig, shape: &IndexShape, locations: &[LogicalLocation]) -> Result<HashMap<LogicalLocation, usize>> {
    let ndim = shape.ndim() as i32;
    let max_level = locations.iter().map(|l| l.level).max().unwrap_or(0);
    let mut lookup = HashMap::new();
    let mut volume: u128 = 0;

    for (gid, loc) in locations.iter().enumerate() {
        if loc.level < 0 {
            return Err(Error::Topology(format!("block {:?} has a negative level", loc)));
        }
        for axis in Axis::ALL.iter() {
            let n = axis.index();
            let nrb = if shape.is_active(*axis) { (config.root_blocks[n] as i64) << loc.level } else { 1 };

            if loc.lx[n] < 0 || loc.lx[n] >= nrb {
                return Err(Error::Topology(format!("block {:?} lies outside the domain", loc)));
            }
        }
        if lookup.insert(*loc, gid).is_some() {
            return Err(Error::Topology(format!("block {:?} appears twice", loc)));
        }
        volume += 1u128 << ((max_level - loc.level) * ndim);
    }

    for loc in locations {
        let mut ancestor = *loc;

        while ancestor.level > 0 {
            ancestor = ancestor.parent();

            if lookup.contains_key(&ancestor) {
                return Err(Error::Topology(format!("block {:?} overlaps its ancestor {:?}", loc, ancestor)));
            }
        }
    }

    let roots: u128 = config.root_blocks.iter().map(|n| *n as u128).product();

    if volume != roots << (max_level * ndim) {
        return Err(Error::Topology("blocks do not cover the domain".into()));
    }
    Ok(lookup)
}




/// Meshes shared by the tests of several modules.
#[cfg(test)]
pub(crate) mod fixtures {

    use crate::message::{SerialTransport, Transport};
    use super::*;

    pub fn config_2d() -> MeshConfig {
        MeshConfig {
            block_size: [4, 4, 1],
            root_blocks: [2, 1, 1],
            ..MeshConfig::default()
        }
    }

    /// Two root blocks side by side, the second refined into four.
    pub fn two_level_mesh() -> Mesh {
        let config = config_2d();
        let roots = root_locations(&config);
        let locations = refine_locations(&config, &roots, &LogicalLocation::new(0, [1, 0, 0])).unwrap();
        Mesh::new(config, locations, Box::new(SerialTransport)).unwrap()
    }

    /// The blocks of [`two_level_mesh`] on two ranks: the coarse block on
    /// rank 0 and the four fine blocks on rank 1.
    pub fn split_two_level_mesh(transport: Box<dyn Transport>) -> Mesh {
        let config = config_2d();
        let roots = root_locations(&config);
        let locations = refine_locations(&config, &roots, &LogicalLocation::new(0, [1, 0, 0])).unwrap();
        Mesh::with_ranks(config, locations, vec![0, 1, 1, 1, 1], transport).unwrap()
    }

    /// Eight root blocks of 4x4x4 cells in the unit cube, not periodic,
    /// with the upper corner block refined into eight.
    pub fn cube_mesh() -> Mesh {
        let config = MeshConfig {
            block_size: [4, 4, 4],
            root_blocks: [2, 2, 2],
            periodic: [false; 3],
            ..MeshConfig::default()
        };
        let roots = root_locations(&config);
        let locations = refine_locations(&config, &roots, &LogicalLocation::new(0, [1, 1, 1])).unwrap();
        Mesh::new(config, locations, Box::new(SerialTransport)).unwrap()
    }

    /// Two blocks of four cells on a line, not periodic.
    pub fn line_mesh(transport: Box<dyn Transport>) -> Mesh {
        let config = MeshConfig {
            block_size: [4, 1, 1],
            root_blocks: [2, 1, 1],
            periodic: [false; 3],
            ..MeshConfig::default()
        };
        Mesh::uniform(config, transport).unwrap()
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use crate::message::SerialTransport;
    use crate::neighbor::{LevelRelation, NeighborConnect};
    use super::fixtures::*;
    use super::*;

    #[test]
    fn uniform_periodic_blocks_have_eight_neighbors() {
        let config = MeshConfig { root_blocks: [3, 3, 1], ..MeshConfig::default() };
        let mesh = Mesh::uniform(config, Box::new(SerialTransport)).unwrap();
        assert_eq!(mesh.blocks.len(), 9);

        for block in &mesh.blocks {
            assert_eq!(block.neighbors.len(), 8);
            assert!(block.neighbors[..4].iter().all(|nb| nb.ni.connect == NeighborConnect::Face));
            assert!(block.neighbors.iter().all(|nb| nb.relation(0) == LevelRelation::Same));
        }
    }

    #[test]
    fn outflow_boundaries_have_no_neighbors() {
        let mesh = line_mesh(Box::new(SerialTransport));
        assert_eq!(mesh.blocks[0].neighbors.len(), 1);
        assert_eq!(mesh.blocks[0].neighbors[0].ni.ox, [1, 0, 0]);
        assert_eq!(mesh.blocks[0].nblevel.get([-1, 0, 0]), None);
    }

    #[test]
    fn coarse_block_sees_finer_faces_and_corners() {
        let mesh = two_level_mesh();
        let coarse = mesh.find_local(&LogicalLocation::new(0, [0, 0, 0])).unwrap();
        let finer: Vec<_> = coarse.neighbors.iter().filter(|nb| nb.relation(0) == LevelRelation::Finer).collect();

        // Two children on each of the x1 faces, one at each of the four
        // corners.
        assert_eq!(finer.len(), 8);
        assert_eq!(coarse.nblevel.get([1, 0, 0]), Some(1));
        assert_eq!(coarse.nblevel.get([0, 1, 0]), Some(0));
    }

    #[test]
    fn fine_block_targets_match_coarse_buffer_ids() {
        let mesh = two_level_mesh();
        let coarse = mesh.find_local(&LogicalLocation::new(0, [0, 0, 0])).unwrap();

        for child in coarse.neighbors.iter().filter(|nb| nb.relation(0) == LevelRelation::Finer) {
            let fine = &mesh.blocks[child.lid];
            let back = fine
                .neighbors
                .iter()
                .find(|nb| nb.gid == coarse.gid && nb.targetid == child.bufid)
                .unwrap();
            assert_eq!(back.bufid, child.targetid);
        }
    }

    #[test]
    fn coarse_block_is_skipped_where_the_parent_is_not_crossed() {
        let mesh = two_level_mesh();
        let fine = mesh.find_local(&LogicalLocation::new(1, [2, 0, 0])).unwrap();
        assert_eq!(fine.nblevel.get([-1, 1, 0]), Some(0));
        assert!(fine.neighbors.iter().all(|nb| nb.ni.ox != [-1, 1, 0]));
        assert!(fine.neighbors.iter().any(|nb| nb.ni.ox == [-1, -1, 0]));
    }

    #[test]
    fn cube_corner_sees_every_kind_of_finer_neighbor() {
        let mesh = cube_mesh();
        assert_eq!(mesh.blocks.len(), 15);

        let finer = |lx: [i64; 3]| {
            let block = mesh.find_local(&LogicalLocation::new(0, lx)).unwrap();
            block
                .neighbors
                .iter()
                .filter(|nb| nb.relation(0) == LevelRelation::Finer)
                .map(|nb| nb.ni)
                .collect::<Vec<_>>()
        };

        // A face touches four children, with every pair of sub-indexes.
        let face = finer([0, 1, 1]);
        assert_eq!(face.len(), 4);
        assert!(face.iter().all(|ni| ni.connect == NeighborConnect::Face));
        let mut subs: Vec<_> = face.iter().map(|ni| (ni.fi1, ni.fi2)).collect();
        subs.sort_unstable();
        assert_eq!(subs, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);

        // An edge along x touches two children, a corner one.
        let edge = finer([1, 0, 0]);
        assert_eq!(edge.len(), 2);
        assert!(edge.iter().all(|ni| ni.connect == NeighborConnect::Edge && ni.ox == [0, 1, 1]));
        let corner = finer([0, 0, 0]);
        assert_eq!(corner.len(), 1);
        assert_eq!(corner[0].connect, NeighborConnect::Corner);
    }

    #[test]
    fn gaps_and_overlaps_are_rejected() {
        let config = config_2d();
        let mut locations = root_locations(&config);
        locations.push(LogicalLocation::new(1, [0, 0, 0]));
        assert!(matches!(
            Mesh::new(config.clone(), locations, Box::new(SerialTransport)),
            Err(Error::Topology(_))));

        let locations = vec![LogicalLocation::new(0, [0, 0, 0])];
        assert!(matches!(
            Mesh::new(config, locations, Box::new(SerialTransport)),
            Err(Error::Topology(_))));
    }

    #[test]
    fn partitions_split_local_blocks() {
        let mesh = two_level_mesh();
        let parts = mesh.partitions(2);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].lids, vec![0, 1]);
        assert_eq!(parts[1].lids, vec![2, 3, 4]);
        assert_eq!(mesh.partitions(10).len(), 5);
    }
}
