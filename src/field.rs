use serde::{Deserialize, Serialize};
use crate::array::ParArray4;
use crate::index_space::{Axis, IndexShape};




/// Flags deciding how a field takes part in the boundary exchange.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Ghost cells are filled from neighboring blocks.
    pub fill_ghost: bool,

    /// The field carries face fluxes, which are corrected at level jumps.
    pub with_fluxes: bool,
}

/// Declaration of a cell-centered field, registered once on the mesh and
/// allocated on every block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub label: String,
    pub components: usize,
    pub metadata: Metadata,
}

/// Handle to a cell-centered field in every block's [`BlockData`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VarHandle(pub(crate) usize);

/// Handle to a particle swarm in every block's [`BlockData`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SwarmHandle(pub(crate) usize);

impl VarHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

impl SwarmHandle {
    pub fn index(self) -> usize {
        self.0
    }
}




/// The storage of one cell-centered field on one block: the cell data over
/// the entire index space, a coarse buffer on multi-level meshes, and one
/// flux array per active axis when the field carries fluxes. Flux arrays
/// have one more entry than the cell array along their own axis, so face
/// `i` lies between cells `i - 1` and `i`.
#[derive(Clone, Debug)]
pub struct CellVariable {
    pub label: String,
    pub metadata: Metadata,
    pub data: ParArray4,
    pub coarse: Option<ParArray4>,
    pub flux: [Option<ParArray4>; 3],
}

impl CellVariable {
    pub(crate) fn allocate(spec: &FieldSpec, shape: &IndexShape, coarse_shape: Option<&IndexShape>) -> Self {
        let nv = spec.components;
        let dims = shape.entire_dims();
        let mut flux = [None, None, None];

        if spec.metadata.with_fluxes {
            for axis in Axis::ALL.iter().filter(|a| shape.is_active(**a)) {
                let mut fdims = dims;
                fdims[2 - axis.index()] += 1;
                flux[axis.index()] = Some(ParArray4::new(nv, fdims));
            }
        }
        Self {
            label: spec.label.clone(),
            metadata: spec.metadata,
            data: ParArray4::new(nv, dims),
            coarse: coarse_shape.map(|c| ParArray4::new(nv, c.entire_dims())),
            flux,
        }
    }

    pub fn num_components(&self) -> usize {
        self.data.num_components()
    }

    pub fn flux(&self, axis: Axis) -> Option<&ParArray4> {
        self.flux[axis.index()].as_ref()
    }

    pub fn flux_mut(&mut self, axis: Axis) -> Option<&mut ParArray4> {
        self.flux[axis.index()].as_mut()
    }
}




/// A particle: a position and a fixed number of real-valued attributes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    pub x: [f64; 3],
    pub data: Vec<f64>,
}

/// A set of particles living on one block.
#[derive(Clone, Debug, PartialEq)]
pub struct Swarm {
    pub label: String,
    pub num_reals: usize,
    pub particles: Vec<Particle>,
}

impl Swarm {
    pub fn new(label: &str, num_reals: usize) -> Self {
        Self {
            label: label.to_string(),
            num_reals,
            particles: Vec::new(),
        }
    }

    /// Number of `f64` values per particle on the wire.
    pub fn stride(&self) -> usize {
        3 + self.num_reals
    }

    pub(crate) fn flatten(particles: &[Particle], out: &mut Vec<f64>) {
        out.clear();

        for p in particles {
            out.extend_from_slice(&p.x);
            out.extend_from_slice(&p.data);
        }
    }

    pub(crate) fn extend_from_flat(&mut self, flat: &[f64]) {
        let stride = self.stride();

        for chunk in flat.chunks_exact(stride) {
            self.particles.push(Particle {
                x: [chunk[0], chunk[1], chunk[2]],
                data: chunk[3..].to_vec(),
            })
        }
    }
}




/// The arena of fields and swarms on one block, addressed by handles issued
/// when they were registered on the mesh.
#[derive(Clone, Debug, Default)]
pub struct BlockData {
    pub(crate) vars: Vec<CellVariable>,
    pub(crate) swarms: Vec<Swarm>,
}

impl BlockData {
    pub fn get(&self, var: VarHandle) -> &CellVariable {
        &self.vars[var.0]
    }

    pub fn get_mut(&mut self, var: VarHandle) -> &mut CellVariable {
        &mut self.vars[var.0]
    }

    pub fn swarm(&self, swarm: SwarmHandle) -> &Swarm {
        &self.swarms[swarm.0]
    }

    pub fn swarm_mut(&mut self, swarm: SwarmHandle) -> &mut Swarm {
        &mut self.swarms[swarm.0]
    }

    pub fn vars(&self) -> impl Iterator<Item = (VarHandle, &CellVariable)> {
        self.vars.iter().enumerate().map(|(n, v)| (VarHandle(n), v))
    }

    pub fn find(&self, label: &str) -> Option<VarHandle> {
        self.vars.iter().position(|v| v.label == label).map(VarHandle)
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn flux_arrays_have_one_extra_face() {
        let spec = FieldSpec {
            label: "u".into(),
            components: 2,
            metadata: Metadata { fill_ghost: true, with_fluxes: true },
        };
        let shape = IndexShape::new([8, 4, 1], 2);
        let var = CellVariable::allocate(&spec, &shape, None);
        assert_eq!(var.data.dims(), [2, 1, 8, 12]);
        assert_eq!(var.flux(Axis::I).unwrap().dims(), [2, 1, 8, 13]);
        assert_eq!(var.flux(Axis::J).unwrap().dims(), [2, 1, 9, 12]);
        assert!(var.flux(Axis::K).is_none());
        assert!(var.coarse.is_none());
    }

    #[test]
    fn particles_flatten_and_restore() {
        let mut swarm = Swarm::new("tracers", 1);
        let particles = vec![
            Particle { x: [0.1, 0.2, 0.3], data: vec![7.0] },
            Particle { x: [0.4, 0.5, 0.6], data: vec![8.0] },
        ];
        let mut flat = Vec::new();
        Swarm::flatten(&particles, &mut flat);
        assert_eq!(flat.len(), 2 * swarm.stride());
        swarm.extend_from_flat(&flat);
        assert_eq!(swarm.particles, particles);
    }
}
