use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};




/**
 * Coordinate systems a mesh may be configured with. Only uniform Cartesian
 * meshes are supported by the restriction and flux-correction kernels.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordinateSystem {
    Cartesian,
    Cylindrical,
    Spherical,
}




/**
 * Static description of the block-structured mesh.
 */
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// Interior cells per block on each axis (`[nx1, nx2, nx3]`).
    pub block_size: [usize; 3],

    /// Ghost zone width on active axes.
    pub nghost: usize,

    /// Number of level-0 blocks on each axis.
    pub root_blocks: [usize; 3],

    /// Physical `[lower, upper]` bounds of the domain on each axis.
    pub domain: [[f64; 2]; 3],

    pub periodic: [bool; 3],

    pub coordinates: CoordinateSystem,

    /// Kernels over at least this many rows run on the Rayon pool.
    pub min_parallel_rows: usize,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            block_size: [8, 8, 1],
            nghost: 2,
            root_blocks: [2, 2, 1],
            domain: [[0.0, 1.0], [0.0, 1.0], [0.0, 1.0]],
            periodic: [true, true, true],
            coordinates: CoordinateSystem::Cartesian,
            min_parallel_rows: 64,
        }
    }
}




// ============================================================================
impl MeshConfig {


    /**
     * Check the configuration for a mesh whose blocks span `num_levels`
     * refinement levels.
     */
    pub fn validate(&self, num_levels: usize) -> Result<()> {
        if self.coordinates != CoordinateSystem::Cartesian {
            return Err(Error::Unsupported("restriction on non-Cartesian coordinates"));
        }
        if self.block_size.iter().any(|&n| n == 0) {
            return Err(Error::Config("block size must be positive on every axis".into()));
        }
        if self.root_blocks.iter().any(|&n| n == 0) {
            return Err(Error::Config("number of root blocks must be positive on every axis".into()));
        }
        if self.nghost == 0 {
            return Err(Error::Config("ghost width must be at least 1".into()));
        }
        for n in 0..3 {
            if self.domain[n][1] <= self.domain[n][0] {
                return Err(Error::Config(format!("domain bounds on axis {} are empty", n)));
            }
            if n > 0 && self.block_size[n] == 1 && self.root_blocks[n] != 1 {
                return Err(Error::Config(format!("inactive axis {} must have one root block", n)));
            }
        }
        if num_levels > 1 {
            if self.nghost < 2 || self.nghost % 2 != 0 {
                return Err(Error::Config("a multi-level mesh needs an even ghost width of at least 2".into()));
            }
            for n in 0..3 {
                let nx = self.block_size[n];
                if (n == 0 || nx > 1) && (nx % 2 != 0 || nx < 2 * self.nghost) {
                    return Err(Error::Config(format!(
                        "a multi-level mesh needs an even block size of at least {} on axis {}, got {}",
                        2 * self.nghost, n, nx)));
                }
            }
        }
        Ok(())
    }


    /**
     * Return the ghost width of the coarse buffer shadowing each block.
     */
    pub fn coarse_nghost(&self) -> usize {
        (self.nghost + 1) / 2 + 1
    }
}




/**
 * Parameters of a time evolution.
 */
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// One of `rk1`, `rk2`, `vl2`, `rk3`.
    pub integrator: String,
    pub tlim: f64,
    pub nlim: Option<u64>,
    pub dt: f64,

    /// Wall-clock limit in seconds.
    pub wall_time_limit: Option<f64>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            integrator: "rk1".into(),
            tlim: 1.0,
            nlim: None,
            dt: 1e-2,
            wall_time_limit: None,
        }
    }
}

impl DriverConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.dt > 0.0) {
            return Err(Error::Config(format!("time step must be positive, got {}", self.dt)));
        }
        if let Some(limit) = self.wall_time_limit {
            if !(limit > 0.0) {
                return Err(Error::Config("wall time limit must be positive".into()));
            }
        }
        Ok(())
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn default_config_is_valid_for_two_levels() {
        assert!(MeshConfig::default().validate(2).is_ok());
        assert_eq!(MeshConfig::default().coarse_nghost(), 2);
    }

    #[test]
    fn non_cartesian_coordinates_are_rejected() {
        let config = MeshConfig {
            coordinates: CoordinateSystem::Spherical,
            ..MeshConfig::default()
        };
        assert!(matches!(config.validate(1), Err(Error::Unsupported(_))));
    }

    #[test]
    fn odd_block_size_is_rejected_when_refined() {
        let config = MeshConfig {
            block_size: [7, 8, 1],
            ..MeshConfig::default()
        };
        assert!(config.validate(1).is_ok());
        assert!(matches!(config.validate(2), Err(Error::Config(_))));
    }
}
