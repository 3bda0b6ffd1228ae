use std::cell::RefCell;
use clap::Parser;
use log::{info, LevelFilter};
use serde::Serialize;
use simple_logger::SimpleLogger;
use halo::bvals::{add_exchange_tasks, task_done, BoundaryCommSubset, BoundaryExchangeable, CellCenteredExchange, FluxCorrection};
use halo::config::{DriverConfig, MeshConfig};
use halo::driver::{EvolutionDriver, Integrator, MultiStageDriver, SimTime};
use halo::error::{Error, Result};
use halo::field::{CellVariable, FieldSpec, Metadata, VarHandle};
use halo::index_space::{Axis, IndexDomain};
use halo::mesh::{refine_locations, root_locations, Mesh, Partition};
use halo::message::ChannelTransport;
use halo::neighbor::LogicalLocation;
use halo::refinement::prolongate_boundaries;
use halo::tasks::{DriverStatus, TaskCollection, TaskID, TaskStatus};
use halo::thread_pool::run_ranks;




#[derive(Debug, Clone, Parser)]
#[clap(version = "0.1", about = "Two-level periodic advection over simulated ranks")]
struct Opts {
    #[clap(short = 'r', long, default_value = "2")]
    num_ranks: usize,

    #[clap(short = 'p', long, default_value = "2")]
    partitions_per_rank: usize,

    #[clap(short = 'b', long, default_value = "16")]
    block_size: usize,

    #[clap(short = 'i', long, default_value = "rk2")]
    integrator: String,

    #[clap(short = 't', long, default_value = "0.25")]
    tlim: f64,

    #[clap(long, default_value = "0.4")]
    cfl: f64,

    #[clap(short = 'o', long, default_value = "advection.cbor")]
    output: String,
}




const VELOCITY: [f64; 2] = [1.0, 0.5];




/**
 * Upwind advection of a scalar on a periodic unit square, where the lower
 * left quarter is refined once.
 */
struct Advection {
    integrator: Integrator,
    mesh: RefCell<Mesh>,
    parts: Vec<Partition>,
    u: VarHandle,
    u0: VarHandle,
}




fn initial_value(x: f64, y: f64) -> f64 {
    let r2 = (x - 0.3).powi(2) + (y - 0.3).powi(2);
    1.0 + (-r2 / 0.01).exp()
}

fn missing_flux(gid: usize, axis: Axis) -> Error {
    Error::Config(format!("block {} has no flux array along {:?}", gid, axis))
}




// ============================================================================
impl Advection {

    fn new(opts: &Opts, transport: ChannelTransport) -> Result<Self> {
        let config = MeshConfig {
            block_size: [opts.block_size, opts.block_size, 1],
            root_blocks: [2, 2, 1],
            ..MeshConfig::default()
        };
        let roots = root_locations(&config);
        let locations = refine_locations(&config, &roots, &LogicalLocation::new(0, [0, 0, 0]))?;
        let mut mesh = Mesh::new(config, locations, Box::new(transport))?;

        let u = mesh.add_field(FieldSpec {
            label: "u".into(),
            components: 1,
            metadata: Metadata { fill_ghost: true, with_fluxes: true },
        })?;
        let u0 = mesh.add_field(FieldSpec {
            label: "u0".into(),
            components: 1,
            metadata: Metadata::default(),
        })?;

        for block in &mut mesh.blocks {
            let shape = block.cellbounds.clone();
            let coords = block.coords.clone();
            let data = &mut block.data.get_mut(u).data;

            for j in shape.bounds(Axis::J, IndexDomain::Interior).iter() {
                for i in shape.bounds(Axis::I, IndexDomain::Interior).iter() {
                    let x = coords.cell_center(Axis::I, i);
                    let y = coords.cell_center(Axis::J, j);
                    data.set(0, 0, j, i, initial_value(x, y));
                }
            }
        }
        let parts = mesh.partitions(opts.partitions_per_rank);

        Ok(Self {
            integrator: Integrator::from_name(&opts.integrator)?,
            mesh: RefCell::new(mesh),
            parts,
            u,
            u0,
        })
    }

    /**
     * Return the integral of `u` over this rank's blocks.
     */
    fn total(&self) -> f64 {
        self.mesh
            .borrow()
            .blocks
            .iter()
            .map(|block| {
                let shape = &block.cellbounds;
                let data = &block.data.get(self.u).data;
                let mut sum = 0.0;

                for j in shape.bounds(Axis::J, IndexDomain::Interior).iter() {
                    for i in shape.bounds(Axis::I, IndexDomain::Interior).iter() {
                        sum += data.get(0, 0, j, i);
                    }
                }
                sum * block.coords.cell_volume()
            })
            .sum()
    }

    fn snapshot(&self) -> Vec<BlockSnapshot> {
        self.mesh
            .borrow()
            .blocks
            .iter()
            .map(|block| {
                let shape = &block.cellbounds;
                let data = &block.data.get(self.u).data;
                let mut interior = Vec::new();

                for j in shape.bounds(Axis::J, IndexDomain::Interior).iter() {
                    for i in shape.bounds(Axis::I, IndexDomain::Interior).iter() {
                        interior.push(data.get(0, 0, j, i));
                    }
                }
                BlockSnapshot {
                    gid: block.gid,
                    level: block.loc.level,
                    lx: block.loc.lx,
                    extent: block.coords.extent(),
                    data: interior,
                }
            })
            .collect()
    }
}




fn save_base(mesh: &mut Mesh, part: &Partition, u: VarHandle, u0: VarHandle) {
    for &lid in &part.lids {
        let block = &mut mesh.blocks[lid];
        let current = block.data.get(u).data.clone();
        block.data.get_mut(u0).data = current;
    }
}

fn calculate_fluxes(mesh: &mut Mesh, part: &Partition, u: VarHandle) -> Result<()> {
    for &lid in &part.lids {
        let block = &mut mesh.blocks[lid];
        let ib = block.cellbounds.bounds(Axis::I, IndexDomain::Interior);
        let jb = block.cellbounds.bounds(Axis::J, IndexDomain::Interior);
        let gid = block.gid;
        let CellVariable { data, flux, .. } = block.data.get_mut(u);
        let [flux_i, flux_j, _] = flux;
        let flux_i = flux_i.as_mut().ok_or_else(|| missing_flux(gid, Axis::I))?;
        let flux_j = flux_j.as_mut().ok_or_else(|| missing_flux(gid, Axis::J))?;

        for j in jb.iter() {
            for i in ib.s..=ib.e + 1 {
                let upwind = if VELOCITY[0] > 0.0 { i - 1 } else { i };
                flux_i.set(0, 0, j, i, VELOCITY[0] * data.get(0, 0, j, upwind));
            }
        }
        for j in jb.s..=jb.e + 1 {
            for i in ib.iter() {
                let upwind = if VELOCITY[1] > 0.0 { j - 1 } else { j };
                flux_j.set(0, 0, j, i, VELOCITY[1] * data.get(0, 0, upwind, i));
            }
        }
    }
    Ok(())
}

fn update(mesh: &mut Mesh, part: &Partition, u: VarHandle, u0: VarHandle, beta: f64, dt: f64) -> Result<()> {
    for &lid in &part.lids {
        let block = &mut mesh.blocks[lid];
        let ib = block.cellbounds.bounds(Axis::I, IndexDomain::Interior);
        let jb = block.cellbounds.bounds(Axis::J, IndexDomain::Interior);
        let (dx, dy) = (block.coords.dx(Axis::I), block.coords.dx(Axis::J));
        let gid = block.gid;
        let base = block.data.get(u0).data.clone();
        let CellVariable { data, flux, .. } = block.data.get_mut(u);
        let flux_i = flux[0].as_ref().ok_or_else(|| missing_flux(gid, Axis::I))?;
        let flux_j = flux[1].as_ref().ok_or_else(|| missing_flux(gid, Axis::J))?;

        for j in jb.iter() {
            for i in ib.iter() {
                let div = (flux_i.get(0, 0, j, i + 1) - flux_i.get(0, 0, j, i)) / dx
                        + (flux_j.get(0, 0, j + 1, i) - flux_j.get(0, 0, j, i)) / dy;
                let advanced = data.get(0, 0, j, i) - dt * div;
                data.set(0, 0, j, i, (1.0 - beta) * base.get(0, 0, j, i) + beta * advanced);
            }
        }
    }
    Ok(())
}




// ============================================================================
impl MultiStageDriver for Advection {
    fn integrator(&self) -> &Integrator {
        &self.integrator
    }

    fn make_task_collection<'a>(&'a self, stage: usize, tm: &SimTime) -> Result<TaskCollection<'a>> {
        let (u, u0) = (self.u, self.u0);
        let beta = self.integrator.beta(stage);
        let dt = tm.dt;
        let mesh = &self.mesh;
        let ghosts = &CellCenteredExchange;
        let fluxes = &FluxCorrection;
        let mut tc = TaskCollection::new();

        let arm = tc.add_region(self.parts.len());

        for (n, part) in self.parts.iter().enumerate() {
            let started = arm[n].add_named_task("start receiving", TaskID::none(), move || {
                task_done(ghosts.start_receiving(&mut mesh.borrow_mut(), part, BoundaryCommSubset::All))
            })?;
            if stage == 1 {
                arm[n].add_named_task("save base state", started, move || {
                    save_base(&mut mesh.borrow_mut(), part, u, u0);
                    TaskStatus::Complete
                })?;
            }
        }
        let advance = tc.add_region(self.parts.len());

        for (n, part) in self.parts.iter().enumerate() {
            let list = &mut advance[n];
            let filled = add_exchange_tasks(list, TaskID::none(), mesh, part, ghosts)?;
            let prolongated = list.add_named_task("prolongate boundaries", filled, move || {
                task_done(prolongate_boundaries(&mut mesh.borrow_mut(), part))
            })?;
            let computed = list.add_named_task("calculate fluxes", prolongated, move || {
                task_done(calculate_fluxes(&mut mesh.borrow_mut(), part, u))
            })?;
            let corrected = add_exchange_tasks(list, computed, mesh, part, fluxes)?;
            let updated = list.add_named_task("update", corrected, move || {
                task_done(update(&mut mesh.borrow_mut(), part, u, u0, beta, dt))
            })?;
            list.add_named_task("clear boundaries", updated, move || {
                task_done(ghosts.clear_boundary(&mut mesh.borrow_mut(), part, BoundaryCommSubset::All))
            })?;
        }
        Ok(tc)
    }
}




#[derive(Serialize)]
struct BlockSnapshot {
    gid: usize,
    level: i32,
    lx: [i64; 3],
    extent: [[f64; 2]; 3],
    data: Vec<f64>,
}

#[derive(Serialize)]
struct Snapshot {
    time: SimTime,
    blocks: Vec<BlockSnapshot>,
}

struct RankSummary {
    status: DriverStatus,
    time: SimTime,
    initial: f64,
    last: f64,
    blocks: Vec<BlockSnapshot>,
}




fn run_rank(opts: &Opts, transport: ChannelTransport) -> Result<RankSummary> {
    let advection = Advection::new(opts, transport)?;
    let dx = 1.0 / (4 * opts.block_size) as f64;
    let config = DriverConfig {
        integrator: opts.integrator.clone(),
        tlim: opts.tlim,
        dt: opts.cfl * dx / (VELOCITY[0].abs() + VELOCITY[1].abs()),
        ..DriverConfig::default()
    };
    let initial = advection.total();
    let mut driver = EvolutionDriver::new(advection, &config)?;
    driver.handle_signals()?;

    let status = driver.execute();
    let time = *driver.time();
    let advection = driver.into_driver();

    Ok(RankSummary {
        status,
        time,
        initial,
        last: advection.total(),
        blocks: advection.snapshot(),
    })
}




// ============================================================================
fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    SimpleLogger::new().with_level(LevelFilter::Info).init()?;

    let opts = Opts::parse();
    let output = opts.output.clone();
    info!("{:?}", opts);

    let summaries = run_ranks(opts.num_ranks, move |transport| run_rank(&opts, transport))?
        .into_iter()
        .collect::<Result<Vec<_>>>()?;

    if let Some(failed) = summaries.iter().find(|s| s.status != DriverStatus::Complete) {
        return Err(format!("run ended with {:?} at t={}", failed.status, failed.time.time).into());
    }
    let initial: f64 = summaries.iter().map(|s| s.initial).sum();
    let last: f64 = summaries.iter().map(|s| s.last).sum();
    info!("total: initial={:.12e} final={:.12e} relative change={:.3e}", initial, last, (last - initial) / initial);

    let time = summaries.first().map(|s| s.time).ok_or("no ranks were run")?;
    let mut blocks: Vec<_> = summaries.into_iter().flat_map(|s| s.blocks).collect();
    blocks.sort_by_key(|b| b.gid);

    let file = std::fs::File::create(&output)?;
    let mut buffer = std::io::BufWriter::new(file);
    ciborium::ser::into_writer(&Snapshot { time, blocks }, &mut buffer).map_err(|e| format!("{:?}", e))?;
    info!("wrote {}", output);
    Ok(())
}
