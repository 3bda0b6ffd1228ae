use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use crate::config::DriverConfig;
use crate::error::{Error, Result};
use crate::tasks::{DriverStatus, TaskCollection};




/**
 * A low-storage multi-stage time integrator. Stage `s` (counting from 1)
 * blends the state it produces into the state at the start of the step
 * with weight `beta[s - 1]`.
 */
#[derive(Clone, Debug, PartialEq)]
pub struct Integrator {
    pub name: String,
    pub beta: Vec<f64>,
}




// ============================================================================
impl Integrator {


    /**
     * Look up an integrator by name: `rk1`, `rk2`, `vl2` or `rk3`.
     */
    pub fn from_name(name: &str) -> Result<Self> {
        let beta = match name {
            "rk1" => vec![1.0],
            "rk2" => vec![1.0, 0.5],
            "vl2" => vec![0.5, 1.0],
            "rk3" => vec![1.0, 0.25, 2.0 / 3.0],
            _ => return Err(Error::Config(format!("unknown time integrator '{}'", name))),
        };
        Ok(Self { name: name.to_string(), beta })
    }


    pub fn num_stages(&self) -> usize {
        self.beta.len()
    }


    /**
     * Return the weight of the given stage, counting from 1.
     */
    pub fn beta(&self, stage: usize) -> f64 {
        self.beta[stage - 1]
    }
}




/**
 * The clock of a time evolution.
 */
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimTime {
    pub time: f64,
    pub dt: f64,
    pub tlim: f64,
    pub ncycle: u64,
    pub nlim: Option<u64>,
}




// ============================================================================
impl SimTime {

    pub fn new(config: &DriverConfig) -> Self {
        Self {
            time: 0.0,
            dt: config.dt,
            tlim: config.tlim,
            ncycle: 0,
            nlim: config.nlim,
        }
    }

    pub fn keep_going(&self) -> bool {
        self.time < self.tlim && self.nlim.map_or(true, |n| self.ncycle < n)
    }
}




/**
 * A driver that advances the solution through the stages of an integrator,
 * building and executing one task collection per stage. Implementors own
 * their mesh behind a `RefCell` (or similar), so that tasks can share it
 * while the collection borrows the driver.
 */
pub trait MultiStageDriver {
    fn integrator(&self) -> &Integrator;

    /**
     * Build the tasks of one stage, counting from 1.
     */
    fn make_task_collection<'a>(&'a self, stage: usize, tm: &SimTime) -> Result<TaskCollection<'a>>;

    /**
     * Run every stage of one step, stopping at the first one that does not
     * complete.
     */
    fn step(&self, tm: &SimTime) -> DriverStatus {
        for stage in 1..=self.integrator().num_stages() {
            let mut tc = match self.make_task_collection(stage, tm) {
                Ok(tc) => tc,
                Err(e) => {
                    error!("stage {}: {}", stage, e);
                    return DriverStatus::Failed;
                }
            };
            let status = tc.execute();

            if status != DriverStatus::Complete {
                match tc.failure() {
                    Some(task) => error!("stage {} failed in {}", stage, task),
                    None => error!("stage {}: {:?}", stage, status),
                }
                return status;
            }
        }
        DriverStatus::Complete
    }
}




/**
 * The main loop: steps a [`MultiStageDriver`] until the final time or the
 * cycle limit is reached. A step that does not complete ends the run with
 * its status; so do an interrupt (SIGINT or SIGTERM, once
 * [`EvolutionDriver::handle_signals`] was called) and the wall-time limit.
 */
pub struct EvolutionDriver<D> {
    driver: D,
    tm: SimTime,
    dt: f64,
    wall_time_limit: Option<Duration>,
    interrupted: Arc<AtomicBool>,
}




// ============================================================================
impl<D: MultiStageDriver> EvolutionDriver<D> {


    pub fn new(driver: D, config: &DriverConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            driver,
            tm: SimTime::new(config),
            dt: config.dt,
            wall_time_limit: config.wall_time_limit.map(Duration::from_secs_f64),
            interrupted: Arc::new(AtomicBool::new(false)),
        })
    }


    /**
     * Stop the run after the current cycle on SIGINT or SIGTERM.
     */
    pub fn handle_signals(&self) -> Result<()> {
        signal_hook::flag::register(signal_hook::consts::SIGINT, self.interrupted.clone())?;
        signal_hook::flag::register(signal_hook::consts::SIGTERM, self.interrupted.clone())?;
        Ok(())
    }


    /**
     * Return the flag that, once raised, stops the run after the current
     * cycle.
     */
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        self.interrupted.clone()
    }


    pub fn time(&self) -> &SimTime {
        &self.tm
    }


    pub fn driver(&self) -> &D {
        &self.driver
    }


    pub fn into_driver(self) -> D {
        self.driver
    }


    pub fn execute(&mut self) -> DriverStatus {
        let start = Instant::now();
        let status = self.run(start);
        let wall = start.elapsed().as_secs_f64();

        match status {
            DriverStatus::Complete => info!("driver completed"),
            DriverStatus::Timeout => warn!("driver timed out, restart to continue"),
            DriverStatus::Failed => error!("driver failed"),
        }
        info!("time={} cycle={} walltime used={:.3}s", self.tm.time, self.tm.ncycle, wall);
        status
    }


    fn run(&mut self, start: Instant) -> DriverStatus {
        while self.tm.keep_going() {
            self.tm.dt = self.dt.min(self.tm.tlim - self.tm.time);
            info!("cycle={} time={:.6e} dt={:.6e}", self.tm.ncycle, self.tm.time, self.tm.dt);

            let status = self.driver.step(&self.tm);

            if status != DriverStatus::Complete {
                return status;
            }
            self.tm.ncycle += 1;
            self.tm.time += self.tm.dt;

            if self.interrupted.load(Ordering::Relaxed) {
                warn!("interrupted at cycle {}", self.tm.ncycle);
                return DriverStatus::Failed;
            }
            if let Some(limit) = self.wall_time_limit {
                if start.elapsed() > limit {
                    return DriverStatus::Timeout;
                }
            }
        }
        DriverStatus::Complete
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use std::cell::RefCell;
    use crate::tasks::{TaskID, TaskStatus};
    use super::*;

    struct Recorder {
        integrator: Integrator,
        stages: RefCell<Vec<(u64, usize)>>,
        fail_at_cycle: Option<u64>,
    }

    impl Recorder {
        fn new(name: &str) -> Self {
            Self {
                integrator: Integrator::from_name(name).unwrap(),
                stages: RefCell::new(Vec::new()),
                fail_at_cycle: None,
            }
        }
    }

    impl MultiStageDriver for Recorder {
        fn integrator(&self) -> &Integrator {
            &self.integrator
        }

        fn make_task_collection<'a>(&'a self, stage: usize, tm: &SimTime) -> Result<TaskCollection<'a>> {
            let cycle = tm.ncycle;
            let fail = self.fail_at_cycle == Some(cycle);
            let mut tc = TaskCollection::new();

            tc.add_region(1)[0].add_named_task("record", TaskID::none(), move || {
                self.stages.borrow_mut().push((cycle, stage));
                if fail { TaskStatus::Fail } else { TaskStatus::Complete }
            })?;
            Ok(tc)
        }
    }

    fn config(tlim: f64, dt: f64) -> DriverConfig {
        DriverConfig { tlim, dt, ..DriverConfig::default() }
    }

    #[test]
    fn integrators_have_their_stage_weights() {
        assert_eq!(Integrator::from_name("rk1").unwrap().beta, vec![1.0]);
        assert_eq!(Integrator::from_name("vl2").unwrap().beta, vec![0.5, 1.0]);
        assert_eq!(Integrator::from_name("rk3").unwrap().num_stages(), 3);
        assert!(Integrator::from_name("rk4").is_err());
    }

    #[test]
    fn every_stage_runs_each_cycle() {
        let mut driver = EvolutionDriver::new(Recorder::new("rk2"), &config(0.75, 0.25)).unwrap();
        assert_eq!(driver.execute(), DriverStatus::Complete);
        assert_eq!(driver.time().ncycle, 3);
        assert_eq!(*driver.driver().stages.borrow(), vec![(0, 1), (0, 2), (1, 1), (1, 2), (2, 1), (2, 2)]);
    }

    #[test]
    fn last_step_is_shortened_to_reach_the_final_time() {
        let mut driver = EvolutionDriver::new(Recorder::new("rk1"), &config(0.625, 0.25)).unwrap();
        assert_eq!(driver.execute(), DriverStatus::Complete);
        assert_eq!(driver.time().ncycle, 3);
        assert_eq!(driver.time().dt, 0.125);
        assert_eq!(driver.time().time, 0.625);
    }

    #[test]
    fn cycle_limit_stops_the_run() {
        let config = DriverConfig { nlim: Some(2), ..config(10.0, 0.1) };
        let mut driver = EvolutionDriver::new(Recorder::new("rk1"), &config).unwrap();
        assert_eq!(driver.execute(), DriverStatus::Complete);
        assert_eq!(driver.time().ncycle, 2);
    }

    #[test]
    fn failed_stage_fails_the_run() {
        let recorder = Recorder { fail_at_cycle: Some(1), ..Recorder::new("rk3") };
        let mut driver = EvolutionDriver::new(recorder, &config(1.0, 0.1)).unwrap();
        assert_eq!(driver.execute(), DriverStatus::Failed);
        assert_eq!(driver.time().ncycle, 1);
        assert_eq!(driver.driver().stages.borrow().last(), Some(&(1, 1)));
    }

    #[test]
    fn interrupt_stops_after_the_current_cycle() {
        let mut driver = EvolutionDriver::new(Recorder::new("rk1"), &config(1.0, 0.1)).unwrap();
        driver.interrupt_flag().store(true, Ordering::Relaxed);
        assert_eq!(driver.execute(), DriverStatus::Failed);
        assert_eq!(driver.time().ncycle, 1);
    }

    #[test]
    fn wall_time_limit_times_out() {
        let config = DriverConfig { wall_time_limit: Some(1e-9), ..config(1.0, 0.1) };
        let mut driver = EvolutionDriver::new(Recorder::new("rk1"), &config).unwrap();
        assert_eq!(driver.execute(), DriverStatus::Timeout);
    }
}
