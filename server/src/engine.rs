//! Engine lifecycle: {Constructed -> Running -> Stopped}.
//!
//! `start` spawns the fixed-period step loop on its own task. Each
//! tick locks the gate, runs one simulation step, then re-locks to
//! serialize the post-step snapshot and robot feedback records, and
//! hands both to the network layer. `stop` is cooperative: the flag
//! is observed at the next step boundary, never mid-step.

use crate::gate::Gate;
use crate::simulation::Simulation;
use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Post-step state handed from the step loop to the network layer.
#[derive(Debug)]
pub struct StepBroadcast {
    /// Full world snapshot for visualisers.
    pub snapshot: Vec<u8>,
    /// Per-robot feedback records, keyed by robot id.
    pub robot_states: Vec<(u16, Vec<u8>)>,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine already started")]
    AlreadyStarted,
    #[error("engine is not running")]
    NotRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineState {
    Constructed,
    Running,
    Stopped,
}

/// Drives the simulation on a fixed timestep, independent of network
/// I/O. The step size is simulated time per step; the period is the
/// wall-clock spacing between steps.
pub struct Engine {
    gate: Arc<Gate<Simulation>>,
    state: EngineState,
    running: Arc<AtomicBool>,
    step: f64,
    period: Duration,
    handle: Option<JoinHandle<()>>,
}

impl Engine {
    pub fn new(gate: Arc<Gate<Simulation>>, step: f64, period: Duration) -> Self {
        Self {
            gate,
            state: EngineState::Constructed,
            running: Arc::new(AtomicBool::new(false)),
            step,
            period,
            handle: None,
        }
    }

    pub fn gate(&self) -> Arc<Gate<Simulation>> {
        Arc::clone(&self.gate)
    }

    pub fn is_running(&self) -> bool {
        self.state == EngineState::Running
    }

    /// Starts the step loop. Valid only once, from the constructed
    /// state.
    pub fn start(
        &mut self,
        updates: mpsc::UnboundedSender<StepBroadcast>,
    ) -> Result<(), EngineError> {
        if self.state != EngineState::Constructed {
            return Err(EngineError::AlreadyStarted);
        }

        self.running.store(true, Ordering::SeqCst);
        let gate = Arc::clone(&self.gate);
        let running = Arc::clone(&self.running);
        let step = self.step;
        let period = self.period;

        self.handle = Some(tokio::spawn(async move {
            run_step_loop(gate, running, step, period, updates).await;
        }));
        self.state = EngineState::Running;
        info!(
            "Simulation started: step {:.3}s every {}ms",
            self.step,
            self.period.as_millis()
        );
        Ok(())
    }

    /// Requests a cooperative stop and joins the step loop. The flag
    /// is checked at the step boundary, so an in-flight step always
    /// completes.
    pub async fn stop(&mut self) -> Result<(), EngineError> {
        if self.state != EngineState::Running {
            return Err(EngineError::NotRunning);
        }

        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        self.state = EngineState::Stopped;
        info!("Simulation stopped");
        Ok(())
    }
}

impl Drop for Engine {
    /// Dropping a running engine must not leak the step-loop task:
    /// clear the flag and abort the task outright, since nothing can
    /// join it afterwards.
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn run_step_loop(
    gate: Arc<Gate<Simulation>>,
    running: Arc<AtomicBool>,
    step: f64,
    period: Duration,
    updates: mpsc::UnboundedSender<StepBroadcast>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // The first tick fires immediately.
    ticker.tick().await;

    let mut steps: u64 = 0;
    loop {
        ticker.tick().await;
        if !running.load(Ordering::SeqCst) {
            break;
        }

        {
            let mut sim = gate.lock();
            sim.update(step);
        }

        // Serialization also goes through the gate, so it observes a
        // consistent post-step state.
        let broadcast = {
            let sim = gate.lock();
            StepBroadcast {
                snapshot: sim.snapshot_bytes(),
                robot_states: sim.robot_states(),
            }
        };

        // The network side may already be gone during shutdown.
        let _ = updates.send(broadcast);

        steps += 1;
        if steps % 250 == 0 {
            let time = {
                let sim = gate.lock();
                sim.time()
            };
            debug!("Completed {} steps, simulated time {:.2}s", steps, time);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Circle, Entity, Shape};
    use shared::Point;

    fn test_engine() -> Engine {
        let mut sim = Simulation::new(400, 400);
        sim.add_entity(Entity::new(
            1,
            5,
            true,
            Shape::Circle(Circle::new(Point::new(200.0, 200.0), 10.0)),
        ))
        .unwrap();

        let gate = Arc::new(Gate::new(sim));
        Engine::new(gate, 0.04, Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let mut engine = test_engine();
        let (tx, mut updates) = mpsc::unbounded_channel();

        assert!(!engine.is_running());
        engine.start(tx).unwrap();
        assert!(engine.is_running());

        // The loop produces post-step broadcasts on its own clock.
        let broadcast = updates.recv().await.expect("no broadcast received");
        assert!(!broadcast.snapshot.is_empty());

        engine.stop().await.unwrap();
        assert!(!engine.is_running());
    }

    #[tokio::test]
    async fn test_double_start_is_rejected() {
        let mut engine = test_engine();
        let (tx, _updates) = mpsc::unbounded_channel();

        engine.start(tx.clone()).unwrap();
        match engine.start(tx) {
            Err(EngineError::AlreadyStarted) => {}
            other => panic!("expected AlreadyStarted, got {:?}", other),
        }
        engine.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_without_start_is_rejected() {
        let mut engine = test_engine();
        match engine.stop().await {
            Err(EngineError::NotRunning) => {}
            other => panic!("expected NotRunning, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_drop_while_running_stops_step_loop() {
        let mut engine = test_engine();
        let (tx, mut updates) = mpsc::unbounded_channel();

        engine.start(tx).unwrap();
        let _ = updates.recv().await.expect("no broadcast received");

        // Dropping without stop() must tear the step loop down; its
        // sender clone drops with it and the channel drains to closed.
        drop(engine);
        let drained = tokio::time::timeout(Duration::from_secs(2), async {
            while updates.recv().await.is_some() {}
        })
        .await;
        assert!(drained.is_ok(), "step loop kept running after drop");
    }

    #[tokio::test]
    async fn test_time_advances_while_running() {
        let mut engine = test_engine();
        let gate = engine.gate();
        let (tx, mut updates) = mpsc::unbounded_channel();

        engine.start(tx).unwrap();
        // Wait for a couple of steps.
        let _ = updates.recv().await;
        let _ = updates.recv().await;
        engine.stop().await.unwrap();

        let time = {
            let sim = gate.lock();
            sim.time()
        };
        assert!(time >= 0.08 - 1e-9, "time {} after two steps", time);
    }
}
