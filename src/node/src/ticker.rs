//! Frame ticker driving a shared simulation on wall-clock time

use parking_lot::Mutex;
use pbftviz_consensus::{Millis, SimulationEngine};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Engine shared between the ticker and control commands.
///
/// Every operation takes the lock for its whole duration, so a step and a
/// command never interleave.
pub type SharedSimulation = Arc<Mutex<SimulationEngine>>;

pub fn shared(engine: SimulationEngine) -> SharedSimulation {
    Arc::new(Mutex::new(engine))
}

/// Logical milliseconds to advance for one frame at `speed`
pub fn frame_delta(frame_ms: u64, speed: f64) -> Millis {
    (frame_ms as f64 * speed).round().max(0.0) as Millis
}

/// How a ticker run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickerSummary {
    pub frames: u64,
    pub rounds_completed: u64,
    pub t: Millis,
    pub value: i64,
}

/// Calls `step` once per frame while the simulation is playing
pub struct SimulationTicker {
    engine: SharedSimulation,

    frame_ms: u64,

    /// Stop once this many rounds completed during the run
    max_rounds: Option<u64>,

    shutdown_tx: mpsc::Sender<()>,

    shutdown_rx: mpsc::Receiver<()>,
}

impl SimulationTicker {
    pub fn new(engine: SharedSimulation, frame_ms: u64, max_rounds: Option<u64>) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        Self {
            engine,
            frame_ms: frame_ms.max(1),
            max_rounds,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Handle that stops a running ticker
    pub fn shutdown_handle(&self) -> mpsc::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Run until shutdown or until `max_rounds` rounds have been committed
    pub async fn run(&mut self) -> TickerSummary {
        let mut ticker = interval(Duration::from_millis(self.frame_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let baseline = self.engine.lock().metrics().rounds_completed.get();
        let mut frames = 0;

        info!(frame_ms = self.frame_ms, max_rounds = ?self.max_rounds, "Ticker started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    frames += 1;
                    let committed = self.tick() - baseline;
                    if self.max_rounds.map_or(false, |max| committed >= max) {
                        info!("Round limit reached");
                        break;
                    }
                }
                _ = self.shutdown_rx.recv() => {
                    info!("Ticker received shutdown signal");
                    break;
                }
            }
        }

        let engine = self.engine.lock();
        let summary = TickerSummary {
            frames,
            rounds_completed: engine.metrics().rounds_completed.get() - baseline,
            t: engine.t(),
            value: engine.round().value,
        };
        debug!(?summary, "Ticker stopped");
        summary
    }

    /// Advance one frame, returning the total committed round count
    fn tick(&self) -> u64 {
        let mut engine = self.engine.lock();
        if engine.is_playing() {
            let delta = frame_delta(self.frame_ms, engine.settings().speed);
            engine.step(delta);
        }
        engine.metrics().rounds_completed.get()
    }
}
