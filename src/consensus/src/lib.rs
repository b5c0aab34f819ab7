//! Deterministic PBFT teaching simulator
//!
//! This crate replays a scripted PBFT message exchange (Request, Pre-Prepare,
//! Prepare, Commit, Reply) among `n = 3f+1` simulated nodes and derives the
//! quorum bookkeeping a teaching UI needs to render: per-node PREPARE/COMMIT
//! counts, consensus status, Byzantine divergence and view changes.
//!
//! ## Architecture
//!
//! Everything runs on a logical clock advanced by [`SimulationEngine::step`]:
//! 1. **Scene Table**: timed script of messages and narration per phase
//! 2. **Leader rotation**: scene endpoints are remapped by the current leader
//! 3. **Replay**: steps falling in the elapsed window become timeline entries
//! 4. **Vote aggregation**: per-node stats are recomputed from the timeline
//! 5. **Round lifecycle**: committed rounds accumulate a value
//!
//! There is no networking and no real concurrency. Given the same RNG seed
//! and the same sequence of step sizes, two engines produce identical state.

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod message;
pub mod metrics;
pub mod preferences;
pub mod replay;
pub mod retention;
pub mod round;
pub mod scene;
pub mod state;
pub mod timeline;
pub mod view_change;
pub mod votes;

pub use clock::{Clock, LocalWindow, PendingTransition, Phase};
pub use config::{DriverSettings, RetentionConfig, SimulationConfig};
pub use engine::{SimulationEngine, SimulationSnapshot};
pub use error::{ConsensusError, Result};
pub use events::SimulationEvent;
pub use message::{Endpoint, MessageKind, ScriptedMessage, TimelineMessage};
pub use metrics::SimulationMetrics;
pub use preferences::{JsonFilePreferenceStore, MemoryPreferenceStore, PreferenceStore, Preferences};
pub use retention::RetentionPolicy;
pub use round::RoundState;
pub use scene::{Scene, SceneStep, SceneTable, STEP_MS};
pub use state::{Node, NodeRole, NodeState, NodeStatus, NodeVoteStats, QuorumParams};
pub use timeline::{EventLog, LogEntry, Timeline};
pub use view_change::ViewState;
pub use votes::{compute_stats, quorum_progress, QuorumProgress};

/// Index of a simulated node in `[0, n)`
pub type NodeIndex = usize;

/// View number (monotonically increasing)
pub type ViewNumber = u64;

/// Logical time in milliseconds
pub type Millis = u64;
