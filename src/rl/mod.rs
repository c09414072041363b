//! Reinforcement-learning support.
//!
//! # Data Flow
//! ```text
//! Static:  model dir → model.rs (ModelStore, atomic swap) ← watcher.rs (notify)
//!          metrics snapshot → encoder.rs → state key → Q-table lookup
//!
//! Remote:  client.rs  POST /decide  (bounded timeout)
//!          feedback.rs queue → worker → POST /feedback
//!
//! Offline: experience.rs queue → worker → POST {collector}/experience
//! ```

pub mod client;
pub mod encoder;
pub mod experience;
pub mod feedback;
pub mod model;
pub mod watcher;

pub use client::{
    AgentHealth, DecisionRequest, FeedbackRecord, RlClientError, RlDecisionClient, RoutingDecision,
};
pub use encoder::StateEncoder;
pub use experience::{
    reward_for_status, Experience, ExperienceLogger, ExperienceMetadata, ExperienceWorker,
    StateSnapshot,
};
pub use feedback::{FeedbackReporter, FeedbackWorker};
pub use model::{ModelError, ModelStats, ModelStore, RlModel};
pub use watcher::ModelWatcher;
