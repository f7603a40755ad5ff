//! Adaptive learning engine: per-question recall tracking, SM-2 review
//! scheduling, urgency-ranked recommendations, and session orchestration
//! with batched feedback generation. Persistence and feedback generation
//! are external collaborators supplied by the host.

pub mod config;
pub mod feedback;
pub mod logging;
pub mod models;
pub mod recall;
pub mod recommend;
pub mod session;
pub mod sm2;
pub mod store;

pub use config::EngineConfig;
pub use session::{AnswerOutcome, EngineError, LearningEngine, ProcessAnswerInput};
pub use store::{EngineStore, MemoryStore, Store, StoreError};
