//! Processing Pipeline Module
//!
//! ```text
//! MessageSource ──▶ ProcessingLoop ──▶ MessageProcessor
//!                                        1. decode payload
//!                                        2. score (ScoringOracle)
//!                                        3. smooth over the stored window
//!                                        4. append sensor record
//!                                        5. alert if smoothed > threshold
//!                                        6. append prediction record
//! ```
//!
//! Messages are handled strictly one at a time. A failure at any stage drops
//! that message only.

mod state;
pub mod processing_loop;
pub mod processor;
pub mod smoothing;
pub mod source;

pub use processing_loop::ProcessingLoop;
pub use processor::{MessageOutcome, MessageProcessor, PipelineError};
pub use smoothing::WindowSmoother;
pub use source::{MessageSource, MqttSource, ReplaySource, SourceError, SourceEvent};
pub use state::*;
