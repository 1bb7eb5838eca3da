//! Trade orchestration.
//!
//! Sequences the order pipeline (network guard, balance check, smart-
//! wallet provisioning, credential linking, sizing, signing, submission)
//! as an explicit stage machine with an observer seam for progress UI and
//! a single-flight guard per trading session.

pub mod config;
pub mod observer;
pub mod pipeline;
pub mod stage;
pub mod switcher;

pub use config::PipelineConfig;
pub use observer::{NullStageObserver, RecordingObserver, StageObserver};
pub use pipeline::{PipelineDeps, TradePipeline};
pub use stage::TradeStage;
pub use switcher::{ChainSwitcher, DynChainSwitcher, FixedChain, MockChainSwitcher};
