//! Engine internals: conversation state, tool-call reassembly, configuration,
//! and the turn orchestrator.

pub mod accumulator;
pub mod config;
pub mod conversation;
pub mod message;
pub mod turn;
