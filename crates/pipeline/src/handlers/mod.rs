//! Built-in node handlers.

mod basic;
mod codergen;
mod fan_in;
mod parallel;
mod tool;
mod wait_human;

pub use basic::{ConditionalHandler, ExitHandler, StartHandler};
pub use codergen::{CodergenBackend, CodergenHandler, CodergenOutput};
pub use fan_in::FanInHandler;
pub use parallel::{BranchExecutor, BranchOutcome, ParallelHandler};
pub use tool::ToolHandler;
pub use wait_human::{WaitHumanHandler, parse_accelerator_key};
