//! Pass-through handlers: start, exit, conditional.

use std::path::Path;

use async_trait::async_trait;

use crate::context::Context;
use crate::error::PipelineResult;
use crate::graph::{Graph, Node};
use crate::handler::Handler;
use crate::types::Outcome;

/// The pipeline entry point. No work; always succeeds.
#[derive(Debug, Clone, Copy)]
pub struct StartHandler;

#[async_trait]
impl Handler for StartHandler {
    async fn handle(
        &self,
        _node: &Node,
        _context: &Context,
        _graph: &Graph,
        _logs_root: &Path,
    ) -> PipelineResult<Outcome> {
        Ok(Outcome::success())
    }
}

/// Pipeline termination. The engine finalizes at terminal nodes without
/// invoking a handler; this exists for nodes explicitly typed `exit`
/// elsewhere in a graph.
#[derive(Debug, Clone, Copy)]
pub struct ExitHandler;

#[async_trait]
impl Handler for ExitHandler {
    async fn handle(
        &self,
        _node: &Node,
        _context: &Context,
        _graph: &Graph,
        _logs_root: &Path,
    ) -> PipelineResult<Outcome> {
        Ok(Outcome::success())
    }
}

/// A routing decision point. The decision itself lives in edge selection;
/// the node just passes through.
#[derive(Debug, Clone, Copy)]
pub struct ConditionalHandler;

#[async_trait]
impl Handler for ConditionalHandler {
    async fn handle(
        &self,
        node: &Node,
        _context: &Context,
        _graph: &Graph,
        _logs_root: &Path,
    ) -> PipelineResult<Outcome> {
        Ok(Outcome::success()
            .with_note(format!("conditional '{}' routes via edge selection", node.id)))
    }
}
