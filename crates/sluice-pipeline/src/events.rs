//! Workflow event system for observability.
//!
//! Emits [`PipelineEvent`]s via a [`tokio::sync::broadcast`] channel so that
//! observers can follow phase, item and node progress without reaching into
//! the engine.

use serde::{Deserialize, Serialize};

/// Events emitted while a workflow runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    WorkflowStarted {
        workflow: String,
        run_id: String,
    },
    WorkflowCompleted {
        workflow: String,
        code: i32,
        duration_ms: u64,
    },
    PhaseStarted {
        phase: String,
    },
    PhaseCompleted {
        phase: String,
        code: i32,
        duration_ms: u64,
    },
    NodeCompleted {
        graph: String,
        node_id: String,
        type_id: String,
        code: i32,
        duration_ms: u64,
    },
    ItemStarted {
        item: String,
        index: usize,
    },
    ItemCompleted {
        item: String,
        code: i32,
    },
    WatchSleeping {
        interval_ms: u64,
    },
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<PipelineEvent>,
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all current subscribers. Dropped when nobody listens.
    pub fn emit(&self, event: PipelineEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("receivers", &self.sender.receiver_count())
            .finish()
    }
}
