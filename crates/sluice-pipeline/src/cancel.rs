//! Nested cancellation scopes.
//!
//! Every unit of work that can be stopped on its own (a phase, a watch loop)
//! enters a scope. Scopes nest: each one is a child token of the scope below
//! it, so cancelling an outer scope also cancels everything inside it. An
//! interrupt (Ctrl-C) cancels only the innermost scope.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

/// Handle to one entered scope.
#[derive(Debug, Clone)]
pub struct CancelScope {
    id: u64,
    token: CancellationToken,
}

impl CancelScope {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

#[derive(Debug)]
pub struct CancellationStack {
    root: CancellationToken,
    scopes: Mutex<Vec<CancelScope>>,
    next_id: AtomicU64,
}

impl CancellationStack {
    pub fn new() -> Self {
        Self {
            root: CancellationToken::new(),
            scopes: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn scopes(&self) -> MutexGuard<'_, Vec<CancelScope>> {
        self.scopes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The process-wide token. Never popped.
    pub fn root(&self) -> CancellationToken {
        self.root.clone()
    }

    /// Token of the innermost scope, or the root when no scope is entered.
    pub fn current(&self) -> CancellationToken {
        self.scopes()
            .last()
            .map(|s| s.token.clone())
            .unwrap_or_else(|| self.root.clone())
    }

    pub fn depth(&self) -> usize {
        self.scopes().len()
    }

    /// Push a scope derived from the current one. Cancelling any of `extra`
    /// also cancels the new scope; linking needs a running tokio runtime.
    pub fn enter(&self, extra: &[CancellationToken]) -> CancelScope {
        let mut scopes = self.scopes();
        let parent = scopes.last().map(|s| &s.token).unwrap_or(&self.root);
        let scope = CancelScope {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            token: parent.child_token(),
        };

        for linked in extra {
            if linked.is_cancelled() {
                scope.token.cancel();
                continue;
            }
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let linked = linked.clone();
                    let child = scope.token.clone();
                    handle.spawn(async move {
                        tokio::select! {
                            _ = linked.cancelled() => child.cancel(),
                            _ = child.cancelled() => {}
                        }
                    });
                }
                Err(_) => {
                    tracing::warn!("No tokio runtime; extra cancellation token not linked");
                }
            }
        }

        scopes.push(scope.clone());
        tracing::trace!(depth = scopes.len(), "Entered cancellation scope");
        scope
    }

    /// Pop `scope` and cancel its token. Returns `false` without doing
    /// anything when the scope was already left (or interrupted), or when it
    /// is not the innermost scope.
    pub fn leave(&self, scope: &CancelScope) -> bool {
        let mut scopes = self.scopes();
        match scopes.iter().position(|s| s.id == scope.id) {
            None => false,
            Some(pos) if pos + 1 == scopes.len() => {
                scopes.pop();
                scope.token.cancel();
                true
            }
            Some(pos) => {
                tracing::warn!(
                    position = pos,
                    depth = scopes.len(),
                    "Refusing to leave a cancellation scope that is not innermost"
                );
                false
            }
        }
    }

    /// Cancel the innermost scope. With no scope entered the root is
    /// cancelled instead. Returns whether a scope was popped.
    pub fn interrupt(&self) -> bool {
        match self.scopes().pop() {
            Some(scope) => {
                tracing::info!("Interrupt: cancelling innermost scope");
                scope.token.cancel();
                true
            }
            None => {
                tracing::info!("Interrupt: cancelling root");
                self.root.cancel();
                false
            }
        }
    }
}

impl Default for CancellationStack {
    fn default() -> Self {
        Self::new()
    }
}
