//! Pod lifecycle states and event notification.

use std::fmt;

use podshell_term::ShutdownSignal;

/// Where a pod is in its life, from this process's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PodState {
    /// Creation has been requested.
    #[default]
    Requested,
    /// The pool accepted the request; waiting for the pod to boot.
    Provisioning,
    /// Running and reachable.
    Ready,
    /// An interactive session is open.
    Attached,
    /// Teardown has started.
    Destroying,
    /// The pool confirmed the destroy.
    Destroyed,
    /// Provisioning or the session failed.
    Failed,
}

impl PodState {
    /// All states, in lifecycle order.
    pub const ALL: [Self; 7] = [
        Self::Requested,
        Self::Provisioning,
        Self::Ready,
        Self::Attached,
        Self::Destroying,
        Self::Destroyed,
        Self::Failed,
    ];

    /// Check if `next` is a legal successor.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Requested, Self::Provisioning | Self::Failed)
                | (Self::Provisioning, Self::Ready | Self::Failed | Self::Destroying)
                | (Self::Ready, Self::Attached | Self::Destroying)
                | (Self::Attached, Self::Destroying | Self::Failed)
                | (Self::Failed, Self::Destroying)
                | (Self::Destroying, Self::Destroyed)
        )
    }

    /// Check if no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Destroyed)
    }

    /// Lower-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Provisioning => "provisioning",
            Self::Ready => "ready",
            Self::Attached => "attached",
            Self::Destroying => "destroying",
            Self::Destroyed => "destroyed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PodState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something that happened to the managed pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// State changed.
    StateChanged {
        /// Previous state.
        from: PodState,
        /// New state.
        to: PodState,
    },
    /// The pool assigned an id.
    Created {
        /// The pod id.
        pod_id: String,
    },
    /// A readiness poll returned.
    Polled {
        /// The pod id.
        pod_id: String,
        /// 1-based poll number.
        attempt: u32,
        /// Status as reported by the pool.
        status: crate::pool::PodStatus,
    },
    /// A shutdown signal interrupted the flow.
    Interrupted(ShutdownSignal),
    /// Something failed.
    Error(String),
}

/// Callback type for lifecycle events.
pub type LifecycleCallback = Box<dyn Fn(&LifecycleEvent) + Send + Sync>;

/// Tracks the state of one pod and notifies observers.
pub struct LifecycleManager {
    callbacks: Vec<LifecycleCallback>,
    state: PodState,
    history: Vec<PodState>,
}

impl LifecycleManager {
    /// Create a manager in [`PodState::Requested`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            callbacks: Vec::new(),
            state: PodState::Requested,
            history: vec![PodState::Requested],
        }
    }

    /// Register a lifecycle callback.
    pub fn on_event(&mut self, callback: LifecycleCallback) {
        self.callbacks.push(callback);
    }

    /// Emit a lifecycle event.
    pub fn emit(&self, event: &LifecycleEvent) {
        for callback in &self.callbacks {
            callback(event);
        }
    }

    /// Move to `next` if the graph allows it.
    ///
    /// An illegal transition is logged and ignored; returns whether the
    /// state changed.
    pub fn transition(&mut self, next: PodState) -> bool {
        let from = self.state;
        if !from.can_transition_to(next) {
            tracing::warn!(from = %from, to = %next, "Ignoring illegal lifecycle transition");
            return false;
        }
        self.state = next;
        self.history.push(next);
        tracing::debug!(from = %from, to = %next, "Lifecycle transition");
        self.emit(&LifecycleEvent::StateChanged { from, to: next });
        true
    }

    /// Get the current state.
    #[must_use]
    pub const fn state(&self) -> PodState {
        self.state
    }

    /// Every state entered so far, oldest first.
    #[must_use]
    pub fn history(&self) -> &[PodState] {
        &self.history
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("state", &self.state)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}
