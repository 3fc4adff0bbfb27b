use tokio::sync::watch;

use crate::error::GraphError;

/// Shared handle to an in-flight caching request.
///
/// A flight resolves exactly once. Handles are cheap to clone, and every
/// clone observes the same outcome, including clones taken after the flight
/// already resolved. Dropping a handle never cancels the underlying work.
#[derive(Debug, Clone)]
pub struct Flight {
    rx: watch::Receiver<Option<Result<(), GraphError>>>,
}

/// Resolving side of a [`Flight`]. Held by the task doing the work.
#[derive(Debug)]
pub struct FlightResolver {
    tx: watch::Sender<Option<Result<(), GraphError>>>,
}

/// Create a connected resolver and flight pair.
pub fn flight() -> (FlightResolver, Flight) {
    let (tx, rx) = watch::channel(None);
    (FlightResolver { tx }, Flight { rx })
}

/// A flight that already resolved with `outcome`.
pub fn resolved(outcome: Result<(), GraphError>) -> Flight {
    let (resolver, flight) = flight();
    resolver.resolve(outcome);
    flight
}

impl Flight {
    /// Wait for the outcome. Returns immediately if already resolved.
    pub async fn complete(&self) -> Result<(), GraphError> {
        let mut rx = self.rx.clone();
        loop {
            if let Some(outcome) = rx.borrow_and_update().clone() {
                return outcome;
            }
            if rx.changed().await.is_err() {
                // Resolver dropped without sending, check for a final value.
                return rx.borrow().clone().unwrap_or(Err(GraphError::Aborted));
            }
        }
    }

    /// Outcome if the flight already resolved, without waiting.
    pub fn try_outcome(&self) -> Option<Result<(), GraphError>> {
        self.rx.borrow().clone()
    }
}

impl FlightResolver {
    pub fn resolve(self, outcome: Result<(), GraphError>) {
        // Send fails only when no receiver is left, which is fine.
        let _ = self.tx.send(Some(outcome));
    }
}
