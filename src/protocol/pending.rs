//! Handles over calls whose outcome has not arrived yet.

use flume::TryRecvError;

use crate::error::CallError;
use crate::transport::CallResult;

#[derive(Debug)]
/// The outcome of a call issued through [Protocol](crate::Protocol).
///
/// The outcome is forwarded here after the protocol processed it, so by the time
/// it is visible the routing table already reflects it (promoted or evicted).
/// Outcomes are only delivered from [Protocol::tick](crate::Protocol::tick).
pub struct PendingCall {
    receiver: flume::Receiver<CallResult>,
    outcome: Option<CallResult>,
}

impl PendingCall {
    pub(crate) fn new(receiver: flume::Receiver<CallResult>) -> Self {
        Self {
            receiver,
            outcome: None,
        }
    }

    /// Check for the outcome without blocking.
    pub fn poll(&mut self) -> Option<&CallResult> {
        if self.outcome.is_none() {
            self.outcome = match self.receiver.try_recv() {
                Ok(outcome) => Some(outcome),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => Some(Err(CallError::Disconnected)),
            };
        }

        self.outcome.as_ref()
    }

    /// Returns `true` once the outcome arrived.
    pub fn is_done(&mut self) -> bool {
        self.poll().is_some()
    }

    /// Returns the outcome if it arrived, without blocking.
    pub fn into_outcome(mut self) -> Option<CallResult> {
        self.poll();
        self.outcome
    }

    /// Block until the outcome arrives.
    ///
    /// The protocol must be ticking on another thread, otherwise this never returns.
    pub fn recv(self) -> CallResult {
        match self.outcome {
            Some(outcome) => outcome,
            None => self
                .receiver
                .recv()
                .unwrap_or(Err(CallError::Disconnected)),
        }
    }

    #[cfg(feature = "async")]
    /// Wait for the outcome asynchronously.
    pub async fn recv_async(self) -> CallResult {
        match self.outcome {
            Some(outcome) => outcome,
            None => self
                .receiver
                .recv_async()
                .await
                .unwrap_or(Err(CallError::Disconnected)),
        }
    }
}

#[derive(Debug, Default)]
/// The `store` calls scheduled when welcoming a new node.
///
/// Done once every call settled, successfully or not. One failed replica
/// does not affect the others.
pub struct Replication {
    calls: Vec<PendingCall>,
}

impl Replication {
    pub(crate) fn new(calls: Vec<PendingCall>) -> Self {
        Self { calls }
    }

    /// Number of scheduled `store` calls.
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Returns `true` if nothing was scheduled.
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Returns `true` once every scheduled call settled.
    pub fn is_done(&mut self) -> bool {
        self.calls.iter_mut().all(|call| call.is_done())
    }

    /// Returns every outcome, in scheduling order, once all of them arrived.
    pub fn outcomes(&mut self) -> Option<Vec<CallResult>> {
        if !self.is_done() {
            return None;
        }

        Some(
            self.calls
                .iter_mut()
                .filter_map(|call| call.poll().cloned())
                .collect(),
        )
    }

    /// Block until every scheduled call settled.
    ///
    /// The protocol must be ticking on another thread, otherwise this never returns.
    pub fn wait(self) -> Vec<CallResult> {
        self.calls.into_iter().map(PendingCall::recv).collect()
    }

    #[cfg(feature = "async")]
    /// Wait until every scheduled call settled.
    pub async fn wait_async(self) -> Vec<CallResult> {
        futures::future::join_all(self.calls.into_iter().map(PendingCall::recv_async)).await
    }
}
