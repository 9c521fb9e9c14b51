use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use super::CallResult;

#[derive(Debug)]
pub struct InflightCall {
    pub to: SocketAddr,
    pub sent_at: Instant,
    pub outcome: flume::Sender<CallResult>,
}

impl InflightCall {
    /// A response matches if it comes from the address the request was sent to.
    pub fn does_match(&self, from: &SocketAddr) -> bool {
        if self.to.port() != from.port() {
            return false;
        }

        if self.to.ip().is_unspecified() {
            return true;
        }

        self.to.ip() == from.ip()
    }
}

#[derive(Debug, Default)]
pub struct InflightCalls {
    calls: HashMap<u32, InflightCall>,
}

impl InflightCalls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, transaction_id: u32, to: SocketAddr, outcome: flume::Sender<CallResult>) {
        self.calls.insert(
            transaction_id,
            InflightCall {
                to,
                sent_at: Instant::now(),
                outcome,
            },
        );
    }

    pub fn contains(&self, transaction_id: u32) -> bool {
        self.calls.contains_key(&transaction_id)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Remove the inflight call by transaction_id if it exists and matches the address
    pub fn remove(&mut self, transaction_id: u32, from: &SocketAddr) -> Option<InflightCall> {
        let matches = self
            .calls
            .get(&transaction_id)
            .map(|call| call.does_match(from))
            .unwrap_or(false);

        if !matches {
            return None;
        }

        self.calls.remove(&transaction_id)
    }

    /// Remove and return calls that have been inflight for at least `timeout`.
    pub fn expire(&mut self, timeout: Duration) -> Vec<(u32, InflightCall)> {
        let expired: Vec<u32> = self
            .calls
            .iter()
            .filter(|(_, call)| call.sent_at.elapsed() >= timeout)
            .map(|(transaction_id, _)| *transaction_id)
            .collect();

        expired
            .into_iter()
            .filter_map(|transaction_id| {
                self.calls
                    .remove(&transaction_id)
                    .map(|call| (transaction_id, call))
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn remove_checks_address() {
        let mut calls = InflightCalls::new();
        let (sender, _receiver) = flume::bounded(1);

        let to = SocketAddr::from(([127, 0, 0, 1], 6881));
        calls.add(7, to, sender);

        assert!(calls
            .remove(7, &SocketAddr::from(([127, 0, 0, 2], 6881)))
            .is_none());
        assert!(calls.remove(8, &to).is_none());
        assert!(calls.contains(7));

        assert!(calls.remove(7, &to).is_some());
        assert!(!calls.contains(7));
    }

    #[test]
    fn expire() {
        let mut calls = InflightCalls::new();
        let (sender, _receiver) = flume::bounded(1);

        calls.add(1, SocketAddr::from(([127, 0, 0, 1], 1)), sender);

        assert!(calls.expire(Duration::from_secs(60)).is_empty());
        assert_eq!(calls.len(), 1);

        let expired = calls.expire(Duration::ZERO);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].0, 1);
        assert_eq!(calls.len(), 0);
    }
}
