//! Single outstanding configuration query per processor

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryState {
    #[default]
    Idle,
    Waiting,
    Success,
    Error,
}

/// Request/response slot shared by all components of one processor
///
/// The caller opens the slot, sends its request and waits; the processing
/// thread completes it when a matching response is dispatched. Responses
/// arriving while nothing is waiting, or for a different setting, are
/// dropped.
#[derive(Debug)]
pub struct ConfigQuery {
    state: QueryState,
    setting: u8,
    result: Vec<u8>,
}

impl ConfigQuery {
    /// Create a slot whose result buffer holds `capacity` bytes without
    /// reallocating
    pub fn new(capacity: usize) -> Self {
        Self {
            state: QueryState::Idle,
            setting: 0,
            result: Vec::with_capacity(capacity),
        }
    }

    pub fn state(&self) -> QueryState {
        self.state
    }

    pub fn is_waiting(&self) -> bool {
        self.state == QueryState::Waiting
    }

    /// Move Idle to Waiting for a response to `setting`
    pub fn open(&mut self, setting: u8) -> Result<()> {
        if self.state != QueryState::Idle {
            return Err(Error::QueryInProgress);
        }
        self.state = QueryState::Waiting;
        self.setting = setting;
        self.result.clear();
        Ok(())
    }

    /// Deliver a response; returns true if it answered the waiting query
    pub fn complete(&mut self, setting: u8, payload: &[u8]) -> bool {
        if self.state != QueryState::Waiting || setting != self.setting {
            return false;
        }
        self.result.clear();
        self.result.extend_from_slice(payload);
        self.state = QueryState::Success;
        true
    }

    /// Mark the waiting query as failed
    pub fn fail(&mut self) -> bool {
        if self.state != QueryState::Waiting {
            return false;
        }
        self.state = QueryState::Error;
        true
    }

    /// Payload of the last successful response
    pub fn result(&self) -> &[u8] {
        &self.result
    }

    /// Return to Idle, reporting the state the query ended in
    pub fn close(&mut self) -> QueryState {
        let state = self.state;
        self.state = QueryState::Idle;
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_outstanding_query() {
        let mut q = ConfigQuery::new(8);
        q.open(0x88).unwrap();
        assert!(matches!(q.open(0x8a), Err(Error::QueryInProgress)));
        assert!(q.is_waiting());
    }

    #[test]
    fn test_complete_and_close() {
        let mut q = ConfigQuery::new(8);
        q.open(0x8a).unwrap();
        assert!(!q.complete(0x88, &[1]));
        assert!(q.complete(0x8a, &[0x34, 0x12]));
        assert_eq!(q.state(), QueryState::Success);
        assert_eq!(q.result(), &[0x34, 0x12]);
        assert_eq!(q.close(), QueryState::Success);
        assert_eq!(q.state(), QueryState::Idle);
    }

    #[test]
    fn test_late_response_is_dropped() {
        let mut q = ConfigQuery::new(8);
        q.open(0x82).unwrap();
        assert_eq!(q.close(), QueryState::Waiting);
        assert!(!q.complete(0x82, &[1]));
        assert_eq!(q.state(), QueryState::Idle);
    }

    #[test]
    fn test_fail() {
        let mut q = ConfigQuery::new(1);
        assert!(!q.fail());
        q.open(1).unwrap();
        assert!(q.fail());
        assert_eq!(q.close(), QueryState::Error);
    }
}
