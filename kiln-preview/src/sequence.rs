//! Sequence numbers that decide which render response may be shown.

/// Identifies one issued render request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(u64);

impl std::fmt::Display for Ticket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out tickets and accepts only the response to the newest one.
///
/// Responses may come back in any order. A response is applied only if its
/// ticket is the most recently issued one and nothing has been applied for
/// that ticket yet, so an older request resolving late can never replace
/// newer output.
#[derive(Debug, Default)]
pub struct Sequencer {
    issued: u64,
    applied: u64,
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ticket for a new request; every earlier ticket is superseded.
    pub fn issue(&mut self) -> Ticket {
        self.issued += 1;
        Ticket(self.issued)
    }

    /// Whether the response for `ticket` should be applied. True at most
    /// once, and only for the latest ticket.
    pub fn accept(&mut self, ticket: Ticket) -> bool {
        if ticket.0 == self.issued && ticket.0 > self.applied {
            self.applied = ticket.0;
            true
        } else {
            false
        }
    }

    /// Invalidate every outstanding ticket without issuing a request.
    pub fn supersede(&mut self) {
        let ticket = self.issue();
        self.applied = ticket.0;
    }

    pub fn last_issued(&self) -> u64 {
        self.issued
    }

    /// Whether the newest request is still waiting for its response.
    pub fn is_pending(&self) -> bool {
        self.issued > self.applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn late_response_to_an_older_request_is_rejected() {
        let mut sequencer = Sequencer::new();
        let first = sequencer.issue();
        let second = sequencer.issue();
        assert!(sequencer.accept(second));
        assert!(!sequencer.accept(first));
    }

    #[test]
    fn older_response_is_rejected_even_before_the_newer_one_arrives() {
        let mut sequencer = Sequencer::new();
        let first = sequencer.issue();
        let second = sequencer.issue();
        assert!(!sequencer.accept(first));
        assert!(sequencer.is_pending());
        assert!(sequencer.accept(second));
        assert!(!sequencer.is_pending());
    }

    #[test]
    fn a_ticket_is_accepted_once() {
        let mut sequencer = Sequencer::new();
        let ticket = sequencer.issue();
        assert!(sequencer.accept(ticket));
        assert!(!sequencer.accept(ticket));
    }

    #[test]
    fn supersede_invalidates_in_flight_requests() {
        let mut sequencer = Sequencer::new();
        let in_flight = sequencer.issue();
        sequencer.supersede();
        assert!(!sequencer.accept(in_flight));
        assert!(!sequencer.is_pending());
        assert_eq!(sequencer.last_issued(), 2);
    }
}
