use serde::{Deserialize, Serialize};

/// Identity of one asynchronous request.
///
/// `generation` is the board generation the request was issued against. It
/// advances every time the position changes, so a result is stale as soon as
/// the two disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ticket {
    pub id: u64,
    pub generation: u64,
}

/// Issues tickets and tracks the current generation.
#[derive(Debug, Default, Clone)]
pub struct TicketIssuer {
    next_id: u64,
    generation: u64,
}

impl TicketIssuer {
    pub fn issue(&mut self) -> Ticket {
        self.next_id += 1;
        Ticket {
            id: self.next_id,
            generation: self.generation,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The position changed; everything issued so far is now stale.
    pub fn advance(&mut self) {
        self.generation += 1;
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        ticket.generation == self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_makes_tickets_stale() {
        let mut issuer = TicketIssuer::default();
        let a = issuer.issue();
        let b = issuer.issue();
        assert_ne!(a.id, b.id);
        assert!(issuer.is_current(a));

        issuer.advance();
        assert!(!issuer.is_current(a));
        let c = issuer.issue();
        assert!(issuer.is_current(c));
    }
}
