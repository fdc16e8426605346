use triage_contracts::Ticket;

/// Owner of every ticket. Handlers are the only callers and hold the state
/// lock for the whole read-modify-write, so implementations need no locking.
pub trait TicketStore: Send {
    fn get(&self, id: u64) -> Option<Ticket>;

    /// All tickets in insertion order.
    fn list(&self) -> Vec<Ticket>;

    fn append(&mut self, ticket: Ticket) -> Result<(), String>;

    /// Replaces the ticket with the same id. Returns `false` when absent.
    fn update(&mut self, ticket: Ticket) -> Result<bool, String>;

    fn next_id(&self) -> u64 {
        self.list().iter().map(|t| t.id).max().unwrap_or(0) + 1
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tickets: Vec<Ticket>,
}

impl TicketStore for MemoryStore {
    fn get(&self, id: u64) -> Option<Ticket> {
        self.tickets.iter().find(|t| t.id == id).cloned()
    }

    fn list(&self) -> Vec<Ticket> {
        self.tickets.clone()
    }

    fn append(&mut self, ticket: Ticket) -> Result<(), String> {
        if self.tickets.iter().any(|t| t.id == ticket.id) {
            return Err(format!("ticket id {} already exists", ticket.id));
        }
        self.tickets.push(ticket);
        Ok(())
    }

    fn update(&mut self, ticket: Ticket) -> Result<bool, String> {
        match self.tickets.iter_mut().find(|t| t.id == ticket.id) {
            Some(slot) => {
                *slot = ticket;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
