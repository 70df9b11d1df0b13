pub mod memory_store;
pub mod ticket_store;

pub use memory_store::MemoryStore;
pub use ticket_store::TicketStore;
