// Persistence layer: generic stores, in-memory backend, unit of work

pub mod entity;
pub mod memory;
pub mod unit_of_work;

pub use entity::{Entity, EntityStore};
pub use memory::{unique_constraint, Constraint, MemoryDb, MemorySession, MemoryStore};
pub use unit_of_work::{SaveGuard, UnitOfWork};
