// Service exports
pub mod cache;
pub mod memory;
pub mod postgres;
pub mod repository;

pub use cache::{CacheError, CacheKey, CacheManager};
pub use memory::InMemoryRepository;
pub use postgres::{ActionType, PostgresRepository};
pub use repository::{MatchRepository, RepositoryError};
