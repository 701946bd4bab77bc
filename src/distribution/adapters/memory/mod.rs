//! In-memory distribution adapters.

mod repository;

pub use repository::InMemoryDistributionRepository;
