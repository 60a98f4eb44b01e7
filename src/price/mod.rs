//! Price acquisition: quote-source client, best-pair selection, TTL cache

pub mod cache;
pub mod client;
pub mod pairs;

pub use cache::{PriceCache, StaleLookup};
pub use client::PriceClient;
