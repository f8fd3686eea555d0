pub mod analysis;
pub mod database;
pub mod error;
pub mod import;
pub mod models;
pub mod utils;
pub mod watchlist;

pub use error::ScreenerError;
