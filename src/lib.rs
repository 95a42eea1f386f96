pub mod calendar;
pub mod compactor;
pub mod config;
pub mod editor;
pub mod engine;
pub mod limits;
pub mod model;
pub mod observability;
pub mod projector;
pub mod store;
pub mod wal;
