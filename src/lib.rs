pub mod calendar;
pub mod config;
pub mod conflict;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod reconciler;
pub mod refresher;
pub mod store;
pub mod wal;
pub mod wire;
