//! Domain services used by the websocket and HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! `history` and `presence` are plain data structures with no locking.
//! `coordinator` owns the serialization discipline around them and fans
//! results out through `hub`.

pub mod coordinator;
pub mod history;
pub mod hub;
pub mod presence;
