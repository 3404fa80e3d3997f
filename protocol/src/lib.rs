mod client_session;
mod election;
mod message;
mod snapshot_cache;
mod traits;
mod types;

pub use client_session::*;
pub use election::*;
pub use message::*;
pub use snapshot_cache::*;
pub use traits::*;
pub use types::*;

pub extern crate serde;
pub extern crate serde_json;
pub extern crate uuid;
