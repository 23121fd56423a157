//! Data source implementations
//!
//! `ArraySource` holds records in memory. `EntitySelection` stands in for a
//! server-backed entity collection: it pages, sorts and filters on its own side
//! and charges a configurable round trip for every request. `EntityElement` and
//! `ScalarElement` are the two kinds of current-element pointer a host binds.

pub mod array_source;
pub mod element;
pub mod entity_selection;

pub use array_source::ArraySource;
pub use element::{EntityElement, ScalarElement};
pub use entity_selection::{EntitySelection, RemoteRequest};
