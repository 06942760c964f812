//! Internal data structures.
//!
//! This module provides a generational [`Slab`] used to store connections
//! behind small, stable handles that never alias a reused slot.

mod slab;

pub(crate) use slab::{Key, Slab};
