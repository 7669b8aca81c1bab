/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # IronGate Collections
//!
//! Primitive-keyed, allocation-light collections used on the gateway hot
//! path.
//!
//! This crate provides:
//! - [`Long2LongMap`]: an open-addressed `i64 -> i64` hash map with linear
//!   probing and shift-compaction on removal, avoiding boxing and tombstones

pub mod long_map;

pub use long_map::Long2LongMap;
