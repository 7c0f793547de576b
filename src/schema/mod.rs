//! Gate access log schema
//!
//! This module defines the raw row format of the access log and the cleaner
//! that turns raw rows into typed, arrival-ordered gate events. Each consumer
//! gets its own vocabulary: ENTRY/EXIT for attendance, IN/OUT for sessions.

mod cleaner;
mod raw_row;

pub use cleaner::*;
pub use raw_row::*;
