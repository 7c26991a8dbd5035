//! # Support Containers
//!
//! Small data structures shared by the decoder and by executors built on it.
//!
//! - [`table`]: sorted and contiguous lookup tables built once from literals.
//! - [`stack`]: a stack with checked pops and a scoped pop guard.
//! - [`intern`]: a string pool handing out stable symbols.

pub mod intern;
pub mod stack;
pub mod table;
