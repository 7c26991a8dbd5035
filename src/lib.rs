//! Reader for compiled layout-extraction bytecode.
//!
//! [`bytecode::decode`] turns a `.bls` byte stream into a [`bytecode::Program`]:
//! an ordered instruction list plus the string constants carried by its
//! `STRDATA` records. The [`util`] containers are the pieces an executor
//! needs on top of that.

pub mod bytecode;
pub mod util;
