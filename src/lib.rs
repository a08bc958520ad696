//! neural-vm library
//!
//! Cooperative multi-threaded interpreter for one-hot encoded instruction
//! words, with a simulated heap, a class/struct object model and a program
//! loader.

pub mod config;
pub mod interpreter;
pub mod memory;
pub mod object;
pub mod program;
