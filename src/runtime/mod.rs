//! Runtime system
//!
//! This module contains the worker pool and the task registry that drives it.

pub mod pool;
pub mod registry;
