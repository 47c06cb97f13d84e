//! # Architecture Abstraction Layer
//!
//! Hardware boundary for the scheduler: the tick source that drives
//! `time::SystemClock`, the idle wait, and the heap. Currently implements
//! the Cortex-M4 port; extensible to other architectures by adding sibling
//! modules.

pub mod cortex_m4;
