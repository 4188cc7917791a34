//! Live transform scripts over text buffers.
//!
//! The edit engine lives in [`transaction`]: it applies a [`transaction::Batch`]
//! in one step and hands back the batch that undoes it. [`history`] stacks
//! those inverses so a whole script run can be reverted, and [`session`] /
//! [`transform`] drive script runs against a target buffer through the narrow
//! interface in [`script`].

use smartstring::{
  LazyCompact,
  SmartString,
};

pub mod buffer;
pub mod config;
pub mod history;
pub mod position;
pub mod script;
pub mod search;
pub mod session;
pub mod transaction;
pub mod transform;

pub type Tendril = SmartString<LazyCompact>;
