//! Constraint checking and greedy planning for academic timetables.

pub mod busy;
pub mod config;
pub mod constraints;
pub mod data;
pub mod directory;
pub mod error;
pub mod lessons;
pub mod planner;
pub mod preview;
pub mod server;
pub mod service;

#[cfg(test)]
mod test_support;
