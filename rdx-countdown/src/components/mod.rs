//! Contains the moving parts a timer is assembled from.
//!
//! This module provides the observer registry (who gets notified, in which
//! order) and the periodic wakeup (the Tokio task that advances a running
//! timer). `CountdownTimer` owns one of each.

pub mod observer;
pub mod wakeup;
