//! replwatch - MariaDB replication monitor and planned switchover
//!
//! Probes a primary and its replicas into immutable topology snapshots,
//! classifies replica health, and hands the primary role to the most
//! advanced in-sync replica through a forward-only stage machine.

pub mod cli;
pub mod gateway;
pub mod health;
pub mod monitor;
pub mod observability;
pub mod switchover;
pub mod topology;
