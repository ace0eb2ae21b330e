//! Boot sequencer, network failover and mining pipeline supervisor for a
//! Bitaxe mining controller.
//!
//! [`boot::BootSequence`] runs five stages in order: hardware bring-up,
//! network failover, peripheral services, the connectivity gate, and the
//! mining pipeline. Hardware and protocol collaborators are reached through
//! traits; [`sim`] provides an in-process implementation of all of them.

pub mod asic;
pub mod boot;
pub mod bringup;
pub mod config;
pub mod daemon;
pub mod error;
pub mod gate;
pub mod hw_trait;
pub mod network;
pub mod peripheral;
pub mod pipeline;
pub mod sim;
pub mod status;
pub mod tracing;
pub mod transport;

#[cfg(test)]
mod testing;
