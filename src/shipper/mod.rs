//! Buffered, self-healing delivery pipeline.
//!
//! This module defines [`FemtoShipper`], a client that frames caller records
//! with a delimiter byte and forwards them to a remote collector over mutual
//! TLS. Writers only append to a bounded [`RecordBuffer`](crate::RecordBuffer);
//! a pump thread maintains the connection, transparently reconnects using
//! exponential backoff, and drains the buffer onto the socket.

mod backoff;
mod client;
mod config;
mod connector;
mod pump;
mod state;
mod transport;

#[cfg(test)]
mod test_support;

pub use client::FemtoShipper;
pub use config::{
    BackoffPolicy, DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_CAP, DEFAULT_BACKOFF_RESET,
    DEFAULT_CLOSE_TIMEOUT, DEFAULT_CONNECT_TIMEOUT, DEFAULT_DELIMITER, DEFAULT_WRITE_TIMEOUT,
    PeerVerification, ShipperConfig,
};
pub use state::{ConnectionState, StatsSnapshot};
