//! Eos - realtime event broker
//!
//! Producers send signed, tag-addressed events as UDP datagrams;
//! subscribers hold a WebSocket open and receive every event matching
//! their filter.
//!
//! ## Pipeline
//! ```text
//! UDP datagram -> encoding::native -> auth::Authenticator -> bus::Dispatcher
//!                                                               |
//!                                      transport::ws sessions <-+
//! ```

pub mod auth;
pub mod bus;
pub mod config;
pub mod encoding;
pub mod model;
pub mod transport;
pub mod utils;

#[cfg(test)]
pub mod test_utils;
