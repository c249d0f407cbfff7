//! # lodestar-proto
//!
//! A Rust library for parsing and serializing IRC protocol messages from the
//! client side of the connection.
//!
//! ## Features
//!
//! - IRC message parsing with prefixes, commands, and parameters
//! - Typed numeric responses for the replies a client session consumes
//! - ISUPPORT (RPL_ISUPPORT) capability-table parsing
//! - Optional Tokio codec for line framing
//!
//! ## Quick start
//!
//! ```rust
//! use lodestar_proto::Message;
//!
//! // Construct messages
//! let privmsg = Message::privmsg("#rust", "Hello, world!");
//! let join = Message::join("#channel");
//!
//! // Parse a raw line
//! let msg: Message = ":nick!user@host PRIVMSG #channel :Hello!".parse().unwrap();
//! assert_eq!(msg.source_nickname(), Some("nick"));
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod chan;
#[cfg(feature = "tokio")]
pub mod codec;
pub mod command;
pub mod error;
pub mod isupport;
pub mod message;
pub mod prefix;
pub mod response;

pub use chan::ChannelExt;
#[cfg(feature = "tokio")]
pub use codec::IrcCodec;
pub use command::Command;
pub use error::{MessageParseError, ProtocolError};
pub use isupport::{CapabilityValue, SupportTable};
pub use message::Message;
pub use prefix::Prefix;
pub use response::Response;
