//! IRC numeric response codes consumed by a client session.
//!
//! Servers reply to commands with three-digit numerics. This enum covers the
//! numerics a client session acts on; anything else stays a raw command.
//!
//! # Reference
//! - RFC 2812: Internet Relay Chat: Client Protocol
//! - Modern IRC documentation: <https://modern.ircdocs.horse/>

#![allow(non_camel_case_types)]

use std::fmt;
use std::str::FromStr;

/// IRC server response code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u16)]
#[non_exhaustive]
pub enum Response {
    /// 001 - Welcome to the IRC network; registration is complete.
    RPL_WELCOME = 1,
    /// 002 - Your host is running version
    RPL_YOURHOST = 2,
    /// 003 - Server creation date
    RPL_CREATED = 3,
    /// 004 - Server info (name, version, user modes, channel modes)
    RPL_MYINFO = 4,
    /// 005 - Server supported features (ISUPPORT).
    ///
    /// Doubly assigned: legacy servers use 005 as RPL_BOUNCE. Receivers must
    /// disambiguate on the trailing parameter.
    RPL_ISUPPORT = 5,
    /// 010 - Bounce to another server
    RPL_BOUNCE = 10,
    /// 331 - No topic is set
    RPL_NOTOPIC = 331,
    /// 332 - Channel topic
    RPL_TOPIC = 332,
    /// 353 - NAMES reply
    RPL_NAMREPLY = 353,
    /// 366 - End of NAMES
    RPL_ENDOFNAMES = 366,
    /// 372 - MOTD line
    RPL_MOTD = 372,
    /// 375 - MOTD start
    RPL_MOTDSTART = 375,
    /// 376 - End of MOTD
    RPL_ENDOFMOTD = 376,
    /// 401 - No such nick/channel
    ERR_NOSUCHNICK = 401,
    /// 421 - Unknown command
    ERR_UNKNOWNCOMMAND = 421,
    /// 422 - MOTD is missing
    ERR_NOMOTD = 422,
    /// 433 - Nickname is already in use
    ERR_NICKNAMEINUSE = 433,
    /// 451 - Not registered
    ERR_NOTREGISTERED = 451,
}

impl Response {
    /// The numeric code for this response.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Look up a response by numeric code.
    pub fn from_code(code: u16) -> Option<Response> {
        use Response::*;
        Some(match code {
            1 => RPL_WELCOME,
            2 => RPL_YOURHOST,
            3 => RPL_CREATED,
            4 => RPL_MYINFO,
            5 => RPL_ISUPPORT,
            10 => RPL_BOUNCE,
            331 => RPL_NOTOPIC,
            332 => RPL_TOPIC,
            353 => RPL_NAMREPLY,
            366 => RPL_ENDOFNAMES,
            372 => RPL_MOTD,
            375 => RPL_MOTDSTART,
            376 => RPL_ENDOFMOTD,
            401 => ERR_NOSUCHNICK,
            421 => ERR_UNKNOWNCOMMAND,
            422 => ERR_NOMOTD,
            433 => ERR_NICKNAMEINUSE,
            451 => ERR_NOTREGISTERED,
            _ => return None,
        })
    }

    /// Whether this numeric is an error reply (400-599).
    pub fn is_error(self) -> bool {
        (400..600).contains(&self.code())
    }
}

/// Error returned when a string is not a known three-digit numeric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseResponseError;

impl fmt::Display for ParseResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "not a known IRC numeric")
    }
}

impl std::error::Error for ParseResponseError {}

impl FromStr for Response {
    type Err = ParseResponseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 3 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseResponseError);
        }
        s.parse::<u16>()
            .ok()
            .and_then(Response::from_code)
            .ok_or(ParseResponseError)
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.code())
    }
}
