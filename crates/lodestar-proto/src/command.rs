//! IRC command types.
//!
//! Typed representations of the commands a client session sends and receives.
//! Known numerics are captured as [`Command::Response`]; anything else is kept
//! verbatim in [`Command::Raw`].
//!
//! Mode arguments are carried as raw strings: a client session forwards mode
//! changes, it does not interpret them.
//!
//! # Reference
//! - RFC 2812: Internet Relay Chat: Client Protocol

use std::fmt;

use crate::response::Response;

/// IRC command with its parameters.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum Command {
    /// `NICK nickname`
    NICK(String),
    /// `USER username mode :realname`
    USER(String, String, String),
    /// `JOIN channel [key]`
    JOIN(String, Option<String>),
    /// `PART channel [message]`
    PART(String, Option<String>),
    /// `MODE target [modes]`
    MODE(String, Option<String>),
    /// `TOPIC channel [topic]`
    TOPIC(String, Option<String>),
    /// `PRIVMSG target :text`
    PRIVMSG(String, String),
    /// `NOTICE target :text`
    NOTICE(String, String),
    /// `PING token [server2]`
    PING(String, Option<String>),
    /// `PONG token [server2]`
    PONG(String, Option<String>),
    /// `QUIT [message]`
    QUIT(Option<String>),
    /// Numeric reply with its arguments.
    Response(Response, Vec<String>),
    /// Any command this library does not model.
    Raw(String, Vec<String>),
}

impl Command {
    /// Build a command from its name and argument list.
    ///
    /// Unknown commands and known commands with an unexpected argument shape
    /// fall back to [`Command::Raw`]; a client drops nothing it might still
    /// want to log.
    pub fn new(name: &str, args: Vec<String>) -> Command {
        if let Ok(resp) = name.parse::<Response>() {
            return Command::Response(resp, args);
        }

        let raw = |args: Vec<String>| Command::Raw(name.to_uppercase(), args);
        let mut args = args;
        match (name.to_uppercase().as_str(), args.len()) {
            ("NICK", 1) => Command::NICK(args.remove(0)),
            ("USER", 4) => {
                // `USER username mode unused :realname`; the unused parameter
                // is dropped on parse and reinserted on serialization.
                let username = args.remove(0);
                let mode = args.remove(0);
                args.remove(0);
                Command::USER(username, mode, args.remove(0))
            }
            ("JOIN", 1) => Command::JOIN(args.remove(0), None),
            ("JOIN", 2) => Command::JOIN(args.remove(0), Some(args.remove(0))),
            ("PART", 1) => Command::PART(args.remove(0), None),
            ("PART", 2) => Command::PART(args.remove(0), Some(args.remove(0))),
            ("MODE", 1) => Command::MODE(args.remove(0), None),
            ("MODE", _) if args.len() >= 2 => {
                let target = args.remove(0);
                Command::MODE(target, Some(args.join(" ")))
            }
            ("TOPIC", 1) => Command::TOPIC(args.remove(0), None),
            ("TOPIC", 2) => Command::TOPIC(args.remove(0), Some(args.remove(0))),
            ("PRIVMSG", 2) => Command::PRIVMSG(args.remove(0), args.remove(0)),
            ("NOTICE", 2) => Command::NOTICE(args.remove(0), args.remove(0)),
            ("PING", 1) => Command::PING(args.remove(0), None),
            ("PING", 2) => Command::PING(args.remove(0), Some(args.remove(0))),
            ("PONG", 1) => Command::PONG(args.remove(0), None),
            ("PONG", 2) => Command::PONG(args.remove(0), Some(args.remove(0))),
            ("QUIT", 0) => Command::QUIT(None),
            ("QUIT", 1) => Command::QUIT(Some(args.remove(0))),
            _ => raw(args),
        }
    }

    /// The textual command name (`PRIVMSG`, `001`, ...).
    pub fn name(&self) -> String {
        match self {
            Command::NICK(..) => "NICK".into(),
            Command::USER(..) => "USER".into(),
            Command::JOIN(..) => "JOIN".into(),
            Command::PART(..) => "PART".into(),
            Command::MODE(..) => "MODE".into(),
            Command::TOPIC(..) => "TOPIC".into(),
            Command::PRIVMSG(..) => "PRIVMSG".into(),
            Command::NOTICE(..) => "NOTICE".into(),
            Command::PING(..) => "PING".into(),
            Command::PONG(..) => "PONG".into(),
            Command::QUIT(..) => "QUIT".into(),
            Command::Response(resp, _) => resp.to_string(),
            Command::Raw(name, _) => name.clone(),
        }
    }
}

/// Write a middle (non-trailing) parameter.
fn mid(f: &mut fmt::Formatter<'_>, arg: &str) -> fmt::Result {
    write!(f, " {arg}")
}

/// Write the final parameter, prefixing `:` when required.
fn trailing(f: &mut fmt::Formatter<'_>, arg: &str) -> fmt::Result {
    if arg.is_empty() || arg.starts_with(':') || arg.contains(' ') {
        write!(f, " :{arg}")
    } else {
        write!(f, " {arg}")
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::NICK(nick) => {
                write!(f, "NICK")?;
                trailing(f, nick)
            }
            Command::USER(username, mode, realname) => {
                write!(f, "USER")?;
                mid(f, username)?;
                mid(f, mode)?;
                mid(f, "*")?;
                trailing(f, realname)
            }
            Command::JOIN(chan, key) => {
                write!(f, "JOIN")?;
                match key {
                    Some(key) => {
                        mid(f, chan)?;
                        trailing(f, key)
                    }
                    None => trailing(f, chan),
                }
            }
            Command::PART(chan, msg) => {
                write!(f, "PART")?;
                match msg {
                    Some(msg) => {
                        mid(f, chan)?;
                        trailing(f, msg)
                    }
                    None => trailing(f, chan),
                }
            }
            Command::MODE(target, modes) => {
                write!(f, "MODE")?;
                mid(f, target)?;
                if let Some(modes) = modes {
                    mid(f, modes)?;
                }
                Ok(())
            }
            Command::TOPIC(chan, topic) => {
                write!(f, "TOPIC")?;
                match topic {
                    Some(topic) => {
                        mid(f, chan)?;
                        trailing(f, topic)
                    }
                    None => trailing(f, chan),
                }
            }
            Command::PRIVMSG(target, text) => {
                write!(f, "PRIVMSG")?;
                mid(f, target)?;
                write!(f, " :{text}")
            }
            Command::NOTICE(target, text) => {
                write!(f, "NOTICE")?;
                mid(f, target)?;
                write!(f, " :{text}")
            }
            Command::PING(token, server2) => {
                write!(f, "PING")?;
                match server2 {
                    Some(server2) => {
                        mid(f, token)?;
                        trailing(f, server2)
                    }
                    None => trailing(f, token),
                }
            }
            Command::PONG(token, server2) => {
                write!(f, "PONG")?;
                match server2 {
                    Some(server2) => {
                        mid(f, token)?;
                        trailing(f, server2)
                    }
                    None => trailing(f, token),
                }
            }
            Command::QUIT(msg) => {
                write!(f, "QUIT")?;
                match msg {
                    Some(msg) => trailing(f, msg),
                    None => Ok(()),
                }
            }
            Command::Response(resp, args) => {
                write!(f, "{resp}")?;
                write_arg_list(f, args)
            }
            Command::Raw(name, args) => {
                write!(f, "{name}")?;
                write_arg_list(f, args)
            }
        }
    }
}

fn write_arg_list(f: &mut fmt::Formatter<'_>, args: &[String]) -> fmt::Result {
    if let Some((last, init)) = args.split_last() {
        for arg in init {
            mid(f, arg)?;
        }
        trailing(f, last)?;
    }
    Ok(())
}
