//! ISUPPORT parsing and the client-side capability table.
//!
//! Servers advertise their limits and features in RPL_ISUPPORT (005) lines.
//! The 005 numeric is doubly assigned: legacy servers used it as RPL_BOUNCE.
//! The only reliable discriminator is the trailing parameter, which reads
//! like `are supported by this server` for genuine ISUPPORT lines.

use std::collections::HashMap;

/// Trailing phrases that confirm a 005 line carries ISUPPORT tokens.
pub const CONFIRMATION_PHRASES: [&str; 2] = [
    "are available on this server",
    "are supported by this server",
];

/// Value of a single ISUPPORT token.
///
/// A bare key (e.g. `EXCEPTS`) is a boolean flag; `KEY=v1,v2` carries a
/// comma-separated value list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CapabilityValue {
    /// The key was present without a value.
    Flag,
    /// The comma-split values of a `KEY=...` token.
    List(Vec<String>),
}

impl CapabilityValue {
    /// First value of a list token, if any.
    pub fn first(&self) -> Option<&str> {
        match self {
            CapabilityValue::Flag => None,
            CapabilityValue::List(values) => values.first().map(String::as_str),
        }
    }
}

/// Accumulated server capabilities for one connection epoch.
///
/// Entries are replaced wholesale per received token; the table as a whole
/// is dropped with its connection epoch and rebuilt on reconnect.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SupportTable {
    entries: HashMap<String, CapabilityValue>,
}

impl SupportTable {
    /// Create an empty table.
    pub fn new() -> SupportTable {
        SupportTable::default()
    }

    /// Whether a trailing parameter confirms an ISUPPORT line.
    pub fn is_confirmation(trailing: &str) -> bool {
        CONFIRMATION_PHRASES.contains(&trailing)
    }

    /// Merge a sequence of `KEY` / `KEY=v1,v2` tokens into the table.
    pub fn merge_tokens<S: AsRef<str>>(&mut self, tokens: &[S]) {
        for token in tokens {
            let token = token.as_ref();
            if token.is_empty() {
                continue;
            }
            let (key, value) = match token.split_once('=') {
                Some((key, value)) => (
                    key,
                    CapabilityValue::List(value.split(',').map(str::to_string).collect()),
                ),
                None => (token, CapabilityValue::Flag),
            };
            self.entries.insert(key.to_string(), value);
        }
    }

    /// Look up a token by key.
    pub fn get(&self, key: &str) -> Option<&CapabilityValue> {
        self.entries.get(key)
    }

    /// First value of a list-valued token parsed as an integer.
    pub fn numeric(&self, key: &str) -> Option<u32> {
        self.get(key)?.first()?.parse().ok()
    }

    /// Whether any tokens have been merged yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of known tokens.
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirmation_phrases() {
        assert!(SupportTable::is_confirmation("are supported by this server"));
        assert!(SupportTable::is_confirmation("are available on this server"));
        assert!(!SupportTable::is_confirmation("Try server irc.example.com, port 6667"));
    }

    #[test]
    fn merge_key_value_tokens() {
        let mut table = SupportTable::new();
        table.merge_tokens(&["NICKLEN=9", "CHANNELLEN=50"]);
        assert_eq!(
            table.get("NICKLEN"),
            Some(&CapabilityValue::List(vec!["9".into()]))
        );
        assert_eq!(table.numeric("CHANNELLEN"), Some(50));
    }

    #[test]
    fn bare_key_is_flag() {
        let mut table = SupportTable::new();
        table.merge_tokens(&["EXCEPTS"]);
        assert_eq!(table.get("EXCEPTS"), Some(&CapabilityValue::Flag));
        assert_eq!(table.numeric("EXCEPTS"), None);
    }

    #[test]
    fn comma_values_split() {
        let mut table = SupportTable::new();
        table.merge_tokens(&["CHANMODES=b,k,l,imnpst"]);
        assert_eq!(
            table.get("CHANMODES"),
            Some(&CapabilityValue::List(vec![
                "b".into(),
                "k".into(),
                "l".into(),
                "imnpst".into()
            ]))
        );
    }

    #[test]
    fn later_token_replaces_earlier() {
        let mut table = SupportTable::new();
        table.merge_tokens(&["NICKLEN=9"]);
        table.merge_tokens(&["NICKLEN=30"]);
        assert_eq!(table.numeric("NICKLEN"), Some(30));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn empty_tokens_ignored() {
        let mut table = SupportTable::new();
        table.merge_tokens(&[""]);
        assert!(table.is_empty());
    }
}
