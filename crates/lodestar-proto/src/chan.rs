//! Channel name helpers.

/// Extension trait for channel-name checks on string types.
pub trait ChannelExt {
    /// Whether this target names a channel rather than a user.
    ///
    /// RFC 2812 channel sigils: `#`, `&`, `+` and `!`.
    fn is_channel_name(&self) -> bool;
}

impl<T: AsRef<str>> ChannelExt for T {
    fn is_channel_name(&self) -> bool {
        let s = self.as_ref();
        s.starts_with('#') || s.starts_with('&') || s.starts_with('+') || s.starts_with('!')
    }
}
