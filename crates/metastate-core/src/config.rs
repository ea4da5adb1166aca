#![forbid(unsafe_code)]

//! Channel configuration.
//!
//! A [`ChannelConfig`] names a channel for diagnostics and controls whether
//! each successful dispatch is traced at `DEBUG` level. Tracing is off by
//! default; [`ChannelConfig::from_env`] enables it when
//! `METASTATE_TRACE_DISPATCH` is set to a truthy value.

use std::borrow::Cow;
use std::env;

/// Environment variable read by [`ChannelConfig::from_env`].
pub const TRACE_DISPATCH_ENV: &str = "METASTATE_TRACE_DISPATCH";

const DEFAULT_NAME: &str = "channel";

/// Diagnostic settings for a [`Channel`](crate::Channel).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ChannelConfig {
    /// Name attached to every log record emitted by the channel.
    pub name: Cow<'static, str>,
    /// Open a `dispatch` span and log subscriber counts around each fan-out.
    pub trace_dispatch: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            name: Cow::Borrowed(DEFAULT_NAME),
            trace_dispatch: false,
        }
    }
}

impl ChannelConfig {
    /// Default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Default configuration with dispatch tracing taken from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        let raw = env::var(TRACE_DISPATCH_ENV).ok();
        Self::default().trace_dispatch(parse_flag(raw.as_deref()))
    }

    /// Set the diagnostic name.
    #[must_use]
    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Enable or disable dispatch tracing.
    #[must_use]
    pub fn trace_dispatch(mut self, enabled: bool) -> Self {
        self.trace_dispatch = enabled;
        self
    }
}

fn parse_flag(raw: Option<&str>) -> bool {
    let Some(raw) = raw else {
        return false;
    };
    let raw = raw.trim();
    ["1", "true", "yes", "on"]
        .iter()
        .any(|truthy| raw.eq_ignore_ascii_case(truthy))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ChannelConfig::default();
        assert_eq!(config.name, "channel");
        assert!(!config.trace_dispatch);
    }

    #[test]
    fn builder_setters() {
        let config = ChannelConfig::new().name("session").trace_dispatch(true);
        assert_eq!(config.name, "session");
        assert!(config.trace_dispatch);

        let owned = ChannelConfig::new().name(format!("tab-{}", 3));
        assert_eq!(owned.name, "tab-3");
    }

    #[test]
    fn flag_parsing() {
        assert!(parse_flag(Some("1")));
        assert!(parse_flag(Some("TRUE")));
        assert!(parse_flag(Some(" yes ")));
        assert!(parse_flag(Some("On")));
        assert!(!parse_flag(Some("0")));
        assert!(!parse_flag(Some("")));
        assert!(!parse_flag(Some("maybe")));
        assert!(!parse_flag(None));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserialize_partial() {
        let config: ChannelConfig = serde_json::from_str(r#"{"trace_dispatch": true}"#)
            .expect("valid config json");
        assert_eq!(config.name, "channel");
        assert!(config.trace_dispatch);
    }
}
