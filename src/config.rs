use std::str::FromStr;

use crate::error::{Error, Result};

/// Forces a payload encoding instead of auto-detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncodingOverride {
    #[default]
    Auto,
    SelfDescribing,
    Sbe,
    CompactTagged,
}

impl FromStr for EncodingOverride {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "auto" => Ok(EncodingOverride::Auto),
            "self_describing" => Ok(EncodingOverride::SelfDescribing),
            "sbe" => Ok(EncodingOverride::Sbe),
            "compact_tagged" => Ok(EncodingOverride::CompactTagged),
            other => Err(Error::Config(format!("unknown encoding override: {other}"))),
        }
    }
}

/// Field order of the 8-byte SBE message header. Producers disagree when the
/// schema declares a non-default header, so the order is configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SbeHeaderLayout {
    #[default]
    BlockLengthFirst,
    TemplateIdFirst,
}

#[derive(Debug, Clone)]
pub struct DecodeConfig {
    pub encoding_override: EncodingOverride,
    pub max_nesting_depth: u32,
    pub include_metadata: bool,
    /// Strict: unknown type codes and unknown field ids abort iteration.
    /// Otherwise unknown field ids are skipped with a warning and decode
    /// failures are attached to the message.
    pub strict: bool,
    pub sbe_header: SbeHeaderLayout,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            encoding_override: EncodingOverride::Auto,
            max_nesting_depth: 64,
            include_metadata: false,
            strict: false,
            sbe_header: SbeHeaderLayout::BlockLengthFirst,
        }
    }
}

impl DecodeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_nesting_depth == 0 {
            return Err(Error::Config("max_nesting_depth must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_parses_known_names() {
        assert_eq!(
            "compact_tagged".parse::<EncodingOverride>().unwrap(),
            EncodingOverride::CompactTagged
        );
        assert_eq!(
            "auto".parse::<EncodingOverride>().unwrap(),
            EncodingOverride::Auto
        );
    }

    #[test]
    fn override_rejects_unknown_names() {
        assert!(matches!(
            "thrift".parse::<EncodingOverride>(),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn zero_depth_is_invalid() {
        let config = DecodeConfig {
            max_nesting_depth: 0,
            ..DecodeConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
