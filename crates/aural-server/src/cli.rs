//! CLI-side parsing helpers: node ids and effect bitmasks.

use aural_core::{NodeId, effects};
use thiserror::Error;

/// Parse errors for CLI inputs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// Node id is not of the form `<dev>:<node>` or `<dev>:<node>:<value>`.
    #[error("malformed node id '{0}'")]
    NodeId(String),

    /// Effect string is neither hex nor known names.
    #[error("unknown effect '{0}'")]
    Effect(String),
}

/// Parse `"<N>:<M>"` into a packed node id.
pub fn parse_node_id(input: &str) -> Result<NodeId, ParseError> {
    let mut parts = input.split(':');
    let dev = parse_index(parts.next(), input)?;
    let node = parse_index(parts.next(), input)?;
    if parts.next().is_some() {
        return Err(ParseError::NodeId(input.to_string()));
    }
    Ok(NodeId::new(dev, node))
}

/// Parse `"<N>:<M>:<V>"` into a packed node id and an integer value.
pub fn parse_node_id_with_value(input: &str) -> Result<(NodeId, i64), ParseError> {
    let mut parts = input.split(':');
    let dev = parse_index(parts.next(), input)?;
    let node = parse_index(parts.next(), input)?;
    let value = parts
        .next()
        .ok_or_else(|| ParseError::NodeId(input.to_string()))?
        .parse()
        .map_err(|_| ParseError::NodeId(input.to_string()))?;
    if parts.next().is_some() {
        return Err(ParseError::NodeId(input.to_string()));
    }
    Ok((NodeId::new(dev, node), value))
}

fn parse_index(part: Option<&str>, input: &str) -> Result<u32, ParseError> {
    part.ok_or_else(|| ParseError::NodeId(input.to_string()))?
        .parse()
        .map_err(|_| ParseError::NodeId(input.to_string()))
}

/// Parse an effect bitmask: hex with a `0x` prefix, or comma-separated
/// names (`aec`, `ns`, `agc`, `vad`).
pub fn parse_effects(input: &str) -> Result<u32, ParseError> {
    if let Some(hex) = input.strip_prefix("0x").or_else(|| input.strip_prefix("0X")) {
        return u32::from_str_radix(hex, 16).map_err(|_| ParseError::Effect(input.to_string()));
    }
    let mut mask = 0;
    for name in input.split(',') {
        mask |= match name.trim().to_ascii_lowercase().as_str() {
            "aec" => effects::AEC,
            "ns" => effects::NS,
            "agc" => effects::AGC,
            "vad" => effects::VAD,
            other => return Err(ParseError::Effect(other.to_string())),
        };
    }
    Ok(mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_forms() {
        assert_eq!(parse_node_id("7:2").unwrap(), NodeId::new(7, 2));
        assert_eq!(
            parse_node_id_with_value("7:2:85").unwrap(),
            (NodeId::new(7, 2), 85)
        );
        assert_eq!(
            parse_node_id_with_value("7:2:-300").unwrap(),
            (NodeId::new(7, 2), -300)
        );
    }

    #[test]
    fn malformed_node_ids_fail() {
        for bad in ["", "7", "7:", ":2", "a:b", "7:2:x", "7:2:3:4"] {
            assert!(parse_node_id_with_value(bad).is_err(), "accepted {bad:?}");
        }
        assert!(parse_node_id("7:2:85").is_err());
    }

    #[test]
    fn effects_as_hex() {
        assert_eq!(parse_effects("0x1").unwrap(), effects::AEC);
        assert_eq!(parse_effects("0x7").unwrap(), effects::AEC | effects::NS | effects::AGC);
        assert_eq!(parse_effects("0x40").unwrap(), effects::AGC_ON_DSP_ALLOWED);
    }

    #[test]
    fn effects_as_names() {
        assert_eq!(parse_effects("aec").unwrap(), effects::AEC);
        assert_eq!(
            parse_effects("aec,ns,vad").unwrap(),
            effects::AEC | effects::NS | effects::VAD
        );
        assert!(parse_effects("reverb").is_err());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn display_then_parse_is_identity(dev in any::<u32>(), node in any::<u32>()) {
                let id = NodeId::new(dev, node);
                prop_assert_eq!(parse_node_id(&id.to_string()).unwrap(), id);
            }
        }
    }
}
