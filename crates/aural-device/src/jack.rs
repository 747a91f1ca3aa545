//! Jack event handling.
//!
//! Hardware jacks surface as GPIO switch bits or control-interface booleans
//! named by the card. For UCM-enabled cards the jack-to-node mapping comes
//! from the card's database; legacy cards fall back to control-name pattern
//! matching. The event source itself is external; edges are fed into the
//! [`JackMonitor`], which flips the node's plugged state.

use crate::node::NodeAttr;
use crate::registry::DeviceRegistry;
use aural_core::{Direction, NodeId};
use aural_ucm::UseCaseMgr;
use tracing::debug;

/// The node role a jack control maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JackRole {
    Headphone,
    Mic,
    /// HDMI/DP jack for the given PCM index.
    HdmiPcm(u32),
    /// UCM named the owning device section.
    UcmDevice(String),
}

/// Map a jack control name to a node role.
///
/// UCM wins when it knows the jack; otherwise the well-known control name
/// patterns apply: `"... Headphone Jack"`, `"... Mic Jack"`, and
/// `"HDMI/DP,pcm=N Jack"`.
pub fn classify_jack(
    control_name: &str,
    direction: Direction,
    ucm: Option<&UseCaseMgr>,
) -> Option<JackRole> {
    if let Some(mgr) = ucm {
        if let Some(dev) = mgr.get_dev_for_jack(control_name, direction) {
            return Some(JackRole::UcmDevice(dev));
        }
    }
    if let Some(rest) = control_name.strip_prefix("HDMI/DP,pcm=") {
        let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
        if let Ok(pcm) = digits.parse() {
            return Some(JackRole::HdmiPcm(pcm));
        }
    }
    if control_name.ends_with("Headphone Jack") && direction == Direction::Output {
        return Some(JackRole::Headphone);
    }
    if control_name.ends_with("Mic Jack") && direction == Direction::Input {
        return Some(JackRole::Mic);
    }
    None
}

/// Subscriptions from jack control names to nodes.
#[derive(Debug, Default)]
pub struct JackMonitor {
    bindings: Vec<(String, NodeId)>,
}

impl JackMonitor {
    /// Empty monitor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind edges of `control_name` to the plug state of `node`.
    pub fn subscribe(&mut self, control_name: &str, node: NodeId) {
        self.bindings.push((control_name.to_string(), node));
    }

    /// Drop every binding for a device (card unplug).
    pub fn unsubscribe_device(&mut self, dev_index: u32) {
        self.bindings.retain(|(_, id)| id.dev_index() != dev_index);
    }

    /// Feed one jack edge; returns the nodes whose plug state changed.
    pub fn handle_edge(
        &self,
        registry: &mut DeviceRegistry,
        control_name: &str,
        plugged: bool,
    ) -> Vec<NodeId> {
        let mut changed = Vec::new();
        for (name, node) in &self.bindings {
            if name != control_name {
                continue;
            }
            debug!(control_name, node = %node, plugged, "jack edge");
            if registry.set_node_attr(*node, NodeAttr::Plugged(plugged)).is_ok() {
                changed.push(*node);
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aural_ucm::FakeUcm;

    #[test]
    fn legacy_patterns() {
        assert_eq!(
            classify_jack("Headphone Jack", Direction::Output, None),
            Some(JackRole::Headphone)
        );
        assert_eq!(
            classify_jack("Front Headphone Jack", Direction::Output, None),
            Some(JackRole::Headphone)
        );
        assert_eq!(
            classify_jack("Mic Jack", Direction::Input, None),
            Some(JackRole::Mic)
        );
        assert_eq!(
            classify_jack("HDMI/DP,pcm=3 Jack", Direction::Output, None),
            Some(JackRole::HdmiPcm(3))
        );
        // Direction mismatches never map.
        assert_eq!(classify_jack("Headphone Jack", Direction::Input, None), None);
        assert_eq!(classify_jack("Mic Jack", Direction::Output, None), None);
        assert_eq!(classify_jack("Dock Jack", Direction::Output, None), None);
    }

    #[test]
    fn ucm_mapping_wins() {
        let mut fake = FakeUcm::new();
        fake.add_device("Headset")
            .set_var("JackDev", "Headset", "cardX Headset Jack");
        let mgr = UseCaseMgr::new(Box::new(fake));

        assert_eq!(
            classify_jack("cardX Headset Jack", Direction::Output, Some(&mgr)),
            Some(JackRole::UcmDevice("Headset".to_string()))
        );
    }
}
