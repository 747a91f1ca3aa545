//! Abstract transport seams.
//!
//! The message-bus transport itself is an external collaborator; the policy
//! and iodevs consume it through these traits, and tests substitute
//! recording fakes.

use crate::error::BtError;
use crate::sco::ScoLink;
use aural_core::BtDeviceId;

/// HFP codecs negotiable on the service-level connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HfpCodec {
    /// CVSD, narrowband 8 kHz.
    Cvsd,
    /// mSBC, wideband 16 kHz.
    Msbc,
}

impl HfpCodec {
    /// The PCM rate this codec carries.
    pub const fn sample_rate(self) -> usize {
        match self {
            HfpCodec::Cvsd => 8000,
            HfpCodec::Msbc => 16000,
        }
    }
}

/// SCO link establishment for the HFP iodev pair.
pub trait ScoConnector {
    /// Run codec negotiation on the service-level connection.
    fn negotiate_codec(&mut self, device: BtDeviceId) -> HfpCodec;

    /// Acquire the SCO socket for the negotiated codec.
    fn sco_connect(&mut self, device: BtDeviceId, codec: HfpCodec) -> Result<ScoLink, BtError>;

    /// Report call audio as active or idle to the gateway.
    fn set_call_active(&mut self, device: BtDeviceId, active: bool);

    /// Forward speaker gain to the headset.
    fn speaker_gain(&mut self, device: BtDeviceId, gain: u32);
}
