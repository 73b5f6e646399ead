//! Audio output device names reported to clients.

use audren_core::{BehaviorInfo, Feature};

/// Bytes in a device name record, NUL padded.
pub const DEVICE_NAME_SIZE: usize = 0x100;

/// Fixed-size, NUL-padded device name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceName([u8; DEVICE_NAME_SIZE]);

impl DeviceName {
    /// Encodes `name`, truncating to leave a trailing NUL.
    pub fn new(name: &str) -> Self {
        let mut raw = [0u8; DEVICE_NAME_SIZE];
        let len = name.len().min(DEVICE_NAME_SIZE - 1);
        raw[..len].copy_from_slice(&name.as_bytes()[..len]);
        Self(raw)
    }

    /// Raw record bytes.
    pub fn as_bytes(&self) -> &[u8; DEVICE_NAME_SIZE] {
        &self.0
    }

    /// The name up to the first NUL.
    pub fn as_str(&self) -> &str {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(DEVICE_NAME_SIZE);
        std::str::from_utf8(&self.0[..end]).unwrap_or_default()
    }
}

impl Default for DeviceName {
    fn default() -> Self {
        Self([0; DEVICE_NAME_SIZE])
    }
}

const OUTPUT_DEVICES: [&str; 3] = ["AudioStereoJackOutput", "AudioBuiltInSpeakerOutput", "AudioTvOutput"];
const USB_OUTPUT_DEVICE: &str = "AudioUsbDeviceOutput";

/// Names of every output device the revision exposes.
pub fn device_names(behavior: &BehaviorInfo) -> Vec<&'static str> {
    let mut names = OUTPUT_DEVICES.to_vec();
    if behavior.is_supported(Feature::AudioUsbDeviceOutput) {
        names.push(USB_OUTPUT_DEVICE);
    }
    names
}

/// Fills `out` with device names and returns how many were written.
pub fn list_device_names(behavior: &BehaviorInfo, out: &mut [DeviceName]) -> usize {
    let names = device_names(behavior);
    let count = names.len().min(out.len());
    for (slot, name) in out.iter_mut().zip(names) {
        *slot = DeviceName::new(name);
    }
    tracing::debug!(count, "listed device names");
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use audren_core::Revision;

    fn behavior(rev: u32) -> BehaviorInfo {
        let mut b = BehaviorInfo::new();
        b.set_user_revision(Revision::new(rev).to_tag());
        b
    }

    #[test]
    fn usb_output_needs_revision_4() {
        assert_eq!(device_names(&behavior(3)).len(), 3);
        assert_eq!(device_names(&behavior(4)).last(), Some(&"AudioUsbDeviceOutput"));
    }

    #[test]
    fn listing_is_bounded_by_output() {
        let mut out = [DeviceName::default(); 2];
        assert_eq!(list_device_names(&behavior(12), &mut out), 2);
        assert_eq!(out[0].as_str(), "AudioStereoJackOutput");
        assert_eq!(out[1].as_str(), "AudioBuiltInSpeakerOutput");
    }

    #[test]
    fn long_names_keep_a_terminator() {
        let name = DeviceName::new(&"x".repeat(400));
        assert_eq!(name.as_str().len(), DEVICE_NAME_SIZE - 1);
        assert_eq!(name.as_bytes()[DEVICE_NAME_SIZE - 1], 0);
    }
}
