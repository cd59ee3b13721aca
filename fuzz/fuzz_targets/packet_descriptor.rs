#![no_main]

use firewallx_core::types::{Packet, PacketDescriptor};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(descriptor) = serde_json::from_slice::<PacketDescriptor>(data) else {
        return;
    };

    // 검증은 Ok 또는 IngestionError만 반환해야 함
    if let Ok(packet) = Packet::try_from(&descriptor) {
        assert_eq!(descriptor.timestamp, Some(packet.timestamp));
    }
});
