#![no_main]

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use arbitrary::Arbitrary;
use firewallx_engine::rule::AddressPattern;
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    pattern: String,
    v4: [u8; 4],
    v6: [u8; 16],
}

fuzz_target!(|input: FuzzInput| {
    let Ok(pattern) = AddressPattern::parse(&input.pattern) else {
        return;
    };

    // 정규 형식은 다시 파싱해도 같은 패턴이어야 함
    let canonical = pattern.to_string();
    let reparsed = AddressPattern::parse(&canonical).expect("canonical form must parse");
    assert_eq!(pattern, reparsed, "round trip changed '{canonical}'");

    let v4 = IpAddr::V4(Ipv4Addr::from(input.v4));
    let v6 = IpAddr::V6(Ipv6Addr::from(input.v6));
    assert_eq!(pattern.matches(v4), reparsed.matches(v4));
    assert_eq!(pattern.matches(v6), reparsed.matches(v6));
});
