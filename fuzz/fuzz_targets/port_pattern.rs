#![no_main]

use arbitrary::Arbitrary;
use firewallx_engine::rule::PortPattern;
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    pattern: String,
    port: u16,
}

fuzz_target!(|input: FuzzInput| {
    let Ok(pattern) = PortPattern::parse(&input.pattern) else {
        return;
    };

    // 정규 형식은 다시 파싱해도 같은 패턴이어야 함
    let canonical = pattern.to_string();
    let reparsed = PortPattern::parse(&canonical).expect("canonical form must parse");
    assert_eq!(pattern, reparsed, "round trip changed '{canonical}'");
    assert_eq!(pattern.matches(input.port), reparsed.matches(input.port));
});
