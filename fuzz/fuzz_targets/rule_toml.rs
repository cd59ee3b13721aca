#![no_main]

use chrono::DateTime;
use firewallx_core::types::{Action, Packet, Protocol, TenantContext};
use firewallx_engine::{PolicyTable, RuleLoader};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // TOML 파서는 &str을 받으므로 UTF-8 변환 필요
    let Ok(toml_str) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(rules) = RuleLoader::parse_toml(toml_str, "fuzz-input.toml") else {
        return;
    };

    // 잘못된 규칙이 섞여 있어도 정책 갱신과 평가는 패닉 없이 끝나야 함
    let tenant = TenantContext::new("fuzz");
    let table = PolicyTable::new(Action::Allow);
    let report = table.update_rules(&tenant, rules);
    assert!(report.active_rules <= report.total_rules);

    let packet = Packet {
        timestamp: DateTime::from_timestamp(0, 0).expect("epoch is representable"),
        source_ip: "192.0.2.1".parse().expect("valid address"),
        destination_ip: "10.0.0.5".parse().expect("valid address"),
        port: 22,
        protocol: Protocol::Tcp,
        packet_size: 60,
    };
    let _ = table.resolve(&tenant, packet);
});
