#![no_main]

use firewallx_core::types::{Action, TenantContext};
use firewallx_engine::{PolicyTable, RuleLoader};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // YAML 파서는 &str을 받으므로 UTF-8 변환 필요
    let Ok(yaml_str) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(rules) = RuleLoader::parse_yaml(yaml_str, "fuzz-input.yml") {
        let table = PolicyTable::new(Action::Block);
        let _ = table.update_rules(&TenantContext::new("fuzz"), rules);
    }
});
