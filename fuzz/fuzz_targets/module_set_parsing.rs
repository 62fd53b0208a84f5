#![no_main]
use libfuzzer_sys::fuzz_target;
use modwire::module::{ModuleSet, Resolver};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(set) = ModuleSet::from_toml_str(text) else {
        return;
    };

    // Invalid descriptors are rejected, valid ones resolve or fail cleanly
    let resolver = Resolver::new();
    let ids: Vec<_> = set
        .modules
        .iter()
        .filter_map(|descriptor| resolver.install(descriptor).ok())
        .collect();
    for id in ids {
        let _ = resolver.resolve(id);
    }
});
