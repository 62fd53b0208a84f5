#![no_main]
use libfuzzer_sys::fuzz_target;
use modwire::module::{Version, VersionRange};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Never panic, only structured errors
    if let Ok(version) = Version::parse(text) {
        // Display output must parse back to the same version
        let printed = version.to_string();
        assert_eq!(Version::parse(&printed).ok(), Some(version.clone()));
        assert!(VersionRange::at_least(version.clone()).includes(&version));
        assert!(VersionRange::exactly(version.clone()).includes(&version));
    }

    if let Ok(range) = VersionRange::parse(text) {
        let printed = range.to_string();
        assert_eq!(VersionRange::parse(&printed).ok(), Some(range.clone()));
        if let Some(ceiling) = range.ceiling() {
            assert!(range.floor() <= ceiling);
        }
    }
});
