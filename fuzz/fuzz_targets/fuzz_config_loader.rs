#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // TOML config and trace CSV loaders must reject garbage without panicking.
    if let Ok(text) = std::str::from_utf8(data)
        && let Ok(cfg) = bump_config::load_toml(text)
        && cfg.validate().is_ok()
    {
        // A valid config always yields a usable identity
        let settings = bump_core::Settings::from(&cfg);
        assert!(bump_core::Identity::from_name(&settings.identity_name).is_ok());
    }
    let _ = bump_config::read_trace(data);
});
