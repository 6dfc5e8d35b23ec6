fn main() {
    // The ESP-IDF build environment only exists for on-device builds; host
    // builds (tests, simulation) must not require the IDF toolchain.
    if std::env::var_os("CARGO_FEATURE_ESPIDF").is_some() {
        embuild::espidf::sysenv::output();
    }
}
