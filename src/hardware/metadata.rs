mod build_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

/// Log the firmware build information.
pub fn log_build_info() {
    log::info!(
        "{} {} (git {}{}), {} build, rustc {}",
        build_info::PKG_NAME,
        build_info::PKG_VERSION,
        build_info::GIT_VERSION.unwrap_or("unspecified"),
        if build_info::GIT_DIRTY.unwrap_or(false) {
            ", dirty"
        } else {
            ""
        },
        build_info::PROFILE,
        build_info::RUSTC_VERSION,
    );
    log::info!("Features: {}", build_info::FEATURES_STR);
}
