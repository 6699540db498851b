use std::{env, fs, path::PathBuf};

fn main() {
    built::write_built_file()
        .expect("Failed to acquire build-time information");

    // Linker setup is only needed for the firmware image.
    if env::var_os("CARGO_FEATURE_STM32H7").is_some() {
        let out = PathBuf::from(env::var_os("OUT_DIR").unwrap());
        fs::copy("memory.x", out.join("memory.x")).unwrap();
        println!("cargo:rustc-link-search={}", out.display());
        println!("cargo:rustc-link-arg-bins=-Tlink.x");
    }
    println!("cargo:rerun-if-changed=memory.x");
    println!("cargo:rerun-if-changed=settings.json");
}
