use std::env;
use std::fs::File;
use std::path::Path;

fn main() {
    println!("cargo:rerun-if-changed=memory-app.x");

    // Host builds (library, tests) link normally; only the firmware binary needs the linker scripts
    if env::var_os("CARGO_FEATURE_FIRMWARE").is_none() {
        return;
    }

    // Create an empty memory.x file to satisfy the include in the main linker script
    let out_dir = env::var("OUT_DIR").unwrap();
    let dest_path = Path::new(&out_dir).join("memory.x");
    File::create(&dest_path).unwrap();

    // Add the output directory to the linker search path so `link.x` can find the empty `memory.x`
    println!("cargo:rustc-link-search={}", out_dir);

    // Add the crate root so `memory-app.x` is found
    println!("cargo:rustc-link-search={}", env::var("CARGO_MANIFEST_DIR").unwrap());

    // Set linker flags for all binaries
    println!("cargo:rustc-link-arg-bins=--nmagic");

    // Memory layout for the acquisition firmware
    println!("cargo:rustc-link-arg-bin=scha63x-rs=-Tmemory-app.x");

    // Main linker script, uses the memory layout from above
    println!("cargo:rustc-link-arg-bins=-Tlink.x");

    // defmt needs its own linker script whenever it is in the build
    if env::var_os("CARGO_FEATURE_DEFMT").is_some() {
        println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
    }
}
