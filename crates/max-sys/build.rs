use std::env;
use std::path::PathBuf;

use max_sdk_shim::{BindgenPlan, Composer, Platform, ShimConfig, DEFAULT_SUPPORT_DIR, WRAPPER_HEADER};

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=MAX_SDK_DIR");
    println!("cargo:rerun-if-env-changed=MAX_SHIM_MACOS_SYSROOT");

    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());

    let mut config = ShimConfig::from_build_env().expect("Cargo did not provide the target os");
    let support_dir = config
        .sdk_root
        .clone()
        .unwrap_or_else(|| manifest_dir.join(DEFAULT_SUPPORT_DIR));
    config.sdk_root = Some(support_dir);

    let unit = Composer::max_sdk()
        .compose(&config)
        .unwrap_or_else(|err| panic!("failed to compose {WRAPPER_HEADER}: {err}"));
    let wrapper = out_dir.join(WRAPPER_HEADER);
    unit.write_to(&wrapper)
        .unwrap_or_else(|err| panic!("failed to write {}: {err}", wrapper.display()));
    println!("cargo:rustc-env=MAX_SYS_WRAPPER_DIGEST={}", unit.digest());

    let plan = BindgenPlan::new(&config);
    if config.platform == Platform::Other {
        println!(
            "cargo:warning=max-sys: no Max libraries are linked on this target; only macOS and Windows hosts load externals"
        );
    }
    for line in plan.link.cargo_lines() {
        println!("{line}");
    }

    #[cfg(feature = "build-bindings")]
    generate_bindings(&config, plan, &wrapper, &out_dir);
}

#[cfg(feature = "build-bindings")]
fn generate_bindings(
    config: &ShimConfig,
    plan: BindgenPlan,
    wrapper: &std::path::Path,
    out_dir: &std::path::Path,
) {
    use max_sdk_shim::SdkLayout;

    let root = config.sdk_root_or_default();
    let layout = SdkLayout::new(&root).unwrap_or_else(|err| {
        panic!("{err}; set `MAX_SDK_DIR` or run `git submodule update --init --recursive`")
    });
    let plan = plan
        .load_linker_flags(&layout)
        .expect("failed to read c74_linker_flags.txt");

    let mut builder = bindgen::Builder::default()
        .header(wrapper.to_string_lossy())
        .ctypes_prefix("cty")
        .use_core()
        .derive_default(true)
        .layout_tests(false)
        .clang_args(&plan.clang_args)
        .formatter(bindgen::Formatter::Rustfmt);

    builder = plan
        .allowlist_functions
        .iter()
        .fold(builder, |b, function| b.allowlist_function(function));
    builder = plan
        .allowlist_types
        .iter()
        .fold(builder, |b, ty| b.allowlist_type(ty).constified_enum_module(ty));

    // Avoid pulling libc definitions that collide with cty
    builder = builder
        .blocklist_type("max_align_t")
        .blocklist_type("__uint128_t")
        .blocklist_type("__int128_t");

    let bindings = builder.generate().expect("Unable to generate Max bindings");
    bindings
        .write_to_file(out_dir.join("bindings.rs"))
        .expect("Couldn't write bindings!");
}
