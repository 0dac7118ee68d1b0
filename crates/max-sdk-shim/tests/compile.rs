//! Runs a C compiler over composed units against small stand-ins for the SDK
//! headers. Each stub fails with `#error` when a scope symbol is missing or
//! leaked, and uses the stand-in types it expects the unit to provide.

use std::env;
use std::fs;
use std::path::Path;
use std::process::Command;

use max_sdk_shim::{
    Composer, HeaderSet, Platform, ScopeRegistry, ShimConfig, StandInTable, Subsystem,
    SubsystemSet,
};
use tempfile::tempdir;

const HOST_STUB: &str = "\
#ifndef C74_NO_DEPRECATION
#error C74_NO_DEPRECATION missing in host block
#endif
#ifdef GL_GLEXT_LEGACY
#error GL_GLEXT_LEGACY leaked into host block
#endif
#ifdef __APPLE__
#ifndef __FILES__
#error __FILES__ missing in host block
#endif
typedef FSRef *t_fsref_ref;
#else
#ifdef __FILES__
#error __FILES__ defined off Apple
#endif
#endif
extern MPCriticalRegionID max_region;
";

const AUDIO_STUB: &str = "\
#ifndef C74_NO_DEPRECATION
#error C74_NO_DEPRECATION missing in audio block
#endif
#ifdef __FILES__
#error __FILES__ leaked into audio block
#endif
#ifdef GL_GLEXT_LEGACY
#error GL_GLEXT_LEGACY leaked into audio block
#endif
extern MPCriticalRegionID dsp_region;
";

const GRAPHICS_STUB: &str = "\
#ifndef GL_GLEXT_LEGACY
#error GL_GLEXT_LEGACY missing in graphics block
#endif
#ifdef C74_NO_DEPRECATION
#error C74_NO_DEPRECATION leaked into graphics block
#endif
#ifdef __FILES__
#error __FILES__ leaked into graphics block
#endif
extern GLhalfNV jit_half;
#ifndef __APPLE__
extern CGDirectDisplayID jit_display;
#endif
";

const TRANSLATION_UNIT: &str = "\
#include \"wrapper.h\"
#if defined(__FILES__) || defined(C74_NO_DEPRECATION) || defined(GL_GLEXT_LEGACY)
#error scope symbol still defined after the unit
#endif
int main(void) { return 0; }
";

fn compiler() -> Option<String> {
    let cc = env::var("CC").unwrap_or_else(|_| "cc".to_string());
    let found = Command::new(&cc)
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false);
    found.then_some(cc)
}

fn stub_composer() -> Composer {
    let set = |subsystem, header: &str| HeaderSet::new(subsystem, vec![header.to_string()]).unwrap();
    Composer::new(
        StandInTable::max_sdk(),
        ScopeRegistry::max_sdk(),
        vec![
            set(Subsystem::Host, "ext.h"),
            set(Subsystem::Audio, "z_dsp.h"),
            set(Subsystem::Graphics, "jit.common.h"),
        ],
    )
    .unwrap()
}

fn platform_args(platform: Platform) -> Vec<String> {
    let mut args: Vec<String> = match platform {
        Platform::Apple => vec!["-D__APPLE__".into()],
        Platform::Windows => vec!["-U__APPLE__".into(), "-D_WIN32".into()],
        Platform::Other => vec!["-U__APPLE__".into(), "-U_WIN32".into()],
    };
    args.extend(
        platform
            .identity_defines()
            .iter()
            .map(|symbol| format!("-D{symbol}")),
    );
    args
}

fn syntax_check(cc: &str, dir: &Path, platform: Platform) -> Result<(), String> {
    let output = Command::new(cc)
        .arg("-fsyntax-only")
        .arg("-I")
        .arg(dir)
        .args(platform_args(platform))
        .arg(dir.join("main.c"))
        .output()
        .map_err(|err| err.to_string())?;
    if output.status.success() {
        Ok(())
    } else {
        Err(String::from_utf8_lossy(&output.stderr).into_owned())
    }
}

#[test]
fn composed_units_compile_on_every_platform() {
    let Some(cc) = compiler() else {
        eprintln!("no C compiler found; skipping");
        return;
    };
    let composer = stub_composer();

    for platform in Platform::ALL {
        for subsystems in [
            SubsystemSet::host_only(),
            SubsystemSet::host_audio(),
            SubsystemSet::host_only().with(Subsystem::Graphics),
            SubsystemSet::full(),
        ] {
            let dir = tempdir().unwrap();
            fs::write(dir.path().join("ext.h"), HOST_STUB).unwrap();
            fs::write(dir.path().join("z_dsp.h"), AUDIO_STUB).unwrap();
            fs::write(dir.path().join("jit.common.h"), GRAPHICS_STUB).unwrap();
            fs::write(dir.path().join("main.c"), TRANSLATION_UNIT).unwrap();

            let unit = composer
                .compose(&ShimConfig::new(platform, subsystems))
                .unwrap();
            unit.write_to(&dir.path().join("wrapper.h")).unwrap();

            if let Err(stderr) = syntax_check(&cc, dir.path(), platform) {
                panic!("{platform} {subsystems} failed to compile:\n{stderr}\n{}", unit.render());
            }
        }
    }
}

#[test]
fn leaked_symbol_fails_to_compile() {
    let Some(cc) = compiler() else {
        eprintln!("no C compiler found; skipping");
        return;
    };
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("ext.h"), HOST_STUB).unwrap();
    fs::write(dir.path().join("jit.common.h"), GRAPHICS_STUB).unwrap();
    fs::write(dir.path().join("main.c"), TRANSLATION_UNIT).unwrap();
    fs::write(
        dir.path().join("wrapper.h"),
        "\
#include <stdint.h>
struct OpaqueMPCriticalRegionID;
typedef struct OpaqueMPCriticalRegionID* MPCriticalRegionID;
#define C74_NO_DEPRECATION
#include <ext.h>
typedef uint32_t CGDirectDisplayID;
typedef uint16_t GLhalfNV;
#define GL_GLEXT_LEGACY
#include <jit.common.h>
#undef GL_GLEXT_LEGACY
#undef C74_NO_DEPRECATION
",
    )
    .unwrap();

    let stderr = syntax_check(&cc, dir.path(), Platform::Other).unwrap_err();
    assert!(stderr.contains("C74_NO_DEPRECATION leaked into graphics block"), "{stderr}");
}
