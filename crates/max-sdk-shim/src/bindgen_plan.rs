//! Everything bindgen needs besides the composition unit itself: clang
//! arguments, allowlists and the link directives for the SDK libraries.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::{Platform, ShimConfig, Subsystem, SubsystemSet};
use crate::discover::SdkLayout;
use crate::error::ShimError;

/// File name the composition unit is written to before bindgen reads it.
pub const WRAPPER_HEADER: &str = "wrapper.h";

fn function_patterns(subsystem: Subsystem) -> &'static [&'static str] {
    match subsystem {
        Subsystem::Host => &["sys_.*", "class_.*", "z_jbox.*", "canvas_.*"],
        Subsystem::Audio => &["z_dsp.*", "dsp_.*", "buffer_.*", "z_isconnected"],
        Subsystem::Graphics => &["jit_.*"],
    }
}

/// Enums emitted as constified modules.
fn enum_patterns(subsystem: Subsystem) -> &'static [&'static str] {
    match subsystem {
        Subsystem::Host => &[
            "e_max_attrflags",
            "e_max_atomtypes",
            "e_max_datastore_flags",
            "e_max_errorcodes",
            "e_max_class_flags",
            "e_max_dateflags",
            "e_max_expr_types",
            "e_max_fileinfo_flags",
            "e_max_openfile_permissions",
            "e_max_searchpath_flags",
            "e_max_systhread_.*",
            "e_max_typelists",
            "e_max_wind_advise_result",
            "e_max_atom_gettext_flags",
            "e_max_path_.*",
            "t_sysfile_.*",
            "PARAM_.*",
            "PARAMETER_ENABLE_SAVESTATE",
            "e_view_tag",
            "_modifiers",
            "_jdesktopui_flags",
            "_jgraphics_.*",
            "_jmouse_cursortype",
        ],
        Subsystem::Audio => &[],
        Subsystem::Graphics => &["e_jit_state"],
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkDirectives {
    pub search_paths: Vec<PathBuf>,
    pub libraries: Vec<String>,
    pub frameworks: Vec<String>,
}

impl LinkDirectives {
    /// `support_dir` should be absolute; Cargo resolves search paths from the
    /// invoking directory.
    pub fn new(platform: Platform, subsystems: SubsystemSet, support_dir: &Path) -> Self {
        match platform {
            Platform::Apple => Self {
                frameworks: vec!["CoreAudio".into(), "CoreServices".into(), "Carbon".into()],
                ..Self::default()
            },
            Platform::Windows => {
                let mut link = Self::default();
                for subsystem in subsystems.iter() {
                    link.search_paths
                        .push(support_dir.join(subsystem.include_dir()).join("x64"));
                    link.libraries.push(
                        match subsystem {
                            Subsystem::Host => "MaxAPI",
                            Subsystem::Audio => "MaxAudio",
                            Subsystem::Graphics => "jitlib",
                        }
                        .to_string(),
                    );
                }
                link
            }
            Platform::Other => Self::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.search_paths.is_empty() && self.libraries.is_empty() && self.frameworks.is_empty()
    }

    /// Lines for a build script to print.
    pub fn cargo_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for framework in &self.frameworks {
            lines.push(format!("cargo:rustc-link-lib=framework={framework}"));
        }
        for path in &self.search_paths {
            lines.push(format!("cargo:rustc-link-search={}", path.display()));
        }
        for library in &self.libraries {
            lines.push(format!("cargo:rustc-link-lib={library}"));
        }
        lines
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindgenPlan {
    pub header: String,
    pub clang_args: Vec<String>,
    pub allowlist_functions: Vec<String>,
    pub allowlist_types: Vec<String>,
    pub link: LinkDirectives,
}

impl BindgenPlan {
    pub fn new(config: &ShimConfig) -> Self {
        let support_dir = config.sdk_root_or_default();
        let mut clang_args: Vec<String> = config
            .subsystems
            .iter()
            .map(|subsystem| format!("-I{}/", support_dir.join(subsystem.include_dir()).display()))
            .collect();
        clang_args.extend(
            config
                .platform
                .identity_defines()
                .iter()
                .map(|symbol| format!("-D{symbol}")),
        );
        if config.platform == Platform::Apple {
            let sysroot = config.macos_sysroot_or_default();
            clang_args.push("-isysroot".into());
            clang_args.push(sysroot.display().to_string());
            clang_args.push(format!(
                "-F{}/",
                sysroot.join("System/Library/Frameworks").display()
            ));
        }

        let allowlist_functions = config
            .subsystems
            .iter()
            .flat_map(|subsystem| function_patterns(subsystem).iter())
            .map(|pattern| pattern.to_string())
            .collect();
        let allowlist_types = config
            .subsystems
            .iter()
            .flat_map(|subsystem| enum_patterns(subsystem).iter())
            .map(|pattern| pattern.to_string())
            .collect();

        Self {
            header: WRAPPER_HEADER.to_string(),
            clang_args,
            allowlist_functions,
            allowlist_types,
            link: LinkDirectives::new(config.platform, config.subsystems, &support_dir),
        }
    }

    /// Prepends the functions exported by the Max host, as listed in the
    /// SDK's linker flags.
    pub fn with_linker_flags(mut self, flags: &str) -> Self {
        let mut functions = parse_linker_flags(flags);
        functions.append(&mut self.allowlist_functions);
        self.allowlist_functions = functions;
        self
    }

    pub fn load_linker_flags(self, layout: &SdkLayout) -> Result<Self, ShimError> {
        let path = layout.linker_flags_file();
        let flags = fs::read_to_string(&path).map_err(|source| ShimError::Io { path, source })?;
        Ok(self.with_linker_flags(&flags))
    }
}

/// Extracts the symbol names from `-Wl,-U,_symbol` entries.
pub fn parse_linker_flags(flags: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    flags
        .split("-Wl,-U,")
        .filter_map(|entry| {
            let entry = entry.trim().trim_start_matches('\'');
            let symbol = entry.strip_prefix('_')?;
            let symbol = symbol.strip_suffix('\'').unwrap_or(symbol).trim();
            (!symbol.is_empty()).then(|| symbol.to_string())
        })
        .filter(|symbol| seen.insert(symbol.clone()))
        .collect()
}
