//! Derives the per-subsystem header sets from an SDK checkout.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::Subsystem;
use crate::error::ShimError;
use crate::headers::HeaderSet;

/// Layout of the SDK `c74support` directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdkLayout {
    root: PathBuf,
}

impl SdkLayout {
    /// Checks that all three include directories exist under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, ShimError> {
        let layout = Self { root: root.into() };
        for subsystem in Subsystem::ALL {
            let dir = layout.include_dir(subsystem);
            if !dir.is_dir() {
                return Err(ShimError::MissingSdkDir(dir));
            }
        }
        Ok(layout)
    }

    pub fn include_dir(&self, subsystem: Subsystem) -> PathBuf {
        self.root.join(subsystem.include_dir())
    }

    /// `c74_linker_flags.txt`, listing the symbols exported by the Max host.
    pub fn linker_flags_file(&self) -> PathBuf {
        self.include_dir(Subsystem::Host).join("c74_linker_flags.txt")
    }

    pub fn header_sets(&self) -> Result<Vec<HeaderSet>, ShimError> {
        Subsystem::ALL
            .into_iter()
            .map(|subsystem| {
                let headers = discover_headers(
                    &self.include_dir(subsystem),
                    umbrella_header(subsystem),
                    pinned_headers(subsystem),
                )?;
                HeaderSet::new(subsystem, headers)
            })
            .collect()
    }
}

/// Header that pulls in the rest of a subsystem.
pub fn umbrella_header(subsystem: Subsystem) -> &'static str {
    match subsystem {
        Subsystem::Host => "ext.h",
        Subsystem::Audio => "z_dsp.h",
        Subsystem::Graphics => "jit.common.h",
    }
}

/// Headers that must lead the set, in this order.
pub fn pinned_headers(subsystem: Subsystem) -> &'static [&'static str] {
    match subsystem {
        Subsystem::Host => &["ext.h", "jgraphics.h"],
        Subsystem::Audio | Subsystem::Graphics => &[],
    }
}

/// Lists the headers of `dir` that `umbrella` does not already include.
///
/// The result is sorted with `umbrella` first; any `pinned` headers present
/// are then moved to the front in the given order.
pub fn discover_headers(dir: &Path, umbrella: &str, pinned: &[&str]) -> Result<Vec<String>, ShimError> {
    if !dir.is_dir() {
        return Err(ShimError::MissingSdkDir(dir.to_path_buf()));
    }
    let umbrella_path = dir.join(umbrella);
    let contents = fs::read_to_string(&umbrella_path).map_err(|source| ShimError::Io {
        path: umbrella_path.clone(),
        source,
    })?;
    let covered: BTreeSet<String> = contents.lines().filter_map(include_target).collect();

    let mut headers: Vec<String> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_file()
                && entry.path().extension().and_then(|ext| ext.to_str()) == Some("h")
        })
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .filter(|name| name != umbrella && !covered.contains(name))
        .collect();
    headers.sort();
    headers.insert(0, umbrella.to_string());

    for name in pinned.iter().rev() {
        if let Some(index) = headers.iter().position(|header| header == name) {
            let header = headers.remove(index);
            headers.insert(0, header);
        }
    }

    tracing::debug!(dir = %dir.display(), count = headers.len(), "discovered headers");
    Ok(headers)
}

fn include_target(line: &str) -> Option<String> {
    let rest = line.trim_start().strip_prefix('#')?.trim_start();
    let rest = rest.strip_prefix("include")?.trim();
    let (open, close) = match rest.chars().next()? {
        '<' => ('<', '>'),
        '"' => ('"', '"'),
        _ => return None,
    };
    let inner = rest.strip_prefix(open)?;
    let end = inner.find(close)?;
    Some(inner[..end].to_string())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use super::*;

    fn touch(dir: &Path, name: &str, contents: &str) {
        fs::write(dir.join(name), contents).unwrap();
    }

    #[test]
    fn umbrella_first_and_covered_headers_dropped() {
        let dir = tempdir().unwrap();
        touch(
            dir.path(),
            "ext.h",
            "#include \"ext_prefix.h\"\n  #  include <ext_mess.h>\n// #include nothing\n",
        );
        for name in ["ext_prefix.h", "ext_mess.h", "zeta.h", "jgraphics.h", "alpha.h"] {
            touch(dir.path(), name, "");
        }
        touch(dir.path(), "notes.txt", "");
        fs::create_dir(dir.path().join("x64")).unwrap();

        let headers = discover_headers(dir.path(), "ext.h", &[]).unwrap();
        assert_eq!(headers, vec!["ext.h", "alpha.h", "jgraphics.h", "zeta.h"]);

        let headers = discover_headers(dir.path(), "ext.h", &["ext.h", "jgraphics.h"]).unwrap();
        assert_eq!(headers, vec!["ext.h", "jgraphics.h", "alpha.h", "zeta.h"]);
    }

    #[test]
    fn layout_requires_all_include_dirs() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("max-includes")).unwrap();
        fs::create_dir(dir.path().join("msp-includes")).unwrap();
        match SdkLayout::new(dir.path()) {
            Err(ShimError::MissingSdkDir(path)) => {
                assert_eq!(path, dir.path().join("jit-includes"))
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn layout_produces_three_sets() {
        let dir = tempdir().unwrap();
        for (subsystem, files) in [
            (Subsystem::Host, &["ext.h", "jgraphics.h", "ext_obex.h"][..]),
            (Subsystem::Audio, &["z_dsp.h", "ext_buffer.h"][..]),
            (Subsystem::Graphics, &["jit.common.h", "jit.gl.h"][..]),
        ] {
            let include = dir.path().join(subsystem.include_dir());
            fs::create_dir(&include).unwrap();
            for file in files {
                touch(&include, file, "");
            }
        }
        let layout = SdkLayout::new(dir.path()).unwrap();
        let sets = layout.header_sets().unwrap();
        assert_eq!(sets.len(), 3);
        assert_eq!(sets[0].headers, vec!["ext.h", "jgraphics.h", "ext_obex.h"]);
        assert_eq!(sets[1].headers, vec!["z_dsp.h", "ext_buffer.h"]);
        assert_eq!(sets[2].headers, vec!["jit.common.h", "jit.gl.h"]);
        assert!(layout
            .linker_flags_file()
            .ends_with("max-includes/c74_linker_flags.txt"));
    }

    #[test]
    fn missing_umbrella_is_an_io_error() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            discover_headers(dir.path(), "ext.h", &[]),
            Err(ShimError::Io { .. })
        ));
    }
}
