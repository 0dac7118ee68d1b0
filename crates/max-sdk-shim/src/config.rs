use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Target platform family the composition unit is generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[serde(alias = "macos", alias = "mac")]
    Apple,
    #[serde(alias = "win")]
    Windows,
    #[serde(alias = "linux")]
    Other,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Apple, Platform::Windows, Platform::Other];

    /// Maps a Cargo `target_os` value onto a platform family.
    pub fn from_target_os(os: &str) -> Self {
        match os {
            "macos" | "ios" => Platform::Apple,
            "windows" => Platform::Windows,
            _ => Platform::Other,
        }
    }

    /// Platform of the machine running this code.
    pub fn current() -> Self {
        Self::from_target_os(std::env::consts::OS)
    }

    pub fn name(self) -> &'static str {
        match self {
            Platform::Apple => "apple",
            Platform::Windows => "windows",
            Platform::Other => "other",
        }
    }

    /// Preprocessor expression that holds when the unit is parsed for this platform.
    pub fn preprocessor_test(self) -> &'static str {
        match self {
            Platform::Apple => "defined(__APPLE__)",
            Platform::Windows => "defined(_WIN32)",
            Platform::Other => "!defined(__APPLE__) && !defined(_WIN32)",
        }
    }

    /// Symbols the SDK expects for the whole compilation. These are passed to
    /// clang on the command line and never appear in the unit text.
    pub fn identity_defines(self) -> &'static [&'static str] {
        match self {
            Platform::Apple => &["MAC_VERSION"],
            Platform::Windows => &["WIN_VERSION", "WIN32_LEAN_AND_MEAN"],
            Platform::Other => &[],
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Platform {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "apple" | "macos" | "mac" => Ok(Platform::Apple),
            "windows" | "win" => Ok(Platform::Windows),
            "other" | "linux" => Ok(Platform::Other),
            other => Err(ConfigError::UnknownPlatform(other.to_string())),
        }
    }
}

/// One of the three SDK header trees. The derived ordering is the inclusion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subsystem {
    #[serde(alias = "max")]
    Host,
    #[serde(alias = "msp")]
    Audio,
    #[serde(alias = "jitter")]
    Graphics,
}

impl Subsystem {
    pub const ALL: [Subsystem; 3] = [Subsystem::Host, Subsystem::Audio, Subsystem::Graphics];

    pub fn name(self) -> &'static str {
        match self {
            Subsystem::Host => "host",
            Subsystem::Audio => "audio",
            Subsystem::Graphics => "graphics",
        }
    }

    /// Name used by the SDK itself.
    pub fn sdk_name(self) -> &'static str {
        match self {
            Subsystem::Host => "max",
            Subsystem::Audio => "msp",
            Subsystem::Graphics => "jitter",
        }
    }

    /// Directory under `c74support/` holding this subsystem's headers.
    pub fn include_dir(self) -> &'static str {
        match self {
            Subsystem::Host => "max-includes",
            Subsystem::Audio => "msp-includes",
            Subsystem::Graphics => "jit-includes",
        }
    }

    fn bit(self) -> u8 {
        1 << self as u8
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Subsystem {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "host" | "max" => Ok(Subsystem::Host),
            "audio" | "msp" => Ok(Subsystem::Audio),
            "graphics" | "jitter" | "jit" => Ok(Subsystem::Graphics),
            other => Err(ConfigError::UnknownSubsystem(other.to_string())),
        }
    }
}

/// Set of requested subsystems. Iteration always follows inclusion order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<Subsystem>", into = "Vec<Subsystem>")]
pub struct SubsystemSet(u8);

impl SubsystemSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn host_only() -> Self {
        Self::from_iter([Subsystem::Host])
    }

    pub fn host_audio() -> Self {
        Self::from_iter([Subsystem::Host, Subsystem::Audio])
    }

    pub fn full() -> Self {
        Self::from_iter(Subsystem::ALL)
    }

    pub fn insert(&mut self, subsystem: Subsystem) {
        self.0 |= subsystem.bit();
    }

    pub fn with(mut self, subsystem: Subsystem) -> Self {
        self.insert(subsystem);
        self
    }

    pub fn contains(&self, subsystem: Subsystem) -> bool {
        self.0 & subsystem.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = Subsystem> + '_ {
        Subsystem::ALL.into_iter().filter(|s| self.contains(*s))
    }

    /// Host is a hard prerequisite of both other subsystems.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.is_empty() {
            return Err(ConfigError::EmptySelection);
        }
        if !self.contains(Subsystem::Host) {
            return Err(ConfigError::MissingHost { requested: *self });
        }
        Ok(())
    }

    /// Parses a comma separated list such as `host,audio`.
    pub fn parse_list(value: &str) -> Result<Self, ConfigError> {
        value
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(Subsystem::from_str)
            .collect()
    }
}

impl FromIterator<Subsystem> for SubsystemSet {
    fn from_iter<I: IntoIterator<Item = Subsystem>>(iter: I) -> Self {
        let mut set = Self::empty();
        for subsystem in iter {
            set.insert(subsystem);
        }
        set
    }
}

impl From<Vec<Subsystem>> for SubsystemSet {
    fn from(list: Vec<Subsystem>) -> Self {
        list.into_iter().collect()
    }
}

impl From<SubsystemSet> for Vec<Subsystem> {
    fn from(set: SubsystemSet) -> Self {
        set.iter().collect()
    }
}

impl fmt::Display for SubsystemSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(Subsystem::name).collect();
        f.write_str(&names.join(","))
    }
}

fn default_subsystems() -> SubsystemSet {
    SubsystemSet::full()
}

/// Everything the composition depends on. No ambient detection happens
/// past this point: the composer is a pure function of this value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShimConfig {
    pub platform: Platform,
    #[serde(default = "default_subsystems")]
    pub subsystems: SubsystemSet,
    /// Path to the SDK `c74support` directory.
    #[serde(default)]
    pub sdk_root: Option<PathBuf>,
    /// macOS SDK used as `-isysroot` when generating for Apple.
    #[serde(default)]
    pub macos_sysroot: Option<PathBuf>,
}

pub const DEFAULT_SUPPORT_DIR: &str = "thirdparty/max-sdk/source/c74support";
pub const DEFAULT_MACOS_SYSROOT: &str = "/Library/Developer/CommandLineTools/SDKs/MacOSX.sdk";

impl ShimConfig {
    pub fn new(platform: Platform, subsystems: SubsystemSet) -> Self {
        Self {
            platform,
            subsystems,
            sdk_root: None,
            macos_sysroot: None,
        }
    }

    pub fn with_sdk_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.sdk_root = Some(root.into());
        self
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Builds the config a `build.rs` sees from Cargo's environment.
    pub fn from_build_env() -> Result<Self, ConfigError> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Same as [`ShimConfig::from_build_env`] with an injectable lookup.
    ///
    /// Host is always requested; `CARGO_FEATURE_MSP` adds audio and
    /// `CARGO_FEATURE_JITTER` adds graphics.
    pub fn from_env_with<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let os = lookup("CARGO_CFG_TARGET_OS").ok_or(ConfigError::MissingEnv("CARGO_CFG_TARGET_OS"))?;
        let mut subsystems = SubsystemSet::host_only();
        if lookup("CARGO_FEATURE_MSP").is_some() {
            subsystems.insert(Subsystem::Audio);
        }
        if lookup("CARGO_FEATURE_JITTER").is_some() {
            subsystems.insert(Subsystem::Graphics);
        }
        Ok(Self {
            platform: Platform::from_target_os(&os),
            subsystems,
            sdk_root: lookup("MAX_SDK_DIR").map(PathBuf::from),
            macos_sysroot: lookup("MAX_SHIM_MACOS_SYSROOT").map(PathBuf::from),
        })
    }

    pub fn sdk_root_or_default(&self) -> PathBuf {
        self.sdk_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SUPPORT_DIR))
    }

    pub fn macos_sysroot_or_default(&self) -> PathBuf {
        self.macos_sysroot
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MACOS_SYSROOT))
    }
}
