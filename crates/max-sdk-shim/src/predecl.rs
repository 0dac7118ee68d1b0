//! Stand-in declarations for types the SDK headers expect the platform SDK to
//! provide but which are not visible in bindgen's environment.

use std::collections::BTreeSet;

use crate::config::{Platform, Subsystem, SubsystemSet};
use crate::error::ShimError;

/// Which platforms a stand-in (or scope symbol) applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformPredicate {
    Any,
    Only(Platform),
    Except(Platform),
}

impl PlatformPredicate {
    pub fn matches(self, platform: Platform) -> bool {
        match self {
            PlatformPredicate::Any => true,
            PlatformPredicate::Only(only) => only == platform,
            PlatformPredicate::Except(except) => except != platform,
        }
    }

    /// Opening `#if` line, or `None` when the predicate needs no guard.
    pub fn guard(self) -> Option<String> {
        match self {
            PlatformPredicate::Any => None,
            PlatformPredicate::Only(platform) => Some(format!("#if {}", platform.preprocessor_test())),
            PlatformPredicate::Except(platform) => {
                let test = platform.preprocessor_test();
                if test.contains("&&") {
                    Some(format!("#if !({test})"))
                } else {
                    Some(format!("#if !{test}"))
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StandInKind {
    /// `struct tag;` followed by a typedef adding `pointer_level` indirections.
    Opaque { tag: String, pointer_level: u8 },
    /// Plain typedef onto an existing scalar type.
    Alias { target: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandIn {
    pub name: String,
    pub kind: StandInKind,
    pub predicate: PlatformPredicate,
    /// First subsystem whose headers reference the type.
    pub needed_by: Subsystem,
}

impl StandIn {
    pub fn opaque(
        name: impl Into<String>,
        tag: impl Into<String>,
        pointer_level: u8,
        predicate: PlatformPredicate,
        needed_by: Subsystem,
    ) -> Self {
        Self {
            name: name.into(),
            kind: StandInKind::Opaque {
                tag: tag.into(),
                pointer_level,
            },
            predicate,
            needed_by,
        }
    }

    pub fn alias(
        name: impl Into<String>,
        target: impl Into<String>,
        predicate: PlatformPredicate,
        needed_by: Subsystem,
    ) -> Self {
        Self {
            name: name.into(),
            kind: StandInKind::Alias {
                target: target.into(),
            },
            predicate,
            needed_by,
        }
    }

    /// Declaration lines, without the platform guard.
    pub fn declaration(&self) -> Vec<String> {
        match &self.kind {
            StandInKind::Opaque { tag, pointer_level } => {
                let stars = "*".repeat(*pointer_level as usize);
                vec![
                    format!("struct {tag};"),
                    format!("typedef struct {tag}{stars} {};", self.name),
                ]
            }
            StandInKind::Alias { target } => vec![format!("typedef {target} {};", self.name)],
        }
    }

    pub fn needs_stdint(&self) -> bool {
        match &self.kind {
            StandInKind::Alias { target } => {
                (target.starts_with("uint") || target.starts_with("int")) && target.ends_with("_t")
            }
            StandInKind::Opaque { .. } => false,
        }
    }
}

/// Platform to stand-in mapping. Entry order is emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandInTable {
    entries: Vec<StandIn>,
}

impl StandInTable {
    pub fn new(entries: Vec<StandIn>) -> Result<Self, ShimError> {
        let table = Self { entries };
        table.validate()?;
        Ok(table)
    }

    pub fn max_sdk() -> Self {
        Self {
            entries: vec![
                StandIn::opaque(
                    "FSRef",
                    "FSRef",
                    0,
                    PlatformPredicate::Only(Platform::Apple),
                    Subsystem::Host,
                ),
                StandIn::opaque(
                    "MPCriticalRegionID",
                    "OpaqueMPCriticalRegionID",
                    1,
                    PlatformPredicate::Any,
                    Subsystem::Host,
                ),
                StandIn::alias(
                    "CGDirectDisplayID",
                    "uint32_t",
                    PlatformPredicate::Except(Platform::Apple),
                    Subsystem::Graphics,
                ),
                StandIn::alias("GLhalfNV", "uint16_t", PlatformPredicate::Any, Subsystem::Graphics),
            ],
        }
    }

    /// Each stand-in name may be declared once per unit.
    pub fn validate(&self) -> Result<(), ShimError> {
        let mut seen = BTreeSet::new();
        for entry in &self.entries {
            if !seen.insert(entry.name.as_str()) {
                return Err(ShimError::DuplicateStandIn(entry.name.clone()));
            }
        }
        Ok(())
    }

    pub fn entries(&self) -> &[StandIn] {
        &self.entries
    }

    /// Every stand-in to emit for `platform` given the requested subsystems.
    pub fn select(&self, platform: Platform, subsystems: SubsystemSet) -> Vec<&StandIn> {
        self.entries
            .iter()
            .filter(|entry| entry.predicate.matches(platform) && subsystems.contains(entry.needed_by))
            .collect()
    }

    /// Stand-ins that must precede `subsystem`'s block.
    pub fn for_block(&self, platform: Platform, subsystem: Subsystem) -> Vec<&StandIn> {
        self.entries
            .iter()
            .filter(|entry| entry.predicate.matches(platform) && entry.needed_by == subsystem)
            .collect()
    }
}

impl Default for StandInTable {
    fn default() -> Self {
        Self::max_sdk()
    }
}
