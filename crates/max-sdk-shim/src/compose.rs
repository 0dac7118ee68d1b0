use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::{Platform, ShimConfig, Subsystem, SubsystemSet};
use crate::error::ShimError;
use crate::headers::{check_disjoint, HeaderSet};
use crate::predecl::{StandIn, StandInTable};
use crate::scope::{ScopeGuard, ScopeRegistry};

/// Prefix of the block markers the lint uses to attribute directives.
pub const MARKER_PREFIX: &str = "max-sdk-shim:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Directive {
    Blank,
    Comment { text: String },
    BlockBegin { subsystem: Subsystem },
    BlockEnd { subsystem: Subsystem },
    SystemInclude { header: String },
    Include { subsystem: Subsystem, header: String },
    Guard { line: String },
    EndGuard,
    StandIn { name: String, line: String },
    Define { name: String, value: Option<String> },
    Undef { name: String },
}

impl Directive {
    pub fn render(&self) -> String {
        match self {
            Directive::Blank => String::new(),
            Directive::Comment { text } => format!("/* {text} */"),
            Directive::BlockBegin { subsystem } => format!("/* {MARKER_PREFIX} begin {subsystem} */"),
            Directive::BlockEnd { subsystem } => format!("/* {MARKER_PREFIX} end {subsystem} */"),
            Directive::SystemInclude { header } | Directive::Include { header, .. } => {
                format!("#include <{header}>")
            }
            Directive::Guard { line } => line.clone(),
            Directive::EndGuard => "#endif".to_string(),
            Directive::StandIn { line, .. } => line.clone(),
            Directive::Define { name, value: None } => format!("#define {name}"),
            Directive::Define {
                name,
                value: Some(value),
            } => format!("#define {name} {value}"),
            Directive::Undef { name } => format!("#undef {name}"),
        }
    }
}

/// Accumulates directives and tracks which scope symbols are defined.
#[derive(Debug, Default)]
pub struct UnitWriter {
    directives: Vec<Directive>,
    active: Vec<String>,
    included: BTreeSet<String>,
    declared: BTreeSet<String>,
}

impl UnitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, directive: Directive) {
        self.directives.push(directive);
    }

    pub fn comment(&mut self, text: impl Into<String>) {
        self.push(Directive::Comment { text: text.into() });
    }

    pub fn define(&mut self, name: &str, value: Option<&str>) {
        if self.active.iter().any(|active| active == name) {
            return;
        }
        self.active.push(name.to_string());
        self.push(Directive::Define {
            name: name.to_string(),
            value: value.map(str::to_string),
        });
    }

    /// Retracts `name` if it is currently defined.
    pub fn undef(&mut self, name: &str) {
        if let Some(index) = self.active.iter().position(|active| active == name) {
            self.active.remove(index);
            self.push(Directive::Undef {
                name: name.to_string(),
            });
        }
    }

    pub fn retract_all(&mut self) {
        while let Some(name) = self.active.pop() {
            self.push(Directive::Undef { name });
        }
    }

    pub fn include(&mut self, subsystem: Subsystem, header: &str) -> Result<(), ShimError> {
        if !self.included.insert(header.to_string()) {
            let first = self
                .directives
                .iter()
                .find_map(|directive| match directive {
                    Directive::Include {
                        subsystem,
                        header: h,
                    } if h == header => Some(*subsystem),
                    _ => None,
                })
                .unwrap_or(subsystem);
            return Err(ShimError::DuplicateHeader {
                name: header.to_string(),
                first,
                second: subsystem,
            });
        }
        self.push(Directive::Include {
            subsystem,
            header: header.to_string(),
        });
        Ok(())
    }

    pub fn declare(&mut self, stand_in: &StandIn) -> Result<(), ShimError> {
        if !self.declared.insert(stand_in.name.clone()) {
            return Err(ShimError::DuplicateStandIn(stand_in.name.clone()));
        }
        let guard = stand_in.predicate.guard();
        if let Some(line) = &guard {
            self.push(Directive::Guard { line: line.clone() });
        }
        for line in stand_in.declaration() {
            self.push(Directive::StandIn {
                name: stand_in.name.clone(),
                line,
            });
        }
        if guard.is_some() {
            self.push(Directive::EndGuard);
        }
        Ok(())
    }

    pub fn active_symbols(&self) -> &[String] {
        &self.active
    }

    pub(crate) fn into_unit(mut self, platform: Platform, subsystems: SubsystemSet) -> CompositionUnit {
        if !self.active.is_empty() {
            tracing::warn!(symbols = ?self.active, "scope symbols still active at end of unit");
            self.retract_all();
        }
        CompositionUnit {
            platform,
            subsystems,
            directives: self.directives,
        }
    }
}

/// The normalised header handed to bindgen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompositionUnit {
    platform: Platform,
    subsystems: SubsystemSet,
    directives: Vec<Directive>,
}

impl CompositionUnit {
    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn subsystems(&self) -> SubsystemSet {
        self.subsystems
    }

    pub fn directives(&self) -> &[Directive] {
        &self.directives
    }

    /// Subsystem blocks in the order they were composed.
    pub fn blocks(&self) -> Vec<Subsystem> {
        self.directives
            .iter()
            .filter_map(|directive| match directive {
                Directive::BlockBegin { subsystem } => Some(*subsystem),
                _ => None,
            })
            .collect()
    }

    /// Names of the emitted stand-ins, in emission order.
    pub fn stand_ins(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for directive in &self.directives {
            if let Directive::StandIn { name, .. } = directive {
                if names.last() != Some(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    pub fn includes(&self) -> Vec<&str> {
        self.directives
            .iter()
            .filter_map(|directive| match directive {
                Directive::Include { header, .. } => Some(header.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for directive in &self.directives {
            out.push_str(&directive.render());
            out.push('\n');
        }
        out
    }

    /// SHA-256 of the rendered text.
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.render().as_bytes()))
    }

    pub fn write_to(&self, path: &Path) -> Result<(), ShimError> {
        fs::write(path, self.render()).map_err(|source| ShimError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Builds composition units from the stand-in table, the scope registry and
/// the per-subsystem header sets.
#[derive(Debug, Clone)]
pub struct Composer {
    stand_ins: StandInTable,
    scopes: ScopeRegistry,
    header_sets: Vec<HeaderSet>,
}

impl Composer {
    pub fn new(
        stand_ins: StandInTable,
        scopes: ScopeRegistry,
        header_sets: Vec<HeaderSet>,
    ) -> Result<Self, ShimError> {
        stand_ins.validate()?;
        check_disjoint(&header_sets)?;
        Ok(Self {
            stand_ins,
            scopes,
            header_sets,
        })
    }

    pub fn max_sdk() -> Self {
        Self {
            stand_ins: StandInTable::max_sdk(),
            scopes: ScopeRegistry::max_sdk(),
            header_sets: HeaderSet::defaults(),
        }
    }

    /// Replaces the header sets, typically with ones discovered from an SDK checkout.
    pub fn with_header_sets(self, header_sets: Vec<HeaderSet>) -> Result<Self, ShimError> {
        Self::new(self.stand_ins, self.scopes, header_sets)
    }

    pub fn stand_ins(&self) -> &StandInTable {
        &self.stand_ins
    }

    pub fn scopes(&self) -> &ScopeRegistry {
        &self.scopes
    }

    pub fn header_set(&self, subsystem: Subsystem) -> Option<&HeaderSet> {
        self.header_sets
            .iter()
            .find(|set| set.subsystem == subsystem)
    }

    /// Composes the unit for `config`.
    ///
    /// The selection is validated before anything is emitted; a request that
    /// lacks the host subsystem never produces a partial unit.
    pub fn compose(&self, config: &ShimConfig) -> Result<CompositionUnit, ShimError> {
        config.subsystems.validate()?;
        let order: Vec<Subsystem> = config.subsystems.iter().collect();
        let mut sets = Vec::with_capacity(order.len());
        for subsystem in &order {
            let set = self
                .header_set(*subsystem)
                .ok_or(ShimError::MissingHeaderSet(*subsystem))?;
            sets.push(set);
        }

        let platform = config.platform;
        let plan = self.scopes.plan(platform, &order);
        let mut writer = UnitWriter::new();
        writer.comment(format!(
            "generated by max-sdk-shim for platform={platform} subsystems={}; do not edit",
            config.subsystems
        ));

        if self
            .stand_ins
            .select(platform, config.subsystems)
            .iter()
            .any(|stand_in| stand_in.needs_stdint())
        {
            writer.push(Directive::SystemInclude {
                header: "stdint.h".to_string(),
            });
        }

        for (set, scope) in sets.into_iter().zip(plan.iter()) {
            let subsystem = set.subsystem;
            tracing::debug!(
                %subsystem,
                headers = set.headers.len(),
                open = scope.open.len(),
                close = scope.close.len(),
                "composing block"
            );
            writer.push(Directive::Blank);
            writer.comment(format!("************ {} ************", subsystem.sdk_name()));
            writer.push(Directive::BlockBegin { subsystem });

            for stand_in in self.stand_ins.for_block(platform, subsystem) {
                writer.declare(stand_in)?;
            }

            let mut guard = ScopeGuard::open(&mut writer, scope);
            for header in &set.headers {
                guard.writer().include(subsystem, header)?;
            }
            guard.finish();

            writer.push(Directive::BlockEnd { subsystem });
        }

        Ok(writer.into_unit(platform, config.subsystems))
    }
}

impl Default for Composer {
    fn default() -> Self {
        Self::max_sdk()
    }
}
