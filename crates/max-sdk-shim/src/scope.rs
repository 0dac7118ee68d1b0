//! Preprocessor switches that must only be visible while particular
//! subsystems are parsed.

use std::collections::BTreeSet;

use crate::compose::UnitWriter;
use crate::config::{Platform, Subsystem, SubsystemSet};
use crate::error::ShimError;
use crate::predecl::PlatformPredicate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeSymbol {
    pub name: String,
    pub value: Option<String>,
    /// Subsystems whose headers must be parsed with the symbol defined.
    pub needed_by: SubsystemSet,
    pub predicate: PlatformPredicate,
    /// Which vendor-header branch the symbol unlocks or suppresses.
    pub effect: String,
}

impl ScopeSymbol {
    pub fn new(
        name: impl Into<String>,
        needed_by: SubsystemSet,
        predicate: PlatformPredicate,
        effect: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: None,
            needed_by,
            predicate,
            effect: effect.into(),
        }
    }

    pub fn applies(&self, platform: Platform, subsystem: Subsystem) -> bool {
        self.predicate.matches(platform) && self.needed_by.contains(subsystem)
    }
}

/// Symbols to define before, and retract after, one subsystem block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockScope {
    pub subsystem: Subsystem,
    pub open: Vec<ScopeSymbol>,
    pub close: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeRegistry {
    symbols: Vec<ScopeSymbol>,
}

impl ScopeRegistry {
    pub fn new(symbols: Vec<ScopeSymbol>) -> Result<Self, ShimError> {
        let mut seen = BTreeSet::new();
        for symbol in &symbols {
            if !seen.insert(symbol.name.as_str()) {
                return Err(ShimError::DuplicateScopeSymbol(symbol.name.clone()));
            }
        }
        Ok(Self { symbols })
    }

    pub fn max_sdk() -> Self {
        Self {
            symbols: vec![
                ScopeSymbol::new(
                    "__FILES__",
                    SubsystemSet::host_only(),
                    PlatformPredicate::Only(Platform::Apple),
                    "suppresses CoreServices Files.h so the FSRef stand-in is the only declaration",
                ),
                ScopeSymbol::new(
                    "C74_NO_DEPRECATION",
                    SubsystemSet::host_audio(),
                    PlatformPredicate::Any,
                    "strips deprecation attributes from Max and MSP prototypes",
                ),
                ScopeSymbol::new(
                    "GL_GLEXT_LEGACY",
                    SubsystemSet::empty().with(Subsystem::Graphics),
                    PlatformPredicate::Any,
                    "keeps the system gl.h from including glext.h, which collides with jit.glext.h",
                ),
            ],
        }
    }

    pub fn symbols(&self) -> &[ScopeSymbol] {
        &self.symbols
    }

    pub fn get(&self, name: &str) -> Option<&ScopeSymbol> {
        self.symbols.iter().find(|symbol| symbol.name == name)
    }

    /// Works out, for each block of `order`, which symbols open before it and
    /// which retract after it.
    ///
    /// A symbol needed by consecutive blocks stays defined across them. It is
    /// retracted after the last block of each run, so every opening has
    /// exactly one matching retraction and nothing is left defined at the end.
    pub fn plan(&self, platform: Platform, order: &[Subsystem]) -> Vec<BlockScope> {
        let mut active: Vec<&ScopeSymbol> = Vec::new();
        let mut blocks = Vec::with_capacity(order.len());

        for (index, &subsystem) in order.iter().enumerate() {
            let mut open = Vec::new();
            for symbol in &self.symbols {
                if symbol.applies(platform, subsystem)
                    && !active.iter().any(|a| a.name == symbol.name)
                {
                    active.push(symbol);
                    open.push(symbol.clone());
                }
            }

            let next = order.get(index + 1).copied();
            let mut close = Vec::new();
            active.retain(|symbol| {
                let keep = next.is_some_and(|next| symbol.applies(platform, next));
                if !keep {
                    close.push(symbol.name.clone());
                }
                keep
            });
            close.reverse();

            blocks.push(BlockScope {
                subsystem,
                open,
                close,
            });
        }

        blocks
    }
}

impl Default for ScopeRegistry {
    fn default() -> Self {
        Self::max_sdk()
    }
}

/// Scoped acquisition of a block's symbols.
///
/// Opening defines the block's symbols. [`ScopeGuard::finish`] retracts the
/// planned ones; dropping the guard without finishing (an error path)
/// retracts every symbol still defined so a failed block cannot leak.
pub struct ScopeGuard<'a> {
    writer: &'a mut UnitWriter,
    close: Vec<String>,
    finished: bool,
}

impl<'a> ScopeGuard<'a> {
    pub fn open(writer: &'a mut UnitWriter, scope: &BlockScope) -> Self {
        for symbol in &scope.open {
            writer.define(&symbol.name, symbol.value.as_deref());
        }
        Self {
            writer,
            close: scope.close.clone(),
            finished: false,
        }
    }

    pub fn writer(&mut self) -> &mut UnitWriter {
        self.writer
    }

    pub fn finish(mut self) {
        self.finished = true;
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            for name in &self.close {
                self.writer.undef(name);
            }
        } else {
            tracing::debug!("scope aborted; retracting all active symbols");
            self.writer.retract_all();
        }
    }
}
