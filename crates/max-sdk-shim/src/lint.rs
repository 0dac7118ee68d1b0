//! Static scan of a composed (or hand written) wrapper header.
//!
//! A scope symbol that is never retracted produces a unit that still parses
//! but expands later subsystems differently, so the compiler never reports
//! it. This module finds those cases from the text alone.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::Serialize;

use crate::compose::MARKER_PREFIX;
use crate::config::{Platform, Subsystem};
use crate::error::LintError;
use crate::scope::ScopeRegistry;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    #[error("line {line}: `{symbol}` is defined but never retracted")]
    Unretracted { symbol: String, line: usize },
    #[error("line {line}: `{symbol}` defined again while still active (first defined on line {first_line})")]
    DoubleDefine {
        symbol: String,
        line: usize,
        first_line: usize,
    },
    #[error("line {line}: `{symbol}` retracted without a matching definition")]
    StrayUndef { symbol: String, line: usize },
    #[error("line {line}: `{symbol}` is active inside the {into} block, which does not need it")]
    Leaked {
        symbol: String,
        into: Subsystem,
        line: usize,
    },
    #[error("line {line}: `{name}` declared again (first declared on line {first_line})")]
    DuplicateStandIn {
        name: String,
        line: usize,
        first_line: usize,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    /// Platform recorded in the unit's header comment, if any.
    pub platform: Option<Platform>,
    pub blocks: Vec<Subsystem>,
    pub includes: Vec<String>,
    pub violations: Vec<Violation>,
}

impl ScanReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn into_result(self) -> Result<Self, LintError> {
        if self.is_clean() {
            Ok(self)
        } else {
            Err(LintError {
                violations: self.violations,
            })
        }
    }
}

/// Scans `text` using the platform recorded in the text itself.
pub fn scan(text: &str, registry: &ScopeRegistry) -> ScanReport {
    scan_for(text, registry, None)
}

/// Scans `text`. `platform` overrides the one recorded in the header comment;
/// with neither, platform predicates are not checked.
pub fn scan_for(text: &str, registry: &ScopeRegistry, platform: Option<Platform>) -> ScanReport {
    let mut report = ScanReport {
        platform: platform.or_else(|| recorded_platform(text)),
        ..ScanReport::default()
    };
    let mut active: Vec<(String, usize)> = Vec::new();
    let mut typedefs: BTreeMap<String, Vec<(usize, Vec<Branch>)>> = BTreeMap::new();
    let mut branches: Vec<Branch> = Vec::new();
    let mut conditionals = 0;
    let mut block: Option<Subsystem> = None;

    let needs = |symbol: &str, subsystem: Subsystem, platform: Option<Platform>| {
        registry.get(symbol).is_some_and(|entry| {
            entry.needed_by.contains(subsystem)
                && platform.map_or(true, |platform| entry.predicate.matches(platform))
        })
    };

    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let trimmed = raw.trim();

        if let Some((begin, subsystem)) = block_marker(trimmed) {
            if begin {
                for (symbol, _) in &active {
                    if !needs(symbol.as_str(), subsystem, report.platform) {
                        report.violations.push(Violation::Leaked {
                            symbol: symbol.clone(),
                            into: subsystem,
                            line,
                        });
                    }
                }
                report.blocks.push(subsystem);
                block = Some(subsystem);
            } else {
                block = None;
            }
            continue;
        }

        if let Some(name) = typedef_name(trimmed) {
            let earlier = typedefs.entry(name.to_string()).or_default();
            let clash = earlier
                .iter()
                .find(|(_, path)| !mutually_exclusive(path, &branches))
                .map(|(first_line, _)| *first_line);
            if let Some(first_line) = clash {
                report.violations.push(Violation::DuplicateStandIn {
                    name: name.to_string(),
                    line,
                    first_line,
                });
            } else {
                earlier.push((line, branches.clone()));
            }
            continue;
        }

        let Some((keyword, args)) = preprocessor(trimmed) else {
            continue;
        };
        match keyword {
            "if" | "ifdef" | "ifndef" => {
                conditionals += 1;
                branches.push(Branch {
                    conditional: conditionals,
                    arm: 0,
                });
            }
            "elif" | "else" => {
                if let Some(branch) = branches.last_mut() {
                    branch.arm += 1;
                }
            }
            "endif" => {
                branches.pop();
            }
            "define" => {
                let Some(symbol) = macro_name(args) else {
                    continue;
                };
                if let Some((_, first_line)) = active.iter().find(|(name, _)| name == symbol) {
                    report.violations.push(Violation::DoubleDefine {
                        symbol: symbol.to_string(),
                        line,
                        first_line: *first_line,
                    });
                    continue;
                }
                if let Some(subsystem) = block {
                    if !needs(symbol, subsystem, report.platform) {
                        report.violations.push(Violation::Leaked {
                            symbol: symbol.to_string(),
                            into: subsystem,
                            line,
                        });
                    }
                }
                active.push((symbol.to_string(), line));
            }
            "undef" => {
                let Some(symbol) = macro_name(args) else {
                    continue;
                };
                match active.iter().position(|(name, _)| name == symbol) {
                    Some(position) => {
                        active.remove(position);
                    }
                    None => report.violations.push(Violation::StrayUndef {
                        symbol: symbol.to_string(),
                        line,
                    }),
                }
            }
            "include" => {
                let header = args.trim_matches(|c| matches!(c, '<' | '>' | '"'));
                if !header.is_empty() {
                    report.includes.push(header.to_string());
                }
            }
            _ => {}
        }
    }

    for (symbol, line) in active {
        report.violations.push(Violation::Unretracted { symbol, line });
    }

    for violation in &report.violations {
        tracing::warn!(%violation, "scope violation");
    }

    report
}

/// One arm of an `#if` chain; `conditional` numbers the chains in text order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Branch {
    conditional: usize,
    arm: usize,
}

/// Two declarations can never both be seen when they sit in different arms
/// of the same conditional chain.
fn mutually_exclusive(a: &[Branch], b: &[Branch]) -> bool {
    a.iter()
        .zip(b)
        .find(|(x, y)| x != y)
        .is_some_and(|(x, y)| x.conditional == y.conditional)
}

fn recorded_platform(text: &str) -> Option<Platform> {
    text.lines().take(4).find_map(|line| {
        let rest = line.split_once("platform=")?.1;
        let value = rest.split(|c: char| c.is_whitespace() || c == ';').next()?;
        Platform::from_str(value).ok()
    })
}

fn block_marker(line: &str) -> Option<(bool, Subsystem)> {
    let body = line.strip_prefix("/*")?.strip_suffix("*/")?.trim();
    let rest = body.strip_prefix(MARKER_PREFIX)?.trim();
    let (kind, name) = rest.split_once(' ')?;
    let subsystem = Subsystem::from_str(name.trim()).ok()?;
    match kind {
        "begin" => Some((true, subsystem)),
        "end" => Some((false, subsystem)),
        _ => None,
    }
}

fn preprocessor(line: &str) -> Option<(&str, &str)> {
    let rest = line.strip_prefix('#')?.trim_start();
    let end = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    Some((&rest[..end], rest[end..].trim()))
}

fn macro_name(args: &str) -> Option<&str> {
    let end = args
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(args.len());
    let name = &args[..end];
    (!name.is_empty()).then_some(name)
}

fn typedef_name(line: &str) -> Option<&str> {
    let body = line.strip_prefix("typedef ")?.strip_suffix(';')?;
    let name = body.rsplit(|c: char| c.is_whitespace() || c == '*').next()?;
    (!name.is_empty()).then_some(name)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::compose::Composer;
    use crate::config::{ShimConfig, SubsystemSet};

    #[test]
    fn composed_units_are_clean_everywhere() {
        let composer = Composer::max_sdk();
        let registry = ScopeRegistry::max_sdk();
        for platform in Platform::ALL {
            let unit = composer
                .compose(&ShimConfig::new(platform, SubsystemSet::full()))
                .unwrap();
            let report = scan(&unit.render(), &registry);
            assert_eq!(report.platform, Some(platform));
            assert_eq!(report.violations, Vec::new());
            assert_eq!(report.blocks, unit.blocks());
            assert!(report.includes.iter().any(|header| header == "ext.h"));
        }
    }

    #[test]
    fn legacy_wrapper_leaks_files_switch() {
        let text = "\
#ifdef __APPLE__
#define __FILES__
struct FSRef;
typedef struct FSRef FSRef;
#endif
struct  OpaqueMPCriticalRegionID;
typedef struct OpaqueMPCriticalRegionID*  MPCriticalRegionID;
#include \"wrapper-max.h\"
#include <z_dsp.h>
";
        let report = scan(text, &ScopeRegistry::max_sdk());
        assert_eq!(report.platform, None);
        assert_eq!(
            report.violations,
            vec![Violation::Unretracted {
                symbol: "__FILES__".into(),
                line: 2,
            }]
        );
        assert_eq!(report.includes, vec!["wrapper-max.h", "z_dsp.h"]);
    }

    #[test]
    fn symbol_carried_into_graphics_is_a_leak() {
        let text = "\
/* max-sdk-shim: begin host */
#define C74_NO_DEPRECATION
#include <ext.h>
/* max-sdk-shim: end host */
/* max-sdk-shim: begin graphics */
#include <jit.common.h>
/* max-sdk-shim: end graphics */
#undef C74_NO_DEPRECATION
";
        let report = scan_for(text, &ScopeRegistry::max_sdk(), Some(Platform::Other));
        assert_eq!(
            report.violations,
            vec![Violation::Leaked {
                symbol: "C74_NO_DEPRECATION".into(),
                into: Subsystem::Graphics,
                line: 5,
            }]
        );
        assert!(report.clone().into_result().is_err());
    }

    #[test]
    fn platform_predicate_is_checked() {
        let text = "\
/* max-sdk-shim: begin host */
#define __FILES__
#include <ext.h>
#undef __FILES__
/* max-sdk-shim: end host */
";
        let registry = ScopeRegistry::max_sdk();
        assert!(scan_for(text, &registry, Some(Platform::Apple)).is_clean());
        let report = scan_for(text, &registry, Some(Platform::Windows));
        assert_eq!(
            report.violations,
            vec![Violation::Leaked {
                symbol: "__FILES__".into(),
                into: Subsystem::Host,
                line: 2,
            }]
        );
    }

    #[test]
    fn pairing_errors_are_reported() {
        let text = "\
#define GL_GLEXT_LEGACY
#define GL_GLEXT_LEGACY
#undef GL_GLEXT_LEGACY
#undef GL_GLEXT_LEGACY
typedef uint16_t GLhalfNV;
typedef uint16_t GLhalfNV;
";
        let report = scan(text, &ScopeRegistry::max_sdk());
        assert_eq!(
            report.violations,
            vec![
                Violation::DoubleDefine {
                    symbol: "GL_GLEXT_LEGACY".into(),
                    line: 2,
                    first_line: 1,
                },
                Violation::StrayUndef {
                    symbol: "GL_GLEXT_LEGACY".into(),
                    line: 4,
                },
                Violation::DuplicateStandIn {
                    name: "GLhalfNV".into(),
                    line: 6,
                    first_line: 5,
                },
            ]
        );
    }

    #[test]
    fn typedefs_in_exclusive_branches_are_not_duplicates() {
        let text = "\
#ifdef __APPLE__
typedef unsigned int DisplayId;
#elif defined(_WIN32)
typedef unsigned long DisplayId;
#else
#if defined(__linux__)
typedef unsigned short DisplayId;
#endif
#endif
";
        let report = scan(text, &ScopeRegistry::max_sdk());
        assert_eq!(report.violations, Vec::new());
    }

    #[test]
    fn typedefs_visible_together_are_duplicates() {
        let text = "\
typedef unsigned int DisplayId;
#ifdef __APPLE__
typedef unsigned int DisplayId;
#endif
#ifdef _WIN32
typedef unsigned short Handle;
#endif
#ifdef WIN_VERSION
typedef unsigned short Handle;
#else
typedef unsigned long Handle;
#endif
";
        let report = scan(text, &ScopeRegistry::max_sdk());
        assert_eq!(
            report.violations,
            vec![
                Violation::DuplicateStandIn {
                    name: "DisplayId".into(),
                    line: 3,
                    first_line: 1,
                },
                Violation::DuplicateStandIn {
                    name: "Handle".into(),
                    line: 9,
                    first_line: 6,
                },
                Violation::DuplicateStandIn {
                    name: "Handle".into(),
                    line: 11,
                    first_line: 6,
                },
            ]
        );
    }
}
