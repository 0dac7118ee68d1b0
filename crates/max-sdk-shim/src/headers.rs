use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::Subsystem;
use crate::error::ShimError;

/// Ordered headers of one subsystem. The order is the vendor's own
/// dependency order and sets are only ever included whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderSet {
    pub subsystem: Subsystem,
    pub headers: Vec<String>,
}

impl HeaderSet {
    pub fn new(subsystem: Subsystem, headers: Vec<String>) -> Result<Self, ShimError> {
        let set = Self { subsystem, headers };
        set.validate()?;
        Ok(set)
    }

    fn from_static(subsystem: Subsystem, headers: &[&str]) -> Self {
        Self {
            subsystem,
            headers: headers.iter().map(|h| h.to_string()).collect(),
        }
    }

    pub fn validate(&self) -> Result<(), ShimError> {
        if self.headers.is_empty() {
            return Err(ShimError::EmptyHeaderSet(self.subsystem));
        }
        let mut seen = BTreeMap::new();
        for header in &self.headers {
            if !is_valid_header_name(header) {
                return Err(ShimError::InvalidHeader {
                    subsystem: self.subsystem,
                    name: header.clone(),
                });
            }
            if seen.insert(header.as_str(), ()).is_some() {
                return Err(ShimError::DuplicateHeader {
                    name: header.clone(),
                    first: self.subsystem,
                    second: self.subsystem,
                });
            }
        }
        Ok(())
    }

    pub fn max_default() -> Self {
        Self::from_static(
            Subsystem::Host,
            &[
                "ext.h",
                "jgraphics.h",
                "ext_boxstyle.h",
                "ext_database.h",
                "ext_dictobj.h",
                "ext_drag.h",
                "ext_preferences.h",
                "ext_strings.h",
                "ext_wind.h",
                "indexmap.h",
                "jdataview.h",
                "jpatcher_api.h",
                "jpatcher_syms.h",
            ],
        )
    }

    pub fn msp_default() -> Self {
        Self::from_static(Subsystem::Audio, &["z_dsp.h", "ext_buffer.h", "r_pfft.h"])
    }

    pub fn jitter_default() -> Self {
        Self::from_static(
            Subsystem::Graphics,
            &[
                "jit.common.h",
                "jit.bin.h",
                "jit.byteorder.h",
                "jit.cpost.h",
                "jit.critical.h",
                "jit.cubicspline.h",
                "jit.error.h",
                "jit.file.h",
                "jit.fixmath.h",
                "jit.functor.h",
                "jit.gl.cache.h",
                "jit.gl.chunk.h",
                "jit.gl.common.h",
                "jit.gl.context.h",
                "jit.gl.context.view.h",
                "jit.gl.draw.h",
                "jit.gl.drawinfo.h",
                "jit.gl.h",
                "jit.gl.ob3d.h",
                "jit.gl.pixelformat.h",
                "jit.gl.procs.h",
                "jit.gl.support.h",
                "jit.glext.h",
                "jit.glext_nv.h",
                "jit.gworld.h",
                "jit.half.h",
                "jit.linklist.h",
                "jit.mac.h",
                "jit.math.h",
                "jit.matrix.util.h",
                "jit.max.h",
                "jit.namespace.h",
                "jit.op.h",
                "jit.parallel.utils.h",
                "jit.platform.h",
                "jit.symbols.h",
                "jit.vecmath.h",
                "jit.wglext.h",
                "jit.window.h",
                "max.jit.mop.h",
            ],
        )
    }

    pub fn defaults() -> Vec<Self> {
        vec![Self::max_default(), Self::msp_default(), Self::jitter_default()]
    }
}

/// A header is written as `#include <name>`, so the name must survive that
/// verbatim.
pub fn is_valid_header_name(name: &str) -> bool {
    !name.trim().is_empty()
        && name.trim() == name
        && !name
            .chars()
            .any(|c| matches!(c, '<' | '>' | '"' | '\n' | '\r' | '\0'))
}

/// Rejects a header listed by more than one subsystem.
pub fn check_disjoint(sets: &[HeaderSet]) -> Result<(), ShimError> {
    let mut owners: BTreeMap<&str, Subsystem> = BTreeMap::new();
    for set in sets {
        set.validate()?;
        for header in &set.headers {
            if let Some(first) = owners.insert(header.as_str(), set.subsystem) {
                return Err(ShimError::DuplicateHeader {
                    name: header.clone(),
                    first,
                    second: set.subsystem,
                });
            }
        }
    }
    Ok(())
}
