//! Race reporting (spec §4.5 step 6 "record diagnostic (instrPtr pair +
//! byte addr)", spec §1 "out of scope: symbol-table-based source-line
//! resolution for reports").
//!
//! Grounded on `RompLib/include/CoreUtil.h`'s `reportDataRaceWithLineInfo`,
//! which resolves two instruction pointers to source lines before
//! printing a report. That resolution step is out of scope here (spec
//! §1); [`SourceResolver`] is the narrow trait boundary a caller can
//! plug a real symbolizer into, the same way `samply`'s profiler core
//! calls through a `SymbolManager` interface (`samply/src/symbols.rs`)
//! rather than owning address resolution itself.

use crate::access_history::RaceHit;
use crate::record::InstrPtr;

/// A resolved (or unresolved) source location for an instruction pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Resolves an instruction pointer to a source location. Out of scope per
/// spec §1; callers supply a real implementation (DWARF/PDB-backed, as
/// `samply-symbols` provides for its own profiler core) or fall back to
/// [`NullResolver`].
pub trait SourceResolver {
    fn resolve(&self, instr_ptr: InstrPtr) -> Option<SourceLocation>;
}

/// Default resolver: reports raw addresses, no symbolication.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullResolver;

impl SourceResolver for NullResolver {
    fn resolve(&self, _instr_ptr: InstrPtr) -> Option<SourceLocation> {
        None
    }
}

/// A complete, human-readable race report (spec §4.5 step 6: "record
/// diagnostic (instrPtr pair + byte addr)").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaceReport {
    pub addr: u64,
    pub hist_instr: InstrPtr,
    pub cur_instr: InstrPtr,
    pub hist_is_write: bool,
    pub cur_is_write: bool,
}

impl RaceReport {
    pub fn from_hit(addr: u64, hit: RaceHit) -> Self {
        RaceReport {
            addr,
            hist_instr: hit.hist_instr,
            cur_instr: hit.cur_instr,
            hist_is_write: hit.hist_is_write,
            cur_is_write: hit.cur_is_write,
        }
    }

    /// Render this report using `resolver` for both instruction pointers,
    /// falling back to raw hex addresses when resolution fails.
    pub fn format(&self, resolver: &dyn SourceResolver) -> String {
        let access_kind = |is_write: bool| if is_write { "write" } else { "read" };
        let location = |ip: InstrPtr| {
            resolver
                .resolve(ip)
                .map(|loc| loc.to_string())
                .unwrap_or_else(|| format!("{ip:#x}"))
        };
        format!(
            "data race on address {:#x}: {} at {} conflicts with {} at {}",
            self.addr,
            access_kind(self.hist_is_write),
            location(self.hist_instr),
            access_kind(self.cur_is_write),
            location(self.cur_instr),
        )
    }
}

impl std::fmt::Display for RaceReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.format(&NullResolver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_resolver_falls_back_to_hex() {
        let report = RaceReport {
            addr: 0x10,
            hist_instr: 0x1000,
            cur_instr: 0x2000,
            hist_is_write: true,
            cur_is_write: false,
        };
        let text = report.format(&NullResolver);
        assert!(text.contains("0x1000"));
        assert!(text.contains("0x2000"));
        assert!(text.contains("write"));
        assert!(text.contains("read"));
    }

    struct FixedResolver;
    impl SourceResolver for FixedResolver {
        fn resolve(&self, instr_ptr: InstrPtr) -> Option<SourceLocation> {
            Some(SourceLocation {
                file: format!("probe_{instr_ptr}.c"),
                line: 42,
            })
        }
    }

    #[test]
    fn resolver_output_is_used_when_available() {
        let report = RaceReport {
            addr: 0x10,
            hist_instr: 7,
            cur_instr: 8,
            hist_is_write: true,
            cur_is_write: true,
        };
        let text = report.format(&FixedResolver);
        assert!(text.contains("probe_7.c:42"));
        assert!(text.contains("probe_8.c:42"));
    }
}
