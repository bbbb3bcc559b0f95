//! Core semantic types carried by the analysis.
//!
//! This module defines the value domain of the analyzer:
//! - [`FrameId`] - coordinate frames named by the protocol definitions
//! - [`SemType`] - the semantic type of an expression or variable
//!   (possible frames x possible units x optional SI dimension x provenance)
//! - [`TypeSource`] / [`TypeSourceKind`] - provenance of a type fact
//! - [`FunctionSummary`] / [`CallSite`] - the per-function abstraction the
//!   interprocedural search consumes

use std::collections::{BTreeMap, BTreeSet};

use crate::units::Dimension;

/// Integer identity of a physical unit spelling, assigned on first sight
/// while loading the protocol definitions and stable thereafter.
pub type UnitId = i32;

/// Unit id for spellings that never appeared in the protocol definitions.
pub const UNKNOWN_UNIT: UnitId = -1;

/// Coordinate frames, in protocol order. `None` is the sentinel and its
/// discriminant doubles as the number of real frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum FrameId {
    Global,
    LocalNed,
    Mission,
    GlobalRelativeAlt,
    LocalEnu,
    GlobalInt,
    GlobalRelativeAltInt,
    LocalOffsetNed,
    BodyNed,
    BodyOffsetNed,
    GlobalTerrainAlt,
    GlobalTerrainAltInt,
    BodyFrd,
    LocalFrd,
    LocalFlu,
    None,
}

impl FrameId {
    /// Every real frame, in protocol order. Excludes the `None` sentinel.
    pub const ALL: [FrameId; 15] = [
        FrameId::Global,
        FrameId::LocalNed,
        FrameId::Mission,
        FrameId::GlobalRelativeAlt,
        FrameId::LocalEnu,
        FrameId::GlobalInt,
        FrameId::GlobalRelativeAltInt,
        FrameId::LocalOffsetNed,
        FrameId::BodyNed,
        FrameId::BodyOffsetNed,
        FrameId::GlobalTerrainAlt,
        FrameId::GlobalTerrainAltInt,
        FrameId::BodyFrd,
        FrameId::LocalFrd,
        FrameId::LocalFlu,
    ];

    /// Number of real frames.
    pub const COUNT: usize = FrameId::ALL.len();

    /// Resolves a frame name from a protocol or prior file. Accepts both the
    /// bare name (`GLOBAL`) and the prefixed form (`MAV_FRAME_GLOBAL`).
    /// Unknown names resolve to the `None` sentinel.
    pub fn from_name(name: &str) -> FrameId {
        let bare = name.strip_prefix("MAV_FRAME_").unwrap_or(name);
        match bare {
            "GLOBAL" => FrameId::Global,
            "LOCAL_NED" => FrameId::LocalNed,
            "MISSION" => FrameId::Mission,
            "GLOBAL_RELATIVE_ALT" => FrameId::GlobalRelativeAlt,
            "LOCAL_ENU" => FrameId::LocalEnu,
            "GLOBAL_INT" => FrameId::GlobalInt,
            "GLOBAL_RELATIVE_ALT_INT" => FrameId::GlobalRelativeAltInt,
            "LOCAL_OFFSET_NED" => FrameId::LocalOffsetNed,
            "BODY_NED" => FrameId::BodyNed,
            "BODY_OFFSET_NED" => FrameId::BodyOffsetNed,
            "GLOBAL_TERRAIN_ALT" => FrameId::GlobalTerrainAlt,
            "GLOBAL_TERRAIN_ALT_INT" => FrameId::GlobalTerrainAltInt,
            "BODY_FRD" => FrameId::BodyFrd,
            "LOCAL_FRD" => FrameId::LocalFrd,
            "LOCAL_FLU" => FrameId::LocalFlu,
            _ => FrameId::None,
        }
    }

    /// The full universe of real frames as a set.
    pub fn universe() -> BTreeSet<FrameId> {
        FrameId::ALL.iter().copied().collect()
    }
}

/// Why a type fact has the value it does.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeSource {
    /// Flowed in through the parameter with this ordinal.
    Param(usize),
    /// Copied from a named variable.
    Var(String),
    /// Derived directly from the protocol definitions.
    Intrinsic,
    /// Origin unknown.
    Unknown,
}

impl TypeSource {
    pub fn kind(&self) -> TypeSourceKind {
        match self {
            TypeSource::Param(_) => TypeSourceKind::Param,
            TypeSource::Var(_) => TypeSourceKind::Var,
            TypeSource::Intrinsic => TypeSourceKind::Intrinsic,
            TypeSource::Unknown => TypeSourceKind::Unknown,
        }
    }
}

/// Fieldless discriminant of [`TypeSource`], stored in function summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeSourceKind {
    Param,
    Var,
    Intrinsic,
    Unknown,
}

impl TypeSourceKind {
    /// Rebuilds a source tag for the given parameter ordinal, used when
    /// seeding the interprocedural search from a summary.
    pub fn as_source(self, param_no: usize) -> TypeSource {
        match self {
            TypeSourceKind::Param => TypeSource::Param(param_no),
            TypeSourceKind::Var => TypeSource::Unknown,
            TypeSourceKind::Intrinsic => TypeSource::Intrinsic,
            TypeSourceKind::Unknown => TypeSource::Unknown,
        }
    }
}

/// The semantic type the analyzer carries for each expression and variable.
///
/// The derived `PartialEq`/`Eq`/`Hash` are structural (provenance included)
/// and exist for memoization keys and deduplication. Whether two values agree
/// *semantically* is decided by [`SemType::same_type`], which is dimensional
/// when both sides carry a dimension and set-based otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SemType {
    pub frames: BTreeSet<FrameId>,
    pub units: BTreeSet<UnitId>,
    pub dimension: Option<Dimension>,
    pub sources: Vec<TypeSource>,
}

impl SemType {
    /// A value about which nothing is known: every frame, every unit,
    /// no dimension, no provenance.
    pub fn universal(num_units: i32) -> SemType {
        SemType {
            frames: FrameId::universe(),
            units: (0..num_units).collect(),
            dimension: None,
            sources: Vec::new(),
        }
    }

    /// The universal type carrying a single provenance tag.
    pub fn universal_with_source(num_units: i32, source: TypeSource) -> SemType {
        let mut ty = SemType::universal(num_units);
        ty.sources.push(source);
        ty
    }

    /// The type of a message-struct field expanded from the protocol
    /// definitions: the field's unit is known exactly, the frame is anything
    /// the message could carry.
    pub fn intrinsic_from_field(
        dimension: Option<Dimension>,
        frames: BTreeSet<FrameId>,
        unit: UnitId,
        source: TypeSource,
    ) -> SemType {
        SemType {
            frames,
            units: BTreeSet::from([unit]),
            dimension,
            sources: vec![source],
        }
    }

    /// Merges `other` into `self`: set union on frames and units, provenance
    /// appended. The dimension survives only when both sides agree on it.
    pub fn merge(&mut self, other: &SemType) {
        self.frames.extend(other.frames.iter().copied());
        self.units.extend(other.units.iter().copied());
        self.sources.extend(other.sources.iter().cloned());
        self.dimension = match (self.dimension, other.dimension) {
            (Some(a), Some(b)) if a == b => Some(a),
            _ => None,
        };
    }

    /// Semantic agreement. When both sides carry a dimension, agreement is
    /// exactly dimensional equality; otherwise it is set equality on frames
    /// and units. This intentionally loses precision when only one side has
    /// a dimension. Provenance never participates.
    pub fn same_type(&self, other: &SemType) -> bool {
        match (self.dimension, other.dimension) {
            (Some(a), Some(b)) => a == b,
            _ => self.frames == other.frames && self.units == other.units,
        }
    }
}

/// One observed call: the argument types at the call site, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallSite {
    pub args: Vec<SemType>,
}

/// Per-function abstraction produced by the walker, consumed by the
/// interprocedural search. Committed only for functions with a definition
/// body, at most once per stable symbol id across the whole run.
#[derive(Debug, Clone, Default)]
pub struct FunctionSummary {
    /// Names of functions this function calls.
    pub callees: BTreeSet<String>,
    /// Callee name to every observed call site.
    pub calling_context: BTreeMap<String, Vec<CallSite>>,
    /// Number of parameters the function takes.
    pub num_params: usize,
    /// Parameter ordinal to the provenance kind its binding was given.
    pub param_to_source_kind: BTreeMap<usize, TypeSourceKind>,
    /// Qualified variable name to the type observed flowing into it.
    pub store_to_type: BTreeMap<String, SemType>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::string_to_dimension;

    fn ty(frames: &[FrameId], units: &[UnitId]) -> SemType {
        SemType {
            frames: frames.iter().copied().collect(),
            units: units.iter().copied().collect(),
            dimension: None,
            sources: Vec::new(),
        }
    }

    #[test]
    fn frame_sentinel_is_the_count() {
        assert_eq!(FrameId::None as usize, FrameId::COUNT);
        assert_eq!(FrameId::COUNT, 15);
    }

    #[test]
    fn frame_names_resolve_with_and_without_prefix() {
        assert_eq!(FrameId::from_name("MAV_FRAME_LOCAL_NED"), FrameId::LocalNed);
        assert_eq!(FrameId::from_name("LOCAL_NED"), FrameId::LocalNed);
        assert_eq!(FrameId::from_name("MARS_FIXED"), FrameId::None);
    }

    #[test]
    fn universal_spans_everything() {
        let u = SemType::universal(3);
        assert_eq!(u.frames.len(), FrameId::COUNT);
        assert!(!u.frames.contains(&FrameId::None));
        assert_eq!(u.units, BTreeSet::from([0, 1, 2]));
        assert!(u.dimension.is_none());
    }

    #[test]
    fn merge_is_idempotent_commutative_associative() {
        let a = ty(&[FrameId::Global], &[0]);
        let b = ty(&[FrameId::LocalNed], &[1]);
        let c = ty(&[FrameId::Mission], &[0, 2]);

        let mut aa = a.clone();
        aa.merge(&a);
        assert_eq!(aa.frames, a.frames);
        assert_eq!(aa.units, a.units);

        let mut ab = a.clone();
        ab.merge(&b);
        let mut ba = b.clone();
        ba.merge(&a);
        assert_eq!(ab.frames, ba.frames);
        assert_eq!(ab.units, ba.units);

        let mut ab_c = ab.clone();
        ab_c.merge(&c);
        let mut bc = b.clone();
        bc.merge(&c);
        let mut a_bc = a.clone();
        a_bc.merge(&bc);
        assert_eq!(ab_c.frames, a_bc.frames);
        assert_eq!(ab_c.units, a_bc.units);
    }

    #[test]
    fn merge_keeps_dimension_only_on_agreement() {
        let cm = string_to_dimension("cm");
        let m = string_to_dimension("m");

        let mut a = ty(&[FrameId::Global], &[0]);
        a.dimension = cm;
        let mut same = ty(&[FrameId::Global], &[0]);
        same.dimension = cm;
        a.merge(&same);
        assert_eq!(a.dimension, cm);

        let mut other = ty(&[FrameId::Global], &[0]);
        other.dimension = m;
        a.merge(&other);
        assert!(a.dimension.is_none());
    }

    #[test]
    fn merge_appends_provenance() {
        let mut a = SemType::universal_with_source(1, TypeSource::Param(0));
        let b = SemType::universal_with_source(1, TypeSource::Intrinsic);
        a.merge(&b);
        assert_eq!(a.sources, vec![TypeSource::Param(0), TypeSource::Intrinsic]);
    }

    #[test]
    fn equality_is_dimensional_when_both_sides_have_dimensions() {
        // Different frame/unit sets, identical dimensions: same type.
        let mut a = ty(&[FrameId::Global], &[0]);
        a.dimension = string_to_dimension("meter");
        let mut b = ty(&FrameId::ALL, &[5]);
        b.dimension = string_to_dimension("m");
        assert!(a.same_type(&b));

        // Identical sets, different dimensions: different type.
        let mut c = a.clone();
        c.dimension = string_to_dimension("cm");
        assert!(!a.same_type(&c));
    }

    #[test]
    fn equality_is_set_based_otherwise() {
        let a = ty(&[FrameId::Global], &[0]);
        let b = ty(&[FrameId::Global], &[0]);
        assert!(a.same_type(&b));

        let c = ty(&FrameId::ALL, &[0]);
        assert!(!a.same_type(&c));

        // One-sided dimension falls back to sets.
        let mut d = ty(&[FrameId::Global], &[0]);
        d.dimension = string_to_dimension("cm");
        assert!(a.same_type(&d));
    }

    #[test]
    fn provenance_does_not_affect_agreement() {
        let a = SemType::universal_with_source(2, TypeSource::Param(3));
        let b = SemType::universal_with_source(2, TypeSource::Unknown);
        assert!(a.same_type(&b));
    }
}
