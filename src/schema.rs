//! Declarative record-field schemas.
//!
//! Every parsed entity (the seven element kinds, structs, and the library
//! header) declares the ordered list of fields its record grammar admits.
//! The interpreter in [`crate::read`] walks a list against the record stream
//! to fill an entity, and the one in [`crate::write`] walks the same list to
//! emit the entity's records in declaration order, so the two directions can
//! never disagree about a grammar.
//!
//! GDSII is LL(1) at this level: every optional field is recognisable from a
//! single record of lookahead, which is all the readers use.

use arcstr::ArcStr;

use crate::{
    GdsAccessControl, GdsArrayRef, GdsBoundary, GdsBox, GdsDateTimes, GdsElemFlags, GdsFormatType,
    GdsLibrary, GdsNode, GdsPath, GdsPlex, GdsPoint, GdsPresentation, GdsProperty, GdsRecordType,
    GdsStrClass, GdsStrans, GdsStruct, GdsStructRef, GdsTextElem, GdsUnits,
};

/// A pair of accessors projecting one field out of an entity.
pub(crate) struct Acc<E, T> {
    /// Shared projection, used while writing.
    pub get: fn(&E) -> &T,
    /// Mutable projection, used while reading.
    pub get_mut: fn(&mut E) -> &mut T,
}

/// One field of an entity's record grammar: the record type that introduces
/// it, and the shape of its payload and storage.
pub(crate) struct GdsField<E: 'static> {
    pub rtype: GdsRecordType,
    pub kind: GdsFieldKind<E>,
}

/// The closed set of field shapes the GDSII grammar uses.
pub(crate) enum GdsFieldKind<E: 'static> {
    /// Mandatory single INT2 scalar.
    I16(Acc<E, i16>),
    /// Optional single INT2 scalar.
    OptI16(Acc<E, Option<i16>>),
    /// Optional single INT4 scalar.
    OptI32(Acc<E, Option<i32>>),
    /// Optional plex identifier.
    Plex(Acc<E, Option<GdsPlex>>),
    /// Optional element-flags bitfield, stored whole.
    ElemFlags(Acc<E, Option<GdsElemFlags>>),
    /// Optional text-presentation bitfield, stored whole.
    Presentation(Acc<E, Option<GdsPresentation>>),
    /// Optional structure-class bitfield, stored whole.
    StrClass(Acc<E, Option<GdsStrClass>>),
    /// Mandatory ASCII string.
    Str(Acc<E, ArcStr>),
    /// Optional ASCII string, stored whole.
    OptStr(Acc<E, Option<ArcStr>>),
    /// Mandatory XY list with a minimum point count.
    Xy {
        acc: Acc<E, Vec<GdsPoint>>,
        min: usize,
    },
    /// Mandatory closed-polygon XY. `min` counts the points on the wire;
    /// the duplicated closing point is stripped on read and restored on write.
    XyClosed {
        acc: Acc<E, Vec<GdsPoint>>,
        min: usize,
    },
    /// Mandatory single-point XY.
    XyPoint(Acc<E, GdsPoint>),
    /// Mandatory three-point XY: array origin, column-end, row-end.
    XyArray(Acc<E, [GdsPoint; 3]>),
    /// Mandatory five-point closed XY, stored as the four corners.
    XyBox(Acc<E, [GdsPoint; 4]>),
    /// Mandatory COLROW pair.
    ColRow { cols: Acc<E, i16>, rows: Acc<E, i16> },
    /// Mandatory UNITS pair.
    Units(Acc<E, GdsUnits>),
    /// Mandatory modification/access timestamps.
    Dates(Acc<E, GdsDateTimes>),
    /// Zero or more PROPATTR/PROPVALUE pairs, order and duplicates preserved.
    Properties(Acc<E, Vec<GdsProperty>>),
    /// Optional STRANS bitfield with trailing optional MAG and ANGLE.
    Strans(Acc<E, Option<GdsStrans>>),
    /// Optional FORMAT record; filtered formats carry MASK records closed by ENDMASKS.
    Format(Acc<E, Option<GdsFormatType>>),
    /// Optional access-control list of group/user/rights triples.
    Acl(Acc<E, Vec<GdsAccessControl>>),
}

macro_rules! acc {
    ($field:ident) => {
        Acc {
            get: |e| &e.$field,
            get_mut: |e| &mut e.$field,
        }
    };
}

use self::GdsFieldKind as K;
use crate::GdsRecordType as T;

pub(crate) static BOUNDARY_SCHEMA: &[GdsField<GdsBoundary>] = &[
    GdsField {
        rtype: T::ElemFlags,
        kind: K::ElemFlags(acc!(elflags)),
    },
    GdsField {
        rtype: T::Plex,
        kind: K::Plex(acc!(plex)),
    },
    GdsField {
        rtype: T::Layer,
        kind: K::I16(acc!(layer)),
    },
    GdsField {
        rtype: T::DataType,
        kind: K::I16(acc!(datatype)),
    },
    GdsField {
        rtype: T::Xy,
        kind: K::XyClosed {
            acc: acc!(xy),
            min: 4,
        },
    },
    GdsField {
        rtype: T::PropAttr,
        kind: K::Properties(acc!(properties)),
    },
];

pub(crate) static PATH_SCHEMA: &[GdsField<GdsPath>] = &[
    GdsField {
        rtype: T::ElemFlags,
        kind: K::ElemFlags(acc!(elflags)),
    },
    GdsField {
        rtype: T::Plex,
        kind: K::Plex(acc!(plex)),
    },
    GdsField {
        rtype: T::Layer,
        kind: K::I16(acc!(layer)),
    },
    GdsField {
        rtype: T::DataType,
        kind: K::I16(acc!(datatype)),
    },
    GdsField {
        rtype: T::PathType,
        kind: K::OptI16(acc!(path_type)),
    },
    GdsField {
        rtype: T::Width,
        kind: K::OptI32(acc!(width)),
    },
    GdsField {
        rtype: T::BeginExtn,
        kind: K::OptI32(acc!(begin_extn)),
    },
    GdsField {
        rtype: T::EndExtn,
        kind: K::OptI32(acc!(end_extn)),
    },
    GdsField {
        rtype: T::Xy,
        kind: K::Xy {
            acc: acc!(xy),
            min: 2,
        },
    },
    GdsField {
        rtype: T::PropAttr,
        kind: K::Properties(acc!(properties)),
    },
];

pub(crate) static STRUCT_REF_SCHEMA: &[GdsField<GdsStructRef>] = &[
    GdsField {
        rtype: T::ElemFlags,
        kind: K::ElemFlags(acc!(elflags)),
    },
    GdsField {
        rtype: T::Plex,
        kind: K::Plex(acc!(plex)),
    },
    GdsField {
        rtype: T::StructRefName,
        kind: K::Str(acc!(name)),
    },
    GdsField {
        rtype: T::Strans,
        kind: K::Strans(acc!(strans)),
    },
    GdsField {
        rtype: T::Xy,
        kind: K::XyPoint(acc!(xy)),
    },
    GdsField {
        rtype: T::PropAttr,
        kind: K::Properties(acc!(properties)),
    },
];

pub(crate) static ARRAY_REF_SCHEMA: &[GdsField<GdsArrayRef>] = &[
    GdsField {
        rtype: T::ElemFlags,
        kind: K::ElemFlags(acc!(elflags)),
    },
    GdsField {
        rtype: T::Plex,
        kind: K::Plex(acc!(plex)),
    },
    GdsField {
        rtype: T::StructRefName,
        kind: K::Str(acc!(name)),
    },
    GdsField {
        rtype: T::Strans,
        kind: K::Strans(acc!(strans)),
    },
    GdsField {
        rtype: T::ColRow,
        kind: K::ColRow {
            cols: acc!(cols),
            rows: acc!(rows),
        },
    },
    GdsField {
        rtype: T::Xy,
        kind: K::XyArray(acc!(xy)),
    },
    GdsField {
        rtype: T::PropAttr,
        kind: K::Properties(acc!(properties)),
    },
];

pub(crate) static TEXT_SCHEMA: &[GdsField<GdsTextElem>] = &[
    GdsField {
        rtype: T::ElemFlags,
        kind: K::ElemFlags(acc!(elflags)),
    },
    GdsField {
        rtype: T::Plex,
        kind: K::Plex(acc!(plex)),
    },
    GdsField {
        rtype: T::Layer,
        kind: K::I16(acc!(layer)),
    },
    GdsField {
        rtype: T::TextType,
        kind: K::I16(acc!(texttype)),
    },
    GdsField {
        rtype: T::Presentation,
        kind: K::Presentation(acc!(presentation)),
    },
    GdsField {
        rtype: T::PathType,
        kind: K::OptI16(acc!(path_type)),
    },
    GdsField {
        rtype: T::Width,
        kind: K::OptI32(acc!(width)),
    },
    GdsField {
        rtype: T::Strans,
        kind: K::Strans(acc!(strans)),
    },
    GdsField {
        rtype: T::Xy,
        kind: K::XyPoint(acc!(xy)),
    },
    GdsField {
        rtype: T::String,
        kind: K::Str(acc!(string)),
    },
    GdsField {
        rtype: T::PropAttr,
        kind: K::Properties(acc!(properties)),
    },
];

pub(crate) static NODE_SCHEMA: &[GdsField<GdsNode>] = &[
    GdsField {
        rtype: T::ElemFlags,
        kind: K::ElemFlags(acc!(elflags)),
    },
    GdsField {
        rtype: T::Plex,
        kind: K::Plex(acc!(plex)),
    },
    GdsField {
        rtype: T::Layer,
        kind: K::I16(acc!(layer)),
    },
    GdsField {
        rtype: T::Nodetype,
        kind: K::I16(acc!(nodetype)),
    },
    GdsField {
        rtype: T::Xy,
        kind: K::Xy {
            acc: acc!(xy),
            min: 1,
        },
    },
];

pub(crate) static BOX_SCHEMA: &[GdsField<GdsBox>] = &[
    GdsField {
        rtype: T::ElemFlags,
        kind: K::ElemFlags(acc!(elflags)),
    },
    GdsField {
        rtype: T::Plex,
        kind: K::Plex(acc!(plex)),
    },
    GdsField {
        rtype: T::Layer,
        kind: K::I16(acc!(layer)),
    },
    GdsField {
        rtype: T::BoxType,
        kind: K::I16(acc!(boxtype)),
    },
    GdsField {
        rtype: T::Xy,
        kind: K::XyBox(acc!(xy)),
    },
    GdsField {
        rtype: T::PropAttr,
        kind: K::Properties(acc!(properties)),
    },
];

pub(crate) static STRUCT_SCHEMA: &[GdsField<GdsStruct>] = &[
    GdsField {
        rtype: T::BgnStruct,
        kind: K::Dates(acc!(dates)),
    },
    GdsField {
        rtype: T::StructName,
        kind: K::Str(acc!(name)),
    },
    GdsField {
        rtype: T::StrClass,
        kind: K::StrClass(acc!(strclass)),
    },
];

pub(crate) static LIBRARY_SCHEMA: &[GdsField<GdsLibrary>] = &[
    GdsField {
        rtype: T::Header,
        kind: K::I16(acc!(version)),
    },
    GdsField {
        rtype: T::BgnLib,
        kind: K::Dates(acc!(dates)),
    },
    GdsField {
        rtype: T::LibDirSize,
        kind: K::OptI16(acc!(libdirsize)),
    },
    GdsField {
        rtype: T::SrfName,
        kind: K::OptStr(acc!(srfname)),
    },
    GdsField {
        rtype: T::LibSecur,
        kind: K::Acl(acc!(libsecur)),
    },
    GdsField {
        rtype: T::LibName,
        kind: K::Str(acc!(name)),
    },
    GdsField {
        rtype: T::RefLibs,
        kind: K::OptStr(acc!(reflibs)),
    },
    GdsField {
        rtype: T::Fonts,
        kind: K::OptStr(acc!(fonts)),
    },
    GdsField {
        rtype: T::AttrTable,
        kind: K::OptStr(acc!(attrtable)),
    },
    GdsField {
        rtype: T::Generations,
        kind: K::OptI16(acc!(generations)),
    },
    GdsField {
        rtype: T::Format,
        kind: K::Format(acc!(format_type)),
    },
    GdsField {
        rtype: T::Units,
        kind: K::Units(acc!(units)),
    },
];
