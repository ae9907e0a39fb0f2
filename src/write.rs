//! GDSII writing.
//!
//! [`GdsWriter`] flattens a [`GdsLibrary`] tree back into records, emitting
//! each entity's fields in the order declared by [`crate::schema`] so that
//! reading and writing share a single grammar definition.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::schema::{self, GdsField, GdsFieldKind};
use crate::{
    GdsElement, GdsFormatType, GdsLibrary, GdsPoint, GdsRecord, GdsRecordType, GdsResult, GdsStruct,
};

/// Writes entity `source`'s records to `wr`, in schema order.
fn write_fields<W: Write, E>(wr: &mut W, fields: &[GdsField<E>], source: &E) -> GdsResult<()> {
    for field in fields {
        write_field(wr, field, source)?;
    }
    Ok(())
}

/// Writes a single schema field's record(s), where present.
fn write_field<W: Write, E>(wr: &mut W, field: &GdsField<E>, source: &E) -> GdsResult<()> {
    match &field.kind {
        GdsFieldKind::I16(acc) => GdsRecord::int2(field.rtype, *(acc.get)(source)).encode(wr)?,
        GdsFieldKind::OptI16(acc) => {
            if let Some(val) = (acc.get)(source) {
                GdsRecord::int2(field.rtype, *val).encode(wr)?;
            }
        }
        GdsFieldKind::OptI32(acc) => {
            if let Some(val) = (acc.get)(source) {
                GdsRecord::int4(field.rtype, *val).encode(wr)?;
            }
        }
        GdsFieldKind::Plex(acc) => {
            if let Some(plex) = (acc.get)(source) {
                GdsRecord::int4(field.rtype, plex.0).encode(wr)?;
            }
        }
        GdsFieldKind::ElemFlags(acc) => {
            if let Some(flags) = (acc.get)(source) {
                GdsRecord::bitarray(field.rtype, flags.bits()).encode(wr)?;
            }
        }
        GdsFieldKind::Presentation(acc) => {
            if let Some(pres) = (acc.get)(source) {
                GdsRecord::bitarray(field.rtype, pres.bits()).encode(wr)?;
            }
        }
        GdsFieldKind::StrClass(acc) => {
            if let Some(class) = (acc.get)(source) {
                GdsRecord::bitarray(field.rtype, class.bits()).encode(wr)?;
            }
        }
        GdsFieldKind::Str(acc) => {
            GdsRecord::ascii(field.rtype, (acc.get)(source).clone()).encode(wr)?
        }
        GdsFieldKind::OptStr(acc) => {
            if let Some(s) = (acc.get)(source) {
                GdsRecord::ascii(field.rtype, s.clone()).encode(wr)?;
            }
        }
        GdsFieldKind::Xy { acc, .. } => {
            GdsRecord::int4s(field.rtype, GdsPoint::flatten_vec((acc.get)(source))).encode(wr)?;
        }
        GdsFieldKind::XyClosed { acc, .. } => {
            // Restore the duplicated closing point stripped while parsing.
            let pts = (acc.get)(source);
            let mut vals = GdsPoint::flatten_vec(pts);
            if let Some(first) = pts.first() {
                vals.push(first.x);
                vals.push(first.y);
            }
            GdsRecord::int4s(field.rtype, vals).encode(wr)?;
        }
        GdsFieldKind::XyPoint(acc) => {
            GdsRecord::int4s(field.rtype, (acc.get)(source).flatten()).encode(wr)?;
        }
        GdsFieldKind::XyArray(acc) => {
            GdsRecord::int4s(field.rtype, GdsPoint::flatten_vec((acc.get)(source))).encode(wr)?;
        }
        GdsFieldKind::XyBox(acc) => {
            let pts = (acc.get)(source);
            let mut vals = GdsPoint::flatten_vec(pts);
            vals.push(pts[0].x);
            vals.push(pts[0].y);
            GdsRecord::int4s(field.rtype, vals).encode(wr)?;
        }
        GdsFieldKind::ColRow { cols, rows } => {
            GdsRecord::int2s(field.rtype, vec![*(cols.get)(source), *(rows.get)(source)])
                .encode(wr)?;
        }
        GdsFieldKind::Units(acc) => {
            let units = (acc.get)(source);
            GdsRecord::real8s(field.rtype, vec![units.0, units.1]).encode(wr)?;
        }
        GdsFieldKind::Dates(acc) => {
            GdsRecord::int2s(field.rtype, (acc.get)(source).flatten()).encode(wr)?;
        }
        GdsFieldKind::Properties(acc) => {
            for prop in (acc.get)(source) {
                GdsRecord::int2(GdsRecordType::PropAttr, prop.attr).encode(wr)?;
                GdsRecord::ascii(GdsRecordType::PropValue, prop.value.clone()).encode(wr)?;
            }
        }
        GdsFieldKind::Strans(acc) => {
            if let Some(strans) = (acc.get)(source) {
                let mut bits = 0u16;
                if strans.reflected {
                    bits |= 0x8000;
                }
                if strans.abs_mag {
                    bits |= 0x0004;
                }
                if strans.abs_angle {
                    bits |= 0x0002;
                }
                GdsRecord::bitarray(field.rtype, bits).encode(wr)?;
                if let Some(mag) = strans.mag {
                    GdsRecord::real8s(GdsRecordType::Mag, vec![mag]).encode(wr)?;
                }
                if let Some(angle) = strans.angle {
                    GdsRecord::real8s(GdsRecordType::Angle, vec![angle]).encode(wr)?;
                }
            }
        }
        GdsFieldKind::Format(acc) => match (acc.get)(source) {
            Some(GdsFormatType::Archive(code)) => {
                GdsRecord::int2(field.rtype, *code).encode(wr)?;
            }
            Some(GdsFormatType::Filtered(code, masks)) => {
                GdsRecord::int2(field.rtype, *code).encode(wr)?;
                for mask in masks {
                    GdsRecord::ascii(GdsRecordType::Mask, mask.clone()).encode(wr)?;
                }
                GdsRecord::empty(GdsRecordType::EndMasks).encode(wr)?;
            }
            None => (),
        },
        GdsFieldKind::Acl(acc) => {
            let acls = (acc.get)(source);
            if !acls.is_empty() {
                let mut vals = Vec::with_capacity(acls.len() * 3);
                for acl in acls {
                    vals.extend([acl.group, acl.user, acl.rights]);
                }
                GdsRecord::int2s(field.rtype, vals).encode(wr)?;
            }
        }
    }
    Ok(())
}

/// A writer of GDSII byte streams.
pub(crate) struct GdsWriter<W: Write> {
    dest: W,
}

impl GdsWriter<BufWriter<File>> {
    /// Opens the file at `fname` for writing.
    pub(crate) fn open(fname: impl AsRef<Path>) -> GdsResult<Self> {
        Ok(Self::new(BufWriter::new(File::create(fname)?)))
    }
}

impl<W: Write> GdsWriter<W> {
    /// Creates a writer over `dest`.
    pub(crate) fn new(dest: W) -> Self {
        Self { dest }
    }

    /// Writes library `lib` in its entirety, HEADER through ENDLIB.
    pub(crate) fn write_lib(&mut self, lib: &GdsLibrary) -> GdsResult<()> {
        write_fields(&mut self.dest, schema::LIBRARY_SCHEMA, lib)?;
        for strukt in &lib.structs {
            self.write_struct(strukt)?;
        }
        GdsRecord::empty(GdsRecordType::EndLib).encode(&mut self.dest)?;
        self.dest.flush()?;
        tracing::debug!(name = %lib.name, structs = lib.structs.len(), "wrote GDSII library");
        Ok(())
    }

    /// Writes a struct (cell) definition, BGNSTR through ENDSTR.
    fn write_struct(&mut self, strukt: &GdsStruct) -> GdsResult<()> {
        write_fields(&mut self.dest, schema::STRUCT_SCHEMA, strukt)?;
        for elem in &strukt.elems {
            self.write_element(elem)?;
        }
        GdsRecord::empty(GdsRecordType::EndStruct).encode(&mut self.dest)
    }

    /// Writes a single element, dispatching on its kind.
    fn write_element(&mut self, elem: &GdsElement) -> GdsResult<()> {
        use GdsElement::*;
        match elem {
            GdsBoundary(boundary) => {
                self.write_one(GdsRecordType::Boundary, schema::BOUNDARY_SCHEMA, boundary)
            }
            GdsPath(path) => self.write_one(GdsRecordType::Path, schema::PATH_SCHEMA, path),
            GdsStructRef(sref) => {
                self.write_one(GdsRecordType::StructRef, schema::STRUCT_REF_SCHEMA, sref)
            }
            GdsArrayRef(aref) => {
                self.write_one(GdsRecordType::ArrayRef, schema::ARRAY_REF_SCHEMA, aref)
            }
            GdsTextElem(text) => self.write_one(GdsRecordType::Text, schema::TEXT_SCHEMA, text),
            GdsNode(node) => self.write_one(GdsRecordType::Node, schema::NODE_SCHEMA, node),
            GdsBox(boks) => self.write_one(GdsRecordType::Box, schema::BOX_SCHEMA, boks),
        }
    }

    /// Writes one element body: opening record, schema fields, closing ENDEL.
    fn write_one<E>(
        &mut self,
        open: GdsRecordType,
        fields: &[GdsField<E>],
        elem: &E,
    ) -> GdsResult<()> {
        GdsRecord::empty(open).encode(&mut self.dest)?;
        write_fields(&mut self.dest, fields, elem)?;
        GdsRecord::empty(GdsRecordType::EndElement).encode(&mut self.dest)
    }
}
