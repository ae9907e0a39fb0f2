//! GDSII parsing.
//!
//! A [`GdsReaderIter`] supplies one record of lookahead over the framed
//! stream; [`GdsParser`] drives the per-entity schemas of [`crate::schema`]
//! against it, materialising the [`GdsLibrary`] tree.

use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::Path;

use crate::schema::{self, GdsField, GdsFieldKind};
use crate::{
    GdsContext, GdsElemFlags, GdsElement, GdsError, GdsFormatType, GdsLibrary, GdsPlex, GdsPoint,
    GdsPresentation, GdsProperty, GdsRecord, GdsRecordType, GdsResult, GdsStrClass, GdsStrans,
    GdsStruct, GdsUnits,
};

/// A single-lookahead iterator over a GDSII record stream.
///
/// Grammar code inspects the cursor via [`peek`](Self::peek) and consumes it
/// via [`take`](Self::take); the cursor is filled lazily, so the reader never
/// buffers more than one record past the consumed position.
pub(crate) struct GdsReaderIter<R: Read> {
    rdr: R,
    cur: Option<GdsRecord>,
}

impl<R: Read> GdsReaderIter<R> {
    fn new(rdr: R) -> Self {
        Self { rdr, cur: None }
    }

    /// Returns the record type at the read position, fetching the record on
    /// first access. One record type of lookahead decides every branch of
    /// the grammar.
    fn peek(&mut self) -> GdsResult<GdsRecordType> {
        match &self.cur {
            Some(rec) => Ok(rec.rtype()),
            None => {
                let rec = GdsRecord::decode(&mut self.rdr)?;
                let rtype = rec.rtype();
                self.cur = Some(rec);
                Ok(rtype)
            }
        }
    }

    /// Consumes and returns the record at the read position.
    fn take(&mut self) -> GdsResult<GdsRecord> {
        match self.cur.take() {
            Some(rec) => Ok(rec),
            None => GdsRecord::decode(&mut self.rdr),
        }
    }

    /// Consumes and returns the record at the read position if it is of type `rtype`.
    fn take_if(&mut self, rtype: GdsRecordType) -> GdsResult<Option<GdsRecord>> {
        if self.peek()? == rtype {
            self.take().map(Some)
        } else {
            Ok(None)
        }
    }
}

/// Builds a [`GdsError::BadShape`] in context `ctx`.
fn shape_err(ctx: GdsContext, rtype: GdsRecordType, msg: impl Into<String>) -> GdsError {
    GdsError::BadShape {
        ctx: Some(ctx),
        rtype,
        msg: msg.into(),
    }
}

/// Reads entity `target`'s fields from `it`, in schema order.
fn read_fields<R: Read, E>(
    it: &mut GdsReaderIter<R>,
    ctx: GdsContext,
    fields: &[GdsField<E>],
    target: &mut E,
) -> GdsResult<()> {
    for field in fields {
        read_field(it, ctx, field, target)?;
    }
    Ok(())
}

/// Reads a single schema field, consuming its record(s) where present.
fn read_field<R: Read, E>(
    it: &mut GdsReaderIter<R>,
    ctx: GdsContext,
    field: &GdsField<E>,
    target: &mut E,
) -> GdsResult<()> {
    match &field.kind {
        GdsFieldKind::I16(acc) => {
            let rec = it.take()?;
            rec.check_tag(field.rtype)?;
            *(acc.get_mut)(target) = rec.single_i16()?;
        }
        GdsFieldKind::OptI16(acc) => {
            if let Some(rec) = it.take_if(field.rtype)? {
                *(acc.get_mut)(target) = Some(rec.single_i16()?);
            }
        }
        GdsFieldKind::OptI32(acc) => {
            if let Some(rec) = it.take_if(field.rtype)? {
                *(acc.get_mut)(target) = Some(rec.single_i32()?);
            }
        }
        GdsFieldKind::Plex(acc) => {
            if let Some(rec) = it.take_if(field.rtype)? {
                *(acc.get_mut)(target) = Some(GdsPlex(rec.single_i32()?));
            }
        }
        GdsFieldKind::ElemFlags(acc) => {
            if let Some(rec) = it.take_if(field.rtype)? {
                let bits = rec.bits()?;
                *(acc.get_mut)(target) = Some(GdsElemFlags::new((bits >> 8) as u8, bits as u8));
            }
        }
        GdsFieldKind::Presentation(acc) => {
            if let Some(rec) = it.take_if(field.rtype)? {
                let bits = rec.bits()?;
                *(acc.get_mut)(target) = Some(GdsPresentation::new((bits >> 8) as u8, bits as u8));
            }
        }
        GdsFieldKind::StrClass(acc) => {
            if let Some(rec) = it.take_if(field.rtype)? {
                let bits = rec.bits()?;
                *(acc.get_mut)(target) = Some(GdsStrClass::new((bits >> 8) as u8, bits as u8));
            }
        }
        GdsFieldKind::Str(acc) => {
            let rec = it.take()?;
            rec.check_tag(field.rtype)?;
            *(acc.get_mut)(target) = rec.string()?.clone();
        }
        GdsFieldKind::OptStr(acc) => {
            if let Some(rec) = it.take_if(field.rtype)? {
                *(acc.get_mut)(target) = Some(rec.string()?.clone());
            }
        }
        GdsFieldKind::Xy { acc, min } => {
            let rec = it.take()?;
            rec.check_tag(field.rtype)?;
            let pts = rec.points().map_err(|e| e.with_ctx(ctx))?;
            if pts.len() < *min {
                return Err(shape_err(
                    ctx,
                    rec.rtype(),
                    format!("XY holds {} points; at least {min} are required", pts.len()),
                ));
            }
            *(acc.get_mut)(target) = pts;
        }
        GdsFieldKind::XyClosed { acc, min } => {
            let rec = it.take()?;
            rec.check_tag(field.rtype)?;
            let mut pts = rec.points().map_err(|e| e.with_ctx(ctx))?;
            if pts.len() < *min {
                return Err(shape_err(
                    ctx,
                    rec.rtype(),
                    format!("XY holds {} points; at least {min} are required", pts.len()),
                ));
            }
            if pts.first() != pts.last() {
                return Err(shape_err(
                    ctx,
                    rec.rtype(),
                    "polygon is not closed: the last point must repeat the first",
                ));
            }
            // Canonicalise to the open polygon.
            pts.pop();
            *(acc.get_mut)(target) = pts;
        }
        GdsFieldKind::XyPoint(acc) => {
            let rec = it.take()?;
            rec.check_tag(field.rtype)?;
            let mut pts = rec.points().map_err(|e| e.with_ctx(ctx))?;
            if pts.len() != 1 {
                return Err(shape_err(
                    ctx,
                    rec.rtype(),
                    format!("XY holds {} points; exactly one is required", pts.len()),
                ));
            }
            if let Some(pt) = pts.pop() {
                *(acc.get_mut)(target) = pt;
            }
        }
        GdsFieldKind::XyArray(acc) => {
            let rec = it.take()?;
            rec.check_tag(field.rtype)?;
            let pts = rec.points().map_err(|e| e.with_ctx(ctx))?;
            let arr: [GdsPoint; 3] = pts.try_into().map_err(|pts: Vec<GdsPoint>| {
                shape_err(
                    ctx,
                    field.rtype,
                    format!("XY holds {} points; exactly three are required", pts.len()),
                )
            })?;
            *(acc.get_mut)(target) = arr;
        }
        GdsFieldKind::XyBox(acc) => {
            let rec = it.take()?;
            rec.check_tag(field.rtype)?;
            let mut pts = rec.points().map_err(|e| e.with_ctx(ctx))?;
            if pts.len() != 5 {
                return Err(shape_err(
                    ctx,
                    rec.rtype(),
                    format!("XY holds {} points; exactly five are required", pts.len()),
                ));
            }
            if pts.first() != pts.last() {
                return Err(shape_err(
                    ctx,
                    rec.rtype(),
                    "box outline is not closed: the last point must repeat the first",
                ));
            }
            pts.pop();
            let arr: [GdsPoint; 4] = pts
                .try_into()
                .map_err(|_| shape_err(ctx, field.rtype, "box outline has the wrong point count"))?;
            *(acc.get_mut)(target) = arr;
        }
        GdsFieldKind::ColRow { cols, rows } => {
            let rec = it.take()?;
            rec.check_tag(field.rtype)?;
            rec.check_size(2)?;
            let vals = rec.i16s()?;
            *(cols.get_mut)(target) = vals[0];
            *(rows.get_mut)(target) = vals[1];
        }
        GdsFieldKind::Units(acc) => {
            let rec = it.take()?;
            rec.check_tag(field.rtype)?;
            rec.check_size(2)?;
            let vals = rec.f64s()?;
            *(acc.get_mut)(target) = GdsUnits::new(vals[0], vals[1]);
        }
        GdsFieldKind::Dates(acc) => {
            let rec = it.take()?;
            rec.check_tag(field.rtype)?;
            *(acc.get_mut)(target) = rec.times().map_err(|e| e.with_ctx(ctx))?;
        }
        GdsFieldKind::Properties(acc) => {
            while let Some(rec) = it.take_if(GdsRecordType::PropAttr)? {
                let attr = rec.single_i16()?;
                let rec = it.take()?;
                rec.check_tag(GdsRecordType::PropValue)?;
                (acc.get_mut)(target).push(GdsProperty {
                    attr,
                    value: rec.string()?.clone(),
                });
            }
        }
        GdsFieldKind::Strans(acc) => {
            if let Some(rec) = it.take_if(field.rtype)? {
                let bits = rec.bits()?;
                let mut strans = GdsStrans {
                    reflected: bits & 0x8000 != 0,
                    abs_mag: bits & 0x0004 != 0,
                    abs_angle: bits & 0x0002 != 0,
                    mag: None,
                    angle: None,
                };
                if let Some(rec) = it.take_if(GdsRecordType::Mag)? {
                    strans.mag = Some(rec.single_f64()?);
                }
                if let Some(rec) = it.take_if(GdsRecordType::Angle)? {
                    strans.angle = Some(rec.single_f64()?);
                }
                *(acc.get_mut)(target) = Some(strans);
            }
        }
        GdsFieldKind::Format(acc) => {
            if let Some(rec) = it.take_if(field.rtype)? {
                let code = rec.single_i16()?;
                let format = if code == 1 || code == 3 {
                    // Filtered streams carry their mask list, closed by ENDMASKS.
                    let mut masks = Vec::new();
                    while let Some(rec) = it.take_if(GdsRecordType::Mask)? {
                        masks.push(rec.string()?.clone());
                    }
                    let rec = it.take()?;
                    rec.check_tag(GdsRecordType::EndMasks)?;
                    GdsFormatType::Filtered(code, masks)
                } else {
                    GdsFormatType::Archive(code)
                };
                *(acc.get_mut)(target) = Some(format);
            }
        }
        GdsFieldKind::Acl(acc) => {
            if let Some(rec) = it.take_if(field.rtype)? {
                *(acc.get_mut)(target) = rec.acls().map_err(|e| e.with_ctx(ctx))?;
            }
        }
    }
    Ok(())
}

/// A parser for GDSII byte streams.
///
/// Consumes records from an underlying reader and materialises the
/// [`GdsLibrary`] tree. Parsing is strictly sequential and aborts on the
/// first grammar violation.
pub(crate) struct GdsParser<R: Read> {
    it: GdsReaderIter<R>,
}

impl GdsParser<BufReader<File>> {
    /// Opens the GDSII file at `fname` for parsing.
    pub(crate) fn open(fname: impl AsRef<Path>) -> GdsResult<Self> {
        Ok(Self::new(BufReader::new(File::open(fname)?)))
    }
}

impl GdsParser<Cursor<Vec<u8>>> {
    /// Creates a parser over in-memory bytes.
    pub(crate) fn from_bytes(bytes: Vec<u8>) -> GdsResult<Self> {
        Ok(Self::new(Cursor::new(bytes)))
    }
}

impl<R: Read> GdsParser<R> {
    /// Creates a parser over reader `rdr`.
    pub(crate) fn new(rdr: R) -> Self {
        Self {
            it: GdsReaderIter::new(rdr),
        }
    }

    /// Parses a full library, from HEADER through ENDLIB.
    ///
    /// Nothing past ENDLIB is read; trailing padding is left untouched.
    pub(crate) fn parse_lib(mut self) -> GdsResult<GdsLibrary> {
        let mut lib = GdsLibrary::default();
        read_fields(
            &mut self.it,
            GdsContext::Library,
            schema::LIBRARY_SCHEMA,
            &mut lib,
        )?;
        loop {
            match self.it.peek()? {
                GdsRecordType::BgnStruct => {
                    let strukt = self.parse_struct()?;
                    lib.structs.push(strukt);
                }
                GdsRecordType::EndLib => {
                    self.it.take()?;
                    break;
                }
                found => {
                    return Err(GdsError::UnexpectedRecord {
                        ctx: GdsContext::Library,
                        found,
                    });
                }
            }
        }
        tracing::debug!(name = %lib.name, structs = lib.structs.len(), "parsed GDSII library");
        Ok(lib)
    }

    /// Parses a struct (cell) definition, from BGNSTR through ENDSTR.
    fn parse_struct(&mut self) -> GdsResult<GdsStruct> {
        let mut strukt = GdsStruct::default();
        read_fields(
            &mut self.it,
            GdsContext::Struct,
            schema::STRUCT_SCHEMA,
            &mut strukt,
        )?;
        loop {
            if self.it.peek()? == GdsRecordType::EndStruct {
                self.it.take()?;
                break;
            }
            let elem = self.parse_element()?;
            strukt.elems.push(elem);
        }
        Ok(strukt)
    }

    /// Parses a single element, dispatching on its opening record.
    fn parse_element(&mut self) -> GdsResult<GdsElement> {
        let elem = match self.it.peek()? {
            GdsRecordType::Boundary => {
                GdsElement::GdsBoundary(self.parse_one(GdsContext::Boundary, schema::BOUNDARY_SCHEMA)?)
            }
            GdsRecordType::Path => {
                GdsElement::GdsPath(self.parse_one(GdsContext::Path, schema::PATH_SCHEMA)?)
            }
            GdsRecordType::StructRef => GdsElement::GdsStructRef(
                self.parse_one(GdsContext::StructRef, schema::STRUCT_REF_SCHEMA)?,
            ),
            GdsRecordType::ArrayRef => GdsElement::GdsArrayRef(
                self.parse_one(GdsContext::ArrayRef, schema::ARRAY_REF_SCHEMA)?,
            ),
            GdsRecordType::Text => {
                GdsElement::GdsTextElem(self.parse_one(GdsContext::Text, schema::TEXT_SCHEMA)?)
            }
            GdsRecordType::Node => {
                GdsElement::GdsNode(self.parse_one(GdsContext::Node, schema::NODE_SCHEMA)?)
            }
            GdsRecordType::Box => {
                GdsElement::GdsBox(self.parse_one(GdsContext::Box, schema::BOX_SCHEMA)?)
            }
            found => {
                return Err(GdsError::UnexpectedRecord {
                    ctx: GdsContext::Struct,
                    found,
                });
            }
        };
        Ok(elem)
    }

    /// Parses one element body: past the opening record, through the schema,
    /// and past the closing ENDEL.
    fn parse_one<E: Default>(&mut self, ctx: GdsContext, fields: &[GdsField<E>]) -> GdsResult<E> {
        self.it.take()?;
        let mut elem = E::default();
        read_fields(&mut self.it, ctx, fields, &mut elem)?;
        let rec = self.it.take()?;
        rec.check_tag(GdsRecordType::EndElement)?;
        Ok(elem)
    }
}
