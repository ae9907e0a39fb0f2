//! The GDSII record layer.
//!
//! Frames byte streams into typed [`GdsRecord`]s and writes them back.
//! Each record is a four-byte header (a big-endian 16-bit total size, a
//! record-type byte, and a data-type byte) followed by a payload decoded
//! into one of the six GDSII scalar forms held by [`GdsData`].

use std::io::{self, Read, Write};
use std::sync::Arc;

use arcstr::ArcStr;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use num_traits::FromPrimitive;

use crate::{
    GdsAccessControl, GdsDataType, GdsDateTimes, GdsError, GdsFloat64, GdsPoint, GdsRecordType,
    GdsResult,
};

/// A GDS record header.
///
/// Decoded contents of a record's four header bytes,
/// including its record-type, data-type, and length in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GdsRecordHeader {
    rtype: GdsRecordType,
    dtype: GdsDataType,
    len: u16,
}

impl GdsRecordHeader {
    /// Reads and decodes the four header bytes from `rdr`.
    pub fn decode(rdr: &mut impl Read) -> GdsResult<Self> {
        let len = rdr.read_u16::<BigEndian>().map_err(stream_err)?;
        if len < 4 || len % 2 != 0 {
            return Err(GdsError::RecordLen(len));
        }
        let rbyte = rdr.read_u8().map_err(stream_err)?;
        let rtype = match GdsRecordType::from_u8(rbyte) {
            Some(rtype) if rtype.valid() => rtype,
            _ => return Err(GdsError::InvalidRecordType(rbyte)),
        };
        let dbyte = rdr.read_u8().map_err(stream_err)?;
        let dtype = GdsDataType::from_u8(dbyte).ok_or(GdsError::InvalidDataType(dbyte))?;
        Ok(Self { rtype, dtype, len })
    }

    /// Returns the record type.
    pub fn rtype(&self) -> GdsRecordType {
        self.rtype
    }

    /// Returns the data type.
    pub fn dtype(&self) -> GdsDataType {
        self.dtype
    }

    /// Returns the total record length in bytes, header included.
    pub fn len(&self) -> u16 {
        self.len
    }

    /// Returns whether the record carries no payload.
    pub fn is_empty(&self) -> bool {
        self.len == 4
    }
}

/// Maps premature end-of-input onto [`GdsError::EndOfStream`].
fn stream_err(err: io::Error) -> GdsError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        GdsError::EndOfStream
    } else {
        GdsError::Boxed(Arc::new(err))
    }
}

/// A decoded record payload, one variant per GDSII data type.
#[derive(Debug, Clone, PartialEq)]
pub enum GdsData {
    /// No payload.
    NoData,
    /// A 16-bit field of bits.
    BitArray(u16),
    /// Two-byte signed integers.
    I16(Vec<i16>),
    /// Four-byte signed integers.
    I32(Vec<i32>),
    /// Eight-byte GDSII reals, decoded to `f64`.
    F64(Vec<f64>),
    /// An ASCII string. Trailing NUL-padding is stripped while decoding
    /// and restored while encoding.
    Str(ArcStr),
}

impl GdsData {
    /// Returns the data type matching this payload.
    pub fn dtype(&self) -> GdsDataType {
        match self {
            GdsData::NoData => GdsDataType::NoData,
            GdsData::BitArray(_) => GdsDataType::BitArray,
            GdsData::I16(_) => GdsDataType::I16,
            GdsData::I32(_) => GdsDataType::I32,
            GdsData::F64(_) => GdsDataType::F64,
            GdsData::Str(_) => GdsDataType::Str,
        }
    }

    /// Returns the number of payload entries.
    fn size(&self) -> usize {
        match self {
            GdsData::NoData => 0,
            GdsData::BitArray(_) | GdsData::Str(_) => 1,
            GdsData::I16(vals) => vals.len(),
            GdsData::I32(vals) => vals.len(),
            GdsData::F64(vals) => vals.len(),
        }
    }

    /// Decodes a payload per the header's data type.
    fn decode(header: &GdsRecordHeader, payload: &[u8]) -> GdsResult<GdsData> {
        let plen = payload.len();
        let fail = || Err(GdsError::RecordDecode(header.rtype, header.dtype, plen as u16));
        match header.dtype {
            GdsDataType::NoData => {
                if plen != 0 {
                    return fail();
                }
                Ok(GdsData::NoData)
            }
            GdsDataType::BitArray => {
                if plen != 2 {
                    return fail();
                }
                let mut rdr = payload;
                Ok(GdsData::BitArray(rdr.read_u16::<BigEndian>()?))
            }
            GdsDataType::I16 => {
                if plen == 0 || plen % 2 != 0 {
                    return fail();
                }
                let mut rdr = payload;
                let mut vals = Vec::with_capacity(plen / 2);
                for _ in 0..plen / 2 {
                    vals.push(rdr.read_i16::<BigEndian>()?);
                }
                Ok(GdsData::I16(vals))
            }
            GdsDataType::I32 => {
                if plen == 0 || plen % 4 != 0 {
                    return fail();
                }
                let mut rdr = payload;
                let mut vals = Vec::with_capacity(plen / 4);
                for _ in 0..plen / 4 {
                    vals.push(rdr.read_i32::<BigEndian>()?);
                }
                Ok(GdsData::I32(vals))
            }
            // The four-byte real is defined by GDSII but was never used; reject it.
            GdsDataType::F32 => Err(GdsError::InvalidDataType(GdsDataType::F32 as u8)),
            GdsDataType::F64 => {
                if plen == 0 || plen % 8 != 0 {
                    return fail();
                }
                let mut rdr = payload;
                let mut vals = Vec::with_capacity(plen / 8);
                for _ in 0..plen / 8 {
                    vals.push(GdsFloat64::decode(rdr.read_u64::<BigEndian>()?));
                }
                Ok(GdsData::F64(vals))
            }
            GdsDataType::Str => {
                if plen == 0 {
                    return fail();
                }
                // Strip a single trailing NUL, present whenever the string length is odd.
                let bytes = match payload.last() {
                    Some(0) => &payload[..plen - 1],
                    _ => payload,
                };
                Ok(GdsData::Str(ArcStr::from(std::str::from_utf8(bytes)?)))
            }
        }
    }

    /// Encodes the payload to bytes, NUL-padding strings to even length.
    fn encode(&self) -> GdsResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.size() * 2);
        match self {
            GdsData::NoData => (),
            GdsData::BitArray(val) => buf.write_u16::<BigEndian>(*val)?,
            GdsData::I16(vals) => {
                for val in vals {
                    buf.write_i16::<BigEndian>(*val)?;
                }
            }
            GdsData::I32(vals) => {
                for val in vals {
                    buf.write_i32::<BigEndian>(*val)?;
                }
            }
            GdsData::F64(vals) => {
                for val in vals {
                    buf.write_u64::<BigEndian>(GdsFloat64::encode(*val)?)?;
                }
            }
            GdsData::Str(s) => {
                buf.extend_from_slice(s.as_bytes());
                if buf.len() % 2 != 0 {
                    buf.push(0);
                }
            }
        }
        Ok(buf)
    }
}

/// A GDS record: a record type plus its decoded payload.
#[derive(Debug, Clone, PartialEq)]
pub struct GdsRecord {
    rtype: GdsRecordType,
    data: GdsData,
}

impl GdsRecord {
    /// Creates a new [GdsRecord].
    pub fn new(rtype: GdsRecordType, data: GdsData) -> Self {
        Self { rtype, data }
    }

    /// Returns the record type.
    pub fn rtype(&self) -> GdsRecordType {
        self.rtype
    }

    /// Returns the decoded payload.
    pub fn data(&self) -> &GdsData {
        &self.data
    }

    /// Reads and decodes a record from `rdr`.
    pub fn decode(rdr: &mut impl Read) -> GdsResult<GdsRecord> {
        let header = GdsRecordHeader::decode(rdr)?;
        let mut payload = vec![0u8; usize::from(header.len) - 4];
        rdr.read_exact(&mut payload).map_err(stream_err)?;
        let data = GdsData::decode(&header, &payload)?;
        Ok(GdsRecord {
            rtype: header.rtype,
            data,
        })
    }

    /// Encodes the record and writes it to `wr`.
    ///
    /// Fails with [`GdsError::Oversize`] if the encoded record exceeds the
    /// format's 16-bit length field.
    pub fn encode(&self, wr: &mut impl Write) -> GdsResult<()> {
        let payload = self.data.encode()?;
        let total = payload.len() + 4;
        if total > usize::from(u16::MAX) {
            return Err(GdsError::Oversize(total));
        }
        wr.write_u16::<BigEndian>(total as u16)?;
        wr.write_u8(self.rtype as u8)?;
        wr.write_u8(self.data.dtype() as u8)?;
        wr.write_all(&payload)?;
        Ok(())
    }

    /// Checks the record is of type `expected`, failing with
    /// [`GdsError::MissingRecord`] otherwise.
    pub fn check_tag(&self, expected: GdsRecordType) -> GdsResult<()> {
        if self.rtype != expected {
            return Err(GdsError::MissingRecord {
                expected,
                found: self.rtype,
            });
        }
        Ok(())
    }

    /// Checks the payload holds exactly `expected` entries, failing with
    /// [`GdsError::DataSize`] otherwise.
    pub fn check_size(&self, expected: usize) -> GdsResult<()> {
        let found = self.data.size();
        if found != expected {
            return Err(GdsError::DataSize {
                rtype: self.rtype,
                expected,
                found,
            });
        }
        Ok(())
    }

    /// Builds a context-free shape error for this record.
    fn bad_shape(&self, msg: impl Into<String>) -> GdsError {
        GdsError::BadShape {
            ctx: None,
            rtype: self.rtype,
            msg: msg.into(),
        }
    }

    /// Builds a payload-type mismatch error for this record.
    fn wrong_type(&self) -> GdsError {
        GdsError::RecordDecode(self.rtype, self.data.dtype(), self.data.size() as u16)
    }

    /// Returns the payload's two-byte integers.
    pub(crate) fn i16s(&self) -> GdsResult<&[i16]> {
        match &self.data {
            GdsData::I16(vals) => Ok(vals),
            _ => Err(self.wrong_type()),
        }
    }

    /// Returns the payload's four-byte integers.
    pub(crate) fn i32s(&self) -> GdsResult<&[i32]> {
        match &self.data {
            GdsData::I32(vals) => Ok(vals),
            _ => Err(self.wrong_type()),
        }
    }

    /// Returns the payload's reals.
    pub(crate) fn f64s(&self) -> GdsResult<&[f64]> {
        match &self.data {
            GdsData::F64(vals) => Ok(vals),
            _ => Err(self.wrong_type()),
        }
    }

    /// Returns the payload's single two-byte integer.
    pub(crate) fn single_i16(&self) -> GdsResult<i16> {
        self.check_size(1)?;
        Ok(self.i16s()?[0])
    }

    /// Returns the payload's single four-byte integer.
    pub(crate) fn single_i32(&self) -> GdsResult<i32> {
        self.check_size(1)?;
        Ok(self.i32s()?[0])
    }

    /// Returns the payload's single real.
    pub(crate) fn single_f64(&self) -> GdsResult<f64> {
        self.check_size(1)?;
        Ok(self.f64s()?[0])
    }

    /// Returns the payload's bit-array.
    pub(crate) fn bits(&self) -> GdsResult<u16> {
        match &self.data {
            GdsData::BitArray(val) => Ok(*val),
            _ => Err(self.wrong_type()),
        }
    }

    /// Returns the payload's string.
    pub(crate) fn string(&self) -> GdsResult<&ArcStr> {
        match &self.data {
            GdsData::Str(s) => Ok(s),
            _ => Err(self.wrong_type()),
        }
    }

    /// Interprets an `XY` payload as a list of (x, y) points.
    pub fn points(&self) -> GdsResult<Vec<GdsPoint>> {
        let vals = self.i32s()?;
        if vals.is_empty() || vals.len() % 2 != 0 {
            return Err(self.bad_shape(format!(
                "XY data holds {} coordinates; a nonzero even count is required",
                vals.len()
            )));
        }
        GdsPoint::parse_vec(vals)
    }

    /// Interprets a `BGNLIB`/`BGNSTR` payload as modification and access times.
    pub fn times(&self) -> GdsResult<GdsDateTimes> {
        let vals = self.i16s()?;
        if vals.len() != 12 {
            return Err(self.bad_shape(format!(
                "timestamp data holds {} values; exactly twelve are required",
                vals.len()
            )));
        }
        Ok(GdsDateTimes {
            modified: parse_datetime(&vals[..6])?,
            accessed: parse_datetime(&vals[6..])?,
        })
    }

    /// Interprets a `LIBSECUR` payload as a list of access-control triples.
    pub fn acls(&self) -> GdsResult<Vec<GdsAccessControl>> {
        let vals = self.i16s()?;
        if vals.is_empty() || vals.len() % 3 != 0 {
            return Err(self.bad_shape(format!(
                "access-control data holds {} values; a nonzero multiple of three is required",
                vals.len()
            )));
        }
        Ok(vals
            .chunks_exact(3)
            .map(|c| GdsAccessControl {
                group: c[0],
                user: c[1],
                rights: c[2],
            })
            .collect())
    }

    /// Creates a payload-free record.
    pub(crate) fn empty(rtype: GdsRecordType) -> Self {
        Self::new(rtype, GdsData::NoData)
    }

    /// Creates a single-value INT2 record.
    pub(crate) fn int2(rtype: GdsRecordType, val: i16) -> Self {
        Self::new(rtype, GdsData::I16(vec![val]))
    }

    /// Creates a multi-value INT2 record.
    pub(crate) fn int2s(rtype: GdsRecordType, vals: Vec<i16>) -> Self {
        Self::new(rtype, GdsData::I16(vals))
    }

    /// Creates a single-value INT4 record.
    pub(crate) fn int4(rtype: GdsRecordType, val: i32) -> Self {
        Self::new(rtype, GdsData::I32(vec![val]))
    }

    /// Creates a multi-value INT4 record.
    pub(crate) fn int4s(rtype: GdsRecordType, vals: Vec<i32>) -> Self {
        Self::new(rtype, GdsData::I32(vals))
    }

    /// Creates a REAL8 record.
    pub(crate) fn real8s(rtype: GdsRecordType, vals: Vec<f64>) -> Self {
        Self::new(rtype, GdsData::F64(vals))
    }

    /// Creates a BITARRAY record.
    pub(crate) fn bitarray(rtype: GdsRecordType, bits: u16) -> Self {
        Self::new(rtype, GdsData::BitArray(bits))
    }

    /// Creates an ASCII record.
    pub(crate) fn ascii(rtype: GdsRecordType, s: ArcStr) -> Self {
        Self::new(rtype, GdsData::Str(s))
    }
}

/// Converts six `BGNLIB`/`BGNSTR` fields into a calendar time.
///
/// GDSII years are 1900-offset. Field combinations chrono cannot represent
/// (month zero and the like) fail with [`GdsError::InvalidDate`].
fn parse_datetime(d: &[i16]) -> GdsResult<NaiveDateTime> {
    NaiveDate::from_ymd_opt(i32::from(d[0]) + 1900, d[1] as u32, d[2] as u32)
        .and_then(|date| date.and_hms_opt(d[3] as u32, d[4] as u32, d[5] as u32))
        .ok_or_else(|| GdsError::InvalidDate(d.to_vec()))
}

impl GdsDateTimes {
    /// Flattens to the twelve 16-bit fields of a `BGNLIB`/`BGNSTR` payload.
    pub(crate) fn flatten(&self) -> Vec<i16> {
        let mut vals = Vec::with_capacity(12);
        for dt in [&self.modified, &self.accessed] {
            vals.push((dt.year() - 1900) as i16);
            vals.push(dt.month() as i16);
            vals.push(dt.day() as i16);
            vals.push(dt.hour() as i16);
            vals.push(dt.minute() as i16);
            vals.push(dt.second() as i16);
        }
        vals
    }
}

/// An iterator over the records of a GDSII byte stream.
///
/// Yields each parsed record up to and including `ENDLIB`, then ends.
/// A decoding error also ends the iteration, after the error is yielded.
pub struct GdsRecords<R: Read> {
    rdr: R,
    done: bool,
}

impl<R: Read> GdsRecords<R> {
    /// Creates a record iterator over `rdr`.
    pub fn new(rdr: R) -> Self {
        Self { rdr, done: false }
    }
}

impl<R: Read> Iterator for GdsRecords<R> {
    type Item = GdsResult<GdsRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let rec = GdsRecord::decode(&mut self.rdr);
        match &rec {
            Ok(rec) if rec.rtype() == GdsRecordType::EndLib => self.done = true,
            Err(_) => self.done = true,
            _ => (),
        }
        Some(rec)
    }
}
