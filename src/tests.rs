//! Unit tests, most covering a write-read (or read-write) round trip.

use super::*;
use chrono::{NaiveDate, NaiveDateTime};

/// Creates a [NaiveDateTime] from its calendar fields.
fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, mo, d)
        .unwrap()
        .and_hms_opt(h, mi, s)
        .unwrap()
}

/// Frames `payload` into raw record bytes.
fn record_bytes(rtype: u8, dtype: u8, payload: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(payload.len() + 4);
    bytes.extend(((payload.len() + 4) as u16).to_be_bytes());
    bytes.push(rtype);
    bytes.push(dtype);
    bytes.extend_from_slice(payload);
    bytes
}

fn int2_payload(vals: &[i16]) -> Vec<u8> {
    vals.iter().flat_map(|v| v.to_be_bytes()).collect()
}

fn int4_payload(vals: &[i32]) -> Vec<u8> {
    vals.iter().flat_map(|v| v.to_be_bytes()).collect()
}

/// The timestamps used by the hand-built streams: 2000-01-01, twice over.
const Y2K: [i16; 12] = [100, 1, 1, 0, 0, 0, 100, 1, 1, 0, 0, 0];

/// A minimal library header: HEADER(5), BGNLIB, LIBNAME(b"LIB"), UNITS(1e-3, 1e-9).
fn lib_header_bytes() -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend(record_bytes(0x00, 0x02, &int2_payload(&[5])));
    bytes.extend(record_bytes(0x01, 0x02, &int2_payload(&Y2K)));
    bytes.extend(record_bytes(0x02, 0x06, b"LIB\0"));
    let mut units = Vec::new();
    units.extend(0x3E4189374BC6A7F0u64.to_be_bytes()); // 1e-3
    units.extend(0x3944B82FA09B5A54u64.to_be_bytes()); // 1e-9
    bytes.extend(record_bytes(0x03, 0x05, &units));
    bytes
}

/// Wraps element records (ENDEL included) into a one-struct stream.
fn stream_with_element(body: &[u8]) -> Vec<u8> {
    let mut bytes = lib_header_bytes();
    bytes.extend(record_bytes(0x05, 0x02, &int2_payload(&Y2K))); // BGNSTR
    bytes.extend(record_bytes(0x06, 0x06, b"TOP\0")); // STRNAME
    bytes.extend_from_slice(body);
    bytes.extend(record_bytes(0x07, 0x00, &[])); // ENDSTR
    bytes.extend(record_bytes(0x04, 0x00, &[])); // ENDLIB
    bytes
}

/// Builds a library exercising every element kind and every optional header record.
fn sample_lib() -> GdsLibrary {
    let dates = GdsDateTimes {
        modified: dt(2000, 1, 1, 0, 0, 0),
        accessed: dt(2001, 6, 15, 12, 30, 45),
    };
    let boundary = GdsBoundary {
        layer: 1,
        datatype: 0,
        xy: GdsPoint::vec(&[(0, 0), (10, 0), (10, 10), (0, 10)]),
        elflags: Some(GdsElemFlags::new(0x00, 0x01)),
        plex: Some(GdsPlex(7)),
        properties: vec![
            GdsProperty {
                attr: 1,
                value: "first".into(),
            },
            GdsProperty {
                attr: 1,
                value: "second".into(),
            },
        ],
    };
    let path = GdsPath {
        layer: 2,
        datatype: 1,
        xy: GdsPoint::vec(&[(0, 0), (100, 0), (100, 200)]),
        width: Some(50),
        path_type: Some(4),
        begin_extn: Some(5),
        end_extn: Some(-5),
        ..Default::default()
    };
    let sref = GdsStructRef {
        name: "LEAF".into(),
        xy: GdsPoint::new(25, 25),
        strans: Some(GdsStrans {
            mag: Some(0.5),
            angle: Some(45.0),
            ..Default::default()
        }),
        ..Default::default()
    };
    let aref = GdsArrayRef {
        name: "LEAF".into(),
        xy: [
            GdsPoint::new(0, 0),
            GdsPoint::new(400, 0),
            GdsPoint::new(0, 200),
        ],
        cols: 4,
        rows: 2,
        strans: Some(GdsStrans {
            reflected: true,
            ..Default::default()
        }),
        ..Default::default()
    };
    let text = GdsTextElem {
        string: "net_vdd".into(),
        layer: 5,
        texttype: 0,
        xy: GdsPoint::new(3, 4),
        presentation: Some(GdsPresentation::new(0x00, 0x12)),
        path_type: Some(1),
        width: Some(10),
        strans: Some(GdsStrans {
            reflected: true,
            mag: Some(2.0),
            angle: Some(90.0),
            ..Default::default()
        }),
        ..Default::default()
    };
    let node = GdsNode {
        layer: 3,
        nodetype: 1,
        xy: GdsPoint::vec(&[(1, 2), (3, 4)]),
        ..Default::default()
    };
    let boks = GdsBox {
        layer: 4,
        boxtype: 0,
        xy: [
            GdsPoint::new(0, 0),
            GdsPoint::new(0, 5),
            GdsPoint::new(5, 5),
            GdsPoint::new(5, 0),
        ],
        ..Default::default()
    };
    let mut top = GdsStruct::new("TOP");
    top.dates = dates.clone();
    top.strclass = Some(GdsStrClass::new(0x00, 0x02));
    top.elems = vec![
        boundary.into(),
        path.into(),
        sref.into(),
        aref.into(),
        text.into(),
        node.into(),
        boks.into(),
    ];
    let mut leaf = GdsStruct::new("LEAF");
    leaf.dates = dates.clone();
    GdsLibrary {
        name: "SAMPLE".into(),
        version: 5,
        dates,
        units: GdsUnits::new(1e-3, 1e-9),
        structs: vec![top, leaf],
        libdirsize: Some(120),
        srfname: Some("sticky.srf".into()),
        libsecur: vec![
            GdsAccessControl {
                group: 1,
                user: 2,
                rights: 7,
            },
            GdsAccessControl {
                group: 1,
                user: 3,
                rights: 4,
            },
        ],
        reflibs: Some("reflib1".into()),
        fonts: Some("font0".into()),
        attrtable: Some("attrs.tbl".into()),
        generations: Some(3),
        format_type: Some(GdsFormatType::Archive(0)),
    }
}

fn encode_lib(lib: &GdsLibrary) -> Vec<u8> {
    let mut bytes = Vec::new();
    lib.write(&mut bytes).unwrap();
    bytes
}

#[test]
fn empty_library_bytes() {
    // Scenario: version 5, name LIB, units (1e-3, 1e-9), Y2K timestamps, no structs.
    let lib = GdsLibrary {
        name: "LIB".into(),
        version: 5,
        dates: GdsDateTimes {
            modified: dt(2000, 1, 1, 0, 0, 0),
            accessed: dt(2000, 1, 1, 0, 0, 0),
        },
        units: GdsUnits::new(1e-3, 1e-9),
        ..Default::default()
    };
    let mut expected = lib_header_bytes();
    expected.extend(record_bytes(0x04, 0x00, &[])); // ENDLIB
    assert_eq!(encode_lib(&lib), expected);
}

#[test]
fn real8_known_encodings() {
    assert_eq!(GdsFloat64::encode(0.0).unwrap(), 0x0000_0000_0000_0000);
    assert_eq!(GdsFloat64::encode(1.0).unwrap(), 0x4110_0000_0000_0000);
    assert_eq!(GdsFloat64::encode(-2.0).unwrap(), 0xC120_0000_0000_0000);
    assert_eq!(GdsFloat64::encode(0.5).unwrap(), 0x4080_0000_0000_0000);
    assert_eq!(GdsFloat64::encode(1e-3).unwrap(), 0x3E41_8937_4BC6_A7F0);
    assert_eq!(GdsFloat64::encode(1e-9).unwrap(), 0x3944_B82F_A09B_5A54);
}

#[test]
fn real8_decodes_zero_forms() {
    assert_eq!(GdsFloat64::decode(0x0000_0000_0000_0000), 0.0);
    // Negative and denormalised-looking encodings of zero also yield zero.
    assert_eq!(GdsFloat64::decode(0x8000_0000_0000_0000), 0.0);
    assert_eq!(GdsFloat64::decode(0xFF00_0000_0000_0000), 0.0);
}

#[test]
fn real8_round_trips_exact() {
    for val in [0.0, 1.0, -1.0, 0.5, -0.5, 1e-9, -1e-9, 2.0, 1e-3] {
        let enc = GdsFloat64::encode(val).unwrap();
        assert_eq!(GdsFloat64::decode(enc), val);
    }
}

#[test]
fn real8_round_trips_close() {
    for val in [123.456, std::f64::consts::PI, 6.02214076e23, -9.8765e-12] {
        let enc = GdsFloat64::encode(val).unwrap();
        let dec = GdsFloat64::decode(enc);
        assert!((dec - val).abs() <= val.abs() * 1e-14);
    }
}

#[test]
fn real8_overflow_and_underflow() {
    // Largest GDSII real is just above 7.2e75.
    assert!(matches!(
        GdsFloat64::encode(1e76),
        Err(GdsError::RealOverflow(_))
    ));
    assert!(matches!(
        GdsFloat64::encode(f64::MAX),
        Err(GdsError::RealOverflow(_))
    ));
    // Values below the subnormal range flush to zero.
    assert_eq!(GdsFloat64::encode(1e-100).unwrap(), 0);
    // Values in the subnormal range keep most of their precision.
    let enc = GdsFloat64::encode(1e-80).unwrap();
    assert_ne!(enc, 0);
    let dec = GdsFloat64::decode(enc);
    assert!((dec - 1e-80).abs() <= 1e-80 * 1e-12);
}

#[test]
fn points_parsing() {
    let bytes = record_bytes(0x10, 0x03, &int4_payload(&[0, 1, 2, 3, 4, 5]));
    let rec = GdsRecord::decode(&mut &bytes[..]).unwrap();
    assert_eq!(rec.rtype(), GdsRecordType::Xy);
    assert_eq!(
        rec.points().unwrap(),
        GdsPoint::vec(&[(0, 1), (2, 3), (4, 5)])
    );
}

#[test]
fn times_parsing() {
    let bytes = record_bytes(
        0x01,
        0x02,
        &int2_payload(&[100, 1, 1, 1, 2, 3, 110, 8, 14, 21, 10, 35]),
    );
    let rec = GdsRecord::decode(&mut &bytes[..]).unwrap();
    let times = rec.times().unwrap();
    assert_eq!(times.modified, dt(2000, 1, 1, 1, 2, 3));
    assert_eq!(times.accessed, dt(2010, 8, 14, 21, 10, 35));
}

#[test]
fn invalid_date_rejected() {
    // Month zero is not a representable calendar time.
    let bytes = record_bytes(
        0x01,
        0x02,
        &int2_payload(&[100, 0, 1, 0, 0, 0, 100, 1, 1, 0, 0, 0]),
    );
    let rec = GdsRecord::decode(&mut &bytes[..]).unwrap();
    assert!(matches!(rec.times(), Err(GdsError::InvalidDate(_))));
}

#[test]
fn boundary_closure() {
    // A four-point square emits five points on the wire, closed.
    let lib = {
        let mut lib = GdsLibrary::new("LIB");
        let mut top = GdsStruct::new("TOP");
        top.elems.push(
            GdsBoundary {
                layer: 1,
                datatype: 0,
                xy: GdsPoint::vec(&[(0, 0), (10, 0), (10, 10), (0, 10)]),
                ..Default::default()
            }
            .into(),
        );
        lib.structs.push(top);
        lib
    };
    let bytes = encode_lib(&lib);

    let xy = GdsRecords::new(&bytes[..])
        .map(|rec| rec.unwrap())
        .find(|rec| rec.rtype() == GdsRecordType::Xy)
        .unwrap();
    let pts = xy.points().unwrap();
    assert_eq!(pts.len(), 5);
    assert_eq!(pts.first(), pts.last());

    // And decoding restores the original four points.
    let lib2 = GdsLibrary::from_bytes(bytes).unwrap();
    match &lib2.structs[0].elems[0] {
        GdsElement::GdsBoundary(b) => {
            assert_eq!(b.xy, GdsPoint::vec(&[(0, 0), (10, 0), (10, 10), (0, 10)]))
        }
        other => panic!("expected a boundary, got {other:?}"),
    }
}

#[test]
fn format_and_masks_round_trip() {
    let mut lib = GdsLibrary::new("FILTERED");
    lib.format_type = Some(GdsFormatType::Filtered(
        1,
        vec!["LAYER 1-2".into(), "LAYER 5".into()],
    ));
    let bytes = encode_lib(&lib);

    // The header carries FORMAT, both MASKs, and ENDMASKS, in order.
    let rtypes: Vec<GdsRecordType> = GdsRecords::new(&bytes[..])
        .map(|rec| rec.unwrap().rtype())
        .collect();
    let fmt = rtypes
        .iter()
        .position(|&t| t == GdsRecordType::Format)
        .unwrap();
    assert_eq!(
        &rtypes[fmt..fmt + 4],
        &[
            GdsRecordType::Format,
            GdsRecordType::Mask,
            GdsRecordType::Mask,
            GdsRecordType::EndMasks,
        ]
    );

    let lib2 = GdsLibrary::from_bytes(bytes).unwrap();
    assert_eq!(lib, lib2);
}

#[test]
fn property_order_and_duplicates() {
    let mut lib = GdsLibrary::new("PROPS");
    let mut top = GdsStruct::new("TOP");
    let props = vec![
        GdsProperty {
            attr: 2,
            value: "b".into(),
        },
        GdsProperty {
            attr: 1,
            value: "a".into(),
        },
        GdsProperty {
            attr: 2,
            value: "b2".into(),
        },
        GdsProperty {
            attr: 2,
            value: "b".into(),
        },
    ];
    top.elems.push(
        GdsBoundary {
            layer: 1,
            datatype: 0,
            xy: GdsPoint::vec(&[(0, 0), (1, 0), (1, 1)]),
            properties: props.clone(),
            ..Default::default()
        }
        .into(),
    );
    lib.structs.push(top);

    let lib2 = GdsLibrary::from_bytes(encode_lib(&lib)).unwrap();
    match &lib2.structs[0].elems[0] {
        GdsElement::GdsBoundary(b) => assert_eq!(b.properties, props),
        other => panic!("expected a boundary, got {other:?}"),
    }
}

#[test]
fn bad_record_lengths() {
    // Odd total size.
    let bytes = [0x00, 0x05, 0x00, 0x02, 0x00];
    assert!(matches!(
        GdsRecord::decode(&mut &bytes[..]),
        Err(GdsError::RecordLen(5))
    ));
    // Too small for its own header.
    let bytes = [0x00, 0x03, 0x00, 0x02];
    assert!(matches!(
        GdsRecord::decode(&mut &bytes[..]),
        Err(GdsError::RecordLen(3))
    ));
}

#[test]
fn truncated_input() {
    // Nothing at all.
    let bytes: [u8; 0] = [];
    assert!(matches!(
        GdsRecord::decode(&mut &bytes[..]),
        Err(GdsError::EndOfStream)
    ));
    // A header promising more payload than the stream holds.
    let bytes = [0x00, 0x0A, 0x0D, 0x02, 0x00, 0x01];
    assert!(matches!(
        GdsRecord::decode(&mut &bytes[..]),
        Err(GdsError::EndOfStream)
    ));
}

#[test]
fn invalid_types_rejected() {
    // REAL4 is defined by the format but unused; reject it.
    let bytes = record_bytes(0x03, 0x04, &[0, 0, 0, 0]);
    assert!(matches!(
        GdsRecord::decode(&mut &bytes[..]),
        Err(GdsError::InvalidDataType(4))
    ));
    // Unknown data-type byte.
    let bytes = record_bytes(0x0D, 0x07, &[0, 1]);
    assert!(matches!(
        GdsRecord::decode(&mut &bytes[..]),
        Err(GdsError::InvalidDataType(7))
    ));
    // Record-type byte past the known set.
    let bytes = record_bytes(0x45, 0x00, &[]);
    assert!(matches!(
        GdsRecord::decode(&mut &bytes[..]),
        Err(GdsError::InvalidRecordType(0x45))
    ));
    // TEXTNODE is provisioned but invalid.
    let bytes = record_bytes(0x14, 0x00, &[]);
    assert!(matches!(
        GdsRecord::decode(&mut &bytes[..]),
        Err(GdsError::InvalidRecordType(0x14))
    ));
}

#[test]
fn primitive_payload_sizes() {
    // BITARRAY must be exactly two bytes.
    let bytes = record_bytes(0x26, 0x01, &[0, 0, 0, 0]);
    assert!(matches!(
        GdsRecord::decode(&mut &bytes[..]),
        Err(GdsError::RecordDecode(GdsRecordType::ElemFlags, GdsDataType::BitArray, 4))
    ));
    // INT4 length must be a nonzero multiple of four.
    let bytes = record_bytes(0x10, 0x03, &[0, 0]);
    assert!(matches!(
        GdsRecord::decode(&mut &bytes[..]),
        Err(GdsError::RecordDecode(GdsRecordType::Xy, GdsDataType::I32, 2))
    ));
    // Empty ASCII payloads are invalid.
    let bytes = record_bytes(0x06, 0x06, &[]);
    assert!(matches!(
        GdsRecord::decode(&mut &bytes[..]),
        Err(GdsError::RecordDecode(GdsRecordType::StructName, GdsDataType::Str, 0))
    ));
}

#[test]
fn ascii_nul_handling() {
    // A trailing NUL is padding, stripped on decode.
    let bytes = record_bytes(0x06, 0x06, b"abc\0");
    let rec = GdsRecord::decode(&mut &bytes[..]).unwrap();
    assert_eq!(rec.data(), &GdsData::Str("abc".into()));
    // Odd-length strings regain their pad byte on encode.
    let mut out = Vec::new();
    rec.encode(&mut out).unwrap();
    assert_eq!(out, bytes);
    // Even-length strings encode without padding.
    let bytes = record_bytes(0x06, 0x06, b"abcd");
    let rec = GdsRecord::decode(&mut &bytes[..]).unwrap();
    let mut out = Vec::new();
    rec.encode(&mut out).unwrap();
    assert_eq!(out, bytes);
}

#[test]
fn oversize_write_rejected() {
    let rec = GdsRecord::ascii(GdsRecordType::LibName, "x".repeat(65532).into());
    let mut out = Vec::new();
    assert!(matches!(
        rec.encode(&mut out),
        Err(GdsError::Oversize(65536))
    ));
}

#[test]
fn boundary_shape_violations() {
    // Three points, closed or not: below the four-point minimum.
    let mut body = record_bytes(0x08, 0x00, &[]);
    body.extend(record_bytes(0x0D, 0x02, &int2_payload(&[1])));
    body.extend(record_bytes(0x0E, 0x02, &int2_payload(&[0])));
    body.extend(record_bytes(0x10, 0x03, &int4_payload(&[0, 0, 1, 0, 0, 0])));
    body.extend(record_bytes(0x11, 0x00, &[]));
    let err = GdsLibrary::from_bytes(stream_with_element(&body)).unwrap_err();
    assert!(matches!(
        err,
        GdsError::BadShape {
            ctx: Some(GdsContext::Boundary),
            ..
        }
    ));

    // Four points whose first and last differ: not closed.
    let mut body = record_bytes(0x08, 0x00, &[]);
    body.extend(record_bytes(0x0D, 0x02, &int2_payload(&[1])));
    body.extend(record_bytes(0x0E, 0x02, &int2_payload(&[0])));
    body.extend(record_bytes(
        0x10,
        0x03,
        &int4_payload(&[0, 0, 1, 0, 1, 1, 0, 1]),
    ));
    body.extend(record_bytes(0x11, 0x00, &[]));
    let err = GdsLibrary::from_bytes(stream_with_element(&body)).unwrap_err();
    assert!(matches!(
        err,
        GdsError::BadShape {
            ctx: Some(GdsContext::Boundary),
            ..
        }
    ));
}

#[test]
fn aref_shape_violations() {
    for pts in [vec![0, 0, 1, 1], vec![0, 0, 1, 0, 0, 1, 1, 1]] {
        let mut body = record_bytes(0x0B, 0x00, &[]);
        body.extend(record_bytes(0x12, 0x06, b"LEAF"));
        body.extend(record_bytes(0x13, 0x02, &int2_payload(&[2, 2])));
        body.extend(record_bytes(0x10, 0x03, &int4_payload(&pts)));
        body.extend(record_bytes(0x11, 0x00, &[]));
        let err = GdsLibrary::from_bytes(stream_with_element(&body)).unwrap_err();
        assert!(matches!(
            err,
            GdsError::BadShape {
                ctx: Some(GdsContext::ArrayRef),
                ..
            }
        ));
    }
}

#[test]
fn colrow_entry_count_checked() {
    let mut body = record_bytes(0x0B, 0x00, &[]);
    body.extend(record_bytes(0x12, 0x06, b"LEAF"));
    body.extend(record_bytes(0x13, 0x02, &int2_payload(&[2, 2, 2])));
    body.extend(record_bytes(0x10, 0x03, &int4_payload(&[0, 0, 1, 0, 0, 1])));
    body.extend(record_bytes(0x11, 0x00, &[]));
    let err = GdsLibrary::from_bytes(stream_with_element(&body)).unwrap_err();
    assert!(matches!(
        err,
        GdsError::DataSize {
            rtype: GdsRecordType::ColRow,
            expected: 2,
            found: 3,
        }
    ));
}

#[test]
fn missing_endel() {
    // A boundary closed by ENDSTR rather than ENDEL.
    let mut bytes = lib_header_bytes();
    bytes.extend(record_bytes(0x05, 0x02, &int2_payload(&Y2K)));
    bytes.extend(record_bytes(0x06, 0x06, b"TOP\0"));
    bytes.extend(record_bytes(0x08, 0x00, &[]));
    bytes.extend(record_bytes(0x0D, 0x02, &int2_payload(&[1])));
    bytes.extend(record_bytes(0x0E, 0x02, &int2_payload(&[0])));
    bytes.extend(record_bytes(
        0x10,
        0x03,
        &int4_payload(&[0, 0, 1, 0, 1, 1, 0, 0]),
    ));
    bytes.extend(record_bytes(0x07, 0x00, &[])); // ENDSTR, where ENDEL belongs
    bytes.extend(record_bytes(0x04, 0x00, &[]));
    let err = GdsLibrary::from_bytes(bytes).unwrap_err();
    assert!(matches!(
        err,
        GdsError::MissingRecord {
            expected: GdsRecordType::EndElement,
            found: GdsRecordType::EndStruct,
        }
    ));
}

#[test]
fn node_rejects_properties() {
    // Nodes are the one element kind without a property list.
    let mut body = record_bytes(0x15, 0x00, &[]);
    body.extend(record_bytes(0x0D, 0x02, &int2_payload(&[3])));
    body.extend(record_bytes(0x2A, 0x02, &int2_payload(&[1])));
    body.extend(record_bytes(0x10, 0x03, &int4_payload(&[1, 2])));
    body.extend(record_bytes(0x2B, 0x02, &int2_payload(&[1])));
    body.extend(record_bytes(0x2C, 0x06, b"oops"));
    body.extend(record_bytes(0x11, 0x00, &[]));
    let err = GdsLibrary::from_bytes(stream_with_element(&body)).unwrap_err();
    assert!(matches!(
        err,
        GdsError::MissingRecord {
            expected: GdsRecordType::EndElement,
            found: GdsRecordType::PropAttr,
        }
    ));
}

#[test]
fn unexpected_record_in_library() {
    // A LAYER record where only BGNSTR or ENDLIB may appear.
    let mut bytes = lib_header_bytes();
    bytes.extend(record_bytes(0x0D, 0x02, &int2_payload(&[1])));
    bytes.extend(record_bytes(0x04, 0x00, &[]));
    let err = GdsLibrary::from_bytes(bytes).unwrap_err();
    assert!(matches!(
        err,
        GdsError::UnexpectedRecord {
            ctx: GdsContext::Library,
            found: GdsRecordType::Layer,
        }
    ));
}

#[test]
fn strans_bit_decoding() {
    let mut body = record_bytes(0x0A, 0x00, &[]); // SREF
    body.extend(record_bytes(0x12, 0x06, b"LEAF"));
    body.extend(record_bytes(0x1A, 0x01, &[0x80, 0x06])); // STRANS: reflect + abs mag + abs angle
    body.extend(record_bytes(0x10, 0x03, &int4_payload(&[7, 8])));
    body.extend(record_bytes(0x11, 0x00, &[]));
    let stream = stream_with_element(&body);
    let lib = GdsLibrary::from_bytes(stream.clone()).unwrap();
    match &lib.structs[0].elems[0] {
        GdsElement::GdsStructRef(sref) => {
            let strans = sref.strans.as_ref().unwrap();
            assert!(strans.reflected);
            assert!(strans.abs_mag);
            assert!(strans.abs_angle);
            assert_eq!(strans.mag, None);
            assert_eq!(strans.angle, None);
        }
        other => panic!("expected a struct reference, got {other:?}"),
    }
    // And the bits survive a re-encode untouched.
    assert_eq!(encode_lib(&lib), stream);
}

#[test]
fn text_element_grammar() {
    // TEXT carries the longest optional-record run; check the writer emits
    // it in grammar order, STRANS before MAG before ANGLE included.
    let mut lib = GdsLibrary::new("LIB");
    let mut top = GdsStruct::new("TOP");
    top.elems.push(
        GdsTextElem {
            string: "net_vdd".into(),
            layer: 5,
            texttype: 0,
            xy: GdsPoint::new(3, 4),
            presentation: Some(GdsPresentation::new(0x00, 0x12)),
            path_type: Some(1),
            width: Some(10),
            strans: Some(GdsStrans {
                reflected: true,
                mag: Some(2.0),
                angle: Some(90.0),
                ..Default::default()
            }),
            ..Default::default()
        }
        .into(),
    );
    lib.structs.push(top);
    let bytes = encode_lib(&lib);

    let rtypes: Vec<GdsRecordType> = GdsRecords::new(&bytes[..])
        .map(|rec| rec.unwrap().rtype())
        .collect();
    let text = rtypes
        .iter()
        .position(|&t| t == GdsRecordType::Text)
        .unwrap();
    assert_eq!(
        &rtypes[text..text + 11],
        &[
            GdsRecordType::Text,
            GdsRecordType::Layer,
            GdsRecordType::TextType,
            GdsRecordType::Presentation,
            GdsRecordType::PathType,
            GdsRecordType::Width,
            GdsRecordType::Strans,
            GdsRecordType::Mag,
            GdsRecordType::Angle,
            GdsRecordType::Xy,
            GdsRecordType::String,
        ]
    );

    let lib2 = GdsLibrary::from_bytes(bytes).unwrap();
    assert_eq!(lib, lib2);
}

#[test]
fn full_round_trip_structural() {
    let lib = sample_lib();
    let lib2 = GdsLibrary::from_bytes(encode_lib(&lib)).unwrap();
    assert_eq!(lib, lib2);
}

#[test]
fn full_round_trip_byte_exact() {
    // decode ∘ encode is the identity on the writer's output...
    let bytes = encode_lib(&sample_lib());
    let lib = GdsLibrary::from_bytes(bytes.clone()).unwrap();
    assert_eq!(encode_lib(&lib), bytes);

    // ...and encode ∘ decode is the identity on a hand-assembled stream.
    let mut body = record_bytes(0x0A, 0x00, &[]);
    body.extend(record_bytes(0x12, 0x06, b"LEAF"));
    body.extend(record_bytes(0x1A, 0x01, &[0x00, 0x04]));
    body.extend(record_bytes(0x1B, 0x05, &0x4080_0000_0000_0000u64.to_be_bytes())); // MAG 0.5
    body.extend(record_bytes(0x1C, 0x05, &0x4228_0000_0000_0000u64.to_be_bytes())); // ANGLE 40.0
    body.extend(record_bytes(0x10, 0x03, &int4_payload(&[7, 8])));
    body.extend(record_bytes(0x11, 0x00, &[]));
    let stream = stream_with_element(&body);
    let lib = GdsLibrary::from_bytes(stream.clone()).unwrap();
    assert_eq!(encode_lib(&lib), stream);
}

#[test]
fn library_header_optionals_round_trip() {
    // LIBDIRSIZE, SRFNAME, LIBSECUR, REFLIBS, FONTS, ATTRTABLE, GENERATIONS.
    let mut bytes = Vec::new();
    bytes.extend(record_bytes(0x00, 0x02, &int2_payload(&[5])));
    bytes.extend(record_bytes(0x01, 0x02, &int2_payload(&Y2K)));
    bytes.extend(record_bytes(0x39, 0x02, &int2_payload(&[120])));
    bytes.extend(record_bytes(0x3A, 0x06, b"sticky.srf"));
    bytes.extend(record_bytes(0x3B, 0x02, &int2_payload(&[1, 2, 7, 1, 3, 4])));
    bytes.extend(record_bytes(0x02, 0x06, b"LIB\0"));
    bytes.extend(record_bytes(0x1F, 0x06, b"reflib1\0"));
    bytes.extend(record_bytes(0x20, 0x06, b"font0\0"));
    bytes.extend(record_bytes(0x23, 0x06, b"attrs.tbl\0"));
    bytes.extend(record_bytes(0x22, 0x02, &int2_payload(&[3])));
    let mut units = Vec::new();
    units.extend(0x3E4189374BC6A7F0u64.to_be_bytes());
    units.extend(0x3944B82FA09B5A54u64.to_be_bytes());
    bytes.extend(record_bytes(0x03, 0x05, &units));
    bytes.extend(record_bytes(0x04, 0x00, &[]));

    let lib = GdsLibrary::from_bytes(bytes.clone()).unwrap();
    assert_eq!(lib.libdirsize, Some(120));
    assert_eq!(lib.srfname.as_deref(), Some("sticky.srf"));
    assert_eq!(
        lib.libsecur,
        vec![
            GdsAccessControl {
                group: 1,
                user: 2,
                rights: 7
            },
            GdsAccessControl {
                group: 1,
                user: 3,
                rights: 4
            },
        ]
    );
    assert_eq!(lib.reflibs.as_deref(), Some("reflib1"));
    assert_eq!(lib.fonts.as_deref(), Some("font0"));
    assert_eq!(lib.attrtable.as_deref(), Some("attrs.tbl"));
    assert_eq!(lib.generations, Some(3));
    assert_eq!(encode_lib(&lib), bytes);
}

#[test]
fn record_iterator_stops_at_endlib() {
    let mut bytes = lib_header_bytes();
    bytes.extend(record_bytes(0x04, 0x00, &[]));
    // Trailing padding past ENDLIB is never touched.
    bytes.extend([0u8; 16]);

    let mut it = GdsRecords::new(&bytes[..]);
    let rtypes: Vec<GdsRecordType> = it.by_ref().map(|rec| rec.unwrap().rtype()).collect();
    assert_eq!(
        rtypes,
        vec![
            GdsRecordType::Header,
            GdsRecordType::BgnLib,
            GdsRecordType::LibName,
            GdsRecordType::Units,
            GdsRecordType::EndLib,
        ]
    );
    assert!(it.next().is_none());
}

#[test]
fn reader_interface() {
    let bytes = encode_lib(&sample_lib());
    let lib = GdsLibrary::read(&bytes[..]).unwrap();
    assert_eq!(lib, sample_lib());
}

#[test]
fn file_round_trip() {
    roundtrip(&sample_lib()).unwrap();
}

#[test]
fn save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("sample.gds");
    let lib = sample_lib();
    lib.save(&path).unwrap();
    let lib2 = GdsLibrary::load(&path).unwrap();
    assert_eq!(lib, lib2);
}

#[test]
fn serde_formats() {
    let lib = sample_lib();
    for fmt in [
        SerializationFormat::Json,
        SerializationFormat::Yaml,
        SerializationFormat::Toml,
    ] {
        let s = fmt.to_string(&lib).unwrap();
        let lib2: GdsLibrary = fmt.from_str(&s).unwrap();
        assert_eq!(lib, lib2);
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.gds.yaml");
    SerializationFormat::Yaml.save(&lib, &path).unwrap();
    let lib2: GdsLibrary = SerializationFormat::Yaml.open(&path).unwrap();
    assert_eq!(lib, lib2);
}

#[test]
fn builders() {
    let path = GdsPathBuilder::default()
        .layer(1i16)
        .datatype(0i16)
        .xy(GdsPoint::vec(&[(0, 0), (100, 0)]))
        .width(50)
        .build()
        .unwrap();
    assert_eq!(path.layer, 1);
    assert_eq!(path.width, Some(50));
    assert_eq!(path.path_type, None);

    // Builders enforce their required fields.
    assert!(GdsBoundaryBuilder::default().layer(1i16).build().is_err());
}

#[test]
fn stats() {
    let stats = sample_lib().stats();
    assert_eq!(
        stats,
        GdsStats {
            libraries: 1,
            structs: 2,
            boundaries: 1,
            paths: 1,
            struct_refs: 1,
            array_refs: 1,
            text_elems: 1,
            nodes: 1,
            boxes: 1,
        }
    );
}

#[test]
fn units_accessors() {
    let units = GdsUnits::new(1e-3, 1e-9);
    assert_eq!(units.db_unit(), 1e-9);
    assert_eq!(units.user_unit(), 1e6);
    assert_eq!(GdsUnits::default(), GdsUnits::new(1e-3, 1e-9));
}

#[test]
fn layer_specs() {
    let lib = sample_lib();
    let specs: Vec<GdsLayerSpec> = lib.structs[0]
        .elems
        .iter()
        .filter_map(|elem| match elem {
            GdsElement::GdsBoundary(e) => Some(e.layerspec()),
            GdsElement::GdsPath(e) => Some(e.layerspec()),
            GdsElement::GdsTextElem(e) => Some(e.layerspec()),
            GdsElement::GdsNode(e) => Some(e.layerspec()),
            GdsElement::GdsBox(e) => Some(e.layerspec()),
            _ => None,
        })
        .collect();
    assert_eq!(
        specs,
        vec![
            GdsLayerSpec::new(1, 0),
            GdsLayerSpec::new(2, 1),
            GdsLayerSpec::new(5, 0),
            GdsLayerSpec::new(3, 1),
            GdsLayerSpec::new(4, 0),
        ]
    );
}
