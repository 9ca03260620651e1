// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Test support: small, deterministic PDF / TIFF / DICOM inputs built in memory.
//
// Compiled for this crate's own tests and, through the `fixtures` feature, for
// the tests of downstream crates. Panics on failure; never use outside tests.

use std::io::Cursor;
use std::path::Path;

use dicom_core::value::DataSetSequence;
use dicom_core::{DataElement, Length, PrimitiveValue, Tag, VR};
use dicom_dictionary_std::{tags, uids};
use dicom_object::{FileMetaTableBuilder, InMemDicomObject};
use lopdf::{Document, Object, Stream, dictionary};
use tiff::encoder::{TiffEncoder, colortype};

/// A PDF with `count` pages. Page `n` draws the text `page n`, and the page
/// tree root carries the inherited `MediaBox` and `Resources`.
pub fn pdf_with_pages(count: u32) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for number in 1..=count {
        let content = format!("BT /F1 24 Tf 72 720 Td (page {number}) Tj ET");
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count as i64,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut output = Vec::new();
    doc.save_to(&mut output).expect("serialise fixture PDF");
    output
}

/// Text drawn on each page of a document, in page order.
pub fn page_labels(pdf: &[u8]) -> Vec<String> {
    let doc = Document::load_mem(pdf).expect("load fixture PDF");
    doc.get_pages()
        .values()
        .map(|page_id| {
            let content = doc.get_page_content(*page_id).expect("page content");
            let text = String::from_utf8_lossy(&content);
            text.split('(')
                .nth(1)
                .and_then(|rest| rest.split(')').next())
                .unwrap_or_default()
                .to_string()
        })
        .collect()
}

/// A multi-frame 8-bit grayscale TIFF, each frame a different flat shade.
pub fn multipage_tiff(frames: u32, width: u32, height: u32) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut buffer).expect("tiff encoder");
        for frame in 0..frames {
            let shade = (frame * 60 % 256) as u8;
            let data = vec![shade; (width * height) as usize];
            encoder
                .write_image::<colortype::Gray8>(width, height, &data)
                .expect("write tiff frame");
        }
    }
    buffer.into_inner()
}

/// Like [`multipage_tiff`], written as BigTIFF (version 43).
pub fn multipage_bigtiff(frames: u32, width: u32, height: u32) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new_big(&mut buffer).expect("bigtiff encoder");
        for _ in 0..frames {
            let data = vec![128u8; (width * height) as usize];
            encoder
                .write_image::<colortype::Gray8>(width, height, &data)
                .expect("write bigtiff frame");
        }
    }
    buffer.into_inner()
}

/// An RGB TIFF with a single frame.
pub fn rgb_tiff(width: u32, height: u32) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut buffer).expect("tiff encoder");
        let data: Vec<u8> = (0..width * height)
            .flat_map(|i| [(i % 256) as u8, 40, 200])
            .collect();
        encoder
            .write_image::<colortype::RGB8>(width, height, &data)
            .expect("write tiff frame");
    }
    buffer.into_inner()
}

/// A bare TIFF structure: header plus `ifds` linked directories of one tag
/// each, no image data. Enough for the IFD walker, not for a decoder.
pub fn raw_ifd_chain(ifds: u32, big_endian: bool) -> Vec<u8> {
    const IFD_LEN: u32 = 2 + 12 + 4;

    let u16_bytes = |v: u16| if big_endian { v.to_be_bytes() } else { v.to_le_bytes() };
    let u32_bytes = |v: u32| if big_endian { v.to_be_bytes() } else { v.to_le_bytes() };

    let mut out = Vec::new();
    out.extend_from_slice(if big_endian { b"MM" } else { b"II" });
    out.extend_from_slice(&u16_bytes(42));
    out.extend_from_slice(&u32_bytes(if ifds == 0 { 0 } else { 8 }));

    for index in 0..ifds {
        out.extend_from_slice(&u16_bytes(1));
        // ImageWidth, SHORT, count 1, value 1 (left-justified in the 4-byte slot).
        out.extend_from_slice(&u16_bytes(256));
        out.extend_from_slice(&u16_bytes(3));
        out.extend_from_slice(&u32_bytes(1));
        out.extend_from_slice(&u16_bytes(1));
        out.extend_from_slice(&[0, 0]);
        let next = if index + 1 == ifds {
            0
        } else {
            8 + IFD_LEN * (index + 1)
        };
        out.extend_from_slice(&u32_bytes(next));
    }
    out
}

/// An in-memory dataset with patient data, a nested sequence, a private tag,
/// an empty element, and `width` x `height` 8-bit pixels.
pub fn dicom_dataset(width: u16, height: u16, pixels: Vec<u8>) -> InMemDicomObject {
    let referenced_study = InMemDicomObject::from_element_iter([
        DataElement::new(
            tags::REFERENCED_SOP_CLASS_UID,
            VR::UI,
            PrimitiveValue::from("1.2.840.10008.3.1.2.3.1"),
        ),
        DataElement::new(
            tags::REFERENCED_SOP_INSTANCE_UID,
            VR::UI,
            PrimitiveValue::from("2.25.77"),
        ),
    ]);

    InMemDicomObject::from_element_iter([
        DataElement::new(
            tags::SOP_CLASS_UID,
            VR::UI,
            PrimitiveValue::from("1.2.840.10008.5.1.4.1.1.7"),
        ),
        DataElement::new(tags::SOP_INSTANCE_UID, VR::UI, PrimitiveValue::from("2.25.1")),
        DataElement::new(tags::STUDY_DESCRIPTION, VR::LO, PrimitiveValue::Empty),
        DataElement::new(tags::MODALITY, VR::CS, PrimitiveValue::from("OT")),
        DataElement::new(
            tags::REFERENCED_STUDY_SEQUENCE,
            VR::SQ,
            DataSetSequence::new(vec![referenced_study], Length::UNDEFINED),
        ),
        DataElement::new(tags::PATIENT_NAME, VR::PN, PrimitiveValue::from("Doe^Jane")),
        DataElement::new(tags::PATIENT_ID, VR::LO, PrimitiveValue::from("P-0042")),
        DataElement::new(Tag(0x0009, 0x0010), VR::LO, PrimitiveValue::from("ACME 1.0")),
        DataElement::new(tags::SAMPLES_PER_PIXEL, VR::US, PrimitiveValue::from(1_u16)),
        DataElement::new(
            tags::PHOTOMETRIC_INTERPRETATION,
            VR::CS,
            PrimitiveValue::from("MONOCHROME2"),
        ),
        DataElement::new(tags::ROWS, VR::US, PrimitiveValue::from(height)),
        DataElement::new(tags::COLUMNS, VR::US, PrimitiveValue::from(width)),
        DataElement::new(tags::BITS_ALLOCATED, VR::US, PrimitiveValue::from(8_u16)),
        DataElement::new(tags::BITS_STORED, VR::US, PrimitiveValue::from(8_u16)),
        DataElement::new(tags::HIGH_BIT, VR::US, PrimitiveValue::from(7_u16)),
        DataElement::new(tags::PIXEL_REPRESENTATION, VR::US, PrimitiveValue::from(0_u16)),
        DataElement::new(tags::PIXEL_DATA, VR::OB, PrimitiveValue::U8(pixels.into())),
    ])
}

/// Write [`dicom_dataset`] as a Part 10 file (explicit VR little endian).
pub fn write_dicom_file(path: impl AsRef<Path>, width: u16, height: u16, pixels: Vec<u8>) {
    let file = dicom_dataset(width, height, pixels)
        .with_meta(
            FileMetaTableBuilder::new()
                .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
                .media_storage_sop_class_uid("1.2.840.10008.5.1.4.1.1.7")
                .media_storage_sop_instance_uid("2.25.1"),
        )
        .expect("build DICOM file meta");
    file.write_to_file(path.as_ref()).expect("write DICOM file");
}

/// A horizontal gradient, handy for checking rescaling.
pub fn gradient_pixels(width: u16, height: u16) -> Vec<u8> {
    (0..height)
        .flat_map(|_| (0..width).map(move |x| (x as u32 * 200 / width.max(1) as u32) as u8 + 20))
        .collect()
}
