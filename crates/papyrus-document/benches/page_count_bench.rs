// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for TIFF page counting: the raw IFD walk against the
// full decoder-based frame count, on the same multi-page file.

use std::io::Cursor;
use std::path::Path;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use tiff::encoder::{TiffEncoder, colortype};

use papyrus_document::pagecount::{image_library_frame_count, walk_ifd_chain};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A `frames`-page 64x64 grayscale TIFF.
fn synthetic_tiff(frames: u32) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut buffer).expect("tiff encoder");
        let data = vec![200u8; 64 * 64];
        for _ in 0..frames {
            encoder
                .write_image::<colortype::Gray8>(64, 64, &data)
                .expect("write frame");
        }
    }
    buffer.into_inner()
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_tiff_page_count(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("bench.tif");
    std::fs::write(&path, synthetic_tiff(50)).expect("write tiff");
    let path: &Path = &path;

    c.bench_function("ifd_walk (50 frames)", |b| {
        b.iter(|| black_box(walk_ifd_chain(black_box(path)).expect("walk")));
    });

    c.bench_function("decoder_frame_count (50 frames)", |b| {
        b.iter(|| black_box(image_library_frame_count(black_box(path)).expect("decode")));
    });
}

criterion_group!(benches, bench_tiff_page_count);
criterion_main!(benches);
