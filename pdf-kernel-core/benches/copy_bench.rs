//! Copy and Serialization Benchmarks
//!
//! Measures:
//! - Deep copies of page trees between documents, with and without sharing
//! - Writing documents to bytes and reading them back
//!
//! Run with: `cargo bench --bench copy_bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pdf_kernel::objects::{Dictionary, Name, Object};
use pdf_kernel::{CopyOptions, Document, ExtGState, ParseOptions, Rectangle, ResourceCategory};

/// A document whose pages all use one font and a graphics state of their own.
fn build_document(pages: usize) -> Document {
    let mut document = Document::new();
    let font: Dictionary = [
        ("Type", Object::from(Name::from("Font"))),
        ("Subtype", Object::from(Name::from("Type1"))),
        ("BaseFont", Object::from(Name::from("Helvetica"))),
    ]
    .into_iter()
    .collect();
    let font = document.register(font).unwrap();

    for index in 0..pages {
        let page = document.add_new_page(Rectangle::a4()).unwrap();
        document
            .add_resource(&page, ResourceCategory::Font, font)
            .unwrap();
        document
            .add_ext_gstate(&page, ExtGState::new().with_alpha(index as f64 / pages as f64))
            .unwrap();
        document
            .add_page_content(&page, format!("BT /F1 12 Tf ({index}) Tj ET").into_bytes())
            .unwrap();
    }
    document
}

fn benchmark_page_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("page_merge");
    for pages in [10usize, 100, 500] {
        let source = build_document(pages);
        group.bench_with_input(BenchmarkId::from_parameter(pages), &source, |b, source| {
            b.iter(|| {
                let mut target = Document::new();
                target.append_document(black_box(source)).unwrap();
                black_box(target)
            });
        });
    }
    group.finish();
}

fn benchmark_copy_reuse(c: &mut Criterion) {
    let source = build_document(100);
    let root = Object::Reference(source.pages_root().unwrap());

    c.bench_function("copy_page_tree_fresh", |b| {
        b.iter(|| {
            let mut target = Document::new();
            source
                .copy_to(black_box(&root), &mut target, &CopyOptions::new())
                .unwrap();
            black_box(target)
        });
    });

    c.bench_function("copy_page_tree_reused", |b| {
        let mut target = Document::new();
        source.copy_to(&root, &mut target, &CopyOptions::new()).unwrap();
        b.iter(|| {
            source
                .copy_to(black_box(&root), &mut target, &CopyOptions::new())
                .unwrap()
        });
    });
}

fn benchmark_roundtrip(c: &mut Criterion) {
    let mut document = build_document(200);
    let bytes = document.to_bytes().unwrap();

    c.bench_function("write_200_pages", |b| {
        b.iter(|| black_box(document.to_bytes().unwrap()));
    });

    c.bench_function("open_and_count_200_pages", |b| {
        b.iter(|| {
            let reopened =
                Document::from_bytes(black_box(bytes.clone()), ParseOptions::default()).unwrap();
            black_box(reopened.page_count().unwrap())
        });
    });
}

criterion_group!(
    benches,
    benchmark_page_merge,
    benchmark_copy_reuse,
    benchmark_roundtrip
);
criterion_main!(benches);
