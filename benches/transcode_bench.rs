use arrayfile::codec::{encode_words, translate_words};
use arrayfile::{transcode_path, ArrayFileSpec, BinaryEncoding, FileManager};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_translate(c: &mut Criterion) {
    let values: Vec<f64> = (0..128 * 1024).map(|i| i as f64 * 0.001 - 50.0).collect();
    let ieee = encode_words(&values, BinaryEncoding::LtlIeee).unwrap();
    let gfloat = encode_words(&values, BinaryEncoding::VaxGfloat).unwrap();

    c.bench_function("translate_1mb_ltl_to_big", |b| {
        b.iter(|| translate_words(black_box(&ieee), BinaryEncoding::LtlIeee, BinaryEncoding::BigIeee))
    });
    c.bench_function("translate_1mb_ltl_to_vax_d", |b| {
        b.iter(|| translate_words(black_box(&ieee), BinaryEncoding::LtlIeee, BinaryEncoding::VaxDfloat))
    });
    c.bench_function("translate_1mb_vax_g_to_ltl", |b| {
        b.iter(|| translate_words(black_box(&gfloat), BinaryEncoding::VaxGfloat, BinaryEncoding::LtlIeee))
    });
}

fn bench_transcode_file(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("bench.bsp");
    let mut fm = FileManager::default();
    let h = fm.create_array_file(&source, &ArrayFileSpec::default()).unwrap();
    let data: Vec<f64> = (0..2000).map(|i| i as f64).collect();
    for i in 0..100 {
        fm.add_array(h, &format!("SEG {i}"), &[0.0, 1.0], &[1, 2, 3, 4], &data).unwrap();
    }
    fm.close(h).unwrap();

    let dest = dir.path().join("bench-vax.bsp");
    c.bench_function("transcode_100_arrays_to_vax_g", |b| {
        b.iter(|| {
            transcode_path(&mut fm, &source, &dest, BinaryEncoding::VaxGfloat).unwrap();
            std::fs::remove_file(&dest).unwrap();
        })
    });
}

criterion_group!(benches, bench_translate, bench_transcode_file);
criterion_main!(benches);
