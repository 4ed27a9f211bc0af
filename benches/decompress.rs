use std::hint::black_box;

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use zstdseek::{Context, SeekFrom};

const CORPUS: &str = include_str!("../src/jump_table.rs");

fn compress_frame(input: &[u8]) -> Vec<u8> {
    let mut cctx = zstd_safe::CCtx::create();
    let bound = zstd_safe::compress_bound(input.len());
    let mut buf = vec![0u8; bound];
    let n = cctx.compress(&mut buf, input, 3).unwrap();
    buf.truncate(n);
    buf
}

fn seekable_archive(frame_count: usize) -> Vec<u8> {
    let bytes = CORPUS.repeat(8);
    let chunk = bytes.len() / frame_count + 1;
    let mut archive = Vec::new();
    for part in bytes.as_bytes().chunks(chunk) {
        archive.extend_from_slice(&compress_frame(part));
    }
    archive
}

fn sequential_decompression(c: &mut Criterion) {
    let archive = seekable_archive(16);
    let mut ctx = Context::from_buffer(&archive).unwrap();
    let size = ctx.uncompressed_file_size().unwrap() as usize;
    let mut buf = vec![0u8; 64 * 1024];

    let mut group = c.benchmark_group("sequential_decompression");
    group.throughput(Throughput::Bytes(size as u64));
    group.bench_function("corpus", |b| {
        b.iter(|| {
            ctx.seek(SeekFrom::Start(0)).unwrap();
            let mut total = 0;
            while total < size {
                let n = ctx.read(black_box(&mut buf)).unwrap();
                if n == 0 {
                    break;
                }
                total += n;
            }
        });
    });
}

fn random_access_seek(c: &mut Criterion) {
    let archive = seekable_archive(64);
    let mut ctx = Context::from_buffer(&archive).unwrap();
    let size = ctx.uncompressed_file_size().unwrap();
    let mut buf = vec![0u8; 4096];

    let mut group = c.benchmark_group("random_access_seek");
    group.throughput(Throughput::Bytes(buf.len() as u64));
    group.bench_function("corpus", |b| {
        let mut offset = 0u64;
        b.iter(|| {
            offset = (offset + 104_729) % size.max(1);
            ctx.seek(SeekFrom::Start(offset as i64)).unwrap();
            ctx.read(black_box(&mut buf)).unwrap();
        });
    });
}

criterion_group!(benches, sequential_decompression, random_access_seek);
criterion_main!(benches);
