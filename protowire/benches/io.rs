use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};

use protowire::io::{CodedOutput, CodedReader, CodedWriter, StreamingWriter};
use protowire::UnknownFieldSet;

macro_rules! add_write_group {
    ($g:ident, $n:expr, $f:ident, $v:expr) => {
        $g.bench_function($n, |b| {
            let mut output = [0u8; 10];
            b.iter(|| {
                let mut writer = CodedWriter::with_slice(&mut output);
                writer.$f(black_box($v)).unwrap();
            });
        });
    };
}

macro_rules! add_read_group {
    ($g:ident, $n:expr, $f:ident, $v:expr) => {
        $g.bench_function($n, |b| {
            b.iter(|| {
                let mut reader = CodedReader::with_slice(black_box($v));
                reader.$f().unwrap();
            });
        });
    };
}

fn write_varint32(c: &mut Criterion) {
    let mut group = c.benchmark_group("write-varint32");
    group.bench_function("0-byte", |b| {
        let mut output = [0u8; 10];
        b.iter(|| {
            let mut writer = CodedWriter::with_slice(&mut output);
            black_box(&mut writer);
            // baseline
        })
    });
    add_write_group!(group, "1-byte", write_raw_varint32, 127);
    add_write_group!(group, "2-byte", write_raw_varint32, 16_383);
    add_write_group!(group, "3-byte", write_raw_varint32, 2_097_151);
    add_write_group!(group, "4-byte", write_raw_varint32, 268_435_455);
    add_write_group!(group, "5-byte", write_raw_varint32, u32::max_value());
    group.finish();
}

fn write_varint64(c: &mut Criterion) {
    let mut group = c.benchmark_group("write-varint64");
    add_write_group!(group, "1-byte", write_raw_varint64, 127);
    add_write_group!(group, "10-byte", write_raw_varint64, u64::max_value());
    group.finish();
}

fn read_varint32(c: &mut Criterion) {
    let mut group = c.benchmark_group("read-varint32");
    add_read_group!(group, "1-byte", read_varint32, &[0x7F]);
    add_read_group!(group, "2-byte", read_varint32, &[0xFF, 0x7F]);
    add_read_group!(group, "3-byte", read_varint32, &[0xFF, 0xFF, 0x7F]);
    add_read_group!(group, "4-byte", read_varint32, &[0xFF, 0xFF, 0xFF, 0x7F]);
    add_read_group!(group, "5-byte", read_varint32, &[0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
    group.finish();
}

fn read_varint64(c: &mut Criterion) {
    let mut group = c.benchmark_group("read-varint64");
    add_read_group!(group, "1-byte", read_varint64, &[0x7F]);
    add_read_group!(group, "10-byte", read_varint64, &[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]);
    group.finish();
}

fn write_large_bytes(c: &mut Criterion) {
    let blob = vec![0xAB; 1 << 20];
    let mut group = c.benchmark_group("write-1mib-bytes");
    group.throughput(Throughput::Bytes(blob.len() as u64));
    group.bench_function("buffered", |b| {
        let mut output = Vec::with_capacity(blob.len() + 16);
        b.iter(|| {
            output.clear();
            let mut writer = CodedWriter::with_write(&mut output);
            writer.write_bytes(1, black_box(&blob)).unwrap();
            writer.flush().unwrap();
        });
    });
    group.bench_function("streaming", |b| {
        let mut output = Vec::with_capacity(blob.len() + 16);
        b.iter(|| {
            output.clear();
            let mut writer = StreamingWriter::new(&mut output);
            writer.write_bytes(1, black_box(&blob)).unwrap();
            writer.flush().unwrap();
        });
    });
    group.finish();
}

fn parse_unknown_fields(c: &mut Criterion) {
    let mut data = Vec::new();
    {
        let mut writer = CodedWriter::with_write(&mut data);
        for n in 1..=100 {
            writer.write_uint64(n, u64::from(n) * 1000).unwrap();
            writer.write_string(n, "value").unwrap();
        }
        writer.flush().unwrap();
    }

    c.bench_function("parse-unknown-fields", |b| {
        b.iter(|| UnknownFieldSet::from_bytes(black_box(&data)).unwrap());
    });
}

criterion_group!(benches, write_varint32, write_varint64, read_varint32, read_varint64, write_large_bytes, parse_unknown_fields);
criterion_main!(benches);
