//! Ballpark figures for the codec hot paths: serializing and
//! deserializing a simple message structure with a trailing blob, plus
//! the signature parser on its own.

use criterion::{
  black_box, criterion_group, criterion_main, BenchmarkId, Criterion,
  Throughput,
};
use gvariant::{signature::signature_next, ReadArg, Variant, WriteArg};

/// A message header plus a trailing payload blob.
const MESSAGE_TYPE: &str = "(uuttay)";

fn build_message(blob: &[u8]) -> Variant<'_> {
  let mut cv = Variant::new(MESSAGE_TYPE).unwrap();
  cv.begin("(", &[]).unwrap();
  cv.write(black_box(0xdead_beefu32)).unwrap();
  cv.write(black_box(0x0badu32)).unwrap();
  cv.write(black_box(71u64)).unwrap();
  cv.write(blob.len() as u64).unwrap();
  cv.insert("ay", &[blob]).unwrap();
  cv.end(")").unwrap();
  cv.seal().unwrap();
  cv
}

/// Serialization of a header-plus-blob message, with the blob spliced in
/// zero-copy.  Scaling with the blob size shows how much of the cost is
/// fixed framing overhead.
fn bench_serialize(c: &mut Criterion) {
  let mut group = c.benchmark_group("serialize_message");
  for &size in &[256_usize, 4096, 65536] {
    let blob = vec![0x5au8; size];
    group.throughput(Throughput::Bytes(size as u64));
    group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
      b.iter(|| {
        let cv = build_message(&blob);
        black_box(cv.spans().count());
      });
    });
  }
  group.finish();
}

/// Deserialization of the header fields and location of the blob.
fn bench_deserialize(c: &mut Criterion) {
  let mut group = c.benchmark_group("deserialize_message");
  for &size in &[256_usize, 4096, 65536] {
    let blob = vec![0x5au8; size];
    let cv = build_message(&blob);
    let data: Vec<u8> =
      cv.spans().flat_map(|s| s.iter().copied()).collect();

    group.throughput(Throughput::Bytes(size as u64));
    group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
      b.iter(|| {
        let mut cv =
          Variant::new_from_buffer(MESSAGE_TYPE, &data).unwrap();
        cv.enter("(").unwrap();
        let values = cv.readv("uutt", &[]).unwrap();
        black_box(values);
        cv.enter("a").unwrap();
        let count = cv.peek_count();
        cv.exit("a)").unwrap();
        black_box(count);
      });
    });
  }
  group.finish();
}

/// Batch reads of an array of small dynamic elements, the framing-offset
/// heavy case.
fn bench_read_string_array(c: &mut Criterion) {
  let mut group = c.benchmark_group("read_string_array");
  for &count in &[16_usize, 256] {
    let mut cv = Variant::new("as").unwrap();
    cv.begin("a", &[]).unwrap();
    for i in 0..count {
      let text = format!("entry-{}", i);
      cv.write_str(&text).unwrap();
    }
    cv.end("a").unwrap();
    cv.seal().unwrap();
    let data: Vec<u8> =
      cv.spans().flat_map(|s| s.iter().copied()).collect();

    group.bench_with_input(
      BenchmarkId::from_parameter(count),
      &count,
      |b, &count| {
        b.iter(|| {
          let mut cv = Variant::new_from_buffer("as", &data).unwrap();
          let values = cv.readv("as", &[ReadArg::Count(count)]).unwrap();
          black_box(values.len());
        });
      },
    );
  }
  group.finish();
}

/// The signature parser alone, on a flat and on a nested type.
fn bench_signature(c: &mut Criterion) {
  let mut group = c.benchmark_group("signature_next");
  for &(name, sig) in &[
    ("flat", "(uuttayssogbynqixd)"),
    ("nested", "(ua(us)m{sv}(a{s(ui)}v)x)"),
  ] {
    group.bench_with_input(BenchmarkId::from_parameter(name), sig, |b, sig| {
      b.iter(|| {
        let info = signature_next(black_box(sig.as_bytes())).unwrap();
        black_box(info);
      });
    });
  }
  group.finish();
}

/// Compound writes through the vararg driver.
fn bench_writev(c: &mut Criterion) {
  c.bench_function("writev_compound", |b| {
    b.iter(|| {
      let mut cv = Variant::new("(uaum(s)u)").unwrap();
      cv.writev(
        "(uaum(s)u)",
        &[
          WriteArg::Uint32(black_box(0xffff)),
          WriteArg::Count(4),
          WriteArg::Uint32(1),
          WriteArg::Uint32(2),
          WriteArg::Uint32(3),
          WriteArg::Uint32(4),
          WriteArg::Maybe(true),
          WriteArg::Str("foo"),
          WriteArg::Uint32(0xffffffff),
        ],
      )
      .unwrap();
      cv.seal().unwrap();
      black_box(cv.spans().count());
    });
  });
}

criterion_group!(
  benches,
  bench_serialize,
  bench_deserialize,
  bench_read_string_array,
  bench_signature,
  bench_writev
);
criterion_main!(benches);
