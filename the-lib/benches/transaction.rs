//! Benchmarks for edit batches in the-lib.
//!
//! Run with: `cargo bench -p the-lib --bench transaction`

use divan::{
  Bencher,
  black_box,
};
use the_lib::{
  buffer::RopeBuffer,
  position::Range,
  search::{
    Flags,
    Pattern,
    find_matches,
  },
  transaction::{
    Batch,
    Edit,
  },
};

fn main() {
  divan::main();
}

fn make_text(lines: usize) -> String {
  let line = "The quick brown fox jumps over the lazy dog.\n";
  line.repeat(lines)
}

/// One edit per line, `per_line` of them, each replacing "fox" or "dog"
/// sized spans with text of `insert`'s shape.
fn make_batch(lines: usize, per_line: usize, insert: &str) -> Batch {
  let mut batch = Batch::with_capacity(lines * per_line);
  for line in 0..lines {
    for n in 0..per_line {
      let start = 16 + n * 4;
      batch.push(Edit::new(Range::new((line, start), (line, start + 3)), insert));
    }
  }
  batch
}

mod apply {
  use super::*;

  const LINES: usize = 2000;

  #[divan::bench(args = [1, 4])]
  fn single_line(bencher: Bencher, per_line: usize) {
    let text = make_text(LINES);
    let batch = make_batch(LINES, per_line, "cat");

    bencher
      .with_inputs(|| RopeBuffer::from(text.as_str()))
      .bench_local_values(|mut buffer| {
        let inverse = batch.apply(black_box(&mut buffer)).unwrap();
        black_box(inverse);
      });
  }

  #[divan::bench(args = [1, 4])]
  fn multi_line(bencher: Bencher, per_line: usize) {
    let text = make_text(LINES);
    let batch = make_batch(LINES, per_line, "c\na\nt");

    bencher
      .with_inputs(|| RopeBuffer::from(text.as_str()))
      .bench_local_values(|mut buffer| {
        let inverse = batch.apply(black_box(&mut buffer)).unwrap();
        black_box(inverse);
      });
  }

  #[divan::bench]
  fn roundtrip(bencher: Bencher) {
    let text = make_text(LINES);
    let batch = make_batch(LINES, 2, "c\nat");

    bencher
      .with_inputs(|| RopeBuffer::from(text.as_str()))
      .bench_local_values(|mut buffer| {
        let inverse = batch.apply(&mut buffer).unwrap();
        inverse.apply(black_box(&mut buffer)).unwrap();
        black_box(buffer);
      });
  }
}

mod search {
  use super::*;

  #[divan::bench(args = [100, 1000])]
  fn capped(bencher: Bencher, limit: usize) {
    let buffer = RopeBuffer::from(make_text(5000).as_str());
    let pattern = Pattern::regex(r"\bo\w+", Flags::default()).unwrap();

    bencher.bench(|| black_box(find_matches(&buffer, &pattern, limit)));
  }
}
