//! Criterion benchmarks for makel performance testing.
//!
//! These benchmarks invoke the release binary as a subprocess on generated
//! makefiles, so they include process startup and file I/O along with the
//! line checks.

use criterion::{Criterion, criterion_group, criterion_main};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

const BINARY: &str = "./target/release/makel";

/// Write a makefile of `rules` rules with continuations and comments
fn generate_makefile(dir: &Path, name: &str, rules: usize, wide: bool) -> PathBuf {
    let mut content = String::new();
    for i in 0..rules {
        let _ = writeln!(content, "# rule {}", i);
        if wide {
            let _ = writeln!(content, "OBJ{} = 漢字{}.o \\\n\t表示{}.o", i, i, i);
        } else {
            let _ = writeln!(content, "OBJ{} = a{}.o \\\n\tb{}.o", i, i, i);
        }
        let _ = writeln!(content, "target{}: $(OBJ{})\n\tcc -o $@ $(OBJ{})\n", i, i, i);
    }

    let path = dir.join(name);
    std::fs::write(&path, content).expect("Failed to write makefile");
    path
}

fn bench_makefile(c: &mut Criterion, id: &str, path: &Path, extra: &[&str]) {
    c.bench_function(id, |b| {
        b.iter(|| {
            Command::new(BINARY)
                .arg("--no-config")
                .args(extra)
                .arg("-f")
                .arg(path)
                .output()
                .expect("Failed to execute makel")
        })
    });
}

fn bench_small_file(c: &mut Criterion) {
    if !Path::new(BINARY).exists() {
        eprintln!("Skipping bench_small_file: {} not found", BINARY);
        return;
    }

    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = generate_makefile(dir.path(), "small.mk", 10, false);
    bench_makefile(c, "small_file", &path, &[]);
}

fn bench_large_file(c: &mut Criterion) {
    if !Path::new(BINARY).exists() {
        eprintln!("Skipping bench_large_file: {} not found", BINARY);
        return;
    }

    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = generate_makefile(dir.path(), "large.mk", 10_000, false);
    bench_makefile(c, "large_file", &path, &[]);
}

/// Wide characters take the full column-width path
fn bench_cjk_content(c: &mut Criterion) {
    if !Path::new(BINARY).exists() {
        eprintln!("Skipping bench_cjk_content: {} not found", BINARY);
        return;
    }

    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = generate_makefile(dir.path(), "cjk.mk", 10_000, true);
    bench_makefile(c, "cjk_content", &path, &["-l", "8"]);
}

fn bench_json_output(c: &mut Criterion) {
    if !Path::new(BINARY).exists() {
        eprintln!("Skipping bench_json_output: {} not found", BINARY);
        return;
    }

    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = generate_makefile(dir.path(), "json.mk", 1_000, false);
    bench_makefile(c, "json_output", &path, &["--json", "-l", "8"]);
}

criterion_group!(
    benches,
    bench_small_file,
    bench_large_file,
    bench_cjk_content,
    bench_json_output
);
criterion_main!(benches);
