// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Mapkeep-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Mapkeep and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::fs;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use mapkeep::config::StoreConfig;
use mapkeep::format::map_xml::parse_map;
use mapkeep::format::{MapXmlFormat, TreeWriter};
use mapkeep::store::backup::{backup_file_name, rotate_backups};
use mapkeep::store::{Confirmation, FileManager, Frontend, Notice};
use tempfile::TempDir;

mod fixtures;

struct QuietFrontend;

impl Frontend for QuietFrontend {
    fn inform(&mut self, _notice: &Notice) {}
    fn error(&mut self, _notice: &Notice) {}
    fn status(&mut self, _notice: &Notice) {}
    fn confirm_conversion(&mut self, _path: &std::path::Path) -> Confirmation {
        Confirmation::decline()
    }
}

fn serialized(case: fixtures::Case) -> String {
    let mut out = Vec::new();
    MapXmlFormat.write(&fixtures::fixture(case), &mut out).expect("write map");
    String::from_utf8(out).expect("utf-8 map")
}

// Benchmark identity (keep stable):
// - Group names in this file: `store.rotate`, `store.save`, `store.load`, `format.parse`
// - Case IDs (the string after the `/`) must remain stable across refactors so
//   results stay comparable over time (e.g. `full_2`, `medium`).
fn benches_store(c: &mut Criterion) {
    {
        let mut group = c.benchmark_group("store.rotate");
        for (case_id, count) in [("full_2", 2u32), ("full_10", 10), ("full_50", 50)] {
            group.bench_function(case_id, move |b| {
                b.iter_batched_ref(
                    || {
                        let tmp = TempDir::new().expect("temp dir");
                        for index in 1..=count {
                            fs::write(backup_file_name(tmp.path(), "plan.mm", index, "bak"), "x")
                                .expect("seed backup");
                        }
                        tmp
                    },
                    |tmp| {
                        black_box(
                            rotate_backups(tmp.path(), "plan.mm", count, "bak").expect("rotate"),
                        )
                    },
                    BatchSize::SmallInput,
                )
            });
        }
        group.finish();
    }

    {
        let mut group = c.benchmark_group("store.save");
        for (case_id, case) in [
            ("small", fixtures::Case::Small),
            ("medium", fixtures::Case::Medium),
            ("large_long_text", fixtures::Case::LargeLongText),
        ] {
            let root = fixtures::fixture(case);
            group.throughput(Throughput::Elements(root.node_count() as u64));
            group.bench_function(case_id, move |b| {
                let manager = FileManager::new(StoreConfig {
                    backup_count: 0,
                    ..StoreConfig::default()
                });
                b.iter_batched_ref(
                    || {
                        let tmp = TempDir::new().expect("temp dir");
                        let document = manager.new_document(root.clone());
                        (tmp, document)
                    },
                    |(tmp, document)| {
                        let path = tmp.path().join("plan.mm");
                        black_box(manager.save_as(document, &path, &mut QuietFrontend))
                    },
                    BatchSize::SmallInput,
                )
            });
        }
        group.finish();
    }

    {
        let mut group = c.benchmark_group("store.load");
        for (case_id, case) in [("small", fixtures::Case::Small), ("medium", fixtures::Case::Medium)]
        {
            let contents = serialized(case);
            group.throughput(Throughput::Bytes(contents.len() as u64));
            group.bench_function(case_id, move |b| {
                let tmp = TempDir::new().expect("temp dir");
                let path = tmp.path().join("plan.mm");
                fs::write(&path, &contents).expect("seed map");
                let mut manager = FileManager::default();
                b.iter(|| {
                    let loaded = manager.load(black_box(&path), &mut QuietFrontend).expect("load");
                    black_box(loaded.document().root().node_count())
                })
            });
        }
        group.finish();
    }

    {
        let mut group = c.benchmark_group("format.parse");
        for (case_id, case) in [
            ("medium", fixtures::Case::Medium),
            ("large_long_text", fixtures::Case::LargeLongText),
        ] {
            let contents = serialized(case);
            group.throughput(Throughput::Bytes(contents.len() as u64));
            group.bench_function(case_id, move |b| {
                b.iter(|| black_box(parse_map(black_box(&contents)).expect("parse").node_count()))
            });
        }
        group.finish();
    }
}

criterion_group! {
    name = benches;
    config = fixtures::criterion();
    targets = benches_store
}
criterion_main!(benches);
