// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Mapkeep-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Mapkeep and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

#![allow(dead_code)]

// Shared deterministic benchmark fixtures (no RNG).

use std::time::Duration;

use criterion::Criterion;
use mapkeep::model::MapNode;

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name).ok().and_then(|raw| raw.trim().parse::<usize>().ok()).unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name).ok().and_then(|raw| raw.trim().parse::<u64>().ok()).unwrap_or(default)
}

pub fn criterion() -> Criterion {
    let sample_size = env_usize("BENCH_SAMPLE_SIZE", 60).clamp(10, 200);
    let warmup_secs = env_u64("BENCH_WARMUP_SECS", 3).clamp(1, 60);
    let measurement_secs = env_u64("BENCH_MEASUREMENT_SECS", 5).clamp(1, 120);

    Criterion::default()
        .sample_size(sample_size)
        .warm_up_time(Duration::from_secs(warmup_secs))
        .measurement_time(Duration::from_secs(measurement_secs))
}

#[derive(Debug, Clone, Copy)]
pub enum Case {
    Small,
    Medium,
    LargeLongText,
}

/// A balanced tree: `fanout` children per node down to `depth`.
pub fn tree(depth: usize, fanout: usize, text_len: usize) -> MapNode {
    fn build(path: &str, depth: usize, fanout: usize, text_len: usize) -> MapNode {
        let mut text = format!("node {path} & <topic>");
        while text.len() < text_len {
            text.push_str(" lorem");
        }
        let mut node = MapNode::new(text);
        if depth > 0 {
            for index in 0..fanout {
                let child_path = format!("{path}.{index}");
                node.children_mut()
                    .push(build(&child_path, depth - 1, fanout, text_len));
            }
        }
        node
    }
    build("0", depth, fanout, text_len)
}

pub fn fixture(case: Case) -> MapNode {
    match case {
        Case::Small => tree(2, 4, 16),
        Case::Medium => tree(4, 5, 24),
        Case::LargeLongText => tree(4, 6, 240),
    }
}
