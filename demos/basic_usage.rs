// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic region-sync usage example.
//!
//! Demonstrates:
//! 1. Starting an engine on the in-memory store
//! 2. Publishing exposure records into a few regions
//! 3. Polling a region with a cursor until it converges
//! 4. Sizing a poll response before downloading it
//! 5. Fetching full match records and projecting them to v1/v3
//! 6. Displaying captured metrics
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use region_sync::protocol::{v1, v3};
use region_sync::{
    Coordinate, NarrowcastArea, ProximitySeed, RegionSyncConfig, RegionSyncEngine, StoredRecord,
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║           region-sync: Basic Usage Example                    ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Start the engine
    // ─────────────────────────────────────────────────────────────────────────
    println!("📦 Starting region-sync (in-memory store)...");
    let engine = RegionSyncEngine::connect(RegionSyncConfig::default()).await?;
    let cancel = CancellationToken::new();

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Publish records
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📝 Publishing records...");
    let brooklyn = engine.region_for(40.68, -73.94, 1)?;
    let boundary = engine.boundary(&brooklyn)?;
    println!("   Region {brooklyn} spans {:?} → {:?}", boundary.min, boundary.max);

    let records = vec![
        StoredRecord::new("exp-001", 1_700_000_000_000, brooklyn)
            .with_seed(ProximitySeed::new(vec![0x11; 16], 1_700_000_000_000, 1_700_000_900_000)),
        StoredRecord::new("exp-002", 1_700_000_060_000, brooklyn)
            .with_area(NarrowcastArea::new(
                Coordinate::new(40.681, -73.944),
                120.0,
                1_700_000_000_000,
                1_700_003_600_000,
                "Possible exposure at the market, consider testing",
            )),
        StoredRecord::new("exp-003", 1_700_000_120_000, engine.region_for(34.05, -118.24, 1)?)
            .with_seed(ProximitySeed::new(vec![0x22; 16], 1_700_000_100_000, 1_700_000_200_000)),
    ];
    let written = engine.publish_batch(&records).await?;
    println!("   ✅ Published {written} records");

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Cursor polling
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🔄 Polling {brooklyn} from cursor 0...");
    let size = engine.size(&brooklyn, 0, &cancel).await?;
    println!("   └─ Fetching them will cost {size} bytes");

    let info = engine.list(&brooklyn, 0, &cancel).await?;
    for meta in &info.records {
        println!("   └─ {} @ {}", meta.id, meta.timestamp);
    }
    println!("   Next cursor: {}", info.max_timestamp);

    let again = engine.list(&brooklyn, info.max_timestamp, &cancel).await?;
    println!("   Re-poll with cursor: {} new records (converged)", again.records.len());

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Fetch bodies
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📖 Fetching match records (plus one unknown id)...");
    let mut ids: Vec<String> = info.records.iter().map(|r| r.id.clone()).collect();
    ids.push("exp-missing".into());

    let matches = engine.fetch(&ids, &cancel).await?;
    for record in &matches {
        let message = v1::from_match(record);
        println!("   └─ v1 {}", serde_json::to_string(&message)?);
        for narrowcast in v3::from_match(record) {
            println!("      v3 {}", serde_json::to_string(&narrowcast)?);
        }
    }
    println!("   {} requested, {} returned", ids.len(), matches.len());

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📈 Captured metrics:");
    dump_metrics(&snapshotter);

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║                    Example complete!                          ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    Ok(())
}

fn dump_metrics(snapshotter: &Snapshotter) {
    let mut lines: Vec<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, value)| {
            let (_, key) = composite_key.into_parts();
            let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
            let label_str = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };
            let rendered = match value {
                DebugValue::Counter(v) => format!("= {v}"),
                DebugValue::Gauge(v) => format!("= {:.2}", v.into_inner()),
                DebugValue::Histogram(samples) => {
                    let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                    format!("count={} sum={:.4}", samples.len(), sum)
                }
            };
            format!("{}{} {}", key.name(), label_str, rendered)
        })
        .collect();
    lines.sort();

    if lines.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
    for line in lines {
        println!("   └─ {line}");
    }
}
