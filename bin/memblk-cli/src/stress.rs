//! Concurrent request stress run
//!
//! Each worker owns a disjoint run of sectors and keeps a shadow copy of
//! it, so every read can be checked exactly while other workers hammer
//! the same store.

use anyhow::{Result, bail};
use futures::future::join_all;
use memblk_common::Config;
use memblk_core::{BlockDevice, Request, Segment, Status, create_store};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Longest request issued, in sectors
const MAX_REQUEST_SECTORS: u64 = 8;

#[derive(Debug, Default)]
struct WorkerReport {
    reads: usize,
    writes: usize,
    discards: usize,
    failures: usize,
    mismatches: usize,
}

/// Sector range owned by one worker
struct Region {
    first_sector: u64,
    sectors: u64,
    sector_size: usize,
}

pub async fn run(config: &Config, workers: usize, requests: usize, seed: u64) -> Result<()> {
    let store = create_store(config.device.capacity_bytes, config.device.sector_size)?;
    let device = Arc::new(BlockDevice::new(config.device.name.clone(), store));
    let geometry = device.attach()?;

    let sectors_per_worker = geometry.capacity_sectors() / workers.max(1) as u64;
    if workers == 0 || sectors_per_worker == 0 {
        bail!(
            "cannot split {} sectors between {workers} worker(s)",
            geometry.capacity_sectors()
        );
    }

    info!("Stress: {workers} worker(s) x {requests} request(s), seed {seed}");
    let start = Instant::now();

    let tasks = (0..workers as u64).map(|w| {
        let device = Arc::clone(&device);
        let region = Region {
            first_sector: w * sectors_per_worker,
            sectors: sectors_per_worker,
            sector_size: geometry.sector_size() as usize,
        };
        tokio::task::spawn_blocking(move || {
            worker(&device, &region, requests, seed.wrapping_add(w))
        })
    });
    let results = join_all(tasks).await;
    let elapsed = start.elapsed();

    let mut total = WorkerReport::default();
    for result in results {
        let report = result?;
        total.reads += report.reads;
        total.writes += report.writes;
        total.discards += report.discards;
        total.failures += report.failures;
        total.mismatches += report.mismatches;
    }

    device.detach()?;
    let stats = device.store().stats().snapshot();

    println!("Stress Run");
    println!("==========");
    println!("Elapsed:     {elapsed:?}");
    println!(
        "Requests:    {} read, {} write, {} discard",
        total.reads, total.writes, total.discards
    );
    println!("Read bytes:  {}", stats.read_bytes);
    println!("Write bytes: {}", stats.write_bytes);
    println!("Fill bytes:  {}", stats.fill_bytes);
    println!("Avg latency: {} us", stats.avg_latency_us());
    println!("Failures:    {}", total.failures);
    println!("Mismatches:  {}", total.mismatches);

    if total.failures > 0 || total.mismatches > 0 {
        bail!("stress run found {} failure(s) and {} mismatch(es)", total.failures, total.mismatches);
    }
    Ok(())
}

fn worker(device: &BlockDevice, region: &Region, requests: usize, seed: u64) -> WorkerReport {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut shadow = vec![0u8; region.sectors as usize * region.sector_size];
    let mut report = WorkerReport::default();

    for _ in 0..requests {
        let sectors = rng.gen_range(1..=MAX_REQUEST_SECTORS.min(region.sectors));
        let first = rng.gen_range(0..=region.sectors - sectors);
        let start_sector = region.first_sector + first;

        let offset = first as usize * region.sector_size;
        let len = sectors as usize * region.sector_size;
        let chunk = rng.gen_range(1..=len);
        let window = offset..offset + len;

        let status = match rng.gen_range(0..10) {
            0..=4 => {
                let mut data = vec![0u8; len];
                rng.fill(&mut data[..]);
                let request = data
                    .chunks(chunk)
                    .fold(Request::write(start_sector), |req, part| {
                        req.segment(Segment::source(part))
                    });
                let status = submit(device, request);
                if status == Status::Ok {
                    shadow[window].copy_from_slice(&data);
                }
                report.writes += 1;
                status
            }
            5..=8 => {
                let mut data = vec![0u8; len];
                let request = data
                    .chunks_mut(chunk)
                    .fold(Request::read(start_sector), |req, part| {
                        req.segment(Segment::sink(part))
                    });
                let status = submit(device, request);
                if status == Status::Ok && data[..] != shadow[window] {
                    report.mismatches += 1;
                }
                report.reads += 1;
                status
            }
            _ => {
                let status = submit(device, Request::discard(start_sector, len as u64));
                if status == Status::Ok {
                    shadow[window].fill(0);
                }
                report.discards += 1;
                status
            }
        };

        if status != Status::Ok {
            warn!("Request at sector {start_sector} finished with {status:?}");
            report.failures += 1;
        }
    }

    report
}

fn submit(device: &BlockDevice, request: Request<'_>) -> Status {
    device
        .submit_wait(request)
        .map_or(Status::IoError, |outcome| outcome.status)
}
