use std::time::{Duration, Instant};

use chrono::{NaiveDate, NaiveDateTime};
use roomcal::conflict::{check_conflict, overlapping_pairs};
use roomcal::model::{Reservation, ReservationId, Span};

const SIZES: [usize; 4] = [10, 100, 1_000, 10_000];
const PROBES: usize = 2_000;

fn base() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 1, 6)
        .and_then(|d| d.and_hms_opt(8, 0, 0))
        .expect("valid base date")
}

/// Back-to-back half-hour bookings, spread over working days.
fn calendar(n: usize) -> Vec<Reservation> {
    (0..n)
        .map(|i| {
            let start = base() + chrono::Duration::minutes(30 * i as i64);
            Reservation {
                id: ReservationId::from_store(i.to_string()),
                purpose: format!("Meeting {i}"),
                pic: format!("pic{}", i % 17),
                span: Span::new(start, start + chrono::Duration::minutes(30)),
            }
        })
        .collect()
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}us, p50={:.2}us, p95={:.2}us, p99={:.2}us, max={:.2}us",
        latencies.len(),
        avg.as_secs_f64() * 1e6,
        percentile(latencies, 50.0).as_secs_f64() * 1e6,
        percentile(latencies, 95.0).as_secs_f64() * 1e6,
        percentile(latencies, 99.0).as_secs_f64() * 1e6,
        latencies.last().copied().unwrap_or_default().as_secs_f64() * 1e6,
    );
}

fn bench_size(n: usize) {
    let existing = calendar(n);
    let horizon = 30 * n as i64;
    println!("{n} reservations");

    // Free slot past the end: worst case, every reservation is compared.
    let free = Span::new(
        base() + chrono::Duration::minutes(horizon + 60),
        base() + chrono::Duration::minutes(horizon + 90),
    );
    let mut latencies = Vec::with_capacity(PROBES);
    for _ in 0..PROBES {
        let t = Instant::now();
        std::hint::black_box(check_conflict(&free, &existing, None));
        latencies.push(t.elapsed());
    }
    print_latency("free slot", &mut latencies);

    // Probes spread across the calendar, each excluding the booking it lands on.
    let mut latencies = Vec::with_capacity(PROBES);
    for probe in 0..PROBES {
        let i = probe * 7919 % n;
        let r = &existing[i];
        let t = Instant::now();
        std::hint::black_box(check_conflict(&r.span, &existing, Some(&r.id)));
        latencies.push(t.elapsed());
    }
    print_latency("edit in place", &mut latencies);

    let t = Instant::now();
    let pairs = overlapping_pairs(&existing);
    println!("  overlapping_pairs: {} pairs in {:.2?}", pairs.len(), t.elapsed());
}

fn main() {
    println!("roomcal conflict bench");
    for n in SIZES {
        bench_size(n);
    }
}
