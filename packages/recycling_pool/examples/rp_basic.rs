//! Basic usage example for the pools in `recycling_pool`.
//!
//! This example shows how a bounded pool makes threads take turns with a small set of
//! expensive objects and how an unbounded pool absorbs a burst without blocking.

use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use recycling_pool::{BoundedPool, Recyclable, UnboundedPool, VisitMode};

static CONSTRUCTED: AtomicUsize = AtomicUsize::new(0);

struct Compressor {
    level: u32,
    jobs_done: usize,
}

impl Recyclable for Compressor {
    type Args = u32;
    type Error = Infallible;

    fn make(level: u32) -> Result<Self, Infallible> {
        CONSTRUCTED.fetch_add(1, Ordering::Relaxed);

        Ok(Self {
            level,
            jobs_done: 0,
        })
    }
}

fn main() {
    let pool = BoundedPool::<Compressor>::builder()
        .capacity(2)
        .name("compressors")
        .build();

    thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                let mut compressor = pool.emplace(9);
                compressor.jobs_done = compressor.jobs_done.wrapping_add(1);
            });
        }
    });

    println!(
        "8 jobs ran on {} compressors",
        CONSTRUCTED.load(Ordering::Relaxed)
    );

    pool.visit(VisitMode::Exclusive, |compressor| {
        println!(
            "compressor at level {} completed {} jobs",
            compressor.level, compressor.jobs_done
        );
        true
    });

    let burst_pool = UnboundedPool::<Compressor>::new(1);

    let regular = burst_pool.emplace(1);
    let extra = burst_pool.emplace(1);

    println!(
        "regular is overflow: {}, extra is overflow: {}",
        regular.is_overflow(),
        extra.is_overflow()
    );
}
