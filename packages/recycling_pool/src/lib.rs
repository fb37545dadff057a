#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Thread-safe pools that recycle expensive-to-construct objects.
//!
//! An object is constructed the first time the pool needs it and is then kept alive and handed
//! out again and again, so the cost of construction is paid once per slot instead of once per
//! use. Borrowers receive a [`PooledMut<T>`] handle that returns the object to its pool when it is
//! dropped, on whichever thread that happens.
//!
//! # Pool variants
//!
//! - [`BoundedPool`] holds at most `capacity` objects. Acquisition blocks while every object is
//!   checked out.
//! - [`UnboundedPool`] keeps at most `capacity` objects resident but never blocks. When every
//!   slot is busy it constructs an overflow object, which either takes a free slot or is
//!   destroyed when it is returned.
//! - [`VolatilePool`] is an unbounded pool that can invalidate its contents by starting a new
//!   generation, optionally retiring the objects that are checked out at the time.
//!
//! # Constructing objects
//!
//! Pooled types implement [`Recyclable`], which says how to construct an instance from a set of
//! arguments. The arguments passed to an acquisition are only used if the pool has to construct
//! a new instance; a reused instance is handed out unchanged, including any state the previous
//! borrower left in it.
//!
//! # Example
//!
//! ```rust
//! use std::convert::Infallible;
//! use std::thread;
//!
//! use recycling_pool::{BoundedPool, Recyclable};
//!
//! struct Parser {
//!     dialect: String,
//!     documents_parsed: usize,
//! }
//!
//! impl Recyclable for Parser {
//!     type Args = &'static str;
//!     type Error = Infallible;
//!
//!     fn make(dialect: &'static str) -> Result<Self, Infallible> {
//!         Ok(Self {
//!             dialect: dialect.to_string(),
//!             documents_parsed: 0,
//!         })
//!     }
//! }
//!
//! let pool = BoundedPool::<Parser>::new(2);
//!
//! thread::scope(|scope| {
//!     for _ in 0..4 {
//!         scope.spawn(|| {
//!             let mut parser = pool.emplace("strict");
//!             parser.documents_parsed += 1;
//!             assert_eq!(parser.dialect, "strict");
//!         });
//!     }
//! });
//! ```
//!
//! # Logging
//!
//! Pools emit [`tracing`](https://docs.rs/tracing) events tagged with the pool's name. Reuse,
//! construction and returns are logged at trace level. Decisions that destroy an instance
//! (overflow discards, retired generations, clears) are logged at debug level.

mod bounded_pool;
mod builder;
mod constants;
mod pooled;
mod pooled_mut;
mod recyclable;
mod slot_set;
mod unbounded_pool;
mod visit_mode;
mod volatile_pool;

pub use bounded_pool::BoundedPool;
pub use builder::*;
pub use pooled::Pooled;
pub use pooled_mut::PooledMut;
pub use recyclable::*;
pub(crate) use slot_set::*;
pub use unbounded_pool::UnboundedPool;
pub use visit_mode::*;
pub use volatile_pool::VolatilePool;
