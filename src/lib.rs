//! # palloc - Pluggable Fixed-Region Allocators
//!
//! This crate carves one fixed-size region, mapped once with `mmap(2)`, into
//! variable-sized allocations using a strategy chosen at runtime.
//!
//! ## Overview
//!
//! ```text
//!   Data flow:
//!
//!   ┌──────────┐  reserve   ┌──────────┐  create   ┌────────────────────┐
//!   │   Host   │ ─────────► │  Region  │ ────────► │ Box<dyn Strategy>  │
//!   └──────────┘            └──────────┘           └────────────────────┘
//!        │                                                   │
//!        │            alloc / free / usage                   │
//!        └──────────────────────────────────────────────────►│
//!                                                            │ destroy
//!                                                            ▼
//!                                                       ┌──────────┐
//!                                                       │  Region  │ ── drop ──► munmap
//!                                                       └──────────┘
//! ```
//!
//! Three strategies implement the same [`Strategy`] contract:
//!
//! - [`BestFitAllocator`]: one address-ordered free list, best-fit search,
//!   split on allocation and coalescing of neighbours on free.
//! - [`SegregatedAllocator`]: one free list per power-of-two size class,
//!   halving larger blocks on demand, with an optional buddy merge.
//! - [`BumpAllocator`]: moves an offset forward, never reclaims. The host
//!   falls back to it when the requested strategy cannot be used.
//!
//! ## Crate Structure
//!
//! ```text
//!   palloc
//!   ├── align       - Alignment macros (align!, align_to!)
//!   ├── block       - Block descriptors, header size, Allocation handle
//!   ├── error       - Error and Result types
//!   ├── region      - mmap backed Region
//!   ├── strategy    - Strategy and Create traits
//!   ├── best_fit    - BestFitAllocator
//!   ├── segregated  - SegregatedAllocator and MergePolicy
//!   ├── bump        - BumpAllocator
//!   ├── host        - Strategy selection and fallback
//!   └── harness     - Demonstration, stress, fragmentation and reuse runs
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use palloc::{BestFitAllocator, BestFitConfig, Create, Region, Strategy};
//!
//! fn main() -> palloc::Result<()> {
//!     let region = Region::reserve(1 << 20)?;
//!     let mut allocator = BestFitAllocator::create(region, BestFitConfig::default())?;
//!
//!     let allocation = allocator.alloc(128).expect("region has room");
//!     allocator.bytes_mut(allocation).fill(42);
//!     allocator.free(allocation)?;
//!
//!     // Hands the region back; dropping it unmaps the memory.
//!     let _region = Box::new(allocator).destroy();
//!     Ok(())
//! }
//! ```
//!
//! ## Blocks
//!
//! Block metadata lives in the allocators' own tables, keyed by offset.
//! The arena still reserves [`HEADER_SIZE`] bytes in front of every block
//! body so the overhead reported by `usage` is the overhead paid:
//!
//! ```text
//!   Single Allocation:
//!   ┌───────────────────────┬────────────────────────────────┐
//!   │   Reserved header     │         User Data              │
//!   │      HEADER_SIZE      │      N bytes usable            │
//!   └───────────────────────┴────────────────────────────────┘
//!                           ▲
//!                           └── Allocation::offset()
//! ```
//!
//! ## Limitations
//!
//! - **Single-threaded only**: no locking; `Region` is neither `Send` nor `Sync`
//! - **Fixed region**: the arena never grows
//! - **Unix-only**: requires `libc` and `mmap`
//! - **No use-after-free detection**: an `Allocation` is a plain handle; only
//!   freeing a block that is not live is caught

pub mod align;
mod best_fit;
mod block;
mod bump;
mod error;
pub mod harness;
mod host;
mod region;
mod segregated;
mod strategy;

pub use best_fit::{BestFitAllocator, BestFitConfig};
pub use block::{Allocation, Block, HEADER_SIZE};
pub use bump::{BumpAllocator, BumpConfig};
pub use error::{Error, Result};
pub use host::{DEFAULT_REGION_SIZE, Host, HostConfig, Selection, StrategyKind};
pub use region::{Region, page_size};
pub use segregated::{
  MIN_BLOCK_SIZE, MIN_REGION_SIZE, MergePolicy, SegregatedAllocator, SegregatedConfig,
};
pub use strategy::{Create, Strategy};
