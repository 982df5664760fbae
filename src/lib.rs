//! Oxipuff: deflate-aware binary diff and patch.
//!
//! Compressed files diff badly: a one-byte change in the plain text can
//! reshuffle every Huffman code after it. Oxipuff rewrites each deflate
//! stream into a byte-aligned *puff* form that keeps the literal and
//! back-reference structure but drops the entropy coding, diffs the puffed
//! files with bsdiff, and on the patching side huffs the result back into
//! deflate that is bit-for-bit identical to the original.
//!
//! The crate provides:
//! - Deflate ⇄ puff transcoding (`puff`, `huffman`, `bits`)
//! - A stream that presents a file in puffed form (`puffin_stream`)
//! - Deflate discovery in zlib, gzip and zip containers (`locate`)
//! - Patch creation and application (`patch`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```no_run
//! use oxipuff::extent::BitExtent;
//! use oxipuff::patch::{DiffOptions, PatchOptions, puff_diff, puff_patch};
//!
//! let old: &[u8] = &[0x63, 0x64, 0x62, 0x66, 0x61, 0x05, 0x00];
//! let new: &[u8] = &[0x01, 0x05, 0x00, 0xFA, 0xFF, 1, 2, 3, 4, 5];
//!
//! let patch = puff_diff(
//!     old,
//!     new,
//!     &[BitExtent::new(0, 50)],
//!     &[BitExtent::new(0, 80)],
//!     &DiffOptions::default(),
//! )
//! .unwrap();
//! let patched = puff_patch(old, &patch, &PatchOptions::default()).unwrap();
//! assert_eq!(patched, new);
//! ```

pub mod bits;
pub mod error;
pub mod extent;
pub mod huffman;
pub mod locate;
pub mod patch;
pub mod puff;
pub mod puffin_stream;
pub mod stream;
pub mod utils;

#[cfg(feature = "cli")]
pub mod cli;

pub use error::{Error, ErrorKind, Result};
pub use extent::{BitExtent, ByteExtent};
pub use puffin_stream::PuffinStream;
pub use utils::{huff, puff};
