// Deflate-aware patches.
//
// A patch is a bsdiff between the *puffed* views of two files, framed with a
// header that records where each file keeps its deflate streams. Applying it
// puffs the source on the fly, runs the bsdiff interpreter and huffs the
// result straight back into deflate.
//
// # Modules
//
// - `header` : "PUF1" container framing and the header message
// - `varint` : base-128 integers used by the header
// - `bspatch`: BSDIFF40 interpreter over `Stream`s
// - `diff`   : patch creation
// - `apply`  : patch application, in memory or on files

pub mod apply;
pub mod bspatch;
pub mod diff;
pub mod header;
pub mod varint;

pub use apply::{PatchOptions, patch_file, puff_patch, puff_patch_streams, puff_patch_to_writer};
pub use bspatch::bspatch;
pub use diff::{DiffOptions, puff_diff, puff_diff_streams};
pub use header::{PATCH_MAGIC, PatchHeader, StreamInfo, read_patch, write_patch};
