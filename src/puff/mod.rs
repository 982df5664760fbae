// Puff: a byte-aligned, entropy-decoded form of a deflate stream.
//
// Every deflate block becomes a metadata record followed by its literals and
// back-references in a plain byte encoding, so two similar deflate streams
// produce puff streams with long common substrings even when their Huffman
// codes differ. The transformation is exactly invertible.
//
// - `data`  : PuffData items and block types
// - `writer`: PuffWriter (serializes items, coalesces literal runs)
// - `reader`: PuffReader (parses items back)
// - `puffer`: deflate bitstream → puff items
// - `huffer`: puff items → deflate bitstream

pub mod data;
pub mod huffer;
pub mod puffer;
pub mod reader;
pub mod writer;

pub use data::{BlockType, PuffData};
pub use huffer::Huffer;
pub use puffer::Puffer;
pub use reader::PuffReader;
pub use writer::PuffWriter;
