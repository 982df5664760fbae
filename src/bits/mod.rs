// Sub-byte I/O for deflate bitstreams.
//
// Deflate packs fields least-significant bit first, so both the reader and
// the writer accumulate values low-to-high. Huffman codes are stored
// bit-reversed by the `huffman` module so they can go through the same path.
//
// - `reader`: BitReader over a byte slice, optionally limited to a bit range
// - `writer`: BitWriter into an `Output`
// - `output`: counting (size probing) vs materializing byte targets

pub mod output;
pub mod reader;
pub mod writer;

pub use output::Output;
pub use reader::BitReader;
pub use writer::BitWriter;
