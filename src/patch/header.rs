// Patch container framing and header message.
//
// Layout:
//   [0..4)     "PUF1"
//   [4..8)     header message length H, big-endian u32
//   [8..8+H)   header message
//   [8+H..)    bsdiff payload
//
// The header message is a sequence of varints: the version, then for the
// source and then the destination: deflate count, (bit offset, bit length)
// per deflate, puff count, (offset, length) per puff, puff length. Puff
// extents are stored in bits, like the deflates, so both lists share one unit;
// the decoder rejects puff values that are not whole bytes. Deflate and puff
// lists correspond by index.

use crate::error::{Result, insufficient_input, invalid, unsupported};
use crate::extent::{BitExtent, ByteExtent};

use super::varint::{read_u64, write_u64};

pub const PATCH_MAGIC: &[u8; 4] = b"PUF1";
pub const PATCH_VERSION: u64 = 1;
const FRAME_LEN: usize = 8;

/// Where the deflates of one file live, and where their puffs go.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamInfo {
    pub deflates: Vec<BitExtent>,
    pub puffs: Vec<ByteExtent>,
    pub puff_length: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchHeader {
    pub src: StreamInfo,
    pub dst: StreamInfo,
}

impl PatchHeader {
    /// Serialize the header message (without the container frame).
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        write_u64(&mut out, PATCH_VERSION);
        for info in [&self.src, &self.dst] {
            write_u64(&mut out, info.deflates.len() as u64);
            for d in &info.deflates {
                write_u64(&mut out, d.offset);
                write_u64(&mut out, d.length);
            }
            write_u64(&mut out, info.puffs.len() as u64);
            for p in &info.puffs {
                write_u64(&mut out, to_bits(p.offset)?);
                write_u64(&mut out, to_bits(p.length)?);
            }
            write_u64(&mut out, info.puff_length);
        }
        Ok(out)
    }

    /// Parse a header message produced by [`encode`](Self::encode).
    pub fn decode(msg: &[u8]) -> Result<Self> {
        let mut r = VarIntCursor { data: msg, pos: 0 };
        let version = r.next()?;
        if version != PATCH_VERSION {
            return Err(unsupported(format!("patch header version {version}")));
        }
        let src = r.stream_info()?;
        let dst = r.stream_info()?;
        if r.pos != msg.len() {
            return Err(invalid(format!(
                "{} unparsed bytes in patch header",
                msg.len() - r.pos
            )));
        }
        Ok(Self { src, dst })
    }
}

fn to_bits(bytes: u64) -> Result<u64> {
    bytes
        .checked_mul(8)
        .ok_or_else(|| invalid(format!("puff extent value {bytes} overflows in bits")))
}

struct VarIntCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl VarIntCursor<'_> {
    fn next(&mut self) -> Result<u64> {
        let (value, len) = read_u64(&self.data[self.pos..])?;
        self.pos += len;
        Ok(value)
    }

    /// A puff extent field, stored in bits.
    fn next_puff_bytes(&mut self) -> Result<u64> {
        let bits = self.next()?;
        if bits % 8 != 0 {
            return Err(invalid(format!("puff extent value {bits} is not byte aligned")));
        }
        Ok(bits / 8)
    }

    /// A list length, bounded by what the remaining bytes could hold.
    fn count(&mut self) -> Result<usize> {
        let count = self.next()?;
        let room = (self.data.len() - self.pos) as u64 / 2;
        if count > room {
            return Err(insufficient_input(format!(
                "patch header lists {count} extents but has room for {room}"
            )));
        }
        Ok(count as usize)
    }

    fn stream_info(&mut self) -> Result<StreamInfo> {
        let n = self.count()?;
        let mut deflates = Vec::with_capacity(n);
        for _ in 0..n {
            deflates.push(BitExtent::new(self.next()?, self.next()?));
        }
        let n = self.count()?;
        let mut puffs = Vec::with_capacity(n);
        for _ in 0..n {
            puffs.push(ByteExtent::new(self.next_puff_bytes()?, self.next_puff_bytes()?));
        }
        if deflates.len() != puffs.len() {
            return Err(invalid(format!(
                "patch header pairs {} deflates with {} puffs",
                deflates.len(),
                puffs.len()
            )));
        }
        let puff_length = self.next()?;
        Ok(StreamInfo {
            deflates,
            puffs,
            puff_length,
        })
    }
}

/// Frame `header` and `payload` into a patch.
pub fn write_patch(header: &PatchHeader, payload: &[u8]) -> Result<Vec<u8>> {
    let msg = header.encode()?;
    let len = u32::try_from(msg.len())
        .map_err(|_| invalid(format!("{}-byte patch header", msg.len())))?;
    let mut out = Vec::with_capacity(FRAME_LEN + msg.len() + payload.len());
    out.extend_from_slice(PATCH_MAGIC);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(&msg);
    out.extend_from_slice(payload);
    Ok(out)
}

/// Split a patch into its header and bsdiff payload.
pub fn read_patch(patch: &[u8]) -> Result<(PatchHeader, &[u8])> {
    if patch.len() < FRAME_LEN {
        return Err(insufficient_input(format!("{}-byte patch", patch.len())));
    }
    if &patch[..4] != PATCH_MAGIC {
        return Err(invalid("bad patch magic"));
    }
    let len = u32::from_be_bytes([patch[4], patch[5], patch[6], patch[7]]) as usize;
    let rest = &patch[FRAME_LEN..];
    if len > rest.len() {
        return Err(insufficient_input(format!(
            "patch header length {len} exceeds the {} bytes that follow",
            rest.len()
        )));
    }
    let header = PatchHeader::decode(&rest[..len])?;
    Ok((header, &rest[len..]))
}
