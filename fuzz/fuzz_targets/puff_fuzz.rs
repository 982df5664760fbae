#![no_main]
use libfuzzer_sys::fuzz_target;
use oxipuff::bits::{BitReader, BitWriter, Output};
use oxipuff::puff::{Huffer, PuffReader, PuffWriter, Puffer};

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes as deflate: puffing must fail cleanly or produce a puff
    // stream that huffs back to the same bits.
    let mut counting = PuffWriter::new(Output::Counting);
    if Puffer::new()
        .puff_deflate(&mut BitReader::new(data), &mut counting, None)
        .is_err()
    {
        return;
    }
    let mut puffed = vec![0u8; counting.size()];
    let mut pw = PuffWriter::new(Output::Buffer(&mut puffed));
    Puffer::new()
        .puff_deflate(&mut BitReader::new(data), &mut pw, None)
        .unwrap();

    let mut bw = BitWriter::new(Output::Counting);
    let _ = Huffer::new().huff_deflate(&mut PuffReader::new(&puffed), &mut bw);

    // Arbitrary bytes as puff.
    let mut bw = BitWriter::new(Output::Counting);
    let _ = Huffer::new().huff_deflate(&mut PuffReader::new(data), &mut bw);
});
