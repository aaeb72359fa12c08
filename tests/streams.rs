/*!
# Aprieta: Stream Tests.

Every stream the encoder produces gets fed through a third-party inflater;
matching bytes out the other side is the only definition of correct that
matters here.
*/

use aprieta::{
	deflate,
	deflate_into,
	BitWriter,
	BlockKind,
	Options,
};
use miniz_oxide::inflate::decompress_to_vec;



/// # Encode, Decode, Compare.
fn roundtrip(opts: &Options, data: &[u8]) -> Vec<u8> {
	let raw = deflate(opts, data).expect("deflate failed");
	let back = decompress_to_vec(&raw).expect("stream did not decode");
	assert_eq!(back, data, "roundtrip mismatch for {} bytes", data.len());
	raw
}

/// # Deterministic Filler Bytes.
fn xorshift_bytes(mut seed: u32, len: usize) -> Vec<u8> {
	let mut out = Vec::with_capacity(len);
	while out.len() < len {
		seed ^= seed << 13;
		seed ^= seed >> 17;
		seed ^= seed << 5;
		out.extend_from_slice(&seed.to_le_bytes());
	}
	out.truncate(len);
	out
}



#[test]
/// # Scenario: Empty Input.
fn t_empty() {
	let raw = roundtrip(&Options::default(), &[]);
	assert!(! raw.is_empty(), "even empty input needs a final block");
}

#[test]
/// # Scenario: One Byte.
fn t_single_byte() {
	roundtrip(&Options::default(), &[0x41]);
}

#[test]
/// # Scenario: A Kilobyte of Zeroes.
fn t_zeroes() {
	let data = vec![0_u8; 1024];
	let raw = roundtrip(&Options::default(), &data);
	assert!(raw.len() < 20, "1024 zeroes took {} bytes", raw.len());
}

#[test]
/// # Scenario: Alternating Pair.
fn t_alternating() {
	let data: Vec<u8> = b"ab".iter().copied().cycle().take(32).collect();
	let raw = roundtrip(&Options::default(), &data);
	assert!(raw.len() < data.len(), "\"ab\"*16 should shrink");
}

#[test]
/// # Scenario: Byte Counter Mod 251.
fn t_mod_251() {
	let data: Vec<u8> = (0..65_536_u32).map(|i| (i % 251) as u8).collect();
	let raw = roundtrip(&Options::default(), &data);

	// Fixed trees cannot get anywhere near this tight on these symbols; a
	// result this small means at least one dynamic block was chosen.
	assert!(raw.len() < 800, "mod-251 sequence took {} bytes", raw.len());
}

#[test]
/// # Scenario: Skewed Symbols.
///
/// One overwhelmingly dominant byte with every other value sprinkled rarely
/// pushes the tree builder toward its 15-bit ceiling; the stream has to
/// stay legal anyway.
fn t_skewed_symbols() {
	let mut data = vec![0_u8; 32_768];
	let mut next = 0_u8;
	for i in (64..32_768).step_by(128) {
		next = next.wrapping_add(1).max(1);
		data[i] = next;
		// Break up the zero runs a little so literals stay in play.
		data[i + 1] = next.rotate_left(3);
	}
	roundtrip(&Options::default(), &data);
}

#[test]
/// # Identical Runs Produce Identical Streams.
fn t_determinism() {
	let data = xorshift_bytes(0xdead_beef, 40_000);
	let opts = Options::default();
	let a = deflate(&opts, &data).unwrap();
	let b = deflate(&opts, &data).unwrap();
	assert_eq!(a, b, "same input, same options, different bytes");
}

#[test]
/// # More Iterations Never Cost Much.
///
/// The loop keeps its best-so-far, so a bigger budget should land at or
/// near the smaller budget's size. (Block splitting can shift boundaries,
/// hence the slack.)
fn t_iteration_monotonicity() {
	let mut data = xorshift_bytes(0x1234_5678, 30_000);
	// Fold in some structure so there is actually something to optimize.
	for i in 0..data.len() { if i % 3 != 0 { data[i] = (i % 64) as u8; } }

	let small = deflate(&Options { iterations: 1, ..Options::default() }, &data).unwrap();
	let big = deflate(&Options { iterations: 15, ..Options::default() }, &data).unwrap();

	assert!(
		big.len() <= small.len() + small.len() / 20 + 64,
		"15 iterations ({}) much worse than 1 ({})",
		big.len(),
		small.len(),
	);
}

#[test]
/// # Mixed Content Survives.
fn t_mixed_content() {
	let mut data = Vec::new();
	data.extend_from_slice(&xorshift_bytes(7, 5000));
	data.extend_from_slice(&vec![b'z'; 5000]);
	data.extend_from_slice(&b"a longer piece of honest-to-goodness text, repeated. ".repeat(100));
	data.extend_from_slice(&xorshift_bytes(11, 5000));

	let opts = Options { iterations: 5, ..Options::default() };
	roundtrip(&opts, &data);
}

#[test]
/// # Splitting Disabled Still Decodes.
fn t_no_splitting() {
	let mut data = Vec::new();
	data.extend_from_slice(&xorshift_bytes(3, 8000));
	data.extend_from_slice(&vec![0_u8; 8000]);

	let opts = Options {
		iterations: 5,
		block_splitting: false,
		..Options::default()
	};
	roundtrip(&opts, &data);
}

#[test]
/// # Unlimited Splitting Still Decodes.
fn t_unlimited_splitting() {
	let mut data = Vec::new();
	for i in 0..20_u8 {
		data.extend_from_slice(&vec![i.wrapping_mul(17); 700]);
		data.extend_from_slice(&xorshift_bytes(u32::from(i) + 1, 700));
	}

	let opts = Options {
		iterations: 3,
		block_splitting_max: 0,
		..Options::default()
	};
	roundtrip(&opts, &data);
}

#[test]
/// # Forced Stored Blocks.
fn t_forced_stored() {
	let data = xorshift_bytes(99, 200_000);

	let mut out = BitWriter::new();
	deflate_into(&Options::default(), BlockKind::Stored, true, &data, &mut out).unwrap();
	let raw = out.finish();

	// 200,000 bytes spans four stored sub-blocks: framing only, no
	// compression.
	assert_eq!(raw.len(), 200_000 + 4 * 5);
	assert_eq!(decompress_to_vec(&raw).unwrap(), data);
}

#[test]
/// # Forced Fixed Blocks.
fn t_forced_fixed() {
	let data: Vec<u8> = b"fixed trees, fixed trees, fixed trees!".repeat(50);

	let mut out = BitWriter::new();
	deflate_into(&Options::default(), BlockKind::Fixed, true, &data, &mut out).unwrap();
	let raw = out.finish();

	assert_eq!(decompress_to_vec(&raw).unwrap(), data);
	assert!(raw.len() < data.len());

	// BTYPE of the first (and only) block should be 01.
	assert_eq!(raw[0] & 0b0000_0111, 0b0000_0011);
}

#[test]
/// # Multi-Part Streams.
///
/// Non-final parts append blocks without BFINAL; the concatenation decodes
/// as one stream.
fn t_multi_part() {
	let part1 = xorshift_bytes(21, 10_000);
	let part2 = vec![b'q'; 10_000];
	let part3 = b"the final part".to_vec();

	let opts = Options { iterations: 5, ..Options::default() };
	let mut out = BitWriter::new();
	deflate_into(&opts, BlockKind::Automatic, false, &part1, &mut out).unwrap();
	deflate_into(&opts, BlockKind::Automatic, false, &part2, &mut out).unwrap();
	deflate_into(&opts, BlockKind::Automatic, true, &part3, &mut out).unwrap();

	let mut expected = part1;
	expected.extend_from_slice(&part2);
	expected.extend_from_slice(&part3);
	assert_eq!(decompress_to_vec(&out.finish()).unwrap(), expected);
}

#[test]
/// # Assorted Roundtrips.
fn t_roundtrip_sweep() {
	let opts = Options { iterations: 3, ..Options::default() };
	for (seed, len) in [
		(1_u32, 1_usize), (2, 2), (3, 3), (4, 10), (5, 100),
		(6, 1000), (7, 4096), (8, 10_001), (9, 65_535),
	] {
		// Raw noise.
		roundtrip(&opts, &xorshift_bytes(seed, len));

		// Noise with heavy repetition folded in.
		let mut data = xorshift_bytes(seed, len);
		let half = data.len() / 2;
		let front: Vec<u8> = data[..half].to_vec();
		data.extend_from_slice(&front);
		roundtrip(&opts, &data);
	}
}

#[test]
/// # Bit Position Reporting.
fn t_bit_pos() {
	// An empty final stream is a fixed header plus seven zero bits: ten
	// bits, so two bytes with two bits used in the last.
	let mut out = BitWriter::new();
	deflate_into(&Options::default(), BlockKind::Automatic, true, &[], &mut out).unwrap();
	assert_eq!(out.len(), 2);
	assert_eq!(out.bit_pos(), 2);

	// Stored blocks always end byte-aligned.
	let mut out = BitWriter::new();
	deflate_into(&Options::default(), BlockKind::Stored, true, b"abc", &mut out).unwrap();
	assert_eq!(out.bit_pos(), 0);
}
