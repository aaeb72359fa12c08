/*!
# Aprieta: Tree Encoding.

Canonical code assignment and the dynamic-header tree plumbing: merging the
two length sets, run-length coding them with the 16/17/18 alphabet, and
pricing the eight possible run-code subsets to find the cheapest header.
*/

use crate::{
	ArrayD,
	ArrayLL,
	bits::BitWriter,
	DeflateError,
	katajainen::length_limited_lengths,
	symbols::TREE_ORDER,
};



/// # Canonical Code Assignment.
///
/// Turn code lengths into the canonical codes of RFC 1951 §3.2.2: count the
/// codes per length, derive each length's first code, then hand codes out in
/// symbol order. Unused symbols keep code zero.
pub(crate) const fn canonical_symbols<const N: usize>(lengths: &[u32; N]) -> [u32; N] {
	// Tally codes per length. (Over-allocating the scratch to 19 slots lets
	// the compiler forget about bounds here; lengths never exceed 15.)
	let mut counts = [0_u32; 19];
	let mut i = 0;
	while i < N {
		counts[lengths[i] as usize] += 1;
		i += 1;
	}
	counts[0] = 0;

	// The first code of each length.
	let mut next = [0_u32; 16];
	let mut code = 0;
	let mut bits = 1;
	while bits < 16 {
		code = (code + counts[bits - 1]) << 1;
		next[bits] = code;
		bits += 1;
	}

	// Hand them out.
	let mut symbols = [0_u32; N];
	let mut i = 0;
	while i < N {
		let l = lengths[i] as usize;
		if l != 0 {
			symbols[i] = next[l];
			next[l] += 1;
		}
		i += 1;
	}
	symbols
}



/// # Best Tree Size.
///
/// Price the tree header under every combination of the three run codes and
/// return the winning combination (as a bitmask) along with its size in
/// bits.
pub(crate) fn best_tree_size(
	ll_lengths: &ArrayLL<u32>,
	d_lengths: &ArrayD<u32>,
) -> Result<(u8, u32), DeflateError> {
	let (all, _, _) = tree_symbols(ll_lengths, d_lengths);

	let mut best_extra = 0;
	let mut best_size = u32::MAX;

	for extra in 0..8 {
		let cl_counts = tree_counts(&all, extra, None);
		let cl_lengths = length_limited_lengths::<7, 19>(&cl_counts)?;
		let hclen = tree_hclen(&cl_counts);

		let mut size = 14 + (hclen + 4) * 3;
		size += cl_lengths.iter()
			.zip(cl_counts.iter())
			.map(|(a, b)| a * b)
			.sum::<u32>();
		size += cl_counts[16] * 2;
		size += cl_counts[17] * 3;
		size += cl_counts[18] * 7;

		if size < best_size {
			best_extra = extra;
			best_size = size;
		}
	}

	Ok((best_extra, best_size))
}

/// # Encode Tree.
///
/// Write the dynamic header for the given lengths using the (previously
/// chosen) run-code subset.
pub(crate) fn encode_tree(
	ll_lengths: &ArrayLL<u32>,
	d_lengths: &ArrayD<u32>,
	extra: u8,
	out: &mut BitWriter,
) -> Result<(), DeflateError> {
	let (all, hlit, hdist) = tree_symbols(ll_lengths, d_lengths);

	let mut rle: Vec<(u8, u16)> = Vec::new();
	let cl_counts = tree_counts(&all, extra, Some(&mut rle));
	let cl_lengths = length_limited_lengths::<7, 19>(&cl_counts)?;
	let hclen = tree_hclen(&cl_counts);
	let cl_symbols = canonical_symbols(&cl_lengths);

	out.add_bits(hlit, 5);
	out.add_bits(hdist, 5);
	out.add_bits(hclen, 4);

	// The code-length code lengths, in their jumbled transmission order.
	for &o in TREE_ORDER.iter().take(hclen as usize + 4) {
		out.add_bits(cl_lengths[o], 3);
	}

	// Then the run-length-coded lengths themselves.
	for (symbol, value) in rle {
		let s = symbol as usize;
		out.add_huffman_bits(cl_symbols[s], cl_lengths[s]);
		match symbol {
			16 => out.add_bits(u32::from(value), 2),
			17 => out.add_bits(u32::from(value), 3),
			18 => out.add_bits(u32::from(value), 7),
			_ => {},
		}
	}

	Ok(())
}



/// # Merge Length Sets.
///
/// Truncate trailing zero lengths from both alphabets (the end-of-block
/// symbol and first distance always stay), then concatenate them into the
/// sequence the header encodes. Returns the merged lengths plus the HLIT
/// and HDIST header values.
fn tree_symbols(ll_lengths: &ArrayLL<u32>, d_lengths: &ArrayD<u32>)
-> (Vec<u32>, u32, u32) {
	let hlit = ll_lengths[257..286].iter()
		.rposition(|&l| l != 0)
		.map_or(0, |v| v + 1);
	let hdist = d_lengths[1..30].iter()
		.rposition(|&l| l != 0)
		.map_or(0, |v| v + 1);

	let mut all = Vec::with_capacity(258 + hlit + hdist);
	all.extend_from_slice(&ll_lengths[..257 + hlit]);
	all.extend_from_slice(&d_lengths[..1 + hdist]);

	(all, hlit as u32, hdist as u32)
}

/// # Transmitted Code-Length Count.
///
/// Walk the transmission order backwards to find the last code-length
/// symbol actually used; the header only sends through there. Returns the
/// HCLEN value (count minus four).
fn tree_hclen(cl_counts: &[u32; 19]) -> u32 {
	let mut hclen = 15_usize;
	while 0 < hclen && cl_counts[TREE_ORDER[hclen + 3]] == 0 { hclen -= 1; }
	hclen as u32
}

/// # Run-Length Code the Lengths.
///
/// Tally the code-length symbols produced by run-length coding `all` with
/// whichever of the 16/17/18 codes `extra` enables, optionally recording the
/// emitted (symbol, extra value) pairs for the writer.
fn tree_counts(
	all: &[u32],
	extra: u8,
	mut rle: Option<&mut Vec<(u8, u16)>>,
) -> [u32; 19] {
	let use_16 = 0 != extra & 1;
	let use_17 = 0 != extra & 2;
	let use_18 = 0 != extra & 4;

	let mut cl_counts = [0_u32; 19];

	/// # Emit a Run Symbol.
	macro_rules! run {
		($count:ident, $step:literal, $max:literal, $symbol:literal) => (
			while $count >= $step {
				let chunk = if $count < $max { $count } else { $max };
				if let Some(v) = rle.as_mut() { v.push(($symbol, chunk - $step)); }
				cl_counts[$symbol as usize] += 1;
				$count -= chunk;
			}
		);
	}

	let mut i = 0;
	while i < all.len() {
		let symbol = all[i];
		let mut count: u16 = 1;

		// Peek ahead for repeats when a run code could use them.
		if use_16 || ((use_17 || use_18) && symbol == 0) {
			while i + 1 < all.len() && all[i + 1] == symbol {
				count += 1;
				i += 1;
			}

			// Runs of zeroes have their own codes.
			if symbol == 0 {
				if use_18 { run!(count, 11, 138, 18_u8); }
				if use_17 { run!(count, 3, 10, 17_u8); }
			}

			// Repeats of anything else need the first instance spelled out.
			if use_16 && count >= 4 {
				count -= 1;
				if let Some(v) = rle.as_mut() { v.push((symbol as u8, 0)); }
				cl_counts[symbol as usize] += 1;

				run!(count, 3, 6, 16_u8);
			}
		}

		// Whatever is left goes out literally.
		if let Some(v) = rle.as_mut() {
			for _ in 0..count { v.push((symbol as u8, 0)); }
		}
		cl_counts[symbol as usize] += u32::from(count);
		i += 1;
	}

	cl_counts
}



#[cfg(test)]
mod tests {
	use super::*;
	use crate::symbols::{
		FIXED_SYMBOLS_D,
		FIXED_SYMBOLS_LL,
		FIXED_TREE_D,
		FIXED_TREE_LL,
	};

	#[test]
	/// # Canonical Codes Match the RFC's Fixed Tables.
	fn t_fixed_symbols() {
		assert_eq!(canonical_symbols(&FIXED_TREE_LL), FIXED_SYMBOLS_LL);
		assert_eq!(canonical_symbols(&FIXED_TREE_D), FIXED_SYMBOLS_D);
	}

	#[test]
	/// # RFC 1951 §3.2.2 Worked Example.
	fn t_canonical_example() {
		// (A..H) with lengths 3,3,3,3,3,2,4,4 codes as the RFC tabulates.
		let lengths: [u32; 8] = [3, 3, 3, 3, 3, 2, 4, 4];
		assert_eq!(
			canonical_symbols(&lengths),
			[0b010, 0b011, 0b100, 0b101, 0b110, 0b00, 0b1110, 0b1111],
		);
	}

	#[test]
	fn t_hclen_floor() {
		// Only symbol zero used: everything in the order after index 3
		// drops off, leaving the minimum four entries.
		let mut counts = [0_u32; 19];
		counts[0] = 10;
		assert_eq!(tree_hclen(&counts), 0);

		// Symbol 15 is transmitted last of all.
		counts[15] = 1;
		assert_eq!(tree_hclen(&counts), 15);
	}

	#[test]
	/// # Run Coding Accounts for Every Entry.
	fn t_tree_counts_cover() {
		let all: Vec<u32> = [
			vec![8; 20],
			vec![0; 40],
			vec![9, 9, 9, 7],
			vec![0; 5],
			vec![4],
		].concat();

		for extra in 0..8_u8 {
			let mut rle = Vec::new();
			let counts = tree_counts(&all, extra, Some(&mut rle));

			// Re-expand the RLE output and compare with the source.
			let mut expanded = Vec::new();
			for (symbol, value) in &rle {
				match symbol {
					16 => {
						let prev = *expanded.last().unwrap();
						for _ in 0..value + 3 { expanded.push(prev); }
					},
					17 => for _ in 0..value + 3 { expanded.push(0); },
					18 => for _ in 0..value + 11 { expanded.push(0); },
					s => expanded.push(u32::from(*s)),
				}
			}
			assert_eq!(expanded, all, "RLE expansion diverged for extra={extra}.");

			// And the counts should agree with the emitted symbols.
			let mut recount = [0_u32; 19];
			for (symbol, _) in &rle { recount[*symbol as usize] += 1; }
			assert_eq!(counts, recount, "Count drift for extra={extra}.");
		}
	}

	#[test]
	/// # Tree Sizing Matches an Actual Encode.
	fn t_size_matches_encode() {
		let mut ll = FIXED_TREE_LL;
		ll[0] = 4;
		ll[1] = 4;
		ll[100] = 0;
		ll[101] = 0;
		let mut d = FIXED_TREE_D;
		d[20] = 0;
		d[21] = 0;

		let (extra, size) = best_tree_size(&ll, &d).unwrap();

		let mut out = BitWriter::new();
		encode_tree(&ll, &d, extra, &mut out).unwrap();
		let written = (out.len() * 8) - match out.bit_pos() {
			0 => 0,
			bp => usize::from(8 - bp),
		};
		assert_eq!(written, size as usize, "Priced and written sizes differ.");
	}
}
