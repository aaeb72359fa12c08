/*!
# Aprieta: Dynamic Lengths.

Dynamic blocks get two shots at their Huffman trees: one straight from the
range histogram, and one from a run-friendlier "flattened" copy of the
counts that often buys a cheaper tree header. Whichever encodes smaller
wins.

The whole exercise is expensive and gets repeated for overlapping ranges
during block splitting, so results are memoized per thread, keyed by a
fingerprint of the counts and lengths.
*/

use crate::{
	ArrayD,
	ArrayLL,
	DeflateError,
	katajainen::length_limited_lengths,
	Lz77Store,
	NUM_LL,
	StoreRange,
	symbols::{
		DISTANCE_BITS,
		LENGTH_SYMBOL_EXTRA,
	},
	tree::best_tree_size,
};
use dactyl::NoHash;
use std::{
	cell::RefCell,
	collections::{
		hash_map::Entry,
		HashMap,
	},
};

/// # Memo Map.
type TreeCache = HashMap<u64, CacheEntry, NoHash>;

thread_local!(
	/// # Tree Size Memo.
	///
	/// Block splitting prices the same (or nearly the same) ranges over and
	/// over; caching the tree results takes most of the sting out. Cleared
	/// at the top of every `deflate` call to keep it from growing without
	/// bound.
	static CACHE: RefCell<TreeCache> = RefCell::new(HashMap::default())
);

/// # Reset the Tree Size Memo.
pub(crate) fn reset_tree_cache() { CACHE.with_borrow_mut(HashMap::clear); }



/// # Get Dynamic Lengths.
///
/// Build the dynamic-block Huffman lengths for a store range, trying both
/// the raw and flattened histograms, and return the winner's run-code
/// choice, total size in bits (tree plus data, sans the 3-bit block
/// header), and the two length sets.
pub(crate) fn get_dynamic_lengths(store: &Lz77Store, rng: StoreRange)
-> Result<(u8, u32, ArrayLL<u32>, ArrayD<u32>), DeflateError> {
	let (mut ll_counts, d_counts) = store.histogram(rng)?;
	ll_counts[256] = 1;

	CACHE.with_borrow_mut(|cache| {
		let ll_lengths = length_limited_lengths::<15, NUM_LL>(&ll_counts)?;
		let d_lengths = patched_distance_lengths(&d_counts)?;
		let (first, key) = sized(cache, &ll_counts, &d_counts, &ll_lengths, &d_lengths)?;

		// Unless a previous visit already proved flattening useless here,
		// price the flattened variant too.
		if ! first.noop() {
			let (ll_lengths2, d_lengths2) = flattened_lengths(&ll_counts, &d_counts)?;
			let (second, _) = sized(cache, &ll_counts, &d_counts, &ll_lengths2, &d_lengths2)?;

			if second.size < first.size {
				return Ok((second.extra(), second.size, ll_lengths2, d_lengths2));
			}

			// Remember the no-op so the next lookup can skip it.
			if let Some(e) = cache.get_mut(&key) { e.set_noop(); }
		}

		Ok((first.extra(), first.size, ll_lengths, d_lengths))
	})
}

/// # Patched Distance Lengths.
///
/// Build the distance code lengths, then make sure at least two of the
/// first thirty are non-zero. zlib releases from the early 2000s choke on
/// headers with fewer, and the patch only ever costs one phantom bit.
pub(crate) fn patched_distance_lengths(d_counts: &ArrayD<u32>)
-> Result<ArrayD<u32>, DeflateError> {
	let mut d_lengths = length_limited_lengths::<15, 32>(d_counts)?;

	let mut first_used: Option<bool> = None;
	for (i, len) in d_lengths.iter().copied().enumerate().take(30) {
		// Two used codes is all it takes.
		if len != 0 && first_used.replace(i == 0).is_some() { return Ok(d_lengths); }
	}

	match first_used {
		// Symbol zero has a code; give symbol one a filler.
		Some(true) => { d_lengths[1] = 1; },
		// Something else has a code; give symbol zero a filler.
		Some(false) => { d_lengths[0] = 1; },
		// Nothing has a code; fill both.
		None => {
			d_lengths[0] = 1;
			d_lengths[1] = 1;
		},
	}

	Ok(d_lengths)
}

/// # Dynamic Data Size.
///
/// The body size (in bits) of a dynamic block: every symbol at its coded
/// length plus any extra bits, plus the end-of-block code.
pub(crate) fn dynamic_data_size(
	ll_counts: &ArrayLL<u32>,
	d_counts: &ArrayD<u32>,
	ll_lengths: &ArrayLL<u32>,
	d_lengths: &ArrayD<u32>,
) -> u32 {
	// Literals are just their code lengths.
	let a = ll_lengths.iter()
		.zip(ll_counts.iter())
		.take(256)
		.map(|(l, c)| l * c)
		.sum::<u32>();

	// Length symbols carry extra bits.
	let b = ll_lengths[257..].iter()
		.zip(ll_counts[257..].iter())
		.zip(LENGTH_SYMBOL_EXTRA)
		.map(|((l, c), extra)| (l + u32::from(extra)) * c)
		.sum::<u32>();

	// As do distances.
	let c = d_lengths.iter()
		.zip(d_counts.iter())
		.zip(DISTANCE_BITS)
		.take(30)
		.map(|((l, c), extra)| (l + u32::from(extra)) * c)
		.sum::<u32>();

	a + b + c + ll_lengths[256]
}



#[derive(Debug, Clone, Copy)]
/// # Memo Entry.
struct CacheEntry {
	/// # Run-Code Choice (Plus the No-Op Flag).
	extra: u8,

	/// # Tree and Data Size (Bits).
	size: u32,
}

impl CacheEntry {
	/// # Run-Code Mask.
	const MASK_EXTRA: u8 = 0b0000_0111;

	/// # Fruitless-Flattening Flag.
	const MASK_NOOP: u8 = 0b0000_1000;

	/// # Run-Code Choice.
	const fn extra(self) -> u8 { self.extra & Self::MASK_EXTRA }

	/// # Was Flattening Fruitless?
	const fn noop(self) -> bool { Self::MASK_NOOP == self.extra & Self::MASK_NOOP }

	/// # Flag Flattening as Fruitless.
	fn set_noop(&mut self) { self.extra |= Self::MASK_NOOP; }
}



/// # Price a Length Set.
///
/// Return the memoized tree/data sizing for the given counts and lengths,
/// computing and caching it on first sight. The fingerprint is returned too
/// so callers can re-touch the entry without rehashing.
fn sized(
	cache: &mut TreeCache,
	ll_counts: &ArrayLL<u32>,
	d_counts: &ArrayD<u32>,
	ll_lengths: &ArrayLL<u32>,
	d_lengths: &ArrayD<u32>,
) -> Result<(CacheEntry, u64), DeflateError> {
	let key = fingerprint(ll_counts, d_counts, ll_lengths, d_lengths);

	let slot = match cache.entry(key) {
		Entry::Occupied(e) => return Ok((*e.get(), key)),
		Entry::Vacant(e) => e,
	};

	let (extra, treesize) = best_tree_size(ll_lengths, d_lengths)?;
	let datasize = dynamic_data_size(ll_counts, d_counts, ll_lengths, d_lengths);
	let out = CacheEntry { extra, size: treesize.saturating_add(datasize) };

	slot.insert(out);
	Ok((out, key))
}

/// # Fingerprint Counts and Lengths.
///
/// A fixed-seed hash so the memo map behaves identically from run to run;
/// determinism is a promise here, not a nicety.
fn fingerprint(
	ll_counts: &ArrayLL<u32>,
	d_counts: &ArrayD<u32>,
	ll_lengths: &ArrayLL<u32>,
	d_lengths: &ArrayD<u32>,
) -> u64 {
	use ahash::RandomState;
	use std::hash::{
		BuildHasher,
		Hash,
		Hasher,
	};

	let mut h = RandomState::with_seeds(
		0x243f_6a88_85a3_08d3,
		0x1319_8a2e_0370_7344,
		0xa409_3822_299f_31d0,
		0x082e_fa98_ec4e_6c89,
	).build_hasher();

	ll_counts.hash(&mut h);
	d_counts.hash(&mut h);
	ll_lengths.hash(&mut h);
	d_lengths.hash(&mut h);

	h.finish()
}

/// # Flattened-Count Lengths.
///
/// Copy the histograms, smooth them for run-friendliness, and rebuild the
/// length sets. (The smoothed counts themselves are not returned; sizing
/// always uses the real ones.)
fn flattened_lengths(ll_counts: &ArrayLL<u32>, d_counts: &ArrayD<u32>)
-> Result<(ArrayLL<u32>, ArrayD<u32>), DeflateError> {
	let mut ll_counts2 = *ll_counts;
	let mut d_counts2 = *d_counts;
	optimize_for_rle(&mut ll_counts2);
	optimize_for_rle(&mut d_counts2);

	let ll_lengths2 = length_limited_lengths::<15, NUM_LL>(&ll_counts2)?;
	let d_lengths2 = patched_distance_lengths(&d_counts2)?;
	Ok((ll_lengths2, d_lengths2))
}

/// # Smooth Counts for Run Coding.
///
/// Replace stretches of near-equal counts with their average so the
/// resulting code lengths form longer runs, which the 16/17/18 codes can
/// then squeeze. Stretches that are already run-perfect (5+ zeroes, 7+
/// identical values) are left alone.
fn optimize_for_rle(counts: &mut [u32]) {
	// Ignore trailing zeroes.
	let mut len = counts.len();
	while 0 < len && counts[len - 1] == 0 { len -= 1; }
	if len == 0 { return; }

	// First pass: mark the stretches that already run-code well.
	let mut good = [false; NUM_LL];
	let mut symbol = counts[0];
	let mut stride = 0_usize;
	for i in 0..=len {
		if i == len || counts[i] != symbol {
			if (symbol == 0 && stride >= 5) || (symbol != 0 && stride >= 7) {
				for flag in &mut good[i - stride..i] { *flag = true; }
			}
			stride = 1;
			if i != len { symbol = counts[i]; }
		}
		else { stride += 1; }
	}

	// Second pass: collapse everything else that holds still long enough.
	let mut stride = 0_usize;
	let mut limit = counts[0];
	let mut sum = 0_u32;
	for i in 0..=len {
		if i == len || good[i] || counts[i].abs_diff(limit) >= 4 {
			if 0 < sum && 4 <= stride {
				#[allow(clippy::integer_division)] // A rounded average.
				let v = ((sum + stride as u32 / 2) / stride as u32).max(1);
				for c in &mut counts[i - stride..i] { *c = v; }
			}

			stride = 0;
			sum = 0;

			// Aim at the local average so slow drifts still collapse.
			#[allow(clippy::integer_division)]
			if i + 3 < len {
				limit = (counts[i] + counts[i + 1] + counts[i + 2] + counts[i + 3] + 2) / 4;
			}
			else if i < len { limit = counts[i]; }
			else { limit = 0; }
		}

		stride += 1;
		if i != len { sum += counts[i]; }
	}
}



#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn t_patch_two_codes() {
		// Nothing used: both fillers.
		let counts = [0_u32; 32];
		let lengths = patched_distance_lengths(&counts).unwrap();
		assert_eq!(lengths[0], 1);
		assert_eq!(lengths[1], 1);

		// Only symbol zero used.
		let mut counts = [0_u32; 32];
		counts[0] = 5;
		let lengths = patched_distance_lengths(&counts).unwrap();
		assert_eq!(lengths[0], 1);
		assert_eq!(lengths[1], 1);

		// Only symbol five used.
		let mut counts = [0_u32; 32];
		counts[5] = 5;
		let lengths = patched_distance_lengths(&counts).unwrap();
		assert_eq!(lengths[0], 1);
		assert_eq!(lengths[5], 1);

		// Two in use already; no patching.
		let mut counts = [0_u32; 32];
		counts[3] = 5;
		counts[7] = 9;
		let lengths = patched_distance_lengths(&counts).unwrap();
		assert_eq!(lengths[0], 0);
		assert!(lengths[3] != 0 && lengths[7] != 0);
	}

	#[test]
	fn t_flatten() {
		// A noisy-but-similar stretch should collapse to its average.
		let mut counts = [10_u32, 11, 10, 12, 10, 11, 10, 11];
		optimize_for_rle(&mut counts);
		let first = counts[0];
		assert!(counts.iter().all(|&c| c == first), "Stretch failed to collapse: {counts:?}");

		// Trailing zeroes stay zero.
		let mut counts = [5_u32, 5, 5, 5, 0, 0, 0, 0];
		optimize_for_rle(&mut counts);
		assert_eq!(&counts[4..], &[0, 0, 0, 0]);

		// Values too far apart stay put.
		let mut counts = [1_u32, 100, 1, 100, 1, 100];
		let before = counts;
		optimize_for_rle(&mut counts);
		assert_eq!(counts, before);
	}

	#[test]
	fn t_memo_determinism() {
		// Same fingerprint for the same inputs, run to run.
		let ll_counts = [3_u32; NUM_LL];
		let d_counts = [2_u32; 32];
		let ll_lengths = [8_u32; NUM_LL];
		let d_lengths = [5_u32; 32];

		let a = fingerprint(&ll_counts, &d_counts, &ll_lengths, &d_lengths);
		let b = fingerprint(&ll_counts, &d_counts, &ll_lengths, &d_lengths);
		assert_eq!(a, b);

		let mut ll_counts2 = ll_counts;
		ll_counts2[0] += 1;
		let c = fingerprint(&ll_counts2, &d_counts, &ll_lengths, &d_lengths);
		assert_ne!(a, c);
	}
}
