/*!
# Aprieta: Block Splitting.

Huffman trees are per-block, so data whose symbol mix shifts partway through
often encodes smaller as several blocks. This module hunts for the split
points that minimize the summed estimates: first over raw bytes (via a
greedy parse), then again over the real LZ77 store once the optimal parses
exist.
*/

use crate::{
	blocks::{
		calculate_block_size_auto_type,
		lz77_optimal,
	},
	cache::SplitCache,
	chunk::InputChunk,
	DeflateError,
	error::bug,
	hash::BlockState,
	Lz77Store,
	StoreRange,
};

/// # Minimum Splittable Interval.
const MINIMUM_SPLIT_DISTANCE: usize = 10;

/// # Refinement Sample Points.
///
/// Each refinement round of the cost minimizer probes this many evenly
/// spaced interior points.
const SAMPLE_POINTS: usize = MINIMUM_SPLIT_DISTANCE - 1;



/// # Split Point Scratch.
///
/// Working storage for the split search, reused across blocks and calls so
/// the vectors only ever grow.
pub(crate) struct SplitPoints {
	/// # Byte-Domain Split Points.
	byte_points: Vec<usize>,

	/// # Store-Domain Split Points.
	store_points: Vec<usize>,

	/// # Tried-and-Failed Interval Starts.
	done: SplitCache,
}

impl SplitPoints {
	/// # New.
	pub(crate) const fn new() -> Self {
		Self {
			byte_points: Vec::new(),
			store_points: Vec::new(),
			done: SplitCache::new(),
		}
	}

	/// # Split a Store.
	///
	/// Greedily peel off the most promising split until nothing improves or
	/// the point budget runs out. Results land in `store_points` (sorted);
	/// the count is returned.
	fn split_store(
		&mut self,
		store: &Lz77Store,
		max_points: usize,
	) -> Result<usize, DeflateError> {
		self.store_points.clear();
		if store.len() < MINIMUM_SPLIT_DISTANCE || max_points == 0 { return Ok(0); }

		self.done.init(store.len());
		let mut lstart = 0;
		let mut lend = store.len();
		let mut last = 0;

		loop {
			let (llpos, llcost) = find_minimum_cost(store, lstart + 1, lend)?;
			if llpos <= lstart || lend <= llpos { return Err(bug!()); }

			// No room, or splitting here costs more than not splitting:
			// retire the interval.
			if
				llpos == lstart + 1 ||
				calculate_block_size_auto_type(store, StoreRange::new(lstart, lend)?)? < llcost
			{
				self.done.set(lstart);
			}
			else {
				self.store_points.push(llpos);

				// Keep the list sorted without resorting when appends land
				// in order (they usually do).
				if llpos < last { self.store_points.sort_unstable(); }
				else { last = llpos; }

				if max_points <= self.store_points.len() { break; }
			}

			if ! self.find_largest_splittable(store.len(), &mut lstart, &mut lend) {
				break;
			}
		}

		Ok(self.store_points.len())
	}

	/// # Largest Splittable Interval.
	///
	/// Scan the gaps between current split points for the biggest one not
	/// yet retired. Returns `false` when nothing workable remains.
	fn find_largest_splittable(
		&self,
		store_len: usize,
		lstart: &mut usize,
		lend: &mut usize,
	) -> bool {
		let mut best = 0;
		for i in 0..=self.store_points.len() {
			let start =
				if i == 0 { 0 }
				else { self.store_points[i - 1] };
			let end =
				if i < self.store_points.len() { self.store_points[i] }
				else { store_len - 1 };

			if best < end - start && self.done.is_unset(start) {
				*lstart = start;
				*lend = end;
				best = end - start;
			}
		}
		MINIMUM_SPLIT_DISTANCE <= best
	}

	/// # Split Raw Bytes.
	///
	/// Estimate split points before any expensive parsing by splitting the
	/// store of a greedy pass, then mapping the chosen entry indices back
	/// to byte offsets (into `byte_points`).
	fn split_raw(
		&mut self,
		chunk: InputChunk<'_>,
		state: &mut BlockState,
		store: &mut Lz77Store,
		max_points: usize,
	) -> Result<usize, DeflateError> {
		// The greedy parse reads better tea leaves than an optimal one
		// here, and costs a fraction as much.
		state.greedy(chunk, store, None)?;

		let len = self.split_store(store, max_points)?;
		self.byte_points.clear();
		if len == 0 { return Ok(0); }

		let mut pos = chunk.pos();
		let mut j = 0;
		for (i, e) in store.entries().iter().enumerate() {
			if i == self.store_points[j] {
				self.byte_points.push(pos);
				j += 1;
				if j == len { return Ok(len); }
			}
			pos += e.step_len() as usize;
		}

		// Every split index points inside the store, so the loop cannot run
		// dry before finding them all.
		Err(bug!())
	}

	/// # Best Split Set.
	///
	/// The full two-stage search: raw-byte split points first, an optimal
	/// parse per segment (accumulated into `store`), then a second split
	/// pass over the combined store, keeping whichever split set prices
	/// lower. Returns the winning store-domain points.
	pub(crate) fn split(
		&mut self,
		state: &mut BlockState,
		chunk: InputChunk<'_>,
		numiterations: u32,
		max_points: usize,
		store: &mut Lz77Store,
		scratch: &mut Lz77Store,
	) -> Result<Vec<usize>, DeflateError> {
		let limit = self.split_raw(chunk, state, scratch, max_points)?;
		let byte_points = self.byte_points.clone();
		scratch.clear();

		// Parse each segment optimally, noting where the segments land in
		// the combined store.
		let mut first_points = Vec::with_capacity(limit);
		let mut cost1 = 0_u32;
		let mut best = Lz77Store::new();
		for i in 0..=limit {
			let start = if i == 0 { chunk.pos() } else { byte_points[i - 1] };
			let end = if i < limit { byte_points[i] } else { chunk.arr().len() };
			let part = chunk.reslice(start, end)?;

			lz77_optimal(state, part, numiterations, &mut best, scratch)?;
			cost1 += calculate_block_size_auto_type(
				&best,
				StoreRange::new(0, best.len())?,
			)?;

			store.append_drain(&mut best);
			if i < limit { first_points.push(store.len()); }
		}

		// With multiple segments in hand, the real store may suggest better
		// boundaries than the byte estimates did.
		if 1 < limit {
			let limit2 = self.split_store(store, max_points)?;
			let second_points = self.store_points.clone();

			let mut cost2 = 0_u32;
			for i in 0..=limit2 {
				let start = if i == 0 { 0 } else { second_points[i - 1] };
				let end = if i < limit2 { second_points[i] } else { store.len() };
				cost2 += calculate_block_size_auto_type(store, StoreRange::new(start, end)?)?;
			}

			if cost2 < cost1 { return Ok(second_points); }
		}

		Ok(first_points)
	}
}



/// # Cheapest Split Point.
///
/// Find the `i` in `start..end` minimizing the summed block estimates on
/// either side. Small intervals get the exhaustive treatment; larger ones
/// iteratively narrow around the best of nine evenly spaced probes.
fn find_minimum_cost(
	store: &Lz77Store,
	mut start: usize,
	mut end: usize,
) -> Result<(usize, u32), DeflateError> {
	let split_start = start - 1;
	let split_end = end;

	let mut best_cost = u32::MAX;
	let mut best_idx = start;

	if end - start < 1024 {
		for i in start..end {
			let cost = split_cost(store, split_start, i, split_end)?;
			if cost < best_cost {
				best_cost = cost;
				best_idx = i;
			}
		}
		return Ok((best_idx, best_cost));
	}

	let mut p = [0_usize; SAMPLE_POINTS];
	let mut last_best_cost = u32::MAX;
	while MINIMUM_SPLIT_DISTANCE <= end - start {
		let mut best_p_idx = 0;
		for (i, pp) in p.iter_mut().enumerate() {
			*pp = start + (i + 1) * ((end - start).wrapping_div(MINIMUM_SPLIT_DISTANCE));
			let line_cost =
				if best_idx == *pp { last_best_cost }
				else { split_cost(store, split_start, *pp, split_end)? };

			if i == 0 || line_cost < best_cost {
				best_cost = line_cost;
				best_p_idx = i;
			}
		}

		// No longer improving.
		if last_best_cost < best_cost { break; }

		// Narrow in around the winner.
		best_idx = p[best_p_idx];
		if 0 < best_p_idx { start = p[best_p_idx - 1]; }
		if best_p_idx + 1 < p.len() { end = p[best_p_idx + 1]; }

		last_best_cost = best_cost;
	}

	Ok((best_idx, last_best_cost))
}

/// # Cost of a Split.
///
/// The sum of the best-type estimates for the two halves.
fn split_cost(
	store: &Lz77Store,
	start: usize,
	mid: usize,
	end: usize,
) -> Result<u32, DeflateError> {
	let (a, b) = StoreRange::new(start, end)?.split(mid)?;
	let a = calculate_block_size_auto_type(store, a)?;
	let b = calculate_block_size_auto_type(store, b)?;
	Ok(a + b)
}



#[cfg(test)]
mod tests {
	use super::*;

	/// # Store of `n` Literals Drawn From a Pattern.
	fn literal_store(pattern: &[u8], n: usize) -> Lz77Store {
		let mut store = Lz77Store::new();
		for i in 0..n {
			store.push(u16::from(pattern[i % pattern.len()]), 0, i).unwrap();
		}
		store
	}

	#[test]
	fn t_tiny_stores_stay_whole() {
		let mut splits = SplitPoints::new();
		let store = literal_store(b"abc", MINIMUM_SPLIT_DISTANCE - 1);
		assert_eq!(splits.split_store(&store, usize::MAX).unwrap(), 0);

		// A budget of zero also means no splitting.
		let store = literal_store(b"abc", 5000);
		assert_eq!(splits.split_store(&store, 0).unwrap(), 0);
	}

	#[test]
	fn t_point_budget() {
		// A store that changes character every few hundred entries invites
		// lots of splits; the budget has to cap them.
		let mut data = Vec::new();
		for chunk in 0..10_u8 {
			for i in 0..300_u16 {
				data.push(chunk.wrapping_mul(23) ^ (i % 3) as u8);
			}
		}
		let store = literal_store(&data, data.len());

		let mut splits = SplitPoints::new();
		let capped = splits.split_store(&store, 2).unwrap();
		assert!(capped <= 2);

		// And the points must be sorted, in range, and unique.
		let points = &splits.store_points;
		assert!(points.windows(2).all(|w| w[0] < w[1]));
		assert!(points.iter().all(|&p| 0 < p && p < store.len()));
	}

	#[test]
	fn t_homogeneous_no_split() {
		// Uniform data gains nothing from splitting.
		let store = literal_store(b"a", 3000);
		let mut splits = SplitPoints::new();
		assert_eq!(splits.split_store(&store, usize::MAX).unwrap(), 0);
	}
}
