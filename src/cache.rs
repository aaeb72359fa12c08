/*!
# Aprieta: Caches.

Three scratch structures scoped to a block state: the longest-match cache
(the big one), the squeeze cost/path buffers, and the split-point bit set.
All of them are allocated once and resized per block so the hot paths never
touch the allocator.
*/

use crate::{
	error::bug,
	DeflateError,
	MIN_MATCH,
	SUBLEN_LEN,
};



/// # Default Length (1) and Distance (0), Packed.
///
/// Length and distance ride together in one little-endian `u32` since they
/// are always read and written as a pair. This value marks "not cached
/// yet"; an all-zero word means "cached: no usable match".
const DEFAULT_LD: u32 = u32::from_le_bytes([1, 0, 0, 0]);

/// # Sublength Runs Per Position.
const CACHED_RUNS: usize = 8;

/// # Sublength Cache Bytes Per Position.
///
/// Each run takes three bytes: packed length, distance low, distance high.
const CACHED_RUNS_LEN: usize = CACHED_RUNS * 3;



/// # Longest-Match Cache.
///
/// Remembers, for each position of the current block, the best match found
/// by an unbounded search plus a compressed table of the distance that first
/// reached each length. The squeeze passes re-query the same positions many
/// times over; answering from here is the difference between hours and
/// seconds.
pub(crate) struct MatchCache {
	/// # Packed Length/Distance Per Position.
	ld: Vec<u32>,

	/// # Sublength Runs Per Position.
	sublen: Vec<u8>,
}

impl MatchCache {
	/// # New.
	pub(crate) const fn new() -> Self {
		Self { ld: Vec::new(), sublen: Vec::new() }
	}

	/// # Initialize for a Block.
	pub(crate) fn init(&mut self, blocksize: usize) {
		self.ld.clear();
		self.ld.resize(blocksize, DEFAULT_LD);
		self.sublen.clear();
		self.sublen.resize(blocksize * CACHED_RUNS_LEN, 0);
	}

	/// # Find a Cached Match.
	///
	/// Answer a longest-match query from cache if possible, returning the
	/// `(length, distance)` pair on a hit. On certain partial hits the
	/// `limit` is lowered instead, which still saves the caller chain-walk
	/// effort.
	pub(crate) fn find(
		&self,
		pos: usize,
		limit: &mut u16,
		sublen: &mut Option<&mut [u16; SUBLEN_LEN]>,
	) -> Result<Option<(u16, u16)>, DeflateError> {
		let max_len = crate::MAX_MATCH as u16;
		if self.ld.len() <= pos { return Err(bug!()); }

		// An untouched slot answers nothing.
		let (cache_len, cache_dist) = ld_split(self.ld[pos]);
		if cache_len != 0 && cache_dist == 0 { return Ok(None); }

		let runs: &[u8; CACHED_RUNS_LEN] = self.sublen
			.get(pos * CACHED_RUNS_LEN..(pos + 1) * CACHED_RUNS_LEN)
			.and_then(|s| s.try_into().ok())
			.ok_or(bug!())?;

		// The deepest cached sublength, when anyone cares.
		let max_cached =
			if sublen.is_none() { 0 }
			else { max_sublen(runs) };

		// The cache can answer if the query is unbounded, the cached length
		// fits the limit, or the sublengths reach the limit.
		if
			*limit == max_len ||
			cache_len <= *limit ||
			(sublen.is_some() && max_cached >= *limit)
		{
			if sublen.is_none() || cache_len <= max_cached {
				let length = cache_len.min(*limit);

				let distance =
					if let Some(s) = sublen.as_mut() {
						if MIN_MATCH as u16 <= length { write_sublen(runs, s); }
						let distance = s[length as usize];

						// The redundantly-cached distance must agree with the
						// sublength table wherever both speak.
						if
							distance != cache_dist &&
							*limit == max_len &&
							MIN_MATCH as u16 <= length
						{
							return Err(bug!());
						}
						distance
					}
					else { cache_dist };

				return Ok(Some((length, distance)));
			}

			// No dice, but the cached length caps what a fresh search could
			// possibly find.
			*limit = cache_len;
		}

		Ok(None)
	}

	/// # Store a Match.
	///
	/// Record the results of an unbounded search: best length/distance plus
	/// the sublength table, compressed into (up to) eight change-point runs.
	pub(crate) fn store(
		&mut self,
		pos: usize,
		sublen: &[u16; SUBLEN_LEN],
		distance: u16,
		length: u16,
	) -> Result<(), DeflateError> {
		if self.ld.len() <= pos { return Err(bug!()); }

		// Only virgin slots get written.
		if self.ld[pos] != DEFAULT_LD {
			let (cache_len, cache_dist) = ld_split(self.ld[pos]);

			// An earlier "nothing to cache" verdict is fine; anything else
			// means two unbounded searches disagreed.
			if cache_dist != 0 || cache_len == 0 { return Ok(()); }
			return Err(bug!());
		}

		// A matchless position is itself worth remembering.
		if (length as usize) < MIN_MATCH {
			self.ld[pos] = 0;
			return Ok(());
		}

		if distance == 0 { return Err(bug!()); }
		self.ld[pos] = ld_join(length, distance);

		// Sublengths below the minimum match never matter; dropping them
		// lets the (length - 3) deltas fit a byte.
		let slice = &sublen[MIN_MATCH..=length as usize];
		let base = pos * CACHED_RUNS_LEN;
		let mut runs = self.sublen[base..base + CACHED_RUNS_LEN].chunks_exact_mut(3);

		// One run per change point, oldest first, until we run out of room.
		for (i, pair) in slice.windows(2).enumerate().take(256) {
			if pair[0] != pair[1] {
				let Some([r0, r1, r2]) = runs.next() else { return Ok(()); };
				*r0 = i as u8;
				[*r1, *r2] = pair[0].to_le_bytes();
			}
		}

		// The final length is an implicit change point.
		if let Some([r0, r1, r2]) = runs.next() {
			*r0 = pack_len(length);
			[*r1, *r2] = slice[slice.len() - 1].to_le_bytes();

			// If room remains, copy the length marker into the last slot so
			// `max_sublen` can always read from a fixed place.
			if let Some([r0, _, _]) = runs.last() { *r0 = pack_len(length); }
		}

		Ok(())
	}
}



/// # Squeeze Cache.
///
/// The forward-pass cost table (one `(cost, step)` pair per block position,
/// plus one) and the traced path lengths. Sized per block, reused across
/// iterations.
pub(crate) struct SqueezeCache {
	/// # Cost and Best Step Per Position.
	costs: Vec<(f32, u16)>,

	/// # Traced Path.
	paths: Vec<u16>,

	/// # Active Cost Count (Block Size + 1).
	costs_len: usize,
}

impl SqueezeCache {
	/// # New.
	pub(crate) const fn new() -> Self {
		Self {
			costs: Vec::new(),
			paths: Vec::new(),
			costs_len: 0,
		}
	}

	/// # Set the Active Block Size.
	pub(crate) fn resize(&mut self, blocksize: usize) {
		self.costs_len = blocksize + 1;
	}

	/// # Reset and Borrow the Costs.
	///
	/// Position zero costs nothing; everywhere else starts unreachable.
	pub(crate) fn reset_costs(&mut self) -> &mut [(f32, u16)] {
		self.costs.clear();
		self.costs.resize(self.costs_len, (f32::INFINITY, 0));
		if let Some(first) = self.costs.first_mut() { first.0 = 0.0; }
		&mut self.costs
	}

	/// # Trace the Path.
	///
	/// Walk the cost table backwards from the end, collecting the step that
	/// won each position, and return the steps in forward order.
	pub(crate) fn trace_paths(&mut self) -> Result<&[u16], DeflateError> {
		self.paths.clear();
		if self.costs.len() < 2 { return Ok(&[]); }

		let mut idx = self.costs.len() - 1;
		while idx != 0 {
			let step = self.costs[idx].1;
			if step == 0 || idx < step as usize { return Err(bug!()); }
			self.paths.push(step);
			idx -= step as usize;
		}

		self.paths.reverse();
		Ok(&self.paths)
	}
}



/// # Split Cache.
///
/// One bit per store position, marking interval starts that already failed
/// to split profitably. Bits beat bytes when there can be a million of
/// them.
pub(crate) struct SplitCache {
	/// # Bit Set.
	set: Vec<u8>,
}

impl SplitCache {
	/// # New.
	pub(crate) const fn new() -> Self {
		Self { set: Vec::new() }
	}

	/// # Initialize for `len` Positions.
	pub(crate) fn init(&mut self, len: usize) {
		self.set.clear();
		self.set.resize(len.div_ceil(8), 0);
	}

	/// # Still Unmarked?
	pub(crate) fn is_unset(&self, pos: usize) -> bool {
		self.set.get(pos.wrapping_div(8))
			.is_some_and(|&b| 0 == b & (1 << (pos % 8)))
	}

	/// # Mark.
	pub(crate) fn set(&mut self, pos: usize) {
		if let Some(b) = self.set.get_mut(pos.wrapping_div(8)) {
			*b |= 1 << (pos % 8);
		}
	}
}



/// # Pack Length and Distance.
const fn ld_join(length: u16, distance: u16) -> u32 {
	let [l0, l1] = length.to_le_bytes();
	let [d0, d1] = distance.to_le_bytes();
	u32::from_le_bytes([l0, l1, d0, d1])
}

/// # Unpack Length and Distance.
const fn ld_split(ld: u32) -> (u16, u16) {
	let [l0, l1, d0, d1] = ld.to_le_bytes();
	(u16::from_le_bytes([l0, l1]), u16::from_le_bytes([d0, d1]))
}

/// # Pack a Length Into a Byte.
const fn pack_len(length: u16) -> u8 {
	(length - MIN_MATCH as u16) as u8
}

/// # Unpack a Length From a Byte.
const fn unpack_len(byte: u8) -> u16 {
	byte as u16 + MIN_MATCH as u16
}

/// # Deepest Cached Sublength.
///
/// The final run slot holds the packed maximum, except when the very first
/// run has no distance, which means nothing was cached at all.
const fn max_sublen(runs: &[u8; CACHED_RUNS_LEN]) -> u16 {
	if runs[1] == 0 && runs[2] == 0 { 0 }
	else { unpack_len(runs[CACHED_RUNS_LEN - 3]) }
}

/// # Expand Cached Sublengths.
///
/// Rebuild the full sublength table from the change-point runs.
fn write_sublen(runs: &[u8; CACHED_RUNS_LEN], dst: &mut [u16; SUBLEN_LEN]) {
	let max_cached = max_sublen(runs);
	let mut from = 0_usize;
	for run in runs.chunks_exact(3) {
		let length = unpack_len(run[0]);
		if from <= length as usize {
			let value = u16::from_le_bytes([run[1], run[2]]);
			dst[from..=length as usize].fill(value);
		}
		if max_cached <= length { return; }
		from = length as usize + 1;
	}
}



#[cfg(test)]
mod tests {
	use super::*;
	use crate::MAX_MATCH;

	#[test]
	fn t_ld_packing() {
		let (len, dist) = ld_split(DEFAULT_LD);
		assert_eq!(len, 1);
		assert_eq!(dist, 0);
		assert_eq!(ld_join(len, dist), DEFAULT_LD);

		assert_eq!(ld_split(ld_join(258, 32_767)), (258, 32_767));
	}

	#[test]
	/// # Cached Queries Match What Went In.
	///
	/// Storing a sublength table and reading it back has to reproduce the
	/// original distances for every queried length.
	fn t_sublen_roundtrip() {
		let mut cache = MatchCache::new();
		cache.init(4);

		// A sublength profile with a few distance plateaus.
		let mut sublen = [0_u16; SUBLEN_LEN];
		let length = 40_u16;
		for l in 3..=length as usize {
			sublen[l] =
				if l < 10 { 1 }
				else if l < 25 { 300 }
				else { 4000 };
		}
		cache.store(0, &sublen, sublen[length as usize], length).unwrap();

		// An unbounded re-query should hand the whole thing back.
		let mut fresh = [0_u16; SUBLEN_LEN];
		let mut limit = MAX_MATCH as u16;
		let hit = cache.find(0, &mut limit, &mut Some(&mut fresh)).unwrap();
		assert_eq!(hit, Some((length, 4000)));
		assert_eq!(&fresh[3..=length as usize], &sublen[3..=length as usize]);

		// Without a sublength request, the packed pair answers directly.
		let mut limit = MAX_MATCH as u16;
		let hit = cache.find(0, &mut limit, &mut None).unwrap();
		assert_eq!(hit, Some((length, 4000)));

		// A tighter limit caps the answer (and takes the distance that
		// first reached the capped length).
		let mut limit = 20_u16;
		let hit = cache.find(0, &mut limit, &mut Some(&mut fresh)).unwrap();
		assert_eq!(hit, Some((20, 300)));
	}

	#[test]
	fn t_no_match_memo() {
		let mut cache = MatchCache::new();
		cache.init(2);

		// Unqueried slots answer nothing.
		let mut limit = MAX_MATCH as u16;
		assert_eq!(cache.find(1, &mut limit, &mut None).unwrap(), None);

		// "No match" is a cacheable fact.
		let sublen = [0_u16; SUBLEN_LEN];
		cache.store(1, &sublen, 0, 1).unwrap();
		let hit = cache.find(1, &mut limit, &mut None).unwrap();
		assert_eq!(hit, Some((0, 0)));
	}

	#[test]
	fn t_split_cache() {
		let mut cache = SplitCache::new();
		cache.init(100);

		for i in 0..100 {
			assert!(cache.is_unset(i));
			cache.set(i);
			assert!(! cache.is_unset(i));
		}

		// Reinitializing wipes the slate.
		cache.init(100);
		assert!(cache.is_unset(42));
	}

	#[test]
	fn t_trace() {
		let mut squeeze = SqueezeCache::new();
		squeeze.resize(10);

		let costs = squeeze.reset_costs();
		assert_eq!(costs.len(), 11);
		assert!(costs[0].0.abs() < f32::EPSILON);
		assert!(costs[10].0.is_infinite());

		// Pretend the DP chose a literal, then a 9-byte match… backwards.
		costs[10].1 = 9;
		costs[1].1 = 1;
		assert_eq!(squeeze.trace_paths().unwrap(), &[1, 9]);
	}
}
