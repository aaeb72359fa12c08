/*!
# Aprieta: Hashing and Matching.

The match engine: a pair of ring-buffered hash chains (one keyed on the next
three bytes, one on run lengths for skipping through repetitive data), the
bounded longest-match search over them, and the two parsers built on top,
namely the lazy greedy pass and the cost-driven squeeze passes.
*/

use crate::{
	cache::{
		MatchCache,
		SqueezeCache,
	},
	chunk::InputChunk,
	DeflateError,
	error::bug,
	Lz77Store,
	MAX_MATCH,
	MIN_MATCH,
	stats::SymbolStats,
	SUBLEN_LEN,
	symbols::{
		DISTANCE_BITS,
		DISTANCE_SYMBOLS,
		LENGTH_EXTRA_BITS,
		LENGTH_SYMBOLS,
	},
	WINDOW_MASK,
	WINDOW_SIZE,
};

/// # Rolling Hash Shift.
const HASH_SHIFT: i16 = 5;

/// # Rolling Hash Mask (15 Bits).
const HASH_MASK: i16 = 32_767;

/// # Chain Walk Budget.
///
/// The longest-match search gives up after this many candidates. Higher
/// buys marginally better matches at brutal cost.
const MAX_CHAIN_HITS: usize = 8192;



#[derive(Debug, Clone, Copy)]
/// # Cost Model.
///
/// What a literal or match "costs" in output bits depends on the trees that
/// will eventually encode it: either the fixed trees from the RFC, or
/// entropy estimates derived from the previous iteration's statistics.
pub(crate) enum CostModel<'a> {
	/// # Fixed-Tree Costs.
	Fixed,

	/// # Statistics-Derived Costs.
	Statistics(&'a SymbolStats),
}

impl CostModel<'_> {
	/// # Cost of a Literal Byte.
	fn literal_cost(self, byte: u8) -> f64 {
		match self {
			Self::Fixed => if byte <= 143 { 8.0 } else { 9.0 },
			Self::Statistics(s) => s.ll_costs[usize::from(byte)],
		}
	}

	/// # Lower Bound on Any Match Cost.
	///
	/// Used to prune sublength scoring: candidates that cannot beat the
	/// current best even at this floor are skipped without pricing.
	fn min_cost(self) -> f64 {
		match self {
			Self::Fixed => 12.0,
			Self::Statistics(s) => {
				let mut length_cost = f64::INFINITY;
				for l in MIN_MATCH..=MAX_MATCH {
					let cost = f64::from(LENGTH_EXTRA_BITS[l])
						+ s.ll_costs[LENGTH_SYMBOLS[l] as usize];
					if cost < length_cost { length_cost = cost; }
				}

				let mut dist_cost = f64::INFINITY;
				for (bits, v) in DISTANCE_BITS.iter().zip(s.d_costs.iter()).take(30) {
					let cost = f64::from(*bits) + v;
					if cost < dist_cost { dist_cost = cost; }
				}

				length_cost + dist_cost
			},
		}
	}

	/// # Cost of a Maximum-Length, Distance-One Match.
	fn long_run_cost(self) -> f64 {
		match self {
			Self::Fixed => 13.0,
			Self::Statistics(s) => s.ll_costs[285] + s.d_costs[0],
		}
	}

	/// # Score the Sublengths at One Position.
	///
	/// For each candidate length (three up to the slice length), see whether
	/// `cost_j` plus that match beats the best known path to the position it
	/// would land on, updating the table where it does.
	fn peek_ahead(
		self,
		cost_j: f64,
		min_cost: f64,
		sublen: &[u16],
		costs: &mut [(f32, u16)],
	) {
		let threshold = min_cost + cost_j;
		let mut k = MIN_MATCH as u16;
		for (&dist, c) in sublen.iter().zip(costs.iter_mut()) {
			if threshold < f64::from(c.0) {
				let mut new_cost = cost_j;
				match self {
					Self::Fixed =>
						if dist == 0 {
							if k <= 143 { new_cost += 8.0; }
							else { new_cost += 9.0; }
						}
						else {
							// Length symbols past 279 take an eight-bit
							// fixed code; with the five distance bits that
							// makes 13, otherwise 12.
							if 114 < k { new_cost += 13.0; }
							else { new_cost += 12.0; }

							let dsym = DISTANCE_SYMBOLS[usize::from(dist & 0x7fff)];
							new_cost += f64::from(DISTANCE_BITS[dsym as usize]);
							new_cost += f64::from(LENGTH_EXTRA_BITS[k as usize]);
						},
					Self::Statistics(s) =>
						if dist == 0 {
							new_cost += s.ll_costs[k as usize];
						}
						else {
							let dsym = DISTANCE_SYMBOLS[usize::from(dist & 0x7fff)];
							new_cost += f64::from(DISTANCE_BITS[dsym as usize]);
							new_cost += s.d_costs[dsym as usize];
							new_cost += s.ll_costs[LENGTH_SYMBOLS[k as usize] as usize];
							new_cost += f64::from(LENGTH_EXTRA_BITS[k as usize]);
						},
				}

				#[allow(clippy::cast_possible_truncation)] // Storage only.
				if 0.0 <= new_cost && new_cost < f64::from(c.0) {
					*c = (new_cost as f32, k);
				}
			}
			k += 1;
		}
	}
}



#[derive(Clone)]
/// # One Hash Chain.
///
/// Ring buffers over the window. Values are `i16` with the sign bit doing
/// double duty as "never written"; real values cannot exceed the 15-bit
/// window anyway.
struct HashChain {
	/// # Hash Value to Most Recent Position.
	head: Vec<i16>,

	/// # Position to Previous Position With the Same Hash.
	prev: Vec<i16>,

	/// # Position to the Hash Recorded There.
	hashes: Vec<i16>,

	/// # Live Hash Value.
	val: i16,
}

impl HashChain {
	/// # New.
	fn new() -> Self {
		Self {
			head: vec![-1; WINDOW_SIZE],
			prev: vec![-1; WINDOW_SIZE],
			hashes: vec![-1; WINDOW_SIZE],
			val: 0,
		}
	}

	/// # Reset.
	fn reset(&mut self) {
		self.head.fill(-1);
		self.prev.fill(-1);
		self.hashes.fill(-1);
		self.val = 0;
	}

	#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
	/// # Record a Position.
	///
	/// Link `pos` into the chain for the current hash value. (The value
	/// itself is cycled separately, before this is called.)
	fn record(&mut self, pos: usize) {
		let hpos = pos & WINDOW_MASK;
		let hval = self.val.max(0);

		self.hashes[hpos] = hval;

		let head = self.head[hval as usize];
		self.prev[hpos] =
			if 0 <= head && self.hashes[head as usize] == hval { head }
			else { hpos as i16 };

		self.head[hval as usize] = hpos as i16;
	}
}



/// # Rolling Hash State.
///
/// The two chains plus the per-position count of identical bytes ahead,
/// which both feeds the secondary chain and powers the long-run shortcuts.
pub(crate) struct RollingHash {
	/// # Primary (Three-Byte) Chain.
	chain1: HashChain,

	/// # Secondary (Run-Keyed) Chain.
	chain2: HashChain,

	/// # Same-Byte Run Length Per Position.
	same: Vec<u16>,
}

impl RollingHash {
	/// # New.
	fn new() -> Self {
		Self {
			chain1: HashChain::new(),
			chain2: HashChain::new(),
			same: vec![0; WINDOW_SIZE],
		}
	}

	/// # Cycle the Rolling Hash Value.
	fn cycle(&mut self, byte: u8) {
		self.chain1.val = ((self.chain1.val << HASH_SHIFT) ^ i16::from(byte)) & HASH_MASK;
	}

	/// # Reset and Warm Up.
	///
	/// Clear everything, prime the rolling value with the first byte or two
	/// of the window, then replay any prelude between the window start and
	/// the active start so back-references can reach behind the block.
	fn reset(&mut self, arr: &[u8], instart: usize) {
		self.chain1.reset();
		self.chain2.reset();
		self.same.fill(0);

		if arr.len() <= instart { return; }
		let windowstart = instart.saturating_sub(WINDOW_SIZE);
		self.cycle(arr[windowstart]);
		if windowstart + 1 < arr.len() { self.cycle(arr[windowstart + 1]); }

		for i in windowstart..instart { self.update(arr, i); }
	}

	#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
	/// # Advance to a Position.
	///
	/// Fold the byte three ahead into the rolling value, link the position
	/// into both chains, and refresh the run count. Positions must be fed
	/// in order, one at a time.
	fn update(&mut self, arr: &[u8], pos: usize) {
		let hpos = pos & WINDOW_MASK;

		self.cycle(arr.get(pos + MIN_MATCH - 1).copied().unwrap_or(0));
		self.chain1.record(pos);

		// Runs shrink by one per step, so yesterday's count seeds today's.
		let mut amount = self.same[pos.wrapping_sub(1) & WINDOW_MASK].saturating_sub(1);
		while
			amount < u16::MAX &&
			pos + usize::from(amount) + 1 < arr.len() &&
			arr[pos] == arr[pos + usize::from(amount) + 1]
		{
			amount += 1;
		}
		self.same[hpos] = amount;

		self.chain2.val = ((amount.wrapping_sub(MIN_MATCH as u16) & 255) as i16) ^ self.chain1.val;
		self.chain2.record(pos);
	}
}

impl RollingHash {
	#[allow(clippy::cast_possible_truncation)] // Clamped before casting.
	/// # Find the Longest Match.
	///
	/// Return the best `(length, distance)` available at `pos`, no longer
	/// than `limit`, answering from the match cache when possible and
	/// populating it when the search was unbounded. Lengths under the
	/// minimum (paired with distance zero) mean "take a literal".
	fn find(
		&self,
		arr: &[u8],
		pos: usize,
		mut limit: u16,
		mut sublen: Option<&mut [u16; SUBLEN_LEN]>,
		lmc: &mut MatchCache,
		cache: Option<usize>,
	) -> Result<(u16, u16), DeflateError> {
		// The cache might already know.
		if let Some(blockstart) = cache {
			if let Some((length, distance)) = lmc.find(pos - blockstart, &mut limit, &mut sublen)? {
				if arr.len() < pos + length as usize { return Err(bug!()); }
				return Ok((length, distance));
			}
		}

		// Too close to the end for any match.
		if arr.len() < pos + MIN_MATCH { return Ok((0, 0)); }

		// Never promise more bytes than remain. (The remainder can exceed
		// the u16 range; the comparison has to happen in usize.)
		if (arr.len() - pos) < limit as usize { limit = (arr.len() - pos) as u16; }

		let (bestlength, bestdist) = self.find_loop(arr, pos, limit, &mut sublen);

		// Unbounded searches are worth remembering.
		if limit == MAX_MATCH as u16 {
			if let (Some(blockstart), Some(s)) = (cache, sublen.as_deref()) {
				lmc.store(pos - blockstart, s, bestdist, bestlength)?;
			}
		}

		debug_assert!(
			verify_match(arr, pos, bestlength, bestdist),
			"match ({bestlength}, {bestdist}) at {pos} does not check out",
		);

		if arr.len() < pos + bestlength as usize { Err(bug!()) }
		else { Ok((bestlength, bestdist)) }
	}

	#[allow(clippy::cast_possible_truncation)]
	/// # The Chain Walk.
	///
	/// Work backwards through candidate positions, extending the best match
	/// as we go. Inside long runs the primary chain degenerates (every
	/// position hashes alike), so once the best length covers the local run
	/// the walk hops to the run-keyed chain instead.
	fn find_loop(
		&self,
		arr: &[u8],
		pos: usize,
		limit: u16,
		sublen: &mut Option<&mut [u16; SUBLEN_LEN]>,
	) -> (u16, u16) {
		/// # Ring Distance Between Successive Chain Positions.
		const fn hop_distance(p: usize, pp: usize) -> usize {
			if p < pp { pp - p }
			else { WINDOW_SIZE + pp - p }
		}

		let hpos = pos & WINDOW_MASK;
		let remaining = arr.len() - pos;

		let mut bestdist = 0_usize;
		let mut bestlength = 1_u16;

		let mut switched = false;
		let mut chain = &self.chain1;

		let mut pp = hpos;
		let mut p =
			if chain.prev[hpos] < 0 { hpos }
			else { chain.prev[hpos] as usize };

		let mut dist = hop_distance(p, pp);
		let mut hits = 0_usize;
		let same0 = self.same[hpos];
		let same_capped = same0.min(limit);

		while p < WINDOW_SIZE && dist < WINDOW_SIZE && hits < MAX_CHAIN_HITS {
			if dist != 0 && dist <= pos {
				let start = pos - dist;

				// Cheap rejection first: a candidate that cannot beat the
				// current best will differ at the best-length offset.
				if
					remaining <= bestlength as usize ||
					arr[pos + bestlength as usize] == arr[start + bestlength as usize]
				{
					// Long runs on both sides let us skip ahead before
					// comparing byte by byte.
					let mut currentlength =
						if 2 < same0 && arr[pos] == arr[start] {
							same_capped.min(self.same[start & WINDOW_MASK])
						}
						else { 0 };

					while
						currentlength < limit &&
						(currentlength as usize) < remaining &&
						arr[start + currentlength as usize] == arr[pos + currentlength as usize]
					{
						currentlength += 1;
					}

					if bestlength < currentlength {
						// Log the first distance to reach each new length.
						if let Some(s) = sublen.as_mut() {
							s[bestlength as usize + 1..=currentlength as usize].fill(dist as u16);
						}

						bestdist = dist;
						bestlength = currentlength;
						if limit <= currentlength { break; }
					}
				}
			}

			// Hop chains when the run-keyed one knows this neighborhood
			// better.
			if
				! switched &&
				same0 <= bestlength &&
				self.chain2.hashes[p] == self.chain2.val
			{
				switched = true;
				chain = &self.chain2;
			}

			if chain.prev[p] < 0 { break; }

			pp = p;
			p = chain.prev[p] as usize;
			dist += hop_distance(p, pp);
			hits += 1;
		}

		if bestlength <= limit { (bestlength, bestdist as u16) }
		else { (1, 0) }
	}
}

impl RollingHash {
	/// # Squeeze Forward Pass.
	///
	/// Fill the cost table: for every position, the cheapest way to reach
	/// it from the block start under the cost model, remembering the step
	/// (literal or match length) that won.
	fn best_lengths(
		&mut self,
		arr: &[u8],
		instart: usize,
		model: CostModel<'_>,
		costs: &mut [(f32, u16)],
		lmc: &mut MatchCache,
	) -> Result<(), DeflateError> {
		debug_assert_eq!(costs.len(), arr.len() - instart + 1);

		let mut sublen = [0_u16; SUBLEN_LEN];
		let min_cost = model.min_cost();

		let mut i = instart;
		while i < arr.len() {
			self.update(arr, i);

			// Deep inside a run of identical bytes, every position costs
			// the same max-length, distance-one match; batch them.
			if self.skip_long_run(arr, instart, i, model, costs) {
				i += MAX_MATCH;
			}

			let (length, _) = self.find(
				arr,
				i,
				MAX_MATCH as u16,
				Some(&mut sublen),
				lmc,
				Some(instart),
			)?;

			let j = i - instart;
			if arr.len() <= i || costs.len() <= j + 1 { break; }

			let cost_j = f64::from(costs[j].0);

			// The literal step.
			let lit_cost = cost_j + model.literal_cost(arr[i]);
			#[allow(clippy::cast_possible_truncation)] // Storage only.
			if 0.0 <= lit_cost && lit_cost < f64::from(costs[j + 1].0) {
				costs[j + 1] = (lit_cost as f32, 1);
			}

			// The match steps, if any.
			let limit = usize::min(length as usize, costs.len() - j - 1);
			if MIN_MATCH <= limit {
				model.peek_ahead(
					cost_j,
					min_cost,
					&sublen[MIN_MATCH..=limit],
					&mut costs[j + MIN_MATCH..],
				);
			}

			i += 1;
		}

		debug_assert!(costs.iter().all(|(cost, _)| (0.0..1E30).contains(cost)));
		Ok(())
	}

	#[allow(clippy::cast_possible_truncation)]
	/// # Long-Run Fast Forward.
	///
	/// When a position sits deep inside a run of identical bytes (with a
	/// full match-length of run behind it and two ahead), the next 258 cost
	/// entries all resolve to "max match at distance one"; write them in
	/// one sweep instead of 258 chain searches. Returns `true` when it did.
	fn skip_long_run(
		&mut self,
		arr: &[u8],
		instart: usize,
		pos: usize,
		model: CostModel<'_>,
		costs: &mut [(f32, u16)],
	) -> bool {
		if
			instart + MAX_MATCH + 1 < pos &&
			pos + MAX_MATCH * 2 + 1 < arr.len() &&
			(MAX_MATCH as u16) * 2 < self.same[pos & WINDOW_MASK] &&
			(MAX_MATCH as u16) < self.same[(pos - MAX_MATCH) & WINDOW_MASK]
		{
			let symbol_cost = model.long_run_cost();

			let mut p = pos;
			for _ in 0..MAX_MATCH {
				let j = p - instart;
				costs[j + MAX_MATCH] = (
					(f64::from(costs[j].0) + symbol_cost) as f32,
					MAX_MATCH as u16,
				);
				p += 1;
				self.update(arr, p);
			}

			true
		}
		else { false }
	}

	/// # Replay a Traced Path.
	///
	/// Walk the block again following the squeeze's chosen steps, recovering
	/// each match's distance (the cost table only kept lengths) and pushing
	/// everything into the store.
	fn follow_paths(
		&mut self,
		arr: &[u8],
		instart: usize,
		paths: &[u16],
		store: &mut Lz77Store,
		lmc: &mut MatchCache,
	) -> Result<(), DeflateError> {
		if arr.len() <= instart { return Ok(()); }

		self.reset(arr, instart);

		let mut i = instart;
		for &length in paths {
			self.update(arr, i);

			if MIN_MATCH as u16 <= length {
				// Re-find the match to get its distance, and make sure the
				// length agrees; a shorter answer here means the cost table
				// lied.
				let (test_length, dist) = self.find(
					arr,
					i,
					length,
					None,
					lmc,
					Some(instart),
				)?;
				if dist == 0 || (test_length != length && MIN_MATCH as u16 <= test_length) {
					return Err(bug!());
				}

				store.push(length, dist, i)?;

				for _ in 1..length {
					i += 1;
					self.update(arr, i);
				}
			}
			else {
				store.push(u16::from(arr[i]), 0, i)?;
			}

			i += 1;
		}

		Ok(())
	}
}



/// # Block State.
///
/// The hash, match cache, and squeeze buffers bundled together: everything
/// one block's worth of parsing needs, reusable across blocks (and inputs)
/// without reallocating.
pub(crate) struct BlockState {
	/// # Hash Chains.
	hash: RollingHash,

	/// # Longest-Match Cache.
	lmc: MatchCache,

	/// # Squeeze Buffers.
	squeeze: SqueezeCache,
}

impl BlockState {
	/// # New.
	pub(crate) fn new() -> Self {
		Self {
			hash: RollingHash::new(),
			lmc: MatchCache::new(),
			squeeze: SqueezeCache::new(),
		}
	}

	/// # Initialize for a Block.
	pub(crate) fn init_block(&mut self, blocksize: usize) {
		self.lmc.init(blocksize);
		self.squeeze.resize(blocksize);
	}
}

impl BlockState {
	/// # Greedy Parse.
	///
	/// A fast single pass with one position of lazy lookahead: when the
	/// match starting a byte later is strictly better, emit a literal and
	/// take that one instead. Used both to seed statistics for the real
	/// search and to estimate raw-byte split points.
	pub(crate) fn greedy(
		&mut self,
		chunk: InputChunk<'_>,
		store: &mut Lz77Store,
		cache: Option<usize>,
	) -> Result<(), DeflateError> {
		/// # Distance-Aware Length Score.
		///
		/// Far distances cost more extra bits, so a far match needs an edge
		/// in length before it beats a near one.
		const fn length_score(length: u16, distance: u16) -> u16 {
			if 1024 < distance { length.saturating_sub(1) }
			else { length }
		}

		let arr = chunk.arr();
		let instart = chunk.pos();

		store.clear();
		self.hash.reset(arr, instart);

		let mut sublen = [0_u16; SUBLEN_LEN];
		let mut prev_length = 0_u16;
		let mut prev_distance = 0_u16;
		let mut match_available = false;

		let mut i = instart;
		while i < arr.len() {
			self.hash.update(arr, i);

			let (mut length, mut distance) = self.hash.find(
				arr,
				i,
				MAX_MATCH as u16,
				Some(&mut sublen),
				&mut self.lmc,
				cache,
			)?;

			let score = length_score(length, distance);
			let prev_score = length_score(prev_length, prev_distance);

			if match_available {
				match_available = false;

				// The lookahead won; the previous position becomes a
				// literal.
				if prev_score + 1 < score {
					store.push(u16::from(arr[i - 1]), 0, i - 1)?;
					if MIN_MATCH as u16 <= score && length < MAX_MATCH as u16 {
						match_available = true;
						prev_length = length;
						prev_distance = distance;

						i += 1;
						continue;
					}
				}
				// The previous match stands.
				else {
					length = prev_length;
					distance = prev_distance;

					store.push(length, distance, i - 1)?;

					// The hash has to see every byte the match covered.
					for _ in 2..length {
						i += 1;
						self.hash.update(arr, i);
					}

					i += 1;
					continue;
				}
			}
			// No pending match; maybe this one is worth a lookahead.
			else if MIN_MATCH as u16 <= score && length < MAX_MATCH as u16 {
				match_available = true;
				prev_length = length;
				prev_distance = distance;

				i += 1;
				continue;
			}

			if MIN_MATCH as u16 <= score {
				store.push(length, distance, i)?;
			}
			else {
				length = 1;
				store.push(u16::from(arr[i]), 0, i)?;
			}

			for _ in 1..length {
				i += 1;
				self.hash.update(arr, i);
			}
			i += 1;
		}

		Ok(())
	}

	/// # Optimal Parse (One Pass).
	///
	/// Run the squeeze: cost table forward, path trace backward, then a
	/// replay to recover distances. The store receives the parse.
	pub(crate) fn optimal_run(
		&mut self,
		chunk: InputChunk<'_>,
		model: CostModel<'_>,
		store: &mut Lz77Store,
	) -> Result<(), DeflateError> {
		let arr = chunk.arr();
		let instart = chunk.pos();

		store.clear();

		let Self { hash, lmc, squeeze } = self;
		let costs = squeeze.reset_costs();
		if costs.len() < 2 { return Ok(()); }

		hash.reset(arr, instart);
		hash.best_lengths(arr, instart, model, costs, lmc)?;

		let paths = squeeze.trace_paths()?;
		if ! paths.is_empty() {
			hash.follow_paths(arr, instart, paths, store, lmc)?;
		}

		Ok(())
	}
}



/// # Verify a Match Against the Data.
///
/// Bytewise equality of the claimed match; debug builds check every find.
fn verify_match(arr: &[u8], pos: usize, length: u16, distance: u16) -> bool {
	if length < MIN_MATCH as u16 { return true; }
	if distance == 0 || pos < distance as usize { return false; }
	if arr.len() < pos + length as usize { return false; }

	let start = pos - distance as usize;
	arr[start..start + length as usize].iter()
		.zip(&arr[pos..pos + length as usize])
		.all(|(a, b)| a == b)
}
