/*!
# Aprieta: Blocks.

Where everything converges: per-range size estimates for the three block
types, the symbol emitters, the statistics-driven iteration loop that hunts
for the best parse, and the per-part driver that strings it all together.
*/

use crate::{
	ArrayD,
	ArrayLL,
	bits::BitWriter,
	chunk::InputChunk,
	DeflateError,
	error::bug,
	hash::{
		BlockState,
		CostModel,
	},
	Lz77Store,
	rle::get_dynamic_lengths,
	split::SplitPoints,
	stats::{
		RanState,
		SymbolStats,
	},
	StoreRange,
	symbols::{
		DISTANCE_BITS,
		DISTANCE_VALUES,
		FIXED_SYMBOLS_D,
		FIXED_SYMBOLS_LL,
		FIXED_TREE_D,
		FIXED_TREE_LL,
		LENGTH_EXTRA_BITS,
		LENGTH_EXTRA_VALUES,
	},
	tree::{
		canonical_symbols,
		encode_tree,
	},
};



#[derive(Debug, Clone, Copy, Eq, PartialEq)]
/// # Block Type.
enum BlockType {
	/// # Stored (Raw Bytes).
	Uncompressed,

	/// # Fixed Trees.
	Fixed,

	/// # Dynamic Trees.
	Dynamic,
}

impl BlockType {
	/// # The BTYPE Header Bits.
	const fn btype(self) -> u8 {
		match self {
			Self::Uncompressed => 0,
			Self::Fixed => 1,
			Self::Dynamic => 2,
		}
	}
}



/// # Deflate One Part.
///
/// The whole pipeline for one master chunk: find split points, then write
/// each sub-block with whichever type prices smallest. Only the final block
/// of the final part may carry BFINAL.
pub(crate) fn deflate_part(
	state: &mut BlockState,
	splits: &mut SplitPoints,
	numiterations: u32,
	max_points: usize,
	last_part: bool,
	chunk: InputChunk<'_>,
	out: &mut BitWriter,
) -> Result<(), DeflateError> {
	let mut store = Lz77Store::new();
	let mut scratch = Lz77Store::new();

	let best = splits.split(
		state,
		chunk,
		numiterations,
		max_points,
		&mut store,
		&mut scratch,
	)?;

	for i in 0..=best.len() {
		let start = if i == 0 { 0 } else { best[i - 1] };
		let end = if i < best.len() { best[i] } else { store.len() };
		add_lz77_block_auto_type(
			i == best.len() && last_part,
			&store,
			&mut scratch,
			state,
			chunk,
			StoreRange::new(start, end)?,
			out,
		)?;
	}

	Ok(())
}

/// # Write an Empty (Fixed) Block.
///
/// Seven zero bits of end-of-block under the fixed tree; the cheapest way
/// to say nothing, used for empty inputs and empty tails.
pub(crate) fn add_empty_block(last_block: bool, out: &mut BitWriter) {
	out.add_header(BlockType::Fixed.btype(), last_block);
	out.add_bits(0, 7);
}

/// # One-Shot Fixed-Tree Parse and Write.
///
/// The forced-fixed path: squeeze the chunk once under the fixed cost model
/// and emit the result as a fixed block. No iteration, no type comparison.
pub(crate) fn deflate_part_fixed(
	state: &mut BlockState,
	last_part: bool,
	chunk: InputChunk<'_>,
	out: &mut BitWriter,
) -> Result<(), DeflateError> {
	let mut store = Lz77Store::new();
	state.init_block(chunk.block_size());
	state.optimal_run(chunk, CostModel::Fixed, &mut store)?;

	if store.is_empty() { return Err(bug!()); }
	add_lz77_block(
		BlockType::Fixed,
		last_part,
		&store,
		chunk,
		StoreRange::new(0, store.len())?,
		out,
	)
}



/// # Optimal LZ77 Parse.
///
/// The iteration loop. Seed statistics from a greedy parse, then repeatedly
/// re-parse under the entropy cost model those statistics imply, keeping
/// the cheapest result. Once progress flatlines, restart from the best
/// statistics found, shuffled, to probe the neighborhood.
pub(crate) fn lz77_optimal(
	state: &mut BlockState,
	chunk: InputChunk<'_>,
	numiterations: u32,
	best: &mut Lz77Store,
	scratch: &mut Lz77Store,
) -> Result<(), DeflateError> {
	state.init_block(chunk.block_size());

	// Greedy seed.
	scratch.clear();
	state.greedy(chunk, scratch, Some(chunk.pos()))?;

	let mut current_stats = SymbolStats::new();
	current_stats.load_store(scratch);
	current_stats.crunch();

	let mut ran = RanState::new();
	let mut best_stats = SymbolStats::new();
	let mut last_cost = 0_u32;
	let mut best_cost = u32::MAX;
	let mut randomized = false;

	for i in 0..numiterations {
		scratch.clear();
		state.optimal_run(chunk, CostModel::Statistics(&current_stats), scratch)?;

		// The dynamic estimate is the yardstick that matters.
		let current_cost = calculate_block_size_dynamic(
			scratch,
			StoreRange::new(0, scratch.len())?,
		)?;

		if current_cost < best_cost {
			best.replace(scratch);
			best_stats = current_stats;
			best_cost = current_cost;
		}

		// Retally from the fresh parse, damped with half the previous
		// counts once the shuffling has begun.
		let last_stats = current_stats;
		current_stats.reload_store(scratch);
		if randomized { current_stats.add_half(&last_stats); }
		current_stats.crunch();

		// Flat cost two iterations running: go back to the best and shake.
		if 5 < i && current_cost == last_cost {
			current_stats = best_stats;
			current_stats.randomize(&mut ran);
			current_stats.crunch();
			randomized = true;
		}

		last_cost = current_cost;
	}

	Ok(())
}



/// # Stored Size (Bits).
fn calculate_block_size_uncompressed(
	store: &Lz77Store,
	rng: StoreRange,
) -> Result<u32, DeflateError> {
	let (instart, inend) = store.byte_range(rng)?;
	let blocksize = (inend - instart) as u32;

	// Every 65,535 bytes needs its own header and framing.
	let blocks = blocksize.div_ceil(65_535);
	Ok(blocks * 40 + blocksize * 8)
}

/// # Fixed Size (Bits).
fn calculate_block_size_fixed(store: &Lz77Store, rng: StoreRange) -> u32 {
	// The end symbol always goes out.
	let mut size = FIXED_TREE_LL[256];

	if let Ok(entries) = store.range_entries(rng) {
		for e in entries {
			if e.dist == 0 {
				size += FIXED_TREE_LL[e.litlen as usize];
			}
			else {
				size += u32::from(LENGTH_EXTRA_BITS[e.litlen as usize]);
				size += FIXED_TREE_LL[e.ll_symbol as usize];
				size += u32::from(DISTANCE_BITS[e.d_symbol as usize]);
				size += FIXED_TREE_D[e.d_symbol as usize];
			}
		}
	}

	size
}

/// # Dynamic Size (Bits).
fn calculate_block_size_dynamic(
	store: &Lz77Store,
	rng: StoreRange,
) -> Result<u32, DeflateError> {
	get_dynamic_lengths(store, rng).map(|(_, size, _, _)| size)
}

/// # Best-Type Size (Bits).
///
/// The smallest of the three estimates, skipping the fixed math for large
/// stores that would never choose it anyway.
pub(crate) fn calculate_block_size_auto_type(
	store: &Lz77Store,
	rng: StoreRange,
) -> Result<u32, DeflateError> {
	let uncompressed_cost = calculate_block_size_uncompressed(store, rng)?;

	let fixed_cost =
		if 1000 < store.len() { uncompressed_cost }
		else { calculate_block_size_fixed(store, rng) };

	let dynamic_cost = calculate_block_size_dynamic(store, rng)?;

	if uncompressed_cost < fixed_cost && uncompressed_cost < dynamic_cost {
		Ok(uncompressed_cost)
	}
	else if fixed_cost < dynamic_cost { Ok(fixed_cost) }
	else { Ok(dynamic_cost) }
}



/// # Write a Block (Known Type).
fn add_lz77_block(
	btype: BlockType,
	last_block: bool,
	store: &Lz77Store,
	chunk: InputChunk<'_>,
	rng: StoreRange,
	out: &mut BitWriter,
) -> Result<(), DeflateError> {
	// Stored blocks copy straight from the input.
	if matches!(btype, BlockType::Uncompressed) {
		let (instart, inend) = store.byte_range(rng)?;
		let bytes = chunk.arr().get(instart..inend).ok_or(bug!())?;
		out.stored_block(last_block, bytes);
		return Ok(());
	}

	out.add_header(btype.btype(), last_block);

	if matches!(btype, BlockType::Fixed) {
		add_lz77_data(
			store, rng,
			&FIXED_SYMBOLS_LL, &FIXED_TREE_LL, &FIXED_SYMBOLS_D, &FIXED_TREE_D,
			out,
		)?;
		out.add_huffman_bits(FIXED_SYMBOLS_LL[256], FIXED_TREE_LL[256]);
		Ok(())
	}
	else {
		add_lz77_block_dynamic(store, rng, out)
	}
}

/// # Write a Dynamic Block Body.
fn add_lz77_block_dynamic(
	store: &Lz77Store,
	rng: StoreRange,
	out: &mut BitWriter,
) -> Result<(), DeflateError> {
	let (extra, _, ll_lengths, d_lengths) = get_dynamic_lengths(store, rng)?;
	encode_tree(&ll_lengths, &d_lengths, extra, out)?;

	let ll_symbols = canonical_symbols(&ll_lengths);
	let d_symbols = canonical_symbols(&d_lengths);

	add_lz77_data(
		store, rng,
		&ll_symbols, &ll_lengths, &d_symbols, &d_lengths,
		out,
	)?;

	out.add_huffman_bits(ll_symbols[256], ll_lengths[256]);
	Ok(())
}

#[allow(clippy::too_many_arguments)]
/// # Write a Block, Best Type.
///
/// Price all three types, give the expensive fixed-tree reparse a chance
/// where it plausibly helps, and write whichever wins.
fn add_lz77_block_auto_type(
	last_block: bool,
	store: &Lz77Store,
	scratch: &mut Lz77Store,
	state: &mut BlockState,
	chunk: InputChunk<'_>,
	rng: StoreRange,
	out: &mut BitWriter,
) -> Result<(), DeflateError> {
	let uncompressed_cost = calculate_block_size_uncompressed(store, rng)?;
	let fixed_cost = calculate_block_size_fixed(store, rng);
	let dynamic_cost = calculate_block_size_dynamic(store, rng)?;

	// A dedicated fixed-model reparse sometimes beats the dynamic tree on
	// small or incompressible-ish blocks, but it costs a full squeeze;
	// don't bother unless the cheap estimates say it's close.
	if
		(store.len() < 1000 || fixed_cost * 10 <= dynamic_cost * 11) &&
		try_expensive_fixed(
			store, scratch, state, uncompressed_cost, dynamic_cost,
			chunk, rng, last_block,
			out,
		)?
	{
		return Ok(());
	}

	let btype =
		if uncompressed_cost < fixed_cost && uncompressed_cost < dynamic_cost {
			BlockType::Uncompressed
		}
		else if fixed_cost < dynamic_cost { BlockType::Fixed }
		else { BlockType::Dynamic };

	add_lz77_block(btype, last_block, store, chunk, rng, out)
}

#[allow(clippy::too_many_arguments)]
/// # Maybe Write an Expensive Fixed Block.
///
/// Reparse the block's bytes under the fixed cost model; if the resulting
/// fixed block beats the other candidates, write it and report `true`.
fn try_expensive_fixed(
	store: &Lz77Store,
	scratch: &mut Lz77Store,
	state: &mut BlockState,
	uncompressed_cost: u32,
	dynamic_cost: u32,
	chunk: InputChunk<'_>,
	rng: StoreRange,
	last_block: bool,
	out: &mut BitWriter,
) -> Result<bool, DeflateError> {
	let (instart, inend) = store.byte_range(rng)?;
	let part = chunk.reslice(instart, inend)?;

	state.init_block(inend - instart);
	scratch.clear();
	state.optimal_run(part, CostModel::Fixed, scratch)?;
	if scratch.is_empty() { return Err(bug!()); }

	let fixed_rng = StoreRange::new(0, scratch.len())?;
	let fixed_cost = calculate_block_size_fixed(scratch, fixed_rng);

	if
		fixed_cost < dynamic_cost &&
		(fixed_cost <= uncompressed_cost || dynamic_cost <= uncompressed_cost)
	{
		add_lz77_block(BlockType::Fixed, last_block, scratch, chunk, fixed_rng, out)
			.map(|()| true)
	}
	else { Ok(false) }
}

/// # Write the Symbol Stream.
///
/// All the literal/length/distance codes for a range (but not the end
/// symbol) under the given trees.
fn add_lz77_data(
	store: &Lz77Store,
	rng: StoreRange,
	ll_symbols: &ArrayLL<u32>,
	ll_lengths: &ArrayLL<u32>,
	d_symbols: &ArrayD<u32>,
	d_lengths: &ArrayD<u32>,
	out: &mut BitWriter,
) -> Result<(), DeflateError> {
	for e in store.range_entries(rng)? {
		if e.dist == 0 {
			// A literal with no code would be unreadable; refuse.
			if 255 < e.litlen { return Err(bug!()); }
			if ll_lengths[e.litlen as usize] == 0 { return Err(bug!()); }

			out.add_huffman_bits(
				ll_symbols[e.litlen as usize],
				ll_lengths[e.litlen as usize],
			);
		}
		else {
			let lsym = e.ll_symbol as usize;
			let dsym = e.d_symbol as usize;
			if ll_lengths[lsym] == 0 || d_lengths[dsym] == 0 { return Err(bug!()); }

			out.add_huffman_bits(ll_symbols[lsym], ll_lengths[lsym]);
			out.add_bits(
				u32::from(LENGTH_EXTRA_VALUES[e.litlen as usize]),
				u32::from(LENGTH_EXTRA_BITS[e.litlen as usize]),
			);

			out.add_huffman_bits(d_symbols[dsym], d_lengths[dsym]);
			out.add_bits(
				u32::from(DISTANCE_VALUES[e.dist as usize]),
				u32::from(DISTANCE_BITS[dsym]),
			);
		}
	}

	Ok(())
}



#[cfg(test)]
mod tests {
	use super::*;
	use crate::rle::dynamic_data_size;

	/// # Store of Plain Literals.
	fn literal_store(bytes: &[u8]) -> Lz77Store {
		let mut store = Lz77Store::new();
		for (i, b) in bytes.iter().enumerate() {
			store.push(u16::from(*b), 0, i).unwrap();
		}
		store
	}

	#[test]
	fn t_uncompressed_size() {
		// 100 bytes: one sub-block of framing plus the payload.
		let store = literal_store(&[7; 100]);
		let rng = StoreRange::new(0, 100).unwrap();
		assert_eq!(
			calculate_block_size_uncompressed(&store, rng).unwrap(),
			40 + 800,
		);
	}

	#[test]
	fn t_fixed_size() {
		// Low literals take 8 bits, high ones 9, end symbol 7.
		let store = literal_store(&[0, 100, 143, 144, 255]);
		let rng = StoreRange::new(0, 5).unwrap();
		assert_eq!(
			calculate_block_size_fixed(&store, rng),
			8 + 8 + 8 + 9 + 9 + 7,
		);

		// A match adds length/distance codes and extras: length 10 is
		// symbol 264 (7 bits, no extra), distance 5 is symbol 4 (5 bits,
		// 1 extra).
		let mut store = literal_store(&[0; 12]);
		store.push(10, 5, 12).unwrap();
		let rng = StoreRange::new(12, 13).unwrap();
		assert_eq!(
			calculate_block_size_fixed(&store, rng),
			7 + (5 + 1) + 7,
		);
	}

	#[test]
	fn t_auto_type_prefers_sane_things() {
		// Uniform compressible data should never pick stored.
		let mut store = literal_store(&[b'x']);
		for i in 0..50_usize {
			store.push(258, 1, 1 + i * 258).unwrap();
		}
		let rng = StoreRange::new(0, store.len()).unwrap();

		let auto = calculate_block_size_auto_type(&store, rng).unwrap();
		let stored = calculate_block_size_uncompressed(&store, rng).unwrap();
		assert!(auto < stored);
	}

	#[test]
	fn t_dynamic_size_parts() {
		// The dynamic estimate must cover at least the data bits implied by
		// its own lengths.
		let store = literal_store(b"the quick brown fox jumps over the lazy dog");
		let rng = StoreRange::new(0, store.len()).unwrap();

		let (_, total, ll_lengths, d_lengths) = get_dynamic_lengths(&store, rng).unwrap();
		let (mut ll_counts, d_counts) = store.histogram(rng).unwrap();
		ll_counts[256] = 1;
		let data = dynamic_data_size(&ll_counts, &d_counts, &ll_lengths, &d_lengths);
		assert!(data < total, "Tree bits went missing: {data} vs {total}.");
	}
}
