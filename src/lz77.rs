/*!
# Aprieta: LZ77 Store.

The store is an append-only sequence of literals and back-references, each
entry tagged with its DEFLATE symbols at push time. Cumulative histogram
snapshots are banked every `NUM_LL` entries so block sizing can pull symbol
counts for any sub-range without rescanning a million entries.
*/

use crate::{
	ArrayD,
	ArrayLL,
	error::bug,
	DeflateError,
	MAX_MATCH,
	MIN_MATCH,
	NUM_D,
	NUM_LL,
	StoreRange,
	symbols::{
		DISTANCE_SYMBOLS,
		LENGTH_SYMBOLS,
	},
	WINDOW_SIZE,
};

/// # Snapshot Cadence.
///
/// A cumulative histogram is banked once per this many entries.
const SNAPSHOT_EVERY: usize = NUM_LL;

/// # Direct-Count Ceiling.
///
/// Ranges shorter than this are cheaper to recount than to reconstruct.
const DIRECT_COUNT_MAX: usize = SNAPSHOT_EVERY * 3;



#[derive(Debug, Clone, Copy)]
/// # Store Entry.
///
/// A literal (`dist == 0`, `litlen` is the byte) or a back-reference
/// (`litlen` is the match length, `dist` the distance). The symbols are
/// computed once here because everything downstream wants them.
pub(crate) struct Lz77Entry {
	/// # Source Byte Position.
	pub(crate) pos: usize,

	/// # Literal Byte or Match Length.
	pub(crate) litlen: u16,

	/// # Match Distance (Zero for Literals).
	pub(crate) dist: u16,

	/// # Litlen Symbol.
	pub(crate) ll_symbol: u16,

	/// # Distance Symbol.
	pub(crate) d_symbol: u16,
}

impl Lz77Entry {
	/// # New.
	const fn new(litlen: u16, dist: u16, pos: usize) -> Result<Self, DeflateError> {
		if dist == 0 {
			// Literals have to be actual bytes; the longer litlen values
			// only make sense paired with a distance.
			if 255 < litlen { return Err(bug!()); }
			Ok(Self { pos, litlen, dist: 0, ll_symbol: litlen, d_symbol: 0 })
		}
		else if
			MIN_MATCH as u16 <= litlen && litlen <= MAX_MATCH as u16 &&
			dist < WINDOW_SIZE as u16
		{
			Ok(Self {
				pos,
				litlen,
				dist,
				ll_symbol: LENGTH_SYMBOLS[litlen as usize],
				d_symbol: DISTANCE_SYMBOLS[dist as usize] as u16,
			})
		}
		else { Err(bug!()) }
	}

	/// # Bytes Covered.
	///
	/// One for a literal, otherwise the match length.
	pub(crate) const fn step_len(&self) -> u16 {
		if self.dist == 0 { 1 }
		else { self.litlen }
	}
}



#[derive(Debug, Default, Clone)]
/// # LZ77 Store.
pub(crate) struct Lz77Store {
	/// # Entries.
	entries: Vec<Lz77Entry>,

	/// # Cumulative Litlen Counts.
	///
	/// `ll_cum[k]` holds symbol counts for entries `0..min((k+1)*288, len)`;
	/// the final snapshot tracks the live tail.
	ll_cum: Vec<ArrayLL<u32>>,

	/// # Cumulative Distance Counts.
	d_cum: Vec<ArrayD<u32>>,
}

impl Lz77Store {
	/// # New.
	pub(crate) const fn new() -> Self {
		Self {
			entries: Vec::new(),
			ll_cum: Vec::new(),
			d_cum: Vec::new(),
		}
	}

	/// # Length.
	pub(crate) fn len(&self) -> usize { self.entries.len() }

	/// # Is Empty?
	pub(crate) fn is_empty(&self) -> bool { self.entries.is_empty() }

	/// # Entries.
	pub(crate) fn entries(&self) -> &[Lz77Entry] { self.entries.as_slice() }

	/// # Entries for a Range.
	pub(crate) fn range_entries(&self, rng: StoreRange) -> Result<&[Lz77Entry], DeflateError> {
		self.entries.get(rng.rng()).ok_or(bug!())
	}

	/// # Clear.
	pub(crate) fn clear(&mut self) {
		self.entries.truncate(0);
		self.ll_cum.truncate(0);
		self.d_cum.truncate(0);
	}

	/// # Push Values.
	pub(crate) fn push(&mut self, litlen: u16, dist: u16, pos: usize) -> Result<(), DeflateError> {
		let e = Lz77Entry::new(litlen, dist, pos)?;
		self.push_entry(e);
		Ok(())
	}

	/// # Append (and Drain) Another Store.
	pub(crate) fn append_drain(&mut self, other: &mut Self) {
		self.entries.reserve(other.entries.len());
		for e in other.entries.drain(..) { self.push_entry(e); }
		other.ll_cum.truncate(0);
		other.d_cum.truncate(0);
	}

	/// # Replace Contents.
	pub(crate) fn replace(&mut self, other: &Self) {
		self.entries.clone_from(&other.entries);
		self.ll_cum.clone_from(&other.ll_cum);
		self.d_cum.clone_from(&other.d_cum);
	}

	/// # Push Entry.
	fn push_entry(&mut self, e: Lz77Entry) {
		let pos = self.entries.len();
		if pos % SNAPSHOT_EVERY == 0 {
			// Bank a fresh snapshot seeded from the previous running totals
			// (or zero for the first).
			let ll = self.ll_cum.last().copied().unwrap_or([0; NUM_LL]);
			let d = self.d_cum.last().copied().unwrap_or([0; NUM_D]);
			self.ll_cum.push(ll);
			self.d_cum.push(d);
		}

		let idx = pos.wrapping_div(SNAPSHOT_EVERY);
		self.ll_cum[idx][e.ll_symbol as usize] += 1;
		if e.dist != 0 { self.d_cum[idx][e.d_symbol as usize] += 1; }

		self.entries.push(e);
	}
}

impl Lz77Store {
	/// # Range Histogram.
	///
	/// Return litlen/distance symbol counts for the entries in `rng`, either
	/// by direct recount (short ranges) or by reconstructing from the banked
	/// snapshots and subtracting.
	pub(crate) fn histogram(&self, rng: StoreRange)
	-> Result<(ArrayLL<u32>, ArrayD<u32>), DeflateError> {
		if rng.len() < DIRECT_COUNT_MAX {
			let mut ll_counts = [0_u32; NUM_LL];
			let mut d_counts = [0_u32; NUM_D];
			for e in self.range_entries(rng)? {
				ll_counts[e.ll_symbol as usize] += 1;
				if e.dist != 0 { d_counts[e.d_symbol as usize] += 1; }
			}
			Ok((ll_counts, d_counts))
		}
		else {
			let (mut ll_counts, mut d_counts) = self.counts_through(rng.end() - 1)?;
			if 0 < rng.start() {
				let (ll_sub, d_sub) = self.counts_through(rng.start() - 1)?;
				for (a, b) in ll_counts.iter_mut().zip(ll_sub) { *a -= b; }
				for (a, b) in d_counts.iter_mut().zip(d_sub) { *a -= b; }
			}
			Ok((ll_counts, d_counts))
		}
	}

	/// # Counts Through Position (Inclusive).
	///
	/// Start from the snapshot covering `pos` and walk back the entries
	/// counted past it.
	fn counts_through(&self, pos: usize)
	-> Result<(ArrayLL<u32>, ArrayD<u32>), DeflateError> {
		let idx = pos.wrapping_div(SNAPSHOT_EVERY);
		let mut ll_counts = self.ll_cum.get(idx).copied().ok_or(bug!())?;
		let mut d_counts = self.d_cum.get(idx).copied().ok_or(bug!())?;

		// The snapshot covers entries up to the end of its stripe (or the
		// live tail); anything after pos needs subtracting back out.
		let stripe_end = usize::min((idx + 1) * SNAPSHOT_EVERY, self.entries.len());
		for e in self.entries.get(pos + 1..stripe_end).ok_or(bug!())? {
			ll_counts[e.ll_symbol as usize] -= 1;
			if e.dist != 0 { d_counts[e.d_symbol as usize] -= 1; }
		}

		Ok((ll_counts, d_counts))
	}

	/// # Byte Range.
	///
	/// Map a store range back to the input byte offsets it covers.
	pub(crate) fn byte_range(&self, rng: StoreRange) -> Result<(usize, usize), DeflateError> {
		let first = self.entries.get(rng.start()).ok_or(bug!())?;
		let last = self.entries.get(rng.end() - 1).ok_or(bug!())?;
		Ok((first.pos, last.pos + last.step_len() as usize))
	}
}
