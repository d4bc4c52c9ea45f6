//! The hook state store and the component-facing [`Hooks`] handle.
//!
//! State lives in one arena of cells per [`RenderContext`](`crate::context::RenderContext`).
//! Cells are doubly linked by index between two sentinels that are never removed, so the store order is independent of the arena order.
//! A component instance owns one contiguous range of cells, addressed purely by the order in which its body reads them.
//!
//! Freed slots are recycled with a bumped generation, which is how a [`CellId`] held by a stale [`Setter`] is told apart from its slot's new occupant.

use crate::{error::UpdateError, fiber::Fiber};
use core::{
	any::{type_name, Any},
	fmt::{self, Debug, Formatter},
	iter,
	marker::PhantomData,
};
use std::rc::{Rc, Weak};
use tracing::{error, trace, warn};

const HEAD: usize = 0;
const TAIL: usize = 1;

/// Identifies one state cell for as long as it stays in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellId {
	index: usize,
	generation: u32,
}

/// An inclusive range of cells, contiguous in store order, owned by one [`Fiber`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateRange {
	start: CellId,
	end: CellId,
}
impl StateRange {
	#[must_use]
	pub fn start(&self) -> CellId {
		self.start
	}

	#[must_use]
	pub fn end(&self) -> CellId {
		self.end
	}
}

struct StateCell {
	/// [`None`] only for sentinels, freed slots and the moment between allocation and first write.
	value: Option<Box<dyn Any>>,
	prev: usize,
	next: usize,
	generation: u32,
	linked: bool,
	belong_to: Weak<Fiber>,
}
impl StateCell {
	fn sentinel(prev: usize, next: usize) -> Self {
		Self {
			value: None,
			prev,
			next,
			generation: 0,
			linked: true,
			belong_to: Weak::new(),
		}
	}
}

/// Saved cursor state of one instantiation.
pub(crate) struct ScopeFrame {
	saved_cursor: usize,
	saved_boundary: usize,
	/// The cell right before the first one this scope reads.
	anchor: usize,
	fresh_mark: usize,
}

/// The ordered sequence of all state cells, with the read/write cursor.
pub struct StateStore {
	cells: Vec<StateCell>,
	free: Vec<usize>,
	cursor: usize,
	/// Reading at this cell allocates a new one in front of it.
	boundary: usize,
	/// Cells allocated by the scopes that are currently open, in allocation order.
	fresh: Vec<usize>,
	len: usize,
}

impl Default for StateStore {
	fn default() -> Self {
		Self::new()
	}
}

impl Debug for StateStore {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("StateStore")
			.field("len", &self.len)
			.field("free", &self.free.len())
			.field("cursor", &self.cursor)
			.field("boundary", &self.boundary)
			.finish()
	}
}

impl StateStore {
	#[must_use]
	pub fn new() -> Self {
		Self {
			cells: vec![StateCell::sentinel(HEAD, TAIL), StateCell::sentinel(HEAD, TAIL)],
			free: Vec::new(),
			cursor: TAIL,
			boundary: TAIL,
			fresh: Vec::new(),
			len: 0,
		}
	}

	/// Number of cells currently linked into the store.
	#[must_use]
	pub fn len(&self) -> usize {
		self.len
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	/// Number of released slots waiting to be recycled.
	#[must_use]
	pub fn free_slots(&self) -> usize {
		self.free.len()
	}

	/// Whether no instantiation holds the cursor.
	#[must_use]
	pub fn is_at_rest(&self) -> bool {
		self.cursor == TAIL && self.boundary == TAIL && self.fresh.is_empty()
	}

	/// Walks the store from head to tail.
	pub fn iter(&self) -> impl Iterator<Item = CellId> + '_ {
		let mut index = self.cells[HEAD].next;
		iter::from_fn(move || {
			if index == TAIL {
				None
			} else {
				let id = self.id(index);
				index = self.cells[index].next;
				Some(id)
			}
		})
	}

	#[must_use]
	pub fn contains(&self, cell: CellId) -> bool {
		cell.index > TAIL && self.cells.get(cell.index).map_or(false, |slot| slot.linked && slot.generation == cell.generation)
	}

	#[must_use]
	pub fn value(&self, cell: CellId) -> Option<&dyn Any> {
		if self.contains(cell) {
			self.cells[cell.index].value.as_deref()
		} else {
			None
		}
	}

	/// The fiber whose most recent instantiation claimed `cell`.
	#[must_use]
	pub fn owner(&self, cell: CellId) -> Option<Rc<Fiber>> {
		if self.contains(cell) {
			self.cells[cell.index].belong_to.upgrade()
		} else {
			None
		}
	}

	/// Every cell of `range`, in store order. Empty if the range was excised.
	#[must_use]
	pub fn range_cells(&self, range: StateRange) -> Vec<CellId> {
		if !self.contains(range.start) || !self.contains(range.end) {
			return Vec::new();
		}
		let mut cells = Vec::new();
		let mut index = range.start.index;
		loop {
			cells.push(self.id(index));
			if index == range.end.index || index == TAIL {
				break;
			}
			index = self.cells[index].next;
		}
		cells
	}

	fn id(&self, index: usize) -> CellId {
		CellId {
			index,
			generation: self.cells[index].generation,
		}
	}

	fn allocate(&mut self) -> usize {
		self.len += 1;
		match self.free.pop() {
			Some(index) => {
				self.cells[index].linked = true;
				index
			}
			None => {
				self.cells.push(StateCell {
					value: None,
					prev: HEAD,
					next: TAIL,
					generation: 0,
					linked: true,
					belong_to: Weak::new(),
				});
				self.cells.len() - 1
			}
		}
	}

	fn link_before(&mut self, index: usize, at: usize) {
		let prev = self.cells[at].prev;
		self.cells[index].prev = prev;
		self.cells[index].next = at;
		self.cells[prev].next = index;
		self.cells[at].prev = index;
	}

	fn release(&mut self, index: usize) {
		let cell = &mut self.cells[index];
		cell.value = None;
		cell.linked = false;
		cell.generation = cell.generation.wrapping_add(1);
		cell.belong_to = Weak::new();
		cell.prev = index;
		cell.next = index;
		self.free.push(index);
		self.len -= 1;
	}

	/// Unlinks and releases the cells from `first` through `last`, returning how many were removed.
	fn unlink_range(&mut self, first: usize, last: usize) -> usize {
		let mut indices = Vec::new();
		let mut index = first;
		loop {
			if index <= TAIL || !self.cells[index].linked {
				error!(first, last, "State range is not contiguous in the store. Leaving it in place.");
				return 0;
			}
			indices.push(index);
			if index == last {
				break;
			}
			index = self.cells[index].next;
		}

		let before = self.cells[first].prev;
		let after = self.cells[last].next;
		self.cells[before].next = after;
		self.cells[after].prev = before;
		for &index in &indices {
			self.release(index);
		}
		indices.len()
	}

	/// Reads the cell at the cursor, allocating it first if the cursor sits at the current scope's boundary, and advances the cursor.
	///
	/// The returned slot is [`None`] iff the cell was just allocated.
	pub(crate) fn read(&mut self) -> (CellId, &mut Option<Box<dyn Any>>) {
		let index = if self.cursor == self.boundary {
			let index = self.allocate();
			self.link_before(index, self.boundary);
			self.fresh.push(index);
			trace!(index, "Allocated state cell.");
			index
		} else {
			self.cursor
		};
		self.cursor = self.cells[index].next;
		(self.id(index), &mut self.cells[index].value)
	}

	/// Saves the cursor and positions it for one instantiation.
	///
	/// With a live `prior` range, reads revisit its cells and allocate right behind it.
	/// Otherwise, reads allocate at the tail.
	pub(crate) fn begin_scope(&mut self, prior: Option<StateRange>) -> ScopeFrame {
		let mut frame = ScopeFrame {
			saved_cursor: self.cursor,
			saved_boundary: self.boundary,
			anchor: HEAD,
			fresh_mark: self.fresh.len(),
		};
		match prior {
			Some(range) if self.contains(range.start) && self.contains(range.end) => {
				frame.anchor = self.cells[range.start.index].prev;
				self.cursor = range.start.index;
				self.boundary = self.cells[range.end.index].next;
			}
			prior => {
				if let Some(range) = prior {
					warn!(?range, "Prior state range is gone. Allocating fresh state.");
				}
				frame.anchor = self.cells[TAIL].prev;
				self.cursor = TAIL;
				self.boundary = TAIL;
			}
		}
		frame
	}

	/// Stamps every cell read since `frame` began with `claimant`, drops prior cells that weren't read again and restores the cursor.
	///
	/// Returns the claimed range, or [`None`] if no cell was read.
	pub(crate) fn end_scope(&mut self, frame: ScopeFrame, claimant: &Rc<Fiber>) -> Option<StateRange> {
		let first = self.cells[frame.anchor].next;
		let range = if first == self.cursor {
			None
		} else {
			let last = self.cells[self.cursor].prev;
			let owner = Rc::downgrade(claimant);
			let mut index = first;
			loop {
				self.cells[index].belong_to = owner.clone();
				if index == last {
					break;
				}
				index = self.cells[index].next;
			}
			Some(StateRange {
				start: self.id(first),
				end: self.id(last),
			})
		};

		if self.cursor != self.boundary {
			let last_unread = self.cells[self.boundary].prev;
			let count = self.unlink_range(self.cursor, last_unread);
			warn!(count, "Component read fewer state cells than on its previous render. Released the rest.");
		}

		self.fresh.truncate(frame.fresh_mark);
		self.cursor = frame.saved_cursor;
		self.boundary = frame.saved_boundary;
		range
	}

	/// Restores the cursor after an interrupted instantiation and frees the cells it allocated.
	pub(crate) fn abort_scope(&mut self, frame: ScopeFrame) {
		let fresh: Vec<usize> = self.fresh.drain(frame.fresh_mark..).collect();
		for index in fresh {
			self.unlink_range(index, index);
		}
		self.cursor = frame.saved_cursor;
		self.boundary = frame.saved_boundary;
	}

	/// Removes `range` from the store. Its cells become unreachable and their ids stale.
	pub(crate) fn excise(&mut self, range: StateRange) -> usize {
		if !self.contains(range.start) || !self.contains(range.end) {
			warn!(?range, "Tried to excise a state range that is no longer in the store.");
			return 0;
		}
		let count = self.unlink_range(range.start.index, range.end.index);
		trace!(count, ?range, "Excised state range.");
		count
	}

	/// Stamps every cell of `range` with `claimant`.
	pub(crate) fn claim(&mut self, range: StateRange, claimant: &Rc<Fiber>) {
		let owner = Rc::downgrade(claimant);
		for cell in self.range_cells(range) {
			self.cells[cell.index].belong_to = owner.clone();
		}
	}

	/// Runs `write` against the value of `cell` and returns the cell's current owner.
	pub(crate) fn write(&mut self, cell: CellId, write: Box<dyn FnOnce(&mut Box<dyn Any>) -> Result<(), UpdateError> + '_>) -> Result<Weak<Fiber>, UpdateError> {
		if !self.contains(cell) {
			return Err(UpdateError::Stale { cell });
		}
		let slot = &mut self.cells[cell.index];
		match slot.value.as_mut() {
			Some(value) => write(value)?,
			None => return Err(UpdateError::Stale { cell }),
		}
		Ok(slot.belong_to.clone())
	}
}

/// Receives state writes from [`Setter`]s and turns them into re-renders.
pub(crate) trait StateSink {
	fn apply(&self, cell: CellId, write: Box<dyn FnOnce(&mut Box<dyn Any>) -> Result<(), UpdateError> + '_>) -> Result<(), UpdateError>;
}

struct Detached;
impl StateSink for Detached {
	fn apply(&self, _: CellId, _: Box<dyn FnOnce(&mut Box<dyn Any>) -> Result<(), UpdateError> + '_>) -> Result<(), UpdateError> {
		Err(UpdateError::Detached)
	}
}

/// A sink that never accepts writes, for render contexts without a reconciler.
pub(crate) fn detached_sink() -> Weak<dyn StateSink> {
	Weak::<Detached>::new()
}

/// Restores the cursor even if the component body panics.
pub(crate) struct ScopeGuard<'a> {
	store: &'a mut StateStore,
	frame: Option<ScopeFrame>,
}
impl<'a> ScopeGuard<'a> {
	pub(crate) fn begin(store: &'a mut StateStore, prior: Option<StateRange>) -> Self {
		let frame = store.begin_scope(prior);
		Self { store, frame: Some(frame) }
	}

	pub(crate) fn hooks<'b>(&'b mut self, sink: &'b Weak<dyn StateSink>) -> Hooks<'b> {
		Hooks::new(&mut *self.store, sink)
	}

	pub(crate) fn finish(mut self, claimant: &Rc<Fiber>) -> Option<StateRange> {
		let frame = self.frame.take();
		frame.and_then(|frame| self.store.end_scope(frame, claimant))
	}
}
impl Drop for ScopeGuard<'_> {
	fn drop(&mut self) {
		if let Some(frame) = self.frame.take() {
			warn!("Component render was interrupted. Restoring the state cursor.");
			self.store.abort_scope(frame)
		}
	}
}

/// Handed to a component function while it runs. Each `use_*` call claims the next state cell in call order.
///
/// A component must make the same calls in the same order on every render.
/// Breaking that pairs values with the wrong calls; a type change is detected, logged and reset.
pub struct Hooks<'a> {
	store: &'a mut StateStore,
	sink: &'a Weak<dyn StateSink>,
}

impl<'a> Hooks<'a> {
	pub(crate) fn new(store: &'a mut StateStore, sink: &'a Weak<dyn StateSink>) -> Self {
		Self { store, sink }
	}

	/// Returns the current value of this call position's state and a setter bound to its cell.
	pub fn use_state<T: Clone + 'static>(&mut self, initial: T) -> (T, Setter<T>) {
		self.use_state_with(move || initial)
	}

	/// Like [`Hooks::use_state`], but only computes the initial value when the cell is first allocated.
	pub fn use_state_with<T: Clone + 'static>(&mut self, init: impl FnOnce() -> T) -> (T, Setter<T>) {
		let (cell, slot) = self.store.read();
		let value = match slot.as_ref().and_then(|value| value.downcast_ref::<T>()) {
			Some(value) => value.clone(),
			None => {
				if slot.is_some() {
					error!(?cell, expected = type_name::<T>(), "Hook call order changed: The state cell holds another type. Resetting it.");
				}
				let value = init();
				*slot = Some(Box::new(value.clone()));
				value
			}
		};
		(value, Setter::new(cell, self.sink.clone()))
	}
}

impl Debug for Hooks<'_> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Hooks").field("store", &self.store).finish()
	}
}

/// Overwrites one state cell and schedules its owner for re-rendering.
///
/// Bound to the cell, not to the render it came from: a setter captured by an old render's event handler keeps updating the live instance.
pub struct Setter<T> {
	cell: CellId,
	sink: Weak<dyn StateSink>,
	_value: PhantomData<fn(T)>,
}

impl<T> Clone for Setter<T> {
	fn clone(&self) -> Self {
		Self {
			cell: self.cell,
			sink: self.sink.clone(),
			_value: PhantomData,
		}
	}
}

impl<T> Debug for Setter<T> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Setter").field("cell", &self.cell).field("type", &type_name::<T>()).finish()
	}
}

impl<T: 'static> Setter<T> {
	fn new(cell: CellId, sink: Weak<dyn StateSink>) -> Self {
		Self { cell, sink, _value: PhantomData }
	}

	#[must_use]
	pub fn cell(&self) -> CellId {
		self.cell
	}

	/// Sets the value. Failures are logged and the update is dropped.
	pub fn set(&self, value: T) {
		if let Err(error) = self.try_set(value) {
			warn!(cell = ?self.cell, %error, "Dropped state update.");
		}
	}

	/// Sets the value.
	///
	/// # Errors
	///
	/// See [`UpdateError`].
	pub fn try_set(&self, value: T) -> Result<(), UpdateError> {
		let sink = self.sink.upgrade().ok_or(UpdateError::Detached)?;
		sink.apply(
			self.cell,
			Box::new(move |slot: &mut Box<dyn Any>| {
				*slot = Box::new(value);
				Ok(())
			}),
		)
	}

	/// Replaces the value with one computed from the current value. Failures are logged and the update is dropped.
	pub fn update(&self, f: impl FnOnce(&T) -> T) {
		if let Err(error) = self.try_update(f) {
			warn!(cell = ?self.cell, %error, "Dropped state update.");
		}
	}

	/// Replaces the value with one computed from the current value.
	///
	/// # Errors
	///
	/// See [`UpdateError`].
	pub fn try_update(&self, f: impl FnOnce(&T) -> T) -> Result<(), UpdateError> {
		let sink = self.sink.upgrade().ok_or(UpdateError::Detached)?;
		sink.apply(
			self.cell,
			Box::new(move |slot: &mut Box<dyn Any>| {
				let current = slot.downcast_ref::<T>().ok_or(UpdateError::TypeMismatch { expected: type_name::<T>() })?;
				let next = f(current);
				*slot = Box::new(next);
				Ok(())
			}),
		)
	}
}
