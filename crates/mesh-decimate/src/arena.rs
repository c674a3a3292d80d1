//! Arena pools with stable 32-bit handles.
//!
//! Vertices, triangles and edges live in fixed-capacity pools sized up front
//! from the input (plus the `vertex_alloc` headroom for vertex splitting).
//! Retirement pushes the handle on a free list; the slot stays allocated.
//!
//! Each slot carries its own mutex. During the parallel collapse phase the
//! partition discipline keeps own-partition locks uncontended; the locks exist
//! so that the rare cross-partition touches (incidence-list edits on shared
//! ring vertices) stay data-race free. All access is single-lock-at-a-time:
//! callers copy data out or mutate inside a short closure, never holding two
//! slot guards at once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use nalgebra::Point3;

use crate::quadric::Quadric;
use crate::types::TrianglePlane;

/// Index into one of the arena pools. `Handle::NONE` is the reserved
/// "no entry" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct Handle(u32);

impl Handle {
    pub const NONE: Handle = Handle(u32::MAX);

    #[inline]
    pub fn from_index(i: usize) -> Handle {
        debug_assert!(i < u32::MAX as usize);
        Handle(i as u32)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn is_none(self) -> bool {
        self == Handle::NONE
    }

    #[inline]
    pub fn is_some(self) -> bool {
        self != Handle::NONE
    }
}

/// A vertex record: position, accumulated quadric, triangle incidence.
#[derive(Debug, Clone)]
pub(crate) struct VertexRec {
    pub position: Point3<f64>,
    pub quadric: Quadric,
    /// Handles of incident live triangles, unordered.
    pub triangles: Vec<Handle>,
    /// Merge target once retired, `NONE` while live.
    pub redirect: Handle,
    /// True when the vertex touches a boundary or feature-ridge edge.
    pub on_boundary: bool,
    pub live: bool,
}

impl Default for VertexRec {
    fn default() -> Self {
        Self {
            position: Point3::origin(),
            quadric: Quadric::default(),
            triangles: Vec::new(),
            redirect: Handle::NONE,
            on_boundary: false,
            live: false,
        }
    }
}

/// A triangle record: vertex triple in winding order, edge triple, cached
/// plane.
#[derive(Debug, Clone)]
pub(crate) struct TriangleRec {
    pub verts: [Handle; 3],
    pub edges: [Handle; 3],
    pub plane: TrianglePlane,
    pub partition: u16,
    pub live: bool,
}

impl Default for TriangleRec {
    fn default() -> Self {
        Self {
            verts: [Handle::NONE; 3],
            edges: [Handle::NONE; 3],
            plane: TrianglePlane::ZERO,
            partition: 0,
            live: false,
        }
    }
}

/// An edge record, doubling as the queued collapse operation.
///
/// The canonical key keeps `verts[0] < verts[1]`. `heap_pos` is the
/// backpointer into the owning partition's heap (`u32::MAX` when unqueued).
/// `stale` flags an operation whose cost no longer matches the mesh; pops
/// discard stale entries and the barrier recompute requeues them.
#[derive(Debug, Clone)]
pub(crate) struct EdgeRec {
    pub verts: [Handle; 2],
    /// Owning triangles; `NONE` slots are vacant.
    pub tris: [Handle; 2],
    /// Incidences beyond two, marking the edge non-manifold.
    pub extra_tris: u8,
    pub heap_pos: u32,
    pub cost: f64,
    pub collapse_point: Point3<f64>,
    /// Incremented on every structural change; deferred operations carry a
    /// snapshot and skip execution on mismatch.
    pub generation: u32,
    pub partition: u16,
    pub boundary: bool,
    pub locked: bool,
    /// Pinned to one partition but its 1-ring may straddle others.
    pub cross_partition: bool,
    pub stale: bool,
    pub live: bool,
}

impl Default for EdgeRec {
    fn default() -> Self {
        Self {
            verts: [Handle::NONE; 2],
            tris: [Handle::NONE; 2],
            extra_tris: 0,
            heap_pos: u32::MAX,
            cost: 0.0,
            collapse_point: Point3::origin(),
            generation: 0,
            partition: 0,
            boundary: false,
            locked: false,
            cross_partition: false,
            stale: false,
            live: false,
        }
    }
}

impl EdgeRec {
    pub fn is_non_manifold(&self) -> bool {
        self.extra_tris > 0
    }

    /// Number of owning triangles (saturating at the tracked pair).
    pub fn owner_count(&self) -> usize {
        self.tris.iter().filter(|t| t.is_some()).count() + self.extra_tris as usize
    }

    /// Attach an owning triangle. Returns false when the edge spills past two
    /// owners and becomes non-manifold.
    pub fn attach(&mut self, t: Handle) -> bool {
        for slot in &mut self.tris {
            if slot.is_none() {
                *slot = t;
                return true;
            }
        }
        self.extra_tris = self.extra_tris.saturating_add(1);
        false
    }

    /// Detach an owning triangle.
    pub fn detach(&mut self, t: Handle) {
        for slot in &mut self.tris {
            if *slot == t {
                *slot = Handle::NONE;
                return;
            }
        }
        // The triangle was in the untracked overflow.
        self.extra_tris = self.extra_tris.saturating_sub(1);
    }
}

/// Fixed-capacity pool of lock-per-slot records.
pub(crate) struct Pool<T> {
    slots: Vec<Mutex<T>>,
    free: Mutex<Vec<Handle>>,
    /// High-water mark: slots below this index have been allocated at least
    /// once.
    len: AtomicUsize,
}

impl<T: Default + Clone> Pool<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || Mutex::new(T::default()));
        Self {
            slots,
            free: Mutex::new(Vec::new()),
            len: AtomicUsize::new(0),
        }
    }

    /// High-water mark; iterate `0..len()` to visit every allocated slot.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// Allocate during the single-threaded build phase.
    pub fn alloc_mut(&mut self, value: T) -> Handle {
        let free = self.free.get_mut().unwrap();
        if let Some(h) = free.pop() {
            *self.slots[h.index()].get_mut().unwrap() = value;
            return h;
        }
        let i = self.len.load(Ordering::Relaxed);
        assert!(i < self.slots.len(), "pool capacity exceeded during build");
        *self.slots[i].get_mut().unwrap() = value;
        self.len.store(i + 1, Ordering::Release);
        Handle::from_index(i)
    }

    /// Allocate during the parallel phase. Returns `None` when the pool is
    /// exhausted (the caller degrades gracefully, e.g. skips a vertex split).
    pub fn alloc_shared(&self, value: T) -> Option<Handle> {
        if let Some(h) = self.free.lock().unwrap().pop() {
            *self.slots[h.index()].lock().unwrap() = value;
            return Some(h);
        }
        loop {
            let i = self.len.load(Ordering::Acquire);
            if i >= self.slots.len() {
                return None;
            }
            if self
                .len
                .compare_exchange(i, i + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                *self.slots[i].lock().unwrap() = value;
                return Some(Handle::from_index(i));
            }
        }
    }

    /// Return a retired handle to the free list.
    pub fn retire(&self, h: Handle) {
        self.free.lock().unwrap().push(h);
    }

    /// Read access under the slot lock.
    #[inline]
    pub fn with<R>(&self, h: Handle, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.slots[h.index()].lock().unwrap();
        f(&guard)
    }

    /// Write access under the slot lock.
    #[inline]
    pub fn with_mut<R>(&self, h: Handle, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.slots[h.index()].lock().unwrap();
        f(&mut guard)
    }

    /// Copy the record out.
    #[inline]
    pub fn read(&self, h: Handle) -> T {
        self.slots[h.index()].lock().unwrap().clone()
    }

    /// Exclusive access during the build phase, no locking.
    #[inline]
    pub fn get_mut(&mut self, h: Handle) -> &mut T {
        self.slots[h.index()].get_mut().unwrap()
    }
}
