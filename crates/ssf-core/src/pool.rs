//! Render target pool with frame-scoped release.
//!
//! The pool only does bookkeeping: which names are acquired in the current
//! frame and which backend storage backs them. Image memory is owned by a
//! [`TargetAllocator`] (a GPU device or an in-memory image store). A
//! [`FrameScope`] releases every outstanding handle when it is dropped, so a
//! frame that bails out early with `?` cannot leak targets.

use std::collections::{HashMap, HashSet};

use crate::error::{Result, SsfError};
use crate::target::{RenderTargetHandle, StorageId, TargetDescriptor};

/// Backs named targets with image storage.
pub trait TargetAllocator {
    /// Allocates storage for a target. Fails with [`SsfError::ResourceExhausted`]
    /// when the request cannot be backed.
    fn allocate(&mut self, name: &str, descriptor: &TargetDescriptor) -> Result<StorageId>;

    /// Returns storage to the allocator.
    fn free(&mut self, storage: StorageId);
}

/// Counters describing pool activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Total successful acquisitions.
    pub acquired: u64,
    /// Total releases (explicit and frame-end).
    pub released: u64,
    /// Highest number of simultaneously outstanding targets.
    pub peak_outstanding: usize,
    /// Highest number of simultaneously outstanding bytes.
    pub peak_bytes: u64,
}

/// Tracks named scratch targets acquired during a frame.
#[derive(Debug, Default)]
pub struct RenderTargetPool {
    active: HashMap<String, RenderTargetHandle>,
    released: HashSet<String>,
    stats: PoolStats,
}

impl RenderTargetPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a frame scope. All targets acquired through it are released when it ends.
    pub fn begin_frame<'a, A: TargetAllocator + ?Sized>(
        &'a mut self,
        allocator: &'a mut A,
    ) -> FrameScope<'a, A> {
        if !self.active.is_empty() {
            log::warn!(
                "Ssf: {} target(s) still outstanding at frame start, releasing",
                self.active.len()
            );
            self.release_all(&mut *allocator);
        }
        self.released.clear();
        FrameScope {
            pool: self,
            allocator,
        }
    }

    /// Acquires a named target.
    ///
    /// Requesting a name that is already acquired with the same descriptor
    /// returns the existing handle. A different descriptor re-declares the
    /// target: the old storage is freed and new storage allocated.
    pub fn acquire<A: TargetAllocator + ?Sized>(
        &mut self,
        allocator: &mut A,
        name: &str,
        descriptor: TargetDescriptor,
    ) -> Result<RenderTargetHandle> {
        if let Some(existing) = self.active.get(name) {
            if *existing.descriptor() == descriptor {
                return Ok(existing.clone());
            }
            log::debug!("Ssf: re-declaring target '{name}' as {descriptor:?}");
            if let Some(old) = self.active.remove(name) {
                allocator.free(old.storage());
                self.stats.released += 1;
            }
        }

        let storage = allocator.allocate(name, &descriptor)?;
        let handle = RenderTargetHandle::new(name, descriptor, storage);
        self.active.insert(name.to_string(), handle.clone());
        self.released.remove(name);

        self.stats.acquired += 1;
        self.stats.peak_outstanding = self.stats.peak_outstanding.max(self.active.len());
        self.stats.peak_bytes = self.stats.peak_bytes.max(self.outstanding_bytes());
        Ok(handle)
    }

    /// Releases a target acquired in this frame.
    pub fn release<A: TargetAllocator + ?Sized>(
        &mut self,
        allocator: &mut A,
        handle: &RenderTargetHandle,
    ) -> Result<()> {
        let Some(active) = self.active.remove(handle.name()) else {
            if self.released.contains(handle.name()) {
                return Err(SsfError::ReleasedTarget(handle.name().to_string()));
            }
            return Err(SsfError::UnknownTarget(handle.name().to_string()));
        };
        allocator.free(active.storage());
        self.released.insert(active.name().to_string());
        self.stats.released += 1;
        Ok(())
    }

    /// Releases every outstanding target. Returns how many were released.
    pub fn release_all<A: TargetAllocator + ?Sized>(&mut self, allocator: &mut A) -> usize {
        let count = self.active.len();
        for (name, handle) in self.active.drain() {
            allocator.free(handle.storage());
            self.released.insert(name);
        }
        self.stats.released += count as u64;
        count
    }

    /// Looks up an acquired target by name.
    pub fn get(&self, name: &str) -> Option<&RenderTargetHandle> {
        self.active.get(name)
    }

    /// Whether a handle is currently acquired.
    pub fn is_acquired(&self, handle: &RenderTargetHandle) -> bool {
        self.active
            .get(handle.name())
            .is_some_and(|h| h.storage() == handle.storage())
    }

    /// Number of outstanding targets.
    pub fn outstanding(&self) -> usize {
        self.active.len()
    }

    /// Bytes held by outstanding targets.
    pub fn outstanding_bytes(&self) -> u64 {
        self.active.values().map(|h| h.descriptor().byte_size()).sum()
    }

    /// Activity counters.
    pub fn stats(&self) -> PoolStats {
        self.stats
    }
}

impl Drop for RenderTargetPool {
    fn drop(&mut self) {
        if !self.active.is_empty() {
            let names: Vec<&str> = self.active.keys().map(String::as_str).collect();
            log::error!("Ssf: render target pool dropped with leaked targets: {names:?}");
        }
    }
}

/// One frame's view of the pool, paired with the allocator that backs it.
///
/// Dropping the scope releases everything still acquired.
pub struct FrameScope<'a, A: TargetAllocator + ?Sized> {
    pool: &'a mut RenderTargetPool,
    allocator: &'a mut A,
}

impl<A: TargetAllocator + ?Sized> FrameScope<'_, A> {
    /// Acquires a named target for this frame.
    pub fn acquire(
        &mut self,
        name: &str,
        descriptor: TargetDescriptor,
    ) -> Result<RenderTargetHandle> {
        self.pool.acquire(&mut *self.allocator, name, descriptor)
    }

    /// Releases a target before the end of the frame.
    pub fn release(&mut self, handle: &RenderTargetHandle) -> Result<()> {
        self.pool.release(&mut *self.allocator, handle)
    }

    /// The allocator.
    pub fn allocator(&self) -> &A {
        &*self.allocator
    }

    /// Mutable access to the allocator, for recording commands against acquired storage.
    pub fn allocator_mut(&mut self) -> &mut A {
        &mut *self.allocator
    }

    /// Read access to the pool.
    pub fn pool(&self) -> &RenderTargetPool {
        &*self.pool
    }

    /// Releases all outstanding targets without ending the scope. Returns
    /// how many were released.
    pub fn release_all(&mut self) -> usize {
        self.pool.release_all(&mut *self.allocator)
    }

    /// Ends the frame, releasing all outstanding targets. Returns how many were released.
    pub fn finish(mut self) -> usize {
        self.release_all()
    }
}

impl<A: TargetAllocator + ?Sized> Drop for FrameScope<'_, A> {
    fn drop(&mut self) {
        let released = self.pool.release_all(&mut *self.allocator);
        if released > 0 {
            log::debug!("Ssf: frame scope released {released} target(s)");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::{FilterMode, TargetFormat};

    /// Allocator that counts live storage and can be told to fail.
    #[derive(Default)]
    struct CountingAllocator {
        next: u64,
        live: HashSet<StorageId>,
        fail_after: Option<usize>,
        allocations: usize,
    }

    impl TargetAllocator for CountingAllocator {
        fn allocate(&mut self, name: &str, descriptor: &TargetDescriptor) -> Result<StorageId> {
            if self.fail_after.is_some_and(|n| self.allocations >= n) {
                return Err(SsfError::ResourceExhausted {
                    name: name.to_string(),
                    width: descriptor.width,
                    height: descriptor.height,
                    format: descriptor.format,
                });
            }
            self.allocations += 1;
            self.next += 1;
            let id = StorageId(self.next);
            self.live.insert(id);
            Ok(id)
        }

        fn free(&mut self, storage: StorageId) {
            assert!(self.live.remove(&storage), "double free of {storage:?}");
        }
    }

    fn desc(w: u32, h: u32) -> TargetDescriptor {
        TargetDescriptor::new(w, h, TargetFormat::R32Float, FilterMode::Point)
    }

    #[test]
    fn test_same_name_returns_same_handle() {
        let mut alloc = CountingAllocator::default();
        let mut pool = RenderTargetPool::new();
        let a = pool.acquire(&mut alloc, "_SsfDepthTexture", desc(8, 8)).unwrap();
        let b = pool.acquire(&mut alloc, "_SsfDepthTexture", desc(8, 8)).unwrap();
        assert_eq!(a, b);
        assert_eq!(alloc.live.len(), 1);
        pool.release_all(&mut alloc);
    }

    #[test]
    fn test_redeclare_with_new_descriptor_reallocates() {
        let mut alloc = CountingAllocator::default();
        let mut pool = RenderTargetPool::new();
        let a = pool.acquire(&mut alloc, "t", desc(8, 8)).unwrap();
        let b = pool.acquire(&mut alloc, "t", desc(4, 4)).unwrap();
        assert_ne!(a.storage(), b.storage());
        assert_eq!(alloc.live.len(), 1);
        assert_eq!(pool.outstanding(), 1);
        pool.release_all(&mut alloc);
    }

    #[test]
    fn test_lookup_follows_redeclaration() {
        let mut alloc = CountingAllocator::default();
        let mut pool = RenderTargetPool::new();
        let old = pool.acquire(&mut alloc, "t", desc(8, 8)).unwrap();
        assert_eq!(pool.get("t"), Some(&old));
        assert!(pool.is_acquired(&old));

        let new = pool.acquire(&mut alloc, "t", desc(4, 4)).unwrap();
        assert_eq!(pool.get("t"), Some(&new));
        assert!(pool.is_acquired(&new));
        assert!(!pool.is_acquired(&old), "stale handle still reported as acquired");
        assert!(pool.get("other").is_none());

        pool.release_all(&mut alloc);
        assert!(pool.get("t").is_none());
        assert!(!pool.is_acquired(&new));
    }

    #[test]
    fn test_release_twice_is_an_error() {
        let mut alloc = CountingAllocator::default();
        let mut pool = RenderTargetPool::new();
        let a = pool.acquire(&mut alloc, "t", desc(8, 8)).unwrap();
        pool.release(&mut alloc, &a).unwrap();
        assert!(matches!(
            pool.release(&mut alloc, &a),
            Err(SsfError::ReleasedTarget(_))
        ));
        assert!(!pool.is_acquired(&a));
    }

    #[test]
    fn test_frame_scope_releases_on_drop() {
        let mut alloc = CountingAllocator::default();
        let mut pool = RenderTargetPool::new();
        {
            let mut frame = pool.begin_frame(&mut alloc);
            frame.acquire("a", desc(8, 8)).unwrap();
            frame.acquire("b", desc(4, 4)).unwrap();
            assert_eq!(frame.pool().outstanding(), 2);
        }
        assert_eq!(pool.outstanding(), 0);
        assert!(alloc.live.is_empty());
        assert_eq!(pool.stats().acquired, 2);
        assert_eq!(pool.stats().released, 2);
        assert_eq!(pool.stats().peak_outstanding, 2);
    }

    #[test]
    fn test_frame_scope_releases_after_failed_acquire() {
        fn run(frame: &mut FrameScope<'_, CountingAllocator>) -> Result<()> {
            frame.acquire("a", desc(8, 8))?;
            frame.acquire("b", desc(8, 8))?;
            frame.acquire("c", desc(8, 8))?;
            Ok(())
        }

        let mut alloc = CountingAllocator {
            fail_after: Some(2),
            ..Default::default()
        };
        let mut pool = RenderTargetPool::new();
        {
            let mut frame = pool.begin_frame(&mut alloc);
            let result = run(&mut frame);
            assert!(matches!(result, Err(SsfError::ResourceExhausted { .. })));
        }
        assert_eq!(pool.outstanding(), 0);
        assert!(alloc.live.is_empty());
    }

    #[test]
    fn test_finish_reports_count() {
        let mut alloc = CountingAllocator::default();
        let mut pool = RenderTargetPool::new();
        let mut frame = pool.begin_frame(&mut alloc);
        frame.acquire("a", desc(2, 2)).unwrap();
        assert_eq!(frame.finish(), 1);
        assert!(alloc.live.is_empty());
    }

    #[test]
    fn test_peak_bytes() {
        let mut alloc = CountingAllocator::default();
        let mut pool = RenderTargetPool::new();
        let mut frame = pool.begin_frame(&mut alloc);
        frame.acquire("a", desc(2, 2)).unwrap();
        frame.acquire("b", desc(2, 2)).unwrap();
        drop(frame);
        assert_eq!(pool.stats().peak_bytes, 2 * 2 * 2 * 4);
    }
}
