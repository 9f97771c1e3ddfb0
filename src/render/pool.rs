use crate::foundation::error::SeqcardResult;
use crate::render::new_pixmap;
use std::collections::HashMap;

/// Maximum canvases retained across all size buckets.
const MAX_POOLED_CANVASES: usize = 10;

#[derive(Debug, Default, Clone, Copy)]
pub struct CanvasPoolStats {
    pub retained: usize,
    pub allocations: u64,
    pub reuses: u64,
    pub dropped_on_release: u64,
}

/// Bounded pooled allocator for beat canvases.
///
/// Canvases are cleared, not dropped, on release, so repeated beat rendering
/// at one size amortizes allocation cost. Callers must not retain a handle to
/// a pixmap after returning it.
pub struct CanvasPool {
    buckets: HashMap<(u32, u32), Vec<vello_cpu::Pixmap>>,
    retained: usize,
    stats: CanvasPoolStats,
}

impl Default for CanvasPool {
    fn default() -> Self {
        Self::new()
    }
}

impl CanvasPool {
    pub fn new() -> Self {
        Self {
            buckets: HashMap::new(),
            retained: 0,
            stats: CanvasPoolStats::default(),
        }
    }

    pub fn stats(&self) -> CanvasPoolStats {
        self.stats
    }

    /// Check out a cleared canvas of the given size.
    pub fn checkout(&mut self, width: u32, height: u32) -> SeqcardResult<vello_cpu::Pixmap> {
        if let Some(bucket) = self.buckets.get_mut(&(width, height))
            && let Some(pm) = bucket.pop()
        {
            self.retained -= 1;
            self.stats.retained = self.retained;
            self.stats.reuses += 1;
            return Ok(pm);
        }
        self.stats.allocations += 1;
        new_pixmap(width, height)
    }

    /// Return a canvas to the pool. The pixel contents are cleared; the
    /// allocation is kept unless the pool is at capacity.
    pub fn release(&mut self, mut pixmap: vello_cpu::Pixmap) {
        if self.retained >= MAX_POOLED_CANVASES {
            self.stats.dropped_on_release += 1;
            return;
        }
        pixmap.data_as_u8_slice_mut().fill(0);
        let key = (
            u32::from(pixmap.width()),
            u32::from(pixmap.height()),
        );
        self.buckets.entry(key).or_default().push(pixmap);
        self.retained += 1;
        self.stats.retained = self.retained;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkout_after_release_reuses_the_allocation() {
        let mut pool = CanvasPool::new();
        let a = pool.checkout(16, 16).unwrap();
        pool.release(a);
        let _b = pool.checkout(16, 16).unwrap();

        let st = pool.stats();
        assert_eq!(st.allocations, 1);
        assert_eq!(st.reuses, 1);
        assert_eq!(st.retained, 0);
    }

    #[test]
    fn released_canvases_come_back_cleared() {
        let mut pool = CanvasPool::new();
        let mut a = pool.checkout(4, 4).unwrap();
        a.data_as_u8_slice_mut().fill(200);
        pool.release(a);

        let b = pool.checkout(4, 4).unwrap();
        assert!(b.data_as_u8_slice().iter().all(|&x| x == 0));
    }

    #[test]
    fn pool_capacity_is_bounded() {
        let mut pool = CanvasPool::new();
        let canvases: Vec<_> = (0..12)
            .map(|_| pool.checkout(8, 8).unwrap())
            .collect();
        for pm in canvases {
            pool.release(pm);
        }

        let st = pool.stats();
        assert_eq!(st.retained, MAX_POOLED_CANVASES);
        assert_eq!(st.dropped_on_release, 2);
    }

    #[test]
    fn mismatched_sizes_use_separate_buckets() {
        let mut pool = CanvasPool::new();
        let a = pool.checkout(8, 8).unwrap();
        pool.release(a);
        let _b = pool.checkout(16, 16).unwrap();
        assert_eq!(pool.stats().reuses, 0);
        assert_eq!(pool.stats().allocations, 2);
    }
}
