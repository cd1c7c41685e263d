//! Consistent-hash placement ring
//!
//! Pure path → worker-id placement. Every worker constructs the same ring
//! from the same `(worker_count, replicas)` pair, so `node_for` answers
//! identically on every worker and across runs. The ring is immutable after
//! construction; worker membership does not change for the life of the
//! cluster.

/// Virtual nodes placed on the circle per worker.
pub const DEFAULT_REPLICAS: u32 = 160;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a, 64-bit. Stable constants, identical output on every platform.
pub fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Placement ring over `worker_count` workers with `replicas` virtual nodes
/// each.
pub struct HashRing {
    worker_count: u32,
    /// `(hash, worker id)` sorted by hash, then worker id. The secondary
    /// order settles equal-hash collisions on the smaller worker id.
    points: Vec<(u64, u32)>,
}

impl HashRing {
    pub fn new(worker_count: u32, replicas: u32) -> Self {
        let mut points = Vec::with_capacity((worker_count as usize) * (replicas as usize));
        for worker in 0..worker_count {
            for replica in 0..replicas {
                let key = format!("{worker}:{replica}");
                points.push((fnv1a_64(key.as_bytes()), worker));
            }
        }
        points.sort_unstable();
        Self { worker_count, points }
    }

    /// Worker owning `path`: the first virtual node at or clockwise of
    /// `hash(path)`, wrapping past the top of the circle to index 0.
    pub fn node_for(&self, path: &str) -> u32 {
        let hash = fnv1a_64(path.as_bytes());
        let idx = self.points.partition_point(|&(point, _)| point < hash);
        self.points[idx % self.points.len()].1
    }

    pub fn worker_count(&self) -> u32 {
        self.worker_count
    }
}
