//! Spatial partitioning of triangles for worker ownership.
//!
//! Triangles are recursively bisected by centroid along the longest axis of
//! their bounding box until `threadcount * LEAVES_PER_WORKER` roughly equal
//! leaves exist. Each leaf is a partition: one worker owns it, its heap, and
//! every triangle in it.

use nalgebra::Point3;

/// Leaves per worker. A few spare partitions per worker keep cross-boundary
/// operations rare without fragmenting the mesh.
pub(crate) const LEAVES_PER_WORKER: usize = 4;

/// Assign a partition id to every triangle centroid. Returns the ids and the
/// partition count.
pub(crate) fn partition_triangles(
    centroids: &[Point3<f64>],
    threadcount: usize,
) -> (Vec<u16>, usize) {
    let target_leaves = (threadcount.max(1) * LEAVES_PER_WORKER).min(u16::MAX as usize);
    let mut ids = vec![0u16; centroids.len()];
    if centroids.is_empty() {
        return (ids, 1);
    }

    let mut order: Vec<u32> = (0..centroids.len() as u32).collect();
    let mut next_id = 0u16;
    bisect(centroids, &mut order, target_leaves, &mut next_id, &mut ids);
    (ids, next_id as usize)
}

/// Recursively split `order` (indices into `centroids`) into `leaves` groups,
/// writing partition ids as leaves are reached.
fn bisect(
    centroids: &[Point3<f64>],
    order: &mut [u32],
    leaves: usize,
    next_id: &mut u16,
    ids: &mut [u16],
) {
    if leaves <= 1 || order.len() <= 1 {
        let id = *next_id;
        *next_id += 1;
        for &t in order.iter() {
            ids[t as usize] = id;
        }
        return;
    }

    let axis = longest_axis(centroids, order);
    // Split leaves proportionally so uneven leaf targets still balance.
    let left_leaves = leaves / 2;
    let pivot = order.len() * left_leaves / leaves;
    order.select_nth_unstable_by(pivot, |&a, &b| {
        let ca = axis_value(&centroids[a as usize], axis);
        let cb = axis_value(&centroids[b as usize], axis);
        ca.total_cmp(&cb).then_with(|| a.cmp(&b))
    });

    let (left, right) = order.split_at_mut(pivot);
    bisect(centroids, left, left_leaves, next_id, ids);
    bisect(centroids, right, leaves - left_leaves, next_id, ids);
}

fn longest_axis(centroids: &[Point3<f64>], order: &[u32]) -> usize {
    let mut min = centroids[order[0] as usize];
    let mut max = min;
    for &t in order.iter() {
        let c = &centroids[t as usize];
        min.x = min.x.min(c.x);
        min.y = min.y.min(c.y);
        min.z = min.z.min(c.z);
        max.x = max.x.max(c.x);
        max.y = max.y.max(c.y);
        max.z = max.z.max(c.z);
    }
    let ext = max - min;
    if ext.x >= ext.y && ext.x >= ext.z {
        0
    } else if ext.y >= ext.z {
        1
    } else {
        2
    }
}

#[inline]
fn axis_value(p: &Point3<f64>, axis: usize) -> f64 {
    match axis {
        0 => p.x,
        1 => p.y,
        _ => p.z,
    }
}
