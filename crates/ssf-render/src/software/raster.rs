//! CPU rasterisation of billboarded spheres into a height field.
//!
//! Each sphere covers the screen rectangle spanned by its projected
//! view-space bounding box. Every covered sample casts a ray, intersects the
//! sphere exactly and keeps the nearest hit (largest reversed-Z depth).

use glam::{Mat4, Vec2, Vec3, Vec4, Vec4Swizzles};

use ssf_core::uv_to_ndc;

use super::image::Image;
use crate::backend::{DrawRequest, DrawStats};
use crate::depth_pass::HEIGHT_SENTINEL;

/// Standard sample offsets in 1/16 pixel units, by sample count.
fn sample_offsets(samples: u32) -> &'static [(i8, i8)] {
    match samples {
        2 => &[(4, 4), (-4, -4)],
        4 => &[(-2, -6), (6, -2), (-6, 2), (2, 6)],
        8 => &[
            (1, -3),
            (-1, 3),
            (5, 1),
            (-3, -5),
            (-5, 5),
            (-7, -1),
            (3, 7),
            (7, -7),
        ],
        _ => &[(0, 0)],
    }
}

/// Screen-space rectangle in pixels, inclusive.
#[derive(Debug, Clone, Copy)]
struct PixelRect {
    x0: u32,
    y0: u32,
    x1: u32,
    y1: u32,
}

struct Sphere {
    center: Vec3,
    radius: f32,
}

impl Sphere {
    /// Distance along a normalized ray to the first hit in front of `origin`.
    fn intersect(&self, origin: Vec3, dir: Vec3) -> Option<f32> {
        let oc = origin - self.center;
        let b = oc.dot(dir);
        let c = oc.length_squared() - self.radius * self.radius;
        let disc = b * b - c;
        if disc < 0.0 {
            return None;
        }
        let root = disc.sqrt();
        let near = -b - root;
        let t = if near >= 0.0 { near } else { -b + root };
        (t >= 0.0).then_some(t)
    }

    /// Pixel rectangle covered by the sphere's projected bounding box.
    fn screen_rect(&self, projection: Mat4, width: u32, height: u32) -> Option<PixelRect> {
        let mut min = Vec2::splat(f32::INFINITY);
        let mut max = Vec2::splat(f32::NEG_INFINITY);
        for i in 0..8 {
            let sign = Vec3::new(
                if i & 1 == 0 { -1.0 } else { 1.0 },
                if i & 2 == 0 { -1.0 } else { 1.0 },
                if i & 4 == 0 { -1.0 } else { 1.0 },
            );
            let clip = projection * (self.center + sign * self.radius).extend(1.0);
            if clip.w <= 1e-6 {
                // Crosses the camera plane: cover the whole target.
                min = Vec2::splat(-1.0);
                max = Vec2::splat(1.0);
                break;
            }
            let ndc = clip.xy() / clip.w;
            min = min.min(ndc);
            max = max.max(ndc);
        }
        if max.x < -1.0 || min.x > 1.0 || max.y < -1.0 || min.y > 1.0 {
            return None;
        }
        // ndc y points up, pixel rows go down.
        let to_px = |x: f32, size: u32| {
            ((x * size as f32).floor().max(0.0) as u32).min(size.saturating_sub(1))
        };
        let u0 = (min.x + 1.0) * 0.5;
        let u1 = (max.x + 1.0) * 0.5;
        let v0 = (1.0 - max.y) * 0.5;
        let v1 = (1.0 - min.y) * 0.5;
        Some(PixelRect {
            x0: to_px(u0, width),
            y0: to_px(v0, height),
            x1: to_px(u1, width),
            y1: to_px(v1, height),
        })
    }
}

/// Mean of the covered samples, or the sentinel when none is covered.
fn resolve(samples: &[f32]) -> f32 {
    let (sum, covered) = samples
        .iter()
        .filter(|&&h| h > HEIGHT_SENTINEL)
        .fold((0.0, 0u32), |(sum, count), &h| (sum + h, count + 1));
    if covered == 0 {
        HEIGHT_SENTINEL
    } else {
        sum / covered as f32
    }
}

/// Draws the eligible batches of `request` into `target`.
///
/// With `samples > 1` every pixel is evaluated at the standard sample
/// positions and resolved by averaging the covered samples. Uncovered
/// samples hold the sentinel and do not pull silhouettes toward the far
/// plane.
pub fn draw_billboards(target: &mut Image, request: &DrawRequest<'_>, samples: u32) -> DrawStats {
    let (width, height) = target.size();
    let offsets = sample_offsets(samples);
    let n = offsets.len();

    let mut depth: Vec<f32> = Vec::with_capacity(width as usize * height as usize * n);
    for y in 0..height {
        for x in 0..width {
            let current = target.load(i64::from(x), i64::from(y)).x;
            depth.extend(std::iter::repeat(current).take(n));
        }
    }

    let inverse = request.projection.inverse();
    let unproject = |ndc: Vec2, z: f32| {
        let p = inverse * Vec4::new(ndc.x, ndc.y, z, 1.0);
        p.xyz() / p.w
    };

    let mut stats = DrawStats::default();
    for batch in request.eligible() {
        stats.batches += 1;
        stats.instances += batch.instances.len();
        for instance in &batch.instances {
            let sphere = Sphere {
                center: request.view.transform_point3(instance.center),
                radius: instance.radius,
            };
            let Some(rect) = sphere.screen_rect(request.projection, width, height) else {
                continue;
            };
            for y in rect.y0..=rect.y1 {
                for x in rect.x0..=rect.x1 {
                    for (s, (ox, oy)) in offsets.iter().enumerate() {
                        let uv = Vec2::new(
                            (x as f32 + 0.5 + f32::from(*ox) / 16.0) / width as f32,
                            (y as f32 + 0.5 + f32::from(*oy) / 16.0) / height as f32,
                        );
                        let (nx, ny) = uv_to_ndc(uv.x, uv.y);
                        let ndc = Vec2::new(nx, ny);
                        // Reversed Z: 1 is the near plane, 0 the far plane.
                        let near = unproject(ndc, 1.0);
                        let far = unproject(ndc, 0.0);
                        let dir = (far - near).normalize_or_zero();
                        let Some(t) = sphere.intersect(near, dir) else {
                            continue;
                        };
                        let clip = request.projection * (near + dir * t).extend(1.0);
                        let d = clip.z / clip.w;
                        if !(0.0..=1.0).contains(&d) {
                            continue;
                        }
                        let i = (y as usize * width as usize + x as usize) * n + s;
                        if d > depth[i] {
                            depth[i] = d;
                        }
                    }
                }
            }
        }
    }

    for y in 0..height {
        for x in 0..width {
            let i = (y as usize * width as usize + x as usize) * n;
            target.store(x, y, Vec4::splat(resolve(&depth[i..i + n])));
        }
    }
    stats
}
