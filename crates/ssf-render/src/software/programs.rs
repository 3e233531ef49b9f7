//! CPU versions of the four blit programs.
//!
//! These mirror the WGSL programs in `shaders/` texel for texel (up to
//! floating point ordering) and serve as the reference implementation.

use glam::{Vec2, Vec3, Vec4, Vec4Swizzles};

use ssf_core::{reconstruct_view_position, ReconstructionMode, SsfUniforms};

use super::image::Image;

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

fn texel(size: [f32; 4]) -> Vec2 {
    Vec2::new(size[0], size[1])
}

/// Averages four bilinear taps one source texel away on each diagonal.
pub fn down_sample(src: &Image, dst: &mut Image, uniforms: &SsfUniforms) {
    let t = texel(uniforms.src_texel_size);
    let taps = [
        Vec2::new(-t.x, -t.y),
        Vec2::new(t.x, -t.y),
        Vec2::new(-t.x, t.y),
        Vec2::new(t.x, t.y),
    ];
    for y in 0..dst.height() {
        for x in 0..dst.width() {
            let uv = dst.texel_center(x, y);
            let sum: Vec4 = taps.iter().map(|o| src.sample_bilinear(uv + *o)).sum();
            dst.store(x, y, sum * 0.25);
        }
    }
}

/// Averages four bilinear taps half a coarse texel away on each diagonal.
pub fn up_sample(src: &Image, dst: &mut Image, uniforms: &SsfUniforms) {
    let t = texel(uniforms.src_texel_size) * 0.5;
    let taps = [
        Vec2::new(-t.x, -t.y),
        Vec2::new(t.x, -t.y),
        Vec2::new(-t.x, t.y),
        Vec2::new(t.x, t.y),
    ];
    for y in 0..dst.height() {
        for x in 0..dst.width() {
            let uv = dst.texel_center(x, y);
            let sum: Vec4 = taps.iter().map(|o| src.sample_bilinear(uv + *o)).sum();
            dst.store(x, y, sum * 0.25);
        }
    }
}

/// View-space position of the surface at `uv` with device depth `depth`.
pub fn view_position(uniforms: &SsfUniforms, uv: Vec2, depth: f32) -> Vec3 {
    match uniforms.reconstruction() {
        ReconstructionMode::Matrix => {
            reconstruct_view_position(uniforms.clip_to_view(), uv.x, uv.y, depth)
        }
        ReconstructionMode::FrustumRay => {
            let [bl, br, tl, tr] = uniforms.frustum_corners();
            let ray = tl.lerp(tr, uv.x).lerp(bl.lerp(br, uv.x), uv.y);
            ray * uniforms.zbuffer().linear01(depth)
        }
    }
}

/// Packs a unit normal into `[0, 1]` with alpha 1 marking coverage.
pub fn encode_normal(n: Vec3) -> Vec4 {
    (n * 0.5 + Vec3::splat(0.5)).extend(1.0)
}

/// Unpacks a normal written by [`encode_normal`].
pub fn decode_normal(packed: Vec4) -> Vec3 {
    packed.xyz() * 2.0 - Vec3::ONE
}

/// Rebuilds view-space normals from the smoothed height field.
///
/// Uncovered pixels are written as zero (alpha 0). Derivatives use the
/// smaller of the forward and backward differences so depth discontinuities
/// at silhouettes do not bend the normal.
pub fn depth_normal(src: &Image, dst: &mut Image, uniforms: &SsfUniforms) {
    let threshold = uniforms.depth_threshold();
    let step = texel(uniforms.dst_texel_size);
    let position_at = |uv: Vec2| {
        let h = src.sample_bilinear(uv).x;
        (h > threshold).then(|| view_position(uniforms, uv, h))
    };
    let derivative = |p: Vec3, forward: Option<Vec3>, backward: Option<Vec3>| match (forward, backward) {
        (Some(f), Some(b)) => {
            let df = f - p;
            let db = p - b;
            Some(if df.length_squared() <= db.length_squared() { df } else { db })
        }
        (Some(f), None) => Some(f - p),
        (None, Some(b)) => Some(p - b),
        (None, None) => None,
    };

    for y in 0..dst.height() {
        for x in 0..dst.width() {
            let uv = dst.texel_center(x, y);
            let Some(p) = position_at(uv) else {
                dst.store(x, y, Vec4::ZERO);
                continue;
            };
            let ddx = derivative(
                p,
                position_at(uv + Vec2::new(step.x, 0.0)),
                position_at(uv - Vec2::new(step.x, 0.0)),
            );
            // +v runs down the screen.
            let ddy = derivative(
                p,
                position_at(uv + Vec2::new(0.0, step.y)),
                position_at(uv - Vec2::new(0.0, step.y)),
            );
            let normal = match (ddx, ddy) {
                (Some(dx), Some(dy)) => dy.cross(dx).normalize_or(Vec3::Z),
                _ => Vec3::Z,
            };
            dst.store(x, y, encode_normal(normal));
        }
    }
}

/// Lights covered pixels and composites them over `background`.
///
/// Pixels whose smoothed height does not exceed the depth threshold, or
/// that carry no reconstructed normal, are copied unchanged.
pub fn lit(
    background: &Image,
    depth: &Image,
    normals: &Image,
    dst: &mut Image,
    uniforms: &SsfUniforms,
) {
    let threshold = uniforms.depth_threshold();
    let t = texel(uniforms.dst_texel_size);
    let [glossiness, rim_amount, rim_threshold, _] = uniforms.shading;
    let [depth_scale, edge_scale, edge_depth_threshold, edge_normal_threshold] = uniforms.edges;
    let strength = uniforms.distortion[0];
    let tint = Vec4::from_array(uniforms.tint);
    let ambient = Vec4::from_array(uniforms.ambient_color).xyz();
    let specular = Vec4::from_array(uniforms.specular_color).xyz();
    let edge_color = Vec4::from_array(uniforms.edge_color);
    let light_dir = Vec4::from_array(uniforms.light_direction);
    let light_color = Vec4::from_array(uniforms.light_color).xyz() * light_dir.w;
    let l = light_dir.xyz().normalize_or(Vec3::Z);
    let orthographic = uniforms.zbuffer().orthographic;

    let half_floor = (edge_scale * 0.5).floor();
    let half_ceil = (edge_scale * 0.5).ceil();

    for y in 0..dst.height() {
        for x in 0..dst.width() {
            let original = background.load(i64::from(x), i64::from(y));
            let uv = dst.texel_center(x, y);
            let h = depth.sample_bilinear(uv).x;
            let packed = normals.sample_point(uv);
            if h <= threshold || packed.w < 0.5 {
                dst.store(x, y, original);
                continue;
            }
            let n = decode_normal(packed).normalize_or(Vec3::Z);
            let p = view_position(uniforms, uv, h);
            let v = if orthographic {
                Vec3::Z
            } else {
                (-p).normalize_or(Vec3::Z)
            };

            let n_dot_l = n.dot(l);
            let diffuse = smoothstep(0.0, 0.01, n_dot_l);
            let light = light_color * diffuse;

            let half = (l + v).normalize_or(Vec3::Z);
            let n_dot_h = n.dot(half).max(0.0);
            let spec = smoothstep(0.005, 0.01, (n_dot_h * diffuse).powf(glossiness * glossiness));

            let rim_dot = 1.0 - v.dot(n);
            let rim = rim_dot * n_dot_l.max(0.0).powf(rim_threshold);
            let rim = smoothstep(rim_amount - 0.01, rim_amount + 0.01, rim);

            let offset = Vec2::new(n.x, n.y) * strength * t;
            let bg = background.sample_bilinear(uv + offset).xyz();
            let shaded = bg * tint.xyz() * (ambient + light) + specular * spec + light * rim;
            let mut color = bg.lerp(shaded, tint.w);

            // Roberts cross around the pixel.
            let bl = uv - t * half_floor;
            let tr = uv + t * half_ceil;
            let br = uv + Vec2::new(t.x * half_ceil, -t.y * half_floor);
            let tl = uv + Vec2::new(-t.x * half_floor, t.y * half_ceil);
            let d = [bl, tr, br, tl].map(|s| depth.sample_bilinear(s).x);
            let nn = [bl, tr, br, tl].map(|s| decode_normal(normals.sample_point(s)));

            let depth_edge = ((d[1] - d[0]).powi(2) + (d[3] - d[2]).powi(2)).sqrt() * depth_scale;
            let normal_edge =
                ((nn[1] - nn[0]).length_squared() + (nn[3] - nn[2]).length_squared()).sqrt();
            if depth_edge > edge_depth_threshold * h || normal_edge > edge_normal_threshold {
                color = color.lerp(edge_color.xyz(), edge_color.w);
            }

            dst.store(x, y, color.extend(original.w));
        }
    }
}
