//! Frustum geometry and GPU projection helpers.
//!
//! The height field stores device depth in the reversed-Z convention
//! (1 at the near plane, 0 at the far plane). Host cameras supply a
//! right-handed projection with `[0, 1]` depth; [`gpu_projection_matrix`]
//! converts it to the convention the passes write and read.

use glam::{Mat4, Vec3, Vec4, Vec4Swizzles};

/// Order in which the four frustum corners are listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CornerOrder {
    /// Bottom-left, top-left, top-right, bottom-right (frustum winding).
    #[default]
    Frustum,
    /// Bottom-left, bottom-right, top-left, top-right (full-screen quad vertex order).
    Quad,
}

/// The four view-space corner rays of a camera frustum at the far plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrustumCorners {
    bottom_left: Vec3,
    top_left: Vec3,
    top_right: Vec3,
    bottom_right: Vec3,
}

impl FrustumCorners {
    /// Computes the far-plane corners of `projection` in view space.
    ///
    /// `projection` is the host projection (right-handed, `[0, 1]` depth).
    #[must_use]
    pub fn from_projection(projection: Mat4) -> Self {
        let inverse = projection.inverse();
        let unproject = |x: f32, y: f32| {
            let p = inverse * Vec4::new(x, y, 1.0, 1.0);
            p.xyz() / p.w
        };
        Self {
            bottom_left: unproject(-1.0, -1.0),
            top_left: unproject(-1.0, 1.0),
            top_right: unproject(1.0, 1.0),
            bottom_right: unproject(1.0, -1.0),
        }
    }

    /// Corners in the requested order.
    #[must_use]
    pub fn ordered(&self, order: CornerOrder) -> [Vec3; 4] {
        match order {
            CornerOrder::Frustum => [
                self.bottom_left,
                self.top_left,
                self.top_right,
                self.bottom_right,
            ],
            CornerOrder::Quad => [
                self.bottom_left,
                self.bottom_right,
                self.top_left,
                self.top_right,
            ],
        }
    }

    #[must_use]
    pub fn bottom_left(&self) -> Vec3 {
        self.bottom_left
    }

    #[must_use]
    pub fn top_left(&self) -> Vec3 {
        self.top_left
    }

    #[must_use]
    pub fn top_right(&self) -> Vec3 {
        self.top_right
    }

    #[must_use]
    pub fn bottom_right(&self) -> Vec3 {
        self.bottom_right
    }

    /// Interpolates the corner ray through a texture coordinate.
    ///
    /// `uv` has its origin at the top-left of the target.
    #[must_use]
    pub fn ray_at(&self, u: f32, v: f32) -> Vec3 {
        let top = self.top_left.lerp(self.top_right, u);
        let bottom = self.bottom_left.lerp(self.bottom_right, u);
        top.lerp(bottom, v)
    }
}

/// Converts a host projection to the reversed-Z projection the passes use.
///
/// When `flip_y` is set the Y axis is mirrored, for backends whose render
/// targets have a bottom-left origin.
#[must_use]
pub fn gpu_projection_matrix(projection: Mat4, flip_y: bool) -> Mat4 {
    let reverse_z = Mat4::from_cols(
        Vec4::X,
        Vec4::Y,
        Vec4::new(0.0, 0.0, -1.0, 0.0),
        Vec4::new(0.0, 0.0, 1.0, 1.0),
    );
    let flip = if flip_y {
        Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0))
    } else {
        Mat4::IDENTITY
    };
    flip * reverse_z * projection
}

/// Inverse of the GPU projection: maps (ndc.xy, device depth) to view space.
#[must_use]
pub fn clip_to_view_matrix(projection: Mat4, flip_y: bool) -> Mat4 {
    gpu_projection_matrix(projection, flip_y).inverse()
}

/// Maps a texture coordinate (top-left origin) to normalized device XY.
#[must_use]
pub fn uv_to_ndc(u: f32, v: f32) -> (f32, f32) {
    (u * 2.0 - 1.0, 1.0 - v * 2.0)
}

/// Reconstructs a view-space position from a texture coordinate and device depth.
#[must_use]
pub fn reconstruct_view_position(clip_to_view: Mat4, u: f32, v: f32, depth: f32) -> Vec3 {
    let (x, y) = uv_to_ndc(u, v);
    let p = clip_to_view * Vec4::new(x, y, depth, 1.0);
    p.xyz() / p.w
}

/// Near/far parameters used to linearise reversed-Z device depth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZBufferParams {
    pub near: f32,
    pub far: f32,
    pub orthographic: bool,
}

impl ZBufferParams {
    /// Extracts clip planes from a right-handed `[0, 1]`-depth projection.
    #[must_use]
    pub fn from_projection(projection: Mat4) -> Self {
        let m22 = projection.z_axis.z;
        let m32 = projection.w_axis.z;
        let orthographic = projection.w_axis.w.abs() > 0.5;
        if orthographic {
            // d = m22 * z + m32 with z = -near -> 0 and z = -far -> 1
            let near = m32 / m22;
            let far = (m32 - 1.0) / m22;
            Self {
                near,
                far,
                orthographic,
            }
        } else {
            Self {
                near: m32 / m22,
                far: m32 / (m22 + 1.0),
                orthographic,
            }
        }
    }

    /// Converts reversed-Z device depth to linear depth in `[near/far, 1]`.
    #[must_use]
    pub fn linear01(&self, depth: f32) -> f32 {
        if self.orthographic {
            (self.near + (1.0 - depth) * (self.far - self.near)) / self.far
        } else {
            self.near / (self.near + depth * (self.far - self.near))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn perspective(fov: f32, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(fov, aspect, 0.1, 100.0)
    }

    #[test]
    fn test_frustum_corners_lie_on_far_plane() {
        let corners = FrustumCorners::from_projection(perspective(1.0, 1.5));
        for c in corners.ordered(CornerOrder::Frustum) {
            assert!((c.z + 100.0).abs() < 5e-2, "corner {c:?} not on far plane");
        }
    }

    #[test]
    fn test_frustum_order() {
        let corners = FrustumCorners::from_projection(perspective(1.0, 1.0));
        let [bl, tl, tr, br] = corners.ordered(CornerOrder::Frustum);
        assert!(bl.x < 0.0 && bl.y < 0.0);
        assert!(tl.x < 0.0 && tl.y > 0.0);
        assert!(tr.x > 0.0 && tr.y > 0.0);
        assert!(br.x > 0.0 && br.y < 0.0);
    }

    #[test]
    fn test_reversed_z_maps_near_to_one() {
        let proj = perspective(1.0, 1.0);
        let gpu = gpu_projection_matrix(proj, false);
        let near = gpu * Vec4::new(0.0, 0.0, -0.1, 1.0);
        let far = gpu * Vec4::new(0.0, 0.0, -100.0, 1.0);
        assert!((near.z / near.w - 1.0).abs() < 1e-4);
        assert!((far.z / far.w).abs() < 1e-4);
    }

    #[test]
    fn test_flip_y_mirrors() {
        let proj = perspective(1.0, 1.0);
        let a = gpu_projection_matrix(proj, false) * Vec4::new(0.0, 1.0, -1.0, 1.0);
        let b = gpu_projection_matrix(proj, true) * Vec4::new(0.0, 1.0, -1.0, 1.0);
        assert!((a.y + b.y).abs() < 1e-5);
    }

    #[test]
    fn test_zbuffer_params_extraction() {
        let params = ZBufferParams::from_projection(perspective(1.0, 1.0));
        assert!((params.near - 0.1).abs() < 1e-4);
        assert!((params.far - 100.0).abs() < 1e-1);
        assert!(!params.orthographic);

        let ortho = Mat4::orthographic_rh(-1.0, 1.0, -1.0, 1.0, 0.5, 10.0);
        let params = ZBufferParams::from_projection(ortho);
        assert!(params.orthographic);
        assert!((params.near - 0.5).abs() < 1e-4);
        assert!((params.far - 10.0).abs() < 1e-3);
    }

    #[test]
    fn test_matrix_and_ray_reconstruction_agree() {
        let proj = perspective(0.9, 16.0 / 9.0);
        let gpu = gpu_projection_matrix(proj, false);
        let clip_to_view = clip_to_view_matrix(proj, false);
        let corners = FrustumCorners::from_projection(proj);
        let params = ZBufferParams::from_projection(proj);

        let point = Vec3::new(0.7, -0.3, -4.0);
        let clip = gpu * point.extend(1.0);
        let ndc = clip.xyz() / clip.w;
        let u = (ndc.x + 1.0) * 0.5;
        let v = (1.0 - ndc.y) * 0.5;

        let by_matrix = reconstruct_view_position(clip_to_view, u, v, ndc.z);
        let by_ray = corners.ray_at(u, v) * params.linear01(ndc.z);

        assert!((by_matrix - point).length() < 1e-3, "{by_matrix:?}");
        assert!((by_ray - point).length() < 1e-2, "{by_ray:?}");
    }

    #[test]
    fn test_linear01_endpoints() {
        let params = ZBufferParams::from_projection(perspective(1.0, 1.0));
        assert!((params.linear01(0.0) - 1.0).abs() < 1e-5);
        assert!((params.linear01(1.0) - 0.1 / 100.0).abs() < 1e-5);
    }

    proptest! {
        #[test]
        fn prop_quad_order_bottom_left_first_top_right_last(
            fov in 0.2f32..2.8,
            aspect in 0.2f32..5.0,
        ) {
            let corners = FrustumCorners::from_projection(perspective(fov, aspect));
            let quad = corners.ordered(CornerOrder::Quad);
            prop_assert_eq!(quad[0], corners.bottom_left());
            prop_assert_eq!(quad[3], corners.top_right());
            prop_assert!(quad[0].x < 0.0 && quad[0].y < 0.0);
            prop_assert!(quad[1].x > 0.0 && quad[1].y < 0.0);
            prop_assert!(quad[2].x < 0.0 && quad[2].y > 0.0);
            prop_assert!(quad[3].x > 0.0 && quad[3].y > 0.0);
        }
    }
}
