use cgmath::{EuclideanSpace, InnerSpace, Point3, Rad, Vector3, perspective};

/// Maps OpenGL clip space depth (-1..1) to wgpu's (0..1).
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: cgmath::Matrix4<f32> = cgmath::Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

/// A camera orbiting `target` at `radius`.
///
/// `alpha` is the longitudinal angle around Y, `beta` the latitudinal angle
/// measured from the Y axis. `beta` is kept strictly inside `(0, π)` so the
/// view never flips over the pole.
#[derive(Clone, Debug, PartialEq)]
pub struct ArcRotateCamera {
    pub name: String,
    pub alpha: f32,
    pub beta: f32,
    pub radius: f32,
    pub target: Point3<f32>,
    pub fovy: Rad<f32>,
    pub znear: f32,
    pub zfar: f32,
}

impl ArcRotateCamera {
    const BETA_EPSILON: f32 = 1e-3;

    /// A camera at `alpha`/`beta`/`radius` around `target`.
    pub fn new(name: impl Into<String>, alpha: f32, beta: f32, radius: f32, target: Point3<f32>) -> Self {
        let mut camera = Self {
            name: name.into(),
            alpha,
            beta,
            radius: radius.max(f32::EPSILON),
            target,
            fovy: Rad(0.8),
            znear: 0.1,
            zfar: 500.0,
        };
        camera.rotate(0.0, 0.0);
        camera
    }

    /// Orbit by the given angles, clamping `beta` away from the poles.
    pub fn rotate(&mut self, d_alpha: f32, d_beta: f32) {
        self.alpha += d_alpha;
        self.beta = (self.beta + d_beta).clamp(
            Self::BETA_EPSILON,
            std::f32::consts::PI - Self::BETA_EPSILON,
        );
    }

    /// Camera position in world space.
    pub fn position(&self) -> Point3<f32> {
        let offset = Vector3::new(
            self.radius * self.alpha.cos() * self.beta.sin(),
            self.radius * self.beta.cos(),
            self.radius * self.alpha.sin() * self.beta.sin(),
        );
        self.target + offset
    }

    /// Combined view and projection matrix for a viewport of `aspect`.
    pub fn view_proj(&self, aspect: f32) -> cgmath::Matrix4<f32> {
        let view = cgmath::Matrix4::look_at_rh(self.position(), self.target, Vector3::unit_y());
        let proj = perspective(self.fovy, aspect.max(f32::EPSILON), self.znear, self.zfar);
        OPENGL_TO_WGPU_MATRIX * proj * view
    }

    /// Unit vector from the camera towards its target.
    pub fn forward(&self) -> Vector3<f32> {
        (self.target.to_vec() - self.position().to_vec()).normalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orbit_keeps_the_radius() {
        let camera = ArcRotateCamera::new(
            "camera1",
            std::f32::consts::FRAC_PI_2,
            std::f32::consts::FRAC_PI_3,
            10.0,
            Point3::origin(),
        );
        let distance = camera.position().to_vec().magnitude();
        assert!((distance - 10.0).abs() < 1e-4);
        assert!(camera.position().y > 0.0);
    }

    #[test]
    fn beta_is_clamped_away_from_the_poles() {
        let mut camera = ArcRotateCamera::new("c", 0.0, 0.5, 1.0, Point3::origin());
        camera.rotate(0.0, 10.0);
        assert!(camera.beta < std::f32::consts::PI);
        camera.rotate(0.0, -20.0);
        assert!(camera.beta > 0.0);
    }
}
