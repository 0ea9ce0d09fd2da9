use glam::{EulerRot, Mat4, Quat, Vec3};

/// Camera pose and projection, stored as a component on camera entities.
///
/// Provides the host-side camera queries effects need: world position,
/// Euler angles and the view/projection matrices.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraTransform {
    pub position: Vec3,
    pub rotation: Quat,
    pub fov: f32, // radians
    pub near: f32,
    pub far: f32,
}

impl Default for CameraTransform {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            rotation: Quat::IDENTITY,
            fov: std::f32::consts::FRAC_PI_3, // 60 degrees
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl CameraTransform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    /// Rotation from Euler angles in degrees, applied X then Y then Z.
    pub fn with_euler_degrees(mut self, x: f32, y: f32, z: f32) -> Self {
        self.rotation = Quat::from_euler(
            EulerRot::XYZ,
            x.to_radians(),
            y.to_radians(),
            z.to_radians(),
        );
        self
    }

    pub fn with_fov(mut self, fov_degrees: f32) -> Self {
        self.fov = fov_degrees.to_radians();
        self
    }

    /// Euler angles in degrees (X = pitch).
    pub fn euler_degrees(&self) -> Vec3 {
        let (x, y, z) = self.rotation.to_euler(EulerRot::XYZ);
        Vec3::new(x.to_degrees(), y.to_degrees(), z.to_degrees())
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position).inverse()
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov, aspect, self.near, self.far)
    }
}

/// Per-frame camera data pushed into effects before the queue renders.
///
/// Derived parameters (camera position for height fog, pitch for rotation fog)
/// are computed from this instead of being read from the camera inside the
/// render path.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameInputs {
    pub camera_position: Vec3,
    /// Euler angles in degrees.
    pub camera_euler: Vec3,
    pub view_projection: Mat4,
}

impl FrameInputs {
    pub fn from_camera(camera: &CameraTransform, aspect: f32) -> Self {
        Self {
            camera_position: camera.position,
            camera_euler: camera.euler_degrees(),
            view_projection: camera.projection_matrix(aspect) * camera.view_matrix(),
        }
    }

    /// Camera pitch (Euler X) in degrees.
    pub fn pitch(&self) -> f32 {
        self.camera_euler.x
    }

    pub fn inverse_view_projection(&self) -> Mat4 {
        self.view_projection.inverse()
    }
}

impl Default for FrameInputs {
    fn default() -> Self {
        Self::from_camera(&CameraTransform::default(), 1.0)
    }
}
