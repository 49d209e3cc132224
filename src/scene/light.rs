/// Ambient light blending between a sky colour along `direction` and a
/// ground colour opposite to it.
#[derive(Clone, Debug, PartialEq)]
pub struct HemisphericLight {
    pub name: String,
    pub direction: cgmath::Vector3<f32>,
    pub intensity: f32,
    pub diffuse: [f32; 3],
    pub ground_colour: [f32; 3],
}

impl HemisphericLight {
    /// A white light of intensity 1 shining from `direction`.
    pub fn new(name: impl Into<String>, direction: cgmath::Vector3<f32>) -> Self {
        Self {
            name: name.into(),
            direction,
            intensity: 1.0,
            diffuse: [1.0, 1.0, 1.0],
            ground_colour: [0.0, 0.0, 0.0],
        }
    }

    /// Scale the light by `intensity`.
    pub fn with_intensity(mut self, intensity: f32) -> Self {
        self.intensity = intensity;
        self
    }
}
