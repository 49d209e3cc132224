//! The drawable area a scene is mounted onto.
//!
//! A [`SurfaceHandle`] is owned by the hosting component and only borrowed by
//! the device handle, which reads its current size on every resize signal.

use winit::{dpi::PhysicalSize, window::Window};

/// A drawable area measured in logical (CSS) pixels.
pub trait SurfaceHandle {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn device_pixel_ratio(&self) -> f64;

    fn is_usable(&self) -> bool {
        self.width() > 0 && self.height() > 0 && self.device_pixel_ratio() > 0.0
    }
}

/// Size of the back buffer for `surface`.
///
/// With `adapt_to_device_ratio` the buffer follows the physical pixel grid,
/// otherwise one buffer pixel covers one logical pixel.
pub fn render_size(surface: &dyn SurfaceHandle, adapt_to_device_ratio: bool) -> PhysicalSize<u32> {
    let scale = if adapt_to_device_ratio {
        surface.device_pixel_ratio()
    } else {
        1.0
    };
    PhysicalSize::new(
        (surface.width() as f64 * scale).round() as u32,
        (surface.height() as f64 * scale).round() as u32,
    )
}

/// A winit window used as the render surface.
///
/// On the web this is the `<canvas>` element the window was bound to.
impl SurfaceHandle for Window {
    fn width(&self) -> u32 {
        let logical = self.inner_size().to_logical::<f64>(self.scale_factor());
        logical.width.round() as u32
    }

    fn height(&self) -> u32 {
        let logical = self.inner_size().to_logical::<f64>(self.scale_factor());
        logical.height.round() as u32
    }

    fn device_pixel_ratio(&self) -> f64 {
        self.scale_factor()
    }
}

impl<S: SurfaceHandle + ?Sized> SurfaceHandle for std::sync::Arc<S> {
    fn width(&self) -> u32 {
        (**self).width()
    }

    fn height(&self) -> u32 {
        (**self).height()
    }

    fn device_pixel_ratio(&self) -> f64 {
        (**self).device_pixel_ratio()
    }

    fn is_usable(&self) -> bool {
        (**self).is_usable()
    }
}
