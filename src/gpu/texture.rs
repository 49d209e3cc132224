//! Depth (and optional stencil) attachment.

/// Depth (and optionally stencil) attachment sized to the surface.
#[derive(Debug)]
pub struct DepthTexture {
    #[allow(unused)]
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub format: wgpu::TextureFormat,
}

impl DepthTexture {
    /// Depth-only format.
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
    /// Format used when a stencil buffer is requested.
    pub const DEPTH_STENCIL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;

    /// The attachment format for the stencil option.
    pub fn format_for(stencil: bool) -> wgpu::TextureFormat {
        if stencil {
            Self::DEPTH_STENCIL_FORMAT
        } else {
            Self::DEPTH_FORMAT
        }
    }

    /// A depth buffer matching a `size[0]` x `size[1]` back buffer.
    pub fn new(device: &wgpu::Device, size: [u32; 2], stencil: bool, label: &str) -> Self {
        let format = Self::format_for(stencil);
        let size = wgpu::Extent3d {
            width: size[0].max(1),
            height: size[1].max(1),
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[format],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            texture,
            view,
            format,
        }
    }

    /// `true` if the attachment carries a stencil aspect.
    pub fn has_stencil(&self) -> bool {
        self.format.has_stencil_aspect()
    }
}
