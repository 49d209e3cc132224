use scene_mount::MountOptions;

fn main() -> anyhow::Result<()> {
    let options = MountOptions::default()
        .with_preserve_drawing_buffer(true)
        .with_stencil(true)
        .on_scene_ready(|scene| log::info!("{} meshes on screen", scene.mesh_count()));
    scene_mount::app::run(options)
}
