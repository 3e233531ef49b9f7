//! Headless wgpu rendering tests.
//!
//! These need a GPU adapter (real or software fallback). Without one they
//! print a note and return early.

use ssf_core::{
    BillboardBatch, BillboardInstance, CameraFrame, DirectionalLight, LayerMask, Mat4,
    PipelineConfig, StorageId, TargetFormat, Vec3, Vec4,
};
use ssf_render::{
    FrameOutcome, FrameStage, GpuBackend, RenderBackend, SoftwareBackend, SsfPipeline,
};

const SIZE: u32 = 48;

fn gpu() -> Option<GpuBackend> {
    let _ = env_logger::builder().is_test(true).try_init();
    match GpuBackend::headless() {
        Ok(backend) => Some(backend),
        Err(e) => {
            eprintln!("Skipping headless tests: no GPU adapter available ({e})");
            None
        }
    }
}

fn camera(color: StorageId) -> CameraFrame {
    CameraFrame::new(
        Mat4::perspective_rh(1.0, 1.0, 0.1, 100.0),
        Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y),
        SIZE,
        SIZE,
        color,
    )
    .with_light(DirectionalLight {
        direction: Vec3::new(0.3, 0.4, 1.0).normalize(),
        color: Vec3::ONE,
        intensity: 1.0,
    })
}

fn scene() -> Vec<BillboardBatch> {
    vec![BillboardBatch::new("SsfBillboardSphereDepth", 0, 3000).with_instances([
        BillboardInstance::new(Vec3::new(-0.6, 0.0, 0.0), 1.0),
        BillboardInstance::new(Vec3::new(0.7, 0.3, -0.5), 0.8),
    ])]
}

fn background() -> Vec<Vec4> {
    (0..SIZE * SIZE)
        .map(|i| {
            let y = (i / SIZE) as f32 / SIZE as f32;
            Vec4::new(0.2, 0.3 + 0.3 * y, 0.5, 1.0)
        })
        .collect()
}

fn config() -> PipelineConfig {
    PipelineConfig::default().with_layer_mask(LayerMask::EVERYTHING)
}

#[test]
fn headless_sphere_overlay() {
    let Some(mut backend) = gpu() else {
        return;
    };
    let color = backend
        .create_image(SIZE, SIZE, TargetFormat::Rgba8Unorm)
        .unwrap();
    backend.write_image(color, &background()).unwrap();
    let before = backend.read_image(color).unwrap();

    let mut pipeline = SsfPipeline::new(config(), &backend).unwrap();
    let outcome = pipeline.render(&mut backend, &camera(color), &scene());
    let stats = outcome.stats().expect("frame should render");
    assert_eq!(stats.instances, 2);
    assert_eq!(backend.live_targets(), 0);

    let after = backend.read_image(color).unwrap();
    assert_eq!(after[0], before[0], "uncovered corner changed");
    let changed = after.iter().zip(&before).filter(|(a, b)| a != b).count();
    assert!(changed > 100, "only {changed} pixels shaded");
}

#[test]
fn headless_matches_software_capture() {
    let Some(mut gpu) = gpu() else {
        return;
    };
    let config = config().with_blur_iterations(0);

    let gpu_color = gpu.create_image(SIZE, SIZE, TargetFormat::Rgba8Unorm).unwrap();
    let mut pipeline = SsfPipeline::new(config.clone(), &gpu).unwrap();
    let mut frame = pipeline.configure(&mut gpu, &camera(gpu_color)).unwrap();
    frame.execute(&scene()).unwrap();
    let gpu_depth = frame
        .backend()
        .read_image(frame.targets().depth.storage())
        .unwrap();
    frame.cleanup();

    let mut cpu = SoftwareBackend::new();
    let cpu_color = cpu.create_image(SIZE, SIZE, TargetFormat::Rgba8Unorm);
    let mut pipeline = SsfPipeline::new(config, &cpu).unwrap();
    let mut frame = pipeline.configure(&mut cpu, &camera(cpu_color)).unwrap();
    frame.execute(&scene()).unwrap();
    let cpu_depth = frame
        .backend()
        .image(frame.targets().depth.storage())
        .unwrap()
        .channel0();
    frame.cleanup();

    // Coverage may differ on silhouette pixels only.
    let mismatched = gpu_depth
        .iter()
        .zip(&cpu_depth)
        .filter(|(g, c)| (g.x - **c).abs() > 1e-4)
        .count();
    assert!(
        mismatched * 20 < gpu_depth.len(),
        "{mismatched} of {} height texels differ",
        gpu_depth.len()
    );
}

#[test]
fn headless_dropped_frame_leaves_color() {
    let Some(mut backend) = gpu() else {
        return;
    };
    let color = backend
        .create_image(SIZE, SIZE, TargetFormat::Rgba8Unorm)
        .unwrap();
    backend.write_image(color, &background()).unwrap();
    let before = backend.read_image(color).unwrap();

    let mut pipeline = SsfPipeline::new(config(), &backend).unwrap();
    let mut too_large = camera(color);
    too_large.width = backend.device().limits().max_texture_dimension_2d + 1;
    match pipeline.render(&mut backend, &too_large, &scene()) {
        FrameOutcome::Dropped { stage, .. } => assert_eq!(stage, FrameStage::Configure),
        FrameOutcome::Rendered(_) => panic!("oversized frame rendered"),
    }
    backend.submit().unwrap();
    assert_eq!(backend.read_image(color).unwrap(), before);
    assert_eq!(backend.live_targets(), 0);
}

#[test]
fn headless_rejects_msaa() {
    let Some(backend) = gpu() else {
        return;
    };
    assert!(!backend.supports_msaa(4));
    assert!(SsfPipeline::new(config().with_msaa_samples(4), &backend).is_err());
}

#[test]
fn headless_scratch_textures_follow_frame_size() {
    let Some(mut backend) = gpu() else {
        return;
    };
    let mut pipeline = SsfPipeline::new(config(), &backend).unwrap();
    let color = backend
        .create_image(SIZE, SIZE, TargetFormat::Rgba8Unorm)
        .unwrap();
    for _ in 0..3 {
        assert!(pipeline
            .render(&mut backend, &camera(color), &scene())
            .stats()
            .is_some());
    }
    assert_eq!(backend.blit_copy_size(), Some((SIZE, SIZE)));
    assert_eq!(backend.billboard_depth_size(), Some((SIZE, SIZE)));

    // Resizing replaces the cached textures instead of adding more.
    let small = SIZE / 2;
    let small_color = backend
        .create_image(small, small, TargetFormat::Rgba8Unorm)
        .unwrap();
    let mut small_camera = camera(small_color);
    small_camera.width = small;
    small_camera.height = small;
    assert!(pipeline
        .render(&mut backend, &small_camera, &scene())
        .stats()
        .is_some());
    assert_eq!(backend.blit_copy_size(), Some((small, small)));
    assert_eq!(backend.billboard_depth_size(), Some((small, small)));
    assert_eq!(backend.live_targets(), 0);
}
