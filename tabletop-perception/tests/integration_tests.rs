//! End-to-end runs of the perception pipeline on synthetic frames

use std::sync::Arc;

use tabletop_core::{ColoredPoint3f, Error, OrganizedCloud};
use tabletop_perception::{
    PerceptionPipeline, PipelineParameters, ResultStore, SceneObject, Shape, SyntheticScene,
};

const CUBE_COLOR: [u8; 3] = [200, 30, 30];

/// Parameters matched to the 5 mm sampling of [`SyntheticScene`]
fn parameters() -> PipelineParameters {
    let mut params = PipelineParameters {
        downsample_leaf_size: 0.004,
        plane_distance_threshold: 0.003,
        surface_cluster_min_size: 1000,
        prism_z_min: 0.004,
        object_cluster_min_size: 50,
        random_seed: Some(7),
        ..PipelineParameters::default()
    };
    params.shape.max_iterations = 200;
    params.shape.distance_threshold = 0.002;
    params
}

fn cube(x: f32, side: f32) -> SceneObject {
    SceneObject::Cuboid {
        center: [x, 0.0],
        size: [side, side, side],
        color: CUBE_COLOR,
    }
}

#[test]
fn test_single_cube_volume_and_shape() -> anyhow::Result<()> {
    let side = 0.2;
    let frame = SyntheticScene::default().with_object(cube(0.0, side)).render()?;
    let pipeline = PerceptionPipeline::new(parameters())?;

    let summary = pipeline.process(&frame)?;
    assert_eq!(summary.objects, 1);
    assert_eq!(summary.skipped, 0);

    let snapshot = pipeline.snapshot();
    assert_eq!(snapshot.sequence, summary.sequence);
    let object = snapshot.objects().next().expect("one object");

    let expected = side * side * side;
    assert!(
        (object.volume - expected).abs() <= 0.1 * expected,
        "volume {} vs {}",
        object.volume,
        expected
    );
    assert_eq!(object.shape, Shape::Box);
    assert_eq!(object.average_rgb, CUBE_COLOR);
    assert!(object.histogram_quality > 200);
    assert!(object.centroid.x.abs() < 0.01);
    assert!(object.centroid.y.abs() < 0.01);
    assert!(object.centroid.z > 0.85 && object.centroid.z < 0.95);
    Ok(())
}

#[test]
fn test_single_cylinder_volume_and_shape() -> anyhow::Result<()> {
    let (radius, height) = (0.04, 0.15);
    let color = [30, 60, 200];
    let frame = SyntheticScene::default()
        .with_object(SceneObject::Cylinder {
            center: [0.2, 0.15],
            radius,
            height,
            color,
        })
        .render()?;
    let pipeline = PerceptionPipeline::new(parameters())?;

    let summary = pipeline.process(&frame)?;
    assert_eq!(summary.objects, 1);

    let snapshot = pipeline.snapshot();
    let object = snapshot.objects().next().expect("one object");

    let expected = std::f32::consts::PI * radius * radius * height;
    assert!(
        (object.volume - expected).abs() <= 0.1 * expected,
        "volume {} vs {}",
        object.volume,
        expected
    );
    assert!(object.area < 0.1, "area {}", object.area);
    assert_eq!(object.shape, Shape::Cylinder);
    assert_eq!(object.average_rgb, color);
    assert!((object.centroid.x - 0.2).abs() < 0.01);
    assert!((object.centroid.y - 0.15).abs() < 0.01);
    Ok(())
}

#[test]
fn test_two_cubes_get_consecutive_ids_and_disjoint_rois() -> anyhow::Result<()> {
    let frame = SyntheticScene::default()
        .with_object(cube(-0.25, 0.1))
        .with_object(cube(0.25, 0.1))
        .render()?;
    let pipeline = PerceptionPipeline::new(parameters())?;

    pipeline.process(&frame)?;
    let snapshot = pipeline.snapshot();
    let objects: Vec<_> = snapshot.objects().collect();
    assert_eq!(objects.len(), 2);

    let mut ids: Vec<u64> = objects.iter().map(|o| o.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![0, 1]);
    assert!(!objects[0].roi.intersects(&objects[1].roi));

    // every contributing pixel lies in the object's ROI and is painted in its crop
    for record in &snapshot.records {
        let roi = record.object.roi;
        assert_eq!(record.image.dimensions(), (roi.width as u32, roi.height as u32));
        assert_eq!(record.source_indices.len(), record.cloud.len());
        for (&index, point) in record.source_indices.iter().zip(record.cloud.iter()) {
            assert_eq!(frame.get(index), Some(point));
            let (row, column) = frame.pixel_of(index).expect("pixel");
            assert!(roi.contains(row, column));
            let pixel = record.image.get_pixel((column - roi.x) as u32, (row - roi.y) as u32);
            assert_eq!(pixel.0, CUBE_COLOR);
        }
    }

    // ids keep increasing across runs
    pipeline.process(&frame)?;
    let mut ids: Vec<u64> = pipeline.snapshot().objects().map(|o| o.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![2, 3]);
    Ok(())
}

#[test]
fn test_all_nan_frame_leaves_store_unchanged() -> anyhow::Result<()> {
    let store = Arc::new(ResultStore::new());
    let pipeline = PerceptionPipeline::with_store(parameters(), Arc::clone(&store))?;

    let frame = SyntheticScene::default().with_object(cube(0.0, 0.1)).render()?;
    pipeline.process(&frame)?;
    let before = store.snapshot();

    let nan = OrganizedCloud::new(64, 48, vec![ColoredPoint3f::invalid(); 64 * 48])?;
    let result = pipeline.process(&nan);
    assert!(matches!(result, Err(Error::EmptyInput { .. })));

    let after = store.snapshot();
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(after.len(), 1);
    Ok(())
}

#[test]
fn test_flat_table_publishes_surface_without_objects() -> anyhow::Result<()> {
    let frame = SyntheticScene::default().render()?;
    let pipeline = PerceptionPipeline::new(parameters())?;

    let summary = pipeline.process(&frame)?;
    assert_eq!(summary.objects, 0);
    assert_eq!(summary.objects_above_points, 0);

    let snapshot = pipeline.snapshot();
    assert_eq!(snapshot.sequence, 1);
    assert!(snapshot.is_empty());
    assert!(snapshot.support_surface.len() >= 1000);
    assert!(snapshot.objects_above.is_empty());

    let plane = snapshot.plane.expect("support plane");
    // oriented towards the camera at the origin
    assert!(plane.normal().normalize().z < -0.99);
    Ok(())
}

#[test]
fn test_support_surface_points_lie_on_table() -> anyhow::Result<()> {
    let frame = SyntheticScene::default().with_object(cube(0.1, 0.1)).render()?;
    let pipeline = PerceptionPipeline::new(parameters())?;
    pipeline.process(&frame)?;

    let snapshot = pipeline.snapshot();
    assert!(snapshot
        .support_surface
        .iter()
        .all(|p| (p.position.z - 1.0).abs() < 0.003));
    assert!(snapshot
        .objects_above
        .iter()
        .all(|p| p.color == CUBE_COLOR));
    Ok(())
}

#[test]
fn test_out_of_range_objects_are_ignored() -> anyhow::Result<()> {
    // the whole cube stays below the height band
    let frame = SyntheticScene::default().with_object(cube(0.0, 0.1)).render()?;
    let params = PipelineParameters {
        prism_z_min: 0.2,
        prism_z_max: 0.5,
        ..parameters()
    };
    let pipeline = PerceptionPipeline::new(params)?;

    let summary = pipeline.process(&frame)?;
    assert_eq!(summary.objects, 0);
    Ok(())
}
