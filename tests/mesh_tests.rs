use std::fs;

use tiny_collide::{
    core::mesh::MESH_MAGIC, CollisionScene, MeshCollider, MeshLoadError, Vec3,
};

/// Unit cube corners, twelve outward-facing triangles.
fn cube() -> MeshCollider {
    let v = |x: f32, y: f32, z: f32| Vec3::new(x, y, z);
    let vertices = vec![
        v(-1.0, -1.0, -1.0),
        v(1.0, -1.0, -1.0),
        v(1.0, 1.0, -1.0),
        v(-1.0, 1.0, -1.0),
        v(-1.0, -1.0, 1.0),
        v(1.0, -1.0, 1.0),
        v(1.0, 1.0, 1.0),
        v(-1.0, 1.0, 1.0),
    ];
    let indices = vec![
        [0, 2, 1],
        [0, 3, 2],
        [4, 5, 6],
        [4, 6, 7],
        [0, 1, 5],
        [0, 5, 4],
        [3, 6, 2],
        [3, 7, 6],
        [0, 4, 7],
        [0, 7, 3],
        [1, 2, 6],
        [1, 6, 5],
    ];
    MeshCollider::from_triangles(vertices, indices).expect("valid cube")
}

#[test]
fn cube_normals_point_outward() {
    let mesh = cube();
    for index in 0..mesh.triangle_count() as u16 {
        let triangle = mesh.triangle(index).expect("triangle");
        assert!(
            triangle.normal.dot(triangle.centroid()) > 0.0,
            "triangle {index} faces inward"
        );
    }
    assert_eq!(mesh.bounds().min, Vec3::splat(-1.0));
    assert_eq!(mesh.bounds().max, Vec3::splat(1.0));
}

#[test]
fn bytes_round_trip_preserves_geometry() {
    let mesh = cube();
    let bytes = mesh.to_bytes();
    assert_eq!(&bytes[..4], &MESH_MAGIC);
    // magic + vertex count + vertices + triangle count + indices + normals
    assert_eq!(bytes.len(), 4 + 2 + 8 * 12 + 2 + 12 * 6 + 12 * 12);

    let loaded = MeshCollider::from_bytes(&bytes).expect("valid bytes");
    assert_eq!(loaded.vertices(), mesh.vertices());
    assert_eq!(loaded.indices(), mesh.indices());
    assert_eq!(loaded.normals(), mesh.normals());
    assert_eq!(loaded.tree().leaf_count(), 12);
}

#[test]
fn scene_loads_mesh_from_disk() {
    let path = std::env::temp_dir().join(format!("tiny_collide_mesh_{}.cmsh", std::process::id()));
    fs::write(&path, cube().to_bytes()).expect("write temp mesh");

    let mut scene = CollisionScene::default();
    scene.load_static_mesh(&path).expect("load mesh");
    assert_eq!(scene.static_mesh().map(MeshCollider::triangle_count), Some(12));

    fs::remove_file(&path).ok();
    assert!(matches!(
        scene.load_static_mesh(&path),
        Err(MeshLoadError::Io(_))
    ));
    assert!(scene.static_mesh().is_some(), "a failed load keeps the old mesh");
}

#[test]
fn corrupt_files_are_rejected() {
    let bytes = cube().to_bytes();
    assert!(matches!(
        MeshCollider::from_bytes(&bytes[..10]),
        Err(MeshLoadError::TooShort { offset: 10, .. })
    ));

    let mut bad_index = bytes.clone();
    // First index of the first triangle sits right after the triangle count.
    let first_index = 4 + 2 + 8 * 12 + 2;
    bad_index[first_index..first_index + 2].copy_from_slice(&200u16.to_be_bytes());
    assert!(matches!(
        MeshCollider::from_bytes(&bad_index),
        Err(MeshLoadError::IndexOutOfRange { triangle: 0, index: 200, .. })
    ));
}
