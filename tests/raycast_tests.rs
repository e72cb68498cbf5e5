use approx::assert_abs_diff_eq;
use tiny_collide::{
    CollisionScene, EntityId, MeshCollider, PhysicsObject, RaycastQuery, Shape, Vec3,
};

fn sphere_at(entity: u16, position: Vec3) -> PhysicsObject {
    PhysicsObject::builder(EntityId(entity), Shape::sphere(0.5))
        .position(position)
        .fixed()
        .build()
}

fn scene() -> CollisionScene {
    let mut scene = CollisionScene::default();
    scene.add(sphere_at(1, Vec3::new(0.0, 0.0, 5.0)));
    scene.add(
        PhysicsObject::builder(EntityId(2), Shape::cuboid(Vec3::splat(0.5)))
            .position(Vec3::new(0.0, 0.0, 10.0))
            .layers(0b10, 0)
            .fixed()
            .build(),
    );
    scene.add(
        PhysicsObject::builder(EntityId(3), Shape::sphere(1.0))
            .position(Vec3::new(0.0, 0.0, 3.0))
            .trigger(true)
            .fixed()
            .build(),
    );
    scene
}

#[test]
fn nearest_solid_object_is_hit() {
    let scene = scene();
    let hit = scene
        .raycast(&RaycastQuery::new(Vec3::ZERO, Vec3::Z, 100.0))
        .expect("hits the first sphere");
    assert_eq!(hit.entity, EntityId(1));
    assert_abs_diff_eq!(hit.distance, 4.5, epsilon = 1e-4);
    assert_abs_diff_eq!(hit.point.z, 4.5, epsilon = 1e-4);
    assert_abs_diff_eq!(hit.normal.z, -1.0, epsilon = 1e-4);
}

#[test]
fn layer_mask_and_ignore_filter_hits() {
    let scene = scene();
    let hit = scene
        .raycast(&RaycastQuery::new(Vec3::ZERO, Vec3::Z, 100.0).with_layer_mask(0b10))
        .expect("only the box is on layer 2");
    assert_eq!(hit.entity, EntityId(2));
    assert_abs_diff_eq!(hit.distance, 9.5, epsilon = 1e-4);

    let hit = scene
        .raycast(&RaycastQuery::new(Vec3::ZERO, Vec3::Z, 100.0).ignoring(EntityId(1)))
        .expect("box behind the ignored sphere");
    assert_eq!(hit.entity, EntityId(2));
}

#[test]
fn triggers_are_opt_in() {
    let scene = scene();
    let hit = scene
        .raycast(&RaycastQuery::new(Vec3::ZERO, Vec3::Z, 100.0).with_triggers())
        .expect("trigger in front");
    assert_eq!(hit.entity, EntityId(3));
    assert_abs_diff_eq!(hit.distance, 2.0, epsilon = 1e-4);
}

#[test]
fn max_distance_and_direction_limit_hits() {
    let scene = scene();
    assert!(scene.raycast(&RaycastQuery::new(Vec3::ZERO, Vec3::Z, 4.0)).is_none());
    assert!(scene.raycast(&RaycastQuery::new(Vec3::ZERO, -Vec3::Z, 100.0)).is_none());
    assert!(scene.raycast(&RaycastQuery::new(Vec3::ZERO, Vec3::ZERO, 100.0)).is_none());
}

#[test]
fn static_mesh_hits_report_no_entity() {
    let mut scene = scene();
    let floor = MeshCollider::from_triangles(
        vec![
            Vec3::new(-20.0, -2.0, -20.0),
            Vec3::new(20.0, -2.0, -20.0),
            Vec3::new(20.0, -2.0, 20.0),
            Vec3::new(-20.0, -2.0, 20.0),
        ],
        vec![[0, 2, 1], [0, 3, 2]],
    )
    .expect("valid floor");
    scene.set_static_mesh(floor);

    let down = RaycastQuery::new(Vec3::new(0.3, 5.0, -0.7), -Vec3::Y, 100.0);
    let hit = scene.raycast(&down).expect("floor below");
    assert_eq!(hit.entity, EntityId::NONE);
    assert_abs_diff_eq!(hit.distance, 7.0, epsilon = 1e-4);
    assert_abs_diff_eq!(hit.normal.y, 1.0, epsilon = 1e-5);

    // An object in front of the floor wins.
    let through_sphere = RaycastQuery::new(Vec3::new(0.0, 5.0, 5.0), -Vec3::Y, 100.0);
    assert_eq!(scene.raycast(&through_sphere).expect("sphere").entity, EntityId(1));
}
