use approx::assert_abs_diff_eq;
use tiny_collide::{
    CollisionScene, EntityId, Material, MeshCollider, PhysicsConfig, PhysicsObject, Shape, Simulation,
    Transform, TransformHandle, Vec3,
};

fn ground(half: f32) -> MeshCollider {
    MeshCollider::from_triangles(
        vec![
            Vec3::new(-half, 0.0, -half),
            Vec3::new(half, 0.0, -half),
            Vec3::new(half, 0.0, half),
            Vec3::new(-half, 0.0, half),
        ],
        vec![[0, 2, 1], [0, 3, 2]],
    )
    .expect("valid ground")
}

fn ball(entity: u16, position: Vec3) -> PhysicsObject {
    PhysicsObject::builder(EntityId(entity), Shape::sphere(0.5))
        .position(position)
        .build()
}

#[test]
fn dropped_ball_rests_on_ground_and_sleeps() {
    let mut scene = CollisionScene::default();
    scene.set_static_mesh(ground(10.0));
    scene.add(ball(1, Vec3::new(0.4, 3.0, 0.7)));

    for _ in 0..120 {
        scene.tick();
    }

    let object = scene.object(EntityId(1)).expect("ball");
    assert_abs_diff_eq!(object.position().y, 0.5, epsilon = 0.02);
    assert!(object.is_sleeping());
    assert!(scene.is_touching(EntityId(1), EntityId::NONE));
}

#[test]
fn head_on_elastic_collision_conserves_momentum() {
    let config = PhysicsConfig::default()
        .with_gravity(Vec3::ZERO)
        .with_velocity_damping(1.0);
    let mut scene = CollisionScene::new(config);
    let elastic = Material::new(0.0, 1.0);
    scene.add(
        PhysicsObject::builder(EntityId(1), Shape::sphere(0.5))
            .material(elastic)
            .velocity(Vec3::new(3.0, 0.0, 0.0))
            .build(),
    );
    scene.add(
        PhysicsObject::builder(EntityId(2), Shape::sphere(0.5))
            .position(Vec3::new(2.0, 0.0, 0.0))
            .material(elastic)
            .velocity(Vec3::new(-1.0, 0.0, 0.0))
            .build(),
    );

    let momentum = |scene: &CollisionScene| {
        scene.object(EntityId(1)).expect("a").velocity() + scene.object(EntityId(2)).expect("b").velocity()
    };
    let before = momentum(&scene);

    for _ in 0..30 {
        scene.tick();
    }

    let after = momentum(&scene);
    assert_abs_diff_eq!(after.x, before.x, epsilon = 1e-3);
    let a = scene.object(EntityId(1)).expect("a").velocity();
    let b = scene.object(EntityId(2)).expect("b").velocity();
    assert_abs_diff_eq!(a.x, -1.0, epsilon = 0.05);
    assert_abs_diff_eq!(b.x, 3.0, epsilon = 0.05);
}

#[test]
fn separated_pairs_release_their_contacts() {
    let config = PhysicsConfig::default().with_gravity(Vec3::ZERO);
    let mut scene = CollisionScene::new(config);
    scene.add(ball(1, Vec3::ZERO));
    scene.add(ball(2, Vec3::new(0.9, 0.0, 0.0)));
    scene.tick();
    assert!(scene.is_touching(EntityId(1), EntityId(2)));
    assert_eq!(scene.contacts_of(EntityId(1)).count(), 1);
    assert_eq!(scene.contacts_of(EntityId(2)).count(), 1);

    scene
        .object_mut(EntityId(2))
        .expect("b")
        .teleport(Vec3::new(10.0, 0.0, 0.0));
    scene.tick();
    assert!(!scene.is_touching(EntityId(1), EntityId(2)));
    assert!(scene.contacts().is_empty());
}

#[test]
fn sleeping_ball_wakes_when_hit() {
    let mut scene = CollisionScene::default();
    scene.set_static_mesh(ground(10.0));
    scene.add(ball(1, Vec3::new(0.3, 0.5, 0.2)));
    for _ in 0..60 {
        scene.tick();
    }
    assert!(scene.object(EntityId(1)).expect("resting").is_sleeping());

    scene.add(ball(2, Vec3::new(0.3, 2.0, 0.2)));
    let mut woke = false;
    for _ in 0..60 {
        scene.tick();
        if scene.is_touching(EntityId(1), EntityId(2)) {
            woke = !scene.object(EntityId(1)).expect("resting").is_sleeping();
            break;
        }
    }
    assert!(woke, "the falling ball should wake the sleeper");
}

#[test]
fn impulse_wakes_a_sleeper() {
    let mut scene = CollisionScene::default();
    scene.set_static_mesh(ground(10.0));
    scene.add(ball(1, Vec3::new(0.3, 0.5, 0.2)));
    for _ in 0..60 {
        scene.tick();
    }
    let object = scene.object_mut(EntityId(1)).expect("ball");
    assert!(object.is_sleeping());
    let center = object.center();
    object.apply_impulse(Vec3::new(0.0, 5.0, 0.0), center);
    assert!(!object.is_sleeping());

    scene.tick();
    assert!(scene.object(EntityId(1)).expect("ball").position().y > 0.6);
}

#[test]
fn triggers_report_overlap_without_response() {
    let mut scene = CollisionScene::new(PhysicsConfig::default().with_gravity(Vec3::ZERO));
    scene.add(
        PhysicsObject::builder(EntityId(1), Shape::cuboid(Vec3::ONE))
            .trigger(true)
            .fixed()
            .build(),
    );
    scene.add(
        PhysicsObject::builder(EntityId(2), Shape::sphere(0.5))
            .position(Vec3::new(-3.0, 0.0, 0.0))
            .velocity(Vec3::new(6.0, 0.0, 0.0))
            .build(),
    );

    let mut entered = false;
    for _ in 0..40 {
        scene.tick();
        entered |= scene.is_touching(EntityId(1), EntityId(2));
    }
    assert!(entered);
    assert!(scene.object(EntityId(2)).expect("ball").position().x > 2.0, "passed through");
}

#[test]
fn kinematic_mover_pushes_dynamic_ball() {
    let mut scene = CollisionScene::new(PhysicsConfig::default().with_gravity(Vec3::ZERO));
    let paddle = TransformHandle::new(Transform::from_position(Vec3::new(-1.5, 0.0, 0.0)));
    scene.add(
        PhysicsObject::builder(EntityId(1), Shape::cuboid(Vec3::splat(0.5)))
            .transform(paddle.clone())
            .kinematic()
            .build(),
    );
    scene.add(ball(2, Vec3::ZERO));

    for step in 1..=20 {
        paddle.set_position(Vec3::new(-1.5 + step as f32 * 0.05, 0.0, 0.0));
        scene.tick();
    }

    assert_eq!(scene.object(EntityId(1)).expect("paddle").position().x, -0.5);
    assert!(scene.object(EntityId(2)).expect("ball").velocity().x > 0.0);
}

#[test]
fn transform_handles_see_integrated_pose() {
    let mut scene = CollisionScene::new(PhysicsConfig::default().with_gravity(Vec3::ZERO));
    let handle = TransformHandle::default();
    scene.add(
        PhysicsObject::builder(EntityId(1), Shape::sphere(0.5))
            .transform(handle.clone())
            .velocity(Vec3::new(0.0, 0.0, 3.0))
            .build(),
    );
    for _ in 0..30 {
        scene.tick();
    }
    let pose = handle.get();
    assert!(pose.position.z > 2.5);
    assert_eq!(pose.position, scene.object(EntityId(1)).expect("ball").position());
}

#[test]
fn simulation_from_json_steps_fixed_ticks() {
    let mut sim = Simulation::from_json_str(r#"{ "time_step": 0.03125, "gravity": [0.0, 0.0, 0.0] }"#)
        .expect("valid config");
    assert!(sim.add_object(ball(1, Vec3::ZERO)));
    assert!(!sim.add_object(ball(1, Vec3::ONE)));
    assert_eq!(sim.step(0.16), 5);
    assert_eq!(sim.scene().tick_count(), 5);
    assert!(sim.remove_object(EntityId(1)).is_some());
    assert!(Simulation::new(-1.0).is_err());
}
