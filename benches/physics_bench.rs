use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use tiny_collide::{
    collision::{
        bvh::AabbTree,
        epa::epa_solve,
        gjk::{gjk_check_for_overlap, Simplex},
        shapes::PlacedShape,
    },
    core::aabb::Aabb,
    CollisionScene, EntityId, MeshCollider, PhysicsObject, Quat, Shape, Vec3,
};

fn lattice(count: usize) -> impl Iterator<Item = Vec3> {
    let side = (count as f32).cbrt().ceil() as usize;
    (0..count).map(move |i| {
        let (x, y, z) = (i % side, (i / side) % side, i / (side * side));
        Vec3::new(x as f32 * 1.1, y as f32 * 1.1 + 1.0, z as f32 * 1.1)
    })
}

fn floor(size: f32) -> MeshCollider {
    MeshCollider::from_triangles(
        vec![
            Vec3::new(-size, 0.0, -size),
            Vec3::new(size, 0.0, -size),
            Vec3::new(size, 0.0, size),
            Vec3::new(-size, 0.0, size),
        ],
        vec![[0, 2, 1], [0, 3, 2]],
    )
    .expect("valid floor")
}

fn prepare_scene(count: usize) -> CollisionScene {
    let mut scene = CollisionScene::default();
    scene.set_static_mesh(floor(100.0));
    for (i, position) in lattice(count).enumerate() {
        let shape = if i % 2 == 0 {
            Shape::sphere(0.5)
        } else {
            Shape::cuboid(Vec3::splat(0.45))
        };
        scene.add(
            PhysicsObject::builder(EntityId(i as u16 + 1), shape)
                .position(position)
                .build(),
        );
    }
    scene
}

fn bench_scene_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("scene_tick");
    for &count in &[64usize, 256, 1024] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let mut scene = prepare_scene(count);
            b.iter(|| {
                scene.tick();
                black_box(scene.contacts().len())
            })
        });
    }
    group.finish();
}

fn bench_tree_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("aabb_tree");
    for &count in &[256usize, 4096] {
        let mut tree = AabbTree::<u32>::new();
        for (i, position) in lattice(count).enumerate() {
            tree.create_node(Aabb::from_center_half_extents(position, Vec3::splat(0.5)), i as u32);
        }
        let probes: Vec<Aabb> = lattice(count)
            .step_by(7)
            .map(|p| Aabb::from_center_half_extents(p, Vec3::splat(0.6)))
            .collect();

        group.bench_with_input(BenchmarkId::new("query_bounds", count), &probes, |b, probes| {
            let mut results = [0u32; 32];
            b.iter(|| {
                let mut total = 0;
                for probe in probes {
                    total += tree.query_bounds(black_box(probe), &mut results);
                }
                total
            })
        });
    }
    group.finish();
}

fn bench_gjk_epa(c: &mut Criterion) {
    let mut group = c.benchmark_group("narrow_phase");
    let pairs: Vec<(PlacedShape, PlacedShape)> = (0..256)
        .map(|i| {
            let angle = i as f32 * 0.1;
            let a = PlacedShape::new(Shape::cuboid(Vec3::splat(0.5)), Vec3::ZERO, Quat::from_rotation_y(angle));
            let b = PlacedShape::new(
                Shape::capsule(0.3, 0.4),
                Vec3::new(0.7, 0.1 * (i % 5) as f32, 0.0),
                Quat::from_rotation_z(angle),
            );
            (a, b)
        })
        .collect();

    group.bench_function("gjk_overlap", |b| {
        let mut simplex = Simplex::new();
        b.iter(|| {
            pairs
                .iter()
                .filter(|(a, s)| gjk_check_for_overlap(a, s, s.position - a.position, &mut simplex))
                .count()
        })
    });

    group.bench_function("gjk_epa", |b| {
        let mut simplex = Simplex::new();
        b.iter(|| {
            let mut depth = 0.0;
            for (a, s) in &pairs {
                if gjk_check_for_overlap(a, s, s.position - a.position, &mut simplex) {
                    if let Some(result) = epa_solve(&simplex, a, s) {
                        depth += result.penetration;
                    }
                }
            }
            black_box(depth)
        })
    });
    group.finish();
}

criterion_group!(benches, bench_scene_tick, bench_tree_query, bench_gjk_epa);
criterion_main!(benches);
