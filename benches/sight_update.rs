//! Criterion benchmarks for the sight scheduler
//!
//! Covers one budgeted update over crowds of increasing size and the cost of
//! registering a listener against an existing crowd.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use arc_perception::core::types::TeamId;
use arc_perception::perception::digest::DetectionByAffiliation;
use arc_perception::perception::{ListenerConfig, SightConfig};
use arc_perception::world::{Occluder, SandboxTester, SandboxWorld};
use arc_perception::{PerceptionConfig, PerceptionSystem};
use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn listener_config(team: TeamId) -> ListenerConfig {
    ListenerConfig::with_sight(
        team,
        SightConfig {
            sight_radius: 500.0,
            lose_sight_radius: 600.0,
            peripheral_vision_half_angle_degrees: 80.0,
            max_age: Some(5.0),
            detection: DetectionByAffiliation::all(),
            ..Default::default()
        },
    )
}

/// A crowd where every entity is a source and every fourth one a listener
fn crowd(entities: u32, seed: u64) -> (SandboxWorld, SandboxTester, PerceptionSystem) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut world = SandboxWorld::new();
    let tester = SandboxTester::with_occluders(
        (0..32)
            .map(|_| {
                let center = Vec3::new(rng.gen_range(-1500.0..1500.0), rng.gen_range(-1500.0..1500.0), 0.0);
                Occluder::new(center, rng.gen_range(20.0..80.0))
            })
            .collect(),
    );
    let mut perception = PerceptionSystem::new(PerceptionConfig::default()).unwrap();

    for id in 0..entities {
        let location = Vec3::new(rng.gen_range(-1500.0..1500.0), rng.gen_range(-1500.0..1500.0), 0.0);
        let angle: f32 = rng.gen_range(0.0..std::f32::consts::TAU);
        let team = TeamId((id % 2) as u8);
        let handle = world.spawn(id, location, Vec3::new(angle.cos(), angle.sin(), 0.0), team);
        perception.register_source(handle, false, &world);
        if id % 4 == 0 {
            perception.register_listener(handle, &listener_config(team), &world);
        }
    }

    (world, tester, perception)
}

fn bench_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("sight_update");

    for entities in [100u32, 400, 1600] {
        let (world, mut tester, mut perception) = crowd(entities, 42);
        group.bench_with_input(BenchmarkId::from_parameter(entities), &entities, |b, _| {
            b.iter(|| black_box(perception.update_sight(&world, &mut tester)));
        });
    }

    group.finish();
}

fn bench_full_tick(c: &mut Criterion) {
    let (world, mut tester, mut perception) = crowd(400, 7);
    c.bench_function("perception_tick_400", |b| {
        b.iter(|| black_box(perception.tick(&world, &mut tester, 0.1)));
    });
}

fn bench_register_listener(c: &mut Criterion) {
    let (mut world, _tester, mut perception) = crowd(1600, 9);
    let handle = world.spawn(10_000, Vec3::ZERO, Vec3::X, TeamId(0));
    let config = listener_config(TeamId(0));

    c.bench_function("register_listener_1600_sources", |b| {
        b.iter(|| {
            perception.register_listener(handle, &config, &world);
            perception.unregister_listener(handle, &world);
        });
    });
}

criterion_group!(benches, bench_update, bench_full_tick, bench_register_listener);
criterion_main!(benches);
