//! Integration tests for the sight scheduler driven through PerceptionSystem

use std::collections::HashSet;

use arc_perception::core::types::{EntityHandle, StableId, TeamId};
use arc_perception::perception::digest::DetectionByAffiliation;
use arc_perception::perception::{ListenerConfig, PerceptionEvent, SenseKind, SightConfig};
use arc_perception::world::{Occluder, SandboxTester, SandboxWorld, VisibilityOutcome, VisibilityTester};
use arc_perception::{PerceptionConfig, PerceptionSystem};
use glam::Vec3;
use proptest::prelude::*;

fn sight(radius: f32, lose: f32) -> SightConfig {
    SightConfig {
        sight_radius: radius,
        lose_sight_radius: lose,
        peripheral_vision_half_angle_degrees: 180.0,
        max_age: Some(5.0),
        detection: DetectionByAffiliation::all(),
        ..Default::default()
    }
}

fn listener_config(sight: SightConfig) -> ListenerConfig {
    ListenerConfig::with_sight(TeamId(1), sight)
}

fn config_with_budget(max_traces: u32) -> PerceptionConfig {
    let mut config = PerceptionConfig::default();
    config.scheduler.max_traces_per_tick = max_traces;
    config.scheduler.high_importance_distance = 10_000.0;
    config
}

fn sees(perception: &PerceptionSystem, listener: EntityHandle, target: EntityHandle) -> bool {
    perception
        .history(listener.id)
        .map_or(false, |h| h.has_active_stimulus(target.id, SenseKind::Sight))
}

fn lost_events(events: &[PerceptionEvent]) -> usize {
    events
        .iter()
        .filter(|e| {
            matches!(e, PerceptionEvent::TargetPerceptionUpdated { stimulus, .. }
                if !stimulus.was_successfully_sensed())
        })
        .count()
}

/// Records which visibility entry point was used
#[derive(Default)]
struct RecordingTester {
    line_of_sight_calls: usize,
    can_be_seen_from_calls: usize,
}

impl VisibilityTester for RecordingTester {
    fn line_of_sight(&mut self, _from: Vec3, to: Vec3, _ignore: Option<EntityHandle>) -> VisibilityOutcome {
        self.line_of_sight_calls += 1;
        VisibilityOutcome::seen(to)
    }

    fn can_be_seen_from(
        &mut self,
        _observer: Vec3,
        _target: EntityHandle,
        target_location: Vec3,
        _ignore: Option<EntityHandle>,
    ) -> VisibilityOutcome {
        self.can_be_seen_from_calls += 1;
        VisibilityOutcome {
            strength: 0.5,
            traces: 3,
            ..VisibilityOutcome::seen(target_location)
        }
    }
}

#[test]
fn test_every_query_serviced_within_starvation_bound() {
    const TARGETS: u32 = 20;
    const BUDGET: u32 = 3;

    let mut world = SandboxWorld::new();
    let mut tester = SandboxTester::new();
    let mut perception = PerceptionSystem::new(config_with_budget(BUDGET)).unwrap();

    let l = world.spawn(1, Vec3::ZERO, Vec3::X, TeamId(1));
    perception.register_listener(l, &listener_config(sight(1000.0, 1000.0)), &world);
    for i in 0..TARGETS {
        let t = world.spawn(100 + i, Vec3::new(5.0 + i as f32, 0.0, 0.0), Vec3::X, TeamId(2));
        perception.register_source(t, false, &world);
    }
    assert_eq!(perception.sight().len(), TARGETS as usize);

    let bound = (TARGETS + BUDGET - 1) / BUDGET + 1;
    let mut serviced = HashSet::new();
    for _ in 0..bound {
        let outcome = perception.tick(&world, &mut tester, 0.0);
        assert!(outcome.sight.traces <= BUDGET);
        for query in perception.sight().queries() {
            if query.age == 0 {
                serviced.insert(query.target);
            }
        }
    }

    assert_eq!(serviced.len(), TARGETS as usize);
    assert!(perception.sight().queries().iter().all(|q| q.last_result));
}

#[test]
fn test_boundary_target_does_not_flicker() {
    let mut world = SandboxWorld::new();
    let mut tester = SandboxTester::new();
    let mut perception = PerceptionSystem::new(PerceptionConfig::default()).unwrap();

    let l = world.spawn(1, Vec3::ZERO, Vec3::X, TeamId(1));
    let t = world.spawn(2, Vec3::new(10.0, 0.0, 0.0), Vec3::X, TeamId(2));
    perception.register_listener(l, &listener_config(sight(10.0, 10.0)), &world);
    perception.register_source(t, false, &world);

    for _ in 0..10 {
        let outcome = perception.tick(&world, &mut tester, 0.0);
        assert_eq!(lost_events(&outcome.events), 0);
        assert!(sees(&perception, l, t));
    }
}

#[test]
fn test_lose_sight_radius_keeps_target_visible() {
    let mut world = SandboxWorld::new();
    let mut tester = SandboxTester::new();
    let mut perception = PerceptionSystem::new(PerceptionConfig::default()).unwrap();

    let l = world.spawn(1, Vec3::ZERO, Vec3::X, TeamId(1));
    let t = world.spawn(2, Vec3::new(8.0, 0.0, 0.0), Vec3::X, TeamId(2));
    perception.register_listener(l, &listener_config(sight(10.0, 15.0)), &world);
    perception.register_source(t, false, &world);

    perception.tick(&world, &mut tester, 0.0);
    assert!(sees(&perception, l, t));

    // Between the two radii: stays visible once seen
    world.set_location(t, Vec3::new(12.0, 0.0, 0.0));
    for _ in 0..5 {
        perception.tick(&world, &mut tester, 0.0);
        assert!(sees(&perception, l, t));
    }

    // Beyond the lose-sight radius
    world.set_location(t, Vec3::new(16.0, 0.0, 0.0));
    let outcome = perception.tick(&world, &mut tester, 0.0);
    assert_eq!(lost_events(&outcome.events), 1);
    assert!(!sees(&perception, l, t));

    // Back between the radii: not seen again until inside the sight radius
    world.set_location(t, Vec3::new(12.0, 0.0, 0.0));
    for _ in 0..5 {
        let outcome = perception.tick(&world, &mut tester, 0.0);
        assert_eq!(lost_events(&outcome.events), 0);
        assert!(!sees(&perception, l, t));
    }
}

#[test]
fn test_auto_success_never_invokes_tester() {
    let mut world = SandboxWorld::new();
    let mut tester = SandboxTester::new();
    let mut perception = PerceptionSystem::new(PerceptionConfig::default()).unwrap();

    let l = world.spawn(1, Vec3::ZERO, Vec3::X, TeamId(1));
    let t = world.spawn(2, Vec3::new(20.0, 0.0, 0.0), Vec3::X, TeamId(2));
    let config = listener_config(SightConfig {
        auto_success_range_from_last_seen: Some(5.0),
        ..sight(100.0, 100.0)
    });
    perception.register_listener(l, &config, &world);
    perception.register_source(t, false, &world);

    perception.tick(&world, &mut tester, 0.0);
    assert_eq!(tester.calls, 1);

    // Wall between them now, but the target stays near where it was seen
    tester.occluders.push(Occluder::new(Vec3::new(10.0, 0.0, 0.0), 3.0));
    world.set_location(t, Vec3::new(22.0, 1.0, 0.0));
    for _ in 0..5 {
        let outcome = perception.tick(&world, &mut tester, 0.0);
        assert_eq!(outcome.sight.auto_successes, 1);
        assert_eq!(outcome.sight.traces, 0);
    }

    assert_eq!(tester.calls, 1);
    assert!(perception.sight().query(l.id, t.id).unwrap().last_result);
    assert!(sees(&perception, l, t));
}

#[test]
fn test_can_be_seen_from_targets_use_their_own_test() {
    let mut world = SandboxWorld::new();
    let mut tester = RecordingTester::default();
    let mut perception = PerceptionSystem::new(config_with_budget(6)).unwrap();

    let l = world.spawn(1, Vec3::ZERO, Vec3::X, TeamId(1));
    let custom = world.spawn(2, Vec3::new(5.0, 0.0, 0.0), Vec3::X, TeamId(2));
    let plain = world.spawn(3, Vec3::new(6.0, 0.0, 0.0), Vec3::X, TeamId(2));
    perception.register_listener(l, &listener_config(sight(100.0, 100.0)), &world);
    perception.register_source(custom, true, &world);
    perception.register_source(plain, false, &world);

    let outcome = perception.tick(&world, &mut tester, 0.0);
    assert_eq!(tester.can_be_seen_from_calls, 1);
    assert_eq!(tester.line_of_sight_calls, 1);
    assert_eq!(outcome.sight.traces, 4);

    let entity = perception.entity_info(l.id, custom.id).unwrap();
    assert_eq!(entity.stimulus(SenseKind::Sight).unwrap().strength, 0.5);
}

#[test]
fn test_reconfigure_unchanged_keeps_visible() {
    let mut world = SandboxWorld::new();
    let mut tester = SandboxTester::new();
    let mut perception = PerceptionSystem::new(PerceptionConfig::default()).unwrap();

    let l = world.spawn(1, Vec3::ZERO, Vec3::X, TeamId(1));
    let t = world.spawn(2, Vec3::new(5.0, 0.0, 0.0), Vec3::X, TeamId(2));
    let config = listener_config(sight(100.0, 100.0));
    perception.register_listener(l, &config, &world);
    perception.register_source(t, false, &world);
    perception.tick(&world, &mut tester, 0.0);
    assert!(perception.sight().query(l.id, t.id).unwrap().last_result);

    perception.register_listener(l, &config, &world);
    assert_eq!(perception.sight().len(), 1);
    assert!(perception.sight().query(l.id, t.id).unwrap().last_result);

    let outcome = perception.tick(&world, &mut tester, 0.0);
    assert_eq!(lost_events(&outcome.events), 0);
    assert!(sees(&perception, l, t));
}

#[test]
fn test_dead_target_removed_in_update() {
    let mut world = SandboxWorld::new();
    let mut tester = SandboxTester::new();
    let mut perception = PerceptionSystem::new(PerceptionConfig::default()).unwrap();

    let l = world.spawn(1, Vec3::ZERO, Vec3::X, TeamId(1));
    let t = world.spawn(2, Vec3::new(5.0, 0.0, 0.0), Vec3::X, TeamId(2));
    perception.register_listener(l, &listener_config(sight(100.0, 100.0)), &world);
    perception.register_source(t, false, &world);
    perception.tick(&world, &mut tester, 0.0);
    assert!(sees(&perception, l, t));

    world.despawn(t);
    let outcome = perception.tick(&world, &mut tester, 0.0);

    assert_eq!(outcome.sight.removed, 1);
    assert_eq!(lost_events(&outcome.events), 1);
    assert!(perception.target(t.id).is_none());
    assert!(perception.sight().is_empty());
    assert!(!sees(&perception, l, t));
}

#[test]
fn test_cleanse_removes_dead_sources_outside_budget() {
    let mut world = SandboxWorld::new();
    let mut tester = SandboxTester::new();
    let mut perception = PerceptionSystem::new(config_with_budget(1)).unwrap();

    let l = world.spawn(1, Vec3::ZERO, Vec3::X, TeamId(1));
    perception.register_listener(l, &listener_config(sight(100.0, 100.0)), &world);
    let mut targets = Vec::new();
    for i in 0..5 {
        let t = world.spawn(10 + i, Vec3::new(5.0 + i as f32, 0.0, 0.0), Vec3::X, TeamId(2));
        perception.register_source(t, false, &world);
        targets.push(t);
    }
    perception.tick(&world, &mut tester, 0.0);

    world.despawn(targets[2]);
    world.despawn(targets[4]);
    assert_eq!(perception.cleanse_invalid_sources(&world), 2);
    assert_eq!(perception.target_count(), 3);
    assert!(perception
        .sight()
        .queries()
        .iter()
        .all(|q| q.target != targets[2].id && q.target != targets[4].id));
}

#[test]
fn test_recycled_source_id_replaces_memory() {
    let mut world = SandboxWorld::new();
    let mut tester = SandboxTester::new();
    let mut perception = PerceptionSystem::new(PerceptionConfig::default()).unwrap();

    let l = world.spawn(1, Vec3::ZERO, Vec3::X, TeamId(1));
    let old = world.spawn(2, Vec3::new(5.0, 0.0, 0.0), Vec3::X, TeamId(2));
    perception.register_listener(l, &listener_config(sight(100.0, 100.0)), &world);
    perception.register_source(old, false, &world);
    perception.tick(&world, &mut tester, 0.0);

    world.despawn(old);
    let new = world.spawn(2, Vec3::new(7.0, 0.0, 0.0), Vec3::X, TeamId(2));
    assert_ne!(old, new);
    assert!(perception.register_source(new, false, &world));
    assert_eq!(perception.sight().len(), 1);

    perception.tick(&world, &mut tester, 0.0);
    let entity = perception.entity_info(l.id, StableId(2)).unwrap();
    assert_eq!(entity.handle, new);
    assert!(entity.has_active_stimulus(SenseKind::Sight));
}

#[test]
fn test_recycled_listener_id_starts_fresh() {
    let mut world = SandboxWorld::new();
    let mut tester = SandboxTester::new();
    let mut perception = PerceptionSystem::new(PerceptionConfig::default()).unwrap();

    let old = world.spawn(1, Vec3::ZERO, Vec3::X, TeamId(1));
    let t = world.spawn(2, Vec3::new(5.0, 0.0, 0.0), Vec3::X, TeamId(2));
    perception.register_listener(old, &listener_config(sight(100.0, 100.0)), &world);
    perception.register_source(t, false, &world);
    perception.tick(&world, &mut tester, 0.0);
    assert!(sees(&perception, old, t));

    world.despawn(old);
    let new = world.spawn(1, Vec3::new(500.0, 0.0, 0.0), Vec3::X, TeamId(1));
    perception.register_listener(new, &listener_config(sight(10.0, 10.0)), &world);

    assert_eq!(perception.listener(StableId(1)).unwrap().handle, new);
    assert!(perception.history(new.id).unwrap().is_empty());
    assert!(!perception.sight().query(new.id, t.id).unwrap().last_result);
}

#[test]
fn test_friendlies_filtered_by_default_detection() {
    let mut world = SandboxWorld::new();
    let mut tester = SandboxTester::new();
    let mut perception = PerceptionSystem::new(PerceptionConfig::default()).unwrap();

    let l = world.spawn(1, Vec3::ZERO, Vec3::X, TeamId(1));
    let friend = world.spawn(2, Vec3::new(5.0, 0.0, 0.0), Vec3::X, TeamId(1));
    let enemy = world.spawn(3, Vec3::new(6.0, 0.0, 0.0), Vec3::X, TeamId(2));
    let config = listener_config(SightConfig {
        detection: DetectionByAffiliation::default(),
        ..sight(100.0, 100.0)
    });
    perception.register_listener(l, &config, &world);
    perception.register_source(friend, false, &world);
    perception.register_source(enemy, false, &world);

    assert_eq!(perception.sight().len(), 1);
    perception.tick(&world, &mut tester, 0.0);
    assert_eq!(perception.history(l.id).unwrap().hostile_entities(), vec![enemy]);
}

const ENTITIES: u32 = 6;

#[derive(Debug, Clone)]
enum Op {
    AddListener(u32),
    RemoveListener(u32),
    AddSource(u32),
    RemoveSource(u32),
    Tick,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..ENTITIES).prop_map(Op::AddListener),
        (0..ENTITIES).prop_map(Op::RemoveListener),
        (0..ENTITIES).prop_map(Op::AddSource),
        (0..ENTITIES).prop_map(Op::RemoveSource),
        Just(Op::Tick),
    ]
}

proptest! {
    #[test]
    fn prop_queries_match_registrations(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let mut world = SandboxWorld::new();
        let mut tester = SandboxTester::new();
        let mut perception = PerceptionSystem::new(config_with_budget(2)).unwrap();

        let handles: Vec<EntityHandle> = (0..ENTITIES)
            .map(|i| {
                let team = TeamId((i % 2) as u8);
                world.spawn(i, Vec3::new(i as f32 * 3.0, 0.0, 0.0), Vec3::X, team)
            })
            .collect();
        let config = listener_config(sight(100.0, 100.0));

        for op in ops {
            match op {
                Op::AddListener(i) => perception.register_listener(handles[i as usize], &config, &world),
                Op::RemoveListener(i) => {
                    perception.unregister_listener(handles[i as usize], &world);
                }
                Op::AddSource(i) => {
                    perception.register_source(handles[i as usize], false, &world);
                }
                Op::RemoveSource(i) => {
                    perception.unregister_source(handles[i as usize], &world);
                }
                Op::Tick => {
                    perception.tick(&world, &mut tester, 0.1);
                }
            }

            let mut pairs = HashSet::new();
            for query in perception.sight().queries() {
                prop_assert!(pairs.insert((query.observer, query.target)), "duplicate query");
                prop_assert!(perception.listener(query.observer).is_some(), "dangling observer");
                prop_assert!(perception.target(query.target).is_some(), "dangling target");
            }

            let expected = perception
                .listeners()
                .map(|l| {
                    handles
                        .iter()
                        .filter(|h| h.id != l.id && perception.target(h.id).is_some())
                        .count()
                })
                .sum::<usize>();
            prop_assert_eq!(pairs.len(), expected);
        }
    }
}
