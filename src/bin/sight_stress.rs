//! Headless Sight Stress Runner
//!
//! Spawns a crowd of wandering entities between sphere occluders and reports
//! how the sight scheduler spends its per-tick budget.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use arc_perception::core::types::TeamId;
use arc_perception::perception::digest::DetectionByAffiliation;
use arc_perception::perception::{ListenerConfig, PerceptionEvent, SightConfig};
use arc_perception::world::{Occluder, PerceptionWorld, SandboxTester, SandboxWorld};
use arc_perception::{PerceptionConfig, PerceptionSystem};
use clap::Parser;
use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

/// Sight Stress Runner - budgeted perception over a crowd
#[derive(Parser, Debug)]
#[command(name = "sight_stress")]
#[command(about = "Run the sight scheduler over a wandering crowd and report budget usage")]
struct Args {
    /// Number of entities (all are sight sources)
    #[arg(long, default_value_t = 2000)]
    entities: u32,

    /// Every Nth entity is also a listener
    #[arg(long, default_value_t = 4)]
    listener_every: u32,

    /// Side length of the square world
    #[arg(long, default_value_t = 4000.0)]
    world_size: f32,

    /// Number of sphere occluders
    #[arg(long, default_value_t = 60)]
    occluders: u32,

    /// Ticks to simulate
    #[arg(long, default_value_t = 300)]
    ticks: u32,

    /// Simulated seconds per tick
    #[arg(long, default_value_t = 0.1)]
    dt: f32,

    /// Optional TOML file with a [scheduler] section
    #[arg(long)]
    config: Option<PathBuf>,

    /// Random seed for deterministic runs
    #[arg(long)]
    seed: Option<u64>,

    /// Output format: json or text
    #[arg(long, default_value = "text")]
    format: String,
}

/// JSON output structure
#[derive(Serialize)]
struct StressReport {
    seed: u64,
    entities: u32,
    listeners: usize,
    queries: usize,
    ticks: u32,
    total_traces: u64,
    total_processed: u64,
    total_skipped: u64,
    total_auto_successes: u64,
    ticks_out_of_time: u32,
    /// Longest run of updates any query sat unprocessed
    max_query_age: u32,
    sensed_events: u64,
    expired_events: u64,
    avg_update_us: f64,
    max_update_us: f64,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    let seed = args.seed.unwrap_or_else(rand::random);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let config = match &args.config {
        Some(path) => PerceptionConfig::load_from_toml(path).unwrap_or_else(|e| {
            eprintln!("Warning: Failed to load config '{}': {}", path.display(), e);
            eprintln!("Using default configuration");
            PerceptionConfig::default()
        }),
        None => PerceptionConfig::default(),
    };

    let mut perception = match PerceptionSystem::new(config) {
        Ok(perception) => perception,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let half = args.world_size * 0.5;
    let mut world = SandboxWorld::new();
    let mut tester = SandboxTester::with_occluders(
        (0..args.occluders)
            .map(|_| Occluder::new(random_point(&mut rng, half), rng.gen_range(20.0..120.0)))
            .collect(),
    );

    let listener_config = |team: TeamId| {
        ListenerConfig::with_sight(
            team,
            SightConfig {
                sight_radius: 600.0,
                lose_sight_radius: 700.0,
                peripheral_vision_half_angle_degrees: 70.0,
                auto_success_range_from_last_seen: Some(40.0),
                max_age: Some(8.0),
                detection: DetectionByAffiliation {
                    detect_neutrals: true,
                    ..Default::default()
                },
            },
        )
    };

    let mut handles = Vec::with_capacity(args.entities as usize);
    for id in 0..args.entities {
        let team = TeamId((id % 3) as u8);
        let handle = world.spawn(id, random_point(&mut rng, half), random_heading(&mut rng), team);
        perception.register_source(handle, false, &world);
        if args.listener_every > 0 && id % args.listener_every == 0 {
            perception.register_listener(handle, &listener_config(team), &world);
        }
        handles.push(handle);
    }

    let listener_count = perception.listeners().count();
    let query_count = perception.sight().len();
    tracing::info!(
        "Spawned {} entities, {} listeners, {} sight queries (seed {})",
        args.entities,
        listener_count,
        query_count,
        seed
    );

    let mut report = StressReport {
        seed,
        entities: args.entities,
        listeners: listener_count,
        queries: query_count,
        ticks: args.ticks,
        total_traces: 0,
        total_processed: 0,
        total_skipped: 0,
        total_auto_successes: 0,
        ticks_out_of_time: 0,
        max_query_age: 0,
        sensed_events: 0,
        expired_events: 0,
        avg_update_us: 0.0,
        max_update_us: 0.0,
    };
    let mut update_times: Vec<Duration> = Vec::with_capacity(args.ticks as usize);

    for tick in 0..args.ticks {
        for handle in &handles {
            if let Some(location) = world.location(*handle) {
                let step = Vec3::new(rng.gen_range(-4.0..4.0), rng.gen_range(-4.0..4.0), 0.0);
                let next = (location + step).clamp(Vec3::splat(-half), Vec3::splat(half));
                world.set_location(*handle, next);
                if rng.gen_bool(0.05) {
                    world.set_forward(*handle, random_heading(&mut rng));
                }
            }
        }

        let start = Instant::now();
        let outcome = perception.tick(&world, &mut tester, args.dt);
        update_times.push(start.elapsed());

        let stats = outcome.sight;
        report.total_traces += u64::from(stats.traces);
        report.total_processed += u64::from(stats.processed);
        report.total_skipped += u64::from(stats.skipped);
        report.total_auto_successes += u64::from(stats.auto_successes);
        if stats.hit_time_limit {
            report.ticks_out_of_time += 1;
        }
        report.max_query_age = perception
            .sight()
            .queries()
            .iter()
            .map(|q| q.age)
            .fold(report.max_query_age, u32::max);

        for event in &outcome.events {
            match event {
                PerceptionEvent::TargetPerceptionUpdated { stimulus, .. }
                    if stimulus.was_successfully_sensed() =>
                {
                    report.sensed_events += 1
                }
                PerceptionEvent::StimulusExpired { .. } => report.expired_events += 1,
                _ => {}
            }
        }

        if args.format == "text" && tick % 50 == 49 {
            println!(
                "Tick {:>4}: {:>8.2?} | traces {:>3} | processed {:>5} | skipped {:>6} | auto {:>4}",
                tick + 1,
                update_times[tick as usize],
                stats.traces,
                stats.processed,
                stats.skipped,
                stats.auto_successes
            );
        }
    }

    if !update_times.is_empty() {
        let total: Duration = update_times.iter().sum();
        report.avg_update_us = total.as_secs_f64() * 1e6 / update_times.len() as f64;
        report.max_update_us = update_times
            .iter()
            .map(|d| d.as_secs_f64() * 1e6)
            .fold(0.0, f64::max);
    }

    if args.format == "json" {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Failed to serialize report: {}", e),
        }
    } else {
        println!("\n=== Sight Stress Summary (seed {}) ===", report.seed);
        println!("Entities:        {}", report.entities);
        println!("Listeners:       {}", report.listeners);
        println!("Queries:         {}", report.queries);
        println!("Traces:          {}", report.total_traces);
        println!("Processed:       {}", report.total_processed);
        println!("Skipped (aged):  {}", report.total_skipped);
        println!("Auto-successes:  {}", report.total_auto_successes);
        println!("Out of time:     {} / {} ticks", report.ticks_out_of_time, report.ticks);
        println!("Max query age:   {}", report.max_query_age);
        println!("Sensed events:   {}", report.sensed_events);
        println!("Expired events:  {}", report.expired_events);
        println!("Avg update:      {:.1} us", report.avg_update_us);
        println!("Max update:      {:.1} us", report.max_update_us);
    }
}

fn random_point(rng: &mut ChaCha8Rng, half: f32) -> Vec3 {
    Vec3::new(rng.gen_range(-half..half), rng.gen_range(-half..half), 0.0)
}

fn random_heading(rng: &mut ChaCha8Rng) -> Vec3 {
    let angle: f32 = rng.gen_range(0.0..std::f32::consts::TAU);
    Vec3::new(angle.cos(), angle.sin(), 0.0)
}
