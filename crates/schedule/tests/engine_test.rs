//! End-to-end tests: plans built from declarations, replayed through the engine.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tickwork_core::{
    ExecutionMode, FrameContext, ResourceRegistry, SchedulerConfig, Stage, SystemDescriptor,
};
use tickwork_jobs::JobQueue;
use tickwork_schedule::{BuildError, Engine, EngineError};

type Trace = Arc<Mutex<Vec<&'static str>>>;

struct Transform;
struct Physics;
struct World;

fn config() -> SchedulerConfig {
    SchedulerConfig {
        worker_threads: 3,
        queue_capacity: 64,
        idle_wait_ms: 5,
        ..SchedulerConfig::default()
    }
}

fn recorder(name: &'static str, stage: Stage, trace: &Trace) -> SystemDescriptor {
    let trace = Arc::clone(trace);
    SystemDescriptor::new(name, stage, move |_: &FrameContext| {
        trace.lock().unwrap().push(name);
    })
}

#[test]
fn dependency_chain_holds_for_every_frame() {
    let trace = Trace::default();
    // Registered back to front; the declarations alone must restore the order.
    let systems = vec![
        recorder("three", Stage::Update, &trace)
            .with_access(|a| {
                a.reads::<Physics>();
            })
            .into_system(),
        recorder("two", Stage::Update, &trace)
            .with_access(|a| {
                a.reads::<Transform>();
                a.writes::<Physics>();
            })
            .into_system(),
        recorder("one", Stage::Update, &trace)
            .with_access(|a| {
                a.writes::<Transform>();
            })
            .into_system(),
    ];
    let mut engine = Engine::build(config(), systems).unwrap();

    for frame in 0..1000 {
        engine.frame();
        let mut seen = trace.lock().unwrap();
        assert_eq!(*seen, ["one", "two", "three"], "frame {frame}");
        seen.clear();
    }
    assert_eq!(engine.frame_count(), 1000);
    engine.shutdown();
}

#[test]
fn writers_of_one_resource_never_overlap() {
    let active = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));
    let runs = Arc::new(AtomicUsize::new(0));

    let systems = (0..6)
        .map(|i| {
            let (active, overlaps, runs) = (active.clone(), overlaps.clone(), runs.clone());
            SystemDescriptor::new(format!("writer-{i}"), Stage::Update, move |_: &FrameContext| {
                if active.fetch_add(1, Ordering::SeqCst) != 0 {
                    overlaps.fetch_add(1, Ordering::SeqCst);
                }
                thread::sleep(Duration::from_micros(200));
                active.fetch_sub(1, Ordering::SeqCst);
                runs.fetch_add(1, Ordering::SeqCst);
            })
            .with_access(|a| {
                a.writes::<World>();
            })
            .into_system()
        })
        .collect();
    let mut engine = Engine::build(config(), systems).unwrap();

    for _ in 0..20 {
        engine.frame();
    }
    assert_eq!(runs.load(Ordering::SeqCst), 120);
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    engine.shutdown();
}

#[test]
fn stages_complete_before_the_next_begins() {
    let trace = Trace::default();
    let systems = vec![
        recorder("read", Stage::Update, &trace)
            .with_access(|a| {
                a.reads::<Transform>();
            })
            .into_system(),
        recorder("write", Stage::PreUpdate, &trace)
            .with_access(|a| {
                a.writes::<Transform>();
            })
            .into_system(),
    ];
    let mut engine = Engine::build(config(), systems).unwrap();
    assert!(engine.plan().edges(Stage::PreUpdate).is_empty());
    assert!(engine.plan().edges(Stage::Update).is_empty());

    for _ in 0..50 {
        engine.frame();
        let mut seen = trace.lock().unwrap();
        assert_eq!(*seen, ["write", "read"]);
        seen.clear();
    }
    engine.shutdown();
}

#[test]
fn bootstrap_runs_forward_and_teardown_in_reverse() {
    let trace = Trace::default();
    let systems = vec![
        recorder("open-a", Stage::Startup, &trace).into_system(),
        recorder("close-a", Stage::EndOfLife, &trace).into_system(),
        recorder("open-b", Stage::Startup, &trace).into_system(),
        recorder("close-b", Stage::EndOfLife, &trace).into_system(),
        recorder("init", Stage::Init, &trace).into_system(),
        recorder("open-c", Stage::Startup, &trace).into_system(),
        recorder("close-c", Stage::EndOfLife, &trace).into_system(),
        recorder("teardown", Stage::Shutdown, &trace).into_system(),
    ];
    let mut engine = Engine::build(config(), systems).unwrap();

    engine.startup();
    engine.shutdown();

    assert_eq!(
        *trace.lock().unwrap(),
        [
            "open-a", "open-b", "open-c", "init", "teardown", "close-c", "close-b", "close-a"
        ]
    );
}

#[test]
fn inline_systems_run_on_the_calling_thread() {
    let caller = thread::current().id();
    let inline_thread = Arc::new(Mutex::new(None));
    let job_thread = Arc::new(Mutex::new(None));

    let systems = vec![
        {
            let inline_thread = inline_thread.clone();
            SystemDescriptor::new("inline", Stage::Update, move |_: &FrameContext| {
                *inline_thread.lock().unwrap() = Some(thread::current().id());
            })
            .with_mode(ExecutionMode::Inline)
            .into_system()
        },
        {
            let job_thread = job_thread.clone();
            SystemDescriptor::new("pooled", Stage::Update, move |_: &FrameContext| {
                *job_thread.lock().unwrap() = thread::current().name().map(str::to_string);
            })
            .into_system()
        },
    ];
    let mut engine = Engine::build(config(), systems).unwrap();
    engine.frame();

    assert_eq!(*inline_thread.lock().unwrap(), Some(caller));
    let worker = job_thread.lock().unwrap().clone().unwrap();
    assert!(worker.starts_with("tickwork-worker-"), "ran on {worker}");
    engine.shutdown();
}

#[test]
fn cyclic_declarations_still_run_each_system_once() {
    let counts: Arc<Vec<AtomicUsize>> = Arc::new((0..3).map(|_| AtomicUsize::new(0)).collect());
    // a waits on b, b waits on c, c waits on a.
    let decls: [(&'static str, &'static str, &'static str); 3] = [
        ("a", "out-a", "out-b"),
        ("b", "out-b", "out-c"),
        ("c", "out-c", "out-a"),
    ];
    let systems = decls
        .iter()
        .enumerate()
        .map(|(i, &(name, writes, reads))| {
            let counts = counts.clone();
            SystemDescriptor::new(name, Stage::Update, move |_: &FrameContext| {
                counts[i].fetch_add(1, Ordering::SeqCst);
            })
            .with_access(move |a| {
                a.writes_named(writes);
                a.reads_named(reads);
            })
            .into_system()
        })
        .collect();
    let mut engine = Engine::build(config(), systems).unwrap();
    assert!(!engine.plan().dropped_edges().is_empty());

    engine.frame();
    for count in counts.iter() {
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
    engine.shutdown();
}

#[test]
fn overflowing_declaration_fails_engine_build() {
    let systems = vec![SystemDescriptor::new("greedy", Stage::Update, |_: &FrameContext| {})
        .with_access(|a| {
            a.reads::<Transform>();
            a.reads::<Physics>();
        })
        .into_system()];
    let config = SchedulerConfig {
        max_resources_per_system: 1,
        ..config()
    };

    let err = Engine::build(config, systems).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Build(BuildError::TooManyResources(_))
    ));
}

#[test]
fn systems_see_frame_number_and_shared_resources() {
    let registry = Arc::new(ResourceRegistry::new());
    registry.insert(Mutex::new(0u64));
    let frames = Arc::new(Mutex::new(Vec::new()));

    let systems = vec![{
        let frames = frames.clone();
        SystemDescriptor::new("tick", Stage::Update, move |ctx: &FrameContext| {
            frames.lock().unwrap().push(ctx.frame());
            let total = ctx.resource::<Mutex<u64>>().unwrap();
            *total.lock().unwrap() += 1;
        })
        .with_access(|a| {
            a.writes::<Mutex<u64>>();
        })
        .into_system()
    }];
    let mut engine = Engine::with_resources(config(), registry.clone(), systems).unwrap();
    for _ in 0..3 {
        engine.frame();
    }

    assert_eq!(*frames.lock().unwrap(), [0, 1, 2]);
    let total = registry.get::<Mutex<u64>>().unwrap();
    assert_eq!(*total.lock().unwrap(), 3);
    engine.shutdown();
}

#[test]
fn systems_can_fan_out_ad_hoc_jobs() {
    let hits = Arc::new(AtomicUsize::new(0));
    let systems = vec![{
        let hits = hits.clone();
        SystemDescriptor::new("fan-out", Stage::Update, move |ctx: &FrameContext| {
            let jobs = ctx.resource::<Arc<JobQueue>>().unwrap();
            for _ in 0..4 {
                loop {
                    let hits = hits.clone();
                    let handle = jobs.spawn(
                        move || {
                            hits.fetch_add(1, Ordering::SeqCst);
                        },
                        true,
                    );
                    if handle.is_valid() {
                        break;
                    }
                    thread::yield_now();
                }
            }
        })
        .into_system()
    }];
    let mut engine = Engine::build(config(), systems).unwrap();
    engine.resources().insert(Arc::clone(engine.jobs()));

    for _ in 0..5 {
        engine.frame();
    }
    let deadline = Instant::now() + Duration::from_secs(10);
    while hits.load(Ordering::SeqCst) < 20 {
        assert!(Instant::now() < deadline, "ad-hoc jobs did not finish");
        thread::yield_now();
    }
    engine.shutdown();
}

#[test]
fn small_queue_still_runs_every_system() {
    let runs = Arc::new(AtomicUsize::new(0));
    let systems = (0..8)
        .map(|i| {
            let runs = runs.clone();
            SystemDescriptor::new(format!("independent-{i}"), Stage::Update, move |_: &FrameContext| {
                thread::sleep(Duration::from_micros(100));
                runs.fetch_add(1, Ordering::SeqCst);
            })
            .into_system()
        })
        .collect();
    let config = SchedulerConfig {
        worker_threads: 2,
        queue_capacity: 2,
        ..config()
    };
    let mut engine = Engine::build(config, systems).unwrap();

    for _ in 0..10 {
        engine.frame();
    }
    assert_eq!(runs.load(Ordering::SeqCst), 80);
    engine.shutdown();
}

#[test]
fn metrics_track_frames_stages_and_jobs() {
    let systems = vec![
        SystemDescriptor::new("pooled", Stage::Update, |_: &FrameContext| {}).into_system(),
        SystemDescriptor::new("inline", Stage::Last, |_: &FrameContext| {})
            .with_mode(ExecutionMode::InlineChecked)
            .into_system(),
    ];
    let mut engine = Engine::build(config(), systems).unwrap();
    engine.startup();
    for _ in 0..3 {
        engine.frame();
    }

    let metrics = engine.metrics();
    assert_eq!(metrics.frames_run, 3);
    assert_eq!(metrics.systems, 2);
    assert_eq!(metrics.stage_runs[&Stage::Update], 3);
    assert_eq!(metrics.stage_runs[&Stage::Startup], 1);
    assert!(!metrics.stage_runs.contains_key(&Stage::Shutdown));
    assert!(metrics.last_frame_at.is_some());
    // Only the pooled system goes through the queue.
    assert_eq!(metrics.queue.executed, 3);
    assert_eq!(metrics.queue.in_flight, 0);
    engine.shutdown();
}

#[cfg(debug_assertions)]
#[test]
fn panicking_system_does_not_stall_the_frame() {
    let trace = Trace::default();
    let systems = vec![
        SystemDescriptor::new("boom", Stage::Update, |_: &FrameContext| panic!("system failed"))
            .with_access(|a| {
                a.writes::<World>();
            })
            .into_system(),
        recorder("after", Stage::Update, &trace)
            .with_access(|a| {
                a.reads::<World>();
            })
            .into_system(),
    ];
    let mut engine = Engine::build(config(), systems).unwrap();

    engine.frame();
    engine.frame();
    assert_eq!(*trace.lock().unwrap(), ["after", "after"]);
    assert_eq!(engine.metrics().queue.faulted, 2);
    engine.shutdown();
}

#[test]
fn frame_after_shutdown_is_a_no_op() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counted = runs.clone();
    let systems = vec![SystemDescriptor::new("pooled", Stage::Update, move |_: &FrameContext| {
        counted.fetch_add(1, Ordering::SeqCst);
    })
    .into_system()];
    let mut engine = Engine::build(config(), systems).unwrap();
    engine.frame();
    engine.shutdown();
    assert!(!engine.is_running());
    assert!(!engine.jobs().is_running());

    // Run on a separate thread so a hang fails the test instead of stalling it.
    let (tx, rx) = std::sync::mpsc::channel();
    thread::spawn(move || {
        engine.frame();
        engine.run_stage(Stage::Update);
        engine.startup();
        engine.shutdown();
        let _ = tx.send(engine.frame_count());
    });
    let frames = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("stopped engine blocked instead of returning");
    assert_eq!(frames, 1);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn checked_inline_systems_over_budget_are_counted() {
    let slow = SystemDescriptor::new("slow", Stage::Update, |_: &FrameContext| {
        thread::sleep(Duration::from_millis(1));
    })
    .with_mode(ExecutionMode::InlineChecked)
    .into_system();
    let config = SchedulerConfig {
        inline_budget_us: 0,
        ..config()
    };
    let mut engine = Engine::build(config, vec![slow]).unwrap();
    for _ in 0..3 {
        engine.frame();
    }
    assert_eq!(engine.metrics().inline_overruns, 3);
    engine.shutdown();
}

#[test]
fn checked_inline_systems_within_budget_are_not_counted() {
    let quick = SystemDescriptor::new("quick", Stage::Update, |_: &FrameContext| {})
        .with_mode(ExecutionMode::InlineChecked)
        .into_system();
    let config = SchedulerConfig {
        inline_budget_us: 60_000_000,
        ..config()
    };
    let mut engine = Engine::build(config, vec![quick]).unwrap();
    for _ in 0..3 {
        engine.frame();
    }
    assert_eq!(engine.metrics().inline_overruns, 0);
    engine.shutdown();
}

#[cfg(debug_assertions)]
#[test]
fn panicking_inline_system_lets_pooled_jobs_drain() {
    let pooled = Arc::new(AtomicUsize::new(0));
    let counted = pooled.clone();
    let systems = vec![
        SystemDescriptor::new("inline-boom", Stage::Update, |_: &FrameContext| {
            panic!("inline system failed")
        })
        .with_mode(ExecutionMode::Inline)
        .into_system(),
        SystemDescriptor::new("pooled", Stage::Update, move |_: &FrameContext| {
            thread::sleep(Duration::from_millis(2));
            counted.fetch_add(1, Ordering::SeqCst);
        })
        .into_system(),
    ];
    let mut engine = Engine::build(config(), systems).unwrap();

    engine.frame();
    engine.frame();
    assert_eq!(engine.frame_count(), 2);
    assert_eq!(pooled.load(Ordering::SeqCst), 2);
    assert_eq!(engine.metrics().queue.in_flight, 0);
    // Shutdown asserts every slot was drained.
    engine.shutdown();
}
