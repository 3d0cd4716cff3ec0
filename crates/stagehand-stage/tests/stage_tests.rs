//! End-to-end stage runs with scripted units.

use pretty_assertions::assert_eq;
use stagehand_action::{FileMode, MessageLevel, Sketch};
use stagehand_stage::{ProfileEvent, ProfileLog, Profiler, Stage, StageError, StageState};
use stagehand_test_utils::{
    pool, scripted_spec, scripted_spec_with_params, RecordingSink, ScriptBook, Step, TempBuild,
};
use std::fs;
use std::sync::Arc;

const STAGE: &str = "stage1";

fn stage(build: &TempBuild, book: &ScriptBook, sink: &Arc<RecordingSink>) -> Stage {
    Stage::new(
        STAGE,
        build.stage(STAGE),
        build.stage_store(STAGE),
        Arc::new(book.registry()),
        pool(4),
        sink.clone(),
    )
    .unwrap()
}

fn hello_steps() -> Vec<Step> {
    vec![
        Step::Record(Sketch::file("x.txt", FileMode::Read)),
        Step::Record(Sketch::message(MessageLevel::Info, "Hello")),
        Step::Record(Sketch::Exit { exit_code: 0 }),
    ]
}

fn exec(name: &str) -> Step {
    Step::Record(Sketch::Exec {
        spec: scripted_spec(name),
    })
}

/// Tenet: the first run executes, the second replays with the same messages and an identical cache file.
#[test]
fn second_run_replays_without_executing() {
    let build = TempBuild::new();
    build.write("stage1/x.txt", "x");
    build.set_mtime("stage1/x.txt", 1_000);
    let book = ScriptBook::new();
    book.script("hello", hello_steps());

    let sink = RecordingSink::new();
    let first = stage(&build, &book, &sink).start(scripted_spec("hello")).unwrap();
    assert_eq!(first.executed, vec!["hello".to_string()]);
    assert!(first.replayed.is_empty());
    let first_messages = sink.at_level(MessageLevel::Info);
    let entry = build.stage_store(STAGE).join("hello.actions.yml");
    let entry_before = fs::read_to_string(&entry).unwrap();

    let replay_sink = RecordingSink::new();
    let second = stage(&build, &book, &replay_sink)
        .start(scripted_spec("hello"))
        .unwrap();
    assert_eq!(second.replayed, vec!["hello".to_string()]);
    assert!(second.executed.is_empty());
    assert_eq!(book.runs("hello"), 1);

    assert_eq!(replay_sink.at_level(MessageLevel::Info), first_messages);
    assert_eq!(first_messages[0].message, "Hello");
    assert_eq!(first_messages[0].location.as_deref(), Some("hello"));
    assert_eq!(fs::read_to_string(&entry).unwrap(), entry_before);
}

/// Tenet: touching an input re-executes the computation.
#[test]
fn modified_input_invalidates_cache() {
    let build = TempBuild::new();
    build.write("stage1/x.txt", "x");
    build.set_mtime("stage1/x.txt", 1_000);
    let book = ScriptBook::new();
    book.script("hello", hello_steps());
    let sink = RecordingSink::new();

    stage(&build, &book, &sink).start(scripted_spec("hello")).unwrap();
    build.set_mtime("stage1/x.txt", 2_000);
    let report = stage(&build, &book, &sink).start(scripted_spec("hello")).unwrap();

    assert_eq!(report.executed, vec!["hello".to_string()]);
    assert_eq!(book.runs("hello"), 2);
}

/// Tenet: changing a parameter changes the opaque id and re-executes.
#[test]
fn changed_params_invalidate_cache() {
    let build = TempBuild::new();
    let book = ScriptBook::new();
    book.script("hello", hello_steps());
    let sink = RecordingSink::new();

    stage(&build, &book, &sink)
        .start(scripted_spec_with_params("hello", &["1"]))
        .unwrap();
    stage(&build, &book, &sink)
        .start(scripted_spec_with_params("hello", &["1"]))
        .unwrap();
    assert_eq!(book.runs("hello"), 1);

    stage(&build, &book, &sink)
        .start(scripted_spec_with_params("hello", &["2"]))
        .unwrap();
    assert_eq!(book.runs("hello"), 2);
}

/// Tenet: nested computations are discovered and scheduled, also when their parent replays.
#[test]
fn nested_specs_run_and_replay() {
    let build = TempBuild::new();
    let book = ScriptBook::new();
    book.script("root", vec![exec("left"), exec("right")]);
    book.script("left", vec![exec("leaf")]);
    book.script("right", vec![Step::Record(Sketch::message(MessageLevel::Info, "right"))]);
    book.script("leaf", vec![Step::Write { path: "leaf.out".into(), content: "leaf".into() }]);
    let sink = RecordingSink::new();

    let first = stage(&build, &book, &sink).start(scripted_spec("root")).unwrap();
    assert_eq!(first.executed, vec!["leaf", "left", "right", "root"]);
    assert_eq!(build.read("stage1/leaf.out"), "leaf");

    let second = stage(&build, &book, &sink).start(scripted_spec("root")).unwrap();
    assert_eq!(second.replayed, vec!["leaf", "left", "right", "root"]);
    assert_eq!(book.total_runs(), 4);
}

/// Tenet: two specifications with the same name in one stage abort the stage.
#[test]
fn duplicate_names_are_rejected() {
    let build = TempBuild::new();
    let book = ScriptBook::new();
    book.script("root", vec![exec("twin"), exec("twin")]);
    let sink = RecordingSink::new();

    let err = stage(&build, &book, &sink)
        .start(scripted_spec("root"))
        .unwrap_err();
    assert!(matches!(err, StageError::DuplicateSpec { ref name, .. } if name == "twin"));
    assert!(sink.contains(
        MessageLevel::Fatal,
        "Spec 'twin' already scheduled in the same stage. Duplicate specs with same names in the same stage are not allowed."
    ));
}

/// Tenet: concurrently running siblings touching the same file in conflicting ways are reported.
#[test]
fn sibling_collision_is_reported_once() {
    let build = TempBuild::new();
    let book = ScriptBook::new();
    book.script("root", vec![exec("producer"), exec("consumer")]);
    book.script("producer", vec![Step::Record(Sketch::file("shared.txt", FileMode::Write))]);
    book.script("consumer", vec![Step::Record(Sketch::file("shared.txt", FileMode::Read))]);
    let sink = RecordingSink::new();

    let report = stage(&build, &book, &sink).start(scripted_spec("root")).unwrap();

    let fatal = sink.at_level(MessageLevel::Fatal);
    assert_eq!(fatal.len(), 1);
    assert!(fatal[0].message.contains("offends operation from"));
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.executed.len(), 3);
}

/// Tenet: a stage can only be started once.
#[test]
fn restart_is_rejected() {
    let build = TempBuild::new();
    let book = ScriptBook::new();
    let sink = RecordingSink::new();
    let stage = stage(&build, &book, &sink);

    assert_eq!(stage.state(), StageState::NotStarted);
    stage.start(scripted_spec("only")).unwrap();
    assert_eq!(stage.state(), StageState::Finished);
    assert!(matches!(
        stage.start(scripted_spec("only")),
        Err(StageError::AlreadyStarted { .. })
    ));
}

/// Tenet: a panicking unit fails its own computation only.
#[test]
fn panicking_unit_is_contained() {
    let build = TempBuild::new();
    let book = ScriptBook::new();
    book.script("root", vec![exec("bomb"), exec("fine")]);
    book.script("bomb", vec![Step::Panic("kaboom".into())]);
    let sink = RecordingSink::new();

    let report = stage(&build, &book, &sink).start(scripted_spec("root")).unwrap();

    assert_eq!(report.failed, vec!["bomb".to_string()]);
    assert!(report.executed.contains(&"fine".to_string()));
    assert!(sink.contains(MessageLevel::Fatal, "computation panicked: kaboom"));
}

/// Tenet: failed computations are not cached and run again next time.
#[test]
fn failed_unit_is_not_cached() {
    let build = TempBuild::new();
    let book = ScriptBook::new();
    book.script("flaky", vec![Step::Fail("nope".into())]);
    let sink = RecordingSink::new();

    let report = stage(&build, &book, &sink).start(scripted_spec("flaky")).unwrap();
    assert_eq!(report.failed, vec!["flaky".to_string()]);
    assert!(sink.contains(MessageLevel::Fatal, "computation failed: nope"));
    assert!(!build.stage_store(STAGE).join("flaky.actions.yml").exists());

    stage(&build, &book, &sink).start(scripted_spec("flaky")).unwrap();
    assert_eq!(book.runs("flaky"), 2);
}

/// Tenet: an input that can no longer be inspected fails the computation instead of re-running it.
#[cfg(unix)]
#[test]
fn unreadable_cached_input_is_fatal() {
    let build = TempBuild::new();
    let book = ScriptBook::new();
    book.script("reader", vec![Step::Record(Sketch::file("blocker/inner", FileMode::Read))]);
    let sink = RecordingSink::new();

    let first = stage(&build, &book, &sink).start(scripted_spec("reader")).unwrap();
    assert!(first.failed.is_empty());

    build.write("stage1/blocker", "now a file");
    let sink = RecordingSink::new();
    let report = stage(&build, &book, &sink).start(scripted_spec("reader")).unwrap();

    assert_eq!(report.failed, vec!["reader".to_string()]);
    assert!(report.replayed.is_empty());
    assert_eq!(book.runs("reader"), 1);
    assert!(sink.contains(MessageLevel::Fatal, "cannot validate cached actions"));
}

#[test]
fn unknown_unit_type_is_fatal() {
    let build = TempBuild::new();
    let book = ScriptBook::new();
    let sink = RecordingSink::new();
    let spec = stagehand_action::Specification::builder("nonexistent")
        .name("ghost")
        .build()
        .unwrap();

    let report = stage(&build, &book, &sink).start(spec).unwrap();
    assert_eq!(report.failed, vec!["ghost".to_string()]);
    assert!(sink.contains(MessageLevel::Fatal, "no unit registered for type 'nonexistent'"));
}

/// Tenet: an incompatible cache entry aborts the stage.
#[test]
fn incompatible_cache_entry_aborts() {
    let build = TempBuild::new();
    let book = ScriptBook::new();
    book.script("hello", hello_steps());
    let sink = RecordingSink::new();
    build.write(".stagehand/actions/stage1/hello.actions.yml", "version: v99\n");

    let err = stage(&build, &book, &sink)
        .start(scripted_spec("hello"))
        .unwrap_err();
    assert!(matches!(err, StageError::Store { .. }));
    assert_eq!(book.runs("hello"), 0);
}

/// Tenet: exit-code violations surface as errors and do not stop intake.
#[test]
fn processing_errors_are_reported_as_errors() {
    let build = TempBuild::new();
    let book = ScriptBook::new();
    book.script(
        "sloppy",
        vec![
            Step::Record(Sketch::Exit { exit_code: 0 }),
            Step::Record(Sketch::message(MessageLevel::Info, "after exit")),
        ],
    );
    let sink = RecordingSink::new();

    let report = stage(&build, &book, &sink).start(scripted_spec("sloppy")).unwrap();
    assert!(report.failed.is_empty());
    assert!(sink.contains(
        MessageLevel::Error,
        "no further actions shall be recorded after an explicit exit code has been set"
    ));
}

/// Tenet: a sketch after the exit code is flagged but still takes effect.
#[test]
fn sketches_after_exit_still_take_effect() {
    let build = TempBuild::new();
    let book = ScriptBook::new();
    book.script(
        "root",
        vec![
            Step::Record(Sketch::Exit { exit_code: 0 }),
            exec("late"),
            Step::Record(Sketch::message(MessageLevel::Info, "late message")),
        ],
    );
    let sink = RecordingSink::new();

    let report = stage(&build, &book, &sink).start(scripted_spec("root")).unwrap();
    assert_eq!(report.executed, vec!["late".to_string(), "root".to_string()]);
    assert!(sink.contains(MessageLevel::Info, "late message"));
    assert_eq!(sink.at_level(MessageLevel::Error).len(), 2);

    let replay_sink = RecordingSink::new();
    let replay = stage(&build, &book, &replay_sink)
        .start(scripted_spec("root"))
        .unwrap();
    assert_eq!(replay.replayed, vec!["late".to_string(), "root".to_string()]);
    assert!(replay_sink.contains(MessageLevel::Info, "late message"));
}

#[test]
fn progress_reaches_completion() {
    let build = TempBuild::new();
    let book = ScriptBook::new();
    book.script("root", vec![exec("first"), exec("second")]);
    let sink = RecordingSink::new();

    stage(&build, &book, &sink).start(scripted_spec("root")).unwrap();
    let progress = sink.progress();
    assert_eq!(progress.len(), 3);
    assert!((progress[2] - 1.0).abs() < f64::EPSILON);
}

#[test]
fn interrupt_stops_waiting() {
    let build = TempBuild::new();
    let book = ScriptBook::new();
    let sink = RecordingSink::new();
    let stage = stage(&build, &book, &sink);

    stage.interrupter().interrupt();
    let report = stage.start(scripted_spec("slow")).unwrap();
    assert!(report.interrupted);
    assert_eq!(stage.state(), StageState::Finished);
}

fn event_names(events: &[ProfileEvent]) -> Vec<&str> {
    events.iter().map(|event| event.name.as_str()).collect()
}

/// Tenet: every computation reports its phases, and a replay skips the unit run and the cache write.
#[test]
fn profile_events_follow_the_phases() {
    let build = TempBuild::new();
    let book = ScriptBook::new();
    book.script("hello", hello_steps());
    let sink = RecordingSink::new();

    let log = Arc::new(ProfileLog::new());
    let profiler = Profiler::new().with_log(log.clone());
    stage(&build, &book, &sink)
        .with_profiler(&profiler)
        .start(scripted_spec("hello"))
        .unwrap();

    let events = log.for_unit(STAGE, "hello");
    assert_eq!(
        event_names(&events),
        vec![
            "schedule",
            "execution:start",
            "load:start",
            "load:end",
            "run:start",
            "message",
            "run:end",
            "write:start",
            "write:end",
            "execution:end",
        ]
    );
    assert_eq!(events[0].data["unitType"], "scripted");
    assert_eq!(events[5].data["message"], "Hello");

    let stage_events: Vec<_> = log.events().into_iter().filter(|event| event.unit.is_none()).collect();
    assert_eq!(event_names(&stage_events), vec!["stage:start", "stage:end"]);

    let replay_log = Arc::new(ProfileLog::new());
    let replay_profiler = Profiler::new().with_log(replay_log.clone());
    stage(&build, &book, &sink)
        .with_profiler(&replay_profiler)
        .start(scripted_spec("hello"))
        .unwrap();
    assert_eq!(
        event_names(&replay_log.for_unit(STAGE, "hello")),
        vec![
            "schedule",
            "execution:start",
            "load:start",
            "load:end",
            "message",
            "execution:end",
        ]
    );
}
