use std::{fs, sync::Arc, thread, time::Duration};

use filter_rules::{Decision, Rule, RuleSpec};
use inversion_manager::{AppContext, AppPaths, ColorMatrix, LoggingColorFilter};
use win_focus_watcher::{FakeWindow, FakeWindowSystem, FocusEvent, FocusEventKind, WindowHandle};

struct Harness {
    _dir: tempfile::TempDir,
    fake: Arc<FakeWindowSystem>,
    filter: Arc<LoggingColorFilter>,
    ctx: AppContext,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let fake = Arc::new(FakeWindowSystem::new());
    let filter = Arc::new(LoggingColorFilter::new());
    let ctx = AppContext::build(AppPaths::in_dir(dir.path()), fake.clone(), filter.clone());
    Harness {
        _dir: dir,
        fake,
        filter,
        ctx,
    }
}

fn focus(n: isize) -> FocusEvent {
    FocusEvent {
        kind: FocusEventKind::Foreground,
        window: WindowHandle(n),
    }
}

#[test]
fn first_start_creates_files_with_defaults() {
    let h = harness();
    assert!(h.ctx.engine.snapshot().is_empty());
    assert_eq!(fs::read_to_string(&h.ctx.paths.rules_file).unwrap(), "");
    let settings = fs::read_to_string(&h.ctx.paths.settings_file).unwrap();
    assert!(settings.contains("check_for_updates = true"));
    let filters = fs::read_to_string(&h.ctx.paths.filters_file).unwrap();
    assert!(filters.contains("inversion:"));
    assert!(filters.contains("deuteranopia:"));
}

#[test]
fn file_sync_timing_from_settings_applies_to_every_document() {
    let dir = tempfile::tempdir().unwrap();
    let paths = AppPaths::in_dir(dir.path());
    fs::write(
        &paths.settings_file,
        "[file_sync]\nsettle_delay_ms = 900\ndebounce_ms = 40\n",
    )
    .unwrap();
    let ctx = AppContext::build(
        paths,
        Arc::new(FakeWindowSystem::new()),
        Arc::new(LoggingColorFilter::new()),
    );

    let settle = Duration::from_millis(900);
    assert_eq!(ctx.settings.document().gate().settle(), settle);
    assert_eq!(ctx.rules_doc.gate().settle(), settle);
    assert_eq!(ctx.catalog.document().gate().settle(), settle);

    // Later edits are saved but leave the running documents alone.
    ctx.settings
        .update(|s| s.file_sync.settle_delay_ms = 200)
        .unwrap();
    assert!(
        fs::read_to_string(&ctx.paths.settings_file)
            .unwrap()
            .contains("settle_delay_ms = 200")
    );
    assert_eq!(ctx.rules_doc.gate().settle(), settle);
}

#[test]
fn hook_thread_decisions_reach_the_filter_through_the_main_loop() {
    let h = harness();
    h.fake.insert(WindowHandle(1), FakeWindow::new("Doc").pid(10));
    h.fake.set_process_path(10, r"C:\a.exe");
    h.ctx.engine.add_rule(
        "a",
        Rule::new(RuleSpec::for_path(r"C:\a.exe")).unwrap(),
    );

    let controller = h.ctx.controller.clone();
    let decision = thread::spawn(move || controller.handle_event(focus(1)))
        .join()
        .unwrap();
    assert!(matches!(decision, Some(Decision::On { .. })));
    assert!(!h.filter.state().enabled, "not applied off the main thread");

    h.ctx.executor.run_pending().unwrap();
    assert!(h.filter.state().enabled);
}

#[test]
fn rule_changes_reapply_to_the_active_window() {
    let h = harness();
    h.fake.insert(WindowHandle(1), FakeWindow::new("Doc").pid(10));
    h.fake.set_process_path(10, r"C:\a.exe");
    h.ctx.controller.handle_event(focus(1));
    assert!(!h.filter.state().enabled);

    h.ctx.engine.add_rule(
        "a",
        Rule::new(RuleSpec::for_path(r"C:\a.exe").with_filter("grayscale", 0.5)).unwrap(),
    );
    let state = h.filter.state();
    assert!(state.enabled);
    assert_eq!(state.effect.as_deref(), Some("grayscale"));
}

#[test]
fn external_rule_edit_reloads_through_the_executor() {
    let h = harness();
    h.fake.insert(WindowHandle(1), FakeWindow::new("Doc").pid(10));
    h.fake.set_process_path(10, r"C:\a.exe");
    h.ctx.controller.handle_event(focus(1));

    let doc = h.ctx.rules_doc.clone();
    let executor = h.ctx.executor.clone();
    thread::spawn(move || {
        fs::write(doc.path(), "a:\n  path: C:\\a.exe\n").unwrap();
        executor
            .post(main_exec::DEFAULT_PRIORITY, move || {
                doc.load().unwrap();
            })
            .unwrap();
    })
    .join()
    .unwrap();

    h.ctx.executor.run_pending().unwrap();
    assert!(h.ctx.engine.contains("a"));
    assert!(h.filter.state().enabled);
}

#[test]
fn shutdown_from_another_thread_stops_the_main_loop() {
    let h = harness();
    let shutdown = h.ctx.shutdown.clone();
    let token = shutdown.token();
    let closer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        shutdown.close();
    });
    h.ctx.executor.run_loop().unwrap();
    closer.join().unwrap();
    assert!(token.is_cancelled());
    assert!(!h.ctx.executor.is_alive());
}

#[test]
fn unknown_effect_turns_the_filter_off() {
    let h = harness();
    h.fake.insert(WindowHandle(1), FakeWindow::new("Doc").pid(10));
    h.fake.set_process_path(10, r"C:\a.exe");
    h.ctx.controller.handle_event(focus(1));
    h.ctx.engine.add_rule(
        "a",
        Rule::new(RuleSpec::for_path(r"C:\a.exe")).unwrap(),
    );
    assert!(h.filter.state().enabled);

    h.ctx.engine.add_rule(
        "a",
        Rule::new(RuleSpec::for_path(r"C:\a.exe").with_filter("night", 1.0)).unwrap(),
    );
    assert!(!h.filter.state().enabled);
}

#[test]
fn catalogue_edits_reapply_to_the_active_window() {
    let h = harness();
    h.fake.insert(WindowHandle(1), FakeWindow::new("Doc").pid(10));
    h.fake.set_process_path(10, r"C:\a.exe");
    h.ctx.controller.handle_event(focus(1));
    h.ctx.engine.add_rule(
        "a",
        Rule::new(RuleSpec::for_path(r"C:\a.exe").with_filter("night", 0.5)).unwrap(),
    );
    assert!(!h.filter.state().enabled);

    h.ctx.catalog.add_filter("night", ColorMatrix::SEPIA).unwrap();
    let state = h.filter.state();
    assert!(state.enabled);
    assert_eq!(state.effect.as_deref(), Some("night"));
    assert!(fs::read_to_string(&h.ctx.paths.filters_file).unwrap().contains("night:"));

    let only_inversion = "inversion: [\"-1 0 0 0 0 0 -1 0 0 0 0 0 -1 0 0 0 0 0 1 0 1 1 1 0 1\"]\n";
    fs::write(&h.ctx.paths.filters_file, only_inversion).unwrap();
    h.ctx.catalog.document().load().unwrap();
    assert!(h.ctx.catalog.matrix("night").is_none());
    assert!(!h.filter.state().enabled);
}

#[test]
fn closing_from_another_thread_releases_the_filter() {
    let h = harness();
    h.fake.insert(WindowHandle(1), FakeWindow::new("Doc").pid(10));
    h.fake.set_process_path(10, r"C:\a.exe");
    h.ctx.controller.handle_event(focus(1));
    h.ctx.engine.add_rule(
        "a",
        Rule::new(RuleSpec::for_path(r"C:\a.exe")).unwrap(),
    );
    assert!(h.filter.state().enabled);

    let shutdown = h.ctx.shutdown.clone();
    thread::spawn(move || shutdown.close()).join().unwrap();
    assert!(h.filter.state().enabled, "released on the main thread");

    h.ctx.executor.run_loop().unwrap();
    assert!(!h.filter.state().enabled);
}

#[test]
fn closing_on_the_main_thread_releases_the_filter() {
    let h = harness();
    h.fake.insert(WindowHandle(1), FakeWindow::new("Doc").pid(10));
    h.fake.set_process_path(10, r"C:\a.exe");
    h.ctx.controller.handle_event(focus(1));
    h.ctx.engine.add_rule(
        "a",
        Rule::new(RuleSpec::for_path(r"C:\a.exe")).unwrap(),
    );
    assert!(h.filter.state().enabled);

    h.ctx.shutdown.close();
    assert!(!h.filter.state().enabled);
    h.ctx.executor.run_loop().unwrap();
    assert!(!h.filter.state().enabled);
}

#[cfg(not(windows))]
#[test]
fn run_fails_fast_without_a_focus_backend() {
    use inversion_manager::{Error, NoReleases, RunOptions};

    let h = harness();
    let result = inversion_manager::run(
        &h.ctx,
        RunOptions {
            update_check: false,
            release_source: Arc::new(NoReleases),
        },
    );
    assert!(matches!(
        result,
        Err(Error::Focus(win_focus_watcher::Error::Unsupported))
    ));
}
