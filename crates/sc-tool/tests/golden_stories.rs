use sc_tool::{assert_case, read_test_case, run_case};

#[test]
fn every_bundled_story_matches_its_testcase() {
    let mut dirs = std::fs::read_dir(sc_test_example::stories_root())
        .expect("stories root should be readable")
        .map(|entry| entry.expect("entry").path())
        .filter(|path| path.join("testcase.json").is_file())
        .collect::<Vec<_>>();
    dirs.sort();
    assert!(!dirs.is_empty(), "expected bundled stories");

    for dir in dirs {
        if let Err(error) = assert_case(&dir, &dir.join("testcase.json")) {
            panic!("{} failed: {}", dir.display(), error);
        }
    }
}

#[test]
fn late_night_consumes_every_action() {
    let case = read_test_case(&sc_test_example::testcase_path("late-night")).expect("case");
    let report = run_case(&sc_test_example::story_dir("late-night"), &case).expect("run");
    assert_eq!(report.consumed_actions, case.actions.len());
    assert_eq!(report.observed_events.last(), Some(&sc_tool::ExpectedEvent::End));
}
