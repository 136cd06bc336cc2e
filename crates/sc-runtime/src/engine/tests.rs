use super::runtime_test_support::*;
use super::*;
use sc_core::{RealChoiceBlock, RealChoiceOption};

const BRANCHING_STORY: &str = "Amy
amy: hi
$fake.choices
lol
$end
amy: so
$status=Online
$delete=500
amy: listen
$delete
$thinking
hmm
ok then
amy: choose
$choices
A. yes
B. no
path A
amy: yay
$insta=p1.txt
end path
path B
amy: boo
end path
$spy_anchor_1
$talks=ben.txt
amy: bye
";

#[test]
fn real_choice_scenario_offers_choice_after_first_advance() {
    let program = Program {
        instructions: vec![
            talk("amy", "hi"),
            Instruction::RealChoiceMarker { block_index: 0 },
        ],
        fake_choices: Vec::new(),
        real_choices: vec![RealChoiceBlock {
            options: vec![
                RealChoiceOption {
                    label: "A".to_string(),
                    text: "yes".to_string(),
                },
                RealChoiceOption {
                    label: "B".to_string(),
                    text: "no".to_string(),
                },
            ],
            marker_index: 1,
        }],
    };
    let mut state = ConversationState::default();

    let report = advance(&mut state, &program);
    assert_eq!(report.outcome, StepOutcome::Displayed { message_index: 0 });
    assert_eq!(state.played_messages.len(), 1);
    assert!(state.waiting_for_real_choice);
    assert_eq!(state.active_real_choice_index, Some(0));

    ConversationVm::new(&mut state, &program)
        .select_real_choice(0, "A", "yes")
        .expect("select should pass");
    assert_eq!(texts(&state), vec!["amy: hi", "mc: yes"]);
    assert_eq!(state.selected_path.as_deref(), Some("A"));
    assert!(!state.waiting_for_real_choice);
    assert_eq!(state.program_counter, 2);
    assert_eq!(state.next_real_choice_cursor, 1);
}

#[test]
fn immediate_delete_marks_previous_message_and_undo_restores_it() {
    let program = Program {
        instructions: vec![talk("amy", "oops"), Instruction::Delete { timer_millis: None }],
        ..Program::default()
    };
    let mut state = ConversationState::default();
    advance(&mut state, &program);

    let report = advance(&mut state, &program);
    assert_eq!(
        report.outcome,
        StepOutcome::Deleted {
            target_message: Some(0)
        }
    );
    assert_eq!(state.played_messages.len(), 1);
    assert!(state.played_messages[0].is_deleted());

    ConversationVm::new(&mut state, &program).go_back();
    assert_eq!(state.played_messages.len(), 1);
    assert!(!state.played_messages[0].is_deleted());
    assert_eq!(state.program_counter, 1);
}

#[test]
fn selected_path_excludes_other_paths() {
    let program = program("Amy\npath A\namy: a1\npath X\namy: nested\nend path\nend path\npath B\namy: b1\nend path\namy: tail\n");
    let mut state = ConversationState {
        selected_path: Some("A".to_string()),
        ..ConversationState::default()
    };
    run_to_boundary(&mut state, &program);
    run_to_boundary(&mut state, &program);
    run_to_boundary(&mut state, &program);
    assert_eq!(texts(&state), vec!["amy: a1", "amy: tail"]);
}

const FAKE_IN_BRANCH: &str = "Amy
amy: pick
$choices
A. yes
B. no
path A
amy: a1
end path
path B
amy: b1
$fake.choices
B-only line
$end
amy: b2
end path
amy: tail
";

#[test]
fn skipped_path_drops_its_fake_choices() {
    let program = program(FAKE_IN_BRANCH);
    let mut state = ConversationState::default();
    advance(&mut state, &program);
    ConversationVm::new(&mut state, &program)
        .select_real_choice(0, "A", "yes")
        .expect("select should pass");

    advance(&mut state, &program);
    let before_skip = state.clone();
    let report = advance(&mut state, &program);
    assert_eq!(report.outcome, StepOutcome::Displayed { message_index: 3 });
    assert_eq!(texts(&state), vec!["amy: pick", "mc: yes", "amy: a1", "amy: tail"]);
    assert!(!state.waiting_for_fake_choice);
    assert_eq!(state.next_fake_choice_cursor, 1);

    ConversationVm::new(&mut state, &program).go_back();
    assert_eq!(state, before_skip);

    advance(&mut state, &program);
    assert_eq!(advance(&mut state, &program).outcome, StepOutcome::Finished);
    assert!(!state.waiting_for_fake_choice);
}

#[test]
fn selected_path_still_offers_its_own_fake_choices() {
    let program = program(FAKE_IN_BRANCH);
    let mut state = ConversationState::default();
    advance(&mut state, &program);
    ConversationVm::new(&mut state, &program)
        .select_real_choice(0, "B", "no")
        .expect("select should pass");
    run_to_boundary(&mut state, &program);
    assert_eq!(texts(&state), vec!["amy: pick", "mc: no", "amy: b1"]);
    assert!(state.waiting_for_fake_choice);
    assert_eq!(state.active_fake_choice_index, Some(0));
}

#[test]
fn replay_skips_fake_choices_of_unselected_path() {
    let program = program(FAKE_IN_BRANCH);
    let selection = RealSelection {
        label: "A".to_string(),
        text: "yes".to_string(),
    };
    let replayed = replay_to_state(&program, program.len(), &[], &[selection], None);
    assert_eq!(
        texts(&replayed),
        vec!["amy: pick", "mc: yes", "amy: a1", "amy: tail"]
    );
    assert_eq!(replayed.next_fake_choice_cursor, 1);
    assert!(!replayed.waiting_for_fake_choice);
    assert_eq!(replayed.program_counter, program.len());
}

#[test]
fn every_recorded_step_is_undone_exactly() {
    let program = program(BRANCHING_STORY);
    let mut state = ConversationState::default();
    let mut last_cursors = (0, 0);
    let mut records_checked = 0usize;

    for _ in 0..200usize {
        let before = state.clone();
        if state.waiting_for_fake_choice {
            ConversationVm::new(&mut state, &program)
                .select_fake_choice(0, "lol")
                .expect("fake choice should pass");
        } else if state.waiting_for_real_choice {
            let block = state.active_real_choice_index.expect("active block");
            ConversationVm::new(&mut state, &program)
                .select_real_choice(block, "A", "yes")
                .expect("real choice should pass");
        } else if ConversationVm::new(&mut state, &program).is_finished() {
            break;
        } else {
            advance(&mut state, &program);
        }

        let cursors = (state.next_fake_choice_cursor, state.next_real_choice_cursor);
        assert!(cursors.0 >= last_cursors.0 && cursors.1 >= last_cursors.1);
        last_cursors = cursors;

        if state.action_history.len() > before.action_history.len() {
            let mut undone = state.clone();
            let step = ConversationVm::new(&mut undone, &program).go_back();
            assert!(matches!(step, UndoStep::Popped(_)));
            assert_eq!(undone, before);
            records_checked += 1;
        }
    }

    assert!(records_checked >= 10);
    assert_eq!(
        texts(&state),
        vec![
            "amy: hi",
            "mc: lol",
            "amy: so",
            "(Online)",
            "amy: listen",
            "amy: choose",
            "mc: yes",
            "amy: yay",
            "amy: bye",
        ]
    );
    assert!(state.played_messages[4].is_deleted());
    assert_eq!(state.pending_deletions.len(), 1);
    assert_eq!(state.pending_deletions[0].target_message, 2);
}

#[test]
fn feed_and_spy_effects_are_reported_on_the_stopping_record() {
    let program = program("Amy\n$insta=p1.txt\n$spy_unlock\n$spy_anchor_2\namy: posted\n");
    let mut state = ConversationState::default();
    let report = advance(&mut state, &program);
    assert_eq!(
        report.effects,
        vec![
            StepEffect::FeedPostUnlocked {
                feed: FeedKind::Insta,
                file: "p1.txt".to_string()
            },
            StepEffect::SpyUnlocked,
            StepEffect::SpyAnchorReached {
                level: 2,
                prior: None
            },
        ]
    );
    assert_eq!(state.action_history[0].effects, report.effects);
}

#[test]
fn thinking_reveals_one_block_per_step() {
    let program = program("Amy\n$thinking\nfirst\nsecond\namy: done\n");
    let mut state = ConversationState::default();

    let report = advance(&mut state, &program);
    assert_eq!(
        report.outcome,
        StepOutcome::Thinking {
            block_index: 0,
            total_blocks: 2
        }
    );
    assert_eq!(
        state.active_thinking_block.as_ref().map(|reveal| reveal.text.as_str()),
        Some("first")
    );
    advance(&mut state, &program);
    assert_eq!(
        state.active_thinking_block.as_ref().map(|reveal| reveal.block_index),
        Some(1)
    );
    let report = advance(&mut state, &program);
    assert_eq!(report.outcome, StepOutcome::Displayed { message_index: 0 });
    assert!(state.active_thinking_block.is_none());

    ConversationVm::new(&mut state, &program).go_back();
    assert_eq!(
        state.active_thinking_block.as_ref().map(|reveal| reveal.text.as_str()),
        Some("second")
    );
}

#[test]
fn timed_delete_fires_on_clock_and_unwinds_with_undo() {
    let program = program("Amy\namy: one\n$delete=1000\namy: two\n");
    let mut state = ConversationState::default();
    let env = TestEnv {
        clock: 50,
        ..TestEnv::default()
    };
    ConversationVm::new(&mut state, &program).advance(&env, StepMode::Interactive);
    assert_eq!(state.program_counter, 2);
    assert_eq!(state.pending_deletions[0].fires_at, 1050);
    assert_eq!(state.pending_deletions[0].position, 1);

    let mut vm = ConversationVm::new(&mut state, &program);
    assert!(vm.fire_due_deletions(1049).is_empty());
    assert_eq!(vm.fire_due_deletions(1050), vec![0]);
    assert!(state.pending_deletions.is_empty());
    assert_eq!(state.played_messages[0].deleted_at, Some(1));

    advance(&mut state, &program);
    ConversationVm::new(&mut state, &program).go_back();
    assert!(state.played_messages[0].is_deleted());
    ConversationVm::new(&mut state, &program).go_back();
    assert!(state.played_messages.is_empty());
    assert_eq!(state.program_counter, 0);
}

#[test]
fn undo_cancels_deletion_scheduled_by_undone_step() {
    let program = program("Amy\namy: one\n$status=typing\n$delete=300\namy: two\n");
    let mut state = ConversationState::default();
    advance(&mut state, &program);
    advance(&mut state, &program);
    advance(&mut state, &program);
    assert_eq!(state.pending_deletions.len(), 1);
    assert_eq!(state.pending_deletions[0].target_message, 0);

    ConversationVm::new(&mut state, &program).go_back();
    assert!(state.pending_deletions.is_empty());
    assert_eq!(state.program_counter, 2);
}

#[test]
fn lock_waits_without_credentials_and_grant_records_it() {
    let program = program("Amy\namy: hi\n$lock=vip.txt\namy: after\n");
    let mut state = ConversationState::default();
    advance(&mut state, &program);

    let report = advance(&mut state, &program);
    assert_eq!(
        report.outcome,
        StepOutcome::WaitingLock {
            file: "vip.txt".to_string()
        }
    );
    assert!(state.waiting_for_lock);
    assert_eq!(advance(&mut state, &program).outcome, report.outcome);

    let file = ConversationVm::new(&mut state, &program)
        .grant_lock()
        .expect("grant should pass");
    assert_eq!(file, "vip.txt");
    assert!(!state.waiting_for_lock);
    assert_eq!(state.program_counter, 2);

    ConversationVm::new(&mut state, &program).go_back();
    assert!(state.waiting_for_lock);
    let first = state.action_history[0].clone();
    assert_eq!(
        ConversationVm::new(&mut state, &program).go_back(),
        UndoStep::Popped(first)
    );
    assert!(!state.waiting_for_lock);
}

#[test]
fn lock_with_cached_credential_passes_like_an_unlock() {
    let program = program("Amy\n$lock=vip.txt\n");
    let mut state = ConversationState::default();
    let env = TestEnv {
        credentials: true,
        ..TestEnv::default()
    };
    let report = ConversationVm::new(&mut state, &program).advance(&env, StepMode::Interactive);
    assert_eq!(
        report.outcome,
        StepOutcome::Lock {
            file: "vip.txt".to_string()
        }
    );
    assert_eq!(state.action_history[0].kind.kind_name(), "lock");
}

#[test]
fn unlock_stops_once_and_skips_known_files() {
    let program = program("Amy\namy: hi\n$talks=ben.txt\namy: later\n");
    let mut state = ConversationState::default();
    advance(&mut state, &program);
    let report = advance(&mut state, &program);
    assert_eq!(
        report.outcome,
        StepOutcome::Unlock {
            file: "ben.txt".to_string()
        }
    );
    assert_eq!(state.program_counter, 2);

    let mut fresh = ConversationState::default();
    let env = TestEnv {
        unlocked: vec!["ben.txt".to_string()],
        ..TestEnv::default()
    };
    let mut vm = ConversationVm::new(&mut fresh, &program);
    vm.advance(&env, StepMode::Interactive);
    let report = vm.advance(&env, StepMode::Interactive);
    assert_eq!(report.outcome, StepOutcome::Displayed { message_index: 1 });
}

#[test]
fn empty_fake_block_is_skipped() {
    let program = program("Amy\n$fake.choices\n\namy: hi\n");
    let mut state = ConversationState::default();
    let report = advance(&mut state, &program);
    assert_eq!(report.outcome, StepOutcome::Displayed { message_index: 0 });
    assert_eq!(state.next_fake_choice_cursor, 1);
}

#[test]
fn go_back_while_waiting_with_no_history_only_dismisses() {
    let program = program("Amy\n$fake.choices\nhello?\namy: hi\n");
    let mut state = ConversationState::default();
    let report = advance(&mut state, &program);
    assert_eq!(report.outcome, StepOutcome::WaitingFakeChoice { block_index: 0 });
    assert_eq!(
        ConversationVm::new(&mut state, &program).go_back(),
        UndoStep::ClearedWait
    );
    assert!(!state.is_waiting());
    assert_eq!(
        ConversationVm::new(&mut state, &program).go_back(),
        UndoStep::Nothing
    );
}

#[test]
fn selections_reject_misuse() {
    let program = program(BRANCHING_STORY);
    let mut state = ConversationState::default();
    let mut vm = ConversationVm::new(&mut state, &program);
    let error = vm.select_fake_choice(0, "x").expect_err("nothing pending");
    assert_eq!(error.code, "ENGINE_NO_PENDING_CHOICE");

    advance(&mut state, &program);
    let mut vm = ConversationVm::new(&mut state, &program);
    let error = vm.select_fake_choice(3, "x").expect_err("out of range");
    assert_eq!(error.code, "ENGINE_CHOICE_INDEX");
    let error = vm.select_real_choice(0, "A", "yes").expect_err("no real choice");
    assert_eq!(error.code, "ENGINE_NO_PENDING_CHOICE");
}

#[test]
fn replay_rebuilds_interactive_timeline() {
    let source = "Amy\namy: hi\n$fake.choices\nlol\namy: pick\n$choices\nA. left\nB. right\npath A\namy: went left\nend path\npath B\namy: went right\nend path\n$talks=ben.txt\namy: more\n$fake.choices\nsure\namy: end\n";
    let program = program(source);
    let mut state = ConversationState::default();
    for _ in 0..50usize {
        if state.waiting_for_fake_choice {
            ConversationVm::new(&mut state, &program)
                .select_fake_choice(0, "lol")
                .expect("fake");
        } else if state.waiting_for_real_choice {
            ConversationVm::new(&mut state, &program)
                .select_real_choice(0, "B", "right")
                .expect("real");
        } else if state.program_counter >= 9 {
            break;
        } else {
            advance(&mut state, &program);
        }
    }

    let replayed = replay_to_state(
        &program,
        state.program_counter,
        &state.fake_choices_made,
        &state.real_choices_made,
        state.selected_path.as_deref(),
    );
    assert_eq!(replayed.played_messages, state.played_messages);
    assert_eq!(replayed.program_counter, state.program_counter);
    assert_eq!(replayed.next_fake_choice_cursor, state.next_fake_choice_cursor);
    assert_eq!(replayed.next_real_choice_cursor, state.next_real_choice_cursor);
    assert_eq!(replayed.real_choices_made, state.real_choices_made);

    let again = replay_to_state(
        &program,
        state.program_counter,
        &state.fake_choices_made,
        &state.real_choices_made,
        state.selected_path.as_deref(),
    );
    assert_eq!(again, replayed);
}

#[test]
fn replay_consumes_fake_choice_due_at_target() {
    let program = program("Amy\namy: hi\n$fake.choices\nlol\namy: next\n");
    let replayed = replay_to_state(&program, 1, &["lol".to_string()], &[], None);
    assert_eq!(texts(&replayed), vec!["amy: hi", "mc: lol"]);
    assert_eq!(replayed.program_counter, 1);
    assert!(!replayed.waiting_for_fake_choice);
}

#[test]
fn replay_without_choices_reproduces_content_in_order() {
    let program = program("Amy\n$status=Online\namy: a\n$pics=p.jpg\n$talks=x.txt\n$lock=y.txt\nmc: b\n$delete=200\n$audio=v.mp3\n");
    let replayed = replay_to_state(&program, program.len(), &[], &[], None);
    let expected = program
        .instructions
        .iter()
        .filter_map(displayed_item)
        .collect::<Vec<_>>();
    let played = replayed
        .played_messages
        .iter()
        .map(|message| message.item.clone())
        .collect::<Vec<_>>();
    assert_eq!(played, expected);
    assert!(replayed.played_messages[3].is_deleted());
    assert!(replayed.pending_deletions.is_empty());
}
