use super::*;

/// Environment for replay: the session's global state is restored separately.
struct ReplayEnv;

impl StepEnv for ReplayEnv {
    fn is_unlocked(&self, _file: &str) -> bool {
        true
    }

    fn lock_satisfied(&self, _file: &str) -> bool {
        true
    }

    fn has_feed_post(&self, _feed: FeedKind, _file: &str) -> bool {
        true
    }

    fn spy_unlocked(&self) -> bool {
        true
    }

    fn spy_anchor_level(&self) -> Option<u32> {
        None
    }

    fn clock_millis(&self) -> u64 {
        0
    }
}

/// Rebuilds a conversation from its decisions alone. Fake selections still
/// due at `target_counter` are consumed; real choices only before it.
pub fn replay_to_state(
    program: &Program,
    target_counter: usize,
    fake_selections: &[String],
    real_selections: &[RealSelection],
    target_path: Option<&str>,
) -> ConversationState {
    let mut state = ConversationState::default();
    let mut fakes = fake_selections.iter();
    let mut reals = real_selections.iter();
    let mode = StepMode::Replay {
        stop_at: target_counter,
    };

    {
        let mut vm = ConversationVm::new(&mut state, program);
        for _ in 0..STEP_GUARD {
            if vm.state.waiting_for_fake_choice {
                let block_index = vm
                    .state
                    .active_fake_choice_index
                    .unwrap_or(vm.state.next_fake_choice_cursor);
                match fakes.next() {
                    Some(text) => {
                        vm.apply_fake_selection(block_index, text);
                        continue;
                    }
                    None => break,
                }
            }
            if vm.state.waiting_for_real_choice {
                if vm.state.program_counter >= target_counter {
                    break;
                }
                let block_index = vm
                    .state
                    .active_real_choice_index
                    .unwrap_or(vm.state.next_real_choice_cursor);
                match reals.next() {
                    Some(selection) => {
                        vm.apply_real_selection(block_index, selection.clone());
                        continue;
                    }
                    None => break,
                }
            }
            let report = vm.advance(&ReplayEnv, mode);
            if report.outcome == StepOutcome::Finished {
                break;
            }
        }
    }

    if fakes.next().is_some() || reals.next().is_some() {
        warn!(
            target_counter,
            reached = state.program_counter,
            "replay ended with unused selections"
        );
    }
    state.selected_path = target_path.map(str::to_string);
    state
}
