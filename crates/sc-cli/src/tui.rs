#[cfg(coverage)]
pub(super) fn run_play_ratatui_mode(
    state_file: &str,
    story: &super::LoadedStory,
    run: &mut super::StoryRun,
) -> Result<i32, sc_core::StoryError> {
    super::run_play_line_mode(state_file, story, run)
}

#[cfg(not(coverage))]
pub(super) use rich::run_play_ratatui_mode;

#[cfg(not(coverage))]
mod rich {
    use std::io;
    use std::time::{Duration, Instant};

    use crossterm::event::{self, Event, KeyEventKind};
    use crossterm::terminal::{
        disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
    };
    use crossterm::ExecutableCommand;
    use ratatui::backend::CrosstermBackend;
    use ratatui::Terminal;
    use sc_core::StoryError;

    use crate::tui_actions::{advance_viewing, handle_key, TuiActionContext};
    use crate::tui_render::render_tui;
    use crate::tui_state::TuiUiState;
    use crate::{map_tui_io, transcript, BoundaryEvent, LoadedStory, PlayClock, StoryRun};

    const TYPEWRITER_CHARS_PER_SECOND: u64 = 60;
    const TYPEWRITER_TICK_MS: u64 = 1000 / TYPEWRITER_CHARS_PER_SECOND;

    struct TuiTerminal {
        terminal: Terminal<CrosstermBackend<io::Stdout>>,
    }

    impl TuiTerminal {
        fn new() -> Result<Self, StoryError> {
            enable_raw_mode().map_err(map_tui_io)?;
            io::stdout()
                .execute(EnterAlternateScreen)
                .map_err(map_tui_io)?;
            let backend = CrosstermBackend::new(io::stdout());
            let terminal = Terminal::new(backend).map_err(map_tui_io)?;
            Ok(Self { terminal })
        }

        fn terminal_mut(&mut self) -> &mut Terminal<CrosstermBackend<io::Stdout>> {
            &mut self.terminal
        }
    }

    impl Drop for TuiTerminal {
        fn drop(&mut self) {
            let _ = disable_raw_mode();
            let _ = io::stdout().execute(LeaveAlternateScreen);
        }
    }

    pub(crate) fn run_play_ratatui_mode(
        state_file: &str,
        story: &LoadedStory,
        run: &mut StoryRun,
    ) -> Result<i32, StoryError> {
        let mut terminal = TuiTerminal::new()?;
        let context = TuiActionContext { state_file, story };
        let mut ui = TuiUiState {
            status: "ready".to_string(),
            ..TuiUiState::default()
        };
        let viewing = run.conversation_key(None)?;
        ui.replace_boundary(transcript(run.session(), &viewing));

        let auto_advance = story.manifest.auto_advance_ms.map(Duration::from_millis);
        let tick = Duration::from_millis(TYPEWRITER_TICK_MS);
        let mut clock = PlayClock::start(run.session().clock_millis());
        let mut last_tick = Instant::now();
        let mut last_step = Instant::now();

        loop {
            terminal
                .terminal_mut()
                .draw(|frame| render_tui(frame, &ui, story, run.session(), state_file))
                .map_err(map_tui_io)?;

            if last_tick.elapsed() >= tick {
                ui.advance_typewriter();
                last_tick = Instant::now();
            }

            for (key, index) in run.player.session_mut().tick(clock.now()) {
                ui.pending_lines
                    .push(format!("({} deleted message {})", key, index));
            }

            if let Some(delay) = auto_advance {
                let idle = !ui.typing_in_progress() && ui.event == Some(BoundaryEvent::Message);
                if idle && last_step.elapsed() >= delay {
                    if let Err(error) = advance_viewing(run, &mut ui) {
                        ui.status = error.message;
                    }
                    last_step = Instant::now();
                }
            }

            let timeout = tick.saturating_sub(last_tick.elapsed());
            if !event::poll(timeout).map_err(map_tui_io)? {
                continue;
            }

            let evt = event::read().map_err(map_tui_io)?;
            if let Event::Key(key) = evt {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                let before = run.session().clock_millis();
                let should_quit = match handle_key(key, &context, run, &mut ui) {
                    Ok(should_quit) => should_quit,
                    Err(error) => {
                        ui.status = error.message;
                        false
                    }
                };
                if should_quit {
                    break;
                }
                if run.session().clock_millis() < before {
                    clock = PlayClock::start(run.session().clock_millis());
                }
                last_step = Instant::now();
            }
        }

        Ok(0)
    }
}
