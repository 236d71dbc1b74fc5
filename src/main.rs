pub mod ui;

use chrono::{DateTime, Local};
use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    event::{KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use dahdit::{
    app_dirs::AppDirs,
    clock::{Clock, SystemClock},
    config::{Config, ConfigStore, FileConfigStore},
    engine::{SessionEngine, SessionEvent, SessionUpdate},
    export,
    history::{CharSummary, HistoryDb, SessionRecord},
    logging,
    playback::PlaybackController,
    runtime::{answer_key, AppEvent, CrosstermEventSource, FixedTicker, Runner},
    source::{CharacterSource, RandomSource},
    stats::SessionStats,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    error::Error,
    io::{self, stdin},
    path::{Path, PathBuf},
    sync::mpsc::Receiver,
    time::{Duration, Instant},
};
use tracing::{info, warn};

use crate::ui::history::HistoryState;

/// Engine timers are only as precise as this
const TICK_RATE_MS: u64 = 10;
/// Countdown redraw while a session runs
const REDRAW_MS: u64 = 100;
const RECENT_RESULTS: usize = 8;
const MIN_WPM: f64 = 5.0;
const MIN_SESSION_SECS: u64 = 10;
const MAX_SESSION_SECS: u64 = 600;
const MAX_WPM: f64 = 40.0;
const WPM_STEP: f64 = 1.0;

/// morse code copy trainer for the terminal
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Plays random Morse characters and times how fast you recognise them. Each character repeats until you press the matching key."
)]
pub struct Cli {
    /// session length in seconds
    #[clap(short = 's', long)]
    seconds: Option<u64>,

    /// character speed in words per minute
    #[clap(short = 'w', long)]
    wpm: Option<f64>,

    /// tone frequency in Hz
    #[clap(short = 'f', long)]
    frequency: Option<f64>,

    /// draw digits as well as letters
    #[clap(short = 'd', long)]
    digits: bool,

    /// write a debug log to the state directory
    #[clap(long)]
    debug: bool,

    /// write every recorded attempt to a CSV file and exit
    #[clap(long, value_name = "PATH")]
    export: Option<PathBuf>,
}

impl Cli {
    /// Flags given on the command line win over stored settings.
    /// Length and speed are kept within what the trainer offers.
    fn apply(&self, mut config: Config) -> Config {
        if let Some(secs) = self.seconds {
            config.session_secs = secs;
        }
        if let Some(wpm) = self.wpm {
            config.wpm = wpm;
        }
        if let Some(freq) = self.frequency {
            config.frequency_hz = freq;
        }
        if self.digits {
            config.include_digits = true;
        }
        config.session_secs = config.session_secs.clamp(MIN_SESSION_SECS, MAX_SESSION_SECS);
        if config.wpm.is_finite() {
            config.wpm = config.wpm.clamp(MIN_WPM, MAX_WPM);
        } else {
            config.wpm = Config::default().wpm;
        }
        config
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Screen {
    Ready,
    Running,
    Results,
    History,
}

/// One line of the running results list
#[derive(Debug, Clone, PartialEq)]
pub enum FeedLine {
    Correct {
        character: char,
        latency_ms: f64,
        replays: u32,
    },
    Wrong {
        played: char,
        pressed: char,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Info(String),
    Error(String),
}

pub struct App<C: Clock, S: CharacterSource> {
    pub config: Config,
    pub engine: SessionEngine<C, S>,
    updates: Receiver<SessionUpdate>,
    pub screen: Screen,
    /// Where Esc leaves the history screen to
    previous_screen: Screen,
    pub feed: Vec<FeedLine>,
    pub last_result: Option<SessionStats>,
    pub history: Option<HistoryDb>,
    pub history_state: HistoryState,
    pub history_rows: Vec<CharSummary>,
    pub recent_sessions: Vec<SessionRecord>,
    pub session_log: Option<PathBuf>,
    pub notice: Option<Notice>,
    session_started: Option<DateTime<Local>>,
    session_wpm: f64,
    dirty: bool,
}

impl<C: Clock, S: CharacterSource> App<C, S> {
    pub fn new(config: Config, mut engine: SessionEngine<C, S>, history: Option<HistoryDb>) -> Self {
        let updates = engine.subscribe();
        let mut app = Self {
            session_wpm: config.wpm,
            config,
            engine,
            updates,
            screen: Screen::Ready,
            previous_screen: Screen::Ready,
            feed: Vec::new(),
            last_result: None,
            history,
            history_state: HistoryState::default(),
            history_rows: Vec::new(),
            recent_sessions: Vec::new(),
            session_log: None,
            notice: None,
            session_started: None,
            dirty: true,
        };
        app.refresh_history();
        app
    }

    pub fn with_session_log(mut self, path: Option<PathBuf>) -> Self {
        self.session_log = path;
        self
    }

    pub fn start(&mut self) {
        match self
            .engine
            .start(self.config.session_secs as f64, self.config.wpm)
        {
            Ok(()) => {
                self.feed.clear();
                self.notice = None;
                self.session_started = Some(Local::now());
                self.session_wpm = self.config.wpm;
                self.screen = Screen::Running;
            }
            Err(e) => {
                warn!("cannot start session: {e}");
                self.notice = Some(Notice::Error(e.to_string()));
            }
        }
        self.dirty = true;
    }

    pub fn stop(&mut self) {
        self.engine.handle(SessionEvent::Stop);
        self.drain_updates();
    }

    /// Speed applies from the next prompted character
    pub fn adjust_wpm(&mut self, delta: f64) {
        let wpm = (self.config.wpm + delta).clamp(MIN_WPM, MAX_WPM);
        if wpm == self.config.wpm {
            return;
        }
        if self.engine.is_running() {
            if let Err(e) = self.engine.set_wpm(wpm) {
                self.notice = Some(Notice::Error(e.to_string()));
                self.dirty = true;
                return;
            }
        }
        self.config.wpm = wpm;
        self.notice = Some(Notice::Info(format!("{wpm:.0} wpm")));
        self.dirty = true;
    }

    pub fn tick(&mut self) {
        self.engine.handle(SessionEvent::Tick);
        self.drain_updates();
    }

    pub fn answer(&mut self, c: char) {
        self.engine.handle(SessionEvent::Key(c));
        self.drain_updates();
    }

    /// Returns true when something changed since the last call
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    fn drain_updates(&mut self) {
        while let Ok(update) = self.updates.try_recv() {
            self.dirty = true;
            match update {
                SessionUpdate::Prompted { .. } | SessionUpdate::Replayed { .. } => {}
                SessionUpdate::Answered(attempt) => {
                    let line = if attempt.correct {
                        FeedLine::Correct {
                            character: attempt.character,
                            latency_ms: attempt.latency_ms(),
                            replays: attempt.replay_count,
                        }
                    } else {
                        FeedLine::Wrong {
                            played: attempt.character,
                            pressed: attempt.pressed,
                        }
                    };
                    self.feed.insert(0, line);
                    self.feed.truncate(RECENT_RESULTS);
                }
                SessionUpdate::Finished(stats) => self.finish_session(stats),
            }
        }
    }

    fn finish_session(&mut self, stats: SessionStats) {
        let started = self.session_started.take().unwrap_or_else(Local::now);
        let elapsed_secs = (Local::now() - started).num_milliseconds().max(0) as f64 / 1000.0;

        if let Some(db) = self.history.as_mut() {
            match db.record_session(started, elapsed_secs, self.session_wpm, &stats) {
                Ok(id) => {
                    if let Some(path) = &self.session_log {
                        let record = SessionRecord {
                            id,
                            started_at: started,
                            duration_secs: elapsed_secs,
                            wpm: self.session_wpm,
                            attempts: stats.total_attempts(),
                            correct: stats.total_correct(),
                            avg_latency_ms: stats.avg_latency_ms(),
                        };
                        if let Err(e) = export::append_session_log(path, &record) {
                            warn!("cannot append session log: {e}");
                        }
                    }
                }
                Err(e) => {
                    warn!("cannot record session: {e}");
                    self.notice = Some(Notice::Error(format!("history not saved: {e}")));
                }
            }
        }

        self.last_result = Some(stats);
        self.screen = Screen::Results;
        self.refresh_history();
    }

    pub fn refresh_history(&mut self) {
        let Some(db) = self.history.as_ref() else {
            return;
        };
        match (db.char_summary(), db.recent_sessions(RECENT_RESULTS)) {
            (Ok(rows), Ok(sessions)) => {
                self.history_rows = rows;
                self.recent_sessions = sessions;
            }
            (Err(e), _) | (_, Err(e)) => warn!("cannot read history: {e}"),
        }
    }

    fn open_history(&mut self) {
        self.refresh_history();
        self.previous_screen = self.screen;
        self.history_state = HistoryState::default();
        self.screen = Screen::History;
    }

    /// Returns false when the app should exit
    pub fn on_key(&mut self, key: KeyEvent) -> bool {
        self.dirty = true;
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.stop();
            return false;
        }

        match self.screen {
            Screen::Running => match key.code {
                KeyCode::Esc => self.stop(),
                KeyCode::Char('+') | KeyCode::Char('=') => self.adjust_wpm(WPM_STEP),
                KeyCode::Char('-') => self.adjust_wpm(-WPM_STEP),
                _ => {
                    if let Some(c) = answer_key(&key) {
                        self.answer(c);
                    }
                }
            },
            Screen::Ready | Screen::Results => match key.code {
                KeyCode::Esc | KeyCode::Char('q') => return false,
                KeyCode::Enter | KeyCode::Char('r') => self.start(),
                KeyCode::Char('h') => self.open_history(),
                KeyCode::Char('+') | KeyCode::Char('=') => self.adjust_wpm(WPM_STEP),
                KeyCode::Char('-') => self.adjust_wpm(-WPM_STEP),
                _ => {}
            },
            Screen::History => match key.code {
                KeyCode::Esc | KeyCode::Backspace | KeyCode::Char('b') => {
                    self.screen = self.previous_screen;
                }
                code => self.history_state.on_key(code),
            },
        }
        true
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if let Some(log_path) = logging::init(cli.debug, AppDirs::log_path().as_deref())? {
        info!(path = %log_path.display(), "debug logging enabled");
    }

    if let Some(path) = &cli.export {
        return run_export(path);
    }

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let store = FileConfigStore::new();
    let config = cli.apply(store.load());
    if let Err(e) = store.save(&config) {
        warn!("cannot save config to {}: {e}", store.path().display());
    }

    let history = match HistoryDb::open_default() {
        Ok(db) => Some(db),
        Err(e) => {
            warn!("running without history: {e}");
            None
        }
    };

    let source = if config.include_digits {
        RandomSource::alphanumerics()
    } else {
        RandomSource::letters()
    };
    let engine = SessionEngine::new(
        SystemClock,
        source,
        PlaybackController::open_default(),
        config.tone_spec(),
    )?;
    let mut app = App::new(config, engine, history).with_session_log(AppDirs::session_log_path());

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = start_tui(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn run_export(path: &Path) -> Result<(), Box<dyn Error>> {
    let db = HistoryDb::open_default()?;
    let attempts = db.all_attempts()?;
    let written = export::export_attempts(path, &attempts)?;
    println!("exported {written} attempts to {}", path.display());
    Ok(())
}

fn start_tui<B: Backend, C: Clock, S: CharacterSource>(
    terminal: &mut Terminal<B>,
    app: &mut App<C, S>,
) -> Result<(), Box<dyn Error>> {
    let runner = Runner::new(
        CrosstermEventSource::new(),
        FixedTicker::new(Duration::from_millis(TICK_RATE_MS)),
    );
    let redraw = Duration::from_millis(REDRAW_MS);

    terminal.draw(|f| ui::draw(app, f))?;
    let mut last_draw = Instant::now();

    loop {
        match runner.step() {
            AppEvent::Tick => app.tick(),
            AppEvent::Resize => app.dirty = true,
            AppEvent::Key(key) => {
                if !app.on_key(key) {
                    break;
                }
                // keystrokes can starve the ticker
                app.tick();
            }
        }

        let countdown_due = app.engine.is_running() && last_draw.elapsed() >= redraw;
        if app.take_dirty() || countdown_due {
            terminal.draw(|f| ui::draw(app, f))?;
            last_draw = Instant::now();
        }
    }

    Ok(())
}
