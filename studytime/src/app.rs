use chrono::Utc;
use crossterm::event::KeyCode;
use studytime::config::{Alarm, Config};
use studytime::ServiceEvent;
use studytime_ipc::{Command, Response, TimerMode, TimerState, TimerStatus};
use tracing::{debug, warn};

#[derive(Default, Clone, Copy, PartialEq, Eq, Debug)]
pub enum AppMode {
    #[default]
    Normal,
    EditingDuration,
    EditingTopic,
    EditingSubject,
    SelectingAlarm,
    Help,
}

/// Display-side model. The service owns the timer; the app only mirrors its
/// last published status and turns keys into commands.
pub struct App {
    pub config: Config,
    pub status: Option<TimerStatus>,
    pub mode: AppMode,
    pub input_buffer: String,
    pub alarm_cursor: usize,
    /// Last rejection or input error, shown in the status bar.
    pub message: Option<String>,
    pub should_quit: bool,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            status: None,
            mode: AppMode::Normal,
            input_buffer: String::new(),
            alarm_cursor: 0,
            message: None,
            should_quit: false,
        }
    }

    /// Fold a service event into the display. Returns true on completion.
    pub fn apply(&mut self, event: ServiceEvent) -> bool {
        match event {
            ServiceEvent::Changed(status) => {
                self.status = Some(status);
                false
            }
            ServiceEvent::Completed => true,
        }
    }

    pub fn apply_response(&mut self, response: Response) {
        match response {
            Response::Ok => self.message = None,
            Response::Status(status) => self.status = Some(status),
            Response::Error(e) => {
                debug!("Command rejected: {}", e);
                self.message = Some(e);
            }
        }
    }

    pub fn run_state(&self) -> TimerState {
        self.status
            .as_ref()
            .map(|status| status.state)
            .unwrap_or(TimerState::Idle)
    }

    pub fn alarms(&self) -> Vec<Alarm> {
        self.config.alarms()
    }

    pub fn alarm_label(&self) -> String {
        match &self.status {
            Some(status) => self.config.alarm_label(&status.alarm),
            None => self.config.alarm_label(&self.config.timer.alarm),
        }
    }

    /// Fraction of the countdown used, or of the current minute in stopwatch mode.
    pub fn progress(&self) -> f64 {
        let Some(status) = &self.status else {
            return 0.0;
        };
        match status.mode {
            TimerMode::Countdown if status.initial_seconds > 0 => {
                let used = status.initial_seconds.saturating_sub(status.seconds) as f64;
                (used / status.initial_seconds as f64).min(1.0)
            }
            TimerMode::Countdown => 0.0,
            TimerMode::Stopwatch => (status.seconds % 60) as f64 / 60.0,
        }
    }

    /// Translate a key press into at most one service command.
    pub fn handle_key(&mut self, code: KeyCode) -> Option<Command> {
        match self.mode {
            AppMode::Normal => self.handle_normal_key(code),
            AppMode::Help => {
                self.mode = AppMode::Normal;
                None
            }
            AppMode::SelectingAlarm => self.handle_alarm_key(code),
            AppMode::EditingDuration | AppMode::EditingTopic | AppMode::EditingSubject => {
                match code {
                    KeyCode::Esc => {
                        self.mode = AppMode::Normal;
                        self.input_buffer.clear();
                        None
                    }
                    KeyCode::Enter => self.handle_char('\n'),
                    KeyCode::Backspace => {
                        self.handle_backspace();
                        None
                    }
                    KeyCode::Char(c) => self.handle_char(c),
                    _ => None,
                }
            }
        }
    }

    fn handle_normal_key(&mut self, code: KeyCode) -> Option<Command> {
        match code {
            KeyCode::Char('q') => {
                self.should_quit = true;
                None
            }
            KeyCode::Char(' ') => Some(match self.run_state() {
                TimerState::Idle => Command::Start,
                TimerState::Running => Command::Pause,
                TimerState::Paused => Command::Resume,
            }),
            KeyCode::Char('r') => Some(Command::Reset),
            KeyCode::Char('m') => {
                let mode = match self.status.as_ref().map(|s| s.mode) {
                    Some(TimerMode::Stopwatch) => TimerMode::Countdown,
                    _ => TimerMode::Stopwatch,
                };
                Some(Command::SetMode { mode })
            }
            KeyCode::Char('d') => self.begin_input(AppMode::EditingDuration, String::new()),
            KeyCode::Char('t') => {
                let topic = self
                    .status
                    .as_ref()
                    .map(|s| s.topic.clone())
                    .unwrap_or_default();
                self.begin_input(AppMode::EditingTopic, topic)
            }
            KeyCode::Char('s') => {
                let subject = self
                    .status
                    .as_ref()
                    .and_then(|s| s.subject_id)
                    .map(|id| id.to_string())
                    .unwrap_or_default();
                self.begin_input(AppMode::EditingSubject, subject)
            }
            KeyCode::Char('a') => {
                let current = self.status.as_ref().map(|s| s.alarm.clone());
                self.alarm_cursor = self
                    .alarms()
                    .iter()
                    .position(|alarm| Some(&alarm.id) == current.as_ref())
                    .unwrap_or(0);
                self.mode = AppMode::SelectingAlarm;
                None
            }
            KeyCode::Char('n') => Some(Command::SetSessionStart {
                at: Some(Utc::now()),
            }),
            KeyCode::Char('N') => Some(Command::SetSessionStart { at: None }),
            KeyCode::Char('?') => {
                self.mode = AppMode::Help;
                None
            }
            _ => None,
        }
    }

    fn handle_alarm_key(&mut self, code: KeyCode) -> Option<Command> {
        let alarms = self.alarms();
        match code {
            KeyCode::Esc => {
                self.mode = AppMode::Normal;
                None
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.alarm_cursor = self.alarm_cursor.saturating_sub(1);
                None
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if !alarms.is_empty() {
                    self.alarm_cursor = (self.alarm_cursor + 1).min(alarms.len() - 1);
                }
                None
            }
            KeyCode::Enter => self.pick_alarm(&alarms, self.alarm_cursor),
            KeyCode::Char(c) if c.is_ascii_digit() => {
                let index = c.to_digit(10).unwrap_or(0) as usize;
                if index > 0 {
                    self.pick_alarm(&alarms, index - 1)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    fn pick_alarm(&mut self, alarms: &[Alarm], index: usize) -> Option<Command> {
        let alarm = alarms.get(index)?;
        self.mode = AppMode::Normal;
        Some(Command::SetAlarm {
            id: alarm.id.clone(),
        })
    }

    fn begin_input(&mut self, mode: AppMode, initial: String) -> Option<Command> {
        self.mode = mode;
        self.input_buffer = initial;
        self.message = None;
        None
    }

    pub fn handle_char(&mut self, c: char) -> Option<Command> {
        if c != '\n' {
            match self.mode {
                AppMode::EditingDuration if c.is_ascii_digit() || c == ':' => {
                    self.input_buffer.push(c)
                }
                AppMode::EditingSubject if c.is_ascii_digit() => self.input_buffer.push(c),
                AppMode::EditingTopic => self.input_buffer.push(c),
                _ => {}
            }
            return None;
        }

        let input = std::mem::take(&mut self.input_buffer);
        let mode = std::mem::replace(&mut self.mode, AppMode::Normal);
        match mode {
            AppMode::EditingDuration => match parse_duration(&input) {
                Some((minutes, seconds)) => Some(Command::SetDuration { minutes, seconds }),
                None => {
                    self.message = Some(format!("Invalid duration '{}', use MM or MM:SS", input));
                    None
                }
            },
            AppMode::EditingTopic => Some(Command::SetTopic {
                topic: input.trim().to_string(),
            }),
            AppMode::EditingSubject => {
                let subject_id = if input.is_empty() {
                    None
                } else {
                    match input.parse() {
                        Ok(id) => Some(id),
                        Err(e) => {
                            self.message = Some(format!("Invalid subject id: {}", e));
                            return None;
                        }
                    }
                };
                Some(Command::SetSubject { subject_id })
            }
            other => {
                self.mode = other;
                None
            }
        }
    }

    pub fn handle_backspace(&mut self) {
        if matches!(
            self.mode,
            AppMode::EditingDuration | AppMode::EditingTopic | AppMode::EditingSubject
        ) {
            self.input_buffer.pop();
        }
    }

    pub fn notify_completion(&self) {
        let (mode, topic) = match &self.status {
            Some(status) => (status.mode, status.topic.as_str()),
            None => (TimerMode::Countdown, ""),
        };
        let body = if topic.is_empty() {
            format!("Your {} is done.", mode)
        } else {
            format!("{} is done.", topic)
        };
        send_notification(&format!("Time's up ({})", self.alarm_label()), &body);
    }
}

fn send_notification(title: &str, body: &str) {
    if let Err(e) = notify_rust::Notification::new()
        .summary(title)
        .body(body)
        .appname("studytime")
        .show()
    {
        warn!("Failed to send notification: {}", e);
    }
}

/// Parse `MM` or `MM:SS`.
pub fn parse_duration(input: &str) -> Option<(u64, u64)> {
    let input = input.trim();
    match input.split_once(':') {
        Some((minutes, seconds)) => Some((minutes.parse().ok()?, seconds.parse().ok()?)),
        None => Some((input.parse().ok()?, 0)),
    }
}
