//! Pomotask - a Pomodoro timer with per-task timer tracking.
//!
//! The timer ticks on a background thread while commands are read from
//! stdin. Each task keeps its own position in the pomodoro cycle, and time
//! that passes while the machine sleeps or the program is closed with a
//! running timer is credited when it comes back.

use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use tracing_subscriber::EnvFilter;

mod app;
mod audio;
mod engine;
mod event;
mod models;
mod notifications;
mod persistence;
mod recovery;
mod tasks;
mod timer;

use app::App;
use audio::AudioPlayer;
use engine::CompletionEvent;
use event::{EventResult, Input};
use notifications::Alerts;
use recovery::SignalHub;
use timer::TimerMessage;

/// Interactive front end around the shared app state.
struct Pomotask {
    app: Arc<Mutex<App>>,
    hub: Arc<Mutex<SignalHub>>,
    timer_rx: Receiver<TimerMessage>,
    audio: Option<AudioPlayer>,
}

impl Pomotask {
    fn new(app: Arc<Mutex<App>>, hub: Arc<Mutex<SignalHub>>, timer_rx: Receiver<TimerMessage>) -> Self {
        // Audio is created on the main thread to avoid Send issues
        let audio = match AudioPlayer::new() {
            Ok(player) => Some(player),
            Err(e) => {
                tracing::warn!(error = %e, "audio disabled");
                None
            }
        };

        Self {
            app,
            hub,
            timer_rx,
            audio,
        }
    }

    fn show_status(&self, status: &str) {
        print!("\r{}    ", status);
        let _ = io::stdout().flush();
    }

    fn current_status(&self) -> Option<String> {
        self.app.lock().ok().map(|app| timer::format_status(&app))
    }

    fn handle_completion(&self, event: CompletionEvent) {
        let Some(alerts) = self
            .app
            .lock()
            .ok()
            .map(|app| Alerts::from_settings(app.settings()))
        else {
            return;
        };

        if alerts.chime {
            if let Some(ref audio) = self.audio {
                audio.play_chime(event);
            }
        }

        if alerts.notification {
            notifications::notify_completion(event, alerts.long_break_mins);
        }
    }

    fn process_timer_messages(&self) {
        while let Ok(msg) = self.timer_rx.try_recv() {
            match msg {
                TimerMessage::StateChanged { status } => self.show_status(&status),
                TimerMessage::Completed(event) => self.handle_completion(event),
            }
        }
    }

    /// Returns false when the user asked to quit.
    fn process_input(&self, input: Input) -> bool {
        let result = match self.app.lock() {
            Ok(mut app) => event::handle_input(&mut app, input),
            Err(_) => return false,
        };

        match result {
            EventResult::Quit => return false,
            EventResult::Continue => {}
            EventResult::StateChanged => {}
            EventResult::StateChangedWithCompletion(completion) => {
                self.handle_completion(completion);
            }
            EventResult::Output(text) => println!("\n{}", text),
            EventResult::Invalid(reason) => println!("\n{}", reason),
        }
        if let Some(status) = self.current_status() {
            self.show_status(&status);
        }
        true
    }

    /// Records the moment of leaving so a restart can credit the time away.
    fn shutdown(&self) {
        let Ok(mut app) = self.app.lock() else {
            return;
        };
        if let Ok(mut hub) = self.hub.lock() {
            app.shutdown(&mut *hub, Utc::now());
        }
    }
}

fn spawn_stdin_reader(tx: Sender<Input>) {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(Input::Line(line)).is_err() {
                return;
            }
        }
        // EOF quits; the interrupt handler keeps the channel open
        let _ = tx.send(Input::Line(event::CMD_QUIT.to_string()));
    });
}

/// Routes Ctrl-C and SIGTERM into the main loop so shutdown still runs.
fn install_interrupt_handler(tx: Sender<Input>) {
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = tx.send(Input::Interrupted);
    }) {
        tracing::warn!(error = %e, "interrupt handler not installed");
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Diagnostics go to stderr; stdout carries the status line.
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut app = App::new()?;
    let hub = Arc::new(Mutex::new(SignalHub::new()));

    // Credit time that passed while the program was closed
    let recovered = app.recover_on_start(Utc::now());
    if let Ok(mut hub) = hub.lock() {
        app.attach_lifecycle(&mut *hub);
    }
    let app = Arc::new(Mutex::new(app));

    // Spawn timer tick thread
    let (tx, rx) = mpsc::channel();
    {
        let app = Arc::clone(&app);
        let hub = Arc::clone(&hub);
        thread::spawn(move || timer::run_timer_loop(app, hub, tx));
    }

    let pomotask = Pomotask::new(Arc::clone(&app), hub, rx);
    for event in recovered {
        pomotask.handle_completion(event);
    }

    println!("commands: start pause reset skip focus short long add <name> delete <n> toggle <n> select <n>|none tasks sound notify auto clear quit");
    if let Some(status) = pomotask.current_status() {
        pomotask.show_status(&status);
    }

    let (input_tx, inputs) = mpsc::channel();
    install_interrupt_handler(input_tx.clone());
    spawn_stdin_reader(input_tx);
    loop {
        pomotask.process_timer_messages();

        match inputs.recv_timeout(Duration::from_millis(100)) {
            Ok(input) => {
                if !pomotask.process_input(input) {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    pomotask.shutdown();
    println!();
    Ok(())
}
