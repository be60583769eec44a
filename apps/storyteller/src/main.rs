use std::{future::Future, path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::Parser;
use client_core::{
    controller::OperationOutcome, load_settings, load_settings_from, ContinuationPolicy,
    FailureKind, HttpStoryBackend, LibraryView, SessionError, SessionSnapshot, StoryBackend,
    StoryController, StoryLibrary,
};
use shared::{
    domain::{StoryForm, GENRE_CATALOGUE, PAGE_COUNT_CHOICES},
    protocol::SavedStoryRecord,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{Command, HELP};

#[derive(Parser, Debug)]
#[command(about = "Compose multi-part stories with a story generation backend")]
struct Args {
    /// Overrides the backend URL from settings.
    #[arg(long)]
    backend_url: Option<String>,
    /// Settings file to read instead of ./storyteller.toml.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Resend the whole story with every continuation.
    #[arg(long)]
    full_context: bool,
}

struct App {
    backend: Arc<dyn StoryBackend>,
    policy: ContinuationPolicy,
    controller: Arc<StoryController>,
    library: StoryLibrary,
    form: StoryForm,
    reports: mpsc::UnboundedSender<String>,
}

impl App {
    /// Runs a session operation off the prompt loop; its result is printed
    /// when it settles.
    fn spawn_report<F>(&self, task: F)
    where
        F: Future<Output = String> + Send + 'static,
    {
        let reports = self.reports.clone();
        tokio::spawn(async move {
            let _ = reports.send(task.await);
        });
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Set { entry, value } => entry.apply(&mut self.form, value),
            Command::Form => println!("{}", render_form(&self.form)),
            Command::Start => {
                let controller = Arc::clone(&self.controller);
                let form = self.form.clone();
                self.spawn_report(async move { render_segment(controller.start(&form).await) });
            }
            Command::Input(text) => {
                if let Err(err) = self.controller.set_pending_input(text).await {
                    println!("{}", describe_error(&err));
                }
            }
            Command::Continue(text) => {
                let controller = Arc::clone(&self.controller);
                self.spawn_report(async move {
                    let result = match text {
                        Some(text) => controller.continue_story(text).await,
                        None => controller.continue_pending().await,
                    };
                    render_segment(result)
                });
            }
            Command::Save => {
                let controller = Arc::clone(&self.controller);
                self.spawn_report(async move {
                    match controller.save().await {
                        Ok(receipt) => match receipt.story_id {
                            Some(story_id) => format!("Story saved as #{story_id}."),
                            None => "Story saved.".to_string(),
                        },
                        Err(err) => describe_error(&err),
                    }
                });
            }
            Command::Retry => {
                let controller = Arc::clone(&self.controller);
                self.spawn_report(async move {
                    match controller.retry().await {
                        Ok(OperationOutcome::Segment(segment)) => format!("\n{segment}\n"),
                        Ok(OperationOutcome::Saved(_)) => "Story saved.".to_string(),
                        Err(err) => describe_error(&err),
                    }
                });
            }
            Command::Dismiss => match self.controller.dismiss_error().await {
                Ok(phase) => println!("Back to {phase:?}."),
                Err(err) => println!("{}", describe_error(&err)),
            },
            Command::Show => println!("{}", render_session(&self.controller.snapshot().await)),
            Command::List => {
                let view = self.library.refresh().await;
                println!("{}", render_library(view));
            }
            Command::View(story_id) => match self.library.detail(story_id).await {
                Ok(record) => println!("{}", render_record(&record)),
                Err(err) => println!("Could not load story: {err}"),
            },
            Command::Delete(story_id) => match self.library.delete(story_id).await {
                Ok(()) => println!("{}", render_library(self.library.view())),
                Err(err) => println!("Could not delete story {story_id}: {err}"),
            },
            Command::New => {
                self.controller.close().await;
                self.controller = StoryController::new(Arc::clone(&self.backend), self.policy);
                println!("Started a fresh session; the form was kept.");
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => {}
        }
    }
}

fn render_segment(result: Result<String, SessionError>) -> String {
    match result {
        Ok(segment) => format!("\n{segment}\n"),
        Err(err) => describe_error(&err),
    }
}

fn describe_error(err: &SessionError) -> String {
    match err {
        SessionError::Request(request) => match request.kind() {
            FailureKind::Transport => {
                format!("Backend unreachable ({request}); type `retry` to try again.")
            }
            FailureKind::Backend => format!(
                "Backend rejected the request ({request}); retrying unchanged may fail again."
            ),
            FailureKind::Decode => format!("Backend sent an unreadable reply ({request})."),
        },
        SessionError::Validation(err) => format!("Fix the form first: {err}."),
        other if other.is_rejection() => format!("Not sent: {other}."),
        other => format!("{other}."),
    }
}

fn render_form(form: &StoryForm) -> String {
    format!(
        "genre:   {}\nage:     {}\nchoices: {}\npages:   {}\nseed:    {}\n(genres: {}; pages {}-{})",
        form.genre,
        form.age,
        form.choice_count,
        form.page_count,
        form.seed_text,
        GENRE_CATALOGUE.join(", "),
        PAGE_COUNT_CHOICES.start(),
        PAGE_COUNT_CHOICES.end(),
    )
}

fn render_session(snapshot: &SessionSnapshot) -> String {
    let mut out = format!("[{:?}]", snapshot.phase);
    if let Some(params) = &snapshot.parameters {
        out.push_str(&format!(
            " {} for age {}, {} choices, {} pages",
            params.genre, params.target_age, params.choice_count, params.page_count
        ));
    }
    if !snapshot.segments.is_empty() {
        out.push_str(&format!("\n\n{}\n", snapshot.full_text()));
    }
    if !snapshot.pending_input.is_empty() {
        out.push_str(&format!("\nnext input: {}", snapshot.pending_input));
    }
    if let Some(err) = &snapshot.last_error {
        out.push_str(&format!("\nlast error: {}", describe_error(err)));
    }
    out
}

fn render_library(view: &LibraryView) -> String {
    match view {
        LibraryView::Loading => "Loading saved stories...".to_string(),
        LibraryView::Failed(message) => format!("Could not load saved stories: {message}"),
        LibraryView::Loaded(records) if records.is_empty() => "No saved stories.".to_string(),
        LibraryView::Loaded(records) => records
            .iter()
            .map(|record| {
                let preview: String = record.content.chars().take(48).collect();
                format!(
                    "#{:<4} {:<16} age {:<3} choices {:<2} segments {:<2} {preview}",
                    record.story_id.0,
                    record.genre,
                    record.age,
                    record.choice_count,
                    record.segment_count
                )
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn render_record(record: &SavedStoryRecord) -> String {
    let created = record
        .created_at
        .map(|at| format!(", saved {}", at.format("%Y-%m-%d %H:%M")))
        .unwrap_or_default();
    format!(
        "Story #{} ({}, age {}{created})\n\n{}",
        record.story_id, record.genre, record.age, record.content
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = match &args.config {
        Some(path) => load_settings_from(path),
        None => load_settings(),
    };
    if let Some(url) = args.backend_url {
        settings.backend_url = url;
    }
    if args.full_context {
        settings.continuation_policy = ContinuationPolicy::FullContext;
    }
    info!(
        backend_url = %settings.backend_url,
        policy = %settings.continuation_policy,
        "storyteller ready"
    );

    let backend: Arc<dyn StoryBackend> = Arc::new(HttpStoryBackend::new(&settings)?);
    let (reports, mut report_rx) = mpsc::unbounded_channel();
    let mut app = App {
        controller: StoryController::new(Arc::clone(&backend), settings.continuation_policy),
        library: StoryLibrary::new(Arc::clone(&backend)),
        backend,
        policy: settings.continuation_policy,
        form: StoryForm::default(),
        reports,
    };

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            Some(report) = report_rx.recv() => println!("{report}"),
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match commands::parse(&line) {
                    Ok(None) => {}
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(command)) => app.handle(command).await,
                    Err(err) => println!("{err}"),
                }
            }
        }
    }

    app.controller.close().await;
    Ok(())
}
