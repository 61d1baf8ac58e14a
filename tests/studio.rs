//! Orchestration of generation and improvement through the studio

mod common;

use common::{FakeSurface, Reply, ScriptedTransport};
use snippet_studio::transcript::GREETING;
use snippet_studio::{
    Author, EntryContent, EntryState, Error, LoopState, SessionKind, Snippet, Studio,
    StudioConfig, SubmitOutcome, TranscriptEvent,
};

fn button() -> Snippet {
    Snippet::new("<button>Click</button>", "button{color:red}", "")
}

fn studio_with(replies: Vec<Reply>) -> Studio {
    Studio::new(ScriptedTransport::new(replies), StudioConfig::default())
}

#[tokio::test]
async fn starts_with_placeholder_and_greeting() {
    let studio = studio_with(vec![]);
    assert_eq!(studio.snippet(), &Snippet::placeholder());
    assert_eq!(studio.transcript().len(), 1);
    assert_eq!(
        studio.transcript().entries()[0].content,
        EntryContent::text(GREETING)
    );
    assert!(!studio.settings().auto_improve);
    assert_eq!(studio.settings().steps.get(), 3);
}

#[tokio::test]
async fn submit_replaces_snippet_and_presents_it() {
    let mut studio = studio_with(vec![Reply::ok(&button(), "A red button.")]);
    let surface = FakeSurface::ready();
    studio.attach_surface(Box::new(surface.clone()));

    let outcome = studio.submit("  a red button ").await;
    assert!(matches!(outcome, SubmitOutcome::Generated { improvement: None }));
    assert_eq!(studio.snippet(), &button());

    let entries = studio.transcript().entries();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[1].author, Author::User);
    assert_eq!(entries[1].content, EntryContent::text("a red button"));
    assert_eq!(entries[2].content, EntryContent::text("A red button."));
    assert_eq!(entries[2].state, EntryState::Final);

    let presented = surface.presented();
    assert_eq!(presented.len(), 1);
    assert!(presented[0].contains("<button>Click</button>"));
    assert!(!studio.gate().is_busy());
}

#[tokio::test]
async fn busy_studio_rejects_without_recording() {
    let mut studio = studio_with(vec![Reply::ok(&button(), "Unused.")]);
    let gate = studio.gate();
    let token = gate.try_acquire(SessionKind::Improving).unwrap();

    let outcome = studio.submit("a red button").await;
    assert!(matches!(
        outcome,
        SubmitOutcome::Rejected {
            busy: SessionKind::Improving
        }
    ));
    assert_eq!(studio.transcript().len(), 1);
    assert_eq!(studio.snippet(), &Snippet::placeholder());
    assert!(matches!(
        studio.improve().await,
        Err(Error::Busy(SessionKind::Improving))
    ));

    drop(token);
    assert!(matches!(
        studio.submit("a red button").await,
        SubmitOutcome::Generated { .. }
    ));
}

#[tokio::test]
async fn transport_failure_is_narrated_generically() {
    let mut studio = studio_with(vec![Reply::Refuse(Error::Transport("status 500: boom".into()))]);

    let outcome = studio.submit("a card").await;
    assert!(matches!(outcome, SubmitOutcome::Failed(Error::Transport(_))));

    let last = studio.transcript().last().unwrap();
    assert_eq!(
        last.content,
        EntryContent::text("Sorry, I encountered an error. Please try again.")
    );
    assert_eq!(last.state, EntryState::Final);
    assert!(studio.transcript().stream_target().is_none());
    assert_eq!(studio.snippet(), &Snippet::placeholder());
    assert!(!studio.gate().is_busy());
}

#[tokio::test]
async fn missing_credential_names_the_variable() {
    let mut studio = studio_with(vec![Reply::Refuse(Error::missing_credential())]);

    studio.submit("a card").await;
    let last = studio.transcript().last().unwrap();
    assert!(last.content.describe().contains("API_KEY"));
}

#[tokio::test]
async fn unreadable_generation_keeps_placeholder() {
    let mut studio = studio_with(vec![Reply::raw("Sure! Here is a lovely red button for you.")]);
    let surface = FakeSurface::ready();
    studio.attach_surface(Box::new(surface.clone()));

    let outcome = studio.submit("a red button").await;
    assert!(matches!(outcome, SubmitOutcome::Failed(Error::Parsing { .. })));

    let last = studio.transcript().last().unwrap();
    assert_eq!(
        last.content,
        EntryContent::text("Sorry, the model sent back a response I couldn't read. Please try again.")
    );
    assert_eq!(last.state, EntryState::Final);
    assert_eq!(studio.transcript().len(), 3);
    assert_eq!(studio.snippet(), &Snippet::placeholder());
    assert!(surface.presented().is_empty());
    assert!(!studio.gate().is_busy());
}

#[tokio::test]
async fn empty_prompt_is_ignored() {
    let mut studio = studio_with(vec![]);
    assert!(matches!(
        studio.submit("   ").await,
        SubmitOutcome::Failed(Error::InvalidSetting(_))
    ));
    assert_eq!(studio.transcript().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn auto_improve_runs_after_generation() {
    let improved = Snippet::new("<button>Click</button>", "button{color:red;padding:8px}", "");
    let polished = Snippet::new("<button>Click</button>", "button{color:red;padding:12px}", "");
    let mut studio = studio_with(vec![
        Reply::ok(&button(), "A red button."),
        Reply::ok(&improved, "Added padding."),
        Reply::ok(&polished, "More padding."),
    ]);
    let surface = FakeSurface::ready();
    studio.attach_surface(Box::new(surface.clone()));
    studio.set_auto_improve(true);
    studio.set_steps(2).unwrap();

    let report = match studio.submit("a red button").await {
        SubmitOutcome::Generated {
            improvement: Some(report),
        } => report,
        other => panic!("expected an improvement report, got {:?}", other),
    };

    assert_eq!(report.state, LoopState::Completed);
    assert_eq!(report.completed, 2);
    assert_eq!(studio.snippet(), &polished);
    // generated snippet, one render per step, then the final result
    let presented = surface.presented();
    assert_eq!(presented.len(), 4);
    assert!(presented[3].contains("padding:12px"));
    assert_eq!(
        studio.transcript().last().unwrap().content.describe(),
        "Auto-improvement complete! I made 2 of 2 planned enhancements."
    );
    assert!(!studio.gate().is_busy());
}

#[tokio::test(start_paused = true)]
async fn improve_without_surface_reports_environment_failure() {
    let mut studio = studio_with(vec![]);
    let report = studio.improve().await.unwrap();

    assert_eq!(report.state, LoopState::Failed { step: 1 });
    let entries = studio.transcript().entries();
    assert_eq!(
        entries[entries.len() - 2].content.describe(),
        "Sorry, an error occurred during improvement step 1: Render surface is not available for screenshot."
    );
    assert!(!studio.gate().is_busy());
}

#[tokio::test(start_paused = true)]
async fn loaded_snippet_is_rendered_before_capture() {
    let mut studio = studio_with(vec![Reply::ok(&button(), "Tidied.")]);
    let surface = FakeSurface::ready();
    surface.watch_gate(studio.gate());
    studio.attach_surface(Box::new(surface.clone()));
    studio.set_steps(1).unwrap();

    studio.load_snippet(Snippet::new("<p>saved</p>", "", "")).await.unwrap();
    let report = studio.improve().await.unwrap();

    assert_eq!(report.completed, 1);
    let presented = surface.presented();
    assert_eq!(presented.len(), 3);
    assert!(presented[0].contains("<p>saved</p>"));
    assert!(presented[1].contains("<p>saved</p>"));
    assert!(presented[2].contains("<button>Click</button>"));
    assert_eq!(
        surface.gate_holders(),
        vec![
            Some(SessionKind::Loading),
            Some(SessionKind::Improving),
            Some(SessionKind::Improving),
        ]
    );
}

#[tokio::test]
async fn loading_twice_shows_the_snippet_once() {
    let mut studio = studio_with(vec![]);
    let surface = FakeSurface::ready();
    studio.attach_surface(Box::new(surface.clone()));

    let saved = Snippet::new("<p>saved</p>", "", "");
    studio.load_snippet(saved.clone()).await.unwrap();
    studio.load_snippet(saved).await.unwrap();

    assert_eq!(surface.presented().len(), 1);
    assert!(!studio.gate().is_busy());
}

#[test]
fn step_setting_is_bounded() {
    let mut studio = studio_with(vec![]);
    assert!(matches!(studio.set_steps(0), Err(Error::InvalidSetting(_))));
    assert!(studio.set_steps(6).is_err());
    studio.set_steps(5).unwrap();
    assert_eq!(studio.settings().steps.get(), 5);
}

#[tokio::test]
async fn observer_sees_streamed_chunks() {
    let mut studio = studio_with(vec![Reply::ok(&button(), "A red button.")]);
    let mut rx = studio.subscribe();

    studio.submit("a red button").await;

    let mut streamed = String::new();
    let mut appended = 0;
    while let Ok(event) = rx.try_recv() {
        match event {
            TranscriptEvent::Appended { .. } => appended += 1,
            TranscriptEvent::Chunk { text, .. } => streamed.push_str(&text),
            TranscriptEvent::Replaced { .. } => {}
        }
    }
    assert_eq!(appended, 2);
    assert_eq!(streamed, "A red button.");
}
