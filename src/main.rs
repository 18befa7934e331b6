use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use rand::seq::SliceRandom;
use rand::Rng;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use leximon_live::api::SessionBackend;
use leximon_live::config::RoomConfig;
use leximon_live::hub::LocalHub;
use leximon_live::room::{JoinParams, RoomEvent, SessionRoom};
use leximon_live::types::{Choice, GameType, Participant, Question, Role, UserId};

const STUDENT_NAMES: [&str; 8] = [
    "Ana", "Bruno", "Carla", "Diego", "Elena", "Felix", "Greta", "Hugo",
];

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "leximon_live=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let student_count: usize = std::env::var("SIM_STUDENTS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(4);
    let beat: Duration = Duration::from_millis(
        std::env::var("SIM_QUESTION_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1200),
    );

    tracing::info!(students = student_count, "starting classroom simulation");

    let hub = Arc::new(LocalHub::new());
    let activity_id = 7001;
    let questions = demo_quiz();
    let question_total = questions.len();

    let teacher = Participant {
        user_id: "prof".to_string(),
        display_name: "Prof. Lima".to_string(),
        role: Role::Teacher,
    };
    hub.open_activity(activity_id, teacher.clone(), questions.clone())
        .await
        .unwrap();

    let mut names: HashMap<UserId, String> = HashMap::new();
    names.insert(teacher.user_id.clone(), teacher.display_name.clone());

    // Students join first so everyone's roster is complete before the
    // session starts.
    let mut students = Vec::new();
    for i in 0..student_count {
        let base = STUDENT_NAMES[i % STUDENT_NAMES.len()];
        let display_name = if i < STUDENT_NAMES.len() {
            base.to_string()
        } else {
            format!("{} {}", base, i / STUDENT_NAMES.len() + 1)
        };
        let participant = Participant {
            user_id: format!("s{:02}", i + 1),
            display_name,
            role: Role::Student,
        };
        names.insert(participant.user_id.clone(), participant.display_name.clone());
        students.push(participant);
    }

    let mut tasks = Vec::new();
    for student in students {
        let roster = hub.join(activity_id, student.clone()).await.unwrap();
        let (room, events) = SessionRoom::new(
            JoinParams {
                activity_id,
                me: student,
                roster,
                questions: questions.clone(),
                start_index: None,
            },
            hub.clone(),
            hub.clone(),
            RoomConfig::from_env(),
        );
        room.connect().await.unwrap();
        tasks.push(tokio::spawn(play_student(room, events)));
    }

    let roster = hub.join(activity_id, teacher.clone()).await.unwrap();
    let (teacher_room, mut teacher_events) = SessionRoom::new(
        JoinParams {
            activity_id,
            me: teacher,
            roster,
            questions,
            start_index: None,
        },
        hub.clone(),
        hub.clone(),
        RoomConfig::from_env(),
    );
    teacher_room.connect().await.unwrap();
    tokio::spawn(async move {
        while let Some(event) = teacher_events.recv().await {
            if let RoomEvent::LeaderboardUpdated { standings } = event {
                tracing::debug!(rows = standings.len(), "teacher leaderboard refreshed");
            }
        }
    });

    for question_index in 0..question_total {
        tokio::time::sleep(beat).await;
        tracing::info!(question_index, "teacher advances");
        teacher_room
            .advance_to_question(question_index)
            .await
            .unwrap();
    }
    tokio::time::sleep(beat).await;
    teacher_room.finish_quiz().await.unwrap();

    join_all(tasks).await;
    // let the fire-and-forget submissions land
    tokio::time::sleep(Duration::from_millis(300)).await;

    let mut rows = hub.fetch_leaderboard(activity_id).await.unwrap();
    rows.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.user_id.cmp(&b.user_id)));
    tracing::info!("final standings");
    for (place, row) in rows.iter().enumerate() {
        let name = names
            .get(&row.user_id)
            .map(String::as_str)
            .unwrap_or(row.user_id.as_str());
        tracing::info!("  {}. {} - {} pts", place + 1, name, row.score);
    }

    teacher_room.disconnect().await;
}

/// One simulated student: wait for each question, think for a moment,
/// answer with plausible mistakes, stop when the quiz ends.
async fn play_student(room: SessionRoom, mut events: mpsc::Receiver<RoomEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            RoomEvent::QuestionChanged { question_index } => {
                let Some(question) = room.current_question().await else {
                    continue;
                };
                let think = Duration::from_millis(rand::rng().random_range(100..400));
                tokio::time::sleep(think).await;
                answer(&room, &question).await;
                tracing::debug!(
                    user = %room.participant().user_id,
                    question_index,
                    "answered"
                );
            }
            RoomEvent::QuizFinished => break,
            RoomEvent::ConnectionLost { reason } => {
                tracing::warn!(
                    user = %room.participant().user_id,
                    reason,
                    "student dropped"
                );
                break;
            }
            _ => {}
        }
    }
    room.disconnect().await;
}

async fn answer(room: &SessionRoom, question: &Question) {
    match question.game_type {
        GameType::OrderedPhrase => {
            let mut sequence: Vec<_> = {
                let mut parts: Vec<&Choice> = question
                    .choices
                    .iter()
                    .filter(|c| c.order.is_some())
                    .collect();
                parts.sort_by_key(|c| c.order);
                parts.iter().map(|c| c.choice_id).collect()
            };
            // some students scramble the phrase
            if rand::rng().random_bool(0.4) {
                sequence.shuffle(&mut rand::rng());
            }
            for choice_id in sequence {
                if let Err(e) = room.select_choice(choice_id).await {
                    tracing::warn!(error = %e, "tap rejected");
                    return;
                }
                let pause = Duration::from_millis(rand::rng().random_range(30..120));
                tokio::time::sleep(pause).await;
            }
        }
        _ => {
            let index = rand::rng().random_range(0..question.choices.len());
            let choice_id = question.choices[index].choice_id;
            if let Err(e) = room.select_choice(choice_id).await {
                tracing::warn!(error = %e, "tap rejected");
            }
        }
    }
}

fn demo_quiz() -> Vec<Question> {
    vec![
        Question {
            question_id: 1,
            game_type: GameType::WordChoice,
            prompt: "Which word means 'dog'?".to_string(),
            choices: vec![
                Choice { choice_id: 11, text: "el perro".to_string(), correct: true, order: None },
                Choice { choice_id: 12, text: "el gato".to_string(), correct: false, order: None },
                Choice { choice_id: 13, text: "el pan".to_string(), correct: false, order: None },
            ],
        },
        Question {
            question_id: 2,
            game_type: GameType::PictureChoice,
            prompt: "Which picture shows 'la manzana'?".to_string(),
            choices: vec![
                Choice { choice_id: 21, text: "apple.png".to_string(), correct: true, order: None },
                Choice { choice_id: 22, text: "bread.png".to_string(), correct: false, order: None },
                Choice { choice_id: 23, text: "cheese.png".to_string(), correct: false, order: None },
            ],
        },
        Question {
            question_id: 3,
            game_type: GameType::OrderedPhrase,
            prompt: "Translate: the dog runs".to_string(),
            choices: vec![
                Choice { choice_id: 31, text: "el".to_string(), correct: true, order: Some(1) },
                Choice { choice_id: 32, text: "perro".to_string(), correct: true, order: Some(2) },
                Choice { choice_id: 33, text: "corre".to_string(), correct: true, order: Some(3) },
                Choice { choice_id: 34, text: "gato".to_string(), correct: false, order: None },
            ],
        },
    ]
}
