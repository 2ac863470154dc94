//! Transcript formatting properties: header, speaker grouping, positional
//! name mapping, fallbacks and the end marker.

use chrono::Utc;
use roomcast::meeting::model::{Meeting, Participant, ParticipantRole};
use roomcast::transcription::pipeline::{format_transcript, plain_transcript};
use roomcast::transcription::Utterance;

fn meeting(title: &str, participant_names: &[&str]) -> Meeting {
    let mut meeting = Meeting::new(
        title.to_string(),
        "owner-1".to_string(),
        None,
        60,
        50,
        true,
    );
    for name in participant_names {
        meeting.participants.push(Participant {
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            role: ParticipantRole::Participant,
            joined_at: Utc::now(),
            left_at: None,
            is_active: true,
        });
    }
    meeting
}

fn utterance(speaker: &str, text: &str, start: f64) -> Utterance {
    Utterance {
        speaker: speaker.to_string(),
        text: text.to_string(),
        start,
        end: start + 1.0,
    }
}

#[test]
fn interleaved_conversation_groups_by_speaker_runs() {
    let meeting = meeting("Planning", &["Ada", "Grace"]);
    let utterances = vec![
        utterance("A", "Let's review the roadmap.", 0.0),
        utterance("A", "Starting with Q3.", 2.0),
        utterance("B", "Sounds good.", 4.0),
        utterance("A", "Great.", 5.0),
    ];

    let formatted = format_transcript(&meeting, &utterances);

    // Two A-runs around one B-run, in order.
    let ada_first = formatted.text.find("Ada:\nLet's review the roadmap. Starting with Q3.");
    let grace = formatted.text.find("Grace:\nSounds good.");
    let ada_second = formatted.text.find("Ada:\nGreat.");
    assert!(ada_first.is_some());
    assert!(grace.is_some());
    assert!(ada_second.is_some());
    assert!(ada_first < grace && grace < ada_second);
}

#[test]
fn speakers_map_positionally_with_fallback_names() {
    let meeting = meeting("Standup", &["Ada"]);
    let utterances = vec![
        utterance("B", "I spoke first.", 0.0),
        utterance("A", "I spoke second.", 1.0),
        utterance("C", "I spoke third.", 2.0),
    ];

    let formatted = format_transcript(&meeting, &utterances);

    // Order of first appearance, not label order: B, A, C.
    assert_eq!(formatted.speakers, vec!["B", "A", "C"]);
    assert_eq!(formatted.mapping.get("B").unwrap(), "Ada");
    assert_eq!(formatted.mapping.get("A").unwrap(), "Participant 2");
    assert_eq!(formatted.mapping.get("C").unwrap(), "Participant 3");
}

#[test]
fn header_and_marker_frame_the_transcript() {
    let mut m = meeting("Quarterly review", &["Ada", "Grace", "Linus"]);
    m.recording.duration_seconds = Some(125);

    let formatted = format_transcript(&m, &[utterance("A", "Welcome.", 0.0)]);

    assert!(formatted.text.starts_with("Meeting Transcript\n"));
    assert!(formatted.text.contains("Meeting: Quarterly review"));
    assert!(formatted.text.contains(&format!("ID: {}", m.id)));
    assert!(formatted.text.contains("Duration: 2:05"));
    assert!(formatted.text.contains("Participants: 3"));
    assert!(formatted.text.trim_end().ends_with("--- End of Transcript ---"));
}

#[test]
fn plain_fallback_carries_body_without_speakers() {
    let m = meeting("Huddle", &["Ada"]);
    let formatted = plain_transcript(&m, "just a wall of words");

    assert!(formatted.text.contains("just a wall of words"));
    assert!(formatted.speakers.is_empty());
    assert!(formatted.mapping.is_empty());
    assert!(formatted.text.trim_end().ends_with("--- End of Transcript ---"));
}

#[test]
fn empty_utterance_list_still_produces_framed_document() {
    let m = meeting("Silence", &[]);
    let formatted = format_transcript(&m, &[]);

    assert!(formatted.text.starts_with("Meeting Transcript\n"));
    assert!(formatted.text.trim_end().ends_with("--- End of Transcript ---"));
    assert!(formatted.speakers.is_empty());
}
