//! What one recorded turn hands to the dialogue model, and the running
//! records kept across turns.

use crate::audio::wav_to_base64;
use crate::biometrics::{BiometricSignals, Reaction};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Text shown for the player's turn until the model returns a transcription.
pub const TRANSMITTING_PLACEHOLDER: &str = "[Transmitting...]";

const TURN_INSTRUCTION: &str =
    "Listen to this audio from the negotiator and respond in character.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Negotiator,
    Suspect,
}

impl Role {
    /// Chat role used when replaying history to the model.
    pub fn model_role(self) -> &'static str {
        match self {
            Role::Negotiator => "user",
            Role::Suspect => "assistant",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Role::Negotiator => "NEGOTIATOR",
            Role::Suspect => "SUSPECT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub role: Role,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub biometrics: Option<BiometricSignals>,
    /// Wall clock, milliseconds since the Unix epoch.
    pub timestamp: u64,
}

/// History entry as sent to the model: role and text only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub text: String,
}

impl From<&ConversationEntry> for HistoryEntry {
    fn from(entry: &ConversationEntry) -> Self {
        Self {
            role: entry.role,
            text: entry.text.clone(),
        }
    }
}

/// Audio payload, final signals, and prior history for one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnSubmission {
    pub audio_wav: Vec<u8>,
    pub biometrics: BiometricSignals,
    pub history: Vec<HistoryEntry>,
}

impl TurnSubmission {
    pub fn annotation(&self) -> String {
        self.biometrics.annotation()
    }

    /// Text part of the user message that accompanies the audio.
    pub fn prompt_text(&self) -> String {
        format!("{TURN_INSTRUCTION}\n\n{}", self.annotation())
    }

    pub fn audio_base64(&self) -> String {
        wav_to_base64(&self.audio_wav)
    }

    /// Chat messages in model order: history first, then the current turn.
    pub fn messages(&self) -> Value {
        let mut messages: Vec<Value> = self
            .history
            .iter()
            .map(|entry| json!({ "role": entry.role.model_role(), "content": entry.text }))
            .collect();
        messages.push(json!({
            "role": "user",
            "content": [
                { "type": "text", "text": self.prompt_text() },
                { "type": "file", "mediaType": "audio/wav", "data": self.audio_base64() },
            ],
        }));
        Value::Array(messages)
    }

    /// Flat form with `audio`, `biometrics`, and `history` fields.
    pub fn to_json(&self) -> Value {
        json!({
            "audio": self.audio_base64(),
            "mediaType": "audio/wav",
            "biometrics": self.biometrics,
            "history": self.history,
        })
    }
}

/// Result of stopping a turn. An empty capture is not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    NothingToSend { signals: BiometricSignals },
    Submit(TurnSubmission),
}

impl TurnOutcome {
    pub fn submission(&self) -> Option<&TurnSubmission> {
        match self {
            TurnOutcome::Submit(submission) => Some(submission),
            TurnOutcome::NothingToSend { .. } => None,
        }
    }
}

/// Signals logged once per submitted turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BiometricHistory {
    readings: Vec<BiometricSignals>,
}

impl BiometricHistory {
    pub fn push(&mut self, reading: BiometricSignals) {
        self.readings.push(reading);
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn readings(&self) -> &[BiometricSignals] {
        &self.readings
    }

    pub fn average(&self, reaction: Reaction) -> Option<f32> {
        if self.readings.is_empty() {
            return None;
        }
        let sum: f32 = self.readings.iter().map(|r| r.score(reaction)).sum();
        Some(sum / self.readings.len() as f32)
    }

    /// Two decimals, or `N/A` before any turn.
    pub fn formatted_average(&self, reaction: Reaction) -> String {
        self.average(reaction)
            .map(|avg| format!("{avg:.2}"))
            .unwrap_or_else(|| "N/A".to_string())
    }

    /// End-of-session summary block for the debrief.
    pub fn summary(&self) -> String {
        let mut out = format!("Total turns: {}", self.len());
        for (reaction, label) in [
            (Reaction::Yelling, "Yelling"),
            (Reaction::Whispering, "Whispering"),
            (Reaction::Stammering, "Stammering"),
            (Reaction::Hesitating, "Hesitation"),
        ] {
            out.push_str(&format!(
                "\nAverage {label}: {}",
                self.formatted_average(reaction)
            ));
        }
        out
    }
}

/// Numbered transcript with per-turn voice readings, for the debrief.
pub fn transcript(entries: &[ConversationEntry]) -> String {
    entries
        .iter()
        .enumerate()
        .map(|(idx, entry)| {
            let voice = entry
                .biometrics
                .map(|b| {
                    format!(
                        " [Voice: Yell={:.2}, Whisper={:.2}, Stammer={:.2}, Hesitate={:.2}]",
                        b.yelling, b.whispering, b.stammering, b.hesitating
                    )
                })
                .unwrap_or_default();
            format!(
                "[Turn {}] {}: {}{voice}",
                idx + 1,
                entry.role.label(),
                entry.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(yelling: f32, hesitating: f32) -> BiometricSignals {
        BiometricSignals {
            yelling,
            whispering: 0.0,
            stammering: 0.0,
            hesitating,
        }
    }

    #[test]
    fn summary_reports_na_before_any_turn() {
        let history = BiometricHistory::default();
        assert_eq!(
            history.summary(),
            "Total turns: 0\nAverage Yelling: N/A\nAverage Whispering: N/A\nAverage Stammering: N/A\nAverage Hesitation: N/A"
        );
    }

    #[test]
    fn averages_use_two_decimals() {
        let mut history = BiometricHistory::default();
        history.push(signals(1.0, 0.2));
        history.push(signals(0.0, 0.25));
        assert_eq!(history.formatted_average(Reaction::Yelling), "0.50");
        assert_eq!(history.formatted_average(Reaction::Hesitating), "0.23");
        assert!(history.summary().starts_with("Total turns: 2\n"));
    }

    #[test]
    fn history_maps_roles_for_the_model() {
        let submission = TurnSubmission {
            audio_wav: vec![0u8; 44],
            biometrics: BiometricSignals::default(),
            history: vec![
                HistoryEntry {
                    role: Role::Suspect,
                    text: "Who is this?".into(),
                },
                HistoryEntry {
                    role: Role::Negotiator,
                    text: "Let's talk.".into(),
                },
            ],
        };
        let messages = submission.messages();
        let messages = messages.as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"], "assistant");
        assert_eq!(messages[1]["role"], "user");
        let content = &messages[2]["content"];
        assert!(content[0]["text"]
            .as_str()
            .unwrap()
            .ends_with("[BIOMETRICS: Yelling=0.00, Whispering=0.00, Stammering=0.00, Hesitating=0.00]"));
        assert_eq!(content[1]["mediaType"], "audio/wav");
    }

    #[test]
    fn submission_json_has_expected_shape() {
        let submission = TurnSubmission {
            audio_wav: b"RIFF".to_vec(),
            biometrics: signals(0.5, 0.0),
            history: vec![HistoryEntry {
                role: Role::Negotiator,
                text: "hi".into(),
            }],
        };
        let value = submission.to_json();
        assert_eq!(value["audio"], "UklGRg==");
        assert_eq!(value["biometrics"]["yelling"], 0.5);
        assert_eq!(value["history"][0]["role"], "negotiator");
    }

    #[test]
    fn transcript_marks_negotiator_turns_with_voice_readings() {
        let entries = vec![
            ConversationEntry {
                role: Role::Suspect,
                text: "Talk.".into(),
                biometrics: None,
                timestamp: 1,
            },
            ConversationEntry {
                role: Role::Negotiator,
                text: "Easy now.".into(),
                biometrics: Some(signals(0.1, 0.0)),
                timestamp: 2,
            },
        ];
        assert_eq!(
            transcript(&entries),
            "[Turn 1] SUSPECT: Talk.\n\n[Turn 2] NEGOTIATOR: Easy now. [Voice: Yell=0.10, Whisper=0.00, Stammer=0.00, Hesitate=0.00]"
        );
    }

    #[test]
    fn conversation_entry_omits_missing_biometrics() {
        let entry = ConversationEntry {
            role: Role::Suspect,
            text: "...".into(),
            biometrics: None,
            timestamp: 0,
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(!json.contains("biometrics"));
    }
}
