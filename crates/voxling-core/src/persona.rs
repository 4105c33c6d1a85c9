//! Companion persona — system prompt, emotion tag parsing, avatar images.
//!
//! The language model is instructed to end every reply with an
//! `[emotion-marker:N]` tag (N in 1–6). The tag is stripped before the
//! reply reaches the user; the value drives the avatar's expression.

/// Neutral / calm — the default when no tag is present.
pub const EMOTION_NEUTRAL: u8 = 3;

/// Worried / negative — forced when the dialogue stage fails.
pub const EMOTION_WORRIED: u8 = 2;

pub const WELCOME_MESSAGE: &str =
    "Hi, I'm Voxling! Talk to me or type a message and I'll answer out loud.";

/// Degraded reply used when the dialogue upstream fails or times out.
pub const APOLOGY_REPLY: &str =
    "Sorry, I'm having a little trouble right now. Please try again in a moment.";

/// Status note for an audio turn whose transcript came back empty.
pub const NO_SPEECH_STATUS: &str = "No speech was recognized, so no reply was generated.";

const TAG_PREFIX: &str = "[emotion-marker:";

/// Build the system prompt, honoring a full override when configured.
pub fn system_prompt(custom: Option<&str>) -> String {
    if let Some(prompt) = custom {
        return prompt.to_string();
    }

    concat!(
        "You are Voxling, a small, kind, slightly shy fox-spirit voice companion. ",
        "Keep replies warm, conversational, and under 50 words — they will be spoken aloud. ",
        "Stay curious about whatever the user brings up.\n\n",
        "Important: end every reply with an emotion tag of the form [emotion-marker:N] ",
        "where N is a digit from 1 to 6: 1=very sad, 2=worried, 3=calm/neutral, ",
        "4=happy, 5=excited, 6=ecstatic. Pick the value that matches your reply.",
    )
    .to_string()
}

/// Extract the emotion tag from a model reply.
///
/// Returns the reply with every well-formed tag removed, and the value of
/// the first tag found (clamped to 1–6). A reply without a tag comes back
/// unchanged with [`EMOTION_NEUTRAL`].
pub fn parse_emotion_tag(reply: &str) -> (String, u8) {
    let mut emotion = None;
    let mut clean = String::with_capacity(reply.len());
    let mut rest = reply;

    while let Some(start) = rest.find(TAG_PREFIX) {
        let after = &rest[start + TAG_PREFIX.len()..];
        let mut chars = after.chars();
        match (chars.next(), chars.next()) {
            (Some(digit @ '0'..='9'), Some(']')) => {
                clean.push_str(&rest[..start]);
                if emotion.is_none() {
                    let value = digit as u8 - b'0';
                    emotion = Some(if (1..=6).contains(&value) {
                        value
                    } else {
                        EMOTION_NEUTRAL
                    });
                }
                rest = &after[2..];
            }
            _ => {
                // Not a well-formed tag; keep the text and move past it
                clean.push_str(&rest[..start + TAG_PREFIX.len()]);
                rest = after;
            }
        }
    }
    clean.push_str(rest);

    (clean.trim().to_string(), emotion.unwrap_or(EMOTION_NEUTRAL))
}

/// Avatar image for an emotion value. Out-of-range values render the
/// neutral expression.
pub fn emotion_image_path(value: u8) -> String {
    let value = if (1..=6).contains(&value) {
        value
    } else {
        EMOTION_NEUTRAL
    };
    format!("/api/emotion/{value}.jpg")
}
