//! Small-talk gate ahead of retrieval.
//!
//! Conversational filler (greetings, thanks, farewells, identity questions)
//! gets a fixed reply without touching the document store or spending a
//! model call. Anything else is academic and proceeds to retrieval.

/// Classification outcome. Small talk carries its canned reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    SmallTalk(&'static str),
    Academic,
}

const GREETINGS: &[&str] = &[
    "hello",
    "hi",
    "hey",
    "good morning",
    "good afternoon",
    "good evening",
    "greetings",
];

const THANKS: &[&str] = &["thanks", "thank you", "thank u", "appreciate it"];

const FAREWELLS: &[&str] = &["bye", "goodbye", "see you", "farewell", "good night"];

const IDENTITY: &[&str] = &[
    "who are you",
    "what are you",
    "are you a bot",
    "are you human",
    "are you real",
    "how are you",
    "what can you do",
];

pub const GREETING_REPLY: &str = "Hello! I'm the student support assistant. \
    Ask me about courses, enrollment, policies, deadlines, and other student services!";

pub const THANKS_REPLY: &str =
    "You're welcome! Feel free to ask if anything else comes up.";

pub const FAREWELL_REPLY: &str =
    "Goodbye! Good luck with your studies, and come back any time you have questions.";

pub const IDENTITY_REPLY: &str = "I'm a virtual student support assistant. I answer \
    questions based on official student documents, and I can connect you with a staff \
    member if you need more help.";

/// Classify a question. Check order is fixed: greeting, thanks, farewell,
/// identity; the first matching set wins.
pub fn classify(question: &str) -> Intent {
    let lower = question.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    if matches_any(&lower, &words, GREETINGS) {
        Intent::SmallTalk(GREETING_REPLY)
    } else if matches_any(&lower, &words, THANKS) {
        Intent::SmallTalk(THANKS_REPLY)
    } else if matches_any(&lower, &words, FAREWELLS) {
        Intent::SmallTalk(FAREWELL_REPLY)
    } else if matches_any(&lower, &words, IDENTITY) {
        Intent::SmallTalk(IDENTITY_REPLY)
    } else {
        Intent::Academic
    }
}

/// Multi-word phrases match as substrings; single words match whole words
/// only, so "hi" does not fire on "this schedule".
fn matches_any(lower: &str, words: &[&str], phrases: &[&str]) -> bool {
    phrases.iter().any(|phrase| {
        if phrase.contains(' ') {
            lower.contains(phrase)
        } else {
            words.contains(phrase)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greetings_get_the_greeting_reply() {
        for q in ["hello", "Hi!", "hey there", "Good morning"] {
            assert_eq!(classify(q), Intent::SmallTalk(GREETING_REPLY), "{q}");
        }
    }

    #[test]
    fn thanks_and_farewell_and_identity() {
        assert_eq!(classify("thanks a lot"), Intent::SmallTalk(THANKS_REPLY));
        assert_eq!(classify("ok bye"), Intent::SmallTalk(FAREWELL_REPLY));
        assert_eq!(
            classify("who are you exactly?"),
            Intent::SmallTalk(IDENTITY_REPLY)
        );
    }

    #[test]
    fn first_matching_set_wins() {
        // Contains both a greeting and a thanks phrase; greeting is checked first.
        assert_eq!(
            classify("hello and thank you"),
            Intent::SmallTalk(GREETING_REPLY)
        );
    }

    #[test]
    fn academic_questions_pass_through() {
        for q in [
            "When does enrollment open?",
            "What is this schedule about?",
            "What are the graduation requirements?",
            "highest honors requirements",
        ] {
            assert_eq!(classify(q), Intent::Academic, "{q}");
        }
    }

    #[test]
    fn short_words_do_not_match_inside_longer_ones() {
        // "hi" inside "this", "bye" inside nothing, "hey" inside "they"
        assert_eq!(classify("is this the right office?"), Intent::Academic);
        assert_eq!(classify("do they accept late forms?"), Intent::Academic);
    }
}
