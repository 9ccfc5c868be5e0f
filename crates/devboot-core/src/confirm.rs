/// Answers that count as "yes". Anything else, including no answer, is "no".
pub const AFFIRMATIVE: &[&str] = &["y", "yes"];

pub fn is_affirmative(answer: &str) -> bool {
    let answer = answer.trim();
    AFFIRMATIVE.iter().any(|a| answer.eq_ignore_ascii_case(a))
}

/// Yes/no gate in front of destructive steps.
pub trait Confirm {
    fn confirm(&self, question: &str) -> bool;
}

/// Fixed answer, for non-interactive use.
pub struct Preset(pub bool);

impl Confirm for Preset {
    fn confirm(&self, question: &str) -> bool {
        tracing::debug!(question, answer = self.0, "preset confirmation");
        self.0
    }
}
