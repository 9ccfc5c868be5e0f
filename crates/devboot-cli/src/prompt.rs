use devboot_core::confirm::{is_affirmative, Confirm};
use std::io::{BufRead, IsTerminal, Write};

/// Interactive yes/no on the terminal; falls back to one line of stdin when
/// stdin is piped. EOF or a read error declines.
pub struct TerminalConfirm;

impl Confirm for TerminalConfirm {
    fn confirm(&self, question: &str) -> bool {
        let question = format!("{question} [y/N]");
        let answer = if std::io::stdin().is_terminal() {
            dialoguer::Input::<String>::new()
                .with_prompt(question)
                .allow_empty(true)
                .interact_text()
                .unwrap_or_default()
        } else {
            eprint!("{question} ");
            let _ = std::io::stderr().flush();
            let mut line = String::new();
            if let Err(e) = std::io::stdin().lock().read_line(&mut line) {
                tracing::warn!(error = %e, "could not read answer, assuming no");
            }
            line
        };
        is_affirmative(&answer)
    }
}
