//! Operator prompt shown after a failed cycle

use cascade_build::{CancellationToken, CycleFailure, DecisionPolicy, OperatorDecision};
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::warn;

const PROMPT: &str = "Fix the problem, then [r]etry or [a]bort? ";

/// Asks the operator whether to re-run the cycle
///
/// The captured output of the failed command is replayed on stderr before
/// asking. End of input aborts; Ctrl-C aborts and cancels the token.
pub struct InteractivePolicy {
    editor: Option<DefaultEditor>,
    cancel: CancellationToken,
}

impl InteractivePolicy {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            editor: None,
            cancel,
        }
    }

    fn replay(failure: &CycleFailure) {
        eprintln!();
        eprintln!(
            "{} {} (cycle {})",
            "FAIL".red().bold(),
            failure,
            failure.attempt
        );
        eprintln!("  command: {}", failure.command.dimmed());
        match failure.exit_code {
            Some(code) => eprintln!("  exit code: {}", code),
            None => eprintln!("  exit code: none (not started or killed by a signal)"),
        }
        let output = failure.output.trim_end();
        if !output.is_empty() {
            eprintln!("{}", "-".repeat(60));
            eprintln!("{}", output);
            eprintln!("{}", "-".repeat(60));
        }
    }

    fn read_answer(&mut self) -> Result<String, ReadlineError> {
        if self.editor.is_none() {
            self.editor = Some(DefaultEditor::new()?);
        }
        match self.editor.as_mut() {
            Some(editor) => editor.readline(PROMPT),
            None => Err(ReadlineError::Eof),
        }
    }
}

impl DecisionPolicy for InteractivePolicy {
    fn decide(&mut self, failure: &CycleFailure) -> OperatorDecision {
        Self::replay(failure);

        loop {
            match self.read_answer() {
                Ok(line) => match parse_answer(&line) {
                    Some(decision) => return decision,
                    None => eprintln!("Please answer 'retry' or 'abort'."),
                },
                Err(ReadlineError::Interrupted) => {
                    self.cancel.cancel();
                    return OperatorDecision::Abort;
                }
                Err(ReadlineError::Eof) => return OperatorDecision::Abort,
                Err(e) => {
                    warn!("cannot read operator input: {}", e);
                    return OperatorDecision::Abort;
                }
            }
        }
    }
}

/// Map an answer to a decision; an empty line means retry
pub fn parse_answer(line: &str) -> Option<OperatorDecision> {
    match line.trim().to_lowercase().as_str() {
        "" | "r" | "retry" | "c" | "continue" => Some(OperatorDecision::Continue),
        "a" | "abort" | "q" | "quit" => Some(OperatorDecision::Abort),
        _ => None,
    }
}
