//! Interactive Y/N confirmation.
use anyhow::{Context, Result};
use dialoguer::{theme::ColorfulTheme, Confirm};
use std::io::{BufRead, IsTerminal, Write};

/// Asks the operator to confirm an action.
pub trait Confirmer {
    fn confirm(&self, prompt: &str) -> Result<bool>;
}

/// Prompt on the terminal, defaulting to "no".
///
/// Without a terminal on stdin and stderr the answer is read as one line
/// from stdin, so `echo Y | graphlink ...` works.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalConfirmer;

impl Confirmer for TerminalConfirmer {
    fn confirm(&self, prompt: &str) -> Result<bool> {
        if std::io::stdin().is_terminal() && std::io::stderr().is_terminal() {
            return Confirm::with_theme(&ColorfulTheme::default())
                .with_prompt(prompt)
                .default(false)
                .interact()
                .context("read confirmation");
        }
        read_answer(&mut std::io::stdin().lock(), &mut std::io::stderr(), prompt)
    }
}

/// Write `prompt` and read one answer line; end of input counts as "no".
pub(crate) fn read_answer<R, W>(input: &mut R, output: &mut W, prompt: &str) -> Result<bool>
where
    R: BufRead,
    W: Write,
{
    write!(output, "{prompt} Enter [Y/N]: ").context("write confirmation prompt")?;
    output.flush().context("write confirmation prompt")?;
    let mut line = String::new();
    input.read_line(&mut line).context("read confirmation")?;
    let accepted = is_yes(&line);
    tracing::debug!(prompt, accepted, "confirmation read from input");
    Ok(accepted)
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim(), "Y" | "y")
}

/// Answers yes without asking, for `--skip-prompt`.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeYes;

impl Confirmer for AssumeYes {
    fn confirm(&self, prompt: &str) -> Result<bool> {
        tracing::debug!(prompt, "confirmation skipped");
        Ok(true)
    }
}

/// Pick the confirmer for the `--skip-prompt` flag.
pub fn confirmer(skip_prompt: bool) -> Box<dyn Confirmer> {
    if skip_prompt {
        Box::new(AssumeYes)
    } else {
        Box::new(TerminalConfirmer)
    }
}
