use crate::ui;
use colored::Colorize;
use dialoguer::{Confirm, Input};
use orchestrator::{Choice, Error, Menu, Prompt, Result};

/// Menus and confirmations on the controlling terminal
#[derive(Debug, Default)]
pub struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn choose_one(&mut self, menu: &Menu) -> Result<Choice> {
        ui::header(&menu.title);
        for (i, entry) in menu.entries.iter().enumerate() {
            println!("{} {}", format!("{:>3}:", i + 1).blue().bold(), entry);
        }
        if let Some(note) = &menu.note {
            println!();
            ui::dim(note);
        }
        println!();

        // Blank answers must reach the parser instead of re-prompting
        let answer: String = Input::new()
            .with_prompt(menu.prompt_text())
            .allow_empty(true)
            .interact_text()
            .map_err(terminal_error)?;

        read_choice(menu, &answer)
    }

    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .map_err(terminal_error)
    }
}

fn read_choice(menu: &Menu, answer: &str) -> Result<Choice> {
    Choice::parse(answer, menu.entries.len())
}

fn terminal_error(err: dialoguer::Error) -> Error {
    match err {
        dialoguer::Error::IO(e) => Error::Io(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn menu() -> Menu {
        Menu {
            title: "Configured deployments:".into(),
            entries: vec!["app (us-east-1)".into(), "db (us-east-1)".into()],
            note: None,
            item: "deployment",
        }
    }

    #[test]
    fn test_blank_answer_is_invalid_selection() {
        for answer in ["", "   "] {
            let err = read_choice(&menu(), answer).unwrap_err();
            assert!(matches!(err, Error::InvalidSelection(_)), "{answer:?}: {err}");
        }
        assert_eq!(read_choice(&menu(), "2").unwrap(), Choice::Index(1));
        assert_eq!(read_choice(&menu(), "all").unwrap(), Choice::All);
    }

    #[test]
    fn test_terminal_error_keeps_io_source() {
        let err = terminal_error(dialoguer::Error::IO(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "terminal closed",
        )));
        match err {
            Error::Io(e) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("unexpected error: {other}"),
        }
    }
}
