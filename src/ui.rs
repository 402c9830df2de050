use anyhow::{Context, Result};
use dialoguer::{Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Lets the user pick one entry from a list
pub fn select_from_list(items: &[String], prompt: &str) -> Result<usize> {
    let selection = Select::new()
        .with_prompt(prompt)
        .items(items)
        .default(0)
        .interact()
        .context("Failed to read selection")?;

    Ok(selection)
}

pub fn prompt_input(prompt: &str) -> Result<String> {
    let input = Input::<String>::new()
        .with_prompt(prompt)
        .interact()
        .context("Failed to read input")?;

    Ok(input)
}

/// Spinner shown while a resolution is in flight.
pub fn spinner(message: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        bar.set_style(style);
    }
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}
