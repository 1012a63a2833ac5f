use std::io::{BufRead, Write};

use anyhow::Context as _;
use colored::Colorize as _;

use crate::cli::TemplateName;
use crate::formats::BookConfig;
use crate::template::{describe, parse_template_name};

const TEMPLATE_MENU: [TemplateName; 3] = [
    TemplateName::Standard,
    TemplateName::Quickstart,
    TemplateName::Deepdive,
];

const DISPLAY_GROUPS: &[(&str, &[&str])] = &[
    ("Content Parameters", &["topic", "main_keyword", "theme"]),
    ("Audience & Style", &["target_audience", "tone", "mood"]),
    ("Distribution", &["distribution_platform", "primary_format"]),
    ("Content Structure", &["chapter_length", "interactive_elements_included"]),
];

const EDITABLE_KEYS: [&str; 10] = [
    "topic",
    "main_keyword",
    "theme",
    "target_audience",
    "tone",
    "mood",
    "distribution_platform",
    "primary_format",
    "chapter_length",
    "interactive_elements_included",
];

/// Line-oriented prompts over any reader/writer pair (stdin/stdout in the CLI).
///
/// Invalid answers re-prompt; a closed input stream is an error.
pub struct Console<R, W> {
    reader: R,
    writer: W,
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Asks for one line. An empty answer yields `default` (or the empty string).
    pub fn ask(&mut self, prompt: &str, default: Option<&str>) -> anyhow::Result<String> {
        match default {
            Some(default) => write!(self.writer, "{} [{default}]: ", prompt.bold())?,
            None => write!(self.writer, "{}: ", prompt.bold())?,
        }
        self.writer.flush().context("flush prompt")?;

        let mut line = String::new();
        let read = self.reader.read_line(&mut line).context("read input")?;
        if read == 0 {
            anyhow::bail!("input closed while waiting for: {prompt}");
        }

        let answer = line.trim();
        Ok(match (answer.is_empty(), default) {
            (true, Some(default)) => default.to_owned(),
            _ => answer.to_owned(),
        })
    }

    pub fn confirm(&mut self, prompt: &str) -> anyhow::Result<bool> {
        loop {
            let answer = self.ask(&format!("{prompt} (y/n)"), None)?;
            match answer.to_ascii_lowercase().as_str() {
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => self.warn("Please answer y or n.")?,
            }
        }
    }

    /// Numbered template menu; accepts `1`-`3` or a template name, default `1`.
    pub fn choose_template(&mut self) -> anyhow::Result<TemplateName> {
        for (index, name) in TEMPLATE_MENU.iter().enumerate() {
            writeln!(
                self.writer,
                "{}) {:<10} - {}",
                index + 1,
                name.as_str(),
                describe(*name)
            )?;
        }

        loop {
            let choice = self.ask("Select template (1-3)", Some("1"))?;
            let by_number = choice
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| TEMPLATE_MENU.get(i).copied());
            match by_number.or_else(|| parse_template_name(&choice)) {
                Some(name) => return Ok(name),
                None => self.warn("Invalid selection. Please choose 1, 2, or 3.")?,
            }
        }
    }

    pub fn display_config(&mut self, config: &BookConfig) -> anyhow::Result<()> {
        writeln!(self.writer)?;
        writeln!(self.writer, "{}", "Generated Configuration:".bold())?;
        writeln!(self.writer)?;
        for (group, keys) in DISPLAY_GROUPS {
            writeln!(self.writer, "{}", format!("{group}:").bold())?;
            for key in *keys {
                let value = field_value(config, key).unwrap_or_default();
                writeln!(self.writer, "  {key:<30}: {}", value.cyan())?;
            }
            writeln!(self.writer)?;
        }
        self.writer.flush().context("flush config display")?;
        Ok(())
    }

    /// Review loop: show the configuration, offer edits until the user declines.
    pub fn edit_config(&mut self, mut config: BookConfig) -> anyhow::Result<BookConfig> {
        loop {
            self.display_config(&config)?;
            if !self.confirm("Would you like to modify any parameters?")? {
                return Ok(config);
            }

            writeln!(self.writer)?;
            writeln!(self.writer, "Editable parameters:")?;
            for (index, key) in EDITABLE_KEYS.iter().enumerate() {
                writeln!(self.writer, "  {}. {key}", index + 1)?;
            }

            let answer = self.ask("Enter number to edit (0 to finish)", None)?;
            let Ok(choice) = answer.parse::<usize>() else {
                self.warn("Please enter a valid number")?;
                continue;
            };
            if choice == 0 {
                return Ok(config);
            }
            let Some(key) = EDITABLE_KEYS.get(choice - 1).copied() else {
                self.warn("Invalid choice")?;
                continue;
            };

            let current = field_value(&config, key).unwrap_or_default();
            writeln!(self.writer, "Current value: {}", current.cyan())?;
            loop {
                let value = self.ask("Enter new value", Some(&current))?;
                match set_field(&mut config, key, &value) {
                    Ok(()) => break,
                    Err(err) => self.warn(&format!("{err:#}"))?,
                }
            }
            writeln!(self.writer, "{}", format!("✓ Updated {key}").green())?;
            tracing::debug!(key, "edited configuration field");
        }
    }

    fn warn(&mut self, message: &str) -> anyhow::Result<()> {
        writeln!(self.writer, "{}", format!("⚠ {message}").yellow())?;
        Ok(())
    }
}

fn field_value(config: &BookConfig, key: &str) -> Option<String> {
    let value = match key {
        "topic" => config.topic.clone(),
        "main_keyword" => config.main_keyword.clone(),
        "theme" => config.theme.clone(),
        "target_audience" => config.target_audience.clone(),
        "tone" => config.tone.clone(),
        "mood" => config.mood.clone(),
        "distribution_platform" => config.distribution_platform.clone(),
        "primary_format" => config.primary_format.clone(),
        "chapter_length" => config.chapter_length.to_string(),
        "interactive_elements_included" => config.interactive_elements_included.clone(),
        _ => return None,
    };
    Some(value)
}

fn set_field(config: &mut BookConfig, key: &str, value: &str) -> anyhow::Result<()> {
    let slot = match key {
        "chapter_length" => {
            let length = value
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| anyhow::anyhow!("chapter_length must be a positive whole number"))?;
            config.chapter_length = length;
            return Ok(());
        }
        "topic" => &mut config.topic,
        "main_keyword" => &mut config.main_keyword,
        "theme" => &mut config.theme,
        "target_audience" => &mut config.target_audience,
        "tone" => &mut config.tone,
        "mood" => &mut config.mood,
        "distribution_platform" => &mut config.distribution_platform,
        "primary_format" => &mut config.primary_format,
        "interactive_elements_included" => &mut config.interactive_elements_included,
        _ => anyhow::bail!("unknown configuration key: {key}"),
    };
    *slot = value.to_owned();
    Ok(())
}
