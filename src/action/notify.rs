//! Templated human-readable notifications.
//!
//! A template is a list of lines joined with `\n`. Placeholders are replaced
//! from one selected measurement and the sample timestamp:
//!
//! | placeholder | value |
//! |---|---|
//! | `{VALUE}` / `{UNIT}` | selected measurement |
//! | `{YEAR}` | four digit year |
//! | `{MONTH}` `{DAY}` `{HOUR}` `{MINUTE}` `{SECOND}` | two digit, zero padded |

use std::sync::Arc;

use chrono::{Datelike, Timelike};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{MonitorResult, SampleError};
use crate::event::Action;
use crate::sample::{Sample, BATTERY_VOLTAGE, CHARGE_CURRENT};
use crate::sink::NotificationSink;

const DATA_TAKEN_AT: &str = "Based on data taken at {YEAR}-{MONTH}-{DAY} {HOUR}:{MINUTE} UTC.";

/// Message template bound to one measurement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTemplate {
    /// Lines of the message.
    pub lines: Vec<String>,
    /// Measurement providing `{VALUE}` and `{UNIT}`.
    pub measurement: String,
}

impl MessageTemplate {
    pub fn new<I, S>(measurement: impl Into<String>, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            measurement: measurement.into(),
        }
    }

    #[must_use]
    pub fn battery_low() -> Self {
        Self::new(
            BATTERY_VOLTAGE,
            [
                "Battery voltage is getting very low.",
                "It is {VALUE}[{UNIT}] now, so servers are being shut down.",
                DATA_TAKEN_AT,
            ],
        )
    }

    #[must_use]
    pub fn battery_full() -> Self {
        Self::new(
            BATTERY_VOLTAGE,
            [
                "Battery has recovered to nearly full charge.",
                "It is {VALUE}[{UNIT}] now.",
                DATA_TAKEN_AT,
            ],
        )
    }

    #[must_use]
    pub fn charge_current_high() -> Self {
        Self::new(
            CHARGE_CURRENT,
            [
                "The sun is out and the array is working hard.",
                "Charge current reached {VALUE}[{UNIT}].",
                DATA_TAKEN_AT,
            ],
        )
    }

    /// Renders the message for `sample`.
    ///
    /// # Errors
    ///
    /// Returns `SampleError::MissingMeasurement` if the selected measurement
    /// is absent.
    pub fn render(&self, sample: &Sample) -> Result<String, SampleError> {
        let m = sample.require(&self.measurement)?;
        let at = sample.timestamp();

        let replacements = [
            ("{VALUE}", m.value.to_string()),
            ("{UNIT}", m.unit.clone()),
            ("{YEAR}", format!("{:04}", at.year())),
            ("{MONTH}", format!("{:02}", at.month())),
            ("{DAY}", format!("{:02}", at.day())),
            ("{HOUR}", format!("{:02}", at.hour())),
            ("{MINUTE}", format!("{:02}", at.minute())),
            ("{SECOND}", format!("{:02}", at.second())),
        ];

        // Single pass: substituted values are never scanned again.
        let template = self.lines.join("\n");
        let mut text = String::with_capacity(template.len());
        let mut rest = template.as_str();
        while let Some(start) = rest.find('{') {
            text.push_str(&rest[..start]);
            let tail = &rest[start..];
            match replacements.iter().find(|(placeholder, _)| tail.starts_with(*placeholder)) {
                Some((placeholder, value)) => {
                    text.push_str(value);
                    rest = &tail[placeholder.len()..];
                }
                None => {
                    text.push('{');
                    rest = &tail[1..];
                }
            }
        }
        text.push_str(rest);
        Ok(text)
    }
}

/// Posts a rendered template to a notification sink.
pub struct NotifyAction {
    name: String,
    template: MessageTemplate,
    sink: Arc<dyn NotificationSink>,
}

impl std::fmt::Debug for NotifyAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyAction")
            .field("name", &self.name)
            .field("template", &self.template)
            .finish_non_exhaustive()
    }
}

impl NotifyAction {
    pub fn new(name: impl Into<String>, template: MessageTemplate, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            name: name.into(),
            template,
            sink,
        }
    }

    #[must_use]
    pub const fn template(&self) -> &MessageTemplate {
        &self.template
    }
}

impl Action for NotifyAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, sample: &Sample) -> MonitorResult<()> {
        let text = self.template.render(sample)?;
        self.sink.post(&text)?;
        info!(handler = %self.name, sink = %self.sink.name(), sample = %sample.id(), "notification posted");
        Ok(())
    }
}
