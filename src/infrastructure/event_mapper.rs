use crate::domain::models::{CalendarEvent, UNTITLED_EVENT};
use crate::domain::palette::{CALENDAR_COLOR_ID, ColorPalette};
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

const TRANSPARENT: &str = "transparent";

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct CalendarEventDateTime {
    #[serde(rename = "dateTime", skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(rename = "timeZone", skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct GoogleCalendarEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(rename = "colorId", skip_serializing_if = "Option::is_none")]
    pub color_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transparency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default)]
    pub start: CalendarEventDateTime,
    #[serde(default)]
    pub end: CalendarEventDateTime,
}

#[derive(Debug, Clone, serde::Deserialize, PartialEq, Eq)]
pub struct GoogleColorDefinition {
    pub background: String,
    pub foreground: String,
}

#[derive(Debug, Clone, Default, serde::Deserialize, PartialEq, Eq)]
pub struct GoogleColorsResponse {
    #[serde(default)]
    pub event: BTreeMap<String, GoogleColorDefinition>,
}

/// Maps one listed event into the domain type; `Ok(None)` for events that are
/// excluded (transparent unless requested, cancelled).
pub fn decode_calendar_event(
    event: &GoogleCalendarEvent,
    include_transparent: bool,
) -> Result<Option<CalendarEvent>, InfraError> {
    if event.status.as_deref() == Some("cancelled") {
        return Ok(None);
    }
    let transparent = event.transparency.as_deref() == Some(TRANSPARENT);
    if transparent && !include_transparent {
        return Ok(None);
    }

    let all_day = event.start.date_time.is_none();
    let (start, end) = if all_day {
        (
            parse_all_day(event.start.date.as_deref(), "start.date")?,
            parse_all_day(event.end.date.as_deref(), "end.date")?,
        )
    } else {
        (
            parse_optional_rfc3339(event.start.date_time.as_deref(), "start.dateTime")?,
            parse_optional_rfc3339(event.end.date_time.as_deref(), "end.dateTime")?,
        )
    };

    Ok(Some(CalendarEvent {
        id: event
            .id
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string(),
        summary: event
            .summary
            .as_deref()
            .map(str::trim)
            .filter(|summary| !summary.is_empty())
            .unwrap_or(UNTITLED_EVENT)
            .to_string(),
        color_id: event
            .color_id
            .as_deref()
            .map(str::trim)
            .filter(|color_id| !color_id.is_empty())
            .unwrap_or(CALENDAR_COLOR_ID)
            .to_string(),
        start,
        end,
        all_day,
        transparent,
    }))
}

pub fn decode_color_palette(colors: &GoogleColorsResponse) -> ColorPalette {
    ColorPalette::from_event_colors(colors.event.iter().map(|(id, definition)| {
        (
            id.clone(),
            definition.background.clone(),
            definition.foreground.clone(),
        )
    }))
}

fn parse_optional_rfc3339(
    value: Option<&str>,
    field_name: &str,
) -> Result<Option<DateTime<Utc>>, InfraError> {
    value
        .map(|value| {
            DateTime::parse_from_rfc3339(value.trim())
                .map(|parsed| parsed.with_timezone(&Utc))
                .map_err(|error| {
                    InfraError::Calendar(format!(
                        "invalid calendar event {field_name} '{value}': {error}"
                    ))
                })
        })
        .transpose()
}

fn parse_all_day(value: Option<&str>, field_name: &str) -> Result<Option<DateTime<Utc>>, InfraError> {
    value
        .map(|value| {
            chrono::NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
                .map(|date| date.and_time(chrono::NaiveTime::MIN).and_utc())
                .map_err(|error| {
                    InfraError::Calendar(format!(
                        "invalid calendar event {field_name} '{value}': {error}"
                    ))
                })
        })
        .transpose()
}
