use crate::domain::models::CalendarEvent;
use crate::domain::palette::ColorPalette;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_mapper::{
    GoogleCalendarEvent, GoogleColorsResponse, decode_calendar_event, decode_color_palette,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use tracing::debug;
use url::Url;

pub const DEFAULT_CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
pub const PRIMARY_CALENDAR_ID: &str = "primary";

/// Read-only view of the calendar service the report needs.
#[async_trait]
pub trait CalendarSource: Send + Sync {
    async fn get_events_by_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        include_transparent: bool,
    ) -> Result<Vec<CalendarEvent>, InfraError>;

    async fn get_color_palette(&self) -> Result<ColorPalette, InfraError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestGoogleCalendarClient {
    client: Client,
    base_url: String,
    calendar_id: String,
    access_token: String,
}

impl ReqwestGoogleCalendarClient {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: DEFAULT_CALENDAR_API_BASE.to_string(),
            calendar_id: PRIMARY_CALENDAR_ID.to_string(),
            access_token: access_token.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_calendar_id(mut self, calendar_id: impl Into<String>) -> Self {
        self.calendar_id = calendar_id.into();
        self
    }

    fn ensure_non_empty(value: &str, field: &str) -> Result<(), InfraError> {
        if value.trim().is_empty() {
            return Err(InfraError::Calendar(format!("{field} must not be empty")));
        }
        Ok(())
    }

    fn http_error(status: reqwest::StatusCode, body: &str) -> InfraError {
        let message = if body.trim().is_empty() {
            format!("google calendar api error: http {}", status.as_u16())
        } else {
            format!("google calendar api error: http {}; body={body}", status.as_u16())
        };
        InfraError::Calendar(message)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, InfraError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|error| InfraError::Calendar(format!("invalid calendar api base url: {error}")))?;
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                InfraError::Calendar("calendar api base URL cannot be a base".to_string())
            })?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    async fn get_json<T>(&self, request: reqwest::RequestBuilder, what: &str) -> Result<T, InfraError>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = request
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|error| InfraError::Calendar(format!("network error while fetching {what}: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::Calendar(format!("failed reading {what} response: {error}")))?;

        if !status.is_success() {
            return Err(Self::http_error(status, &body));
        }

        serde_json::from_str(&body).map_err(|error| {
            InfraError::Calendar(format!("invalid {what} payload: {error}; body={body}"))
        })
    }
}

#[derive(Debug, serde::Deserialize)]
struct EventsPageResponse {
    items: Option<Vec<GoogleCalendarEvent>>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[async_trait]
impl CalendarSource for ReqwestGoogleCalendarClient {
    async fn get_events_by_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        include_transparent: bool,
    ) -> Result<Vec<CalendarEvent>, InfraError> {
        Self::ensure_non_empty(&self.access_token, "access token")?;
        Self::ensure_non_empty(&self.calendar_id, "calendar id")?;

        let endpoint = self.endpoint(&["calendars", self.calendar_id.as_str(), "events"])?;
        let time_min = start.to_rfc3339_opts(SecondsFormat::Secs, true);
        let time_max = end.to_rfc3339_opts(SecondsFormat::Secs, true);
        let mut page_token: Option<String> = None;
        let mut events = Vec::new();

        loop {
            let mut request = self.client.get(endpoint.clone()).query(&[
                ("singleEvents", "true"),
                ("orderBy", "startTime"),
                ("maxResults", "2500"),
                ("timeMin", time_min.as_str()),
                ("timeMax", time_max.as_str()),
            ]);
            if let Some(page_token) = page_token.as_deref() {
                request = request.query(&[("pageToken", page_token)]);
            }

            let mut page: EventsPageResponse = self.get_json(request, "calendar events").await?;
            for event in page.items.take().unwrap_or_default() {
                if let Some(event) = decode_calendar_event(&event, include_transparent)? {
                    events.push(event);
                }
            }

            match page.next_page_token.take() {
                Some(next_page_token) => page_token = Some(next_page_token),
                None => break,
            }
        }

        debug!(count = events.len(), calendar = %self.calendar_id, "fetched calendar events");
        Ok(events)
    }

    async fn get_color_palette(&self) -> Result<ColorPalette, InfraError> {
        Self::ensure_non_empty(&self.access_token, "access token")?;
        let endpoint = self.endpoint(&["colors"])?;
        let colors: GoogleColorsResponse = self
            .get_json(self.client.get(endpoint), "calendar colors")
            .await?;
        Ok(decode_color_palette(&colors))
    }
}

/// Fixed events and palette; used when no calendar access is configured.
#[derive(Debug, Clone)]
pub struct StaticCalendarSource {
    events: Vec<CalendarEvent>,
    palette: ColorPalette,
}

impl StaticCalendarSource {
    pub fn new(events: Vec<CalendarEvent>, palette: ColorPalette) -> Self {
        Self { events, palette }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), ColorPalette::builtin())
    }
}

impl Default for StaticCalendarSource {
    fn default() -> Self {
        Self::empty()
    }
}

#[async_trait]
impl CalendarSource for StaticCalendarSource {
    async fn get_events_by_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        include_transparent: bool,
    ) -> Result<Vec<CalendarEvent>, InfraError> {
        Ok(self
            .events
            .iter()
            .filter(|event| include_transparent || !event.transparent)
            .filter(|event| match (event.start, event.end) {
                (Some(event_start), Some(event_end)) => event_start < end && event_end > start,
                (Some(event_start), None) => event_start >= start && event_start < end,
                _ => false,
            })
            .cloned()
            .collect())
    }

    async fn get_color_palette(&self) -> Result<ColorPalette, InfraError> {
        Ok(self.palette.clone())
    }
}
