use crate::application::aggregation::{AggregationEngine, ReportOptions, TimeReport};
use crate::application::entity_resolver::EntityResolver;
use crate::application::task_service::TaskService;
use crate::domain::models::{ResolvedEntities, TimeWindow};
use crate::domain::palette::ColorPalette;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::google_calendar_client::CalendarSource;
use chrono::{DateTime, Datelike, Days, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Monday 00:00:00 through Sunday 23:59:59 of the week containing `date`,
/// evaluated in `tz`.
pub fn week_window(date: NaiveDate, tz: Tz) -> Result<TimeWindow, InfraError> {
    let monday = date
        .checked_sub_days(Days::new(u64::from(date.weekday().num_days_from_monday())))
        .ok_or_else(|| InfraError::InvalidRequest(format!("no week start for {date}")))?;
    let sunday = monday
        .checked_add_days(Days::new(6))
        .ok_or_else(|| InfraError::InvalidRequest(format!("no week end for {date}")))?;
    let end_of_day = NaiveTime::from_hms_opt(23, 59, 59)
        .ok_or_else(|| InfraError::InvalidRequest("invalid end of day".to_string()))?;

    Ok(TimeWindow {
        start: local_to_utc(tz, monday.and_time(NaiveTime::MIN))?,
        end: local_to_utc(tz, sunday.and_time(end_of_day))?,
    })
}

fn local_to_utc(tz: Tz, local: chrono::NaiveDateTime) -> Result<DateTime<Utc>, InfraError> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(value) => Ok(value.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
        LocalResult::None => Err(InfraError::InvalidRequest(format!(
            "{local} does not exist in {tz}"
        ))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EventSource {
    /// Events came from the calendar service.
    Calendar,
    /// No calendar configured; events mirrored in the scheduled batch were used.
    Batch,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedCounts {
    pub regular_tasks: usize,
    pub chunked_tasks: usize,
    pub chunks: usize,
    pub calendar_events: usize,
    pub scheduled_entities: usize,
}

impl From<&ResolvedEntities> for ResolvedCounts {
    fn from(entities: &ResolvedEntities) -> Self {
        Self {
            regular_tasks: entities.regular_tasks.len(),
            chunked_tasks: entities.chunked_tasks.len(),
            chunks: entities.chunks.len(),
            calendar_events: entities.calendar_events.len(),
            scheduled_entities: entities.all_scheduled_entities.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyReport {
    pub window: TimeWindow,
    pub time_zone: String,
    pub counts: ResolvedCounts,
    pub event_source: EventSource,
    pub report: TimeReport,
}

pub struct WeeklyReportService {
    tasks: Arc<TaskService>,
    calendar: Option<Arc<dyn CalendarSource>>,
    time_zone: Tz,
    resolver: EntityResolver,
    engine: AggregationEngine,
}

impl WeeklyReportService {
    pub fn new(tasks: Arc<TaskService>, time_zone: Tz) -> Self {
        Self {
            tasks,
            calendar: None,
            time_zone,
            resolver: EntityResolver::new(),
            engine: AggregationEngine::new(),
        }
    }

    pub fn with_calendar(mut self, calendar: Arc<dyn CalendarSource>) -> Self {
        self.calendar = Some(calendar);
        self
    }

    pub async fn build(
        &self,
        reference_date: NaiveDate,
        options: ReportOptions,
    ) -> Result<WeeklyReport, InfraError> {
        let window = week_window(reference_date, self.time_zone)?;
        info!(start = %window.start, end = %window.end, "building weekly report");

        let batch = self.tasks.fetch_scheduled_entities(window).await?;
        let resolved = self.resolver.resolve(&batch);

        let (events, palette, event_source) = match &self.calendar {
            Some(calendar) => {
                let events = calendar
                    .get_events_by_date_range(window.start, window.end, options.include_transparent)
                    .await?;
                let palette = calendar.get_color_palette().await?;
                (events, palette, EventSource::Calendar)
            }
            None => (
                resolved.calendar_events.clone(),
                ColorPalette::builtin(),
                EventSource::Batch,
            ),
        };

        let report = self.engine.build_report(&resolved, &events, &palette, options);
        let counts = ResolvedCounts::from(&resolved);
        info!(
            tasks = counts.regular_tasks,
            chunked = counts.chunked_tasks,
            events = events.len(),
            total_minutes = report.grand_total_minutes,
            "weekly report assembled"
        );

        Ok(WeeklyReport {
            window,
            time_zone: self.time_zone.name().to_string(),
            counts,
            event_source,
            report,
        })
    }
}
